use anyhow::{Context, Result};
use clap::Parser;
use sample_triage::logging::init_logging;
use sample_triage::{AggregationRecord, ScanConfig, Scanner};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "sample-triage")]
#[command(about = "Static triage of malware samples: classify, extract features, match signatures and unpack")]
#[command(version)]
struct Args {
    /// File or directory to scan
    path: PathBuf,

    /// Directory of signature rule files
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip per-format feature extraction
    #[arg(long)]
    no_features: bool,

    /// Skip signature matching
    #[arg(long)]
    no_signatures: bool,

    /// Worker threads for directory scans
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Append logs to this file as well as stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Pretty-print records (single file only)
    #[arg(long)]
    pretty: bool,
}

impl Args {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_path(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ScanConfig::default(),
        };
        if let Some(rules) = &self.rules {
            config.rules.rule_dir = Some(rules.clone());
        }
        if self.no_features {
            config.pipeline.extract_features = false;
        }
        if self.no_signatures {
            config.pipeline.match_signatures = false;
        }
        if self.jobs.is_some() {
            config.pipeline.jobs = self.jobs;
        }
        if self.log_file.is_some() {
            config.logging.file = self.log_file.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        Ok(config)
    }
}

fn write_record<W: Write>(out: &mut W, record: &AggregationRecord, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, record)?;
    } else {
        serde_json::to_writer(&mut *out, record)?;
    }
    writeln!(out)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.scan_config()?;
    let log = init_logging(&config.logging).context("initializing logging")?;

    let (scanner, report) = Scanner::from_config(config).context("compiling signature rules")?;
    if let Some(report) = &report {
        for rejected in &report.rejected {
            warn!(path = %rejected.path.display(), reason = %rejected.reason, "rule file rejected");
        }
        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "rule set ready"
        );
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.path.is_dir() {
        let results = scanner.scan_directory(&args.path)?;
        for (path, result) in results {
            match result {
                Ok(record) => write_record(&mut out, &record, false)?,
                Err(e) => error!(path = %path.display(), error = %e, "scan failed"),
            }
        }
    } else {
        let record = scanner
            .scan(&args.path)
            .with_context(|| format!("scanning {}", args.path.display()))?;
        write_record(&mut out, &record, args.pretty)?;
    }

    out.flush()?;
    log.flush();
    Ok(())
}
