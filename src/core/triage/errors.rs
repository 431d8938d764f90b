//! Recorded degradations of a scan.
//!
//! A failed component never aborts the pipeline; it leaves a `ScanIssue` on
//! the record naming the stage it happened in.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline states of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStage {
    Sniffing,
    Dispatching,
    Extracting,
    SignatureMatching,
    ContainerCheck,
    Unpacking,
    MemberScanning,
    Teardown,
    Done,
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ScanStage::*;
        let s = match self {
            Sniffing => "Sniffing",
            Dispatching => "Dispatching",
            Extracting => "Extracting",
            SignatureMatching => "SignatureMatching",
            ContainerCheck => "ContainerCheck",
            Unpacking => "Unpacking",
            MemberScanning => "MemberScanning",
            Teardown => "Teardown",
            Done => "Done",
        };
        f.write_str(s)
    }
}

/// Standardized issue kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum IssueKind {
    Io,
    MalformedInput,
    MalformedExecutable,
    RuleValidation,
    MatchFailure,
    UnpackFailure,
    Timeout,
    BudgetExceeded,
    SnifferMismatch,
    Config,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<&ScanError> for IssueKind {
    fn from(err: &ScanError) -> Self {
        match err {
            ScanError::Io { .. } => IssueKind::Io,
            ScanError::MalformedInput(_) => IssueKind::MalformedInput,
            ScanError::MalformedExecutable(_) => IssueKind::MalformedExecutable,
            ScanError::RuleValidation { .. } => IssueKind::RuleValidation,
            ScanError::Match(_) => IssueKind::MatchFailure,
            ScanError::Unpack(_) => IssueKind::UnpackFailure,
            ScanError::Timeout { .. } => IssueKind::Timeout,
            ScanError::Budget(_) => IssueKind::BudgetExceeded,
            ScanError::Config(_) => IssueKind::Config,
        }
    }
}

/// One recorded degradation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    pub stage: ScanStage,
    pub kind: IssueKind,
    pub message: String,
}

impl ScanIssue {
    pub fn new(stage: ScanStage, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(stage: ScanStage, err: &ScanError) -> Self {
        Self::new(stage, IssueKind::from(err), err.to_string())
    }
}
