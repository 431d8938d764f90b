//! Byte-pattern packer hints.
//!
//! Runs over a bounded prefix of every sample. A hit is only a hint: the
//! container decision is made from the classification, not from here.

use crate::core::triage::PackerMatch;
use memchr::memmem;

struct PackerSignature {
    name: &'static str,
    /// Any of these needles counts as a hit.
    needles: &'static [&'static [u8]],
    confidence: f32,
}

const SIGNATURES: &[PackerSignature] = &[
    PackerSignature {
        name: "ASPack",
        needles: &[b"ASPack", b".aspack"],
        confidence: 0.9,
    },
    PackerSignature {
        name: "PECompact",
        needles: &[b"PECompact", b"PEC2"],
        confidence: 0.85,
    },
    PackerSignature {
        name: "Petite",
        needles: &[b"Petite", b".petite"],
        confidence: 0.8,
    },
    PackerSignature {
        name: "FSG",
        needles: &[b"FSG!"],
        confidence: 0.85,
    },
    PackerSignature {
        name: "MPRESS",
        needles: &[b"MPRESS", b".MPRESS1"],
        confidence: 0.85,
    },
    PackerSignature {
        name: "Themida/WinLicense",
        needles: &[b"Themida", b"WinLicense"],
        confidence: 0.9,
    },
    PackerSignature {
        name: "VMProtect",
        needles: &[b".vmp0", b".vmp1"],
        confidence: 0.75,
    },
];

fn contains(hay: &[u8], needle: &[u8]) -> bool {
    memmem::find(hay, needle).is_some()
}

/// Detect packers in the first `scan_limit` bytes of `data`.
pub fn detect_packers(data: &[u8], scan_limit: usize) -> Vec<PackerMatch> {
    let hay = &data[..data.len().min(scan_limit)];
    let mut out = Vec::new();

    // UPX accumulates evidence: section names plus the stub signature.
    let mut upx = 0.0f32;
    if contains(hay, b"UPX!") {
        upx += 0.4;
    }
    if contains(hay, b"UPX0") {
        upx += 0.3;
    }
    if contains(hay, b"UPX1") {
        upx += 0.3;
    }
    if contains(hay, b"$Id: UPX ") {
        upx += 0.2;
    }
    if upx > 0.0 {
        out.push(PackerMatch::new("UPX", upx.min(1.0)));
    }

    for sig in SIGNATURES {
        if sig.needles.iter().any(|n| contains(hay, n)) {
            out.push(PackerMatch::new(sig.name, sig.confidence));
        }
    }

    out
}
