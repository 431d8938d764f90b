//! Triage runtime: sniffing, container handling and scan orchestration.

pub mod config;
pub mod containers;
pub mod magic;
pub mod packers;
pub mod recurse;
pub mod sniffers;
pub mod unpack;

pub use crate::core::triage::{
    ContainerFlags, ContainerKind, FileClassification, PackerMatch, SnifferSource, TriageHint,
};
pub use recurse::Scanner;
