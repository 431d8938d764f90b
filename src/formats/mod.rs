//! Per-format feature extractors.

pub mod office;
pub mod pdf;
pub mod pe;
