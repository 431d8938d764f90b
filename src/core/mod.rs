//! Core data types shared by the triage pipeline.

pub mod triage;
