//! End-to-end scans through `Scanner`.

mod batch;
mod config;
mod properties;
mod rules;
mod scenarios;
mod unpack;
