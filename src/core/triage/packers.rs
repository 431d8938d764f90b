//! Packer detection types.

use serde::{Deserialize, Serialize};

/// Packer detection entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackerMatch {
    pub name: String,
    pub confidence: f32,
}

impl PackerMatch {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}
