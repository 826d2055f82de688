//! Processing format and convolution load options

use serde::{Deserialize, Serialize};

/// Format a processor is prepared for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub maximum_block_size: usize,
    pub num_channels: usize,
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, maximum_block_size: usize, num_channels: usize) -> Self {
        Self { sample_rate, maximum_block_size, num_channels }
    }
}

/// Use every IR channel (one per output channel) or only the first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stereo {
    No,
    Yes,
}

/// Strip leading and trailing silence from the IR before loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trim {
    No,
    Yes,
}

/// Scale the IR to a fixed energy before loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalise {
    No,
    Yes,
}
