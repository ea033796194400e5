//! Error types
//!
//! Library errors are typed; the binary wraps them in `anyhow` with
//! context.

use thiserror::Error;

/// Layout loading / building errors
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to parse layout: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("layout `{0}` defines no keys")]
    NoKeys(String),

    #[error("invalid display width {0}")]
    InvalidWidth(i32),

    #[error("key {index} has invalid size {width}x{height}")]
    InvalidKeySize { index: usize, width: i32, height: i32 },
}

/// Trace file errors
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to parse trace: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("trace entry {index} goes back in time ({time} < {previous})")]
    NonMonotonic { index: usize, time: u64, previous: u64 },
}
