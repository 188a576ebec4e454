//! Error types for workq.
//!
//! The queue contract itself is infallible; these errors come from the
//! configuration and telemetry layers around it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
