// ABOUTME: Trust store error types.
// ABOUTME: Covers lock acquisition and trust file persistence failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot resolve the default trust file: HOME is not set")]
    NoHome,
}

pub type Result<T> = std::result::Result<T, Error>;
