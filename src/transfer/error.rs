// ABOUTME: Error types for file transfer operations.
// ABOUTME: Covers local preflight failures, channel setup, and remote IO.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("local file does not exist: {0}")]
    LocalFileMissing(PathBuf),

    #[error("failed to open file transfer channel: {reason}")]
    ChannelOpen { reason: String },

    #[error("failed to transfer {path}: {reason}")]
    Io { path: String, reason: String },
}
