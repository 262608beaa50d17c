// ABOUTME: Connection-level error types.
// ABOUTME: Distinguishes authentication, host key, compatibility, and channel failures.

use crate::types::HostIdentity;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed for {user}@{endpoint}: {reason}")]
    Connection {
        endpoint: HostIdentity,
        user: String,
        reason: String,
    },

    #[error("authentication failed for {user}@{endpoint}")]
    Authentication {
        endpoint: HostIdentity,
        user: String,
    },

    #[error("private key {path} is encrypted; decrypt it with ssh-keygen -p or use an agent")]
    EncryptedKey { path: PathBuf },

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("host key for {endpoint} was rejected")]
    HostKeyRejected { endpoint: HostIdentity },

    #[error("cannot negotiate with {endpoint}: {reason}; the remote SSH service likely needs an upgrade")]
    Incompatible {
        endpoint: HostIdentity,
        reason: String,
    },

    #[error("no usable authentication material for {user}@{endpoint}: {reason}")]
    NoAuthMaterial {
        endpoint: HostIdentity,
        user: String,
        reason: String,
    },

    #[error("failed to open channel: {reason}")]
    Channel { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
