// ABOUTME: Top-level error type with SNAFU pattern.
// ABOUTME: Unifies subsystem errors and classifies them for programmatic handling.

use snafu::Snafu;

use crate::{connect, exec, transfer, trust};

/// Unified error for every operation the crate exposes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Connect { source: connect::Error },

    #[snafu(display("{source}"))]
    Exec { source: exec::Error },

    #[snafu(display("{source}"))]
    Transfer { source: transfer::Error },

    #[snafu(display("{source}"))]
    Trust { source: trust::Error },

    #[snafu(display("{message}"))]
    Usage { message: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invocation or credential material problems, fixable locally.
    Configuration,
    /// The remote host rejected the offered credentials.
    Authentication,
    /// The remote host could not be reached or the handshake failed.
    Connection,
    /// An established connection refused or dropped a channel.
    Channel,
    /// Privilege elevation negotiation failed.
    Elevation,
    /// A file could not be copied.
    Transfer,
    /// Newly trusted host keys could not be saved.
    TrustPersistence,
}

impl Error {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect { source } => connect_kind(source),
            Error::Exec { source } => match source {
                exec::Error::Connection(source) => connect_kind(source),
                exec::Error::UserNotFound { .. }
                | exec::Error::ClosedEarly { .. }
                | exec::Error::TimedOut { .. } => ErrorKind::Elevation,
                exec::Error::ChannelClosed => ErrorKind::Channel,
            },
            Error::Transfer { .. } => ErrorKind::Transfer,
            Error::Trust { .. } => ErrorKind::TrustPersistence,
            Error::Usage { .. } => ErrorKind::Configuration,
        }
    }
}

fn connect_kind(source: &connect::Error) -> ErrorKind {
    match source {
        connect::Error::Authentication { .. }
        | connect::Error::EncryptedKey { .. }
        | connect::Error::KeyLoadFailed { .. } => ErrorKind::Authentication,
        connect::Error::NoAuthMaterial { .. } => ErrorKind::Configuration,
        connect::Error::Channel { .. } => ErrorKind::Channel,
        connect::Error::Connection { .. }
        | connect::Error::HostKeyRejected { .. }
        | connect::Error::Incompatible { .. } => ErrorKind::Connection,
    }
}

impl From<connect::Error> for Error {
    fn from(source: connect::Error) -> Self {
        Error::Connect { source }
    }
}

impl From<exec::Error> for Error {
    fn from(source: exec::Error) -> Self {
        Error::Exec { source }
    }
}

impl From<transfer::Error> for Error {
    fn from(source: transfer::Error) -> Self {
        Error::Transfer { source }
    }
}

impl From<trust::Error> for Error {
    fn from(source: trust::Error) -> Self {
        Error::Trust { source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
