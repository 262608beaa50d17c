// ABOUTME: Error types for remote command execution.
// ABOUTME: Distinguishes connection faults from elevation negotiation failures.

use crate::connect;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] connect::Error),

    #[error("user {user} does not exist on {host}")]
    UserNotFound { user: String, host: String },

    #[error("connection closed on {host} while waiting for the elevation password prompt")]
    ClosedEarly { host: String },

    #[error("timed out on {host} waiting for the elevation password prompt; output so far: {partial:?}")]
    TimedOut { host: String, partial: String },

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,
}
