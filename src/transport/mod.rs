// ABOUTME: Transport capability traits decoupling the engine from the SSH implementation.
// ABOUTME: Sessions, command channels, and file transfer are all trait objects.

mod russh;

pub use self::russh::RusshTransport;

use crate::connect::{self, ConnectParams};
use crate::transfer;
use crate::trust::TrustStore;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// One event observed on a command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    /// The remote closed its write side; no more output will arrive.
    Eof,
}

/// Opens authenticated sessions to remote hosts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open an authenticated session to the target in `params`, consulting
    /// `trust` for host key decisions.
    async fn open_session(
        &self,
        params: &ConnectParams,
        trust: Arc<TrustStore>,
    ) -> Result<Box<dyn TransportSession>, connect::Error>;
}

/// An authenticated connection to one remote host.
///
/// Implementations must support opening channels concurrently from multiple
/// tasks; a session is shared by every caller that acquired it from the pool.
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn open_channel(&self) -> Result<Box<dyn CommandChannel>, connect::Error>;

    async fn open_file_transfer(&self) -> Result<Box<dyn FileTransfer>, transfer::Error>;

    /// Close the underlying connection. Must not hang on an unresponsive peer.
    async fn close(&self) -> Result<(), connect::Error>;
}

/// One remote command execution channel.
#[async_trait]
pub trait CommandChannel: Send {
    /// Allocate a PTY on the channel before `exec`.
    async fn request_pty(&mut self, term: &str, cols: u32, rows: u32)
    -> Result<(), connect::Error>;

    /// Start a command on the channel.
    async fn exec(&mut self, command: &str) -> Result<(), connect::Error>;

    /// Write to the remote process's stdin.
    async fn send(&mut self, data: &[u8]) -> Result<(), connect::Error>;

    /// Next channel event, or None once the channel has closed.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}

/// File transfer over an open session.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn put(&self, local: &Path, remote: &str) -> Result<(), transfer::Error>;

    async fn get(&self, remote: &str, local: &Path) -> Result<(), transfer::Error>;
}
