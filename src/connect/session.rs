// ABOUTME: Connection parameters and the shared per-host session.
// ABOUTME: A session owns its transport link and a lazily opened file transfer handle.

use super::error::Result;
use crate::transfer;
use crate::transport::{CommandChannel, FileTransfer, TransportSession};
use crate::trust::TrustStore;
use crate::types::HostIdentity;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Options that tune connection behavior without identifying the target.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Timeout for the TCP connect plus SSH handshake.
    pub connect_timeout: Duration,
    /// When true, the system trust file is loaded before connecting so
    /// previously recorded host keys are recognized.
    pub host_key_checking: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            host_key_checking: true,
        }
    }
}

/// Everything needed to establish one authenticated connection.
#[derive(Clone)]
pub struct ConnectParams {
    pub target: HostIdentity,
    pub user: String,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
    pub options: ConnectOptions,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("target", &self.target)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_file", &self.key_file)
            .field("options", &self.options)
            .finish()
    }
}

impl ConnectParams {
    pub fn new(target: HostIdentity, user: impl Into<String>) -> Self {
        Self {
            target,
            user: user.into(),
            password: None,
            key_file: None,
            options: ConnectOptions::default(),
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn host_key_checking(mut self, enabled: bool) -> Self {
        self.options.host_key_checking = enabled;
        self
    }
}

/// A live, authenticated connection to one remote host.
///
/// Sessions are shared: the pool hands out `Arc<Session>` and multiple tasks
/// may open channels and run commands concurrently. The file transfer handle
/// is opened on first use and reused afterwards.
pub struct Session {
    target: HostIdentity,
    user: String,
    transport: Box<dyn TransportSession>,
    files: Mutex<Option<Arc<dyn FileTransfer>>>,
    trust: Arc<TrustStore>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("user", &self.user)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        target: HostIdentity,
        user: String,
        transport: Box<dyn TransportSession>,
        trust: Arc<TrustStore>,
    ) -> Self {
        Self {
            target,
            user,
            transport,
            files: Mutex::new(None),
            trust,
            closed: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> &HostIdentity {
        &self.target
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Open a fresh command channel on this connection.
    pub async fn open_channel(&self) -> Result<Box<dyn CommandChannel>> {
        self.transport.open_channel().await
    }

    /// The file transfer handle for this connection, opened on first use.
    pub async fn file_transfer(
        &self,
    ) -> std::result::Result<Arc<dyn FileTransfer>, transfer::Error> {
        let mut slot = self.files.lock().await;
        if let Some(files) = slot.as_ref() {
            return Ok(Arc::clone(files));
        }

        tracing::debug!(host = %self.target, "opening file transfer channel");
        let files: Arc<dyn FileTransfer> = Arc::from(self.transport.open_file_transfer().await?);
        *slot = Some(Arc::clone(&files));
        Ok(files)
    }

    /// Close the connection: flush newly trusted host keys, then disconnect.
    ///
    /// Idempotent; only the first call does work. Trust persistence failures
    /// are logged, not surfaced.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.files.lock().await.take();

        let trust = Arc::clone(&self.trust);
        match tokio::task::spawn_blocking(move || trust.persist()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(host = %self.target, error = %e, "failed to persist host keys");
            }
            Err(e) => {
                tracing::warn!(host = %self.target, error = %e, "host key persistence task failed");
            }
        }

        self.transport.close().await
    }
}
