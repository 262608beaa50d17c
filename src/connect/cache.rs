// ABOUTME: Connection pool keyed by (host, user).
// ABOUTME: Guarantees one handshake per pair even under concurrent first use.

use super::error::Result;
use super::session::{ConnectParams, Session};
use crate::transport::Transport;
use crate::trust::TrustStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cache key: hostname plus user. Port is deliberately not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    host: String,
    user: String,
}

impl CacheKey {
    fn new(host: &str, user: &str) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
        }
    }
}

/// Shares one authenticated session per (host, user) pair.
///
/// The map lock is held across the handshake: a second caller for the same
/// pair waits for the first handshake instead of starting its own, and a
/// failed handshake leaves no entry behind.
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    trust: Arc<TrustStore>,
    sessions: Mutex<HashMap<CacheKey, Arc<Session>>>,
}

impl ConnectionPool {
    pub fn new(transport: Arc<dyn Transport>, trust: Arc<TrustStore>) -> Self {
        Self {
            transport,
            trust,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The trust store consulted for host keys on every connection.
    pub fn trust(&self) -> &Arc<TrustStore> {
        &self.trust
    }

    /// Return the cached session for `(host, user)`, connecting if absent.
    ///
    /// Differing credentials or options in `params` do not create a second
    /// session for a pair that is already connected.
    pub async fn acquire(&self, params: ConnectParams) -> Result<Arc<Session>> {
        let key = CacheKey::new(&params.target.hostname, &params.user);

        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&key) {
            tracing::debug!(
                host = %params.target,
                user = %params.user,
                "reusing cached connection"
            );
            return Ok(Arc::clone(session));
        }

        if params.options.host_key_checking {
            if let Err(e) = self.trust.load_system() {
                tracing::warn!(error = %e, "failed to load the system trust file");
            }
        }

        let transport_session = self
            .transport
            .open_session(&params, Arc::clone(&self.trust))
            .await?;

        let session = Arc::new(Session::new(
            params.target,
            params.user,
            transport_session,
            Arc::clone(&self.trust),
        ));
        sessions.insert(key, Arc::clone(&session));
        Ok(session)
    }

    /// Drop the cached session for `(host, user)` and close it.
    ///
    /// Does nothing when no session is cached for the pair. Close failures
    /// are logged, not surfaced.
    pub async fn release(&self, host: &str, user: &str) {
        let key = CacheKey::new(host, user);
        let session = self.sessions.lock().await.remove(&key);
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                tracing::warn!(host = %session.target(), error = %e, "session close failed");
            }
        }
    }

    /// Release every cached session.
    pub async fn release_all(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            if let Err(e) = session.close().await {
                tracing::warn!(host = %session.target(), error = %e, "session close failed");
            }
        }
    }
}
