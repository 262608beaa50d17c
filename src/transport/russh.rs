// ABOUTME: Production SSH transport built on russh.
// ABOUTME: Handles handshake, authentication, host key callbacks, channels, and SFTP.

use super::{ChannelEvent, CommandChannel, FileTransfer, Transport, TransportSession};
use crate::connect::{ConnectParams, Error};
use crate::transfer;
use crate::trust::TrustStore;
use crate::types::HostIdentity;
use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

/// How long to wait for a clean disconnect before dropping the connection.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Key files tried when no explicit key, password, or agent is available.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

#[derive(Debug, Default)]
pub struct RusshTransport;

impl RusshTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open_session(
        &self,
        params: &ConnectParams,
        trust: Arc<TrustStore>,
    ) -> Result<Box<dyn TransportSession>, Error> {
        let auth_method = resolve_auth_method(params).await?;

        let russh_config = Config {
            // Cached sessions sit idle between commands; keepalives hold
            // them open.
            keepalive_interval: Some(Duration::from_secs(15)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = TrustHandler {
            target: params.target.clone(),
            trust,
        };

        tracing::debug!(
            host = %params.target,
            user = %params.user,
            "establishing connection"
        );

        let connecting = client::connect(
            Arc::new(russh_config),
            (params.target.hostname.as_str(), params.target.port),
            handler,
        );
        let mut handle = match tokio::time::timeout(params.options.connect_timeout, connecting)
            .await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(classify_connect_error(params, &e)),
            Err(_) => {
                return Err(Error::Connection {
                    endpoint: params.target.clone(),
                    user: params.user.clone(),
                    reason: format!("timed out after {:?}", params.options.connect_timeout),
                });
            }
        };

        let authenticated = authenticate(&mut handle, params, auth_method).await?;
        if !authenticated {
            return Err(Error::Authentication {
                endpoint: params.target.clone(),
                user: params.user.clone(),
            });
        }

        Ok(Box::new(RusshSession {
            target: params.target.clone(),
            user: params.user.clone(),
            handle: Arc::new(handle),
        }))
    }
}

/// Map a russh connect failure onto the connection error taxonomy.
fn classify_connect_error(params: &ConnectParams, e: &russh::Error) -> Error {
    let message = e.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("no common") {
        // Algorithm negotiation failed, typically an outdated server.
        Error::Incompatible {
            endpoint: params.target.clone(),
            reason: message,
        }
    } else if lowered.contains("unknown key") {
        Error::HostKeyRejected {
            endpoint: params.target.clone(),
        }
    } else if message.contains("Connection refused") {
        Error::Connection {
            endpoint: params.target.clone(),
            user: params.user.clone(),
            reason: "connection refused".to_string(),
        }
    } else {
        Error::Connection {
            endpoint: params.target.clone(),
            user: params.user.clone(),
            reason: message,
        }
    }
}

fn protocol_error(params: &ConnectParams, e: russh::Error) -> Error {
    Error::Connection {
        endpoint: params.target.clone(),
        user: params.user.clone(),
        reason: e.to_string(),
    }
}

/// Authentication method resolved from the connection parameters.
enum AuthMethod {
    Password(String),
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// Resolve which authentication method to use.
///
/// Precedence: explicit key file, then password, then SSH agent, then
/// default key locations.
async fn resolve_auth_method(params: &ConnectParams) -> Result<AuthMethod, Error> {
    if let Some(key_path) = &params.key_file {
        let key = load_secret_key(key_path, None).map_err(|e| {
            let reason = e.to_string();
            if reason.to_lowercase().contains("encrypted") {
                Error::EncryptedKey {
                    path: key_path.clone(),
                }
            } else {
                Error::KeyLoadFailed {
                    path: key_path.clone(),
                    reason,
                }
            }
        })?;
        return Ok(AuthMethod::KeyFile(Arc::new(key)));
    }

    if let Some(password) = &params.password {
        return Ok(AuthMethod::Password(password.clone()));
    }

    if let Ok(agent) = AgentClient::connect_env().await {
        return Ok(AuthMethod::Agent(agent));
    }

    let home = std::env::var("HOME").map_err(|_| Error::NoAuthMaterial {
        endpoint: params.target.clone(),
        user: params.user.clone(),
        reason: "no password or key given, SSH agent unavailable, HOME not set".to_string(),
    })?;

    for name in DEFAULT_KEY_NAMES {
        let path = format!("{home}/.ssh/{name}");
        if let Ok(key) = load_secret_key(&path, None) {
            return Ok(AuthMethod::KeyFile(Arc::new(key)));
        }
    }

    Err(Error::NoAuthMaterial {
        endpoint: params.target.clone(),
        user: params.user.clone(),
        reason: "no password or key given, SSH agent unavailable, no default keys found"
            .to_string(),
    })
}

/// Authenticate the freshly connected handle.
async fn authenticate(
    handle: &mut Handle<TrustHandler>,
    params: &ConnectParams,
    auth_method: AuthMethod,
) -> Result<bool, Error> {
    match auth_method {
        AuthMethod::Password(password) => {
            let result = handle
                .authenticate_password(&params.user, &password)
                .await
                .map_err(|e| protocol_error(params, e))?;
            Ok(result.success())
        }
        AuthMethod::Agent(mut agent) => {
            let keys = agent
                .request_identities()
                .await
                .map_err(|e| Error::NoAuthMaterial {
                    endpoint: params.target.clone(),
                    user: params.user.clone(),
                    reason: format!("failed to list agent keys: {e}"),
                })?;

            if keys.is_empty() {
                return Err(Error::NoAuthMaterial {
                    endpoint: params.target.clone(),
                    user: params.user.clone(),
                    reason: "no keys in SSH agent".to_string(),
                });
            }

            for key in &keys {
                match handle
                    .authenticate_publickey_with(&params.user, key.clone(), None, &mut agent)
                    .await
                {
                    Ok(result) if result.success() => return Ok(true),
                    _ => continue,
                }
            }
            Ok(false)
        }
        AuthMethod::KeyFile(key) => {
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| protocol_error(params, e))?
                .flatten();

            let result = handle
                .authenticate_publickey(&params.user, PrivateKeyWithHashAlg::new(key, hash_alg))
                .await
                .map_err(|e| protocol_error(params, e))?;

            Ok(result.success())
        }
    }
}

/// russh handler that routes host key checks through the trust store.
struct TrustHandler {
    target: HostIdentity,
    trust: Arc<TrustStore>,
}

impl client::Handler for TrustHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match server_public_key.to_openssh() {
            Ok(openssh) => {
                let mut parts = openssh.split_whitespace();
                if let (Some(key_type), Some(key_base64)) = (parts.next(), parts.next()) {
                    return Ok(self.trust.decide(&self.target, key_type, key_base64));
                }
                tracing::warn!(
                    host = %self.target,
                    "host key encoding is missing fields; accepting without recording"
                );
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(
                    host = %self.target,
                    error = %e,
                    "failed to encode host key; accepting without recording"
                );
                Ok(true)
            }
        }
    }
}

/// An established connection plus the metadata error paths need.
struct RusshSession {
    target: HostIdentity,
    user: String,
    handle: Arc<Handle<TrustHandler>>,
}

#[async_trait]
impl TransportSession for RusshSession {
    async fn open_channel(&self) -> Result<Box<dyn CommandChannel>, Error> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Channel {
                reason: e.to_string(),
            })?;
        Ok(Box::new(RusshChannel { channel }))
    }

    async fn open_file_transfer(&self) -> Result<Box<dyn FileTransfer>, transfer::Error> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| transfer::Error::ChannelOpen {
                reason: e.to_string(),
            })?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| transfer::Error::ChannelOpen {
                reason: e.to_string(),
            })?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| transfer::Error::ChannelOpen {
                reason: e.to_string(),
            })?;
        Ok(Box::new(SftpTransfer { sftp }))
    }

    async fn close(&self) -> Result<(), Error> {
        let disconnect = self.handle.disconnect(Disconnect::ByApplication, "", "en");
        match tokio::time::timeout(CLOSE_TIMEOUT, disconnect).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Connection {
                endpoint: self.target.clone(),
                user: self.user.clone(),
                reason: format!("disconnect failed: {e}"),
            }),
            Err(_) => {
                tracing::warn!(host = %self.target, "disconnect timed out; dropping connection");
                Ok(())
            }
        }
    }
}

struct RusshChannel {
    channel: russh::Channel<client::Msg>,
}

#[async_trait]
impl CommandChannel for RusshChannel {
    async fn request_pty(&mut self, term: &str, cols: u32, rows: u32) -> Result<(), Error> {
        self.channel
            .request_pty(true, term, cols, rows, 0, 0, &[])
            .await
            .map_err(|e| Error::Channel {
                reason: format!("pty request failed: {e}"),
            })
    }

    async fn exec(&mut self, command: &str) -> Result<(), Error> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Channel {
                reason: format!("exec request failed: {e}"),
            })
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        self.channel.data(data).await.map_err(|e| Error::Channel {
            reason: format!("write failed: {e}"),
        })
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } => return Some(ChannelEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    return Some(ChannelEvent::Stderr(data.to_vec()));
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ChannelEvent::ExitStatus(exit_status));
                }
                ChannelMsg::Eof => return Some(ChannelEvent::Eof),
                ChannelMsg::Close => return None,
                _ => {}
            }
        }
    }
}

struct SftpTransfer {
    sftp: SftpSession,
}

fn io_error(path: impl std::fmt::Display, e: impl std::fmt::Display) -> transfer::Error {
    transfer::Error::Io {
        path: path.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    async fn put(&self, local: &Path, remote: &str) -> Result<(), transfer::Error> {
        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| io_error(local.display(), e))?;
        let mut dest = self
            .sftp
            .create(remote)
            .await
            .map_err(|e| io_error(remote, e))?;
        tokio::io::copy(&mut source, &mut dest)
            .await
            .map_err(|e| io_error(remote, e))?;
        dest.shutdown().await.map_err(|e| io_error(remote, e))?;
        Ok(())
    }

    async fn get(&self, remote: &str, local: &Path) -> Result<(), transfer::Error> {
        let mut source = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| io_error(remote, e))?;
        let mut dest = tokio::fs::File::create(local)
            .await
            .map_err(|e| io_error(local.display(), e))?;
        tokio::io::copy(&mut source, &mut dest)
            .await
            .map_err(|e| io_error(local.display(), e))?;
        dest.flush().await.map_err(|e| io_error(local.display(), e))?;
        Ok(())
    }
}
