// ABOUTME: Scriptable in-memory transport for integration tests.
// ABOUTME: Records every call and replays scripted channel events.

use async_trait::async_trait;
use legate::connect::{self, ConnectParams, ConnectionPool};
use legate::transfer;
use legate::transport::{ChannelEvent, CommandChannel, FileTransfer, Transport, TransportSession};
use legate::trust::TrustStore;
use legate::types::HostIdentity;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Events one fake channel replays, split around the first stdin write.
pub struct ChannelScript {
    pub before_write: Vec<ChannelEvent>,
    pub after_write: Vec<ChannelEvent>,
    /// Hang instead of closing once `before_write` is drained.
    pub stall_when_drained: bool,
}

impl ChannelScript {
    /// A channel that prints `stdout` and exits cleanly.
    pub fn succeed_with(stdout: &[u8]) -> Self {
        Self {
            before_write: vec![
                ChannelEvent::Stdout(stdout.to_vec()),
                ChannelEvent::ExitStatus(0),
                ChannelEvent::Eof,
            ],
            after_write: Vec::new(),
            stall_when_drained: false,
        }
    }
}

/// Everything the fake transport observed.
#[derive(Default)]
pub struct Recorder {
    pub sessions_opened: AtomicUsize,
    pub channels_opened: AtomicUsize,
    pub transfers_opened: AtomicUsize,
    pub closed: AtomicBool,
    pub commands: Mutex<Vec<String>>,
    pub pty_requests: Mutex<Vec<(String, u32, u32)>>,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub puts: Mutex<Vec<(PathBuf, String)>>,
    pub gets: Mutex<Vec<(String, PathBuf)>>,
}

pub struct FakeTransport {
    pub recorder: Arc<Recorder>,
    scripts: Arc<Mutex<VecDeque<ChannelScript>>>,
    fail_handshake: AtomicBool,
    handshake_delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            recorder: Arc::new(Recorder::default()),
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            fail_handshake: AtomicBool::new(false),
            handshake_delay: Mutex::new(None),
        })
    }

    /// Queue a script for the next channel opened on any session.
    pub fn script_channel(&self, script: ChannelScript) {
        self.scripts.lock().push_back(script);
    }

    pub fn fail_next_handshake(&self) {
        self.fail_handshake.store(true, Ordering::SeqCst);
    }

    pub fn delay_handshakes(&self, delay: Duration) {
        *self.handshake_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_session(
        &self,
        params: &ConnectParams,
        _trust: Arc<TrustStore>,
    ) -> Result<Box<dyn TransportSession>, connect::Error> {
        let delay = *self.handshake_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_handshake.swap(false, Ordering::SeqCst) {
            return Err(connect::Error::Authentication {
                endpoint: params.target.clone(),
                user: params.user.clone(),
            });
        }
        self.recorder.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            recorder: Arc::clone(&self.recorder),
            scripts: Arc::clone(&self.scripts),
        }))
    }
}

struct FakeSession {
    recorder: Arc<Recorder>,
    scripts: Arc<Mutex<VecDeque<ChannelScript>>>,
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn open_channel(&self) -> Result<Box<dyn CommandChannel>, connect::Error> {
        self.recorder.channels_opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| ChannelScript::succeed_with(b""));
        Ok(Box::new(FakeChannel {
            recorder: Arc::clone(&self.recorder),
            before_write: script.before_write.into(),
            after_write: script.after_write.into(),
            stall_when_drained: script.stall_when_drained,
            wrote: false,
        }))
    }

    async fn open_file_transfer(&self) -> Result<Box<dyn FileTransfer>, transfer::Error> {
        self.recorder.transfers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeFiles {
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn close(&self) -> Result<(), connect::Error> {
        self.recorder.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeChannel {
    recorder: Arc<Recorder>,
    before_write: VecDeque<ChannelEvent>,
    after_write: VecDeque<ChannelEvent>,
    stall_when_drained: bool,
    wrote: bool,
}

#[async_trait]
impl CommandChannel for FakeChannel {
    async fn request_pty(
        &mut self,
        term: &str,
        cols: u32,
        rows: u32,
    ) -> Result<(), connect::Error> {
        self.recorder
            .pty_requests
            .lock()
            .push((term.to_string(), cols, rows));
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<(), connect::Error> {
        self.recorder.commands.lock().push(command.to_string());
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), connect::Error> {
        self.recorder.writes.lock().push(data.to_vec());
        self.wrote = true;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.before_write.pop_front() {
            return Some(event);
        }
        if self.wrote {
            return self.after_write.pop_front();
        }
        if self.stall_when_drained {
            std::future::pending::<()>().await;
        }
        None
    }
}

struct FakeFiles {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl FileTransfer for FakeFiles {
    async fn put(&self, local: &Path, remote: &str) -> Result<(), transfer::Error> {
        self.recorder
            .puts
            .lock()
            .push((local.to_path_buf(), remote.to_string()));
        Ok(())
    }

    async fn get(&self, remote: &str, local: &Path) -> Result<(), transfer::Error> {
        self.recorder
            .gets
            .lock()
            .push((remote.to_string(), local.to_path_buf()));
        Ok(())
    }
}

/// A pool wired to a fake transport, with trust state in a temp dir.
pub fn fake_pool() -> (Arc<FakeTransport>, ConnectionPool, tempfile::TempDir) {
    super::init_tracing();
    let transport = FakeTransport::new();
    let dir = tempfile::tempdir().expect("create temp dir");
    let trust = Arc::new(TrustStore::new(dir.path().join("known_hosts")));
    let pool = ConnectionPool::new(Arc::clone(&transport) as Arc<dyn Transport>, trust);
    (transport, pool, dir)
}

pub fn test_params(host: &str, user: &str) -> ConnectParams {
    ConnectParams::new(HostIdentity::new(host, 22), user).host_key_checking(false)
}
