// ABOUTME: Remote command execution with optional privilege elevation.
// ABOUTME: Runs commands over a session channel and collects output and exit status.

mod elevate;
mod error;
mod prompt;

pub use elevate::{ElevatedCommand, Elevator, Sudo};
pub use error::{Error, Result};
pub use prompt::{PromptScanner, ScanState};

use crate::connect::Session;
use crate::transport::{ChannelEvent, CommandChannel};
use std::fmt;
use std::time::Duration;

/// Substring sudo emits when the requested account does not exist.
const UNKNOWN_USER_MARKER: &str = "unknown user";

const DEFAULT_TERM: &str = "vt100";
const DEFAULT_COLS: u32 = 80;
const DEFAULT_ROWS: u32 = 24;

/// Terminal parameters for elevated channels, taken from the local
/// environment with conservative fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyParams {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

impl PtyParams {
    pub fn from_env() -> Self {
        let term = std::env::var("TERM")
            .ok()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TERM.to_string());
        Self {
            term,
            cols: env_dimension("COLUMNS", DEFAULT_COLS),
            rows: env_dimension("LINES", DEFAULT_ROWS),
        }
    }
}

fn env_dimension(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

/// What to run and how.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub command: String,
    pub shell: Option<String>,
    pub elevation: Option<Elevation>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: None,
            elevation: None,
        }
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = Some(elevation);
        self
    }
}

/// Request to run the command as another user.
#[derive(Clone)]
pub struct Elevation {
    pub user: String,
    secret: Option<String>,
}

impl Elevation {
    pub fn to_root() -> Self {
        Self::to_user("root")
    }

    pub fn to_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: None,
        }
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for Elevation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Elevation")
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything a finished command produced.
///
/// A non-zero exit status is a result, not an error; callers decide what
/// it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_status: u32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// How long to wait for the elevation password prompt.
    pub prompt_timeout: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            prompt_timeout: Duration::from_secs(10),
        }
    }
}

/// Runs commands on an established session.
pub struct Executor {
    options: ExecOptions,
    elevator: Box<dyn Elevator>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::with_options(ExecOptions::default())
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExecOptions) -> Self {
        Self {
            options,
            elevator: Box::new(Sudo::new()),
        }
    }

    pub fn elevator(mut self, elevator: Box<dyn Elevator>) -> Self {
        self.elevator = elevator;
        self
    }

    /// Run a command on the session and collect its complete output.
    pub async fn run(&self, session: &Session, request: &ExecRequest) -> Result<ExecOutput> {
        let mut channel = session.open_channel().await?;
        match &request.elevation {
            Some(elevation) => {
                self.run_elevated(session, channel.as_mut(), request, elevation)
                    .await
            }
            None => self.run_direct(channel.as_mut(), request).await,
        }
    }

    async fn run_direct(
        &self,
        channel: &mut dyn CommandChannel,
        request: &ExecRequest,
    ) -> Result<ExecOutput> {
        let command = match &request.shell {
            Some(shell) => format!("{shell} -c {}", elevate::shell_quote(&request.command)),
            None => request.command.clone(),
        };
        tracing::debug!(command = %command, "exec");
        channel.exec(&command).await?;
        collect_output(channel).await
    }

    async fn run_elevated(
        &self,
        session: &Session,
        channel: &mut dyn CommandChannel,
        request: &ExecRequest,
        elevation: &Elevation,
    ) -> Result<ExecOutput> {
        let pty = PtyParams::from_env();
        channel.request_pty(&pty.term, pty.cols, pty.rows).await?;

        let wrapped = self
            .elevator
            .wrap(&request.command, &elevation.user, request.shell.as_deref());
        tracing::debug!(command = %wrapped.command, user = %elevation.user, "exec (elevated)");
        channel.exec(&wrapped.command).await?;

        match &elevation.secret {
            Some(secret) => {
                let mut scanner = PromptScanner::new(wrapped.prompt.as_bytes());
                self.await_prompt(session, channel, &mut scanner).await?;
                channel.send(format!("{secret}\n").as_bytes()).await?;
                scanner.secret_injected();
                let output = collect_output(channel).await?;
                scanner.complete();
                Ok(output)
            }
            None => collect_output(channel).await,
        }
    }

    /// Wait until the channel output ends with the prompt marker.
    async fn await_prompt(
        &self,
        session: &Session,
        channel: &mut dyn CommandChannel,
        scanner: &mut PromptScanner,
    ) -> Result<()> {
        loop {
            let event = tokio::time::timeout(self.options.prompt_timeout, channel.next_event())
                .await
                .map_err(|_| Error::TimedOut {
                    host: session.target().to_string(),
                    partial: scanner.transcript_lossy(),
                })?;
            match event {
                Some(ChannelEvent::Stdout(chunk)) | Some(ChannelEvent::Stderr(chunk)) => {
                    if scanner.feed(&chunk) == ScanState::PromptSatisfied {
                        return Ok(());
                    }
                }
                Some(ChannelEvent::ExitStatus(_)) => {
                    // Exit status alone does not end the wait; the close does.
                }
                Some(ChannelEvent::Eof) | None => {
                    return Err(closed_during_prompt(session, scanner));
                }
            }
        }
    }
}

/// Classify a channel that closed before ever showing the prompt.
fn closed_during_prompt(session: &Session, scanner: &PromptScanner) -> Error {
    let transcript = scanner.transcript_lossy();
    if transcript.contains(UNKNOWN_USER_MARKER) {
        Error::UserNotFound {
            user: extract_unknown_user(&transcript),
            host: session.target().to_string(),
        }
    } else {
        Error::ClosedEarly {
            host: session.target().to_string(),
        }
    }
}

/// Pull the account name out of sudo's "unknown user" message.
fn extract_unknown_user(transcript: &str) -> String {
    transcript
        .split(UNKNOWN_USER_MARKER)
        .nth(1)
        .map(|rest| {
            rest.trim_start_matches([':', ' '])
                .split(|c: char| c.is_whitespace())
                .next()
                .unwrap_or("")
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Drain the channel until it reports both exit status and EOF.
async fn collect_output(channel: &mut dyn CommandChannel) -> Result<ExecOutput> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = 0;
    let mut got_exit_status = false;
    let mut got_eof = false;

    loop {
        match channel.next_event().await {
            Some(ChannelEvent::Stdout(chunk)) => stdout.extend_from_slice(&chunk),
            Some(ChannelEvent::Stderr(chunk)) => stderr.extend_from_slice(&chunk),
            Some(ChannelEvent::ExitStatus(status)) => {
                exit_status = status;
                got_exit_status = true;
                if got_eof {
                    break;
                }
            }
            Some(ChannelEvent::Eof) => {
                got_eof = true;
                if got_exit_status {
                    break;
                }
            }
            None => break,
        }
    }

    if !got_exit_status {
        return Err(Error::ChannelClosed);
    }

    Ok(ExecOutput {
        exit_status,
        stdout,
        stderr,
    })
}
