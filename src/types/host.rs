// ABOUTME: Validated endpoint types for remote hosts.
// ABOUTME: Parses targets like "host", "user@host", "user@host:port".

use std::fmt;
use thiserror::Error;

/// A remote SSH endpoint: hostname plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostIdentity {
    pub hostname: String,
    pub port: u16,
}

impl HostIdentity {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ParseTargetError {
    #[error("target cannot be empty")]
    Empty,

    #[error("hostname cannot be empty")]
    EmptyHost,

    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// A connection target in `[user@]host[:port]` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user: Option<String>,
    pub host: HostIdentity,
}

impl Target {
    pub fn parse(s: &str) -> Result<Self, ParseTargetError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseTargetError::Empty);
        }

        let (user_part, rest) = if let Some(at_pos) = s.find('@') {
            (Some(&s[..at_pos]), &s[at_pos + 1..])
        } else {
            (None, s)
        };

        let (host, port) = if let Some(colon_pos) = rest.rfind(':') {
            let port_str = &rest[colon_pos + 1..];
            let port = port_str
                .parse::<u16>()
                .map_err(|_| ParseTargetError::InvalidPort(port_str.to_string()))?;
            (&rest[..colon_pos], port)
        } else {
            (rest, 22)
        };

        if host.is_empty() {
            return Err(ParseTargetError::EmptyHost);
        }

        Ok(Target {
            user: user_part
                .filter(|user| !user.is_empty())
                .map(|user| user.to_string()),
            host: HostIdentity::new(host, port),
        })
    }
}
