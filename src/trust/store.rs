// ABOUTME: Accept-and-remember host key trust store backed by a known-hosts style file.
// ABOUTME: Persists newly accepted keys under an exclusive lock, preserving existing lines.

use super::error::{Error, Result};
use crate::types::HostIdentity;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Where a trusted key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Loaded from the trust file.
    PreExisting,
    /// First seen and accepted during this process's lifetime.
    AcceptedThisSession,
}

/// A single trusted host key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustKey {
    pub key_type: String,
    pub key_base64: String,
    pub origin: KeyOrigin,
}

#[derive(Debug, Clone)]
struct TrustEntry {
    hostname: String,
    key: TrustKey,
}

/// In-memory set of trusted host keys, backed by a file of
/// `<hostname> <key-type> <base64-key>` lines.
///
/// `decide` accepts every key it is offered and records unseen ones as newly
/// accepted. `persist` writes those back under an exclusive lock on a sibling
/// lock file, re-reading the trust file first so concurrent processes cannot
/// lose each other's keys. Existing file lines are rewritten verbatim; new
/// keys are appended after them.
pub struct TrustStore {
    path: PathBuf,
    entries: Mutex<Vec<TrustEntry>>,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("path", &self.path)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Default trust file location: `~/.ssh/known_hosts`.
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| Error::NoHome)?;
        Ok(PathBuf::from(home).join(".ssh").join("known_hosts"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load entries from the backing file, merging them as pre-existing keys.
    ///
    /// A missing file is not an error. Keys already in memory keep their
    /// origin. Returns the number of entries added.
    pub fn load_system(&self) -> Result<usize> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let mut entries = self.entries.lock();
        let mut added = 0;
        for line in parse_entries(&content) {
            if contains(&entries, &line.hostname, &line.key_type, &line.key_base64) {
                continue;
            }
            entries.push(TrustEntry {
                hostname: line.hostname,
                key: TrustKey {
                    key_type: line.key_type,
                    key_base64: line.key_base64,
                    origin: KeyOrigin::PreExisting,
                },
            });
            added += 1;
        }
        Ok(added)
    }

    /// Record a host key, accepting it unconditionally.
    ///
    /// Unseen keys are tagged as accepted this session; already-known keys
    /// keep their original tag. Returns whether the key is trusted (always
    /// true under this policy).
    pub fn decide(&self, host: &HostIdentity, key_type: &str, key_base64: &str) -> bool {
        let mut entries = self.entries.lock();
        if contains(&entries, &host.hostname, key_type, key_base64) {
            return true;
        }

        tracing::debug!(host = %host, key_type, "accepting previously unseen host key");
        entries.push(TrustEntry {
            hostname: host.hostname.clone(),
            key: TrustKey {
                key_type: key_type.to_string(),
                key_base64: key_base64.to_string(),
                origin: KeyOrigin::AcceptedThisSession,
            },
        });
        true
    }

    /// All trusted keys recorded for a hostname, in acceptance order.
    pub fn keys_for(&self, hostname: &str) -> Vec<TrustKey> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.hostname == hostname)
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Number of keys accepted during this process's lifetime.
    pub fn newly_accepted(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.key.origin == KeyOrigin::AcceptedThisSession)
            .count()
    }

    /// Write newly accepted keys to the backing file.
    ///
    /// No-op when nothing new was accepted; the file is not even opened.
    /// Otherwise takes the exclusive file lock, re-reads the file to pick up
    /// concurrent writers, rewrites every existing line verbatim, and appends
    /// the keys not already on disk.
    pub fn persist(&self) -> Result<()> {
        let snapshot: Vec<TrustEntry> = self.entries.lock().clone();
        if !snapshot
            .iter()
            .any(|entry| entry.key.origin == KeyOrigin::AcceptedThisSession)
        {
            return Ok(());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let _guard = FileLock::exclusive(&lock_path(&self.path))?;

        let disk = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        let on_disk = parse_entries(&disk);

        let mut output = String::new();
        for line in disk.lines() {
            output.push_str(line);
            output.push('\n');
        }

        // Pre-existing keys that vanished from the file since we loaded them,
        // then the keys accepted this session, skipping anything a concurrent
        // process already wrote.
        for origin in [KeyOrigin::PreExisting, KeyOrigin::AcceptedThisSession] {
            for entry in snapshot.iter().filter(|e| e.key.origin == origin) {
                let already_on_disk = on_disk.iter().any(|line| {
                    line.hostname == entry.hostname
                        && line.key_type == entry.key.key_type
                        && line.key_base64 == entry.key.key_base64
                });
                if !already_on_disk {
                    output.push_str(&format_line(entry));
                }
            }
        }

        fs::write(&self.path, output).map_err(|e| Error::Io {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!(
            path = %self.path.display(),
            count = snapshot
                .iter()
                .filter(|e| e.key.origin == KeyOrigin::AcceptedThisSession)
                .count(),
            "persisted newly accepted host keys"
        );
        Ok(())
    }
}

/// Exclusive advisory lock held on a sibling lock file. Unlocks on drop.
struct FileLock {
    file: fs::File,
}

impl FileLock {
    fn exclusive(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::Lock {
                path: path.to_path_buf(),
                source: e,
            })?;
        file.lock_exclusive().map_err(|e| Error::Lock {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Lock file sits next to the trust file as `.<name>.lock`. It carries the
/// lock and nothing else.
fn lock_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.lock"))
}

struct ParsedLine {
    hostname: String,
    key_type: String,
    key_base64: String,
}

/// Parse trust file lines. Comments and blank lines are skipped; malformed
/// lines are logged and ignored rather than failing the load.
fn parse_entries(content: &str) -> Vec<ParsedLine> {
    let mut parsed = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(hostname), Some(key_type), Some(key_base64)) => parsed.push(ParsedLine {
                hostname: hostname.to_string(),
                key_type: key_type.to_string(),
                key_base64: key_base64.to_string(),
            }),
            _ => tracing::debug!("skipping malformed trust file line: {line}"),
        }
    }
    parsed
}

fn format_line(entry: &TrustEntry) -> String {
    format!(
        "{} {} {}\n",
        entry.hostname, entry.key.key_type, entry.key.key_base64
    )
}

fn contains(entries: &[TrustEntry], hostname: &str, key_type: &str, key_base64: &str) -> bool {
    entries.iter().any(|entry| {
        entry.hostname == hostname
            && entry.key.key_type == key_type
            && entry.key.key_base64 == key_base64
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> HostIdentity {
        HostIdentity::new(name, 22)
    }

    #[test]
    fn parse_skips_comments_blanks_and_malformed_lines() {
        let content = "# comment\n\nweb1 ssh-ed25519 AAAAkey1\nbroken-line\nweb2 ssh-rsa AAAAkey2 trailing comment\n";
        let parsed = parse_entries(content);

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].hostname, "web1");
        assert_eq!(parsed[0].key_type, "ssh-ed25519");
        assert_eq!(parsed[1].key_base64, "AAAAkey2");
    }

    #[test]
    fn decide_records_a_new_key_exactly_once() {
        let store = TrustStore::new("/nonexistent/known_hosts");

        assert!(store.decide(&host("web1"), "ssh-ed25519", "AAAAkey1"));
        assert!(store.decide(&host("web1"), "ssh-ed25519", "AAAAkey1"));

        assert_eq!(store.newly_accepted(), 1);
        let keys = store.keys_for("web1");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].origin, KeyOrigin::AcceptedThisSession);
    }

    #[test]
    fn loaded_key_keeps_pre_existing_origin_when_decided_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        fs::write(&path, "web1 ssh-ed25519 AAAAkey1\n").unwrap();

        let store = TrustStore::new(&path);
        assert_eq!(store.load_system().unwrap(), 1);
        assert!(store.decide(&host("web1"), "ssh-ed25519", "AAAAkey1"));

        assert_eq!(store.newly_accepted(), 0);
        assert_eq!(store.keys_for("web1")[0].origin, KeyOrigin::PreExisting);
    }

    #[test]
    fn same_host_may_trust_multiple_key_types() {
        let store = TrustStore::new("/nonexistent/known_hosts");
        store.decide(&host("web1"), "ssh-ed25519", "AAAAkey1");
        store.decide(&host("web1"), "ssh-rsa", "AAAAkey2");

        assert_eq!(store.keys_for("web1").len(), 2);
    }

    #[test]
    fn lock_file_is_a_hidden_sibling() {
        let path = lock_path(Path::new("/home/me/.ssh/known_hosts"));
        assert_eq!(path, Path::new("/home/me/.ssh/.known_hosts.lock"));
    }
}
