// ABOUTME: File transfer over an established session.
// ABOUTME: Uploads and downloads reuse one lazily opened transfer channel.

mod error;

pub use error::{Error, Result};

use crate::connect::Session;
use std::path::Path;

/// Upload a local file to a path on the remote host.
///
/// The local file is checked before any channel is opened, so a typo in
/// the source path never costs a network round trip.
pub async fn put(session: &Session, local: &Path, remote: &str) -> Result<()> {
    if !local.exists() {
        return Err(Error::LocalFileMissing(local.to_path_buf()));
    }
    tracing::debug!("PUT {} -> {}", local.display(), remote);
    let files = session.file_transfer().await?;
    files.put(local, remote).await
}

/// Download a remote file to a local path.
pub async fn get(session: &Session, remote: &str, local: &Path) -> Result<()> {
    tracing::debug!("FETCH {} -> {}", remote, local.display());
    let files = session.file_transfer().await?;
    files.get(remote, local).await
}
