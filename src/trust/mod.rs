// ABOUTME: Host key trust: accept-and-remember store with locked persistence.
// ABOUTME: Decides key acceptance during handshakes and saves new keys on session close.

mod error;
mod store;

pub use error::{Error, Result};
pub use store::{KeyOrigin, TrustKey, TrustStore};
