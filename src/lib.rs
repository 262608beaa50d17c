// ABOUTME: Library root for legate - remote execution and file transfer over SSH.
// ABOUTME: The CLI binary is in main.rs.

pub mod connect;
pub mod error;
pub mod exec;
pub mod transfer;
pub mod transport;
pub mod trust;
pub mod types;
