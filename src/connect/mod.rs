// ABOUTME: Connection management: pooling, parameters, and the shared session.
// ABOUTME: One authenticated session per (host, user), reused across commands.

mod cache;
mod error;
mod session;

pub use cache::ConnectionPool;
pub use error::{Error, Result};
pub use session::{ConnectOptions, ConnectParams, Session};
