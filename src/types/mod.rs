// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Endpoint identity and connection target parsing.

mod host;

pub use host::{HostIdentity, ParseTargetError, Target};
