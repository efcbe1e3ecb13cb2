//! rxdigest-common: Shared error type and HTTP plumbing used across all rxdigest crates.

pub mod error;
pub mod sandbox;

pub use error::{Result, RxDigestError};
pub use sandbox::SandboxClient;
