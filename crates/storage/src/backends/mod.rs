//! Backends for the vault and object store interfaces.

pub mod credentials;
pub mod glacier;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod s3;
