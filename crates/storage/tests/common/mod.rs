pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{seeded_bytes, sha256_hash};
#[allow(unused_imports)]
pub use mocks::{BrokenStreamVault, RecordingMultipart};
