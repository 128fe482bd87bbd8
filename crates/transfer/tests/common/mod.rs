pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{inventory_bytes, job_message, open_store, seeded_bytes};
#[allow(unused_imports)]
pub use mocks::{RecordingSignaler, SignalCall};
