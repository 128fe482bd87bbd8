//! Repository traits for metadata operations.

pub mod correlations;
pub mod parts;

pub use correlations::{CompletionOutcome, CorrelationRepo};
pub use parts::{PartRepo, check_contiguous};
