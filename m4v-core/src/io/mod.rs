//! Input/output functionality.
pub mod bitreader;
pub mod bitwriter;
#[allow(clippy::manual_range_contains)]
pub mod codebook;
