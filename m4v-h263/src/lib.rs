//! Crate for providing MPEG-4 Part 2 Simple Profile and H.263 baseline video decoding.
extern crate m4v_core;

#[allow(clippy::upper_case_acronyms)]
#[allow(clippy::needless_late_init)]
#[allow(clippy::collapsible_if)]
#[allow(clippy::collapsible_else_if)]
#[allow(clippy::identity_op)]
#[allow(clippy::manual_memcpy)]
#[allow(clippy::needless_range_loop)]
#[allow(clippy::too_many_arguments)]
#[allow(clippy::unreadable_literal)]
pub mod codecs;
