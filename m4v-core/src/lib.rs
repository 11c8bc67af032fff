//! Core functionality shared by the decoder crates: bitstream input, codebooks, frames and errors.
#[cfg(feature="decoders")]
#[allow(clippy::upper_case_acronyms)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::identity_op)]
#[allow(clippy::too_many_arguments)]
#[allow(clippy::unreadable_literal)]
pub mod codecs;

pub mod frame;
#[allow(clippy::too_many_arguments)]
pub mod io;
pub mod refs;
