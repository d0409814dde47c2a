//! Hex formatting for addresses in human readable formats.
//!
//! Every field written as hex string also reads back from one, next to plain
//! numbers.

pub(crate) mod hex_jep106;
pub(crate) mod hex_option;
pub(crate) mod hex_range;
pub(crate) mod hex_u_int;
mod serialize_u_int;
mod unsigned_int;
