//! Protocol module for building commands and decoding responses.
//!
//! This module contains the implementations for:
//! - Hex text encoding of commands
//! - Count and sample query frames
//! - Count and reading response decoding

pub mod frames;
pub mod hex;
pub mod readings;

pub use frames::{build_count_query, build_sample_query, CommandFrame, ResponseFrame};
pub use hex::{encode_command, to_hex_string};
pub use readings::{decode_available_count, decode_readings, decode_slots, Centi, Reading};
