//! # Codec Module
//!
//! Conversions between the three representations of a recording.
//!
//! ## Responsibilities
//! - **Raw text**: The line-oriented dump written while recording (`raw`).
//! - **JSON document**: The structured sequence file consumed by replay (`document`).
//! - **Typed sequence**: `types::Sequence`, what the rest of the engine works with.
//!
//! ## Key Functions
//! - `parse_raw_text`: raw text -> `Sequence`.
//! - `to_document` / `from_document`: `Sequence` <-> `SequenceDocument`.
//! - `convert_raw_file`: the offline txt -> json step.

pub mod document;
pub mod raw;

pub use document::{
    convert_raw_file, from_document, load_sequence_document, read_sequence_file, to_document,
    write_sequence_file,
};
pub use raw::{format_frame, format_header, parse_raw_text, RecordingHeader};

/// Default width of zero-padded frame ids.
pub const FRAME_ID_DIGITS: usize = 6;

/// Renders `i` left-padded with zeros to `digits` characters.
///
/// The sign counts as a character and is padded like a digit, so `-3` at
/// width 6 is `0000-3`. Values already at least `digits` wide are returned
/// unmodified.
pub fn int_to_string_digits(i: i64, digits: usize) -> String {
    format!("{:0>width$}", i.to_string(), width = digits)
}
