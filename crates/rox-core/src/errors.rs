use thiserror::Error;

/// Failures while reading the raw line-oriented scene dump.
///
/// Line numbers are 1-based and refer to the non-empty lines of the input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty scene file")]
    Empty,
    #[error("Line {line}: expected header '{expected} <count>'")]
    MissingHeader { line: usize, expected: &'static str },
    #[error("Line {line}: missing field {field}")]
    MissingField { line: usize, field: &'static str },
    #[error("Line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },
    #[error("Line {line}: expected '{expected}', found '{found}'")]
    UnexpectedLine {
        line: usize,
        expected: &'static str,
        found: String,
    },
    #[error("Header declares {declared} lines but only {available} remain")]
    Truncated { declared: usize, available: usize },
}

#[derive(Error, Debug)]
pub enum RoxError {
    #[error("Sequence not found: {0}")]
    SequenceNotFound(String),
    #[error("Frame {index} out of range (sequence has {len} frames)")]
    FrameOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Image encoding error: {0}")]
    ImageEncode(String),
    #[error("Capture for '{0}' was dropped before completing")]
    CaptureDropped(String),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<image::ImageError> for RoxError {
    fn from(e: image::ImageError) -> Self {
        RoxError::ImageEncode(e.to_string())
    }
}
