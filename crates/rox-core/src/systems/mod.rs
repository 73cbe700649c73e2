//! # Systems Module
//!
//! Background services shared by the recorder and the replay driver.
//!
//! ## Responsibilities
//! - **Write queue**: Ordered, fire-and-forget file writes on one worker thread.
//! - **Status**: Progress and time estimates while rebuilding a sequence.

pub mod status;
pub mod writer;

pub use status::{seconds_to_string, StatusReporter};
pub use writer::{WriteQueue, WriteStats};
