//! # Export Module
//!
//! Writing the generated dataset to disk.
//!
//! ## Responsibilities
//! - **Images**: Encoding captures per view mode (PNG, JPEG, 16-bit depth PNG, depth text).
//! - **Worker**: Resolving capture tickets in order on a background thread.

pub mod images;

pub use images::{ExportJob, ExportSettings, ExportStats, ImageExporter};
