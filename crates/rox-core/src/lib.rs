//! # Rox Core
//!
//! `rox-core` records the state of a running 3D scene into compact text files and
//! replays those recordings frame by frame to produce a synthetic vision dataset:
//! color, depth, normal and per-instance segmentation images for every camera.
//!
//! ## Core Features
//!
//! *   **Frame Codec**: Raw scene text to structured JSON sequence documents and back.
//! *   **Instance Colors**: A deterministic, invertible index to RGB mapping for masks.
//! *   **Replay**: A timed state machine that poses the scene and requests captures
//!     for each frame, camera and view mode.
//! *   **Recording**: Per-tick sampling of cameras, objects and skeletons.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rox_core::{DefaultAssetLoader, ReplayConfig, ReplayDriver, SystemClock};
//! use rox_core::scene::memory::{MemoryRenderer, MemoryScene};
//! use std::sync::Arc;
//!
//! let mut driver = ReplayDriver::new(
//!     ReplayConfig::default(),
//!     Arc::new(DefaultAssetLoader),
//!     Arc::new(SystemClock),
//!     MemoryScene::new(),
//!     MemoryRenderer::new(),
//! );
//! let stats = driver.run();
//! println!("{} frames", stats.frames);
//! ```

/// Raw scene text and JSON sequence document conversion.
pub mod codec;

/// Instance index to mask color mapping and the scene object registry.
pub mod color;

/// Replay and recorder settings.
pub mod config;

pub mod errors;

/// Image encoding and the background export worker.
pub mod export;

/// Per-tick scene sampling into raw scene text.
pub mod recorder;

/// The replay state machine.
pub mod replay;

/// Engine-facing traits and an in-memory scene for tests and the CLI.
pub mod scene;

/// Read-only access to a loaded sequence.
pub mod sequence;

/// Background write queue and progress reporting.
pub mod systems;

pub mod types;

/// Capture modes and the render settings each one needs.
pub mod view_mode;

pub use color::{assign_color, color_to_index, ColorRegistry, ColorScheme};
pub use config::{RecorderConfig, ReplayConfig};
pub use errors::{ParseError, RoxError};
pub use recorder::Recorder;
pub use replay::{ReplayDriver, ReplayState, ReplayStats};
pub use scene::{Clock, ManualClock, Renderer, SceneHandle, SystemClock};
pub use sequence::SequenceStore;
pub use types::{Frame, Rgb, Sequence, Transform};
pub use view_mode::ViewMode;

use anyhow::Result;
use tracing::instrument;

/// Source of sequence documents and other input files.
pub trait AssetLoader: Send + Sync {
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>>;
}

/// Reads from the filesystem, falling back to `assets/<path>` for relative paths.
pub struct DefaultAssetLoader;

impl AssetLoader for DefaultAssetLoader {
    #[instrument(level = "debug", skip(self), fields(path = path))]
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if std::path::Path::new(path).is_relative() => {
                let fallback = std::path::Path::new("assets").join(path);
                std::fs::read(&fallback).map_err(|_| {
                    anyhow::anyhow!("Failed to read {} (also tried {}): {}", path, fallback.display(), e)
                })
            }
            Err(e) => Err(anyhow::anyhow!("Failed to read {}: {}", path, e)),
        }
    }
}
