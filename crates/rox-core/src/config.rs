//! # Config Module
//!
//! Runtime configuration for replay and recording, built from the serde
//! documents in `rox_data::config`.

use crate::view_mode::ViewMode;
use rox_data::config::{OutputLayoutName, ReplayConfigFile, RgbFormatName};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIN_PLAYBACK_SPEED: f32 = 0.1;
pub const MAX_PLAYBACK_SPEED: f32 = 3.0;

/// One sequence to rebuild.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceJob {
    /// JSON file name in the scene directory, without extension.
    pub name: String,
    pub start_frame: usize,
}

impl SequenceJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_frame: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OutputLayout {
    #[default]
    ViewModeFirst,
    CameraFirst,
}

impl OutputLayout {
    /// Directory for the images of `view` in `view_mode`.
    pub fn image_dir(&self, root: &Path, sequence: &str, view_mode: ViewMode, view: &str) -> PathBuf {
        let seq = root.join(sequence);
        match self {
            OutputLayout::ViewModeFirst => seq.join(view_mode.as_str()).join(view),
            OutputLayout::CameraFirst => seq.join(view).join(view_mode.as_str()),
        }
    }
}

impl From<OutputLayoutName> for OutputLayout {
    fn from(name: OutputLayoutName) -> Self {
        match name {
            OutputLayoutName::ViewModeFirst => OutputLayout::ViewModeFirst,
            OutputLayoutName::CameraFirst => OutputLayout::CameraFirst,
        }
    }
}

/// Encoding of Lit captures. Other view modes are always PNG.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum RgbFormat {
    Png,
    #[default]
    Jpeg95,
    Jpeg80,
}

impl RgbFormat {
    /// JPEG quality, `None` for PNG.
    pub fn jpeg_quality(&self) -> Option<u8> {
        match self {
            RgbFormat::Png => None,
            RgbFormat::Jpeg95 => Some(95),
            RgbFormat::Jpeg80 => Some(80),
        }
    }
}

impl From<RgbFormatName> for RgbFormat {
    fn from(name: RgbFormatName) -> Self {
        match name {
            RgbFormatName::Png => RgbFormat::Png,
            RgbFormatName::Jpg95 => RgbFormat::Jpeg95,
            RgbFormatName::Jpg80 => RgbFormat::Jpeg80,
        }
    }
}

/// Settle times between pipeline steps.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Delays {
    pub initial: Duration,
    pub place_cameras: Duration,
    pub first_view_mode: Duration,
    pub change_view_mode: Duration,
    pub take_screenshot: Duration,
}

impl Delays {
    /// All delays zero, for headless runs where nothing needs to settle.
    pub const NONE: Delays = Delays {
        initial: Duration::ZERO,
        place_cameras: Duration::ZERO,
        first_view_mode: Duration::ZERO,
        change_view_mode: Duration::ZERO,
        take_screenshot: Duration::ZERO,
    };
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs_f32(2.0),
            place_cameras: Duration::from_secs_f32(0.1),
            first_view_mode: Duration::from_secs_f32(0.1),
            change_view_mode: Duration::from_secs_f32(0.2),
            take_screenshot: Duration::from_secs_f32(0.1),
        }
    }
}

fn seconds(s: f32) -> Duration {
    Duration::try_from_secs_f32(s.max(0.0)).unwrap_or(Duration::ZERO)
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReplayConfig {
    pub scene_dir: PathBuf,
    pub sequences: Vec<SequenceJob>,
    pub output_dir: PathBuf,
    pub layout: OutputLayout,
    /// Enabled view modes in capture order, never empty.
    pub view_modes: Vec<ViewMode>,
    pub depth_txt: bool,
    pub rgb_format: RgbFormat,
    pub width: u32,
    pub height: u32,
    pub playback_only: bool,
    pub playback_speed: f32,
    pub delays: Delays,
    pub status_period: u64,
    pub depth_range_cm: (f32, f32),
    pub frame_id_width: usize,
}

impl ReplayConfig {
    pub fn from_file(file: &ReplayConfigFile) -> Self {
        Self {
            scene_dir: PathBuf::from(&file.scene_dir),
            sequences: file
                .sequences
                .iter()
                .map(|s| SequenceJob {
                    name: s.name.clone(),
                    start_frame: usize::try_from(s.start_frame).unwrap_or(usize::MAX),
                })
                .collect(),
            output_dir: PathBuf::from(&file.output_dir),
            layout: file.layout.into(),
            view_modes: ViewMode::from_flags(&file.view_modes),
            depth_txt: file.view_modes.depth_txt_cm,
            rgb_format: file.rgb_format.into(),
            width: file.width,
            height: file.height,
            playback_only: file.playback_only,
            playback_speed: file.playback_speed,
            delays: Delays {
                initial: seconds(file.delays.initial),
                place_cameras: seconds(file.delays.place_cameras),
                first_view_mode: seconds(file.delays.first_view_mode),
                change_view_mode: seconds(file.delays.change_view_mode),
                take_screenshot: seconds(file.delays.take_screenshot),
            },
            status_period: file.status_period,
            depth_range_cm: (file.depth_range_cm[0], file.depth_range_cm[1]),
            frame_id_width: file.frame_id_width,
        }
    }

    /// Playback speed multiplier clamped to `[MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED]`.
    pub fn clamped_playback_speed(&self) -> f32 {
        if self.playback_speed.is_nan() {
            return 1.0;
        }
        self.playback_speed
            .clamp(MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED)
    }

    /// Path of the JSON document for `job`.
    pub fn sequence_path(&self, job: &SequenceJob) -> PathBuf {
        self.scene_dir.join(format!("{}.json", job.name))
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self::from_file(&ReplayConfigFile::default())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecorderConfig {
    pub scene_dir: PathBuf,
    /// Recording files are named `<prefix>_<YYYYMMDD-HHMMSS>.txt`.
    pub file_prefix: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            scene_dir: PathBuf::from("SceneText"),
            file_prefix: "scene".to_string(),
        }
    }
}
