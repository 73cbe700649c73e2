//! On-disk replay configuration. Every field is optional; missing values
//! fall back to the defaults below.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SequenceJobEntry {
    /// Sequence JSON file name, without extension.
    pub name: String,
    #[serde(default)]
    pub start_frame: u64,
}

/// Directory nesting for generated images.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayoutName {
    /// `<sequence>/<viewmode>/<camera>/`
    #[default]
    ViewModeFirst,
    /// `<sequence>/<camera>/<viewmode>/`
    CameraFirst,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RgbFormatName {
    Png,
    #[default]
    Jpg95,
    Jpg80,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ViewModeFlags {
    pub rgb: bool,
    pub depth: bool,
    pub mask: bool,
    pub normal: bool,
    /// Additionally dump depth in cm as text, one value per pixel.
    pub depth_txt_cm: bool,
}

impl Default for ViewModeFlags {
    fn default() -> Self {
        Self {
            rgb: true,
            depth: true,
            mask: true,
            normal: true,
            depth_txt_cm: false,
        }
    }
}

/// Settle times in seconds between pipeline steps.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DelaysEntry {
    pub initial: f32,
    pub place_cameras: f32,
    pub first_view_mode: f32,
    pub change_view_mode: f32,
    pub take_screenshot: f32,
}

impl Default for DelaysEntry {
    fn default() -> Self {
        Self {
            initial: 2.0,
            place_cameras: 0.1,
            first_view_mode: 0.1,
            change_view_mode: 0.2,
            take_screenshot: 0.1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReplayConfigFile {
    pub scene_dir: String,
    pub sequences: Vec<SequenceJobEntry>,
    pub output_dir: String,
    pub layout: OutputLayoutName,
    pub view_modes: ViewModeFlags,
    pub rgb_format: RgbFormatName,
    pub width: u32,
    pub height: u32,
    pub playback_only: bool,
    pub playback_speed: f32,
    pub delays: DelaysEntry,
    pub status_period: u64,
    /// Valid depth range in cm; pixels outside it are written as 0.
    pub depth_range_cm: [f32; 2],
    pub frame_id_width: usize,
}

impl Default for ReplayConfigFile {
    fn default() -> Self {
        Self {
            scene_dir: "SceneText".to_string(),
            sequences: vec![SequenceJobEntry {
                name: "scene".to_string(),
                start_frame: 0,
            }],
            output_dir: "Screenshots".to_string(),
            layout: OutputLayoutName::default(),
            view_modes: ViewModeFlags::default(),
            rgb_format: RgbFormatName::default(),
            width: 1920,
            height: 1080,
            playback_only: false,
            playback_speed: 1.0,
            delays: DelaysEntry::default(),
            status_period: 100,
            depth_range_cm: [0.3, 6553.4],
            frame_id_width: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: ReplayConfigFile = serde_json::from_value(json!({
            "sequences": [{ "name": "kitchen" }, { "name": "bedroom", "start_frame": 40 }],
            "layout": "camera_first",
            "view_modes": { "normal": false },
            "delays": { "initial": 0.5 }
        }))
        .unwrap();

        assert_eq!(cfg.sequences.len(), 2);
        assert_eq!(cfg.sequences[0].start_frame, 0);
        assert_eq!(cfg.sequences[1].start_frame, 40);
        assert_eq!(cfg.layout, OutputLayoutName::CameraFirst);
        assert!(cfg.view_modes.rgb && !cfg.view_modes.normal);
        assert_eq!(cfg.delays.initial, 0.5);
        assert_eq!(cfg.delays.change_view_mode, 0.2);
        assert_eq!(cfg.width, 1920);
        assert_eq!(cfg.rgb_format, RgbFormatName::Jpg95);
    }
}
