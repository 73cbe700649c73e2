//! # View Modes
//!
//! Each view mode knows its folder name and the render configuration the
//! renderer has to apply before a capture.

use rox_data::config::ViewModeFlags;
use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewMode {
    Lit,
    Depth,
    ObjectMask,
    Normal,
}

/// Post-process material bound while capturing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PostProcessMaterial {
    /// Writes scene depth in cm to the red channel.
    Depth,
    /// Writes world normals.
    Normal,
}

/// Render state requested by a view mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderSettings {
    /// Show vertex colors unlit instead of materials.
    pub vertex_colors: bool,
    pub post_processing: bool,
    pub post_process_material: Option<PostProcessMaterial>,
    /// Swap every paintable object to its flat instance color material.
    pub mask_materials: bool,
}

impl ViewMode {
    /// Capture order within one camera.
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Lit,
        ViewMode::Depth,
        ViewMode::ObjectMask,
        ViewMode::Normal,
    ];

    /// Folder name of the generated images.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Lit => "rgb",
            ViewMode::Depth => "depth",
            ViewMode::ObjectMask => "mask",
            ViewMode::Normal => "normal",
        }
    }

    pub fn configure(&self) -> RenderSettings {
        match self {
            ViewMode::Lit => RenderSettings {
                vertex_colors: false,
                post_processing: true,
                post_process_material: None,
                mask_materials: false,
            },
            ViewMode::Depth => RenderSettings {
                vertex_colors: false,
                post_processing: true,
                post_process_material: Some(PostProcessMaterial::Depth),
                mask_materials: false,
            },
            ViewMode::ObjectMask => RenderSettings {
                vertex_colors: true,
                post_processing: false,
                post_process_material: None,
                mask_materials: true,
            },
            ViewMode::Normal => RenderSettings {
                vertex_colors: false,
                post_processing: true,
                post_process_material: Some(PostProcessMaterial::Normal),
                mask_materials: false,
            },
        }
    }

    /// Enabled modes in capture order. Falls back to `[Lit]` when nothing is enabled.
    pub fn from_flags(flags: &ViewModeFlags) -> Vec<ViewMode> {
        let enabled = [flags.rgb, flags.depth, flags.mask, flags.normal];
        let modes: Vec<ViewMode> = Self::ALL
            .iter()
            .zip(enabled)
            .filter(|(_, on)| *on)
            .map(|(vm, _)| *vm)
            .collect();
        if modes.is_empty() {
            vec![ViewMode::Lit]
        } else {
            modes
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" | "lit" => Ok(ViewMode::Lit),
            "depth" => Ok(ViewMode::Depth),
            "mask" | "objectmask" | "object_mask" => Ok(ViewMode::ObjectMask),
            "normal" => Ok(ViewMode::Normal),
            other => Err(format!("Unknown view mode '{}'", other)),
        }
    }
}
