use serde::{Deserialize, Deserializer, Serialize};

/// A location or extent in world units.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Xyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Pitch / yaw / roll in degrees.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Pyr {
    pub p: f32,
    pub y: f32,
    pub r: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PoseEntry {
    pub name: String,
    pub position: Xyz,
    pub rotation: Pyr,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ObjectEntry {
    pub name: String,
    pub position: Xyz,
    pub rotation: Pyr,
    #[serde(default)]
    pub boundingbox_min: Xyz,
    #[serde(default)]
    pub boundingbox_max: Xyz,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CameraEntry {
    pub name: String,
    /// Stereo baseline in cm, 0 for a monoscopic camera.
    #[serde(default)]
    pub stereo: f32,
    #[serde(default = "default_fov")]
    pub fov: f32,
}

fn default_fov() -> f32 {
    90.0
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SkeletonEntry {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub num_bones: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SkeletonFrameEntry {
    pub name: String,
    pub position: Xyz,
    pub rotation: Pyr,
    #[serde(default)]
    pub bones: Vec<PoseEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FrameEntry {
    /// Zero padded frame number. Older documents store it as a plain number.
    #[serde(deserialize_with = "deserialize_frame_id")]
    pub id: String,
    /// Milliseconds since the recording started.
    pub timestamp: f32,
    #[serde(default)]
    pub cameras: Vec<PoseEntry>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
    #[serde(default)]
    pub skeletons: Vec<SkeletonFrameEntry>,
}

/// The JSON sequence document produced from a raw scene recording.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SequenceDocument {
    pub name: String,
    #[serde(deserialize_with = "deserialize_count")]
    pub total_frames: u64,
    /// Seconds between the first and the last frame.
    #[serde(default)]
    pub total_time: f32,
    #[serde(default)]
    pub mean_framerate: f32,
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
    #[serde(default)]
    pub skeletons: Vec<SkeletonEntry>,
    #[serde(default)]
    pub non_movable_objects: Vec<ObjectEntry>,
    #[serde(default)]
    pub frames: Vec<FrameEntry>,
}

fn deserialize_frame_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(id) => Ok(id.to_string()),
            // Float encoded ids ("7.0") come from writers that store every number as a double
            None => n
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| (f as u64).to_string())
                .ok_or_else(|| serde::de::Error::custom(format!("invalid frame id {}", n))),
        },
        other => Err(serde::de::Error::custom(format!(
            "frame id must be a string or a number, got {}",
            other
        ))),
    }
}

fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    if let Some(n) = v.as_u64() {
        return Ok(n);
    }
    match v.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
        _ => Err(serde::de::Error::custom(format!(
            "expected a non-negative integer, got {}",
            v
        ))),
    }
}

/// 8-bit RGB triplet as stored in the scene object registry.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SceneObjectEntry {
    pub instance_name: String,
    pub instance_color: Rgb8,
    #[serde(rename = "class", default = "default_class")]
    pub class: String,
}

fn default_class() -> String {
    "none".to_string()
}

/// `sceneObject.json` as written next to the generated images.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SceneObjectsDocument {
    #[serde(rename = "SceneObjects")]
    pub scene_objects: Vec<SceneObjectEntry>,
}

/// Accepts both the wrapped registry and a bare array of entries.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SceneObjectsFile {
    Wrapped(SceneObjectsDocument),
    Bare(Vec<SceneObjectEntry>),
}

impl SceneObjectsFile {
    pub fn into_entries(self) -> Vec<SceneObjectEntry> {
        match self {
            SceneObjectsFile::Wrapped(doc) => doc.scene_objects,
            SceneObjectsFile::Bare(entries) => entries,
        }
    }
}
