//! # Sequence Store
//!
//! Read-only access to one loaded `Sequence`.
//!
//! ## Responsibilities
//! - **Loading**: Reads the JSON document through an `AssetLoader`.
//! - **Random access**: Bounds-checked `frame(i)`.
//! - **Descriptors**: Camera and pawn configuration of the recording.

use crate::codec::load_sequence_document;
use crate::errors::RoxError;
use crate::types::{ActorStateExtended, CameraConfig, Frame, PawnInfo, Sequence};
use crate::AssetLoader;
use tracing::{debug, instrument};

/// Owns a parsed sequence for the duration of a replay.
#[derive(Clone, Debug)]
pub struct SequenceStore {
    sequence: Sequence,
}

impl SequenceStore {
    pub fn new(sequence: Sequence) -> Self {
        Self { sequence }
    }

    /// Loads the JSON sequence document at `path`.
    #[instrument(level = "info", skip(loader))]
    pub fn load(loader: &dyn AssetLoader, path: &str) -> Result<Self, RoxError> {
        let bytes = loader
            .load_bytes(path)
            .map_err(|e| RoxError::SequenceNotFound(format!("{}: {:#}", path, e)))?;
        let json = String::from_utf8(bytes)
            .map_err(|e| anyhow::anyhow!("Sequence '{}' is not valid UTF-8: {}", path, e))?;
        let sequence = load_sequence_document(&json)?;
        debug!(
            "Loaded '{}': {} frames, {} cameras, {} pawns",
            sequence.name,
            sequence.frames.len(),
            sequence.cameras.len(),
            sequence.pawns.len()
        );
        Ok(Self { sequence })
    }

    pub fn name(&self) -> &str {
        &self.sequence.name
    }

    pub fn frame_count(&self) -> usize {
        self.sequence.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.frames.is_empty()
    }

    /// Returns frame `index`, or `FrameOutOfRange` past the end.
    pub fn frame(&self, index: usize) -> Result<&Frame, RoxError> {
        self.sequence
            .frames
            .get(index)
            .ok_or(RoxError::FrameOutOfRange {
                index,
                len: self.sequence.frames.len(),
            })
    }

    pub fn camera_configs(&self) -> &[CameraConfig] {
        &self.sequence.cameras
    }

    pub fn pawn_infos(&self) -> &[PawnInfo] {
        &self.sequence.pawns
    }

    pub fn non_movable_objects(&self) -> &[ActorStateExtended] {
        &self.sequence.non_movable_objects
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use std::collections::HashMap;

    struct MockAssetLoader {
        files: HashMap<String, Vec<u8>>,
    }

    impl AssetLoader for MockAssetLoader {
        fn load_bytes(&self, path: &str) -> Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Asset not found: {}", path))
        }
    }

    fn loader() -> MockAssetLoader {
        let doc = json!({
            "name": "walk",
            "total_frames": 2,
            "total_time": 0.5,
            "mean_framerate": 4.0,
            "cameras": [{ "name": "Cam0", "stereo": 0.0, "fov": 90.0 }],
            "skeletons": [{ "name": "Pawn0", "num_bones": 0 }],
            "frames": [
                { "id": "000000", "timestamp": 0.0 },
                { "id": "000001", "timestamp": 500.0 }
            ]
        });
        let mut files = HashMap::new();
        files.insert("SceneText/walk.json".to_string(), doc.to_string().into_bytes());
        files.insert("SceneText/bad.json".to_string(), vec![0xff, 0xfe]);
        MockAssetLoader { files }
    }

    #[test]
    fn loads_and_exposes_descriptors() {
        let store = SequenceStore::load(&loader(), "SceneText/walk.json").unwrap();
        assert_eq!(store.name(), "walk");
        assert_eq!(store.frame_count(), 2);
        assert_eq!(store.camera_configs()[0].name, "Cam0");
        assert_eq!(store.pawn_infos()[0].name, "Pawn0");
        assert_eq!(store.frame(1).unwrap().time_stamp, 500.0);
    }

    #[test]
    fn frame_access_is_bounds_checked() {
        let store = SequenceStore::load(&loader(), "SceneText/walk.json").unwrap();
        assert!(matches!(
            store.frame(2),
            Err(RoxError::FrameOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn missing_asset_is_an_error() {
        let err = SequenceStore::load(&loader(), "SceneText/none.json").unwrap_err();
        assert!(matches!(&err, RoxError::SequenceNotFound(msg) if msg.contains("SceneText/none.json")));
        assert!(err.to_string().contains("Asset not found"));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        assert!(SequenceStore::load(&loader(), "SceneText/bad.json").is_err());
    }
}
