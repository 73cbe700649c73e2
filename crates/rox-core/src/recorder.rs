//! # Recorder Module
//!
//! Samples the live scene once per tick and appends it to a raw scene text
//! file through the background write queue.
//!
//! ## Responsibilities
//! - **Toggle**: The first toggle on writes a header to a new timestamped file;
//!   toggling off closes the session so the next toggle starts a fresh file.
//! - **Ticks**: One frame block per tick, stamped with the milliseconds elapsed
//!   since recording started. A tick whose actor counts no longer match the
//!   header continues the session in a new file.
//! - **Instance classes**: A one-off `instance_class.json` template.

use crate::codec::{format_frame, format_header, RecordingHeader};
use crate::config::RecorderConfig;
use crate::errors::RoxError;
use crate::scene::{Clock, RecordSource};
use crate::systems::{WriteQueue, WriteStats};
use crate::types::{Frame, PawnInfo};
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// `<prefix>_<YYYYMMDD-HHMMSS>.txt`
pub fn recording_file_name(prefix: &str, at: &DateTime<Local>) -> String {
    format!("{}_{}.txt", prefix, at.format("%Y%m%d-%H%M%S"))
}

pub struct Recorder {
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    writer: WriteQueue,
    recording: bool,
    header_written: bool,
    file: Option<PathBuf>,
    frame: u64,
    started: Option<Instant>,
    shape: BlockShape,
    used_files: BTreeSet<PathBuf>,
}

/// Counts every frame block of a raw file must agree with its header on.
#[derive(Clone, Debug, Default, PartialEq)]
struct BlockShape {
    cameras: usize,
    objects: usize,
    bones: Vec<(String, usize)>,
}

impl BlockShape {
    fn of_header(header: &RecordingHeader) -> Self {
        let mut bones: Vec<(String, usize)> = header
            .pawns
            .iter()
            .map(|p| (p.name.clone(), p.bone_count as usize))
            .collect();
        bones.sort();
        Self {
            cameras: header.cameras.len(),
            objects: header.object_count,
            bones,
        }
    }

    fn of_frame(frame: &Frame) -> Self {
        Self {
            cameras: frame.cameras.len(),
            objects: frame.objects.len(),
            bones: frame
                .skeletons
                .values()
                .map(|s| (s.name.clone(), s.bones.len()))
                .collect(),
        }
    }
}

impl Recorder {
    pub fn new(config: RecorderConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            writer: WriteQueue::new(),
            recording: false,
            header_written: false,
            file: None,
            frame: 0,
            started: None,
            shape: BlockShape::default(),
            used_files: BTreeSet::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// The file the current session appends to.
    pub fn current_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Flips recording on or off and returns the new state.
    #[instrument(level = "info", skip(self, source))]
    pub fn toggle_recording(&mut self, source: &dyn RecordSource) -> bool {
        self.recording = !self.recording;
        self.frame = 0;

        if self.recording && !self.header_written {
            self.header_written = true;
            self.start_file(source);
        } else if !self.recording {
            self.header_written = false;
            info!("Recording stopped");
        }

        self.recording
    }

    /// Writes a fresh header to a new file and restarts frame numbering.
    fn start_file(&mut self, source: &dyn RecordSource) {
        let path = self.next_file_path(&Local::now());
        let header = Self::sample_header(source);
        self.shape = BlockShape::of_header(&header);
        self.writer.append(&path, format_header(&header));
        self.frame = 0;
        self.started = Some(self.clock.now());
        info!("Recording to {}", path.display());
        self.used_files.insert(path.clone());
        self.file = Some(path);
    }

    /// A file name not used by an earlier session, suffixed `-1`, `-2`... when
    /// two files start within the same second.
    fn next_file_path(&self, at: &DateTime<Local>) -> PathBuf {
        let name = recording_file_name(&self.config.file_prefix, at);
        let mut path = self.config.scene_dir.join(&name);
        let mut n = 1;
        while path.exists() || self.used_files.contains(&path) {
            let stem = name.trim_end_matches(".txt");
            path = self.config.scene_dir.join(format!("{}-{}.txt", stem, n));
            n += 1;
        }
        path
    }

    fn sample_header(source: &dyn RecordSource) -> RecordingHeader {
        RecordingHeader {
            cameras: source.camera_configs(),
            object_count: source.objects().len(),
            pawns: source
                .skeletons()
                .into_iter()
                .map(|s| PawnInfo {
                    name: s.name,
                    bone_count: s.bones.len() as u32,
                })
                .collect(),
            non_movable_objects: source.non_movable_objects(),
        }
    }

    /// Appends one frame block if recording. Returns whether a block was queued.
    ///
    /// When the scene no longer matches the header (an actor was spawned or
    /// destroyed) the session continues in a new file with a fresh header.
    pub fn on_tick(&mut self, source: &dyn RecordSource) -> bool {
        if !self.recording || self.file.is_none() {
            return false;
        }

        let mut frame = Frame {
            index: self.frame,
            time_stamp: 0.0,
            cameras: source
                .cameras()
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
            objects: source
                .objects()
                .into_iter()
                .map(|o| (o.name.clone(), o))
                .collect(),
            skeletons: source
                .skeletons()
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
        };

        let shape = BlockShape::of_frame(&frame);
        if shape != self.shape {
            warn!(
                "Scene changed while recording ({} -> {} objects), starting a new file",
                self.shape.objects, shape.objects
            );
            self.start_file(source);
            frame.index = self.frame;
        }

        let elapsed = self
            .started
            .map(|s| self.clock.now().saturating_duration_since(s))
            .unwrap_or_default();
        frame.time_stamp = elapsed.as_secs_f32() * 1000.0;

        let Some(path) = &self.file else {
            return false;
        };
        self.writer.append(path, format_frame(&frame));
        self.frame += 1;
        true
    }

    /// Writes `instance_class.json` mapping every scene object to `"none"`.
    ///
    /// An existing file is never overwritten; returns `Ok(false)` in that case.
    pub fn write_instance_class_template(&self, source: &dyn RecordSource) -> Result<bool, RoxError> {
        let path = self.config.scene_dir.join("instance_class.json");
        if path.exists() {
            warn!(
                "{} already exists. Remove or rename it to create a new one.",
                path.display()
            );
            return Ok(false);
        }

        let classes: BTreeMap<String, &str> = source
            .objects()
            .into_iter()
            .chain(source.non_movable_objects())
            .map(|o| (o.name, "none"))
            .collect();

        std::fs::create_dir_all(&self.config.scene_dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(&classes)?)?;
        info!("Created {}", path.display());
        Ok(true)
    }

    /// Blocks until every queued block is on disk.
    pub fn flush(&self) {
        self.writer.flush();
    }

    pub fn finish(self) -> WriteStats {
        self.writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_raw_text;
    use crate::scene::memory::{MemoryObject, MemoryScene, MemorySkeleton};
    use crate::scene::{ManualClock, SceneHandle};
    use crate::types::{ActorStateExtended, CameraConfig, Transform};
    use chrono::TimeZone;
    use glam::Vec3;
    use std::time::Duration;

    fn scene() -> MemoryScene {
        let mut scene = MemoryScene::new();
        scene.add_camera(
            CameraConfig {
                name: "Cam0".into(),
                stereo_baseline: 0.0,
                field_of_view: 90.0,
            },
            Transform::default(),
        );
        scene.add_object("Box0", MemoryObject::at(Vec3::new(10.0, 0.0, 0.0)));
        let mut pawn = MemorySkeleton::default();
        pawn.bones
            .insert("head".into(), Transform::from_position(Vec3::new(0.0, 0.0, 160.0)));
        scene.add_skeleton("Pawn0", pawn);
        scene.add_non_movable(ActorStateExtended {
            name: "Floor".into(),
            transform: Transform::default(),
            bbox_min: Vec3::new(-500.0, -500.0, -1.0),
            bbox_max: Vec3::new(500.0, 500.0, 0.0),
        });
        scene
    }

    fn recorder(dir: &Path, clock: Arc<ManualClock>) -> Recorder {
        Recorder::new(
            RecorderConfig {
                scene_dir: dir.to_path_buf(),
                file_prefix: "take".into(),
            },
            clock,
        )
    }

    #[test]
    fn file_name_uses_local_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(recording_file_name("scene", &at), "scene_20240309-070501.txt");
    }

    #[test]
    fn ticks_are_ignored_until_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path(), Arc::new(ManualClock::new()));
        assert!(!rec.on_tick(&scene()));
        assert!(rec.current_file().is_none());
    }

    #[test]
    fn recorded_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut rec = recorder(dir.path(), clock.clone());
        let mut scene = scene();

        assert!(rec.toggle_recording(&scene));
        for i in 0..3 {
            scene.set_object_transform(
                "Box0",
                Transform::from_position(Vec3::new(10.0 + i as f32, 0.0, 0.0)),
            );
            assert!(rec.on_tick(&scene));
            clock.advance(Duration::from_millis(40));
        }
        let path = rec.current_file().unwrap().to_path_buf();
        rec.flush();

        let text = std::fs::read_to_string(&path).unwrap();
        let seq = parse_raw_text(&text, "take").unwrap();
        assert_eq!(seq.total_frames, 3);
        assert_eq!(seq.cameras[0].name, "Cam0");
        assert_eq!(seq.pawns[0].bone_count, 1);
        assert_eq!(seq.non_movable_objects[0].name, "Floor");
        assert_eq!(seq.frames[2].index, 2);
        assert!((seq.frames[2].time_stamp - 80.0).abs() < 1e-3);
        assert_eq!(seq.frames[2].objects["Box0"].transform.position.x, 12.0);
        assert_eq!(
            seq.frames[0].skeletons["Pawn0"].bones["head"].transform.position.z,
            160.0
        );
    }

    #[test]
    fn toggling_off_and_on_starts_a_new_header() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut rec = recorder(dir.path(), clock);
        let scene = scene();

        rec.toggle_recording(&scene);
        rec.on_tick(&scene);
        let first = rec.current_file().unwrap().to_path_buf();
        assert!(!rec.toggle_recording(&scene));
        assert!(!rec.on_tick(&scene));

        assert!(rec.toggle_recording(&scene));
        rec.on_tick(&scene);
        let second = rec.current_file().unwrap().to_path_buf();
        assert_ne!(first, second);
        rec.flush();

        for path in [first, second] {
            let text = std::fs::read_to_string(&path).unwrap();
            assert_eq!(text.matches("Cameras 1").count(), 1);
            let seq = parse_raw_text(&text, "take").unwrap();
            assert_eq!(seq.frames.len(), 1);
            assert_eq!(seq.frames[0].index, 0);
        }
        assert_eq!(rec.finish().failed, 0);
    }

    #[test]
    fn spawned_object_rolls_over_to_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut rec = recorder(dir.path(), clock.clone());
        let mut scene = scene();

        rec.toggle_recording(&scene);
        assert!(rec.on_tick(&scene));
        clock.advance(Duration::from_millis(40));
        assert!(rec.on_tick(&scene));
        let first = rec.current_file().unwrap().to_path_buf();

        clock.advance(Duration::from_millis(40));
        scene.add_object("Ball", MemoryObject::at(Vec3::new(0.0, 30.0, 0.0)));
        assert!(rec.on_tick(&scene));
        clock.advance(Duration::from_millis(40));
        assert!(rec.on_tick(&scene));
        let second = rec.current_file().unwrap().to_path_buf();
        assert_ne!(first, second);
        rec.flush();

        let old = parse_raw_text(&std::fs::read_to_string(&first).unwrap(), "a").unwrap();
        assert_eq!(old.total_frames, 2);
        assert_eq!(old.frames[1].objects.len(), 1);

        let new = parse_raw_text(&std::fs::read_to_string(&second).unwrap(), "b").unwrap();
        assert_eq!(new.total_frames, 2);
        assert_eq!(new.frames[0].index, 0);
        assert_eq!(new.frames[0].time_stamp, 0.0);
        assert!((new.frames[1].time_stamp - 40.0).abs() < 1e-3);
        assert_eq!(new.frames[1].objects["Ball"].transform.position.y, 30.0);
        assert_eq!(rec.finish().failed, 0);
    }

    #[test]
    fn instance_class_template_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), Arc::new(ManualClock::new()));
        let scene = scene();

        assert!(rec.write_instance_class_template(&scene).unwrap());
        assert!(!rec.write_instance_class_template(&scene).unwrap());

        let text = std::fs::read_to_string(dir.path().join("instance_class.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["Box0"], "none");
        assert_eq!(value["Floor"], "none");
    }
}
