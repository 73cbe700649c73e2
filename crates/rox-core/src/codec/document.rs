//! # Sequence Document
//!
//! Maps the typed `Sequence` onto the serde model in `rox_data::model` and
//! reads/writes it as pretty-printed JSON.

use crate::codec::{int_to_string_digits, raw::parse_raw_text};
use crate::errors::RoxError;
use crate::types::{
    mean_framerate, ActorState, ActorStateExtended, CameraConfig, Frame, PawnInfo, Rotator,
    Sequence, SkeletonState, Transform,
};
use glam::Vec3;
use rox_data::model::{
    CameraEntry, FrameEntry, ObjectEntry, PoseEntry, Pyr, SequenceDocument, SkeletonEntry,
    SkeletonFrameEntry, Xyz,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument, warn};

fn xyz(v: Vec3) -> Xyz {
    Xyz {
        x: v.x,
        y: v.y,
        z: v.z,
    }
}

fn pyr(r: Rotator) -> Pyr {
    Pyr {
        p: r.pitch,
        y: r.yaw,
        r: r.roll,
    }
}

fn vec3(v: Xyz) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn rotator(r: Pyr) -> Rotator {
    Rotator::new(r.p, r.y, r.r)
}

fn pose_entry(actor: &ActorState) -> PoseEntry {
    PoseEntry {
        name: actor.name.clone(),
        position: xyz(actor.transform.position),
        rotation: pyr(actor.transform.rotation),
    }
}

fn object_entry(object: &ActorStateExtended) -> ObjectEntry {
    ObjectEntry {
        name: object.name.clone(),
        position: xyz(object.transform.position),
        rotation: pyr(object.transform.rotation),
        boundingbox_min: xyz(object.bbox_min),
        boundingbox_max: xyz(object.bbox_max),
    }
}

fn actor_state(entry: PoseEntry) -> ActorState {
    ActorState {
        name: entry.name,
        transform: Transform::new(vec3(entry.position), rotator(entry.rotation)),
    }
}

fn actor_state_extended(entry: ObjectEntry) -> ActorStateExtended {
    ActorStateExtended {
        name: entry.name,
        transform: Transform::new(vec3(entry.position), rotator(entry.rotation)),
        bbox_min: vec3(entry.boundingbox_min),
        bbox_max: vec3(entry.boundingbox_max),
    }
}

fn frame_entry(frame: &Frame, id_width: usize) -> FrameEntry {
    FrameEntry {
        id: int_to_string_digits(frame.index as i64, id_width),
        timestamp: frame.time_stamp,
        cameras: frame.cameras.values().map(pose_entry).collect(),
        objects: frame.objects.values().map(object_entry).collect(),
        skeletons: frame
            .skeletons
            .values()
            .map(|s| SkeletonFrameEntry {
                name: s.name.clone(),
                position: xyz(s.transform.position),
                rotation: pyr(s.transform.rotation),
                bones: s.bones.values().map(pose_entry).collect(),
            })
            .collect(),
    }
}

/// Builds the JSON model of `sequence`, padding frame ids to `id_width` digits.
pub fn to_document(sequence: &Sequence, id_width: usize) -> SequenceDocument {
    SequenceDocument {
        name: sequence.name.clone(),
        total_frames: sequence.total_frames,
        total_time: sequence.total_time,
        mean_framerate: sequence.mean_framerate,
        cameras: sequence
            .cameras
            .iter()
            .map(|c| CameraEntry {
                name: c.name.clone(),
                stereo: c.stereo_baseline,
                fov: c.field_of_view,
            })
            .collect(),
        skeletons: sequence
            .pawns
            .iter()
            .map(|p| SkeletonEntry {
                name: p.name.clone(),
                num_bones: p.bone_count as u64,
            })
            .collect(),
        non_movable_objects: sequence.non_movable_objects.iter().map(object_entry).collect(),
        frames: sequence
            .frames
            .iter()
            .map(|f| frame_entry(f, id_width))
            .collect(),
    }
}

/// Converts a deserialized document into a `Sequence`.
///
/// Duplicate names inside one frame keep the last entry. A frame id that is
/// not a number falls back to the frame's position in the array.
pub fn from_document(doc: SequenceDocument) -> Sequence {
    let declared = doc.total_frames;

    let frames: Vec<Frame> = doc
        .frames
        .into_iter()
        .enumerate()
        .map(|(pos, entry)| {
            let index = entry.id.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!("Frame id '{}' is not numeric, using {}", entry.id, pos);
                pos as u64
            });

            let cameras = entry
                .cameras
                .into_iter()
                .map(|c| (c.name.clone(), actor_state(c)))
                .collect();
            let objects = entry
                .objects
                .into_iter()
                .map(|o| (o.name.clone(), actor_state_extended(o)))
                .collect();
            let skeletons = entry
                .skeletons
                .into_iter()
                .map(|s| {
                    let bones: BTreeMap<String, ActorState> = s
                        .bones
                        .into_iter()
                        .map(|b| (b.name.clone(), actor_state(b)))
                        .collect();
                    let state = SkeletonState {
                        name: s.name.clone(),
                        transform: Transform::new(vec3(s.position), rotator(s.rotation)),
                        bones,
                    };
                    (s.name, state)
                })
                .collect();

            Frame {
                index,
                time_stamp: entry.timestamp,
                cameras,
                objects,
                skeletons,
            }
        })
        .collect();

    let total_frames = frames.len() as u64;
    if declared != total_frames {
        warn!(
            "Sequence '{}' declares {} frames but contains {}",
            doc.name, declared, total_frames
        );
    }

    // Older writers left the framerate out
    let mean = if doc.mean_framerate > 0.0 {
        doc.mean_framerate
    } else {
        mean_framerate(total_frames, doc.total_time)
    };

    Sequence {
        name: doc.name,
        total_frames,
        total_time: doc.total_time,
        mean_framerate: mean,
        cameras: doc
            .cameras
            .into_iter()
            .map(|c| CameraConfig {
                name: c.name,
                stereo_baseline: c.stereo,
                field_of_view: c.fov,
            })
            .collect(),
        pawns: doc
            .skeletons
            .into_iter()
            .map(|s| PawnInfo {
                name: s.name,
                bone_count: u32::try_from(s.num_bones).unwrap_or(u32::MAX),
            })
            .collect(),
        non_movable_objects: doc
            .non_movable_objects
            .into_iter()
            .map(actor_state_extended)
            .collect(),
        frames,
    }
}

/// Parses a JSON sequence document.
pub fn load_sequence_document(json: &str) -> Result<Sequence, RoxError> {
    let doc: SequenceDocument = serde_json::from_str(json)?;
    Ok(from_document(doc))
}

#[instrument(level = "debug")]
pub fn read_sequence_file(path: &Path) -> Result<Sequence, RoxError> {
    let json = std::fs::read_to_string(path)?;
    load_sequence_document(&json)
}

pub fn write_sequence_file(
    sequence: &Sequence,
    path: &Path,
    id_width: usize,
) -> Result<(), RoxError> {
    let json = serde_json::to_string_pretty(&to_document(sequence, id_width))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json)?;
    Ok(())
}

/// Converts a raw scene recording into a JSON sequence document.
///
/// The sequence takes its name from the file stem of `txt_path`.
#[instrument(level = "info", skip(id_width))]
pub fn convert_raw_file(
    txt_path: &Path,
    json_path: &Path,
    id_width: usize,
) -> Result<Sequence, RoxError> {
    let name = txt_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = std::fs::read_to_string(txt_path)?;
    let sequence = parse_raw_text(&text, &name)?;
    write_sequence_file(&sequence, json_path, id_width)?;
    info!(
        "Converted '{}': {} frames, {:.2}s, {:.2} fps",
        name, sequence.total_frames, sequence.total_time, sequence.mean_framerate
    );
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Sequence {
        let mut frame = Frame {
            index: 3,
            time_stamp: 120.0,
            ..Default::default()
        };
        frame.cameras.insert(
            "Cam0".into(),
            ActorState {
                name: "Cam0".into(),
                transform: Transform::new(Vec3::new(1.0, 2.0, 3.0), Rotator::new(0.0, 90.0, 0.0)),
            },
        );
        let mut bones = BTreeMap::new();
        bones.insert(
            "head".into(),
            ActorState {
                name: "head".into(),
                transform: Transform::from_position(Vec3::new(0.0, 0.0, 160.0)),
            },
        );
        frame.skeletons.insert(
            "Pawn0".into(),
            SkeletonState {
                name: "Pawn0".into(),
                transform: Transform::default(),
                bones,
            },
        );
        Sequence {
            name: "seq".into(),
            total_frames: 1,
            total_time: 0.0,
            mean_framerate: 0.0,
            cameras: vec![CameraConfig {
                name: "Cam0".into(),
                stereo_baseline: 6.5,
                field_of_view: 90.0,
            }],
            pawns: vec![PawnInfo {
                name: "Pawn0".into(),
                bone_count: 1,
            }],
            non_movable_objects: vec![],
            frames: vec![frame],
        }
    }

    #[test]
    fn frame_ids_are_padded() {
        let doc = to_document(&sample(), 6);
        assert_eq!(doc.frames[0].id, "000003");
        assert_eq!(doc.skeletons[0].num_bones, 1);
        assert_eq!(doc.cameras[0].stereo, 6.5);
    }

    #[test]
    fn document_round_trip() {
        let seq = sample();
        let json = serde_json::to_string(&to_document(&seq, 6)).unwrap();
        let back = load_sequence_document(&json).unwrap();
        assert_eq!(back, seq);
    }

    #[test]
    fn tolerates_skeleton_without_bones_and_frame_without_objects() {
        let doc = json!({
            "name": "bare",
            "total_frames": 1,
            "total_time": 0.0,
            "mean_framerate": 0.0,
            "cameras": [],
            "skeletons": [{ "name": "Pawn0", "num_bones": 0 }],
            "non_movable_objects": [],
            "frames": [{
                "id": "000000",
                "timestamp": 0.0,
                "cameras": [],
                "skeletons": [{
                    "name": "Pawn0",
                    "position": { "x": 0.0, "y": 0.0, "z": 0.0 },
                    "rotation": { "p": 0.0, "y": 0.0, "r": 0.0 }
                }]
            }]
        });
        let seq = load_sequence_document(&doc.to_string()).unwrap();
        assert!(seq.frames[0].objects.is_empty());
        assert!(seq.frames[0].skeletons["Pawn0"].bones.is_empty());
        assert_eq!(seq.pawns[0].bone_count, 0);
    }

    #[test]
    fn frame_count_follows_frames_array() {
        let doc = json!({
            "name": "short",
            "total_frames": 5,
            "frames": [{ "id": "000000", "timestamp": 0.0 }]
        });
        let seq = load_sequence_document(&doc.to_string()).unwrap();
        assert_eq!(seq.total_frames, 1);
    }

    #[test]
    fn non_numeric_id_falls_back_to_position() {
        let doc = json!({
            "name": "ids",
            "total_frames": 2,
            "frames": [
                { "id": "000010", "timestamp": 0.0 },
                { "id": "late", "timestamp": 33.0 }
            ]
        });
        let seq = load_sequence_document(&doc.to_string()).unwrap();
        assert_eq!(seq.frames[0].index, 10);
        assert_eq!(seq.frames[1].index, 1);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            load_sequence_document("{ \"name\": "),
            Err(RoxError::Json(_))
        ));
    }

    #[test]
    fn convert_writes_json_next_to_raw() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("take1.txt");
        std::fs::write(
            &txt,
            "Cameras 0\r\nObjects 0\r\nSkeletons 0\r\nNonMovableObjects 0\r\n\
frame\r\n0 0.0\r\nobjects\r\nskeletons\r\nframe\r\n1 500.0\r\nobjects\r\nskeletons\r\n",
        )
        .unwrap();
        let json = dir.path().join("out").join("take1.json");

        let seq = convert_raw_file(&txt, &json, 6).unwrap();
        assert_eq!(seq.name, "take1");

        let back = read_sequence_file(&json).unwrap();
        assert_eq!(back.total_frames, 2);
        assert!((back.mean_framerate - 4.0).abs() < 1e-4);
        assert_eq!(back.frames[1].index, 1);
    }
}
