//! # Raw Scene Text
//!
//! The recorder appends one header block and then one block per tick:
//!
//! ```text
//! Cameras 1
//! Cam0 0.0 90.0
//! Objects 1
//! Skeletons 0
//! NonMovableObjects 0
//! frame
//! 0 1520.5
//! Cam0 X=0.0 Y=0.0 Z=0.0 P=0.0 Y=0.0 R=0.0
//! objects
//! Box0 X=10.0 Y=0.0 Z=0.0 P=0.0 Y=0.0 R=0.0 MIN:X=.. Y=.. Z=.. MAX:X=.. Y=.. Z=..
//! skeletons
//! ```
//!
//! Lines end in CRLF. Empty lines are ignored, so line numbers in errors
//! count non-empty lines only.

use crate::codec::int_to_string_digits;
use crate::errors::ParseError;
use crate::types::{
    mean_framerate, ActorState, ActorStateExtended, CameraConfig, Frame, PawnInfo, Rotator,
    Sequence, SkeletonState, Transform,
};
use glam::Vec3;
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::{instrument, warn};

const EOL: &str = "\r\n";

/// Static descriptors written once at the top of a recording.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordingHeader {
    pub cameras: Vec<CameraConfig>,
    /// Number of movable objects present in every frame block.
    pub object_count: usize,
    pub pawns: Vec<PawnInfo>,
    pub non_movable_objects: Vec<ActorStateExtended>,
}

struct LineCursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .collect();
        Self { lines, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.lines.len() - self.pos
    }

    /// Returns the next line and its 1-based number.
    fn next(&mut self, declared: usize) -> Result<(usize, &'a str), ParseError> {
        match self.lines.get(self.pos) {
            Some(line) => {
                self.pos += 1;
                Ok((self.pos, *line))
            }
            None => Err(ParseError::Truncated {
                declared,
                available: 0,
            }),
        }
    }

    fn expect_marker(&mut self, marker: &'static str) -> Result<(), ParseError> {
        let (line, text) = self.next(1)?;
        if text.trim().eq_ignore_ascii_case(marker) {
            Ok(())
        } else {
            Err(ParseError::UnexpectedLine {
                line,
                expected: marker,
                found: text.trim().to_string(),
            })
        }
    }

    fn count(&mut self, keyword: &'static str) -> Result<usize, ParseError> {
        let (line, text) = self.next(1)?;
        let mut tokens = text.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(k), Some(n)) if k.eq_ignore_ascii_case(keyword) => {
                n.parse::<usize>().map_err(|_| ParseError::InvalidNumber {
                    line,
                    token: n.to_string(),
                })
            }
            _ => Err(ParseError::MissingHeader {
                line,
                expected: keyword,
            }),
        }
    }

    fn ensure(&self, needed: usize) -> Result<(), ParseError> {
        if self.remaining() < needed {
            Err(ParseError::Truncated {
                declared: needed,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }
}

/// Tokens of one whitespace separated line with field access by position.
struct Fields<'a> {
    line: usize,
    tokens: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn new(line: usize, text: &'a str) -> Self {
        Self {
            line,
            tokens: text.split_whitespace().collect(),
        }
    }

    fn token(&self, idx: usize, field: &'static str) -> Result<&'a str, ParseError> {
        self.tokens
            .get(idx)
            .copied()
            .ok_or(ParseError::MissingField {
                line: self.line,
                field,
            })
    }

    fn number<T: std::str::FromStr>(&self, idx: usize, field: &'static str) -> Result<T, ParseError> {
        let token = self.token(idx, field)?;
        token.parse::<T>().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            token: token.to_string(),
        })
    }

    /// Reads a `KEY=value` token (e.g. `X=1.5`, `MIN:X=-3`), taking the text after `=`.
    fn keyed(&self, idx: usize, field: &'static str) -> Result<f32, ParseError> {
        let token = self.token(idx, field)?;
        let value = token.split_once('=').map_or(token, |(_, v)| v);
        value.parse::<f32>().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            token: token.to_string(),
        })
    }

    fn vec3(&self, start: usize, field: &'static str) -> Result<Vec3, ParseError> {
        Ok(Vec3::new(
            self.keyed(start, field)?,
            self.keyed(start + 1, field)?,
            self.keyed(start + 2, field)?,
        ))
    }

    fn transform(&self) -> Result<Transform, ParseError> {
        let position = self.vec3(1, "position")?;
        let rotation = Rotator::new(
            self.keyed(4, "rotation")?,
            self.keyed(5, "rotation")?,
            self.keyed(6, "rotation")?,
        );
        Ok(Transform::new(position, rotation))
    }

    fn actor(&self) -> Result<ActorState, ParseError> {
        Ok(ActorState {
            name: self.token(0, "name")?.to_string(),
            transform: self.transform()?,
        })
    }

    fn actor_extended(&self) -> Result<ActorStateExtended, ParseError> {
        Ok(ActorStateExtended {
            name: self.token(0, "name")?.to_string(),
            transform: self.transform()?,
            bbox_min: self.vec3(7, "bounding box min")?,
            bbox_max: self.vec3(10, "bounding box max")?,
        })
    }
}

fn parse_header(cursor: &mut LineCursor) -> Result<RecordingHeader, ParseError> {
    let mut header = RecordingHeader::default();

    let num_cameras = cursor.count("Cameras")?;
    cursor.ensure(num_cameras)?;
    for _ in 0..num_cameras {
        let (line, text) = cursor.next(num_cameras)?;
        let f = Fields::new(line, text);
        header.cameras.push(CameraConfig {
            name: f.token(0, "camera name")?.to_string(),
            stereo_baseline: f.number(1, "stereo baseline")?,
            field_of_view: f.number(2, "field of view")?,
        });
    }

    header.object_count = cursor.count("Objects")?;

    let num_skeletons = cursor.count("Skeletons")?;
    cursor.ensure(num_skeletons)?;
    for _ in 0..num_skeletons {
        let (line, text) = cursor.next(num_skeletons)?;
        let f = Fields::new(line, text);
        header.pawns.push(PawnInfo {
            name: f.token(0, "skeleton name")?.to_string(),
            bone_count: f.number(1, "bone count")?,
        });
    }

    let num_non_movable = cursor.count("NonMovableObjects")?;
    cursor.ensure(num_non_movable)?;
    for _ in 0..num_non_movable {
        let (line, text) = cursor.next(num_non_movable)?;
        header
            .non_movable_objects
            .push(Fields::new(line, text).actor_extended()?);
    }

    Ok(header)
}

fn parse_frame(cursor: &mut LineCursor, header: &RecordingHeader) -> Result<Frame, ParseError> {
    cursor.expect_marker("frame")?;

    let (line, text) = cursor.next(1)?;
    let f = Fields::new(line, text);
    let mut frame = Frame {
        index: f.number(0, "frame id")?,
        time_stamp: f.number(1, "timestamp")?,
        ..Default::default()
    };

    for _ in 0..header.cameras.len() {
        let (line, text) = cursor.next(1)?;
        let camera = Fields::new(line, text).actor()?;
        frame.cameras.insert(camera.name.clone(), camera);
    }

    cursor.expect_marker("objects")?;
    for _ in 0..header.object_count {
        let (line, text) = cursor.next(1)?;
        let object = Fields::new(line, text).actor_extended()?;
        frame.objects.insert(object.name.clone(), object);
    }

    cursor.expect_marker("skeletons")?;
    for pawn in &header.pawns {
        let (line, text) = cursor.next(1)?;
        let root = Fields::new(line, text).actor()?;
        let mut bones = BTreeMap::new();
        for _ in 0..pawn.bone_count {
            let (line, text) = cursor.next(1)?;
            let bone = Fields::new(line, text).actor()?;
            bones.insert(bone.name.clone(), bone);
        }
        frame.skeletons.insert(
            root.name.clone(),
            SkeletonState {
                name: root.name,
                transform: root.transform,
                bones,
            },
        );
    }

    Ok(frame)
}

/// Parses a raw scene dump into a `Sequence` named `name`.
///
/// A trailing frame block that is shorter than the header implies (an
/// interrupted recording) is dropped with a warning.
#[instrument(level = "debug", skip(text), fields(bytes = text.len()))]
pub fn parse_raw_text(text: &str, name: &str) -> Result<Sequence, ParseError> {
    let mut cursor = LineCursor::new(text);
    if cursor.remaining() == 0 {
        return Err(ParseError::Empty);
    }

    let header = parse_header(&mut cursor)?;

    let lines_per_frame = frame_line_count(&header).ok_or(ParseError::Truncated {
        declared: usize::MAX,
        available: cursor.remaining(),
    })?;

    let mut frames = Vec::new();
    while cursor.remaining() >= lines_per_frame {
        frames.push(parse_frame(&mut cursor, &header)?);
    }
    if cursor.remaining() > 0 {
        warn!(
            "Ignoring {} trailing lines of an incomplete frame block",
            cursor.remaining()
        );
    }

    let total_time = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => (last.time_stamp - first.time_stamp) / 1000.0,
        _ => 0.0,
    };
    let total_frames = frames.len() as u64;

    Ok(Sequence {
        name: name.to_string(),
        total_frames,
        total_time,
        mean_framerate: mean_framerate(total_frames, total_time),
        cameras: header.cameras,
        pawns: header.pawns,
        non_movable_objects: header.non_movable_objects,
        frames,
    })
}

/// Lines in one frame block, or `None` if the header counts overflow.
fn frame_line_count(header: &RecordingHeader) -> Option<usize> {
    // frame, index/time, objects, skeletons markers
    header
        .pawns
        .iter()
        .try_fold(4 + header.cameras.len(), |acc, p| {
            acc.checked_add(1)?.checked_add(p.bone_count as usize)
        })?
        .checked_add(header.object_count)
}

fn token_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

fn push_pose(out: &mut String, name: &str, t: &Transform) {
    let _ = write!(
        out,
        "{} X={:.6} Y={:.6} Z={:.6} P={:.6} Y={:.6} R={:.6}",
        token_name(name),
        t.position.x,
        t.position.y,
        t.position.z,
        t.rotation.pitch,
        t.rotation.yaw,
        t.rotation.roll
    );
}

fn push_bounds(out: &mut String, min: Vec3, max: Vec3) {
    let _ = write!(
        out,
        " MIN:X={:.6} Y={:.6} Z={:.6} MAX:X={:.6} Y={:.6} Z={:.6}",
        min.x, min.y, min.z, max.x, max.y, max.z
    );
}

fn push_extended(out: &mut String, object: &ActorStateExtended) {
    push_pose(out, &object.name, &object.transform);
    push_bounds(out, object.bbox_min, object.bbox_max);
    out.push_str(EOL);
}

/// Renders the header block.
pub fn format_header(header: &RecordingHeader) -> String {
    let mut out = String::new();

    let _ = write!(out, "Cameras {}{}", header.cameras.len(), EOL);
    for cam in &header.cameras {
        let _ = write!(
            out,
            "{} {:?} {:?}{}",
            token_name(&cam.name),
            cam.stereo_baseline,
            cam.field_of_view,
            EOL
        );
    }

    let _ = write!(out, "Objects {}{}", header.object_count, EOL);

    let _ = write!(out, "Skeletons {}{}", header.pawns.len(), EOL);
    for pawn in &header.pawns {
        let _ = write!(out, "{} {}{}", token_name(&pawn.name), pawn.bone_count, EOL);
    }

    let _ = write!(
        out,
        "NonMovableObjects {}{}",
        header.non_movable_objects.len(),
        EOL
    );
    for object in &header.non_movable_objects {
        push_extended(&mut out, object);
    }

    out
}

/// Renders one frame block.
pub fn format_frame(frame: &Frame) -> String {
    let mut out = String::new();

    out.push_str("frame");
    out.push_str(EOL);
    let _ = write!(
        out,
        "{} {:?}{}",
        int_to_string_digits(frame.index as i64, 0),
        frame.time_stamp,
        EOL
    );

    for cam in frame.cameras.values() {
        push_pose(&mut out, &cam.name, &cam.transform);
        out.push_str(EOL);
    }

    out.push_str("objects");
    out.push_str(EOL);
    for object in frame.objects.values() {
        push_extended(&mut out, object);
    }

    out.push_str("skeletons");
    out.push_str(EOL);
    for skeleton in frame.skeletons.values() {
        push_pose(&mut out, &skeleton.name, &skeleton.transform);
        out.push_str(EOL);
        for bone in skeleton.bones.values() {
            push_pose(&mut out, &bone.name, &bone.transform);
            push_bounds(&mut out, Vec3::ZERO, Vec3::ZERO);
            out.push_str(EOL);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = "Cameras 1\r\n\
Cam0 0.0 90.0\r\n\
Objects 1\r\n\
Skeletons 1\r\n\
Pawn0 2\r\n\
NonMovableObjects 1\r\n\
Wall X=1.000 Y=2.000 Z=3.000 P=0.000000 Y=0.000000 R=0.000000 MIN:X=-1.000 Y=-1.000 Z=0.000 MAX:X=1.000 Y=1.000 Z=2.000\r\n\
frame\r\n\
0 1000.0\r\n\
Cam0 X=0.000 Y=0.000 Z=170.000 P=-10.000000 Y=45.000000 R=0.000000\r\n\
objects\r\n\
Box0 X=10.000 Y=0.000 Z=0.000 P=0.000000 Y=0.000000 R=0.000000 MIN:X=9.000 Y=-1.000 Z=-1.000 MAX:X=11.000 Y=1.000 Z=1.000\r\n\
skeletons\r\n\
Pawn0 X=0.000 Y=0.000 Z=90.000 P=0.000000 Y=0.000000 R=0.000000\r\n\
head X=0.000 Y=0.000 Z=160.000 P=0.000000 Y=0.000000 R=0.000000 MIN:X=0.000 Y=0.000 Z=0.000 MAX:X=0.000 Y=0.000 Z=0.000\r\n\
hand_r X=20.000 Y=30.000 Z=100.000 P=0.000000 Y=0.000000 R=5.000000 MIN:X=0.000 Y=0.000 Z=0.000 MAX:X=0.000 Y=0.000 Z=0.000\r\n\
frame\r\n\
1 1500.0\r\n\
Cam0 X=5.000 Y=0.000 Z=170.000 P=-10.000000 Y=45.000000 R=0.000000\r\n\
objects\r\n\
Box0 X=12.000 Y=0.000 Z=0.000 P=0.000000 Y=0.000000 R=0.000000 MIN:X=11.000 Y=-1.000 Z=-1.000 MAX:X=13.000 Y=1.000 Z=1.000\r\n\
skeletons\r\n\
Pawn0 X=0.000 Y=0.000 Z=90.000 P=0.000000 Y=0.000000 R=0.000000\r\n\
head X=0.000 Y=0.000 Z=161.000 P=0.000000 Y=0.000000 R=0.000000 MIN:X=0.000 Y=0.000 Z=0.000 MAX:X=0.000 Y=0.000 Z=0.000\r\n\
hand_r X=21.000 Y=30.000 Z=100.000 P=0.000000 Y=0.000000 R=5.000000 MIN:X=0.000 Y=0.000 Z=0.000 MAX:X=0.000 Y=0.000 Z=0.000\r\n";

    #[test]
    fn parses_header_and_frames() {
        let seq = parse_raw_text(SCENE, "scene").unwrap();
        assert_eq!(seq.name, "scene");
        assert_eq!(seq.cameras.len(), 1);
        assert_eq!(seq.cameras[0].field_of_view, 90.0);
        assert_eq!(seq.pawns[0].bone_count, 2);
        assert_eq!(seq.non_movable_objects[0].bbox_max, Vec3::new(1.0, 1.0, 2.0));
        assert_eq!(seq.total_frames, 2);
        assert!((seq.total_time - 0.5).abs() < 1e-6);
        assert!((seq.mean_framerate - 4.0).abs() < 1e-4);

        let f1 = &seq.frames[1];
        assert_eq!(f1.index, 1);
        assert_eq!(f1.cameras["Cam0"].transform.rotation.yaw, 45.0);
        assert_eq!(f1.objects["Box0"].transform.position.x, 12.0);
        let hand = &f1.skeletons["Pawn0"].bones["hand_r"];
        assert_eq!(hand.transform.position, Vec3::new(21.0, 30.0, 100.0));
        assert_eq!(hand.transform.rotation.roll, 5.0);
    }

    #[test]
    fn drops_incomplete_trailing_frame() {
        let truncated = format!("{}frame\r\n2 2000.0\r\n", SCENE);
        let seq = parse_raw_text(&truncated, "scene").unwrap();
        assert_eq!(seq.frames.len(), 2);
    }

    #[test]
    fn header_only_gives_empty_sequence() {
        let text = "Cameras 0\r\nObjects 0\r\nSkeletons 0\r\nNonMovableObjects 0\r\n";
        let seq = parse_raw_text(text, "empty").unwrap();
        assert_eq!(seq.total_frames, 0);
        assert_eq!(seq.total_time, 0.0);
        assert_eq!(seq.mean_framerate, 0.0);
    }

    #[test]
    fn single_frame_has_zero_framerate() {
        let text = "Cameras 0\r\nObjects 0\r\nSkeletons 0\r\nNonMovableObjects 0\r\nframe\r\n0 12.5\r\nobjects\r\nskeletons\r\n";
        let seq = parse_raw_text(text, "one").unwrap();
        assert_eq!(seq.total_frames, 1);
        assert_eq!(seq.mean_framerate, 0.0);
    }

    #[test]
    fn declared_cameras_past_end_of_input() {
        let err = parse_raw_text("Cameras 3\r\nCam0 0 90\r\n", "x").unwrap_err();
        assert!(matches!(err, ParseError::Truncated { declared: 3, available: 1 }));
    }

    #[test]
    fn oversized_object_count_is_truncated_not_overflowed() {
        let text = "Cameras 0\r\nObjects 18446744073709551615\r\nSkeletons 0\r\nNonMovableObjects 0\r\nframe\r\n";
        let err = parse_raw_text(text, "x").unwrap_err();
        assert!(matches!(err, ParseError::Truncated { available: 1, .. }));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(parse_raw_text("\r\n\r\n", "x").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn count_mismatch_is_reported_as_unexpected_line() {
        // Header says no objects, but the frame carries one.
        let text = "Cameras 0\r\nObjects 0\r\nSkeletons 0\r\nNonMovableObjects 0\r\n\
frame\r\n0 0.0\r\nobjects\r\nBox0 X=1 Y=2 Z=3 P=0 Y=0 R=0 MIN:X=0 Y=0 Z=0 MAX:X=0 Y=0 Z=0\r\nskeletons\r\n";
        let err = parse_raw_text(text, "x").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedLine {
                expected: "skeletons",
                ..
            }
        ));
    }

    #[test]
    fn missing_fields_are_reported() {
        let text = "Cameras 0\r\nObjects 1\r\nSkeletons 0\r\nNonMovableObjects 0\r\n\
frame\r\n0 0.0\r\nobjects\r\nBox0 X=1 Y=2\r\nskeletons\r\n";
        let err = parse_raw_text(text, "x").unwrap_err();
        assert!(matches!(err, ParseError::MissingField { line: 8, .. }));
    }

    #[test]
    fn bad_number_is_reported() {
        let err = parse_raw_text("Cameras two\r\n", "x").unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { line: 1, .. }));
    }

    #[test]
    fn formatted_blocks_parse_back() {
        let seq = parse_raw_text(SCENE, "scene").unwrap();
        let header = RecordingHeader {
            cameras: seq.cameras.clone(),
            object_count: 1,
            pawns: seq.pawns.clone(),
            non_movable_objects: seq.non_movable_objects.clone(),
        };
        let mut text = format_header(&header);
        for frame in &seq.frames {
            text.push_str(&format_frame(frame));
        }
        assert!(text.ends_with("\r\n"));

        let again = parse_raw_text(&text, "scene").unwrap();
        assert_eq!(again, seq);
    }
}
