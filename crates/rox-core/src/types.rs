//! # Types Module
//!
//! Shared data types used across the engine.
//!
//! ## Responsibilities
//! - **Transform**: World position plus pitch/yaw/roll rotation.
//! - **Actor states**: Per-frame snapshots of cameras, movable meshes and skeletons.
//! - **Sequence**: The fully parsed recording, read-only during replay.
//!
//! ## Key Types
//! - `Rotator`: Degrees, Z-up left-handed convention (yaw about Z, pitch about Y, roll about X).
//! - `Frame`: One recorded tick, entities keyed by name.
//! - `Rgb`: 8-bit instance color.

use glam::{Mat3, Vec3};
use rox_data::model::Rgb8;
use std::collections::BTreeMap;

/// Rotation in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const ZERO: Rotator = Rotator {
        pitch: 0.0,
        yaw: 0.0,
        roll: 0.0,
    };

    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Returns the rotation as a matrix whose columns are the rotated X, Y and Z axes.
    pub fn to_matrix(&self) -> Mat3 {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        let (sr, cr) = self.roll.to_radians().sin_cos();

        let forward = Vec3::new(cp * cy, cp * sy, sp);
        let right = Vec3::new(sr * sp * cy - cr * sy, sr * sp * sy + cr * cy, -sr * cp);
        let up = Vec3::new(-(cr * sp * cy + sr * sy), cy * sr - cr * sp * sy, cr * cp);

        Mat3::from_cols(forward, right, up)
    }

    /// Rotates a vector expressed in the local frame into world space.
    pub fn rotate_vector(&self, v: Vec3) -> Vec3 {
        self.to_matrix() * v
    }
}

/// Position plus rotation. Scale is never recorded.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Rotator,
}

impl Transform {
    pub fn new(position: Vec3, rotation: Rotator) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Rotator::ZERO,
        }
    }
}

/// A camera, bone or generic tracked object at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorState {
    pub name: String,
    pub transform: Transform,
}

/// A movable mesh object with its axis-aligned bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorStateExtended {
    pub name: String,
    pub transform: Transform,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
}

/// A tracked skeletal pawn at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct SkeletonState {
    pub name: String,
    pub transform: Transform,
    /// Bone (socket) name to its component-space transform.
    pub bones: BTreeMap<String, ActorState>,
}

/// One recorded tick.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Frame {
    pub index: u64,
    /// Milliseconds since the recording started.
    pub time_stamp: f32,
    pub cameras: BTreeMap<String, ActorState>,
    pub objects: BTreeMap<String, ActorStateExtended>,
    pub skeletons: BTreeMap<String, SkeletonState>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub name: String,
    /// Distance in cm between the two eyes, 0 for a monoscopic camera.
    pub stereo_baseline: f32,
    pub field_of_view: f32,
}

impl CameraConfig {
    pub fn is_stereo(&self) -> bool {
        self.stereo_baseline > 0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PawnInfo {
    pub name: String,
    pub bone_count: u32,
}

/// An 8-bit RGB triplet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb8> for Rgb {
    fn from(c: Rgb8) -> Self {
        Self::new(c.r, c.g, c.b)
    }
}

impl From<Rgb> for Rgb8 {
    fn from(c: Rgb) -> Self {
        Rgb8 {
            r: c.r,
            g: c.g,
            b: c.b,
        }
    }
}

/// A paintable scene object and the mask color it was given.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    pub instance_name: String,
    pub color: Rgb,
    pub class: String,
}

/// A fully parsed recording.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Sequence {
    pub name: String,
    pub total_frames: u64,
    /// Seconds between the first and last frame.
    pub total_time: f32,
    pub mean_framerate: f32,
    pub cameras: Vec<CameraConfig>,
    pub pawns: Vec<PawnInfo>,
    pub non_movable_objects: Vec<ActorStateExtended>,
    pub frames: Vec<Frame>,
}

/// Frames per second over `total_time`, or 0 when no time has elapsed.
pub fn mean_framerate(total_frames: u64, total_time: f32) -> f32 {
    if total_time > 0.0 {
        total_frames as f32 / total_time
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    #[test]
    fn identity_rotation_keeps_vector() {
        let v = Vec3::new(1.0, -2.0, 3.0);
        assert!(close(Rotator::ZERO.rotate_vector(v), v));
    }

    #[test]
    fn yaw_turns_forward_towards_right() {
        let r = Rotator::new(0.0, 90.0, 0.0);
        assert!(close(r.rotate_vector(Vec3::X), Vec3::Y));
        assert!(close(r.rotate_vector(Vec3::Y), -Vec3::X));
    }

    #[test]
    fn pitch_raises_forward() {
        let r = Rotator::new(90.0, 0.0, 0.0);
        assert!(close(r.rotate_vector(Vec3::X), Vec3::Z));
    }

    #[test]
    fn framerate_guards_zero_time() {
        assert_eq!(mean_framerate(10, 0.0), 0.0);
        assert_eq!(mean_framerate(10, 2.0), 5.0);
    }
}
