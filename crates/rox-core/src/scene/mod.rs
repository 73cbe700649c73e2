//! # Scene Module
//!
//! The seams between the engine and whatever hosts the actors and renders them.
//!
//! ## Responsibilities
//! - **SceneHandle**: Moves tracked objects, bones and cameras to recorded poses.
//! - **Renderer**: Applies view settings and captures pixel buffers asynchronously.
//! - **RecordSource**: Samples the live scene for the recorder.
//! - **Clock**: Wall time for the replay scheduler.
//!
//! ## Key Types
//! - `CaptureTicket`: Completion signal for one capture, backed by a channel.
//! - `CameraView`: A camera, or one eye of a stereo camera, as seen by the renderer.
//! - `memory`: In-memory implementations used by the CLI and the tests.

pub mod memory;

use crate::errors::RoxError;
use crate::types::{
    ActorState, ActorStateExtended, CameraConfig, SceneObject, SkeletonState, Transform,
};
use crate::view_mode::{RenderSettings, ViewMode};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use glam::Vec3;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Gravity and physics simulation state of a movable object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct PhysicsFlags {
    pub gravity: bool,
    pub simulate: bool,
}

impl PhysicsFlags {
    pub const DISABLED: PhysicsFlags = PhysicsFlags {
        gravity: false,
        simulate: false,
    };
}

/// Actors the replay drives.
///
/// Setters return `false` when no actor of that name exists.
pub trait SceneHandle {
    /// Names of the movable objects whose transforms are replayed.
    fn movable_objects(&self) -> Vec<String>;
    /// Names of the objects that receive an instance color.
    fn paintable_objects(&self) -> Vec<String>;

    fn has_camera(&self, name: &str) -> bool;
    fn has_skeleton(&self, name: &str) -> bool;

    fn set_object_transform(&mut self, name: &str, transform: Transform) -> bool;
    fn set_bone_transform(&mut self, skeleton: &str, bone: &str, transform: Transform) -> bool;
    fn set_camera_transform(&mut self, name: &str, transform: Transform) -> bool;
    fn camera_transform(&self, name: &str) -> Option<Transform>;

    fn physics(&self, name: &str) -> Option<PhysicsFlags>;
    fn set_physics(&mut self, name: &str, flags: PhysicsFlags);
}

/// What the renderer looks through for the next captures.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraView {
    /// Camera name, suffixed `_left` / `_right` for the eyes of a stereo camera.
    pub name: String,
    pub transform: Transform,
    pub field_of_view: f32,
}

impl CameraView {
    /// Views for `camera` at `transform`: one for a mono camera, left and right eye
    /// for a stereo one.
    ///
    /// Each eye sits half a baseline along the camera's local Y axis, rotated by
    /// the camera orientation: `P + R·(0, ∓B/2, 0)`.
    pub fn for_camera(camera: &CameraConfig, transform: Transform) -> Vec<CameraView> {
        if !camera.is_stereo() {
            return vec![CameraView {
                name: camera.name.clone(),
                transform,
                field_of_view: camera.field_of_view,
            }];
        }

        let half = camera.stereo_baseline / 2.0;
        let eye = |suffix: &str, lateral: f32| CameraView {
            name: format!("{}_{}", camera.name, suffix),
            transform: Transform::new(
                transform.position + transform.rotation.rotate_vector(Vec3::new(0.0, lateral, 0.0)),
                transform.rotation,
            ),
            field_of_view: camera.field_of_view,
        };
        vec![eye("left", -half), eye("right", half)]
    }
}

/// Captured pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelBuffer {
    /// 8-bit RGBA, row major.
    Rgba8 {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    /// Scene depth in centimetres, one value per pixel.
    DepthCm {
        width: u32,
        height: u32,
        data: Vec<f32>,
    },
}

impl PixelBuffer {
    pub fn width(&self) -> u32 {
        match self {
            PixelBuffer::Rgba8 { width, .. } | PixelBuffer::DepthCm { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            PixelBuffer::Rgba8 { height, .. } | PixelBuffer::DepthCm { height, .. } => *height,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub view: String,
    pub view_mode: ViewMode,
    pub width: u32,
    pub height: u32,
}

/// Receives the pixels of one capture once the renderer is done with it.
#[derive(Debug)]
pub struct CaptureTicket {
    label: String,
    rx: Receiver<PixelBuffer>,
}

impl CaptureTicket {
    /// A pending ticket and the sender the renderer completes it with.
    pub fn pending(label: impl Into<String>) -> (Sender<PixelBuffer>, CaptureTicket) {
        let (tx, rx) = bounded(1);
        (
            tx,
            CaptureTicket {
                label: label.into(),
                rx,
            },
        )
    }

    /// A ticket that is already complete.
    pub fn ready(label: impl Into<String>, buffer: PixelBuffer) -> CaptureTicket {
        let (tx, ticket) = Self::pending(label);
        let _ = tx.send(buffer);
        ticket
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Blocks until the capture completes.
    ///
    /// Fails with `CaptureDropped` if the renderer dropped the sender without sending.
    pub fn wait(self) -> Result<PixelBuffer, RoxError> {
        self.rx
            .recv()
            .map_err(|_| RoxError::CaptureDropped(self.label))
    }

    /// Like `wait`, giving up after `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<PixelBuffer, RoxError> {
        match self.rx.recv_timeout(timeout) {
            Ok(buffer) => Ok(buffer),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Err(RoxError::CaptureDropped(self.label))
            }
        }
    }
}

pub trait Renderer {
    /// Binds the instance colors used by the mask view mode.
    fn assign_mask_colors(&mut self, objects: &[SceneObject]);
    fn set_view(&mut self, view: &CameraView);
    fn apply_settings(&mut self, settings: &RenderSettings);
    /// Starts a capture of the current view. Must not block on the result.
    fn capture(&mut self, request: CaptureRequest) -> CaptureTicket;
}

/// Live scene state sampled by the recorder once per tick.
pub trait RecordSource {
    fn camera_configs(&self) -> Vec<CameraConfig>;
    fn cameras(&self) -> Vec<ActorState>;
    fn objects(&self) -> Vec<ActorStateExtended>;
    fn skeletons(&self) -> Vec<SkeletonState>;
    fn non_movable_objects(&self) -> Vec<ActorStateExtended>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// The process wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when slept on or advanced.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Total time advanced so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or_default()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rotator;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    fn camera(baseline: f32) -> CameraConfig {
        CameraConfig {
            name: "Cam0".into(),
            stereo_baseline: baseline,
            field_of_view: 90.0,
        }
    }

    #[test]
    fn mono_camera_has_one_view() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let views = CameraView::for_camera(&camera(0.0), t);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "Cam0");
        assert_eq!(views[0].transform, t);
    }

    #[test]
    fn stereo_eyes_are_offset_along_rotated_y() {
        let p = Vec3::new(100.0, 50.0, 170.0);
        let r = Rotator::new(0.0, 90.0, 0.0);
        let views = CameraView::for_camera(&camera(10.0), Transform::new(p, r));

        assert_eq!(views[0].name, "Cam0_left");
        assert_eq!(views[1].name, "Cam0_right");
        assert!(close(
            views[0].transform.position,
            p + r.rotate_vector(Vec3::new(0.0, -5.0, 0.0))
        ));
        assert!(close(
            views[1].transform.position,
            p + r.rotate_vector(Vec3::new(0.0, 5.0, 0.0))
        ));
        // Yawed 90 degrees, local +Y points along world -X.
        assert!(close(views[1].transform.position, Vec3::new(95.0, 50.0, 170.0)));
        assert_eq!(views[0].transform.rotation, r);
    }

    #[test]
    fn dropped_capture_is_reported() {
        let (tx, ticket) = CaptureTicket::pending("Cam0/rgb");
        drop(tx);
        assert!(matches!(ticket.wait(), Err(RoxError::CaptureDropped(l)) if l == "Cam0/rgb"));
    }

    #[test]
    fn capture_completes_from_another_thread() {
        let (tx, ticket) = CaptureTicket::pending("Cam0/depth");
        std::thread::spawn(move || {
            let _ = tx.send(PixelBuffer::DepthCm {
                width: 1,
                height: 1,
                data: vec![42.0],
            });
        });
        let buffer = ticket.wait_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(buffer.width(), 1);
    }

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }
}
