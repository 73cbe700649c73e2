//! In-memory scene and renderer.
//!
//! `MemoryScene` keeps actor transforms in maps and `MemoryRenderer` produces
//! synthetic buffers, so the whole replay pipeline runs headless.

use super::{
    CameraView, CaptureRequest, CaptureTicket, PhysicsFlags, PixelBuffer, RecordSource, Renderer,
    SceneHandle,
};
use crate::types::{
    ActorState, ActorStateExtended, CameraConfig, Rgb, SceneObject, Sequence, SkeletonState,
    Transform,
};
use crate::view_mode::{RenderSettings, ViewMode};
use glam::Vec3;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryObject {
    pub transform: Transform,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
    pub physics: PhysicsFlags,
    pub paintable: bool,
}

impl MemoryObject {
    pub fn at(position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(position),
            bbox_min: Vec3::splat(-50.0),
            bbox_max: Vec3::splat(50.0),
            physics: PhysicsFlags {
                gravity: true,
                simulate: true,
            },
            paintable: true,
        }
    }

    fn extended(&self, name: &str) -> ActorStateExtended {
        ActorStateExtended {
            name: name.to_string(),
            transform: self.transform,
            bbox_min: self.bbox_min,
            bbox_max: self.bbox_max,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySkeleton {
    pub transform: Transform,
    pub bones: BTreeMap<String, Transform>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryScene {
    cameras: BTreeMap<String, (CameraConfig, Transform)>,
    objects: BTreeMap<String, MemoryObject>,
    skeletons: BTreeMap<String, MemorySkeleton>,
    non_movable: Vec<ActorStateExtended>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a scene containing every actor `sequence` mentions, posed as in
    /// the first frame that contains it.
    pub fn from_sequence(sequence: &Sequence) -> Self {
        let mut scene = Self::new();
        scene.extend_from_sequence(sequence);
        scene
    }

    /// Adds the actors of `sequence` that are not in the scene yet. Actors
    /// already present are re-posed.
    pub fn extend_from_sequence(&mut self, sequence: &Sequence) {
        for cam in &sequence.cameras {
            self.cameras
                .entry(cam.name.clone())
                .or_insert_with(|| (cam.clone(), Transform::default()));
        }
        for pawn in &sequence.pawns {
            self.skeletons.entry(pawn.name.clone()).or_default();
        }
        for object in &sequence.non_movable_objects {
            if !self.non_movable.iter().any(|o| o.name == object.name) {
                self.non_movable.push(object.clone());
            }
        }

        for frame in sequence.frames.iter().rev() {
            for (name, cam) in &frame.cameras {
                if let Some(entry) = self.cameras.get_mut(name) {
                    entry.1 = cam.transform;
                }
            }
            for (name, object) in &frame.objects {
                let entry = self
                    .objects
                    .entry(name.clone())
                    .or_insert_with(|| MemoryObject::at(Vec3::ZERO));
                entry.transform = object.transform;
                entry.bbox_min = object.bbox_min;
                entry.bbox_max = object.bbox_max;
            }
            for (name, skeleton) in &frame.skeletons {
                let entry = self.skeletons.entry(name.clone()).or_default();
                entry.transform = skeleton.transform;
                for (bone, state) in &skeleton.bones {
                    entry.bones.insert(bone.clone(), state.transform);
                }
            }
        }
    }

    pub fn add_camera(&mut self, config: CameraConfig, transform: Transform) {
        self.cameras.insert(config.name.clone(), (config, transform));
    }

    pub fn add_object(&mut self, name: impl Into<String>, object: MemoryObject) {
        self.objects.insert(name.into(), object);
    }

    pub fn add_skeleton(&mut self, name: impl Into<String>, skeleton: MemorySkeleton) {
        self.skeletons.insert(name.into(), skeleton);
    }

    pub fn add_non_movable(&mut self, object: ActorStateExtended) {
        self.non_movable.push(object);
    }

    pub fn object(&self, name: &str) -> Option<&MemoryObject> {
        self.objects.get(name)
    }

    pub fn object_transform(&self, name: &str) -> Option<Transform> {
        self.objects.get(name).map(|o| o.transform)
    }

    pub fn bone_transform(&self, skeleton: &str, bone: &str) -> Option<Transform> {
        self.skeletons.get(skeleton)?.bones.get(bone).copied()
    }
}

impl SceneHandle for MemoryScene {
    fn movable_objects(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    fn paintable_objects(&self) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, o)| o.paintable)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn has_camera(&self, name: &str) -> bool {
        self.cameras.contains_key(name)
    }

    fn has_skeleton(&self, name: &str) -> bool {
        self.skeletons.contains_key(name)
    }

    fn set_object_transform(&mut self, name: &str, transform: Transform) -> bool {
        match self.objects.get_mut(name) {
            Some(object) => {
                object.transform = transform;
                true
            }
            None => false,
        }
    }

    fn set_bone_transform(&mut self, skeleton: &str, bone: &str, transform: Transform) -> bool {
        match self.skeletons.get_mut(skeleton) {
            Some(s) => {
                s.bones.insert(bone.to_string(), transform);
                true
            }
            None => false,
        }
    }

    fn set_camera_transform(&mut self, name: &str, transform: Transform) -> bool {
        match self.cameras.get_mut(name) {
            Some(entry) => {
                entry.1 = transform;
                true
            }
            None => false,
        }
    }

    fn camera_transform(&self, name: &str) -> Option<Transform> {
        self.cameras.get(name).map(|(_, t)| *t)
    }

    fn physics(&self, name: &str) -> Option<PhysicsFlags> {
        self.objects.get(name).map(|o| o.physics)
    }

    fn set_physics(&mut self, name: &str, flags: PhysicsFlags) {
        if let Some(object) = self.objects.get_mut(name) {
            object.physics = flags;
        }
    }
}

impl RecordSource for MemoryScene {
    fn camera_configs(&self) -> Vec<CameraConfig> {
        self.cameras.values().map(|(c, _)| c.clone()).collect()
    }

    fn cameras(&self) -> Vec<ActorState> {
        self.cameras
            .iter()
            .map(|(name, (_, t))| ActorState {
                name: name.clone(),
                transform: *t,
            })
            .collect()
    }

    fn objects(&self) -> Vec<ActorStateExtended> {
        self.objects
            .iter()
            .map(|(name, o)| o.extended(name))
            .collect()
    }

    fn skeletons(&self) -> Vec<SkeletonState> {
        self.skeletons
            .iter()
            .map(|(name, s)| SkeletonState {
                name: name.clone(),
                transform: s.transform,
                bones: s
                    .bones
                    .iter()
                    .map(|(bone, t)| {
                        (
                            bone.clone(),
                            ActorState {
                                name: bone.clone(),
                                transform: *t,
                            },
                        )
                    })
                    .collect(),
            })
            .collect()
    }

    fn non_movable_objects(&self) -> Vec<ActorStateExtended> {
        self.non_movable.clone()
    }
}

/// One capture issued to a `MemoryRenderer`.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRecord {
    pub view: CameraView,
    pub view_mode: ViewMode,
    pub settings: Option<RenderSettings>,
}

/// Renders flat synthetic images and remembers every call.
///
/// Lit captures are filled with a color derived from the view position, masks
/// with the first assigned instance color, depth with the distance of the view
/// from the origin.
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    view: Option<CameraView>,
    settings: Option<RenderSettings>,
    mask_colors: Vec<SceneObject>,
    captures: Vec<CaptureRecord>,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captures(&self) -> &[CaptureRecord] {
        &self.captures
    }

    pub fn mask_colors(&self) -> &[SceneObject] {
        &self.mask_colors
    }

    fn fill(&self, request: &CaptureRequest, position: Vec3) -> PixelBuffer {
        let pixels = pixel_count(request.width, request.height);
        match request.view_mode {
            ViewMode::Depth => PixelBuffer::DepthCm {
                width: request.width,
                height: request.height,
                data: vec![position.length(); pixels],
            },
            vm => {
                let color = match vm {
                    ViewMode::ObjectMask => self
                        .mask_colors
                        .first()
                        .map(|o| o.color)
                        .unwrap_or(Rgb::BLACK),
                    ViewMode::Normal => Rgb::new(127, 127, 255),
                    _ => Rgb::new(
                        (position.x.abs() as u32 % 256) as u8,
                        (position.y.abs() as u32 % 256) as u8,
                        (position.z.abs() as u32 % 256) as u8,
                    ),
                };
                let mut data = Vec::with_capacity(pixels * 4);
                for _ in 0..pixels {
                    data.extend_from_slice(&[color.r, color.g, color.b, 255]);
                }
                PixelBuffer::Rgba8 {
                    width: request.width,
                    height: request.height,
                    data,
                }
            }
        }
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

impl Renderer for MemoryRenderer {
    fn assign_mask_colors(&mut self, objects: &[SceneObject]) {
        self.mask_colors = objects.to_vec();
    }

    fn set_view(&mut self, view: &CameraView) {
        self.view = Some(view.clone());
    }

    fn apply_settings(&mut self, settings: &RenderSettings) {
        self.settings = Some(settings.clone());
    }

    fn capture(&mut self, request: CaptureRequest) -> CaptureTicket {
        let view = self.view.clone().unwrap_or(CameraView {
            name: request.view.clone(),
            transform: Transform::default(),
            field_of_view: 90.0,
        });
        let buffer = self.fill(&request, view.transform.position);
        self.captures.push(CaptureRecord {
            view,
            view_mode: request.view_mode,
            settings: self.settings.clone(),
        });
        CaptureTicket::ready(format!("{}/{}", request.view, request.view_mode), buffer)
    }
}
