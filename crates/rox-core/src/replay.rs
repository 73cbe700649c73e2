//! # Replay Module
//!
//! Rebuilds recorded sequences frame by frame and captures every camera in
//! every enabled view mode.
//!
//! ## Responsibilities
//! - **State machine**: `ReplayDriver::step` runs one state and returns the settle
//!   time to wait before the next one. Nothing in here sleeps.
//! - **Scheduling**: `ReplayDriver::run` drives `step` against a `Clock`.
//! - **Session state**: Instance colors, cached physics flags and the loaded
//!   sequence all live on the driver, scoped to one run.
//!
//! ## Order
//! For each sequence, for each frame: apply objects and bones, place cameras,
//! then for each camera view, for each view mode: configure, capture.

use crate::codec::int_to_string_digits;
use crate::color::{ColorRegistry, ColorScheme};
use crate::config::ReplayConfig;
use crate::export::{ExportJob, ExportSettings, ImageExporter};
use crate::scene::{CameraView, CaptureRequest, Clock, PhysicsFlags, Renderer, SceneHandle};
use crate::sequence::SequenceStore;
use crate::systems::StatusReporter;
use crate::types::{CameraConfig, Frame};
use crate::view_mode::ViewMode;
use crate::AssetLoader;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayState {
    /// Load sequence `sequence` and prepare the scene for it.
    RebuildBegin { sequence: usize },
    /// Apply object and skeleton poses of `frame`.
    Main { frame: usize },
    /// Apply camera poses of `frame`.
    PlaceCameras { frame: usize },
    /// Configure the renderer for view `view` in view mode `mode`.
    ChangeViewMode { view: usize, mode: usize },
    TakeScreenshot { view: usize, mode: usize },
    Finished,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub sequences: usize,
    pub skipped_sequences: usize,
    pub frames: usize,
    pub captures: usize,
    /// Files written by the exporter.
    pub images: usize,
    pub failed_exports: usize,
}

/// Wait between two playback frames, `(next - current)` ms scaled by `speed`.
pub fn playback_delay(current_ms: f32, next_ms: f32, speed: f32) -> Duration {
    let secs = (next_ms - current_ms) / 1000.0 / speed;
    Duration::try_from_secs_f32(secs.max(0.0)).unwrap_or(Duration::ZERO)
}

pub struct ReplayDriver<S: SceneHandle, R: Renderer> {
    config: ReplayConfig,
    loader: Arc<dyn AssetLoader>,
    clock: Arc<dyn Clock>,
    scene: S,
    renderer: R,
    colors: ColorRegistry,
    exporter: Option<ImageExporter>,
    state: ReplayState,

    sequence: usize,
    store: Option<SequenceStore>,
    frame_idx: usize,
    prefetched: Option<(usize, Frame)>,
    cameras: Vec<CameraConfig>,
    views: Vec<CameraView>,
    tracked: Vec<String>,
    physics_cache: BTreeMap<String, PhysicsFlags>,
    status: Option<StatusReporter>,
    stats: ReplayStats,
}

impl<S: SceneHandle, R: Renderer> ReplayDriver<S, R> {
    pub fn new(
        config: ReplayConfig,
        loader: Arc<dyn AssetLoader>,
        clock: Arc<dyn Clock>,
        scene: S,
        renderer: R,
    ) -> Self {
        let exporter = ImageExporter::new(ExportSettings {
            rgb_format: config.rgb_format,
            depth_range_cm: config.depth_range_cm,
            depth_txt: config.depth_txt,
        });
        Self {
            config,
            loader,
            clock,
            scene,
            renderer,
            colors: ColorRegistry::new(ColorScheme::Shell),
            exporter: Some(exporter),
            state: ReplayState::RebuildBegin { sequence: 0 },
            sequence: 0,
            store: None,
            frame_idx: 0,
            prefetched: None,
            cameras: Vec::new(),
            views: Vec::new(),
            tracked: Vec::new(),
            physics_cache: BTreeMap::new(),
            status: None,
            stats: ReplayStats::default(),
        }
    }

    pub fn with_color_scheme(mut self, scheme: ColorScheme) -> Self {
        self.colors = ColorRegistry::new(scheme);
        self
    }

    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn colors(&self) -> &ColorRegistry {
        &self.colors
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    pub fn into_parts(self) -> (S, R) {
        let Self {
            scene, renderer, ..
        } = self;
        (scene, renderer)
    }

    /// Runs the current state. Returns the delay before the next step, or
    /// `None` once the replay has finished.
    pub fn step(&mut self) -> Option<Duration> {
        let state = std::mem::replace(&mut self.state, ReplayState::Finished);
        let (next, delay) = match state {
            ReplayState::RebuildBegin { sequence } => self.rebuild_begin(sequence),
            ReplayState::Main { frame } => self.rebuild_frame(frame),
            ReplayState::PlaceCameras { frame } => self.place_cameras(frame),
            ReplayState::ChangeViewMode { view, mode } => self.change_view_mode(view, mode),
            ReplayState::TakeScreenshot { view, mode } => self.take_screenshot(view, mode),
            ReplayState::Finished => return None,
        };
        self.state = next;
        Some(delay)
    }

    /// Steps until finished, sleeping on the clock between steps, then waits
    /// for the pending image writes.
    #[instrument(level = "info", skip(self), fields(sequences = self.config.sequences.len()))]
    pub fn run(&mut self) -> ReplayStats {
        while let Some(delay) = self.step() {
            if !delay.is_zero() {
                self.clock.sleep(delay);
            }
        }
        self.finish_exports();
        info!(
            "Replay finished: {} sequences ({} skipped), {} frames, {} captures, {} files",
            self.stats.sequences,
            self.stats.skipped_sequences,
            self.stats.frames,
            self.stats.captures,
            self.stats.images
        );
        self.stats
    }

    /// Waits for queued captures to be written and folds the counts into the stats.
    pub fn finish_exports(&mut self) {
        if let Some(exporter) = self.exporter.take() {
            let export = exporter.finish();
            self.stats.images += export.images;
            self.stats.failed_exports += export.failed;
        }
    }

    fn job_name(&self) -> &str {
        self.config
            .sequences
            .get(self.sequence)
            .map(|j| j.name.as_str())
            .unwrap_or_default()
    }

    fn skip_sequence(&mut self, sequence: usize) -> (ReplayState, Duration) {
        self.stats.skipped_sequences += 1;
        (
            ReplayState::RebuildBegin {
                sequence: sequence + 1,
            },
            Duration::ZERO,
        )
    }

    fn rebuild_begin(&mut self, sequence: usize) -> (ReplayState, Duration) {
        let Some(job) = self.config.sequences.get(sequence).cloned() else {
            self.restore_physics();
            return (ReplayState::Finished, Duration::ZERO);
        };
        self.sequence = sequence;
        self.store = None;
        self.prefetched = None;
        self.views.clear();

        let path = self.config.sequence_path(&job);
        let store = match SequenceStore::load(self.loader.as_ref(), &path.to_string_lossy()) {
            Ok(store) => store,
            Err(e) => {
                error!("Skipping sequence '{}': {}", job.name, e);
                return self.skip_sequence(sequence);
            }
        };
        if store.is_empty() {
            warn!("Skipping sequence '{}': no frames", job.name);
            return self.skip_sequence(sequence);
        }

        let paintable = self.scene.paintable_objects();
        let objects = self.colors.assign(&paintable);
        self.renderer.assign_mask_colors(objects);
        let registry_path = self
            .config
            .output_dir
            .join(&job.name)
            .join("sceneObject.json");
        if let Err(e) = self.colors.write_json(&registry_path) {
            warn!("Could not write {}: {}", registry_path.display(), e);
        }

        self.cameras = store
            .camera_configs()
            .iter()
            .filter(|c| {
                let found = self.scene.has_camera(&c.name);
                if !found {
                    warn!("Camera '{}' is not in the scene", c.name);
                }
                found
            })
            .cloned()
            .collect();
        for pawn in store.pawn_infos() {
            if !self.scene.has_skeleton(&pawn.name) {
                warn!("Skeleton '{}' is not in the scene", pawn.name);
            }
        }

        self.tracked = self.scene.movable_objects();
        self.disable_physics();

        if let Some(camera) = self.cameras.first() {
            if let Some(t) = self.scene.camera_transform(&camera.name) {
                if let Some(view) = CameraView::for_camera(camera, t).first() {
                    self.renderer.set_view(view);
                }
            }
        }

        let start = job.start_frame;
        if start >= store.frame_count() {
            warn!(
                "Start frame {} is past the end of '{}' ({} frames)",
                start,
                job.name,
                store.frame_count()
            );
        }
        info!(
            "Rebuilding '{}': {} frames from frame {}, {} cameras, {} view modes",
            job.name,
            store.frame_count(),
            start,
            self.cameras.len(),
            self.config.view_modes.len()
        );

        self.status = Some(StatusReporter::new(
            self.config.status_period,
            start,
            store.frame_count(),
            self.clock.now(),
        ));
        self.store = Some(store);

        (ReplayState::Main { frame: start }, self.config.delays.initial)
    }

    fn frame_count(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.frame_count())
    }

    fn cloned_frame(&self, index: usize) -> Option<Frame> {
        self.store
            .as_ref()
            .and_then(|s| s.frame(index).ok())
            .cloned()
    }

    fn rebuild_frame(&mut self, frame_idx: usize) -> (ReplayState, Duration) {
        if frame_idx >= self.frame_count() {
            if self.store.take().is_some() {
                self.stats.sequences += 1;
                info!("Sequence '{}' done", self.job_name());
            }
            return (
                ReplayState::RebuildBegin {
                    sequence: self.sequence + 1,
                },
                Duration::ZERO,
            );
        }

        let now = self.clock.now();
        if let Some(status) = self.status.as_mut() {
            status.frame_started(frame_idx, now);
        }

        let frame = match self.prefetched.take() {
            Some((idx, frame)) if idx == frame_idx => Some(frame),
            _ => self.cloned_frame(frame_idx),
        };
        let Some(frame) = frame else {
            return (
                ReplayState::RebuildBegin {
                    sequence: self.sequence + 1,
                },
                Duration::ZERO,
            );
        };

        self.apply_objects(&frame);
        self.frame_idx = frame_idx;
        self.stats.frames += 1;

        if self.config.playback_only {
            self.apply_cameras(&frame);
            let speed = self.config.clamped_playback_speed();
            let delay = match self.cloned_frame(frame_idx + 1) {
                Some(next) => {
                    let delay = playback_delay(frame.time_stamp, next.time_stamp, speed);
                    self.prefetched = Some((frame_idx + 1, next));
                    delay
                }
                None => Duration::ZERO,
            };
            return (ReplayState::Main { frame: frame_idx + 1 }, delay);
        }

        self.prefetched = Some((frame_idx, frame));
        (
            ReplayState::PlaceCameras { frame: frame_idx },
            self.config.delays.place_cameras,
        )
    }

    fn apply_objects(&mut self, frame: &Frame) {
        for name in &self.tracked {
            if let Some(object) = frame.objects.get(name) {
                self.scene.set_object_transform(name, object.transform);
            }
        }
        for (name, skeleton) in &frame.skeletons {
            if !self.scene.has_skeleton(name) {
                continue;
            }
            for (bone, state) in &skeleton.bones {
                self.scene.set_bone_transform(name, bone, state.transform);
            }
        }
    }

    fn apply_cameras(&mut self, frame: &Frame) {
        for camera in &self.cameras {
            if let Some(state) = frame.cameras.get(&camera.name) {
                self.scene.set_camera_transform(&camera.name, state.transform);
            }
        }
    }

    fn place_cameras(&mut self, frame_idx: usize) -> (ReplayState, Duration) {
        let frame = match self.prefetched.take() {
            Some((idx, frame)) if idx == frame_idx => Some(frame),
            _ => self.cloned_frame(frame_idx),
        };
        if let Some(frame) = frame {
            self.apply_cameras(&frame);
        }

        self.views = self
            .cameras
            .iter()
            .flat_map(|camera| {
                let t = self.scene.camera_transform(&camera.name).unwrap_or_default();
                CameraView::for_camera(camera, t)
            })
            .collect();

        if self.views.is_empty() || self.config.view_modes.is_empty() {
            warn!("Frame {}: nothing to capture", frame_idx);
            return (
                ReplayState::Main {
                    frame: frame_idx + 1,
                },
                self.config.delays.change_view_mode,
            );
        }

        (
            ReplayState::ChangeViewMode { view: 0, mode: 0 },
            self.config.delays.first_view_mode,
        )
    }

    fn change_view_mode(&mut self, view: usize, mode: usize) -> (ReplayState, Duration) {
        if mode == 0 {
            if let Some(v) = self.views.get(view) {
                self.renderer.set_view(v);
            }
        }
        if let Some(vm) = self.config.view_modes.get(mode) {
            self.renderer.apply_settings(&vm.configure());
        }
        (
            ReplayState::TakeScreenshot { view, mode },
            self.config.delays.take_screenshot,
        )
    }

    fn take_screenshot(&mut self, view: usize, mode: usize) -> (ReplayState, Duration) {
        if let (Some(v), Some(&vm)) = (self.views.get(view), self.config.view_modes.get(mode)) {
            let ticket = self.renderer.capture(CaptureRequest {
                view: v.name.clone(),
                view_mode: vm,
                width: self.config.width,
                height: self.config.height,
            });
            let base = self.image_base(vm, &v.name);
            debug!("Capture {} -> {}", ticket.label(), base.display());
            if let Some(exporter) = &self.exporter {
                exporter.submit(ExportJob {
                    ticket,
                    view_mode: vm,
                    base,
                });
            }
            self.stats.captures += 1;
        }

        let delay = self.config.delays.change_view_mode;
        if mode + 1 < self.config.view_modes.len() {
            (ReplayState::ChangeViewMode { view, mode: mode + 1 }, delay)
        } else if view + 1 < self.views.len() {
            (
                ReplayState::ChangeViewMode {
                    view: view + 1,
                    mode: 0,
                },
                delay,
            )
        } else {
            (
                ReplayState::Main {
                    frame: self.frame_idx + 1,
                },
                delay,
            )
        }
    }

    /// Output path of the current frame for `view` in `vm`, without extension.
    fn image_base(&self, vm: ViewMode, view: &str) -> PathBuf {
        self.config
            .layout
            .image_dir(&self.config.output_dir, self.job_name(), vm, view)
            .join(int_to_string_digits(
                self.frame_idx as i64,
                self.config.frame_id_width,
            ))
    }

    /// Turns off gravity and simulation on tracked objects, remembering the
    /// original flags the first time each object is seen.
    fn disable_physics(&mut self) {
        for name in &self.tracked {
            if let Some(flags) = self.scene.physics(name) {
                self.physics_cache.entry(name.clone()).or_insert(flags);
                self.scene.set_physics(name, PhysicsFlags::DISABLED);
            }
        }
    }

    fn restore_physics(&mut self) {
        for (name, flags) in &self.physics_cache {
            self.scene.set_physics(name, *flags);
        }
        debug!("Restored physics on {} objects", self.physics_cache.len());
    }
}
