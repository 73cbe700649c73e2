use glam::Vec3;
use rox_core::codec::convert_raw_file;
use rox_core::color::assign_color;
use rox_core::config::{Delays, SequenceJob};
use rox_core::scene::memory::{MemoryObject, MemoryRenderer, MemoryScene};
use rox_core::types::{CameraConfig, Transform};
use rox_core::{
    DefaultAssetLoader, ManualClock, Recorder, RecorderConfig, ReplayConfig, ReplayDriver,
    SceneHandle, ViewMode,
};
use std::sync::Arc;
use std::time::Duration;

fn live_scene() -> MemoryScene {
    let mut scene = MemoryScene::new();
    scene.add_camera(
        CameraConfig {
            name: "Cam0".into(),
            stereo_baseline: 6.4,
            field_of_view: 90.0,
        },
        Transform::from_position(Vec3::new(-100.0, 0.0, 50.0)),
    );
    scene.add_object("Box0", MemoryObject::at(Vec3::ZERO));
    scene.add_object("Ball", MemoryObject::at(Vec3::new(0.0, 30.0, 0.0)));
    scene
}

#[test]
fn recorded_session_replays_into_an_image_tree() {
    let dir = tempfile::tempdir().unwrap();
    let scene_dir = dir.path().join("SceneText");
    let clock = Arc::new(ManualClock::new());

    // Record four ticks of Box0 sliding along x.
    let mut live = live_scene();
    let mut recorder = Recorder::new(
        RecorderConfig {
            scene_dir: scene_dir.clone(),
            file_prefix: "scene".into(),
        },
        clock.clone(),
    );
    assert!(recorder.toggle_recording(&live));
    for i in 0..4 {
        live.set_object_transform(
            "Box0",
            Transform::from_position(Vec3::new(10.0 * i as f32, 0.0, 0.0)),
        );
        recorder.on_tick(&live);
        clock.advance(Duration::from_millis(50));
    }
    let raw = recorder.current_file().unwrap().to_path_buf();
    assert!(!recorder.toggle_recording(&live));
    let written = recorder.finish();
    assert_eq!(written.failed, 0);

    let json = scene_dir.join("take.json");
    let sequence = convert_raw_file(&raw, &json, 6).unwrap();
    assert_eq!(sequence.name, raw.file_stem().unwrap().to_string_lossy());
    assert_eq!(sequence.total_frames, 4);
    assert!((sequence.total_time - 0.15).abs() < 1e-3);

    // Replay into a fresh scene built from the recording.
    let out = dir.path().join("Screenshots");
    let config = ReplayConfig {
        scene_dir,
        sequences: vec![SequenceJob::new("take")],
        output_dir: out.clone(),
        view_modes: vec![ViewMode::Lit, ViewMode::ObjectMask],
        width: 4,
        height: 4,
        delays: Delays::NONE,
        ..Default::default()
    };
    let mut driver = ReplayDriver::new(
        config,
        Arc::new(DefaultAssetLoader),
        Arc::new(ManualClock::new()),
        MemoryScene::from_sequence(&sequence),
        MemoryRenderer::new(),
    );
    let stats = driver.run();

    assert_eq!(stats.sequences, 1);
    assert_eq!(stats.frames, 4);
    // Stereo camera: two eyes, two view modes, four frames.
    assert_eq!(stats.captures, 16);
    assert_eq!(stats.failed_exports, 0);
    assert_eq!(stats.images, 16);

    assert!(out.join("take/rgb/Cam0_left/000000.jpg").exists());
    assert!(out.join("take/mask/Cam0_right/000003.png").exists());
    assert!(out.join("take/sceneObject.json").exists());

    // Last applied pose wins.
    assert_eq!(
        driver.scene().object_transform("Box0").unwrap().position,
        Vec3::new(30.0, 0.0, 0.0)
    );

    // Paintable objects are registered in name order from index 1.
    let colors = driver.colors();
    assert_eq!(colors.find_by_name("Ball").unwrap().color, assign_color(1));
    assert_eq!(colors.find_by_name("Box0").unwrap().color, assign_color(2));
}
