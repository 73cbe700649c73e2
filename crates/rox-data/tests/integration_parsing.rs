use rox_data::model::{SceneObjectsDocument, SequenceDocument};

const SEQUENCE: &str = r#"{
  "name": "living_room",
  "total_frames": 2,
  "total_time": 0.033,
  "mean_framerate": 60.6,
  "cameras": [{ "name": "Cam0", "stereo": 6.5, "fov": 90 }],
  "skeletons": [{ "name": "Pawn0", "num_bones": 1 }],
  "non_movable_objects": [
    {
      "name": "Wall",
      "position": { "x": 0, "y": 0, "z": 0 },
      "rotation": { "p": 0, "y": 0, "r": 0 },
      "boundingbox_min": { "x": -100, "y": -5, "z": 0 },
      "boundingbox_max": { "x": 100, "y": 5, "z": 250 }
    }
  ],
  "frames": [
    {
      "id": "000000",
      "timestamp": 1000.0,
      "cameras": [{ "name": "Cam0", "position": { "x": 0, "y": 0, "z": 170 }, "rotation": { "p": -10, "y": 0, "r": 0 } }],
      "objects": [],
      "skeletons": [{
        "name": "Pawn0",
        "position": { "x": 0, "y": 0, "z": 90 },
        "rotation": { "p": 0, "y": 0, "r": 0 },
        "bones": [{ "name": "head", "position": { "x": 0, "y": 0, "z": 160 }, "rotation": { "p": 0, "y": 0, "r": 0 } }]
      }]
    },
    {
      "id": "000001",
      "timestamp": 1033.0,
      "cameras": [],
      "objects": [],
      "skeletons": []
    }
  ]
}"#;

#[test]
fn test_parse_sequence_document() {
    let res: Result<SequenceDocument, _> = serde_json::from_str(SEQUENCE);
    match res {
        Ok(doc) => {
            assert_eq!(doc.total_frames, 2);
            assert_eq!(doc.cameras[0].stereo, 6.5);
            assert_eq!(doc.skeletons[0].num_bones, 1);
            assert_eq!(doc.non_movable_objects[0].boundingbox_max.z, 250.0);
            assert_eq!(doc.frames[0].skeletons[0].bones[0].name, "head");
            assert_eq!(doc.frames[1].id, "000001");
        }
        Err(e) => panic!("Failed to parse sequence document: {}", e),
    }
}

#[test]
fn test_sequence_document_survives_reserialization() {
    let doc: SequenceDocument = serde_json::from_str(SEQUENCE).unwrap();
    let text = serde_json::to_string_pretty(&doc).unwrap();
    let again: SequenceDocument = serde_json::from_str(&text).unwrap();
    assert_eq!(doc, again);
}

#[test]
fn test_missing_total_frames_is_an_error() {
    let res: Result<SequenceDocument, _> = serde_json::from_str(r#"{ "name": "x" }"#);
    assert!(res.is_err());
}

#[test]
fn test_scene_objects_key_name() {
    let doc = SceneObjectsDocument::default();
    let text = serde_json::to_string(&doc).unwrap();
    assert_eq!(text, r#"{"SceneObjects":[]}"#);
}
