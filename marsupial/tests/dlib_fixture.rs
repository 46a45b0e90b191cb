//! Trains on the road-sign fixtures with the real dlib backend.
//!
//! Needs `--features dlib`, a built dlib (`build-dlib`) and the fixture set in
//! `tests/fixtures/` (`trainingData.json`, the training images, `to_test.jpg`).
#![cfg(feature = "dlib")]

use marsupial::{load_training_records, AsyncBridge, BackendType, MarsupialError};
use std::path::PathBuf;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires fixture images and libdlib
async fn trains_and_finds_the_sign() {
    let records = load_training_records(fixtures().join("trainingData.json")).unwrap();
    let output = tempfile::tempdir().unwrap();
    let detector = output.path().join("object_detector.svm");

    let bridge = AsyncBridge::from_current(BackendType::Dlib.create()).unwrap();
    bridge
        .train_object_detector(records, &detector)
        .await
        .unwrap();
    assert!(detector.is_file());

    let detected = bridge
        .detect_objects(fixtures().join("to_test.jpg"), &detector)
        .await
        .unwrap();

    assert_eq!(detected.len(), 1);
    let found = detected[0].bbox;
    assert!((120..=140).contains(&found.top), "top = {}", found.top);
    assert!((390..=405).contains(&found.left), "left = {}", found.left);
    assert!((210..=225).contains(&found.width), "width = {}", found.width);
    assert!((210..=225).contains(&found.height), "height = {}", found.height);
}

#[tokio::test]
#[ignore] // Requires libdlib
async fn untrained_detector_path_fails() {
    let bridge = AsyncBridge::from_current(BackendType::Dlib.create()).unwrap();
    let err = bridge
        .detect_objects(fixtures().join("to_test.jpg"), "/nonexistent/object_detector.svm")
        .await
        .unwrap_err();
    assert!(matches!(err, MarsupialError::Native(_)));
}
