use planar_kinematics::calib::CalibrationProfile;
use planar_kinematics::core::{ImageSize, PatternSize};
use planar_kinematics::{JsonProfileStore, ProfileStore, StoreError};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn profile(name: &str, fx: f64) -> CalibrationProfile {
    CalibrationProfile {
        name: name.to_string(),
        camera_matrix: [[fx, 0.0, 640.0], [0.0, fx, 360.0], [0.0, 0.0, 1.0]],
        dist_coefs: [0.12, -0.3, 0.0005, 0.0, 0.1],
        square_size: 24.0,
        pattern_size: PatternSize::new(6, 9),
        image_size: Some(ImageSize {
            width: 1280,
            height: 720,
        }),
        rms: Some(0.41),
    }
}

#[test]
fn profiles_survive_reopening() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("calibration_db.json");

    let mut store = JsonProfileStore::new(&path);
    store.save(&profile("phone", 1050.0)).unwrap();
    store.save(&profile("webcam", 620.0)).unwrap();

    let reopened = JsonProfileStore::new(&path);
    assert_eq!(reopened.names().unwrap(), ["phone", "webcam"]);
    assert_eq!(reopened.load("webcam").unwrap(), Some(profile("webcam", 620.0)));
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn saving_twice_keeps_the_first_profile() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonProfileStore::new(dir.path().join("db.json"));
    store.save(&profile("phone", 1050.0)).unwrap();
    let err = store.save(&profile("phone", 900.0)).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(ref n) if n == "phone"), "{err}");
    assert_eq!(
        store.load("phone").unwrap().unwrap().camera_matrix[0][0],
        1050.0
    );

    store.remove("phone").unwrap();
    store.save(&profile("phone", 900.0)).unwrap();
    assert_eq!(store.load("phone").unwrap().unwrap().camera_matrix[0][0], 900.0);
}

#[test]
fn legacy_database_loads() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration_db.json");
    std::fs::write(
        &path,
        r#"{
            "old_cam": {
                "camera_matrix": [[812.5, 0.0, 319.5], [0.0, 810.0, 239.5], [0.0, 0.0, 1.0]],
                "dist_coefs": [[-0.21, 0.08, 0.001, -0.0004, 0.0]],
                "square_size": 2.5,
                "pattern_size": [9, 6]
            }
        }"#,
    )
    .unwrap();

    let store = JsonProfileStore::new(&path);
    let p = store.load("old_cam").unwrap().unwrap();
    assert_eq!(p.name, "old_cam");
    assert_eq!(p.pattern_size, PatternSize::new(6, 9));
    assert_eq!(p.dist_coefs, [-0.21, 0.08, 0.001, -0.0004, 0.0]);
    assert_eq!(p.image_size, None);
    assert_eq!(p.rms, None);
    assert_eq!(p.camera_model().intrinsics.fy, 810.0);
}

#[test]
fn corrupt_database_is_reported() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    std::fs::write(&path, "{ not json").unwrap();
    let store = JsonProfileStore::new(&path);
    assert!(matches!(store.names(), Err(StoreError::Json { .. })));
}

#[test]
fn removing_unknown_profile_fails() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonProfileStore::new(dir.path().join("db.json"));
    assert!(matches!(store.remove("ghost"), Err(StoreError::NotFound(_))));
}
