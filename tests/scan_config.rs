use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use taxicam::config::{ConfigError, ScanConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TAXICAM_CONFIG",
        "TAXICAM_SOURCE",
        "TAXICAM_MAX_FRAMES",
        "TAXICAM_MAX_FACES",
        "TAXICAM_FRAME_DELAY_MS",
        "TAXICAM_TARGET_DIR",
        "TAXICAM_ARCHIVE_DIR",
        "TAXICAM_RECIPIENTS",
        "TAXICAM_KEY_DIR",
        "TAXICAM_DETECTOR_BACKEND",
        "TAXICAM_DETECTOR_MODEL",
        "TAXICAM_LOGLEVEL",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": "stub://porch",
        "max_frames": 40,
        "max_faces": 4,
        "frame_delay_ms": 250,
        "target_dir": "/var/lib/taxicam/pictures",
        "recipients": ["keys/alice.pub", "keys/bob.pub"],
        "detector": {
            "backend": "scripted",
            "script": "3:2",
            "scale_factor": 1.1,
            "min_neighbors": 5,
            "min_size": [40, 40]
        },
        "annotation": { "draw": true, "color": [255, 0, 0], "width": 3 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("TAXICAM_CONFIG", file.path());
    std::env::set_var("TAXICAM_MAX_FRAMES", "60");
    std::env::set_var("TAXICAM_RECIPIENTS", "carol.pub, dave.pub");

    let cfg = ScanConfig::load().expect("load config");
    assert_eq!(cfg.source, "stub://porch");
    assert_eq!(cfg.max_frames, 60);
    assert_eq!(cfg.max_faces, 4);
    assert_eq!(cfg.frame_delay, Duration::from_millis(250));
    assert_eq!(cfg.target_dir, PathBuf::from("/var/lib/taxicam/pictures"));
    assert_eq!(
        cfg.recipients,
        vec![PathBuf::from("carol.pub"), PathBuf::from("dave.pub")]
    );
    assert_eq!(cfg.detector.backend, "scripted");
    assert_eq!(cfg.detector.script.as_deref(), Some("3:2"));
    assert_eq!(cfg.detector.min_neighbors, 5);
    assert_eq!(cfg.detector.min_size, (40, 40));
    assert!(cfg.annotation.draw);
    assert_eq!(cfg.annotation.style.color, [255, 0, 0]);
    assert_eq!(cfg.annotation.style.width, 3);

    clear_env();
}

#[test]
fn load_rejects_more_slots_than_frames() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TAXICAM_MAX_FRAMES", "5");
    std::env::set_var("TAXICAM_MAX_FACES", "10");
    std::env::set_var("TAXICAM_RECIPIENTS", "alice.pub");

    let err = ScanConfig::load().expect_err("config should be rejected");
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::MoreSlotsThanFrames {
            max_frames: 5,
            max_faces: 10
        })
    );

    clear_env();
}

#[test]
fn load_rejects_missing_recipients() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = ScanConfig::load().expect_err("config should be rejected");
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::NoRecipients)
    );
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TAXICAM_MAX_FRAMES", "lots");
    assert!(ScanConfig::load_unvalidated().is_err());

    clear_env();
}

#[test]
fn key_dir_supplies_sorted_recipients() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    for name in ["zed.pub", "amy.pub", "amy.key"] {
        std::fs::write(dir.path().join(name), "00").expect("write key");
    }
    std::env::set_var("TAXICAM_KEY_DIR", dir.path());

    let cfg = ScanConfig::load().expect("load config");
    assert_eq!(
        cfg.resolve_recipients().expect("recipients"),
        vec![dir.path().join("amy.pub"), dir.path().join("zed.pub")]
    );

    clear_env();
}
