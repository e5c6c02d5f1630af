use std::sync::Mutex;

use tempfile::NamedTempFile;

use invigil::config::InvigildConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "INVIGIL_CONFIG",
        "INVIGIL_API_ADDR",
        "INVIGIL_BACKEND",
        "INVIGIL_FACE_MODEL",
        "INVIGIL_BODY_MODEL",
        "INVIGIL_ENCODER_MODEL",
        "INVIGIL_MATCH_THRESHOLD",
        "INVIGIL_AWAY_SECS",
        "INVIGIL_SESSION_IDLE_SECS",
        "INVIGIL_MAX_FRAME_BYTES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = InvigildConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "127.0.0.1:8471");
    assert_eq!(cfg.detector.backend, "stub");
    assert!(cfg.detector.face_model.is_none());
    assert_eq!(cfg.session.away_threshold.as_secs(), 5);
    assert_eq!(cfg.session.idle.as_secs(), 3600);
    assert!((cfg.identity.match_threshold - 0.6).abs() < 1e-6);

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "api": {
            "addr": "0.0.0.0:9000",
            "max_frame_bytes": 1048576
        },
        "detector": {
            "backend": "tract",
            "face_model": "models/face.onnx",
            "body_model": "models/body.onnx"
        },
        "identity": {
            "encoder_model": "models/encoder.onnx",
            "match_threshold": 0.45
        },
        "session": {
            "away_threshold_secs": 8,
            "idle_secs": 600
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("INVIGIL_CONFIG", file.path());
    std::env::set_var("INVIGIL_AWAY_SECS", "12");
    std::env::set_var("INVIGIL_BACKEND", "stub");

    let cfg = InvigildConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "0.0.0.0:9000");
    assert_eq!(cfg.max_frame_bytes, 1048576);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(
        cfg.detector.face_model.as_deref(),
        Some(std::path::Path::new("models/face.onnx"))
    );
    assert_eq!(
        cfg.detector.body_model.as_deref(),
        Some(std::path::Path::new("models/body.onnx"))
    );
    assert_eq!(
        cfg.identity.encoder_model.as_deref(),
        Some(std::path::Path::new("models/encoder.onnx"))
    );
    assert!((cfg.identity.match_threshold - 0.45).abs() < 1e-6);
    assert_eq!(cfg.session.away_threshold.as_secs(), 12);
    assert_eq!(cfg.session.idle.as_secs(), 600);

    clear_env();
}

#[test]
fn tract_backend_requires_a_face_model() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("INVIGIL_BACKEND", "tract");
    let err = InvigildConfig::load().unwrap_err();
    assert!(err.to_string().contains("face model"));

    clear_env();
}

#[test]
fn unknown_backend_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("INVIGIL_BACKEND", "darknet");
    assert!(InvigildConfig::load().is_err());

    clear_env();
}

#[test]
fn invalid_threshold_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("INVIGIL_MATCH_THRESHOLD", "0");
    assert!(InvigildConfig::load().is_err());

    std::env::set_var("INVIGIL_MATCH_THRESHOLD", "not-a-number");
    assert!(InvigildConfig::load().is_err());

    clear_env();
}
