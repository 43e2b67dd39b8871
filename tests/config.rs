use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use nav_assist::config::{ModelBackendKind, NavConfig, VoiceEngineKind};
use nav_assist::{Language, SourceDescriptor};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "NAV_CONFIG",
        "NAV_SOURCE",
        "NAV_MODEL",
        "NAV_CONF_THRESHOLD",
        "NAV_RECORDING_DIR",
        "NAV_LANGUAGE",
        "NAV_VOICE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_file_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    write!(
        file,
        r#"
        source = "webcam:2"

        [detection]
        model = "yolo11n"
        confidence_threshold = 0.4

        [voice]
        engine = "command"
        command = "espeak"
        cooldown_secs = 3

        [recording]
        dir = "/var/lib/navassist"
        codec = "MJPG"
        keep = 3
        "#
    )
    .expect("write config");

    std::env::set_var("NAV_MODEL", "synthetic");
    std::env::set_var("NAV_VOICE", "off");
    std::env::set_var("NAV_RECORDING_DIR", "/tmp/nav-recordings");

    let cfg = NavConfig::load_from(Some(file.path())).expect("load config");
    clear_env();

    assert_eq!(cfg.source, SourceDescriptor::Webcam(2));
    assert_eq!(cfg.detection.model, "synthetic");
    assert_eq!(cfg.detection.confidence_threshold, 0.4);
    assert_eq!(cfg.voice.engine, VoiceEngineKind::Command);
    assert_eq!(cfg.voice.command, "espeak");
    assert_eq!(cfg.voice.cooldown, Duration::from_secs(3));
    assert!(!cfg.voice.enabled);
    assert_eq!(cfg.recording.dir, PathBuf::from("/tmp/nav-recordings"));
    assert_eq!(cfg.recording.codec.as_str(), "MJPG");
    assert_eq!(cfg.recording.keep, 3);
}

#[test]
fn loads_json_file_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    write!(
        file,
        r#"{{
            "source": "/data/walk.mp4",
            "detection": {{
                "model": "walkway",
                "models": [
                    {{ "name": "walkway", "backend": "synthetic" }},
                    {{ "name": "door", "backend": "onnx", "path": "/models/door.onnx", "input_size": 320 }}
                ]
            }},
            "voice": {{ "language": "en", "announce_zone": false }}
        }}"#
    )
    .expect("write config");

    let cfg = NavConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.source, SourceDescriptor::File(PathBuf::from("/data/walk.mp4")));
    assert_eq!(cfg.detection.models.len(), 2);
    assert_eq!(cfg.detection.models[1].backend, ModelBackendKind::Onnx);
    assert_eq!(cfg.detection.models[1].input_size, 320);
    assert_eq!(cfg.voice.language, Language::En);
    assert!(!cfg.voice.announce_zone);
    // Files are not mirrored by default.
    assert!(!cfg.pipeline_config().mirror);
}

#[test]
fn env_source_and_language_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("NAV_SOURCE", "external");
    std::env::set_var("NAV_LANGUAGE", "en");
    std::env::set_var("NAV_CONF_THRESHOLD", "0.6");
    let cfg = NavConfig::load_from(None).expect("load config");
    clear_env();

    assert_eq!(cfg.source, SourceDescriptor::External(1));
    assert_eq!(cfg.voice.language, Language::En);
    assert_eq!(cfg.detection.confidence_threshold, 0.6);
    assert!(!cfg.pipeline_config().mirror);
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("NAV_CONF_THRESHOLD", "high");
    assert!(NavConfig::load_from(None).is_err());
    std::env::set_var("NAV_CONF_THRESHOLD", "1.5");
    assert!(NavConfig::load_from(None).is_err());
    clear_env();

    std::env::set_var("NAV_LANGUAGE", "klingon");
    assert!(NavConfig::load_from(None).is_err());
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    write!(file, "[recording]\ncodec = \"h264x\"\n").expect("write config");
    assert!(NavConfig::load_from(Some(file.path())).is_err());

    assert!(NavConfig::load_from(Some(std::path::Path::new("/nonexistent/nav.toml"))).is_err());
}
