use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tempfile::NamedTempFile;

use zone_notifier::{Args, Config, InferenceBackend, InferenceTarget, InputSelection};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ZONE_NOTIFIER_CONFIG",
        "ZONE_INPUT",
        "ZONE_DEVICE",
        "ZONE_MODEL",
        "ZONE_MODEL_CONFIDENCE",
        "ZONE_BACKEND",
        "ZONE_TARGET",
        "ZONE_X",
        "ZONE_Y",
        "ZONE_WIDTH",
        "ZONE_HEIGHT",
        "ZONE_PUBLISH",
        "ZONE_RATE",
        "ZONE_DELAY",
        "ZONE_SNAPSHOT_DIR",
        "ZONE_UI",
        "MQTT_BROKER_ADDR",
        "MQTT_CLIENT_ID",
        "MQTT_USERNAME",
        "MQTT_PASSWORD",
        "MQTT_TOPIC",
        "MQTT_USE_TLS",
        "MQTT_TLS_CA_PATH",
        "MQTT_TLS_CLIENT_CERT_PATH",
        "MQTT_TLS_CLIENT_KEY_PATH",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "input": "stub://loading_bay?frames=100",
            "detector": {
                "backend": "stub",
                "target": "cpu",
                "confidence": 0.7
            },
            "zone": { "x": 10, "y": 20, "width": 300, "height": 200 },
            "publish": { "enabled": true, "rate_secs": 2.5, "topic": "plant/press-3/zone" },
            "playback": { "delay_ms": 40.0 },
            "mqtt": {
                "broker_addr": "mqtt://broker.local:1884",
                "client_id": "press-3"
            }
        }"#,
    );

    std::env::set_var("ZONE_NOTIFIER_CONFIG", file.path());
    std::env::set_var("ZONE_X", "15");
    std::env::set_var("MQTT_CLIENT_ID", "press-3-night");

    let args = Args::try_parse_from(["zone_notifier", "--height", "-1"]).expect("parse args");
    let cfg = Config::from_args(args).expect("load config");

    assert_eq!(
        cfg.input,
        InputSelection::File(PathBuf::from("stub://loading_bay?frames=100"))
    );
    assert_eq!(cfg.detector.backend, InferenceBackend::Stub);
    assert_eq!(cfg.detector.target, InferenceTarget::Cpu);
    assert_eq!(cfg.detector.confidence, 0.7);
    assert_eq!(cfg.geometry.x, 15);
    assert_eq!(cfg.geometry.y, 20);
    assert_eq!(cfg.geometry.width, 300);
    assert_eq!(cfg.geometry.height, -1);
    assert!(cfg.publish);
    assert_eq!(cfg.rate, Duration::from_millis(2500));
    assert_eq!(cfg.delay, Duration::from_millis(40));
    assert_eq!(cfg.topic, "plant/press-3/zone");
    assert_eq!(cfg.mqtt.broker, "mqtt://broker.local:1884");
    assert_eq!(cfg.mqtt.client_id, "press-3-night");

    let settings = cfg.pipeline_settings();
    assert_eq!(settings.publish_rate, cfg.rate);
    assert_eq!(settings.topic, cfg.topic);

    clear_env();
}

#[test]
fn command_line_beats_environment() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ZONE_BACKEND", "stub");
    std::env::set_var("ZONE_DEVICE", "1");
    std::env::set_var("ZONE_TARGET", "opencl");

    let args = Args::try_parse_from(["zone_notifier", "--device", "3", "--target", "0"])
        .expect("parse args");
    let cfg = Config::from_args(args).expect("load config");
    assert_eq!(cfg.input, InputSelection::Device(3));
    assert_eq!(cfg.detector.target, InferenceTarget::Cpu);

    clear_env();
}

#[test]
fn rejects_unknown_and_malformed_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let unknown = write_config(r#"{ "detector": { "backend": "stub" }, "colour": "red" }"#);
    let args = Args::try_parse_from([
        "zone_notifier",
        "--config",
        unknown.path().to_str().expect("utf-8 path"),
    ])
    .expect("parse args");
    let err = Config::from_args(args).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    let args = Args::try_parse_from(["zone_notifier", "--config", "/nonexistent/zone.json"])
        .expect("parse args");
    let err = Config::from_args(args).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    std::env::set_var("ZONE_BACKEND", "stub");
    let args = Args::try_parse_from(["zone_notifier", "--rate", "0"]).expect("parse args");
    assert!(Config::from_args(args).is_err());

    clear_env();
}

#[test]
fn default_backend_needs_a_model_backend_compiled_in() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let args = Args::try_parse_from(["zone_notifier"]).expect("parse args");
    let result = Config::from_args(args);
    if cfg!(feature = "backend-tract") {
        // Auto resolves to tract, which still needs a model path.
        assert!(result.unwrap_err().to_string().contains("--model"));
    } else {
        assert!(result.unwrap_err().to_string().contains("backend-tract"));
    }

    clear_env();
}
