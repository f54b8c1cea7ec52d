//! Runtime configuration.
//!
//! Layered: built-in defaults, then an optional JSON file (`--config` or
//! `ZONE_NOTIFIER_CONFIG`), then command-line flags and their `ZONE_*` /
//! `MQTT_*` environment fallbacks. The result is validated once and passed by
//! reference to every component.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorSettings, InferenceBackend, InferenceTarget};
use crate::ingest::InputSelection;
use crate::pipeline::PipelineSettings;
use crate::transport::{parse_mqtt_endpoint, MqttSettings};
use crate::zone::ZoneGeometry;

const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_RATE_SECS: f64 = 1.0;
const DEFAULT_DELAY_MS: f64 = 5.0;
const DEFAULT_TOPIC: &str = "machine/zone";
const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_CLIENT_ID: &str = "restricted-zone-notifier";

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Alert when people enter a restricted zone of a video feed"
)]
pub struct Args {
    /// JSON config file; flags and environment override its values.
    #[arg(long, env = "ZONE_NOTIFIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Video file to read, or a `stub://` synthetic scene.
    #[arg(short, long, env = "ZONE_INPUT")]
    pub input: Option<String>,

    /// Camera device index, used when no input file is given.
    #[arg(short, long, env = "ZONE_DEVICE")]
    pub device: Option<u32>,

    /// Path to the ONNX person detection model.
    #[arg(short, long, env = "ZONE_MODEL")]
    pub model: Option<PathBuf>,

    /// Confidence threshold for person detection (0..1).
    #[arg(long, env = "ZONE_MODEL_CONFIDENCE")]
    pub model_confidence: Option<f32>,

    /// Inference backend: auto, tract or stub.
    #[arg(long, env = "ZONE_BACKEND")]
    pub backend: Option<String>,

    /// Inference target: cpu, opencl, opencl_fp16 or vpu (or 0-3).
    #[arg(long, env = "ZONE_TARGET")]
    pub target: Option<String>,

    /// X coordinate of the top left corner of the restricted zone.
    #[arg(long = "x", env = "ZONE_X", allow_negative_numbers = true)]
    pub x: Option<i32>,

    /// Y coordinate of the top left corner of the restricted zone.
    #[arg(long = "y", env = "ZONE_Y", allow_negative_numbers = true)]
    pub y: Option<i32>,

    /// Zone width in pixels; 0 or less covers the full frame width.
    #[arg(long, env = "ZONE_WIDTH", allow_negative_numbers = true)]
    pub width: Option<i32>,

    /// Zone height in pixels; 0 or less covers the full frame height.
    #[arg(long, env = "ZONE_HEIGHT", allow_negative_numbers = true)]
    pub height: Option<i32>,

    /// Publish zone status to the MQTT broker.
    #[arg(long, env = "ZONE_PUBLISH")]
    pub publish: bool,

    /// Seconds between published messages.
    #[arg(long, env = "ZONE_RATE")]
    pub rate: Option<f64>,

    /// Playback delay in milliseconds (replaced by the file frame rate when known).
    #[arg(long, env = "ZONE_DELAY")]
    pub delay: Option<f64>,

    /// Write annotated JPEG snapshots here on alert changes.
    #[arg(long, env = "ZONE_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// MQTT broker address (host:port or mqtt://, mqtts://, tcp://, ssl:// URL).
    #[arg(long, env = "MQTT_BROKER_ADDR")]
    pub mqtt_broker_addr: Option<String>,

    /// MQTT client identifier.
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: Option<String>,

    /// MQTT username.
    #[arg(long, env = "MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    /// MQTT password.
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// MQTT topic for zone status messages.
    #[arg(long, env = "MQTT_TOPIC")]
    pub mqtt_topic: Option<String>,

    /// Force TLS on a bare host:port broker address.
    #[arg(long, env = "MQTT_USE_TLS")]
    pub mqtt_use_tls: bool,

    /// CA certificate (PEM) for the MQTT broker.
    #[arg(long, env = "MQTT_TLS_CA_PATH")]
    pub mqtt_tls_ca_path: Option<PathBuf>,

    /// Client certificate (PEM) for mutual TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_CERT_PATH")]
    pub mqtt_tls_client_cert_path: Option<PathBuf>,

    /// Client key (PEM) for mutual TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_KEY_PATH")]
    pub mqtt_tls_client_key_path: Option<PathBuf>,

    /// Startup output: auto, plain or pretty.
    #[arg(long, env = "ZONE_UI", default_value = "auto")]
    pub ui: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    input: Option<String>,
    device: Option<u32>,
    snapshot_dir: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
    zone: Option<ZoneConfigFile>,
    publish: Option<PublishConfigFile>,
    playback: Option<PlaybackConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    model: Option<PathBuf>,
    confidence: Option<f32>,
    backend: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ZoneConfigFile {
    x: Option<i32>,
    y: Option<i32>,
    width: Option<i32>,
    height: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PublishConfigFile {
    enabled: Option<bool>,
    rate_secs: Option<f64>,
    topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PlaybackConfigFile {
    delay_ms: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    use_tls: Option<bool>,
    tls_ca_path: Option<PathBuf>,
    tls_client_cert_path: Option<PathBuf>,
    tls_client_key_path: Option<PathBuf>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: InputSelection,
    pub detector: DetectorSettings,
    pub geometry: ZoneGeometry,
    pub publish: bool,
    pub rate: Duration,
    pub delay: Duration,
    pub topic: String,
    pub mqtt: MqttSettings,
    pub snapshot_dir: Option<PathBuf>,
}

impl Config {
    /// Parse the process arguments and environment.
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::merge(args, file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn merge(args: Args, file: ConfigFile) -> Result<Self> {
        let detector_file = file.detector.unwrap_or_default();
        let zone_file = file.zone.unwrap_or_default();
        let publish_file = file.publish.unwrap_or_default();
        let playback_file = file.playback.unwrap_or_default();
        let mqtt_file = file.mqtt.unwrap_or_default();

        let input = match args.input.or(file.input).filter(|s| !s.trim().is_empty()) {
            Some(input) => InputSelection::File(PathBuf::from(input)),
            None => InputSelection::Device(args.device.or(file.device).unwrap_or(0)),
        };

        let backend = match args.backend.or(detector_file.backend) {
            Some(value) => value.parse::<InferenceBackend>()?,
            None => InferenceBackend::default(),
        };
        let target = match args.target.or(detector_file.target) {
            Some(value) => value.parse::<InferenceTarget>()?,
            None => InferenceTarget::default(),
        };
        let detector = DetectorSettings {
            backend,
            target,
            model: args.model.or(detector_file.model),
            confidence: args
                .model_confidence
                .or(detector_file.confidence)
                .unwrap_or(DEFAULT_CONFIDENCE),
        };

        let geometry = ZoneGeometry {
            x: args.x.or(zone_file.x).unwrap_or(0),
            y: args.y.or(zone_file.y).unwrap_or(0),
            width: args.width.or(zone_file.width).unwrap_or(0),
            height: args.height.or(zone_file.height).unwrap_or(0),
        };

        let rate_secs = args
            .rate
            .or(publish_file.rate_secs)
            .unwrap_or(DEFAULT_RATE_SECS);
        if !(rate_secs.is_finite() && rate_secs > 0.0) {
            bail!("publish rate must be a positive number of seconds, got {}", rate_secs);
        }
        let rate = Duration::try_from_secs_f64(rate_secs)
            .map_err(|err| anyhow!("publish rate {} seconds is out of range: {}", rate_secs, err))?;
        if rate.is_zero() {
            bail!("publish rate {} seconds is below one nanosecond", rate_secs);
        }
        let delay_ms = args
            .delay
            .or(playback_file.delay_ms)
            .unwrap_or(DEFAULT_DELAY_MS);
        if !(delay_ms.is_finite() && delay_ms >= 0.0) {
            bail!("playback delay must be a non-negative number of milliseconds, got {}", delay_ms);
        }
        let delay = Duration::try_from_secs_f64(delay_ms / 1000.0).map_err(|err| {
            anyhow!("playback delay {} ms is out of range: {}", delay_ms, err)
        })?;

        let mqtt = MqttSettings {
            broker: args
                .mqtt_broker_addr
                .or(mqtt_file.broker_addr)
                .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string()),
            client_id: args
                .mqtt_client_id
                .or(mqtt_file.client_id)
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            username: args.mqtt_username.or(mqtt_file.username),
            password: args.mqtt_password.or(mqtt_file.password),
            use_tls: args.mqtt_use_tls || mqtt_file.use_tls.unwrap_or(false),
            tls_ca_path: args.mqtt_tls_ca_path.or(mqtt_file.tls_ca_path),
            tls_client_cert_path: args
                .mqtt_tls_client_cert_path
                .or(mqtt_file.tls_client_cert_path),
            tls_client_key_path: args
                .mqtt_tls_client_key_path
                .or(mqtt_file.tls_client_key_path),
        };

        Ok(Self {
            input,
            detector,
            geometry,
            publish: args.publish || publish_file.enabled.unwrap_or(false),
            rate,
            delay,
            topic: args
                .mqtt_topic
                .or(publish_file.topic)
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            mqtt,
            snapshot_dir: args.snapshot_dir.or(file.snapshot_dir),
        })
    }

    fn validate(&mut self) -> Result<()> {
        self.detector.validate()?;

        if self.topic.trim().is_empty() {
            bail!("MQTT topic must not be empty");
        }
        if self.publish {
            parse_mqtt_endpoint(&self.mqtt.broker, self.mqtt.use_tls)?;
            if self.mqtt.client_id.trim().is_empty() {
                bail!("MQTT client id must not be empty");
            }
        }
        if let Some(dir) = &self.snapshot_dir {
            if !dir.is_dir() {
                bail!("snapshot directory {} does not exist", dir.display());
            }
        }
        Ok(())
    }

    /// Pipeline knobs derived from this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            geometry: self.geometry,
            publish_rate: self.rate,
            delay: self.delay,
            topic: self.topic.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_args() -> Args {
        Args {
            backend: Some("stub".to_string()),
            ui: "auto".to_string(),
            ..Args::default()
        }
    }

    #[test]
    fn defaults_apply_without_file_or_flags() -> Result<()> {
        let cfg = Config::from_args(stub_args())?;
        assert_eq!(cfg.input, InputSelection::Device(0));
        assert_eq!(cfg.detector.confidence, 0.5);
        assert_eq!(cfg.geometry, ZoneGeometry::default());
        assert!(!cfg.publish);
        assert_eq!(cfg.rate, Duration::from_secs(1));
        assert_eq!(cfg.delay, Duration::from_millis(5));
        assert_eq!(cfg.topic, "machine/zone");
        assert_eq!(cfg.mqtt, MqttSettings::default());
        Ok(())
    }

    #[test]
    fn input_file_wins_over_device() -> Result<()> {
        let cfg = Config::from_args(Args {
            input: Some("stub://yard".to_string()),
            device: Some(2),
            ..stub_args()
        })?;
        assert_eq!(cfg.input, InputSelection::File(PathBuf::from("stub://yard")));
        Ok(())
    }

    #[test]
    fn rejects_invalid_settings() {
        let bad_rate = Args {
            rate: Some(0.0),
            ..stub_args()
        };
        assert!(Config::from_args(bad_rate).is_err());

        let bad_confidence = Args {
            model_confidence: Some(1.5),
            ..stub_args()
        };
        assert!(Config::from_args(bad_confidence).is_err());

        let bad_target = Args {
            target: Some("vpu".to_string()),
            ..stub_args()
        };
        assert!(Config::from_args(bad_target).is_err());

        let bad_broker = Args {
            publish: true,
            mqtt_broker_addr: Some("broker-without-port".to_string()),
            ..stub_args()
        };
        assert!(Config::from_args(bad_broker).is_err());
    }

    #[test]
    fn rates_and_delays_outside_duration_range_are_rejected() {
        let tiny_rate = Config::from_args(Args {
            rate: Some(1e-10),
            ..stub_args()
        });
        assert!(tiny_rate.unwrap_err().to_string().contains("below one nanosecond"));

        let huge_rate = Config::from_args(Args {
            rate: Some(1e20),
            ..stub_args()
        });
        assert!(huge_rate.unwrap_err().to_string().contains("out of range"));

        let huge_delay = Config::from_args(Args {
            delay: Some(1e20),
            ..stub_args()
        });
        assert!(huge_delay.unwrap_err().to_string().contains("out of range"));
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn model_backend_without_support_is_rejected() {
        let err = Config::from_args(Args {
            backend: Some("tract".to_string()),
            model: Some(PathBuf::from("person-detection.onnx")),
            ..stub_args()
        })
        .unwrap_err();
        assert!(err.to_string().contains("not compiled"));
    }
}
