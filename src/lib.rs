//! Restricted Zone Notifier
//!
//! Watches a video feed for people entering a restricted rectangular zone,
//! shows the result live and publishes a rate-limited `{"Safe": bool}` status
//! over MQTT.
//!
//! # Architecture
//!
//! The caller thread runs the capture/render loop. A detection worker owns the
//! person detector; an optional publish throttler owns the MQTT publisher.
//! Threads hand values to each other through single-slot latest-value
//! mailboxes, so a slow consumer drops stale reports instead of queueing them.
//! One `Shutdown` flag stops everything: operator quit, Ctrl-C, end of stream
//! or the first fatal error.
//!
//! # Module Structure
//!
//! - `zone`: zone rectangle arithmetic (`Rect`, `compute_zone`, `ZoneGeometry`)
//! - `frame`: `Frame`, `ZoneReport`, `SafetyMessage`
//! - `detect`: `PersonDetector` backends and the intrusion test
//! - `ingest`: frame sources (synthetic, files, V4L2 cameras)
//! - `display`: overlays, operator commands, the console display
//! - `transport`: `Publisher` and the MQTT adapter
//! - `pipeline`: mailboxes, worker threads, shutdown, the orchestrator
//! - `config`: layered configuration

pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod transport;
pub mod zone;

pub use config::{Args, Config};
pub use detect::{
    build_detector, detect_intrusion, DetectionBox, DetectorSettings, InferenceBackend,
    InferenceTarget, PersonDetector, StubBackend,
};
pub use display::{ConsoleDisplay, Display, Overlay, UserCommand, ALERT_BANNER};
pub use frame::{Frame, PerfInfo, SafetyMessage, ZoneReport};
pub use ingest::{open_source, FrameSource, InputSelection, SyntheticConfig, SyntheticSource};
pub use pipeline::{run_pipeline, PipelineSettings, PipelineSummary, Shutdown, ShutdownReason};
pub use transport::{MqttPublisher, MqttSettings, Publisher};
pub use zone::{compute_zone, Point, Rect, ZoneGeometry};
