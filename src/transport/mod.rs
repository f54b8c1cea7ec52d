//! Telemetry transport.
//!
//! `Publisher` is the seam the publish throttler talks to; `MqttPublisher`
//! is the production adapter. TLS endpoint parsing and certificate loading
//! live in `tls`.

mod mqtt;
mod tls;

use anyhow::Result;

pub use mqtt::{MqttPublisher, MqttSettings, PAYLOAD_OFFLINE, PAYLOAD_ONLINE};
pub use tls::{build_transport, parse_mqtt_endpoint, MqttEndpoint, TlsMaterials};

/// Message sink for zone telemetry.
pub trait Publisher: Send {
    /// Queue `payload` for delivery on `topic`. Must not block on a stalled broker.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Flush and close the connection. Called once, when the throttler exits.
    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}
