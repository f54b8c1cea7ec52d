//! MQTT publisher for zone telemetry.
//!
//! Publishes QoS 1, non-retained. The rumqttc event loop runs on its own
//! thread and reconnects on its own; `publish` only enqueues, so a stalled
//! broker surfaces as a full request queue instead of a blocked caller.
//! Availability is announced on `<topic>/status` with a retained last will.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::{LastWill, Packet};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};
use rumqttc::Outgoing;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::tls::{build_transport, parse_mqtt_endpoint, TlsMaterials};
use super::Publisher;

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_QUEUE: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Broker connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttSettings {
    /// `host:port` or a `mqtt://`, `tcp://`, `mqtts://`, `ssl://` URL.
    pub broker: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Force TLS on a bare `host:port` address.
    pub use_tls: bool,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_client_cert_path: Option<PathBuf>,
    pub tls_client_key_path: Option<PathBuf>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1:1883".to_string(),
            client_id: "restricted-zone-notifier".to_string(),
            username: None,
            password: None,
            use_tls: false,
            tls_ca_path: None,
            tls_client_cert_path: None,
            tls_client_key_path: None,
        }
    }
}

pub struct MqttPublisher {
    client: Client,
    availability_topic: String,
    stop: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl MqttPublisher {
    /// Connect to the broker and announce availability under `topic`.
    pub fn connect(settings: &MqttSettings, topic: &str) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker, settings.use_tls)?;
        let tls = TlsMaterials::load(
            settings.tls_ca_path.as_deref(),
            settings.tls_client_cert_path.as_deref(),
            settings.tls_client_key_path.as_deref(),
        )?;
        let availability_topic = format!("{}/status", topic);

        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(true);
        if let Some(user) = &settings.username {
            options.set_credentials(user, settings.password.clone().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            availability_topic.as_str(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        ));
        options.set_transport(build_transport(&endpoint, &tls)?);

        let (client, connection) = Client::new(options, REQUEST_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));
        let connection_handle = spawn_event_loop(connection, stop.clone())?;

        client
            .try_publish(
                availability_topic.as_str(),
                QoS::AtLeastOnce,
                true,
                PAYLOAD_ONLINE.as_bytes().to_vec(),
            )
            .context("failed to queue MQTT availability message")?;
        log::info!(
            "MQTT publisher ready for {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some()
        );

        Ok(Self {
            client,
            availability_topic,
            stop,
            connection_handle: Some(connection_handle),
        })
    }
}

fn spawn_event_loop(mut connection: Connection, stop: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("mqtt-event-loop".to_string())
        .spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        log::info!("MQTT connection established");
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        log::debug!("MQTT disconnect sent");
                        break;
                    }
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        log::warn!("MQTT connection error: {}", e);
                        std::thread::sleep(RECONNECT_DELAY);
                    }
                }
            }
        })
        .map_err(|err| anyhow!("failed to spawn MQTT event loop: {}", err))
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .with_context(|| format!("failed to publish to {}", topic))?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(handle) = self.connection_handle.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::SeqCst);
        if let Err(err) = self.client.try_publish(
            self.availability_topic.as_str(),
            QoS::AtLeastOnce,
            true,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
        ) {
            log::debug!("MQTT offline message not queued: {}", err);
        }
        // Blocks while the request queue is full; the event loop keeps draining
        // it, or drops the connection on the next error now that stop is set.
        if let Err(err) = self.client.disconnect() {
            log::debug!("MQTT event loop already gone: {}", err);
        }
        if handle.join().is_err() {
            log::warn!("MQTT event loop panicked");
        }
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            log::debug!("MQTT disconnect on drop failed: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_local_broker() {
        let settings = MqttSettings::default();
        assert_eq!(settings.broker, "127.0.0.1:1883");
        assert_eq!(settings.client_id, "restricted-zone-notifier");
        assert!(!settings.use_tls);
    }

    #[test]
    fn invalid_broker_fails_before_connecting() {
        let settings = MqttSettings {
            broker: "ws://broker:80".to_string(),
            ..MqttSettings::default()
        };
        let err = MqttPublisher::connect(&settings, "machine/zone")
            .err()
            .expect("bad scheme");
        assert!(err.to_string().contains("unsupported MQTT scheme"));
    }

    #[test]
    fn disconnect_returns_with_a_full_request_queue() -> Result<()> {
        // Nothing listens on port 1, so the event loop never drains requests.
        let settings = MqttSettings {
            broker: "127.0.0.1:1".to_string(),
            client_id: "zone-disconnect-test".to_string(),
            ..MqttSettings::default()
        };
        let mut publisher = MqttPublisher::connect(&settings, "machine/zone")?;
        for _ in 0..(REQUEST_QUEUE * 2) {
            let _ = publisher.publish("machine/zone", br#"{"Safe":true}"#);
        }

        let started = std::time::Instant::now();
        publisher.disconnect()?;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(publisher.connection_handle.is_none());
        // Second call is a no-op.
        publisher.disconnect()?;
        Ok(())
    }
}
