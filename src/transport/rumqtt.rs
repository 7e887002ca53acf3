//! `BrokerTransport` backed by the rumqttc sync client.
//!
//! Each `connect` builds a fresh client/connection pair and spawns a reader
//! thread draining the rumqttc event loop into a channel. The reader exits
//! on the first connection error and reports [`BrokerEvent::ConnectionLost`],
//! leaving retry policy entirely to the owning `BrokerConnection`; rumqttc's
//! own reconnect behavior is deliberately not used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use tracing::{debug, error};

use crate::traits::{BrokerEvent, BrokerMessage, BrokerTransport};

/// How long `connect` waits for the broker's session acknowledgement.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive interval for the MQTT session.
const KEEP_ALIVE: Duration = Duration::from_secs(30);

static CLIENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// MQTT broker transport using rumqttc's blocking client.
pub struct RumqttTransport {
    client: Option<Client>,
    events: Option<Receiver<BrokerEvent>>,
    connected: bool,
}

impl RumqttTransport {
    /// Create a disconnected transport.
    pub fn new() -> Self {
        Self {
            client: None,
            events: None,
            connected: false,
        }
    }

    fn next_client_id() -> String {
        // Unique per process and per session, so broker-side session state
        // from a torn-down connection never bleeds into a new one.
        format!(
            "trackside-{}-{}",
            std::process::id(),
            CLIENT_SEQ.fetch_add(1, Ordering::Relaxed)
        )
    }
}

impl Default for RumqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `tcp://host:port`, `host:port`, or bare `host` (port 1883).
fn parse_address(address: &str) -> Result<(String, u16), String> {
    let trimmed = address
        .strip_prefix("tcp://")
        .or_else(|| address.strip_prefix("mqtt://"))
        .unwrap_or(address);
    if trimmed.is_empty() {
        return Err(format!("invalid broker address: {:?}", address));
    }
    match trimmed.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| format!("invalid broker port in {:?}", address))?;
            Ok((host.to_string(), port))
        }
        None => Ok((trimmed.to_string(), 1883)),
    }
}

impl BrokerTransport for RumqttTransport {
    type Error = String;

    fn connect(&mut self, address: &str) -> Result<(), String> {
        self.disconnect();

        let (host, port) = parse_address(address)?;
        let mut options = MqttOptions::new(Self::next_client_id(), host, port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, mut connection) = Client::new(options, 10);
        let (event_tx, event_rx) = unbounded();
        let (handshake_tx, handshake_rx) = bounded(1);

        std::thread::spawn(move || {
            let mut session_up = false;
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        if !session_up {
                            session_up = true;
                            let _ = handshake_tx.send(Ok(()));
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let _ = event_tx.send(BrokerEvent::Message(BrokerMessage::new(
                            publish.topic.clone(),
                            publish.payload.to_vec(),
                        )));
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        debug!("broker sent disconnect");
                        let _ = event_tx.send(BrokerEvent::ConnectionLost);
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // First error ends this session; reconnect policy
                        // belongs to the connection layer, not rumqttc.
                        if session_up {
                            error!(error = %e, "mqtt event loop error");
                            let _ = event_tx.send(BrokerEvent::ConnectionLost);
                        } else {
                            let _ = handshake_tx.send(Err(e.to_string()));
                        }
                        return;
                    }
                }
            }
        });

        match handshake_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => {
                self.client = Some(client);
                self.events = Some(event_rx);
                self.connected = true;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // Stop the orphaned event loop before giving up.
                let _ = client.disconnect();
                Err("timed out waiting for broker handshake".to_string())
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.disconnect();
        }
        self.events = None;
        self.connected = false;
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), String> {
        let client = self.client.as_mut().ok_or("not connected")?;
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| e.to_string())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), String> {
        let client = self.client.as_mut().ok_or("not connected")?;
        client.unsubscribe(topic).map_err(|e| e.to_string())
    }

    fn try_recv(&mut self) -> Option<BrokerEvent> {
        let event = self.events.as_ref()?.try_recv().ok()?;
        if matches!(event, BrokerEvent::ConnectionLost) {
            self.connected = false;
        }
        Some(event)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
