//! Configuration types and the change-event channel.
//!
//! The core does not read configuration itself; an external config store
//! pushes the full new value of each section whenever it changes, and a
//! deletion event when a section is removed. Initial absence is treated the
//! same as deletion: until the first `Some`, the core holds no derived state
//! for that section.
//!
//! # Example
//!
//! ```rust
//! use trackside::config::{BrokerSettings, ConfigEvent, ConfigWatcher};
//!
//! let (watcher, events) = ConfigWatcher::channel();
//!
//! // Config store side: push a broker change
//! watcher.broker_changed(Some(
//!     BrokerSettings::new("tcp://localhost:1883").with_topic("sensors/#"),
//! ));
//!
//! // Core side: consume it
//! match events.recv().unwrap() {
//!     ConfigEvent::Broker(Some(settings)) => {
//!         assert_eq!(settings.address, "tcp://localhost:1883");
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Default broker address applied when state is reset to factory defaults.
pub const DEFAULT_BROKER_ADDRESS: &str = "tcp://localhost:1883";

/// Default subscription applied when state is reset to factory defaults.
pub const DEFAULT_SENSOR_TOPIC: &str = "sensors/#";

// ============================================================================
// Settings
// ============================================================================

/// Broker connection settings: where to connect and what to subscribe to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Opaque broker connection string, e.g. `tcp://host:1883`.
    /// Compared by identity to detect address changes.
    pub address: String,
    /// Desired subscription topics (may contain wildcards).
    pub topics: Vec<String>,
}

impl BrokerSettings {
    /// Create settings for the given address with no topics.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            topics: Vec::new(),
        }
    }

    /// Add a subscription topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Replace the topic list.
    pub fn with_topics(mut self, topics: impl IntoIterator<Item = String>) -> Self {
        self.topics = topics.into_iter().collect();
        self
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_ADDRESS).with_topic(DEFAULT_SENSOR_TOPIC)
    }
}

/// Remote train controller endpoint settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Controller `host:port`; commands go to `http://{address}/loco/{id}`.
    pub address: String,
    /// Loco targeted by discrete sensor-driven commands.
    pub default_loco_id: String,
}

impl ControllerSettings {
    /// Create settings for the given controller address and default loco.
    pub fn new(address: impl Into<String>, default_loco_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            default_loco_id: default_loco_id.into(),
        }
    }
}

// ============================================================================
// Change events
// ============================================================================

/// A configuration change pushed by the external config store.
///
/// `None` means the section was deleted; the core drops all state derived
/// from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigEvent {
    /// Broker address and/or desired topic set changed (or was deleted).
    Broker(Option<BrokerSettings>),
    /// Train controller endpoint changed (or was deleted).
    Controller(Option<ControllerSettings>),
}

/// Producer half of the config change channel.
///
/// Held by whatever adapts the external config store; the core consumes the
/// matching [`Receiver`]. Cloneable so several store adapters can feed the
/// same core.
#[derive(Clone)]
pub struct ConfigWatcher {
    tx: Sender<ConfigEvent>,
}

impl ConfigWatcher {
    /// Create a watcher and the receiver the core will consume.
    pub fn channel() -> (Self, Receiver<ConfigEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// Push a broker settings change (`None` = deleted).
    pub fn broker_changed(&self, settings: Option<BrokerSettings>) {
        let _ = self.tx.send(ConfigEvent::Broker(settings));
    }

    /// Push a controller endpoint change (`None` = deleted).
    pub fn controller_changed(&self, settings: Option<ControllerSettings>) {
        let _ = self.tx.send(ConfigEvent::Controller(settings));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_settings_builder() {
        let settings = BrokerSettings::new("tcp://broker.local:1883")
            .with_topic("sensors/#")
            .with_topic("track/+/status");

        assert_eq!(settings.address, "tcp://broker.local:1883");
        assert_eq!(settings.topics.len(), 2);
        assert_eq!(settings.topics[0], "sensors/#");
    }

    #[test]
    fn test_broker_settings_with_topics_replaces() {
        let settings = BrokerSettings::new("tcp://x:1883")
            .with_topic("old")
            .with_topics(vec!["a".to_string(), "b".to_string()]);

        assert_eq!(settings.topics, vec!["a", "b"]);
    }

    #[test]
    fn test_broker_settings_default() {
        let settings = BrokerSettings::default();
        assert_eq!(settings.address, DEFAULT_BROKER_ADDRESS);
        assert_eq!(settings.topics, vec![DEFAULT_SENSOR_TOPIC]);
    }

    #[test]
    fn test_controller_settings() {
        let settings = ControllerSettings::new("10.0.0.5:5000", "5");
        assert_eq!(settings.address, "10.0.0.5:5000");
        assert_eq!(settings.default_loco_id, "5");
    }

    #[test]
    fn test_watcher_delivers_events_in_order() {
        let (watcher, events) = ConfigWatcher::channel();

        watcher.broker_changed(Some(BrokerSettings::new("tcp://a:1883")));
        watcher.controller_changed(Some(ControllerSettings::new("b:5000", "1")));
        watcher.broker_changed(None);

        assert!(matches!(
            events.recv().unwrap(),
            ConfigEvent::Broker(Some(_))
        ));
        assert!(matches!(
            events.recv().unwrap(),
            ConfigEvent::Controller(Some(_))
        ));
        assert_eq!(events.recv().unwrap(), ConfigEvent::Broker(None));
    }

    #[test]
    fn test_watcher_clone_shares_channel() {
        let (watcher, events) = ConfigWatcher::channel();
        let second = watcher.clone();

        second.controller_changed(None);
        assert_eq!(events.recv().unwrap(), ConfigEvent::Controller(None));
    }
}
