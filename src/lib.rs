//! # trackside
//!
//! Track-side sensor ingestion and train fleet control over MQTT and HTTP.
//!
//! ## Features
//!
//! - **Broker connection management**: automatic reconnect with fixed
//!   backoff, subscription-set reconciliation, resume after unsolicited
//!   connection loss
//! - **Sensor event processing**: sampling window, duplicate suppression,
//!   and sensor-parity actuator decisions (horn vs headlight)
//! - **Inventory reconciliation**: full replace-by-diff sync of the local
//!   train registry against the remote controller
//! - **Command forwarding**: single-key JSON commands and ordered
//!   multi-fragment control requests over HTTP
//!
//! ## Architecture
//!
//! The crate is structured so every piece of logic runs on the desk against
//! mocks:
//!
//! - `traits` - broker, controller, actuator, datastore, and clock seams
//! - `broker` - connection state machine and topic reconciliation
//! - `sensor` - debounce/sampling gates and actuator decisions
//! - `inventory` / `registry` - train inventory diff-and-reconcile
//! - `control` - outbound command path to the train controller
//! - `transport` - mock implementations plus the real rumqttc/reqwest
//!   clients (feature-gated)
//! - `service` - wiring and the config event loop
//!
//! ## Example
//!
//! ```rust
//! use trackside::config::{BrokerSettings, ConfigWatcher};
//! use trackside::service::TracksideService;
//! use trackside::transport::{MockBroker, MockTrainApi};
//!
//! let (watcher, events) = ConfigWatcher::channel();
//! let service = TracksideService::new(MockBroker::new(), MockTrainApi::new());
//! let worker = service.spawn(events);
//!
//! // A config-store write flows through the channel into the core
//! watcher.broker_changed(Some(
//!     BrokerSettings::new("tcp://localhost:1883").with_topic("sensors/#"),
//! ));
//!
//! drop(watcher);
//! worker.join().unwrap();
//! service.shutdown();
//! ```

#![warn(missing_docs)]

/// Broker connection lifecycle and topic reconciliation.
pub mod broker;
/// Configuration types and the change-event channel.
pub mod config;
/// Outbound command path to the train controller.
pub mod control;
/// Crate-wide error taxonomy.
pub mod error;
/// Train inventory diff-and-reconcile.
pub mod inventory;
/// Wire types for sensors, inventory, and commands.
pub mod messages;
/// Local train registry.
pub mod registry;
/// Sensor event sampling, debouncing, and actuator decisions.
pub mod sensor;
/// Top-level service wiring and the config event loop.
pub mod service;
/// In-memory sensor datastore.
pub mod store;
/// Seams for the external collaborators.
pub mod traits;
/// Concrete transports: mocks plus feature-gated network clients.
pub mod transport;

/// Axum RPC surface (feature-gated).
#[cfg(feature = "web")]
pub mod web;

// Re-exports for convenience
pub use broker::{BrokerConnection, ConnectionState, DEFAULT_RETRY_INTERVAL};
pub use config::{BrokerSettings, ConfigEvent, ConfigWatcher, ControllerSettings};
pub use control::{ControlOutcome, ControlSender, EndpointHandle};
pub use error::Error;
pub use inventory::InventoryReconciler;
pub use messages::{InventoryEntry, SensorReading, Switch, TrainCommand};
pub use registry::{TrainRecord, TrainRegistry};
pub use sensor::{sensor_id, DebounceState, SensorProcessor, DEFAULT_SAMPLE_INTERVAL_MS};
pub use service::{ServiceOptions, TracksideService};
pub use store::MemorySensorStore;
pub use traits::{
    // Broker side
    Actuator,
    BrokerEvent,
    BrokerMessage,
    BrokerTransport,
    Clock,
    MessageHandler,
    // Train side
    SensorStore,
    TrainControlApi,
};
pub use transport::SystemClock;
