//! Top-level service wiring the components together.
//!
//! [`TracksideService`] owns one of everything: a broker connection feeding
//! a sensor processor, and a control sender plus inventory reconciler
//! sharing one controller endpoint. Configuration changes arrive on the
//! [`ConfigEvent`] channel and are routed here:
//!
//! ```text
//! ConfigEvent::Broker     -> BrokerConnection::configure
//! ConfigEvent::Controller -> EndpointHandle::set + InventoryReconciler::refresh
//! ```
//!
//! The event loop runs on its own thread ([`TracksideService::spawn`]) and
//! stops when every [`ConfigWatcher`](crate::config::ConfigWatcher) clone
//! has been dropped, or when [`shutdown`](TracksideService::shutdown) tears
//! the broker connection down.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::info;

use crate::broker::{BrokerConnection, ConnectionState, DEFAULT_RETRY_INTERVAL};
use crate::config::{BrokerSettings, ConfigEvent};
use crate::control::{ControlOutcome, ControlSender, EndpointHandle};
use crate::inventory::InventoryReconciler;
use crate::registry::TrainRecord;
use crate::sensor::{SensorProcessor, DEFAULT_SAMPLE_INTERVAL_MS};
use crate::store::MemorySensorStore;
use crate::traits::{Actuator, BrokerTransport, SensorStore, TrainControlApi};
use crate::transport::SystemClock;

// ============================================================================
// Options
// ============================================================================

/// Tunables for the service (tests shrink the intervals).
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Delay between failed broker connect attempts.
    pub retry_interval: Duration,
    /// Minimum gap between acted-upon sensor readings.
    pub sample_interval_ms: u64,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// The assembled trackside core.
pub struct TracksideService<T: BrokerTransport + 'static, A: TrainControlApi + 'static> {
    broker: BrokerConnection<T>,
    sender: Arc<ControlSender<A>>,
    reconciler: Arc<InventoryReconciler<A>>,
    store: Arc<MemorySensorStore>,
}

impl<T: BrokerTransport + 'static, A: TrainControlApi + 'static> TracksideService<T, A> {
    /// Assemble the service around the given transports.
    pub fn new(transport: T, api: A) -> Arc<Self> {
        Self::with_options(transport, api, ServiceOptions::default())
    }

    /// Assemble with custom intervals.
    pub fn with_options(transport: T, api: A, options: ServiceOptions) -> Arc<Self> {
        let api = Arc::new(api);
        let endpoint = EndpointHandle::new();

        let sender = Arc::new(ControlSender::new(Arc::clone(&api), endpoint.clone()));
        let reconciler = Arc::new(InventoryReconciler::new(api, endpoint));
        let store = Arc::new(MemorySensorStore::new());

        let processor = SensorProcessor::with_sample_interval(
            Arc::clone(&sender) as Arc<dyn Actuator>,
            Arc::clone(&store) as Arc<dyn SensorStore>,
            SystemClock::new(),
            options.sample_interval_ms,
        );
        let broker = BrokerConnection::with_retry_interval(
            transport,
            Arc::new(processor),
            options.retry_interval,
        );

        info!("trackside service assembled");
        Arc::new(Self {
            broker,
            sender,
            reconciler,
            store,
        })
    }

    // ------------------------------------------------------------------------
    // Config event loop
    // ------------------------------------------------------------------------

    /// Apply one configuration change.
    pub fn handle_event(&self, event: ConfigEvent) {
        match event {
            ConfigEvent::Broker(Some(settings)) => {
                self.broker
                    .configure(Some(&settings.address), &settings.topics);
            }
            ConfigEvent::Broker(None) => {
                info!("broker settings deleted");
                self.broker.configure(None, &[]);
            }
            ConfigEvent::Controller(Some(settings)) => {
                info!(controller = %settings.address, "train controller changed");
                self.sender.endpoint().set(Some(settings));
                // Registry untouched on failure; the next change retries.
                let _ = self.reconciler.refresh();
            }
            ConfigEvent::Controller(None) => {
                info!("train controller deleted");
                self.sender.endpoint().set(None);
            }
        }
    }

    /// Consume config events until the channel closes.
    pub fn run(&self, events: Receiver<ConfigEvent>) {
        for event in events.iter() {
            self.handle_event(event);
        }
        info!("config channel closed, event loop exiting");
    }

    /// Run the event loop on its own thread.
    pub fn spawn(self: &Arc<Self>, events: Receiver<ConfigEvent>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        std::thread::spawn(move || service.run(events))
    }

    // ------------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------------

    /// Apply an ordered list of raw JSON command fragments to one loco.
    pub fn control_train(&self, loco_id: &str, fragments: &[String]) -> ControlOutcome {
        self.sender.control_train(loco_id, fragments)
    }

    /// Re-fetch the inventory from the controller on demand.
    pub fn refresh_inventory(&self) -> Result<(), crate::error::Error> {
        self.reconciler.refresh()
    }

    /// Reset the train registry and sensor datastore to empty and re-apply
    /// the compiled-in default broker settings.
    pub fn clear_all_state(&self) {
        info!("clearing all state, re-applying defaults");
        self.reconciler.clear();
        self.store.clear();
        let defaults = BrokerSettings::default();
        self.broker
            .configure(Some(&defaults.address), &defaults.topics);
    }

    /// Permanently stop the broker connection.
    pub fn shutdown(&self) {
        self.broker.teardown();
    }

    // ------------------------------------------------------------------------
    // Status surface
    // ------------------------------------------------------------------------

    /// Broker connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.broker.state()
    }

    /// Currently subscribed topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.broker.topics()
    }

    /// Known trains, sorted by loco id.
    pub fn trains(&self) -> Vec<TrainRecord> {
        self.reconciler.trains()
    }

    /// Latest acted-upon sensor id, if any.
    pub fn latest_sensor(&self) -> Option<i32> {
        self.store.latest()
    }

    /// The broker connection (tests drive the mock transport through it).
    pub fn broker(&self) -> &BrokerConnection<T> {
        &self.broker
    }

    /// The control sender.
    pub fn sender(&self) -> &ControlSender<A> {
        &self.sender
    }

    /// The inventory reconciler.
    pub fn reconciler(&self) -> &InventoryReconciler<A> {
        &self.reconciler
    }
}
