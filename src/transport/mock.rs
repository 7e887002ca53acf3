//! Mock implementations for testing without a broker or controller.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockBroker`] | `BrokerTransport` | Scriptable connects, recorded sub/unsub calls |
//! | [`MockTrainApi`] | `TrainControlApi` | Canned inventory, captured command posts |
//! | [`MockActuator`] | `Actuator` | Records horn/light calls in order |
//! | [`MockClock`] | `Clock` | Controllable shared time source |
//!
//! # Example
//!
//! ```rust
//! use trackside::transport::MockBroker;
//! use trackside::traits::BrokerTransport;
//!
//! let mut broker = MockBroker::new();
//! broker.fail_connects = 2; // first two attempts are refused
//!
//! assert!(broker.connect("tcp://x:1883").is_err());
//! assert!(broker.connect("tcp://x:1883").is_err());
//! assert!(broker.connect("tcp://x:1883").is_ok());
//! assert_eq!(broker.connect_attempts, 3);
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::traits::{Actuator, BrokerEvent, BrokerMessage, BrokerTransport, Clock, TrainControlApi};

// ============================================================================
// Mock Broker
// ============================================================================

/// Mock broker transport with scriptable failures and recorded calls.
///
/// Fields are public so tests can script behavior and assert on history
/// directly (usually through `BrokerConnection::with_transport`).
#[derive(Debug, Default)]
pub struct MockBroker {
    /// Whether a session is currently established.
    pub connected: bool,
    /// Number of connect attempts to refuse before succeeding
    /// (`usize::MAX` = refuse forever).
    pub fail_connects: usize,
    /// Total connect attempts made.
    pub connect_attempts: usize,
    /// Disconnects of an established session.
    pub disconnect_calls: usize,
    /// Every subscribe call in order, including failed ones.
    pub subscribe_calls: Vec<String>,
    /// Every unsubscribe call in order, including failed ones.
    pub unsubscribe_calls: Vec<String>,
    /// Topics whose subscribe calls fail.
    pub fail_subscribes: HashSet<String>,
    /// Topics whose unsubscribe calls fail.
    pub fail_unsubscribes: HashSet<String>,
    /// Currently held subscriptions (successful ones only).
    pub subscriptions: Vec<String>,
    /// Queue drained by `try_recv`.
    pub incoming: VecDeque<BrokerEvent>,
}

impl MockBroker {
    /// Create a disconnected mock broker that accepts every operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound message.
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming
            .push_back(BrokerEvent::Message(BrokerMessage::new(topic, payload)));
    }

    /// Simulate the broker dropping the session.
    pub fn drop_connection(&mut self) {
        self.connected = false;
        self.incoming.push_back(BrokerEvent::ConnectionLost);
    }
}

impl BrokerTransport for MockBroker {
    type Error = String;

    fn connect(&mut self, _address: &str) -> Result<(), String> {
        self.connect_attempts += 1;
        if self.fail_connects > 0 {
            if self.fail_connects != usize::MAX {
                self.fail_connects -= 1;
            }
            return Err("connection refused".to_string());
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.disconnect_calls += 1;
            self.subscriptions.clear();
        }
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), String> {
        self.subscribe_calls.push(topic.to_string());
        if self.fail_subscribes.contains(topic) {
            return Err(format!("subscribe refused: {}", topic));
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), String> {
        self.unsubscribe_calls.push(topic.to_string());
        if self.fail_unsubscribes.contains(topic) {
            return Err(format!("unsubscribe refused: {}", topic));
        }
        self.subscriptions.retain(|t| t != topic);
        Ok(())
    }

    fn try_recv(&mut self) -> Option<BrokerEvent> {
        self.incoming.pop_front()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Mock Train API
// ============================================================================

/// One captured `POST /loco/{id}` exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    /// Controller address the command went to.
    pub address: String,
    /// Target loco id.
    pub loco_id: String,
    /// Raw JSON payload.
    pub payload: String,
}

#[derive(Debug)]
struct MockTrainApiState {
    inventory: Option<String>,
    command_status: u16,
    fail_transport: bool,
    sent: Vec<SentCommand>,
    fetches: Vec<String>,
}

/// Mock train controller with a canned inventory and captured commands.
///
/// Shared through `Arc` by the sender and reconciler, so state lives behind
/// a mutex and is scripted/inspected through methods.
#[derive(Debug)]
pub struct MockTrainApi {
    inner: Mutex<MockTrainApiState>,
}

impl Default for MockTrainApi {
    fn default() -> Self {
        Self {
            inner: Mutex::new(MockTrainApiState {
                inventory: Some("[]".to_string()),
                command_status: 200,
                fail_transport: false,
                sent: Vec::new(),
                fetches: Vec::new(),
            }),
        }
    }
}

impl MockTrainApi {
    /// Create a mock that serves an empty inventory and accepts commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the inventory payload; `None` makes fetches fail at the
    /// transport level.
    pub fn set_inventory(&self, payload: Option<&str>) {
        self.inner.lock().unwrap().inventory = payload.map(String::from);
    }

    /// Script the status code returned for every command post.
    pub fn set_command_status(&self, status: u16) {
        self.inner.lock().unwrap().command_status = status;
    }

    /// Make command posts fail at the transport level.
    pub fn set_fail_transport(&self, fail: bool) {
        self.inner.lock().unwrap().fail_transport = fail;
    }

    /// All captured command posts, in send order.
    pub fn sent(&self) -> Vec<SentCommand> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Forget captured command posts.
    pub fn clear_sent(&self) {
        self.inner.lock().unwrap().sent.clear();
    }

    /// Addresses inventory fetches were issued against, in order.
    pub fn fetches(&self) -> Vec<String> {
        self.inner.lock().unwrap().fetches.clone()
    }
}

impl TrainControlApi for MockTrainApi {
    fn fetch_inventory(&self, address: &str) -> Result<String, Error> {
        let mut state = self.inner.lock().unwrap();
        state.fetches.push(address.to_string());
        state
            .inventory
            .clone()
            .ok_or_else(|| Error::Transport(format!("controller {} unreachable", address)))
    }

    fn send_command(
        &self,
        address: &str,
        loco_id: &str,
        payload: &str,
    ) -> Result<(u16, String), Error> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_transport {
            return Err(Error::Transport(format!(
                "controller {} unreachable",
                address
            )));
        }
        state.sent.push(SentCommand {
            address: address.to_string(),
            loco_id: loco_id.to_string(),
            payload: payload.to_string(),
        });
        Ok((state.command_status, String::new()))
    }
}

// ============================================================================
// Mock Actuator
// ============================================================================

/// One recorded actuator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    /// `set_horn(on)`
    Horn(bool),
    /// `set_light(on)`
    Light(bool),
}

/// Mock actuator recording every call in order.
#[derive(Debug, Default)]
pub struct MockActuator {
    calls: Mutex<Vec<ActuatorCall>>,
}

impl MockActuator {
    /// Create an actuator with no recorded calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded calls.
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Actuator for MockActuator {
    fn set_horn(&self, on: bool) {
        self.calls.lock().unwrap().push(ActuatorCall::Horn(on));
    }

    fn set_light(&self, on: bool) {
        self.calls.lock().unwrap().push(ActuatorCall::Light(on));
    }
}

// ============================================================================
// Mock Clock
// ============================================================================

/// Controllable time source for debounce-window tests.
///
/// Clones share the same underlying time, so a test can keep a handle while
/// the processor owns another.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    ms: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a clock at 0 ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }

    /// Advance the clock.
    pub fn advance(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}
