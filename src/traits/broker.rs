//! Broker transport abstraction for the subscribe side.
//!
//! The core owns the *lifecycle* of the broker session (when to connect,
//! what to subscribe, when to give up); the transport owns the *mechanics*
//! (sockets, keep-alive, wire protocol). This split keeps the connection
//! state machine testable without a broker on the network.
//!
//! The trait uses a **sync-first design**: connect, subscribe, and
//! unsubscribe are blocking calls executed on the connection's own threads,
//! and `try_recv` is non-blocking for the poll loop.

// ============================================================================
// Broker Transport Trait
// ============================================================================

/// Subscribe-side transport primitives for a message broker.
///
/// Implementations are assumed correct at the transport level; the core
/// layers reconnect policy and subscription reconciliation on top.
///
/// # Implementation Notes
///
/// - `connect` blocks until the session is established or refused; it is
///   called from a background thread, never from the configuration path.
/// - `subscribe`/`unsubscribe` are only invoked while connected.
/// - `try_recv` must never block; it is polled from the message pump.
/// - An unsolicited connection loss is reported through
///   [`BrokerEvent::ConnectionLost`], after which the core re-runs its
///   connect algorithm.
pub trait BrokerTransport: Send {
    /// Error type for transport operations.
    type Error: std::fmt::Display;

    /// Establish a session with the broker at `address` (blocking).
    fn connect(&mut self, address: &str) -> Result<(), Self::Error>;

    /// Close the current session, if any. Never fails; a dead session is
    /// already closed.
    fn disconnect(&mut self);

    /// Subscribe to a topic (blocking). Supports broker wildcards.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Unsubscribe from a topic (blocking).
    fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Take the next pending event, if one is queued (non-blocking).
    fn try_recv(&mut self) -> Option<BrokerEvent>;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;
}

/// An event surfaced by the transport's receive side.
#[derive(Clone, Debug)]
pub enum BrokerEvent {
    /// A message arrived on a subscribed topic.
    Message(BrokerMessage),
    /// The broker dropped the session; the core must reconnect and resume.
    ConnectionLost,
}

/// A message received from a subscription.
#[derive(Clone, Debug)]
pub struct BrokerMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    /// Create a new broker message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

// ============================================================================
// Message Handler Trait
// ============================================================================

/// Sink for inbound broker messages.
///
/// Invoked from the connection's message pump thread, one message at a
/// time, in arrival order. Implementations must therefore be `Send + Sync`
/// and guard their own mutable state.
pub trait MessageHandler: Send + Sync {
    /// Handle one raw message. Must not panic on malformed payloads.
    fn on_message(&self, topic: &str, payload: &[u8]);
}

/// Plain closures can serve as handlers in tests and small setups.
impl<F> MessageHandler for F
where
    F: Fn(&str, &[u8]) + Send + Sync,
{
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self(topic, payload)
    }
}
