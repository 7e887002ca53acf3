//! Broker connection lifecycle and topic-set reconciliation.
//!
//! One [`BrokerConnection`] owns a single subscribe session to the message
//! broker:
//!
//! - **Configuration** ([`BrokerConnection::configure`]) reacts to config
//!   changes: an address change tears the session down and starts a fresh
//!   connect; the desired topic set is reconciled against the subscribed
//!   set whenever the connection is up.
//! - **Connecting** runs on a background thread: attempt, and on failure
//!   sleep a fixed interval and retry, forever, until cancelled. The
//!   configuration path is never blocked behind a connect.
//! - **Unsolicited loss** is resumed: the subscribed set is kept, the
//!   connect loop re-runs, and every recorded topic is re-subscribed.
//! - **Teardown** ([`BrokerConnection::teardown`]) is terminal: it
//!   interrupts any backoff sleep, joins the background threads, closes the
//!   session, and clears the subscribed set.
//!
//! Connection state and the subscribed set live under one mutex, so a state
//! transition plus its set reconciliation is a single atomic unit.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::traits::{BrokerEvent, BrokerTransport, MessageHandler};

/// Fixed delay between failed connect attempts.
///
/// Constant on purpose: the embedded-controller retry policy has no upper
/// bound and no jitter.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// How long the message pump parks when the transport has nothing queued.
const PUMP_IDLE_WAIT: Duration = Duration::from_millis(20);

// ============================================================================
// Connection State
// ============================================================================

/// Lifecycle state of the broker session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and none being attempted.
    Disconnected,
    /// A connect attempt is in progress (or queued behind a backoff sleep).
    Connecting,
    /// Session established; the subscribed set tracks the desired set.
    Connected,
    /// Last attempt failed; the retry loop will go back to `Connecting`
    /// after the backoff interval.
    Failed,
}

// ============================================================================
// Broker Connection
// ============================================================================

/// Owns the lifecycle of one subscribe connection to the broker.
pub struct BrokerConnection<T: BrokerTransport + 'static> {
    shared: Arc<Shared<T>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    connector: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the background threads.
struct Shared<T: BrokerTransport> {
    link: Mutex<Link<T>>,
    handler: Arc<dyn MessageHandler>,
    retry_interval: Duration,
    /// Set once by `teardown`; checked before and after every sleep.
    cancelled: AtomicBool,
    /// Bumped on every address change so stale connect loops abort.
    generation: AtomicU64,
    /// Condvar pair interrupting backoff/idle sleeps on teardown or
    /// reconfiguration.
    wake_lock: Mutex<()>,
    wake: Condvar,
}

/// Connection state proper: transport handle, lifecycle state, subscribed
/// set, configured address, and the latest desired topic set. Everything a
/// reconciliation pass touches, under one lock.
struct Link<T: BrokerTransport> {
    transport: T,
    state: ConnectionState,
    address: Option<String>,
    topics: HashSet<String>,
    desired: Vec<String>,
}

impl<T: BrokerTransport + 'static> BrokerConnection<T> {
    /// Create a connection with the default retry interval and start its
    /// message pump.
    ///
    /// The connection starts `Disconnected`; nothing happens until
    /// [`configure`](Self::configure) supplies an address.
    pub fn new(transport: T, handler: Arc<dyn MessageHandler>) -> Self {
        Self::with_retry_interval(transport, handler, DEFAULT_RETRY_INTERVAL)
    }

    /// Create a connection with a custom retry interval (tests use short
    /// ones).
    pub fn with_retry_interval(
        transport: T,
        handler: Arc<dyn MessageHandler>,
        retry_interval: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            link: Mutex::new(Link {
                transport,
                state: ConnectionState::Disconnected,
                address: None,
                topics: HashSet::new(),
                desired: Vec::new(),
            }),
            handler,
            retry_interval,
            cancelled: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        });

        let pump_shared = Arc::clone(&shared);
        let pump = std::thread::spawn(move || pump_shared.run_pump());

        Self {
            shared,
            pump: Mutex::new(Some(pump)),
            connector: Mutex::new(None),
        }
    }

    /// Apply a configuration change.
    ///
    /// If `address` differs from the configured one (including previously
    /// unset, and set back to unset), the current session is closed (which
    /// implicitly
    /// unsubscribes everything) and, for a non-null new address, a
    /// background connect starts. Independently, `desired_topics` is
    /// reconciled against the subscribed set whenever the connection is up;
    /// if a connect is still in flight, the stored desired set is applied
    /// when it succeeds.
    pub fn configure(&self, address: Option<&str>, desired_topics: &[String]) {
        if self.shared.is_cancelled() {
            return;
        }

        let spawn_generation = {
            let mut link = self.shared.link.lock().unwrap();
            link.desired = desired_topics.to_vec();

            if link.address.as_deref() == address {
                if link.state == ConnectionState::Connected {
                    link.reconcile_topics();
                }
                None
            } else {
                info!(
                    old = link.address.as_deref().unwrap_or("<unset>"),
                    new = address.unwrap_or("<unset>"),
                    "broker address changed"
                );
                link.transport.disconnect();
                link.topics.clear();
                link.address = address.map(String::from);
                let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
                if link.address.is_some() {
                    link.state = ConnectionState::Connecting;
                    Some(generation)
                } else {
                    link.state = ConnectionState::Disconnected;
                    None
                }
            }
        };

        // Wake any connect loop sleeping on the old generation.
        self.shared.notify();

        if let Some(generation) = spawn_generation {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::spawn(move || shared.run_connect(generation, false));
            // A superseded connector exits at its next generation check.
            *self.connector.lock().unwrap() = Some(handle);
        }
    }

    /// Permanently shut the connection down.
    ///
    /// Interrupts an in-progress backoff sleep, prevents further retries,
    /// joins the background threads, closes the session, and clears the
    /// subscribed set. The instance stays `Disconnected` forever after.
    pub fn teardown(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.notify();

        if let Some(handle) = self.pump.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.connector.lock().unwrap().take() {
            let _ = handle.join();
        }

        let mut link = self.shared.link.lock().unwrap();
        link.transport.disconnect();
        link.topics.clear();
        link.desired.clear();
        link.address = None;
        link.state = ConnectionState::Disconnected;
        info!("broker connection torn down");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.link.lock().unwrap().state
    }

    /// Currently configured broker address.
    pub fn address(&self) -> Option<String> {
        self.shared.link.lock().unwrap().address.clone()
    }

    /// Snapshot of the subscribed topic set, sorted for stable assertions.
    pub fn topics(&self) -> Vec<String> {
        let link = self.shared.link.lock().unwrap();
        let mut topics: Vec<String> = link.topics.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Whether the session is up.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Access the transport under the connection lock.
    ///
    /// Tests use this to queue mock events and inspect recorded calls.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut link = self.shared.link.lock().unwrap();
        f(&mut link.transport)
    }
}

impl<T: BrokerTransport + 'static> Drop for BrokerConnection<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ============================================================================
// Background loops
// ============================================================================

impl<T: BrokerTransport> Shared<T> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn notify(&self) {
        let _guard = self.wake_lock.lock().unwrap();
        self.wake.notify_all();
    }

    /// Interruptible sleep. Returns `false` when teardown fired.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.wake_lock.lock().unwrap();
        let _unused = self.wake.wait_timeout(guard, timeout).unwrap();
        !self.is_cancelled()
    }

    /// The connect algorithm: attempt, fixed-interval retry on failure,
    /// forever, until cancelled or superseded by a newer configuration.
    ///
    /// `resume` distinguishes reconnect-after-loss (re-subscribe the
    /// recorded topic set, which survived the loss) from a fresh connect
    /// (reconcile the desired set against the empty recorded set).
    fn run_connect(&self, generation: u64, resume: bool) {
        loop {
            if self.is_cancelled() || self.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            {
                let mut link = self.link.lock().unwrap();
                // Re-check under the lock: configure may have raced us.
                if self.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                if link.state == ConnectionState::Connected {
                    return;
                }
                let Some(address) = link.address.clone() else {
                    return;
                };

                link.state = ConnectionState::Connecting;
                match link.transport.connect(&address) {
                    Ok(()) => {
                        link.state = ConnectionState::Connected;
                        info!(%address, "connected to broker");
                        if resume {
                            link.resubscribe_all();
                        } else {
                            link.reconcile_topics();
                        }
                        return;
                    }
                    Err(e) => {
                        error!(%address, error = %e, "broker connect failed, will retry");
                        link.state = ConnectionState::Failed;
                    }
                }
            }

            // Cancellation is honored on both sides of the backoff sleep.
            if !self.wait(self.retry_interval) {
                return;
            }
        }
    }

    /// Message pump: drains transport events in arrival order and hands
    /// messages to the handler outside the connection lock.
    fn run_pump(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }

            let event = {
                let mut link = self.link.lock().unwrap();
                link.transport.try_recv()
            };

            match event {
                Some(BrokerEvent::Message(msg)) => {
                    self.handler.on_message(&msg.topic, &msg.payload);
                }
                Some(BrokerEvent::ConnectionLost) => {
                    error!("lost connection to broker, reconnecting");
                    {
                        let mut link = self.link.lock().unwrap();
                        if link.state == ConnectionState::Connected {
                            link.state = ConnectionState::Connecting;
                        }
                    }
                    let generation = self.generation.load(Ordering::SeqCst);
                    self.run_connect(generation, true);
                }
                None => {
                    if !self.wait(PUMP_IDLE_WAIT) {
                        return;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Topic reconciliation
// ============================================================================

impl<T: BrokerTransport> Link<T> {
    /// Make the subscribed set equal to the desired set.
    ///
    /// Each topic sees at most one subscribe or unsubscribe per pass.
    /// Individual failures are logged and skipped: a topic whose subscribe
    /// failed is not recorded (the next pass retries it); a topic whose
    /// unsubscribe failed is dropped from the set regardless, since the
    /// desired set is authoritative.
    fn reconcile_topics(&mut self) {
        let desired: HashSet<String> = self.desired.iter().cloned().collect();

        // Subscribe in configuration order; the set check also collapses
        // duplicate entries so no topic is ever subscribed twice.
        let wanted = self.desired.clone();
        for topic in &wanted {
            if !self.topics.contains(topic) {
                match self.transport.subscribe(topic) {
                    Ok(()) => {
                        info!(%topic, "subscribed");
                        self.topics.insert(topic.clone());
                    }
                    Err(e) => error!(%topic, error = %e, "subscribe failed"),
                }
            }
        }

        let stale: Vec<String> = self.topics.difference(&desired).cloned().collect();
        for topic in stale {
            match self.transport.unsubscribe(&topic) {
                Ok(()) => info!(%topic, "unsubscribed"),
                Err(e) => error!(%topic, error = %e, "unsubscribe failed"),
            }
            self.topics.remove(&topic);
        }

        debug!(subscribed = self.topics.len(), "topic set reconciled");
    }

    /// Resume-session contract: after an unsolicited loss, re-subscribe
    /// every topic recorded before the loss. The desired-topic computation
    /// is untouched.
    fn resubscribe_all(&mut self) {
        let topics: Vec<String> = self.topics.iter().cloned().collect();
        for topic in topics {
            match self.transport.subscribe(&topic) {
                Ok(()) => info!(%topic, "re-subscribed after reconnect"),
                Err(e) => error!(%topic, error = %e, "re-subscribe failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBroker;
    use std::time::Instant;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn noop_handler() -> Arc<dyn MessageHandler> {
        Arc::new(|_: &str, _: &[u8]| {})
    }

    /// Poll until the connection reaches the wanted state or time runs out.
    fn wait_for_state<T: BrokerTransport>(conn: &BrokerConnection<T>, state: ConnectionState) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while conn.state() != state {
            assert!(Instant::now() < deadline, "timed out waiting for {:?}", state);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn short_retry() -> Duration {
        Duration::from_millis(10)
    }

    // ========================================================================
    // Lifecycle tests
    // ========================================================================

    #[test]
    fn test_starts_disconnected() {
        let conn = BrokerConnection::new(MockBroker::new(), noop_handler());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.topics().is_empty());
        assert!(conn.address().is_none());
    }

    #[test]
    fn test_configure_connects_and_subscribes() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "b"]));
        wait_for_state(&conn, ConnectionState::Connected);

        assert_eq!(conn.topics(), topics(&["a", "b"]));
        assert_eq!(conn.address().as_deref(), Some("tcp://broker:1883"));
        conn.with_transport(|t| {
            assert_eq!(t.connect_attempts, 1);
            assert_eq!(t.subscribe_calls, topics(&["a", "b"]));
        });
    }

    #[test]
    fn test_connect_retries_until_success() {
        let mut broker = MockBroker::new();
        broker.fail_connects = 3;
        let conn = BrokerConnection::with_retry_interval(broker, noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a"]));
        wait_for_state(&conn, ConnectionState::Connected);

        conn.with_transport(|t| assert_eq!(t.connect_attempts, 4));
        assert_eq!(conn.topics(), topics(&["a"]));
    }

    #[test]
    fn test_address_change_reconnects() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        conn.configure(Some("tcp://one:1883"), &topics(&["a"]));
        wait_for_state(&conn, ConnectionState::Connected);

        conn.configure(Some("tcp://two:1883"), &topics(&["a"]));
        wait_for_state(&conn, ConnectionState::Connected);

        assert_eq!(conn.address().as_deref(), Some("tcp://two:1883"));
        conn.with_transport(|t| {
            assert_eq!(t.connect_attempts, 2);
            assert_eq!(t.disconnect_calls, 1);
            // Fresh session re-subscribes the desired topic
            assert_eq!(t.subscribe_calls, topics(&["a", "a"]));
        });
    }

    #[test]
    fn test_address_removed_disconnects() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        conn.configure(Some("tcp://one:1883"), &topics(&["a"]));
        wait_for_state(&conn, ConnectionState::Connected);

        conn.configure(None, &[]);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.topics().is_empty());
        assert!(conn.address().is_none());
    }

    #[test]
    fn test_teardown_is_terminal() {
        let mut broker = MockBroker::new();
        broker.fail_connects = usize::MAX; // never connects
        let conn = BrokerConnection::with_retry_interval(broker, noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a"]));
        std::thread::sleep(Duration::from_millis(30));

        conn.teardown();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.topics().is_empty());

        // Further configuration is ignored
        conn.configure(Some("tcp://other:1883"), &topics(&["b"]));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_teardown_interrupts_backoff() {
        let mut broker = MockBroker::new();
        broker.fail_connects = usize::MAX;
        // Long backoff: teardown must not wait it out
        let conn = BrokerConnection::with_retry_interval(
            broker,
            noop_handler(),
            Duration::from_secs(3600),
        );

        conn.configure(Some("tcp://broker:1883"), &topics(&[]));
        std::thread::sleep(Duration::from_millis(30));

        let start = Instant::now();
        conn.teardown();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    // ========================================================================
    // Topic reconciliation tests
    // ========================================================================

    #[test]
    fn test_reconcile_is_idempotent() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "b"]));
        wait_for_state(&conn, ConnectionState::Connected);

        let (subs, unsubs) =
            conn.with_transport(|t| (t.subscribe_calls.len(), t.unsubscribe_calls.len()));

        // Same desired set again: zero operations
        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "b"]));
        conn.with_transport(|t| {
            assert_eq!(t.subscribe_calls.len(), subs);
            assert_eq!(t.unsubscribe_calls.len(), unsubs);
        });
    }

    #[test]
    fn test_reconcile_set_difference_counts() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        // D1 = {a, b, c}
        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "b", "c"]));
        wait_for_state(&conn, ConnectionState::Connected);
        conn.with_transport(|t| t.subscribe_calls.clear());

        // D2 = {b, c, d, e}: subscribe |D2 - D1| = 2, unsubscribe |D1 - D2| = 1
        conn.configure(Some("tcp://broker:1883"), &topics(&["b", "c", "d", "e"]));

        assert_eq!(conn.topics(), topics(&["b", "c", "d", "e"]));
        conn.with_transport(|t| {
            let mut subs = t.subscribe_calls.clone();
            subs.sort();
            assert_eq!(subs, topics(&["d", "e"]));
            assert_eq!(t.unsubscribe_calls, topics(&["a"]));
        });
    }

    #[test]
    fn test_reconcile_to_empty_unsubscribes_all() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "b"]));
        wait_for_state(&conn, ConnectionState::Connected);

        conn.configure(Some("tcp://broker:1883"), &[]);
        assert!(conn.topics().is_empty());
        assert_eq!(conn.state(), ConnectionState::Connected);
        conn.with_transport(|t| assert_eq!(t.unsubscribe_calls.len(), 2));
    }

    #[test]
    fn test_subscribe_failure_does_not_abort_pass() {
        let mut broker = MockBroker::new();
        broker.fail_subscribes.insert("bad".to_string());
        let conn = BrokerConnection::with_retry_interval(broker, noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "bad", "z"]));
        wait_for_state(&conn, ConnectionState::Connected);

        // The failing topic is not recorded; the others are.
        assert_eq!(conn.topics(), topics(&["a", "z"]));

        // Next pass retries it once the failure is gone.
        conn.with_transport(|t| {
            t.fail_subscribes.clear();
        });
        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "bad", "z"]));
        assert_eq!(conn.topics(), topics(&["a", "bad", "z"]));
    }

    #[test]
    fn test_desired_applied_after_connect_completes() {
        let mut broker = MockBroker::new();
        broker.fail_connects = 2;
        let conn = BrokerConnection::with_retry_interval(broker, noop_handler(), short_retry());

        // Desired set is stored while the connect loop is still retrying
        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "b"]));
        wait_for_state(&conn, ConnectionState::Connected);

        assert_eq!(conn.topics(), topics(&["a", "b"]));
    }

    // ========================================================================
    // Reconnect resume tests
    // ========================================================================

    #[test]
    fn test_unsolicited_loss_resumes_subscriptions() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a", "b"]));
        wait_for_state(&conn, ConnectionState::Connected);
        conn.with_transport(|t| t.subscribe_calls.clear());

        // Broker drops the session
        conn.with_transport(|t| t.drop_connection());
        wait_for_state(&conn, ConnectionState::Connected);

        // Exactly the two recorded topics were re-subscribed
        conn.with_transport(|t| {
            let mut subs = t.subscribe_calls.clone();
            subs.sort();
            assert_eq!(subs, topics(&["a", "b"]));
        });
        assert_eq!(conn.topics(), topics(&["a", "b"]));
    }

    #[test]
    fn test_unsolicited_loss_retries_reconnect() {
        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), noop_handler(), short_retry());

        conn.configure(Some("tcp://broker:1883"), &topics(&["a"]));
        wait_for_state(&conn, ConnectionState::Connected);

        conn.with_transport(|t| {
            t.fail_connects = 2;
            t.drop_connection();
        });
        wait_for_state(&conn, ConnectionState::Connected);

        // 1 initial + 2 failed + 1 successful reconnect
        conn.with_transport(|t| assert_eq!(t.connect_attempts, 4));
    }

    // ========================================================================
    // Message delivery tests
    // ========================================================================

    #[test]
    fn test_messages_reach_handler_in_order() {
        let seen: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn MessageHandler> = Arc::new(move |topic: &str, payload: &[u8]| {
            sink.lock().unwrap().push((topic.to_string(), payload.to_vec()));
        });

        let conn =
            BrokerConnection::with_retry_interval(MockBroker::new(), handler, short_retry());
        conn.configure(Some("tcp://broker:1883"), &topics(&["sensors/#"]));
        wait_for_state(&conn, ConnectionState::Connected);

        conn.with_transport(|t| {
            t.queue_message("sensors/1", br#"{"block":"1","pos":"1"}"#.to_vec());
            t.queue_message("sensors/2", br#"{"block":"2","pos":"1"}"#.to_vec());
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().len() < 2 {
            assert!(Instant::now() < deadline, "messages not delivered");
            std::thread::sleep(Duration::from_millis(5));
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "sensors/1");
        assert_eq!(seen[1].0, "sensors/2");
    }
}
