//! Concrete implementations of the collaborator traits.
//!
//! Mirrors the split between abstraction and implementation: mocks are
//! always compiled so every piece of core logic can run on the desk, and
//! the real network clients are feature-gated.
//!
//! | Implementation | Trait | Availability |
//! |----------------|-------|--------------|
//! | [`MockBroker`] | `BrokerTransport` | always |
//! | [`MockTrainApi`] | `TrainControlApi` | always |
//! | [`MockActuator`] | `Actuator` | always |
//! | [`MockClock`] | `Clock` | always |
//! | [`SystemClock`] | `Clock` | always |
//! | [`RumqttTransport`] | `BrokerTransport` | feature `mqtt` |
//! | [`HttpControlApi`] | `TrainControlApi` | feature `http` |

mod mock;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mqtt")]
mod rumqtt;

pub use mock::{ActuatorCall, MockActuator, MockBroker, MockClock, MockTrainApi, SentCommand};

#[cfg(feature = "http")]
pub use http::HttpControlApi;
#[cfg(feature = "mqtt")]
pub use rumqtt::RumqttTransport;

use std::time::Instant;

use crate::traits::Clock;

/// Wall clock measured from process-local start.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Create a clock starting at zero now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
