//! Sensor event processing: sampling, debouncing, and actuator decisions.
//!
//! Twelve sensors sit around the track, three per block on each of four
//! arduinos. A sensor reports its block and position as a train nears it,
//! and `pos == "0"` as the train moves away. The processor:
//!
//! 1. decodes the payload (malformed input is logged and dropped),
//! 2. treats `pos == "0"` as "no detection": resets the tracked position
//!    and nothing else; it never starts or extends a sampling window,
//! 3. rate-limits to one acted-upon reading per sampling window,
//! 4. drops readings identical to the last acted-upon `(block, pos)`,
//! 5. derives the sensor id, persists it, and drives the actuators by
//!    parity: odd id lights the headlamp and silences the horn, even id
//!    sounds the horn and darkens the headlamp.
//!
//! The decision state is one [`DebounceState`] record guarded by a mutex,
//! so the whole check-and-update (and the actuation it gates) is atomic
//! with respect to concurrent deliveries.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::messages::SensorReading;
use crate::traits::{Actuator, Clock, MessageHandler, SensorStore};
use crate::transport::SystemClock;

/// Default minimum gap between acted-upon readings.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 2000;

/// Sensors per track block.
pub const SENSORS_PER_BLOCK: i32 = 3;

/// Derive the track-wide sensor id from a block/position pair.
///
/// Blocks and positions are 1-based, so block 2 position 1 is sensor 4.
pub fn sensor_id(block_id: i32, position: i32) -> i32 {
    (block_id - 1) * SENSORS_PER_BLOCK + position
}

// ============================================================================
// Debounce State
// ============================================================================

/// Sampling and duplicate-suppression state, one record per processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceState {
    /// Clock reading when the sampling window last opened.
    pub last_sample_ms: u64,
    /// Block of the last acted-upon reading.
    pub last_block: i32,
    /// Position of the last acted-upon reading; reset to 0 by the
    /// "no detection" sentinel.
    pub last_pos: i32,
}

impl Default for DebounceState {
    fn default() -> Self {
        Self {
            last_sample_ms: 0,
            last_block: 0,
            last_pos: 0,
        }
    }
}

// ============================================================================
// Sensor Processor
// ============================================================================

/// Consumes raw sensor messages and drives the actuators.
pub struct SensorProcessor<C: Clock = SystemClock> {
    actuator: Arc<dyn Actuator>,
    store: Arc<dyn SensorStore>,
    clock: C,
    debounce: Mutex<DebounceState>,
    sample_interval_ms: u64,
}

impl<C: Clock> SensorProcessor<C> {
    /// Create a processor with the default sampling interval.
    pub fn new(actuator: Arc<dyn Actuator>, store: Arc<dyn SensorStore>, clock: C) -> Self {
        Self::with_sample_interval(actuator, store, clock, DEFAULT_SAMPLE_INTERVAL_MS)
    }

    /// Create a processor with a custom sampling interval.
    pub fn with_sample_interval(
        actuator: Arc<dyn Actuator>,
        store: Arc<dyn SensorStore>,
        clock: C,
        sample_interval_ms: u64,
    ) -> Self {
        Self {
            actuator,
            store,
            clock,
            debounce: Mutex::new(DebounceState::default()),
            sample_interval_ms,
        }
    }

    /// Current debounce record (for tests and the status surface).
    pub fn debounce_state(&self) -> DebounceState {
        *self.debounce.lock().unwrap()
    }

    /// Handle one raw sensor message.
    ///
    /// Never fails outward: malformed input, early samples, duplicates, and
    /// store failures all end with the reading discarded and processing
    /// ready for the next one.
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        let reading = match SensorReading::decode(payload) {
            Ok(r) => r,
            Err(e) => {
                error!(%topic, error = %e, "discarding malformed sensor payload");
                return;
            }
        };

        let mut debounce = self.debounce.lock().unwrap();

        // Train moved out of range: forget the tracked position so the next
        // detection acts again. The sampling timer is left alone on purpose
        // so a clear report cannot open a window.
        if reading.is_clear() {
            debounce.last_pos = 0;
            debug!(%topic, block = %reading.block, "sensor cleared");
            return;
        }

        let (block, pos) = match (reading.block_id(), reading.position()) {
            (Ok(b), Ok(p)) => (b, p),
            (Err(e), _) | (_, Err(e)) => {
                error!(%topic, error = %e, "discarding sensor payload");
                return;
            }
        };

        // Sampling gate: at most one acted-upon reading per interval.
        let now = self.clock.now_ms();
        if now.saturating_sub(debounce.last_sample_ms) < self.sample_interval_ms {
            debug!(block, pos, "reading inside sampling window, dropped");
            return;
        }
        debounce.last_sample_ms = now;

        // Duplicate-state gate: identical readings must not re-actuate.
        if block == debounce.last_block && pos == debounce.last_pos {
            debug!(block, pos, "state unchanged, already handled");
            return;
        }
        debounce.last_block = block;
        debounce.last_pos = pos;

        let id = sensor_id(block, pos);

        // The datastore is the record of truth for the GUI; if the write
        // fails the actuators stay untouched for this reading.
        if let Err(e) = self.store.record(id) {
            error!(sensor_id = id, error = %e, "error recording sensor value");
            return;
        }

        if id % 2 == 0 {
            self.actuator.set_horn(true);
            self.actuator.set_light(false);
            info!(sensor_id = id, "turn on horn, turn off lights");
        } else {
            self.actuator.set_horn(false);
            self.actuator.set_light(true);
            info!(sensor_id = id, "turn on lights, turn off horn");
        }
    }
}

impl<C: Clock> MessageHandler for SensorProcessor<C> {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        SensorProcessor::on_message(self, topic, payload)
    }
}
