//! Train-side abstractions: controller HTTP surface, actuator, sensor
//! datastore, and clock.

use crate::error::Error;

// ============================================================================
// Train Controller API Trait
// ============================================================================

/// HTTP surface of the remote train controller.
///
/// Two endpoints, both blocking:
///
/// ```text
/// GET  http://{address}/locos      - full inventory as a JSON array
/// POST http://{address}/loco/{id}  - one JSON command fragment
/// ```
///
/// The transport reports status codes verbatim; interpreting non-2xx as a
/// protocol failure is the caller's job. No retries at this level.
pub trait TrainControlApi: Send + Sync {
    /// Fetch the raw inventory payload from `GET /locos`.
    ///
    /// Returns the response body on any 2xx status; a non-2xx status or a
    /// transport failure is an error.
    fn fetch_inventory(&self, address: &str) -> Result<String, Error>;

    /// Send one command payload via `POST /loco/{loco_id}`.
    ///
    /// Returns `(status, body)` whenever the HTTP exchange completed,
    /// regardless of status class; `Err` only on transport failure.
    fn send_command(&self, address: &str, loco_id: &str, payload: &str)
        -> Result<(u16, String), Error>;
}

// ============================================================================
// Actuator Trait
// ============================================================================

/// Discrete actuators the sensor logic can drive on the default loco.
///
/// Kept deliberately narrow: the sensor decision logic only ever toggles
/// the horn and the headlight. Errors are handled (logged) by the
/// implementation; the sensor path does not branch on them.
pub trait Actuator: Send + Sync {
    /// Sound or silence the horn.
    fn set_horn(&self, on: bool);

    /// Switch the headlight on or off.
    fn set_light(&self, on: bool);
}

// ============================================================================
// Sensor Store Trait
// ============================================================================

/// Datastore receiving each acted-upon sensor id.
///
/// The original deployment stored these in an IoT datastore; the in-crate
/// implementation keeps the latest value in memory. Actuation only happens
/// when the store write succeeded, so failures here suppress actuation.
pub trait SensorStore: Send + Sync {
    /// Persist the latest sensor id. An error suppresses actuation for the
    /// reading that produced it.
    fn record(&self, sensor_id: i32) -> Result<(), Error>;

    /// Latest recorded sensor id, if any reading has been acted upon.
    fn latest(&self) -> Option<i32>;

    /// Drop all recorded sensor data.
    fn clear(&self);
}

// ============================================================================
// Clock Trait
// ============================================================================

/// Monotonic time source in milliseconds.
///
/// Abstracted so the debounce window can be driven from a mock in tests.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}
