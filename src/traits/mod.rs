//! Trait definitions for the core's external collaborators.
//!
//! Everything the core talks to (the message broker, the train controller,
//! the sensor datastore, the wall clock) sits behind a trait so that the
//! connection, debounce, and reconciliation logic can be exercised on the
//! desk with mocks.
//!
//! # Submodules
//!
//! - `broker`: subscribe-side broker transport and message delivery
//! - `train`: train controller HTTP surface, actuator, sensor store, clock
//!
//! # Seams
//!
//! - [`BrokerTransport`]: connect/subscribe/unsubscribe primitives
//! - [`MessageHandler`]: inbound message sink (implemented by the sensor
//!   processor)
//! - [`TrainControlApi`]: `GET /locos` and `POST /loco/{id}`
//! - [`Actuator`]: horn and headlight commands derived from sensor events
//! - [`SensorStore`]: latest-value sensor datastore
//! - [`Clock`]: time source, mockable for debounce tests

pub mod broker;
pub mod train;

pub use broker::*;
pub use train::*;
