//! Outbound command path to the remote train controller.
//!
//! [`ControlSender`] is a thin wrapper over the controller's HTTP surface:
//! it serializes one command per request, checks the status class, and
//! never retries. It also implements the [`Actuator`] seam, which is how
//! sensor decisions become `bell`/`headlight` commands on the default loco.
//!
//! The configured endpoint lives in an [`EndpointHandle`] shared with the
//! inventory reconciler, so a single config change redirects both paths.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::ControllerSettings;
use crate::error::Error;
use crate::messages::TrainCommand;
use crate::traits::{Actuator, TrainControlApi};

// ============================================================================
// Endpoint Handle
// ============================================================================

/// Shared, mutable view of the configured controller endpoint.
///
/// Clones share the same slot. `None` means no controller is configured and
/// every outbound operation is a silent no-op.
#[derive(Clone, Debug, Default)]
pub struct EndpointHandle {
    inner: Arc<Mutex<Option<ControllerSettings>>>,
}

impl EndpointHandle {
    /// Create an unconfigured handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the endpoint (`None` = deleted).
    pub fn set(&self, settings: Option<ControllerSettings>) {
        *self.inner.lock().unwrap() = settings;
    }

    /// Current endpoint, if configured.
    pub fn get(&self) -> Option<ControllerSettings> {
        self.inner.lock().unwrap().clone()
    }

    /// Whether a controller is configured.
    pub fn is_configured(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }
}

// ============================================================================
// Control Outcome
// ============================================================================

/// Result of a multi-fragment control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlOutcome {
    /// Whether the operation as a whole was accepted (a missing loco id is
    /// the only outright rejection).
    pub accepted: bool,
    /// Fragments delivered with a 2xx response.
    pub sent: usize,
    /// Fragments skipped or failed (parse, transport, or protocol).
    pub failed: usize,
}

impl ControlOutcome {
    fn rejected() -> Self {
        Self {
            accepted: false,
            sent: 0,
            failed: 0,
        }
    }
}

// ============================================================================
// Control Sender
// ============================================================================

/// Sends commands to a specific train over the controller's HTTP surface.
pub struct ControlSender<A: TrainControlApi> {
    api: Arc<A>,
    endpoint: EndpointHandle,
}

impl<A: TrainControlApi> ControlSender<A> {
    /// Create a sender sharing `endpoint` with its sibling components.
    pub fn new(api: Arc<A>, endpoint: EndpointHandle) -> Self {
        Self { api, endpoint }
    }

    /// The shared endpoint handle.
    pub fn endpoint(&self) -> &EndpointHandle {
        &self.endpoint
    }

    /// The underlying controller API handle.
    pub fn api(&self) -> Arc<A> {
        Arc::clone(&self.api)
    }

    /// Send one command to `loco_id`.
    ///
    /// With no controller configured this is a silent no-op. A non-2xx
    /// status or a transport failure is logged and returned; there is no
    /// retry and no state is touched.
    pub fn send(&self, loco_id: &str, command: &TrainCommand) -> Result<(), Error> {
        self.send_raw(loco_id, &command.to_json())
    }

    /// Send one pre-serialized JSON payload to `loco_id`.
    pub fn send_raw(&self, loco_id: &str, payload: &str) -> Result<(), Error> {
        let Some(endpoint) = self.endpoint.get() else {
            debug!(%payload, "no train controller configured, dropping command");
            return Ok(());
        };

        info!(%payload, controller = %endpoint.address, %loco_id, "sending command to train controller");
        match self.api.send_command(&endpoint.address, loco_id, payload) {
            Ok((status, _body)) if (200..300).contains(&status) => Ok(()),
            Ok((status, body)) => {
                error!(status, "train controller rejected command");
                Err(Error::Protocol { status, body })
            }
            Err(e) => {
                error!(error = %e, "cannot reach train controller");
                Err(e)
            }
        }
    }

    /// Set the default loco's speed. Failures are logged, not surfaced.
    pub fn set_speed(&self, speed: i32) {
        self.send_default(&TrainCommand::speed(speed));
    }

    /// Switch the default loco's headlight. Failures are logged.
    pub fn set_light(&self, on: bool) {
        self.send_default(&TrainCommand::headlight(on));
    }

    /// Ring or silence the default loco's bell. Failures are logged.
    pub fn set_horn(&self, on: bool) {
        self.send_default(&TrainCommand::bell(on));
    }

    fn send_default(&self, command: &TrainCommand) {
        let Some(endpoint) = self.endpoint.get() else {
            debug!("no train controller configured, dropping command");
            return;
        };
        // send() re-reads the endpoint; fine, it only just got cloned.
        let _ = self.send(&endpoint.default_loco_id, command);
    }

    /// Apply an ordered list of raw JSON command fragments to one loco.
    ///
    /// Each fragment is sent independently: a fragment that is not a JSON
    /// object is logged and skipped, and a failed send does not abort the
    /// remaining ones. Only a missing loco id rejects the whole operation.
    pub fn control_train(&self, loco_id: &str, fragments: &[String]) -> ControlOutcome {
        if loco_id.is_empty() {
            error!("control train: missing loco id");
            return ControlOutcome::rejected();
        }
        if !self.endpoint.is_configured() {
            debug!("no train controller configured, dropping control request");
            return ControlOutcome {
                accepted: true,
                sent: 0,
                failed: 0,
            };
        }

        let mut sent = 0;
        let mut failed = 0;
        for fragment in fragments {
            match serde_json::from_str::<serde_json::Value>(fragment) {
                Ok(value) if value.is_object() => {}
                _ => {
                    error!(%fragment, "skipping malformed command fragment");
                    failed += 1;
                    continue;
                }
            }
            match self.send_raw(loco_id, fragment) {
                Ok(()) => sent += 1,
                Err(_) => failed += 1,
            }
        }

        ControlOutcome {
            accepted: true,
            sent,
            failed,
        }
    }
}

impl<A: TrainControlApi> Actuator for ControlSender<A> {
    fn set_horn(&self, on: bool) {
        ControlSender::set_horn(self, on)
    }

    fn set_light(&self, on: bool) {
        ControlSender::set_light(self, on)
    }
}
