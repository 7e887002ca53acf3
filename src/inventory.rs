//! Train inventory reconciliation.
//!
//! The remote controller is the source of truth for which trains exist;
//! the local [`TrainRegistry`] is a reconciled mirror of it. Each pass is a
//! full replace-by-diff, not an incremental patch:
//!
//! 1. collect every loco id currently registered into a working set,
//! 2. upsert each train the controller reports, removing its id from the
//!    working set,
//! 3. delete whatever ids remain, since the controller no longer has them.
//!
//! Running the same payload twice yields the same registry, and the result
//! depends only on (previous registry, payload). A pass holds the registry
//! mutex from first read to last delete, so readers never observe a
//! half-applied diff. Fetch failures leave the registry untouched; there is
//! no retry loop here; the next endpoint change or explicit refresh tries
//! again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::control::EndpointHandle;
use crate::error::Error;
use crate::messages::parse_inventory;
use crate::registry::{TrainRecord, TrainRegistry};
use crate::traits::TrainControlApi;

/// Keeps the local train registry in sync with the remote controller.
pub struct InventoryReconciler<A: TrainControlApi> {
    api: Arc<A>,
    endpoint: EndpointHandle,
    registry: Mutex<TrainRegistry>,
}

impl<A: TrainControlApi> InventoryReconciler<A> {
    /// Create a reconciler with an empty registry, sharing `endpoint` with
    /// the control sender.
    pub fn new(api: Arc<A>, endpoint: EndpointHandle) -> Self {
        Self {
            api,
            endpoint,
            registry: Mutex::new(TrainRegistry::new()),
        }
    }

    /// Fetch the current inventory from the controller and reconcile.
    ///
    /// With no controller configured this is a silent no-op. A fetch
    /// failure is logged and surfaced with the registry untouched; the
    /// caller may try again later.
    pub fn refresh(&self) -> Result<(), Error> {
        let Some(endpoint) = self.endpoint.get() else {
            debug!("no train controller configured, skipping inventory refresh");
            return Ok(());
        };

        info!(controller = %endpoint.address, "fetching train inventory");
        let payload = match self.api.fetch_inventory(&endpoint.address) {
            Ok(payload) => payload,
            Err(e) => {
                error!(controller = %endpoint.address, error = %e,
                    "error retrieving trains from controller");
                return Err(e);
            }
        };

        self.reconcile(&payload)
    }

    /// Reconcile the registry against a raw inventory payload.
    ///
    /// A payload that fails to parse as an array aborts the whole pass with
    /// the registry untouched; a malformed individual element is skipped.
    pub fn reconcile(&self, payload: &str) -> Result<(), Error> {
        let entries = match parse_inventory(payload) {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "cannot parse inventory payload, registry untouched");
                return Err(e);
            }
        };

        let mut registry = self.registry.lock().unwrap();

        let mut working: HashSet<String> = registry.loco_ids().into_iter().collect();
        info!(
            known = working.len(),
            reported = entries.len(),
            "reconciling train inventory"
        );

        for entry in entries {
            debug!(loco_id = %entry.loco_id, "add/update train");
            working.remove(&entry.loco_id);
            registry.upsert(TrainRecord::new(entry.loco_id, entry.parms));
        }

        for loco_id in working {
            registry.remove(&loco_id);
            info!(%loco_id, "removing train, controller does not report it anymore");
        }

        Ok(())
    }

    /// Read the registry under its lock.
    pub fn with_registry<R>(&self, f: impl FnOnce(&TrainRegistry) -> R) -> R {
        let registry = self.registry.lock().unwrap();
        f(&registry)
    }

    /// Snapshot of all known trains, sorted by loco id.
    pub fn trains(&self) -> Vec<TrainRecord> {
        let mut records = self.registry.lock().unwrap().records();
        records.sort_by(|a, b| a.loco_id.cmp(&b.loco_id));
        records
    }

    /// Drop every registered train.
    pub fn clear(&self) {
        self.registry.lock().unwrap().clear();
    }
}
