//! In-memory sensor datastore.
//!
//! Every acted-upon sensor id is written here before the actuator fires,
//! mirroring the deployment where readings land in an IoT datastore. Only
//! the latest value and a running count are kept; history is a non-goal.

use std::sync::Mutex;

use crate::error::Error;
use crate::traits::SensorStore;

/// Latest-value sensor store backed by process memory.
#[derive(Debug, Default)]
pub struct MemorySensorStore {
    inner: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    latest: Option<i32>,
    samples: u64,
}

impl MemorySensorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of readings recorded since creation or the last clear.
    pub fn samples(&self) -> u64 {
        self.inner.lock().unwrap().samples
    }
}

impl SensorStore for MemorySensorStore {
    fn record(&self, sensor_id: i32) -> Result<(), Error> {
        let mut state = self.inner.lock().unwrap();
        state.latest = Some(sensor_id);
        state.samples += 1;
        Ok(())
    }

    fn latest(&self) -> Option<i32> {
        self.inner.lock().unwrap().latest
    }

    fn clear(&self) {
        let mut state = self.inner.lock().unwrap();
        state.latest = None;
        state.samples = 0;
    }
}
