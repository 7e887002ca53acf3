//! `TrainControlApi` backed by a blocking reqwest client.
//!
//! The controller speaks plain HTTP:
//!
//! ```text
//! GET  http://{address}/locos      - inventory as a JSON array
//! POST http://{address}/loco/{id}  - one JSON command fragment
//! ```
//!
//! Calls block the invoking thread until completion or transport failure;
//! there is no retry and no cancellation, per the concurrency model.

use std::time::Duration;

use tracing::debug;

use crate::error::Error;
use crate::traits::TrainControlApi;

/// Per-request timeout; a hung controller must not wedge a caller forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking HTTP client for the train controller.
pub struct HttpControlApi {
    client: reqwest::blocking::Client,
}

impl HttpControlApi {
    /// Create a client with the default timeout.
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            // Builder only fails on TLS/resolver misconfiguration, which we
            // don't touch; fall back to the default client.
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpControlApi {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainControlApi for HttpControlApi {
    fn fetch_inventory(&self, address: &str) -> Result<String, Error> {
        let url = format!("http://{}/locos", address);
        debug!(%url, "fetching inventory");

        let response = self.client.get(&url).send().map_err(Error::transport)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(Error::transport)?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(Error::Protocol { status, body })
        }
    }

    fn send_command(
        &self,
        address: &str,
        loco_id: &str,
        payload: &str,
    ) -> Result<(u16, String), Error> {
        let url = format!("http://{}/loco/{}", address, loco_id);
        debug!(%url, %payload, "posting command");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .map_err(Error::transport)?;

        let status = response.status().as_u16();
        let body = response.text().map_err(Error::transport)?;
        Ok((status, body))
    }
}
