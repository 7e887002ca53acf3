//! Wire types for sensor payloads, controller inventory, and train commands.
//!
//! # Example
//!
//! ```
//! use trackside::messages::{SensorReading, TrainCommand};
//!
//! let reading = SensorReading::decode(br#"{"block":"2","pos":"1"}"#).unwrap();
//! assert_eq!(reading.block_id().unwrap(), 2);
//!
//! let json = TrainCommand::bell(true).to_json();
//! assert_eq!(json, r#"{"bell":"on"}"#);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ============================================================================
// Sensor Readings
// ============================================================================

/// A raw position report from a track-side sensor.
///
/// The wire format is a JSON object with required string fields `block` and
/// `pos`; any other fields are ignored. The arduino firmware sends both as
/// decimal strings, so numeric conversion happens separately and a
/// non-numeric value is a parse failure at the point of use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SensorReading {
    /// Track block the sensor belongs to, as sent (decimal string).
    pub block: String,
    /// Position of the sensor within its block; `"0"` means no detection.
    pub pos: String,
}

impl SensorReading {
    /// Decode a reading from a raw payload.
    ///
    /// Fails on invalid UTF-8, invalid JSON, or a missing required field.
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(payload).map_err(Error::parse)
    }

    /// Numeric block id, if `block` is a valid integer.
    pub fn block_id(&self) -> Result<i32, Error> {
        self.block
            .trim()
            .parse()
            .map_err(|_| Error::Parse(format!("non-numeric block: {:?}", self.block)))
    }

    /// Numeric position, if `pos` is a valid integer.
    pub fn position(&self) -> Result<i32, Error> {
        self.pos
            .trim()
            .parse()
            .map_err(|_| Error::Parse(format!("non-numeric pos: {:?}", self.pos)))
    }

    /// Whether this is the "no detection" sentinel (`pos == "0"`).
    pub fn is_clear(&self) -> bool {
        self.pos.trim() == "0"
    }
}

// ============================================================================
// Train Commands
// ============================================================================

/// On/off value carried by switch-style commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    /// Actuator engaged.
    On,
    /// Actuator released.
    Off,
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

/// One discrete command for a loco.
///
/// Serializes to a JSON object with exactly one key, matching what the
/// train controller expects on `POST /loco/{id}`:
///
/// ```json
/// {"speed": 40}
/// {"headlight": "on"}
/// {"bell": "off"}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainCommand {
    /// Set the loco speed.
    Speed {
        /// Target speed in controller units.
        speed: i32,
    },
    /// Switch the headlight.
    Headlight {
        /// New headlight state.
        headlight: Switch,
    },
    /// Ring or silence the bell.
    Bell {
        /// New bell state.
        bell: Switch,
    },
}

impl TrainCommand {
    /// Speed command.
    pub fn speed(speed: i32) -> Self {
        Self::Speed { speed }
    }

    /// Headlight command.
    pub fn headlight(on: bool) -> Self {
        Self::Headlight {
            headlight: on.into(),
        }
    }

    /// Bell command.
    pub fn bell(on: bool) -> Self {
        Self::Bell { bell: on.into() }
    }

    /// Serialize to the single-key JSON object the controller expects.
    pub fn to_json(&self) -> String {
        // A struct of primitives cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================================================
// Inventory Payload
// ============================================================================

/// One train as reported by the controller inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    /// Unique loco id (the element's single top-level key).
    pub loco_id: String,
    /// Opaque per-train parameters (the key's value).
    pub parms: Value,
}

/// Parse the `GET /locos` payload.
///
/// The wire format is a JSON array where each element is an object whose
/// single top-level key is the loco id and whose value is an opaque
/// parameter object. A payload that is not a JSON array fails the whole
/// parse; an element that is not an object, or has no key, is skipped.
pub fn parse_inventory(payload: &str) -> Result<Vec<InventoryEntry>, Error> {
    let root: Value = serde_json::from_str(payload).map_err(Error::parse)?;
    let items = root
        .as_array()
        .ok_or_else(|| Error::Parse("inventory payload is not a JSON array".to_string()))?;

    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            tracing::warn!(index = i, "skipping non-object inventory element");
            continue;
        };
        let Some((loco_id, parms)) = obj.iter().next() else {
            tracing::warn!(index = i, "skipping inventory element with no loco id");
            continue;
        };
        entries.push(InventoryEntry {
            loco_id: loco_id.clone(),
            parms: parms.clone(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // SensorReading tests
    // ========================================================================

    #[test]
    fn test_decode_valid_reading() {
        let reading = SensorReading::decode(br#"{"block":"2","pos":"1"}"#).unwrap();
        assert_eq!(reading.block, "2");
        assert_eq!(reading.pos, "1");
        assert_eq!(reading.block_id().unwrap(), 2);
        assert_eq!(reading.position().unwrap(), 1);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let payload = br#"{"block":"3","pos":"2","rssi":-60,"fw":"1.2"}"#;
        let reading = SensorReading::decode(payload).unwrap();
        assert_eq!(reading.block_id().unwrap(), 3);
    }

    #[test]
    fn test_decode_missing_pos_fails() {
        assert!(SensorReading::decode(br#"{"block":"2"}"#).is_err());
    }

    #[test]
    fn test_decode_missing_block_fails() {
        assert!(SensorReading::decode(br#"{"pos":"1"}"#).is_err());
    }

    #[test]
    fn test_decode_not_json_fails() {
        assert!(SensorReading::decode(b"not-json").is_err());
    }

    #[test]
    fn test_decode_invalid_utf8_fails() {
        assert!(SensorReading::decode(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_non_numeric_block() {
        let reading = SensorReading::decode(br#"{"block":"two","pos":"1"}"#).unwrap();
        assert!(reading.block_id().is_err());
    }

    #[test]
    fn test_is_clear() {
        let clear = SensorReading::decode(br#"{"block":"1","pos":"0"}"#).unwrap();
        assert!(clear.is_clear());

        let active = SensorReading::decode(br#"{"block":"1","pos":"2"}"#).unwrap();
        assert!(!active.is_clear());
    }

    // ========================================================================
    // TrainCommand tests
    // ========================================================================

    #[test]
    fn test_speed_command_json() {
        assert_eq!(TrainCommand::speed(40).to_json(), r#"{"speed":40}"#);
    }

    #[test]
    fn test_headlight_command_json() {
        assert_eq!(
            TrainCommand::headlight(true).to_json(),
            r#"{"headlight":"on"}"#
        );
        assert_eq!(
            TrainCommand::headlight(false).to_json(),
            r#"{"headlight":"off"}"#
        );
    }

    #[test]
    fn test_bell_command_json() {
        assert_eq!(TrainCommand::bell(true).to_json(), r#"{"bell":"on"}"#);
        assert_eq!(TrainCommand::bell(false).to_json(), r#"{"bell":"off"}"#);
    }

    #[test]
    fn test_command_roundtrip() {
        let cmd: TrainCommand = serde_json::from_str(r#"{"headlight":"on"}"#).unwrap();
        assert_eq!(cmd, TrainCommand::headlight(true));
    }

    // ========================================================================
    // Inventory parsing tests
    // ========================================================================

    #[test]
    fn test_parse_inventory_two_trains() {
        let payload = r#"[{"5": {"speed": 0}}, {"7": {"speed": 20, "bell": "on"}}]"#;
        let entries = parse_inventory(payload).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].loco_id, "5");
        assert_eq!(entries[1].loco_id, "7");
        assert_eq!(entries[1].parms["speed"], 20);
    }

    #[test]
    fn test_parse_inventory_empty_array() {
        let entries = parse_inventory("[]").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_inventory_not_array_fails() {
        assert!(parse_inventory(r#"{"5": {}}"#).is_err());
        assert!(parse_inventory("garbage").is_err());
    }

    #[test]
    fn test_parse_inventory_skips_bad_elements() {
        let payload = r#"[{"5": {}}, 42, {}, {"7": {}}]"#;
        let entries = parse_inventory(payload).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].loco_id, "5");
        assert_eq!(entries[1].loco_id, "7");
    }
}
