//! Snapshot of a Nexia house as fetched by the coordinator.
//!
//! A snapshot is immutable once fetched; the coordinator swaps in a whole new
//! one on every refresh.

use serde::Deserialize;
use serde::Serialize;

/// Unit string a thermostat reports when configured for Celsius.
pub const UNIT_CELSIUS: &str = "C";

/// Room IQ type of the sensor built into the thermostat itself.
pub const BUILTIN_ROOM_IQ_TYPE: &str = "thermostat";

/// A temperature exactly as the vendor reports it.
///
/// Fahrenheit thermostats report whole degrees; Celsius ones report halves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurement {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Home {
    #[serde(default)]
    pub thermostats: Vec<Thermostat>,
}

impl Home {
    pub fn thermostat_ids(&self) -> Vec<u64> {
        self.thermostats.iter().map(|t| t.id).collect()
    }

    pub fn thermostat_by_id(&self, id: u64) -> Option<&Thermostat> {
        self.thermostats.iter().find(|t| t.id == id)
    }
}

/// Current and requested compressor speed, as fractions of full speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorSpeed {
    pub current: f64,
    pub requested: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thermostat {
    pub id: u64,
    pub name: String,
    pub model: String,
    pub firmware: String,
    #[serde(default)]
    pub online: bool,
    /// `"C"` or `"F"`
    pub unit: String,
    pub system_status: String,
    pub air_cleaner_mode: String,
    /// Present only on variable-speed systems
    #[serde(default)]
    pub compressor_speed: Option<CompressorSpeed>,
    #[serde(default)]
    pub outdoor_temperature: Option<Measurement>,
    /// Fraction, 0.0 - 1.0
    #[serde(default)]
    pub relative_humidity: Option<f64>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub room_iqs: Vec<RoomIq>,
}

impl Thermostat {
    pub fn has_variable_speed_compressor(&self) -> bool {
        self.compressor_speed.is_some()
    }

    pub fn has_outdoor_temperature(&self) -> bool {
        self.outdoor_temperature.is_some()
    }

    pub fn has_relative_humidity(&self) -> bool {
        self.relative_humidity.is_some()
    }

    pub fn zone_ids(&self) -> Vec<u64> {
        self.zones.iter().map(|z| z.id).collect()
    }

    pub fn zone_by_id(&self, id: u64) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn room_iq_ids(&self) -> Vec<u64> {
        self.room_iqs.iter().map(|iq| iq.id).collect()
    }

    pub fn room_iq_by_id(&self, id: u64) -> Option<&RoomIq> {
        self.room_iqs.iter().find(|iq| iq.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u64,
    pub name: String,
    pub temperature: Measurement,
    pub status: String,
    pub setpoint_status: String,
}

/// An auxiliary room sensor paired with a thermostat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomIq {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    /// Share of the thermostat's averaging, 0.0 - 1.0
    #[serde(default)]
    pub weight: f64,
    pub temperature: Measurement,
    #[serde(default)]
    pub humidity: i64,
    #[serde(default)]
    pub battery_level: i64,
}

impl RoomIq {
    pub fn is_builtin(&self) -> bool {
        self.sensor_type == BUILTIN_ROOM_IQ_TYPE
    }
}
