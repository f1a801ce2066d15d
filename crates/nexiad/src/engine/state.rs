use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::device::Device;

/// State of a sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorState {
    /// Current reading; `null` when unknown.
    pub native_value: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_key: Option<String>,

    /// Whether the reading reflects live data.
    pub available: bool,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub sensors: HashMap<String, SensorState>,
    pub devices: BTreeMap<String, Device>,
}
