use serde::Serialize;

/// Device metadata reported by an integration alongside its entities.
///
/// Mirrors the fields a device registry shows: how to identify the device,
/// who made it, and which parent device (if any) it is reached through.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeviceInfo {
    /// `(domain, id)` pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<String>,
    /// `(domain, id)` of the parent device this one is grouped under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_url: Option<String>,
}

impl DeviceInfo {
    /// Registry key of this device, derived from its first identifier.
    pub fn device_id(&self) -> Option<String> {
        self.identifiers.first().map(|(d, id)| device_key(d, id))
    }

    /// Registry key of the parent device, if any.
    pub fn via_device_id(&self) -> Option<String> {
        self.via_device.as_ref().map(|(d, id)| device_key(d, id))
    }
}

/// Format a `(domain, id)` pair as a registry key.
pub fn device_key(domain: &str, id: &str) -> String {
    format!("{}:{}", domain, id)
}

/// A device in the nexiad registry.
///
/// A device represents a physical or logical device that contains one or more entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub info: DeviceInfo,
    /// Registry key of the parent device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device_id: Option<String>,
    pub entity_ids: Vec<String>,
}

impl Device {
    pub fn new(id: String, info: DeviceInfo) -> Self {
        let via_device_id = info.via_device_id();
        Self {
            id,
            info,
            via_device_id,
            entity_ids: Vec::new(),
        }
    }

    pub fn add_entity(&mut self, entity_id: String) {
        if !self.entity_ids.contains(&entity_id) {
            self.entity_ids.push(entity_id);
        }
    }

    pub fn remove_entity(&mut self, entity_id: &str) {
        self.entity_ids.retain(|e| e != entity_id);
    }
}
