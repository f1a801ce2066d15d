use super::device::DeviceInfo;

/// Entity abstraction for nexiad
///
/// All entities reported by integrations implement the Entity trait. The engine
/// only reads entities; integrations own their refresh cycle.
pub trait Entity: Send + Sync {
    /// Stable identifier, unique across restarts for the same device data
    fn unique_id(&self) -> &str;

    /// Return the platform type of this entity (e.g. "sensor")
    fn platform(&self) -> &'static str;

    /// Device this entity belongs to, if any
    fn device_info(&self) -> Option<&DeviceInfo> {
        None
    }

    /// Whether the entity's data can currently be trusted
    fn available(&self) -> bool {
        true
    }

    /// Serialize current state to JSON
    fn state_json(&self) -> serde_json::Value;
}
