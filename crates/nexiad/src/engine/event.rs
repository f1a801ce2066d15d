use super::state::SensorState;

/// Engine-level events.
///
/// Distinct from `FromIntegrationMessage` (transport-level). The engine converts
/// `FromIntegrationMessage` into `Event` at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SensorStateChanged {
        entity_id: String,
        old_state: Option<SensorState>,
        new_state: SensorState,
    },
    AvailabilityChanged {
        entity_id: String,
        available: bool,
    },
}
