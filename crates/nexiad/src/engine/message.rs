//! Type-safe message system for nexiad
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use std::sync::Arc;

use super::entity::Entity;
use super::state::SensorState;

/// Messages FROM integrations TO the engine (events/state updates)
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        entity: Arc<dyn Entity>,
        integration_name: String,
    },

    /// An entity was removed
    EntityRemoved { entity_id: String },

    /// A sensor's state was written
    SensorStateChanged {
        entity_id: String,
        state: SensorState,
    },
}

impl std::fmt::Debug for FromIntegrationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                ..
            } => f
                .debug_struct("EntityDiscovered")
                .field("entity_id", entity_id)
                .field("integration_name", integration_name)
                .field("entity", &"<entity>")
                .finish(),
            FromIntegrationMessage::EntityRemoved { entity_id } => f
                .debug_struct("EntityRemoved")
                .field("entity_id", entity_id)
                .finish(),
            FromIntegrationMessage::SensorStateChanged { entity_id, state } => f
                .debug_struct("SensorStateChanged")
                .field("entity_id", entity_id)
                .field("state", state)
                .finish(),
        }
    }
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone, PartialEq)]
pub enum ToIntegrationMessage {
    /// Fetch fresh data for an entity and push it without waiting for the next poll
    RefreshEntity { entity_id: String },
}
