use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::device::Device;
use super::event::Event;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::SensorState;
use super::state::State;
use crate::engine::IntegrationContext;

/// nexiad engine
///
/// This structure handles the flow of events, sending commands to the correct
/// integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Fan-out of engine events to any interested observer
    events: broadcast::Sender<Event>,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

/// Events buffered per observer before the slowest one starts lagging
const EVENT_CHANNEL_SIZE: usize = 256;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            events,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every factory in the integration registry; factories return
    /// `None` when their section is absent or disabled.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.insert(name.clone(), to_integration_tx);
        }

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        if let Ok(mut handles) = self.integration_handles.lock() {
            handles.push(handle);
        }
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), Box<dyn Error + Send>> {
        // Extract entity_id from command for routing
        let entity_id = match &msg {
            ToIntegrationMessage::RefreshEntity { entity_id } => entity_id.clone(),
        };

        // Route to the integration that owns this entity
        let owner = match self.entity_integration_map.lock() {
            Ok(map) => map.get(&entity_id).cloned(),
            Err(e) => return Err(Box::new(std::io::Error::other(e.to_string()))),
        };

        let integration_name = owner.ok_or_else(|| -> Box<dyn Error + Send> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No integration found for entity: {}", entity_id),
            ))
        })?;

        let channels = self
            .integration_channels
            .lock()
            .map_err(|e| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::other(e.to_string()))
            })?;

        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Integration channel not found: {}", integration_name),
                ))
            })?;

        tx.send(msg)
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
    }

    /// Ask the owning integration to refresh an entity outside its poll cycle
    pub fn request_refresh(&self, entity_id: String) -> Result<(), Box<dyn Error + Send>> {
        self.send_command(ToIntegrationMessage::RefreshEntity { entity_id })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Close every integration's command channel and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.clear();
        }

        let handles = match self.integration_handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => Vec::new(),
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task ended abnormally: {}", e);
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Subscribe to engine events emitted after each state change.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn emit(&self, event: Event) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.events.send(event);
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                entity,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                if let Some(info) = entity.device_info() {
                    if let Some(device_id) = info.device_id() {
                        let mut state = State::clone(&self.state.load());
                        let device = state
                            .devices
                            .entry(device_id.clone())
                            .or_insert_with(|| Device::new(device_id.clone(), info.clone()));
                        device.add_entity(entity_id.clone());
                        debug!("Entity {} linked to device {}", entity_id, device_id);
                        self.state.store(Arc::new(state));
                    }
                }

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.insert(entity_id, integration_name);
                }
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                {
                    let mut state = State::clone(&self.state.load());
                    state.sensors.remove(&entity_id);
                    for device in state.devices.values_mut() {
                        device.remove_entity(&entity_id);
                    }
                    self.state.store(Arc::new(state));
                }

                // Remove from routing map
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.remove(&entity_id);
                }
            }
            FromIntegrationMessage::SensorStateChanged { entity_id, state } => {
                self.apply_sensor_state(entity_id, state);
            }
        }
    }

    fn apply_sensor_state(&self, entity_id: String, new_state: SensorState) {
        let old_state = {
            let mut state = State::clone(&self.state.load());
            let old = state.sensors.insert(entity_id.clone(), new_state.clone());
            self.state.store(Arc::new(state));
            old
        };

        if old_state.as_ref() == Some(&new_state) {
            return;
        }

        debug!(
            "Sensor state changed: {} -> {} (available={})",
            entity_id, new_state.native_value, new_state.available
        );

        if old_state.as_ref().map(|s| s.available) != Some(new_state.available) {
            self.emit(Event::AvailabilityChanged {
                entity_id: entity_id.clone(),
                available: new_state.available,
            });
        }

        self.emit(Event::SensorStateChanged {
            entity_id,
            old_state,
            new_state,
        });
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::engine::DeviceInfo;
    use crate::engine::Entity;

    struct FakeEntity {
        unique_id: String,
        device: DeviceInfo,
    }

    impl Entity for FakeEntity {
        fn unique_id(&self) -> &str {
            &self.unique_id
        }

        fn platform(&self) -> &'static str {
            "sensor"
        }

        fn device_info(&self) -> Option<&DeviceInfo> {
            Some(&self.device)
        }

        fn state_json(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    fn discovered(entity_id: &str, device_id: &str) -> FromIntegrationMessage {
        FromIntegrationMessage::EntityDiscovered {
            entity_id: entity_id.to_string(),
            entity: Arc::new(FakeEntity {
                unique_id: entity_id.to_string(),
                device: DeviceInfo {
                    identifiers: vec![("nexia".to_string(), device_id.to_string())],
                    name: format!("Device {}", device_id),
                    ..Default::default()
                },
            }),
            integration_name: "fake".to_string(),
        }
    }

    fn reading(value: serde_json::Value, available: bool) -> SensorState {
        SensorState {
            native_value: value,
            available,
            ..Default::default()
        }
    }

    #[test]
    fn test_discovery_registers_device() {
        let engine = Engine::new();
        engine.handle_event(discovered("sensor.a", "1"));
        engine.handle_event(discovered("sensor.b", "1"));
        engine.handle_event(discovered("sensor.c", "2"));

        let state = engine.state_snapshot();
        assert_eq!(state.devices.len(), 2);
        assert_eq!(state.devices["nexia:1"].entity_ids, vec!["sensor.a", "sensor.b"]);
        assert_eq!(state.devices["nexia:2"].entity_ids, vec!["sensor.c"]);
        assert!(state.sensors.is_empty());
    }

    #[test]
    fn test_state_change_emits_events() {
        let engine = Engine::new();
        let mut events = engine.subscribe();

        engine.handle_event(FromIntegrationMessage::SensorStateChanged {
            entity_id: "sensor.a".to_string(),
            state: reading(serde_json::json!(72.3), true),
        });

        assert_eq!(
            events.try_recv().unwrap(),
            Event::AvailabilityChanged {
                entity_id: "sensor.a".to_string(),
                available: true,
            }
        );
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::SensorStateChanged { old_state: None, .. }
        ));

        // Writing the same state again is not a change
        engine.handle_event(FromIntegrationMessage::SensorStateChanged {
            entity_id: "sensor.a".to_string(),
            state: reading(serde_json::json!(72.3), true),
        });
        assert!(events.try_recv().is_err());

        assert_eq!(
            engine.state_snapshot().sensors["sensor.a"].native_value,
            serde_json::json!(72.3)
        );
    }

    #[test]
    fn test_entity_removed_clears_state_and_routing() {
        let engine = Engine::new();
        engine.handle_event(discovered("sensor.a", "1"));
        engine.handle_event(FromIntegrationMessage::SensorStateChanged {
            entity_id: "sensor.a".to_string(),
            state: reading(serde_json::json!("Cooling"), true),
        });
        engine.handle_event(FromIntegrationMessage::EntityRemoved {
            entity_id: "sensor.a".to_string(),
        });

        let state = engine.state_snapshot();
        assert!(state.sensors.is_empty());
        assert!(state.devices["nexia:1"].entity_ids.is_empty());
        assert!(engine.request_refresh("sensor.a".to_string()).is_err());
    }

    struct RecordingIntegration {
        commands: mpsc::UnboundedSender<ToIntegrationMessage>,
    }

    #[async_trait]
    impl Integration for RecordingIntegration {
        fn name(&self) -> &str {
            "recording"
        }

        async fn setup(&mut self, _tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            let _ = self.commands.send(msg);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_request_refresh_routes_to_owner() {
        let (commands, mut received) = mpsc::unbounded_channel();
        let mut engine = Engine::new();
        engine.register_integration(
            "recording".to_string(),
            Box::new(RecordingIntegration { commands }),
        );
        engine.handle_event(FromIntegrationMessage::EntityDiscovered {
            entity_id: "sensor.a".to_string(),
            entity: Arc::new(FakeEntity {
                unique_id: "a".to_string(),
                device: DeviceInfo::default(),
            }),
            integration_name: "recording".to_string(),
        });

        engine.request_refresh("sensor.a".to_string()).unwrap();
        assert_eq!(
            received.recv().await,
            Some(ToIntegrationMessage::RefreshEntity {
                entity_id: "sensor.a".to_string()
            })
        );

        engine.shutdown().await;
    }
}
