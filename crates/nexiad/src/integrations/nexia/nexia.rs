use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::coordinator::Coordinator;
use super::dispatcher::Dispatcher;
use super::sensor::NexiaSensor;
use super::sensor::setup_sensors;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Sensors by entity id; fixed once setup has run
type SensorsMap = Arc<HashMap<String, Arc<NexiaSensor>>>;

/// Nexia integration for nexiad
///
/// Polls the house through the coordinator and exposes thermostat, zone and
/// Room IQ readings as sensor entities.
pub struct NexiaIntegration {
    coordinator: Arc<Coordinator>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    sensors: SensorsMap,
    /// Handle to the task writing states queued by update signals
    _writer_task: Option<JoinHandle<()>>,
    /// Handle to the coordinator polling task
    _poll_task: Option<JoinHandle<()>>,
}

impl NexiaIntegration {
    pub fn new(coordinator: Coordinator, poll_interval: Duration) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            dispatcher: Dispatcher::new(),
            poll_interval,
            sensors: Arc::new(HashMap::new()),
            _writer_task: None,
            _poll_task: None,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Report a sensor's current state to the engine
    async fn write_state(entity_id: &str, sensor: &NexiaSensor, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::SensorStateChanged {
            entity_id: entity_id.to_string(),
            state: sensor.sensor_state(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send SensorStateChanged message: {}", e);
        }
    }

    /// Register an entity with the engine
    async fn register_entity(
        entity_id: &str,
        sensor: &Arc<NexiaSensor>,
        to_engine: &FromIntegrationSender,
    ) {
        let entity: Arc<dyn Entity> = sensor.clone();
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: entity_id.to_string(),
            entity,
            integration_name: "nexia".to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityDiscovered message: {}", e);
        } else {
            debug!("Registered entity: {}", entity_id);
        }
    }

    /// Write the state of entities whose update signal fired
    async fn write_states_task(
        mut queued: mpsc::UnboundedReceiver<String>,
        sensors: SensorsMap,
        to_engine: FromIntegrationSender,
    ) {
        while let Some(entity_id) = queued.recv().await {
            if let Some(sensor) = sensors.get(&entity_id) {
                Self::write_state(&entity_id, sensor, &to_engine).await;
            }
        }
    }

    /// Refresh the coordinator on every tick and write every entity's state,
    /// availability included.
    async fn poll_task(
        coordinator: Arc<Coordinator>,
        sensors: SensorsMap,
        poll_interval: Duration,
        to_engine: FromIntegrationSender,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; setup has just refreshed.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            // Failures are logged by the coordinator and surface as unavailability.
            let _ = coordinator.refresh().await;

            for (entity_id, sensor) in sensors.iter() {
                Self::write_state(entity_id, sensor, &to_engine).await;
            }
        }
    }
}

#[async_trait]
impl Integration for NexiaIntegration {
    fn name(&self) -> &str {
        "nexia"
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        info!("Fetching house data from {}", self.coordinator.root_url());
        self.coordinator
            .refresh()
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let mut sensors = HashMap::new();
        for sensor in setup_sensors(&self.coordinator, &self.dispatcher) {
            let entity_id = sensor.entity_id();
            let queue_tx = queue_tx.clone();
            let queued_id = entity_id.clone();
            sensor.entity().attach(move || {
                // The writer only stops at shutdown, after detaching everything.
                let _ = queue_tx.send(queued_id.clone());
            });
            sensors.insert(entity_id, Arc::new(sensor));
        }
        self.sensors = Arc::new(sensors);

        info!(
            "Nexia integration created {} sensor(s) for {} thermostat(s)",
            self.sensors.len(),
            self.coordinator.snapshot().thermostats.len()
        );

        for (entity_id, sensor) in self.sensors.iter() {
            Self::register_entity(entity_id, sensor, &tx).await;
        }
        for (entity_id, sensor) in self.sensors.iter() {
            Self::write_state(entity_id, sensor, &tx).await;
        }

        let sensors = self.sensors.clone();
        let writer_tx = tx.clone();
        self._writer_task = Some(tokio::spawn(async move {
            Self::write_states_task(queue_rx, sensors, writer_tx).await;
        }));

        let coordinator = self.coordinator.clone();
        let sensors = self.sensors.clone();
        let poll_interval = self.poll_interval;
        self._poll_task = Some(tokio::spawn(async move {
            Self::poll_task(coordinator, sensors, poll_interval, tx).await;
        }));

        info!("Nexia integration polling every {:?}", self.poll_interval);
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::RefreshEntity { entity_id } => {
                let sensor = self
                    .sensors
                    .get(&entity_id)
                    .ok_or_else(|| -> Box<dyn Error + Send> {
                        Box::new(std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("Sensor not found: {}", entity_id),
                        ))
                    })?
                    .clone();

                info!(
                    "Refreshing thermostat {} for {}",
                    sensor.entity().thermostat_id(),
                    entity_id
                );
                let refreshed = self.coordinator.refresh().await;

                // Signal even on failure so availability is written right away.
                let notified = sensor.entity().signal_thermostat_update();
                debug!("Thermostat update reached {} entities", notified);

                refreshed.map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Nexia integration shutting down");
        for sensor in self.sensors.values() {
            sensor.entity().detach();
        }
        if let Some(task) = self._poll_task.take() {
            task.abort();
        }
        if let Some(task) = self._writer_task.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::engine::SensorState;
    use crate::integrations::nexia::dispatcher::Signal;
    use crate::integrations::nexia::model::Home;
    use crate::integrations::nexia::model::fixtures;
    use crate::integrations::nexia::source::StaticSource;

    const WAIT: Duration = Duration::from_secs(5);

    fn integration(source: Arc<StaticSource>, poll_interval: Duration) -> NexiaIntegration {
        NexiaIntegration::new(Coordinator::new(Box::new(source)), poll_interval)
    }

    async fn next_state(
        rx: &mut mpsc::Receiver<FromIntegrationMessage>,
    ) -> (String, SensorState) {
        loop {
            let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            if let FromIntegrationMessage::SensorStateChanged { entity_id, state } = msg {
                return (entity_id, state);
            }
        }
    }

    /// Drain setup's discovery and initial state messages.
    async fn drain_setup(rx: &mut mpsc::Receiver<FromIntegrationMessage>, count: usize) {
        for _ in 0..count * 2 {
            timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_setup_reports_entities_then_states() {
        let source = Arc::new(StaticSource::new(fixtures::home()));
        let mut nexia = integration(source, Duration::from_secs(3600));
        let (tx, mut rx) = mpsc::channel(256);

        nexia.setup(tx).await.unwrap();
        let count = nexia.sensors.len();
        assert_eq!(count, 22);

        for _ in 0..count {
            match rx.recv().await.unwrap() {
                FromIntegrationMessage::EntityDiscovered {
                    entity_id,
                    entity,
                    integration_name,
                } => {
                    assert_eq!(integration_name, "nexia");
                    assert_eq!(entity_id, format!("sensor.{}", entity.unique_id()));
                    assert!(entity.device_info().is_some());
                }
                other => panic!("expected discovery, got {:?}", other),
            }
        }

        let (entity_id, state) = next_state(&mut rx).await;
        assert!(entity_id.starts_with("sensor."));
        assert!(state.available);

        // Every entity listens on its thermostat's channel
        assert_eq!(nexia.dispatcher().listener_count(Signal::thermostat(2059661)), 17);
        assert_eq!(nexia.dispatcher().listener_count(Signal::thermostat(2293892)), 5);

        nexia.shutdown().await.unwrap();
        assert_eq!(nexia.dispatcher().listener_count(Signal::thermostat(2059661)), 0);
    }

    #[tokio::test]
    async fn test_setup_fails_without_data() {
        let source = Arc::new(StaticSource::new(Home::default()));
        source.fail("bad credentials");
        let mut nexia = integration(source, Duration::from_secs(3600));
        let (tx, _rx) = mpsc::channel(16);

        assert!(nexia.setup(tx).await.is_err());
        assert!(nexia.sensors.is_empty());
    }

    #[tokio::test]
    async fn test_zone_signal_writes_only_that_zone() {
        let source = Arc::new(StaticSource::new(fixtures::home()));
        let mut nexia = integration(source, Duration::from_secs(3600));
        let (tx, mut rx) = mpsc::channel(256);
        nexia.setup(tx).await.unwrap();
        drain_setup(&mut rx, nexia.sensors.len()).await;

        assert_eq!(nexia.dispatcher().send(Signal::zone(83261005)), 3);

        let mut written = Vec::new();
        for _ in 0..3 {
            written.push(next_state(&mut rx).await.0);
        }
        written.sort();
        assert_eq!(
            written,
            vec![
                "sensor.83261005_get_setpoint_status",
                "sensor.83261005_get_status",
                "sensor.83261005_get_temperature",
            ]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_entity_pushes_new_data() {
        let source = Arc::new(StaticSource::new(fixtures::home()));
        let mut nexia = integration(source.clone(), Duration::from_secs(3600));
        let (tx, mut rx) = mpsc::channel(256);
        nexia.setup(tx).await.unwrap();
        drain_setup(&mut rx, nexia.sensors.len()).await;

        let mut home = fixtures::home();
        home.thermostats[1].system_status = "Heating".to_string();
        source.set(home);

        nexia
            .handle_message(ToIntegrationMessage::RefreshEntity {
                entity_id: "sensor.83394133_get_status".to_string(),
            })
            .await
            .unwrap();

        // Everything on the basement thermostat is rewritten
        let mut states = HashMap::new();
        for _ in 0..5 {
            let (entity_id, state) = next_state(&mut rx).await;
            states.insert(entity_id, state);
        }
        assert_eq!(
            states["sensor.2293892_get_system_status"].native_value,
            serde_json::json!("Heating")
        );

        let unknown = nexia
            .handle_message(ToIntegrationMessage::RefreshEntity {
                entity_id: "sensor.nope".to_string(),
            })
            .await;
        assert!(unknown.is_err());
    }

    #[tokio::test]
    async fn test_poll_marks_entities_unavailable_on_failure() {
        let source = Arc::new(StaticSource::new(fixtures::home()));
        let mut nexia = integration(source.clone(), Duration::from_millis(20));
        let (tx, mut rx) = mpsc::channel(1024);
        nexia.setup(tx).await.unwrap();
        drain_setup(&mut rx, nexia.sensors.len()).await;

        source.fail("timeout");

        let (_, state) = timeout(WAIT, async {
            loop {
                let (entity_id, state) = next_state(&mut rx).await;
                if !state.available {
                    return (entity_id, state);
                }
            }
        })
        .await
        .unwrap();
        assert!(!state.available);

        nexia.shutdown().await.unwrap();
    }
}
