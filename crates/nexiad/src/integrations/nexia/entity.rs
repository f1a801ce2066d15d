//! Base entity shared by everything attached to a Nexia thermostat.
//!
//! Entities come in three nesting levels: the thermostat itself, a zone on
//! the thermostat, and a Room IQ sensor paired with the thermostat. Zones and
//! Room IQs appear as their own devices, reached via the thermostat.

use std::sync::Arc;
use std::sync::Mutex;

use super::DOMAIN;
use super::MANUFACTURER;
use super::coordinator::Coordinator;
use super::dispatcher::Dispatcher;
use super::dispatcher::Signal;
use super::dispatcher::Subscription;
use super::model::RoomIq;
use super::model::Thermostat;
use super::model::Zone;
use crate::engine::DeviceInfo;

/// Which device an entity is bound to below its thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityScope {
    Thermostat,
    Zone(u64),
    RoomIq(u64),
}

fn identifier(id: u64) -> (String, String) {
    (DOMAIN.to_string(), id.to_string())
}

/// Device record for a thermostat.
pub fn thermostat_device_info(root_url: &str, thermostat: &Thermostat) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![identifier(thermostat.id)],
        name: thermostat.name.clone(),
        manufacturer: Some(MANUFACTURER.to_string()),
        model: Some(thermostat.model.clone()),
        sw_version: Some(thermostat.firmware.clone()),
        suggested_area: None,
        via_device: None,
        configuration_url: Some(root_url.to_string()),
    }
}

/// Device record for a zone, grouped under its thermostat.
pub fn zone_device_info(root_url: &str, thermostat: &Thermostat, zone: &Zone) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![identifier(zone.id)],
        name: zone.name.clone(),
        suggested_area: Some(zone.name.clone()),
        via_device: Some(identifier(thermostat.id)),
        ..thermostat_device_info(root_url, thermostat)
    }
}

/// Device record for a Room IQ sensor, grouped under its thermostat.
///
/// The sensor built into the thermostat is named "<thermostat> builtin" and
/// suggests the thermostat's own area.
pub fn room_iq_device_info(root_url: &str, thermostat: &Thermostat, iq: &RoomIq) -> DeviceInfo {
    let (name, area) = if iq.is_builtin() {
        ("builtin", thermostat.name.as_str())
    } else {
        (iq.name.as_str(), iq.name.as_str())
    };

    DeviceInfo {
        identifiers: vec![identifier(iq.id)],
        name: format!("{} {}", thermostat.name, name),
        suggested_area: Some(area.to_string()),
        via_device: Some(identifier(thermostat.id)),
        ..thermostat_device_info(root_url, thermostat)
    }
}

/// Coordinator-backed entity attached to a thermostat.
pub struct NexiaEntity {
    coordinator: Arc<Coordinator>,
    dispatcher: Dispatcher,
    unique_id: String,
    thermostat_id: u64,
    scope: EntityScope,
    device_info: DeviceInfo,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl NexiaEntity {
    fn new(
        coordinator: Arc<Coordinator>,
        dispatcher: Dispatcher,
        unique_id: String,
        thermostat_id: u64,
        scope: EntityScope,
        device_info: DeviceInfo,
    ) -> Self {
        Self {
            coordinator,
            dispatcher,
            unique_id,
            thermostat_id,
            scope,
            device_info,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn thermostat(
        coordinator: Arc<Coordinator>,
        dispatcher: Dispatcher,
        thermostat: &Thermostat,
        unique_id: String,
    ) -> Self {
        let device_info = thermostat_device_info(coordinator.root_url(), thermostat);
        Self::new(
            coordinator,
            dispatcher,
            unique_id,
            thermostat.id,
            EntityScope::Thermostat,
            device_info,
        )
    }

    pub fn zone(
        coordinator: Arc<Coordinator>,
        dispatcher: Dispatcher,
        thermostat: &Thermostat,
        zone: &Zone,
        unique_id: String,
    ) -> Self {
        let device_info = zone_device_info(coordinator.root_url(), thermostat, zone);
        Self::new(
            coordinator,
            dispatcher,
            unique_id,
            thermostat.id,
            EntityScope::Zone(zone.id),
            device_info,
        )
    }

    pub fn room_iq(
        coordinator: Arc<Coordinator>,
        dispatcher: Dispatcher,
        thermostat: &Thermostat,
        iq: &RoomIq,
        unique_id: String,
    ) -> Self {
        let device_info = room_iq_device_info(coordinator.root_url(), thermostat, iq);
        Self::new(
            coordinator,
            dispatcher,
            unique_id,
            thermostat.id,
            EntityScope::RoomIq(iq.id),
            device_info,
        )
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn thermostat_id(&self) -> u64 {
        self.thermostat_id
    }

    pub fn scope(&self) -> EntityScope {
        self.scope
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// True only if the last refresh succeeded and the thermostat is online.
    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
            && self
                .coordinator
                .snapshot()
                .thermostat_by_id(self.thermostat_id)
                .is_some_and(|t| t.online)
    }

    /// Channels this entity listens on: always its thermostat, plus its own
    /// zone or Room IQ channel.
    pub fn signals(&self) -> Vec<Signal> {
        let mut signals = vec![Signal::thermostat(self.thermostat_id)];
        match self.scope {
            EntityScope::Thermostat => {}
            EntityScope::Zone(id) => signals.push(Signal::zone(id)),
            EntityScope::RoomIq(id) => signals.push(Signal::room_iq(id)),
        }
        signals
    }

    /// Start listening for update signals; `on_update` runs for each one.
    ///
    /// Attaching again replaces the previous subscriptions.
    pub fn attach(&self, on_update: impl Fn() + Clone + Send + Sync + 'static) {
        let subscriptions = self
            .signals()
            .into_iter()
            .map(|signal| self.dispatcher.connect(signal, on_update.clone()))
            .collect();

        if let Ok(mut current) = self.subscriptions.lock() {
            *current = subscriptions;
        }
    }

    /// Release every subscription made by `attach`.
    pub fn detach(&self) {
        if let Ok(mut current) = self.subscriptions.lock() {
            current.clear();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscriptions
            .lock()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    /// Tell every entity on this thermostat, zones included, to write its state.
    pub fn signal_thermostat_update(&self) -> usize {
        self.dispatcher.send(Signal::thermostat(self.thermostat_id))
    }

    /// Tell every entity on this entity's own device to write its state.
    pub fn signal_update(&self) -> usize {
        let signal = match self.scope {
            EntityScope::Thermostat => Signal::thermostat(self.thermostat_id),
            EntityScope::Zone(id) => Signal::zone(id),
            EntityScope::RoomIq(id) => Signal::room_iq(id),
        };
        self.dispatcher.send(signal)
    }
}
