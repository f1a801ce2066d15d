//! Sensor entities for thermostats, zones and Room IQ sensors.

use std::sync::Arc;

use serde::Serialize;

use super::ATTRIBUTION;
use super::coordinator::Coordinator;
use super::dispatcher::Dispatcher;
use super::entity::NexiaEntity;
use super::model::Home;
use super::model::Measurement;
use super::model::RoomIq;
use super::model::Thermostat;
use super::model::UNIT_CELSIUS;
use super::model::Zone;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::SensorState;

/// A sensor reading as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Round to one decimal place from the exact binary value, ties to even.
fn round_one(v: f64) -> f64 {
    format!("{:.1}", v).parse().unwrap_or(v)
}

impl SensorValue {
    /// Floats are shown with one decimal; everything else passes through.
    pub fn rounded(self) -> Self {
        match self {
            SensorValue::Float(v) => SensorValue::Float(round_one(v)),
            other => other,
        }
    }
}

impl From<Measurement> for SensorValue {
    fn from(m: Measurement) -> Self {
        match m {
            Measurement::Int(v) => SensorValue::Int(v),
            Measurement::Float(v) => SensorValue::Float(v),
        }
    }
}

/// Convert a 0.0 - 1.0 fraction to a percentage with one decimal.
pub fn percent_conv(value: SensorValue) -> SensorValue {
    match value {
        SensorValue::Int(v) => SensorValue::Float(round_one(v as f64 * 100.0)),
        SensorValue::Float(v) => SensorValue::Float(round_one(v * 100.0)),
        text => text,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SensorDeviceClass {
    Temperature,
    Humidity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SensorStateClass {
    Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Unit {
    #[strum(serialize = "°C")]
    Celsius,
    #[strum(serialize = "°F")]
    Fahrenheit,
    #[strum(serialize = "%")]
    Percentage,
}

/// Unit the thermostat reports temperatures in.
pub fn temperature_unit(thermostat: &Thermostat) -> Unit {
    if thermostat.unit == UNIT_CELSIUS {
        Unit::Celsius
    } else {
        Unit::Fahrenheit
    }
}

/// Readings available on a thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatReading {
    SystemStatus,
    AirCleanerMode,
    CurrentCompressorSpeed,
    RequestedCompressorSpeed,
    OutdoorTemperature,
    RelativeHumidity,
}

impl ThermostatReading {
    /// Vendor getter name; part of the unique id.
    pub fn accessor_name(self) -> &'static str {
        match self {
            Self::SystemStatus => "get_system_status",
            Self::AirCleanerMode => "get_air_cleaner_mode",
            Self::CurrentCompressorSpeed => "get_current_compressor_speed",
            Self::RequestedCompressorSpeed => "get_requested_compressor_speed",
            Self::OutdoorTemperature => "get_outdoor_temperature",
            Self::RelativeHumidity => "get_relative_humidity",
        }
    }

    pub fn read(self, thermostat: &Thermostat) -> Option<SensorValue> {
        match self {
            Self::SystemStatus => Some(SensorValue::Text(thermostat.system_status.clone())),
            Self::AirCleanerMode => Some(SensorValue::Text(thermostat.air_cleaner_mode.clone())),
            Self::CurrentCompressorSpeed => thermostat
                .compressor_speed
                .map(|s| SensorValue::Float(s.current)),
            Self::RequestedCompressorSpeed => thermostat
                .compressor_speed
                .map(|s| SensorValue::Float(s.requested)),
            Self::OutdoorTemperature => thermostat.outdoor_temperature.map(SensorValue::from),
            Self::RelativeHumidity => thermostat.relative_humidity.map(SensorValue::Float),
        }
    }
}

/// Readings available on a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneReading {
    Temperature,
    Status,
    SetpointStatus,
}

impl ZoneReading {
    pub fn accessor_name(self) -> &'static str {
        match self {
            Self::Temperature => "get_temperature",
            Self::Status => "get_status",
            Self::SetpointStatus => "get_setpoint_status",
        }
    }

    pub fn read(self, zone: &Zone) -> Option<SensorValue> {
        Some(match self {
            Self::Temperature => zone.temperature.into(),
            Self::Status => SensorValue::Text(zone.status.clone()),
            Self::SetpointStatus => SensorValue::Text(zone.setpoint_status.clone()),
        })
    }
}

/// Readings available on a Room IQ sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomIqReading {
    Weight,
    Temperature,
    Humidity,
    BatteryLevel,
}

impl RoomIqReading {
    pub fn accessor_name(self) -> &'static str {
        match self {
            Self::Weight => "get_weight",
            Self::Temperature => "get_temperature",
            Self::Humidity => "get_humidity",
            Self::BatteryLevel => "get_battery_level",
        }
    }

    pub fn read(self, iq: &RoomIq) -> Option<SensorValue> {
        Some(match self {
            Self::Weight => SensorValue::Float(iq.weight),
            Self::Temperature => iq.temperature.into(),
            Self::Humidity => SensorValue::Int(iq.humidity),
            Self::BatteryLevel => SensorValue::Int(iq.battery_level),
        })
    }
}

/// Which device a sensor reads from, and what it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Thermostat(ThermostatReading),
    Zone { zone_id: u64, reading: ZoneReading },
    RoomIq { iq_id: u64, reading: RoomIqReading },
}

impl Reading {
    pub fn accessor_name(self) -> &'static str {
        match self {
            Reading::Thermostat(r) => r.accessor_name(),
            Reading::Zone { reading, .. } => reading.accessor_name(),
            Reading::RoomIq { reading, .. } => reading.accessor_name(),
        }
    }

    fn read(self, thermostat: &Thermostat) -> Option<SensorValue> {
        match self {
            Reading::Thermostat(r) => r.read(thermostat),
            Reading::Zone { zone_id, reading } => reading.read(thermostat.zone_by_id(zone_id)?),
            Reading::RoomIq { iq_id, reading } => reading.read(thermostat.room_iq_by_id(iq_id)?),
        }
    }
}

/// Static metadata for a sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorDescription {
    pub translation_key: Option<&'static str>,
    pub device_class: Option<SensorDeviceClass>,
    pub unit: Option<Unit>,
    pub state_class: Option<SensorStateClass>,
    pub transform: Option<fn(SensorValue) -> SensorValue>,
}

impl SensorDescription {
    fn text(translation_key: &'static str) -> Self {
        Self {
            translation_key: Some(translation_key),
            ..Default::default()
        }
    }

    fn percentage(translation_key: Option<&'static str>) -> Self {
        Self {
            translation_key,
            unit: Some(Unit::Percentage),
            state_class: Some(SensorStateClass::Measurement),
            ..Default::default()
        }
    }

    fn temperature(unit: Unit) -> Self {
        Self {
            device_class: Some(SensorDeviceClass::Temperature),
            unit: Some(unit),
            state_class: Some(SensorStateClass::Measurement),
            ..Default::default()
        }
    }

    fn with_transform(self, transform: fn(SensorValue) -> SensorValue) -> Self {
        Self {
            transform: Some(transform),
            ..self
        }
    }

    fn with_device_class(self, device_class: SensorDeviceClass) -> Self {
        Self {
            device_class: Some(device_class),
            ..self
        }
    }
}

/// A sensor entity projecting one reading of the coordinator's snapshot.
pub struct NexiaSensor {
    entity: NexiaEntity,
    reading: Reading,
    description: SensorDescription,
}

impl NexiaSensor {
    pub fn thermostat(
        coordinator: Arc<Coordinator>,
        dispatcher: Dispatcher,
        thermostat: &Thermostat,
        reading: ThermostatReading,
        description: SensorDescription,
    ) -> Self {
        let unique_id = format!("{}_{}", thermostat.id, reading.accessor_name());
        Self {
            entity: NexiaEntity::thermostat(coordinator, dispatcher, thermostat, unique_id),
            reading: Reading::Thermostat(reading),
            description,
        }
    }

    pub fn zone(
        coordinator: Arc<Coordinator>,
        dispatcher: Dispatcher,
        thermostat: &Thermostat,
        zone: &Zone,
        reading: ZoneReading,
        description: SensorDescription,
    ) -> Self {
        let unique_id = format!("{}_{}", zone.id, reading.accessor_name());
        Self {
            entity: NexiaEntity::zone(coordinator, dispatcher, thermostat, zone, unique_id),
            reading: Reading::Zone {
                zone_id: zone.id,
                reading,
            },
            description,
        }
    }

    pub fn room_iq(
        coordinator: Arc<Coordinator>,
        dispatcher: Dispatcher,
        thermostat: &Thermostat,
        iq: &RoomIq,
        reading: RoomIqReading,
        description: SensorDescription,
    ) -> Self {
        let unique_id = format!("{}_{}", iq.id, reading.accessor_name());
        Self {
            entity: NexiaEntity::room_iq(coordinator, dispatcher, thermostat, iq, unique_id),
            reading: Reading::RoomIq {
                iq_id: iq.id,
                reading,
            },
            description,
        }
    }

    pub fn entity(&self) -> &NexiaEntity {
        &self.entity
    }

    pub fn entity_id(&self) -> String {
        format!("sensor.{}", self.entity.unique_id())
    }

    pub fn reading(&self) -> Reading {
        self.reading
    }

    pub fn description(&self) -> &SensorDescription {
        &self.description
    }

    /// Read the value from the current snapshot.
    ///
    /// `None` when the owning device is no longer in the snapshot or the
    /// capability went away.
    pub fn native_value(&self) -> Option<SensorValue> {
        let home = self.entity.coordinator().snapshot();
        let thermostat = home.thermostat_by_id(self.entity.thermostat_id())?;
        let value = self.reading.read(thermostat)?;
        let value = match self.description.transform {
            Some(transform) => transform(value),
            None => value,
        };
        Some(value.rounded())
    }

    /// Current state as reported to the engine.
    pub fn sensor_state(&self) -> SensorState {
        SensorState {
            native_value: self
                .native_value()
                .and_then(|v| serde_json::to_value(v).ok())
                .unwrap_or(serde_json::Value::Null),
            unit_of_measurement: self.description.unit.map(|u| u.to_string()),
            device_class: self.description.device_class.map(|c| c.to_string()),
            state_class: self.description.state_class.map(|c| c.to_string()),
            translation_key: self.description.translation_key.map(str::to_string),
            available: self.entity.available(),
        }
    }
}

impl Entity for NexiaSensor {
    fn unique_id(&self) -> &str {
        self.entity.unique_id()
    }

    fn platform(&self) -> &'static str {
        "sensor"
    }

    fn device_info(&self) -> Option<&DeviceInfo> {
        Some(self.entity.device_info())
    }

    fn available(&self) -> bool {
        self.entity.available()
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::json!({
            "unique_id": self.entity.unique_id(),
            "platform": "sensor",
            "attribution": ATTRIBUTION,
            "state": self.sensor_state(),
        })
    }
}

/// Create every sensor the current snapshot supports.
pub fn setup_sensors(coordinator: &Arc<Coordinator>, dispatcher: &Dispatcher) -> Vec<NexiaSensor> {
    let home: Arc<Home> = coordinator.snapshot();
    let mut sensors = Vec::new();

    for thermostat in &home.thermostats {
        let thermostat_sensor = |reading, description| {
            NexiaSensor::thermostat(
                coordinator.clone(),
                dispatcher.clone(),
                thermostat,
                reading,
                description,
            )
        };

        sensors.push(thermostat_sensor(
            ThermostatReading::SystemStatus,
            SensorDescription::text("system_status"),
        ));
        sensors.push(thermostat_sensor(
            ThermostatReading::AirCleanerMode,
            SensorDescription::text("air_cleaner_mode"),
        ));

        if thermostat.has_variable_speed_compressor() {
            sensors.push(thermostat_sensor(
                ThermostatReading::CurrentCompressorSpeed,
                SensorDescription::percentage(Some("current_compressor_speed"))
                    .with_transform(percent_conv),
            ));
            sensors.push(thermostat_sensor(
                ThermostatReading::RequestedCompressorSpeed,
                SensorDescription::percentage(Some("requested_compressor_speed"))
                    .with_transform(percent_conv),
            ));
        }

        if thermostat.has_outdoor_temperature() {
            sensors.push(thermostat_sensor(
                ThermostatReading::OutdoorTemperature,
                SensorDescription {
                    translation_key: Some("outdoor_temperature"),
                    ..SensorDescription::temperature(temperature_unit(thermostat))
                },
            ));
        }

        if thermostat.has_relative_humidity() {
            sensors.push(thermostat_sensor(
                ThermostatReading::RelativeHumidity,
                SensorDescription::percentage(None)
                    .with_device_class(SensorDeviceClass::Humidity)
                    .with_transform(percent_conv),
            ));
        }

        for zone in &thermostat.zones {
            let zone_sensor = |reading, description| {
                NexiaSensor::zone(
                    coordinator.clone(),
                    dispatcher.clone(),
                    thermostat,
                    zone,
                    reading,
                    description,
                )
            };

            sensors.push(zone_sensor(
                ZoneReading::Temperature,
                SensorDescription::temperature(temperature_unit(thermostat)),
            ));
            sensors.push(zone_sensor(
                ZoneReading::Status,
                SensorDescription::text("zone_status"),
            ));
            sensors.push(zone_sensor(
                ZoneReading::SetpointStatus,
                SensorDescription::text("zone_setpoint_status"),
            ));
        }

        for iq in &thermostat.room_iqs {
            let iq_sensor = |reading, description| {
                NexiaSensor::room_iq(
                    coordinator.clone(),
                    dispatcher.clone(),
                    thermostat,
                    iq,
                    reading,
                    description,
                )
            };

            if iq.weight != 0.0 {
                sensors.push(iq_sensor(
                    RoomIqReading::Weight,
                    SensorDescription::percentage(Some("room_iq_weight"))
                        .with_transform(percent_conv),
                ));
            }

            sensors.push(iq_sensor(
                RoomIqReading::Temperature,
                SensorDescription::temperature(temperature_unit(thermostat)),
            ));

            if iq.humidity != 0 {
                sensors.push(iq_sensor(
                    RoomIqReading::Humidity,
                    SensorDescription::percentage(None)
                        .with_device_class(SensorDeviceClass::Humidity),
                ));
            }

            if iq.battery_level != 0 {
                sensors.push(iq_sensor(
                    RoomIqReading::BatteryLevel,
                    SensorDescription::percentage(Some("room_iq_battery")),
                ));
            }
        }
    }

    sensors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::nexia::model::fixtures;
    use crate::integrations::nexia::source::StaticSource;

    async fn setup(home: Home) -> (Arc<StaticSource>, Arc<Coordinator>, Vec<NexiaSensor>) {
        let source = Arc::new(StaticSource::new(home));
        let coordinator = Arc::new(Coordinator::new(Box::new(source.clone())));
        coordinator.refresh().await.unwrap();
        let sensors = setup_sensors(&coordinator, &Dispatcher::new());
        (source, coordinator, sensors)
    }

    fn find<'a>(sensors: &'a [NexiaSensor], unique_id: &str) -> &'a NexiaSensor {
        sensors
            .iter()
            .find(|s| s.entity().unique_id() == unique_id)
            .unwrap_or_else(|| panic!("no sensor {}", unique_id))
    }

    fn unique_ids(sensors: &[NexiaSensor]) -> Vec<String> {
        sensors
            .iter()
            .map(|s| s.entity().unique_id().to_string())
            .collect()
    }

    #[test]
    fn test_rounding() {
        assert_eq!(SensorValue::Float(72.34).rounded(), SensorValue::Float(72.3));
        assert_eq!(SensorValue::Float(-3.06).rounded(), SensorValue::Float(-3.1));
        // 72.35 is stored just below the midpoint
        assert_eq!(SensorValue::Float(72.35).rounded(), SensorValue::Float(72.3));
        assert_eq!(SensorValue::Float(0.15).rounded(), SensorValue::Float(0.1));
        assert_eq!(SensorValue::Float(21.45).rounded(), SensorValue::Float(21.4));
        // 72.25 is an exact tie and goes to the even digit
        assert_eq!(SensorValue::Float(72.25).rounded(), SensorValue::Float(72.2));
        assert_eq!(SensorValue::Int(72).rounded(), SensorValue::Int(72));
        assert_eq!(
            SensorValue::Text("Cooling".to_string()).rounded(),
            SensorValue::Text("Cooling".to_string())
        );
    }

    #[test]
    fn test_percent_conv() {
        assert_eq!(percent_conv(SensorValue::Float(0.694)), SensorValue::Float(69.4));
        assert_eq!(percent_conv(SensorValue::Float(0.5)), SensorValue::Float(50.0));
        assert_eq!(percent_conv(SensorValue::Int(1)), SensorValue::Float(100.0));
        assert_eq!(percent_conv(SensorValue::Float(0.6925)), SensorValue::Float(69.2));
    }

    #[test]
    fn test_temperature_unit() {
        assert_eq!(temperature_unit(&fixtures::basement()), Unit::Celsius);
        assert_eq!(temperature_unit(&fixtures::downstairs()), Unit::Fahrenheit);

        let mut odd = fixtures::basement();
        odd.unit = "celsius".to_string();
        assert_eq!(temperature_unit(&odd), Unit::Fahrenheit);
        assert_eq!(Unit::Celsius.to_string(), "°C");
    }

    #[tokio::test]
    async fn test_setup_creates_expected_sensors() {
        let (_, _, sensors) = setup(fixtures::home()).await;

        assert_eq!(
            unique_ids(&sensors),
            vec![
                "2059661_get_system_status",
                "2059661_get_air_cleaner_mode",
                "2059661_get_current_compressor_speed",
                "2059661_get_requested_compressor_speed",
                "2059661_get_outdoor_temperature",
                "2059661_get_relative_humidity",
                "83261002_get_temperature",
                "83261002_get_status",
                "83261002_get_setpoint_status",
                "83261005_get_temperature",
                "83261005_get_status",
                "83261005_get_setpoint_status",
                // builtin: weight and humidity, no battery
                "9001_get_weight",
                "9001_get_temperature",
                "9001_get_humidity",
                // remote: battery only
                "9002_get_temperature",
                "9002_get_battery_level",
                "2293892_get_system_status",
                "2293892_get_air_cleaner_mode",
                "83394133_get_temperature",
                "83394133_get_status",
                "83394133_get_setpoint_status",
            ]
        );
    }

    #[tokio::test]
    async fn test_unique_ids_stable_across_setup() {
        let (_, coordinator, first) = setup(fixtures::home()).await;
        let second = setup_sensors(&coordinator, &Dispatcher::new());
        assert_eq!(unique_ids(&first), unique_ids(&second));
    }

    #[tokio::test]
    async fn test_compressor_sensors_follow_capability() {
        let (_, _, sensors) = setup(fixtures::home()).await;
        let compressor_count = |thermostat_id: u64| {
            sensors
                .iter()
                .filter(|s| s.entity().thermostat_id() == thermostat_id)
                .filter(|s| {
                    matches!(
                        s.reading(),
                        Reading::Thermostat(
                            ThermostatReading::CurrentCompressorSpeed
                                | ThermostatReading::RequestedCompressorSpeed
                        )
                    )
                })
                .count()
        };
        assert_eq!(compressor_count(2059661), 2);
        assert_eq!(compressor_count(2293892), 0);
    }

    #[tokio::test]
    async fn test_native_values() {
        let (_, _, sensors) = setup(fixtures::home()).await;

        let status = find(&sensors, "2059661_get_system_status");
        assert_eq!(status.native_value(), Some(SensorValue::Text("Cooling".to_string())));
        assert_eq!(status.description().translation_key, Some("system_status"));

        let requested = find(&sensors, "2059661_get_requested_compressor_speed");
        assert_eq!(requested.native_value(), Some(SensorValue::Float(69.4)));

        let outdoor = find(&sensors, "2059661_get_outdoor_temperature");
        assert_eq!(outdoor.native_value(), Some(SensorValue::Float(88.3)));
        assert_eq!(outdoor.description().unit, Some(Unit::Fahrenheit));

        let humidity = find(&sensors, "2059661_get_relative_humidity");
        assert_eq!(humidity.native_value(), Some(SensorValue::Float(36.0)));
        assert_eq!(
            humidity.description().device_class,
            Some(SensorDeviceClass::Humidity)
        );

        let zone_temp = find(&sensors, "83261002_get_temperature");
        assert_eq!(zone_temp.native_value(), Some(SensorValue::Int(77)));

        let office_temp = find(&sensors, "9002_get_temperature");
        assert_eq!(office_temp.native_value(), Some(SensorValue::Float(75.5)));

        let battery = find(&sensors, "9002_get_battery_level");
        assert_eq!(battery.native_value(), Some(SensorValue::Int(95)));

        let weight = find(&sensors, "9001_get_weight");
        assert_eq!(weight.native_value(), Some(SensorValue::Float(50.0)));

        let basement = find(&sensors, "83394133_get_temperature");
        assert_eq!(basement.native_value(), Some(SensorValue::Float(21.5)));
        assert_eq!(basement.description().unit, Some(Unit::Celsius));
    }

    #[tokio::test]
    async fn test_values_follow_snapshot() {
        let (source, coordinator, sensors) = setup(fixtures::home()).await;
        let status = find(&sensors, "2059661_get_system_status");

        let mut home = fixtures::home();
        home.thermostats[0].system_status = "Heating".to_string();
        home.thermostats[0].zones.clear();
        source.set(home);
        coordinator.refresh().await.unwrap();

        assert_eq!(status.native_value(), Some(SensorValue::Text("Heating".to_string())));
        assert_eq!(find(&sensors, "83261002_get_status").native_value(), None);
    }

    #[tokio::test]
    async fn test_sensor_state_reports_availability() {
        let (source, coordinator, sensors) = setup(fixtures::home()).await;
        let outdoor = find(&sensors, "2059661_get_outdoor_temperature");

        let state = outdoor.sensor_state();
        assert_eq!(state.native_value, serde_json::json!(88.3));
        assert_eq!(state.unit_of_measurement.as_deref(), Some("°F"));
        assert_eq!(state.device_class.as_deref(), Some("temperature"));
        assert_eq!(state.state_class.as_deref(), Some("measurement"));
        assert!(state.available);

        source.fail("timeout");
        let _ = coordinator.refresh().await;
        let state = outdoor.sensor_state();
        assert!(!state.available);
        // Last good snapshot is still shown
        assert_eq!(state.native_value, serde_json::json!(88.3));
    }
}
