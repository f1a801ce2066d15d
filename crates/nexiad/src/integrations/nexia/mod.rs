//! Nexia / Trane / American Standard thermostats.

mod config;
mod coordinator;
mod dispatcher;
mod entity;
mod model;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod nexia;
mod sensor;
mod source;

pub use config::Brand;
pub use config::Config as NexiaConfig;
pub use coordinator::Coordinator;
pub use dispatcher::Dispatcher;
pub use dispatcher::Signal;
pub use dispatcher::SignalKind;
pub use dispatcher::Subscription;
pub use entity::EntityScope;
pub use entity::NexiaEntity;
pub use entity::room_iq_device_info;
pub use entity::thermostat_device_info;
pub use entity::zone_device_info;
pub use model::CompressorSpeed;
pub use model::Home;
pub use model::Measurement;
pub use model::RoomIq;
pub use model::Thermostat;
pub use model::Zone;
pub use nexia::NexiaIntegration;
pub use sensor::NexiaSensor;
pub use sensor::Reading;
pub use sensor::RoomIqReading;
pub use sensor::SensorDescription;
pub use sensor::SensorDeviceClass;
pub use sensor::SensorStateClass;
pub use sensor::SensorValue;
pub use sensor::ThermostatReading;
pub use sensor::Unit;
pub use sensor::ZoneReading;
pub use sensor::percent_conv;
pub use sensor::setup_sensors;
pub use sensor::temperature_unit;
pub use source::HomeSource;
pub use source::HttpSource;
pub use source::SourceError;

use anyhow::Context;
use linkme::distributed_slice;

use crate::engine;

/// Device registry domain
pub const DOMAIN: &str = "nexia";

pub const MANUFACTURER: &str = "Trane";

pub const ATTRIBUTION: &str = "Data provided by Trane Technologies";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_nexia(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let nexia_config = match &ctx.config.integrations.nexia {
        Some(c) if c.enabled => c,
        Some(_) => {
            tracing::info!("Nexia integration is disabled, skipping");
            return Ok(None);
        }
        None => return Ok(None),
    };

    let snapshot_url = reqwest::Url::parse(&nexia_config.snapshot_url)
        .with_context(|| format!("invalid snapshot_url: {}", nexia_config.snapshot_url))?;

    let source = HttpSource::new(nexia_config.root_url(), snapshot_url);
    let coordinator = Coordinator::new(Box::new(source));
    Ok(Some(Box::new(NexiaIntegration::new(
        coordinator,
        nexia_config.poll_interval(),
    ))))
}
