//! Modbus energy meter poller
//!
//! Reads the registers of ORNO WE-514, ORNO WE-517 and Eastron SDM72D-M v2 meters,
//! decodes them through a per model register catalog and publishes every
//! measurement to an MQTT broker.

pub mod config;
pub mod models;
pub mod registers;
pub mod metering_modbus;
pub mod mqtt;
pub mod poller;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export common types for easier access
pub use config::{Config, ConfigError};
pub use models::{MeasurementId, MeterModel};
pub use registers::{RegisterCatalog, CATALOG};
pub use metering_modbus::{MeasurementSet, MeterError, MeterSession};
pub use mqtt::{ConnectionState, PublishChannel, PublishError};
pub use poller::{CycleReport, Poller};
