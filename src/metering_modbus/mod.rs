use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Local, Utc};
use log::{debug, warn};
use thiserror::Error;

use crate::models::{MeasurementId, MeterModel};
use crate::registers::{decoder::{self, DecodeError}, CatalogError, FunctionCode, Lookup, NumericFormat, RegisterCatalog, RegisterDescriptor, CATALOG};
pub use transport::{RegisterTransport, TransportError};

pub mod transport;
pub mod scan;
#[cfg(feature = "rtu")]
pub mod rtu;

#[derive(Error, Debug, PartialEq)]
pub enum MeterError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{id} is not available on a {model}")]
    Unsupported { model: MeterModel, id: MeasurementId },
}

/// Decoded values of one poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSet {
    model: MeterModel,
    taken_at: DateTime<Utc>,
    values: BTreeMap<MeasurementId, f64>,
}

impl MeasurementSet {
    pub fn new(model: MeterModel, values: BTreeMap<MeasurementId, f64>) -> Self {
        return MeasurementSet {
            model,
            taken_at: Utc::now(),
            values,
        };
    }

    pub fn model(&self) -> MeterModel {
        return self.model;
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        return self.taken_at;
    }

    pub fn get(&self, id: MeasurementId) -> Option<f64> {
        return self.values.get(&id).copied();
    }

    pub fn contains(&self, id: MeasurementId) -> bool {
        return self.values.contains_key(&id);
    }

    pub fn len(&self) -> usize {
        return self.values.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.values.is_empty();
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeasurementId, f64)> + '_ {
        self.values.iter().map(|(id, v)| (*id, *v))
    }
}

/* Same layout as the readout the meters show on their own display */
impl fmt::Display for MeasurementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let taken_at = self.taken_at.with_timezone(&Local);
        writeln!(f, "{} -- {}", taken_at.format("%d/%m/%Y %H:%M:%S"), self.model.description())?;
        for (id, value) in self.iter() {
            let unit = CATALOG.unit(self.model, id);
            writeln!(f, "{:<26} {:>12.3} {}", id.label(), value, unit)?;
        }
        return Ok(());
    }
}

/// Exclusive owner of one bus handle for one meter
pub struct MeterSession<T: RegisterTransport> {
    model: MeterModel,
    transport: T,
    catalog: &'static RegisterCatalog,
}

impl<T: RegisterTransport> MeterSession<T> {
    pub fn new(model: MeterModel, transport: T) -> Self {
        return MeterSession {
            model,
            transport,
            catalog: &CATALOG,
        };
    }

    pub fn model(&self) -> MeterModel {
        return self.model;
    }

    pub fn into_transport(self) -> T {
        return self.transport;
    }

    async fn read_descriptor(&mut self, desc: &RegisterDescriptor) -> Result<f64, MeterError> {
        let raw = self.transport.read_words(desc.address, u16::from(desc.width), desc.function).await?;
        return Ok(decoder::decode(&raw, desc)?);
    }

    async fn read_register(&mut self, id: MeasurementId) -> Result<f64, MeterError> {
        let catalog = self.catalog;
        match catalog.lookup(self.model, id) {
            Lookup::Register(desc) => self.read_descriptor(desc).await,
            Lookup::Absent => Err(MeterError::Unsupported { model: self.model, id }),
        }
    }

    pub async fn read_one(&mut self, id: MeasurementId) -> Result<f64, MeterError> {
        let catalog = self.catalog;
        let derivation = match catalog.derivation(self.model, id) {
            Some(d) => d,
            None => return self.read_register(id).await,
        };

        let (a, b) = derivation.factors;
        let a = self.read_register(a).await?;
        let b = self.read_register(b).await?;
        return Ok(a * b);
    }

    pub async fn read_one_by_name(&mut self, name: &str) -> Result<f64, MeterError> {
        let id = MeasurementId::from_name(name)
            .ok_or_else(|| CatalogError::UnknownMeasurement(name.to_string()))?;
        return self.read_one(id).await;
    }

    /// Read every measurement of the model, failing registers are left out
    pub async fn read_measurement_set(&mut self) -> MeasurementSet {
        let catalog = self.catalog;
        let mut values = BTreeMap::new();

        for (id, desc) in catalog.measurements(self.model) {
            match self.read_descriptor(desc).await {
                Ok(v) => {
                    debug!("{} @0x{:04x} = {}", id, desc.address, v);
                    values.insert(*id, v);
                }
                Err(e) => {
                    warn!("Reading {} from 0x{:04x} failed, skipping it this cycle: {}", id, desc.address, e);
                }
            }
        }

        for derivation in catalog.derivations(self.model) {
            let (a, b) = derivation.factors;
            match (values.get(&a), values.get(&b)) {
                (Some(x), Some(y)) => {
                    let v = x * y;
                    values.insert(derivation.id, v);
                }
                _ => debug!("Not deriving {}, inputs missing", derivation.id),
            }
        }

        return MeasurementSet::new(self.model, values);
    }

    /// Single fixed point register, used when probing unknown meters
    pub async fn read_raw(&mut self, address: u16, decimals: u8, function: FunctionCode) -> Result<f64, MeterError> {
        let desc = RegisterDescriptor {
            address,
            width: 1,
            format: NumericFormat::Fixed { decimals, signed: false },
            function,
            unit: "",
        };
        return self.read_descriptor(&desc).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;

    fn we514_transport() -> FakeTransport {
        let mut t = FakeTransport::new();
        t.set_word(304, 5001);
        t.set_word(305, 23000);
        t.set_word(314, 2500);
        t.set_word(321, 570);
        t.set_word(329, 12);
        t.set_word(337, 580);
        t.set_word(344, 990);
        t.set_word(40961, 57920);
        return t;
    }

    #[tokio::test]
    async fn test_we514_full_set() {
        let mut session = MeterSession::new(MeterModel::OrnoWe514, we514_transport());
        let set = session.read_measurement_set().await;

        assert_eq!(set.len(), 9);
        assert_eq!(set.get(MeasurementId::L1Voltage), Some(230.0));
        assert_eq!(set.get(MeasurementId::L1Current), Some(2.5));
        assert_eq!(set.get(MeasurementId::L1Power), Some(575.0));
        assert_eq!(set.get(MeasurementId::L1Frequency), Some(50.01));
        /* device reported power stays next to the derived one */
        assert_eq!(set.get(MeasurementId::L1ActivePower), Some(0.57));
    }

    #[tokio::test]
    async fn test_failed_current_drops_derived_power() {
        let mut transport = we514_transport();
        transport.fail_at(314);
        let mut session = MeterSession::new(MeterModel::OrnoWe514, transport);
        let set = session.read_measurement_set().await;

        assert_eq!(set.get(MeasurementId::L1Voltage), Some(230.0));
        assert!(!set.contains(MeasurementId::L1Current));
        assert!(!set.contains(MeasurementId::L1Power));
        assert_eq!(set.len(), 7);
    }

    #[tokio::test]
    async fn test_one_bad_register_does_not_stop_the_cycle() {
        let mut transport = we514_transport();
        transport.fail_at(304);
        let mut session = MeterSession::new(MeterModel::OrnoWe514, transport);
        let set = session.read_measurement_set().await;

        assert!(!set.contains(MeasurementId::L1Frequency));
        assert!(set.contains(MeasurementId::TotalPower));
        assert!(set.contains(MeasurementId::L1PF));

        /* every register was still requested */
        let transport = session.into_transport();
        assert_eq!(transport.requests().len(), 8);
    }

    #[tokio::test]
    async fn test_we517_uses_float_pairs() {
        let mut transport = FakeTransport::new();
        transport.fill_model(MeterModel::OrnoWe517, 1.5);
        transport.set_float(0x000E, 231.25);
        let mut session = MeterSession::new(MeterModel::OrnoWe517, transport);
        let set = session.read_measurement_set().await;

        assert_eq!(set.len(), 40);
        assert_eq!(set.get(MeasurementId::L1Voltage), Some(231.25));
        assert_eq!(set.get(MeasurementId::GridFrequency), set.get(MeasurementId::L1Frequency));
        assert!(!set.contains(MeasurementId::L1Power));

        let transport = session.into_transport();
        assert!(transport.requests().iter().all(|(_, count, f)| *count == 2 && *f == FunctionCode::ReadHolding));
    }

    #[tokio::test]
    async fn test_sdm_reads_input_registers() {
        let mut transport = FakeTransport::new();
        transport.fill_model(MeterModel::EastronSdm72dV2, 10.0);
        let mut session = MeterSession::new(MeterModel::EastronSdm72dV2, transport);
        let set = session.read_measurement_set().await;

        assert_eq!(set.len(), 27);
        let transport = session.into_transport();
        assert!(transport.requests().iter().all(|(_, _, f)| *f == FunctionCode::ReadInput));
    }

    #[tokio::test]
    async fn test_read_one() {
        let mut session = MeterSession::new(MeterModel::OrnoWe514, we514_transport());
        assert_eq!(session.read_one(MeasurementId::L1Voltage).await, Ok(230.0));
        assert_eq!(session.read_one(MeasurementId::L1Power).await, Ok(575.0));
        assert_eq!(
            session.read_one(MeasurementId::L3Voltage).await,
            Err(MeterError::Unsupported { model: MeterModel::OrnoWe514, id: MeasurementId::L3Voltage })
        );
    }

    #[tokio::test]
    async fn test_read_one_by_name() {
        let mut session = MeterSession::new(MeterModel::OrnoWe514, we514_transport());
        assert_eq!(session.read_one_by_name("L1_Current").await, Ok(2.5));
        assert_eq!(
            session.read_one_by_name("L1_Strom").await,
            Err(MeterError::Catalog(CatalogError::UnknownMeasurement("L1_Strom".to_string())))
        );
    }

    #[tokio::test]
    async fn test_read_one_transport_error() {
        let mut transport = we514_transport();
        transport.fail_at(305);
        let mut session = MeterSession::new(MeterModel::OrnoWe514, transport);
        assert_eq!(session.read_one(MeasurementId::L1Voltage).await, Err(MeterError::Transport(TransportError::Timeout)));
        assert!(session.read_one(MeasurementId::L1Power).await.is_err());
    }

    #[tokio::test]
    async fn test_width_mismatch_is_skipped() {
        let mut transport = we514_transport();
        transport.short_answer_at(305);
        let mut session = MeterSession::new(MeterModel::OrnoWe514, transport);
        assert!(matches!(
            session.read_one(MeasurementId::L1Voltage).await,
            Err(MeterError::Decode(DecodeError::DecodeWidthMismatch { .. }))
        ));

        let set = session.read_measurement_set().await;
        assert!(!set.contains(MeasurementId::L1Voltage));
        assert!(set.contains(MeasurementId::L1Current));
    }

    #[tokio::test]
    async fn test_read_raw() {
        let mut session = MeterSession::new(MeterModel::OrnoWe514, we514_transport());
        assert_eq!(session.read_raw(305, 1, FunctionCode::ReadHolding).await, Ok(2300.0));
        assert!(session.read_raw(0x0001, 2, FunctionCode::ReadHolding).await.is_err());
    }

    #[tokio::test]
    async fn test_display_lists_units() {
        let mut session = MeterSession::new(MeterModel::OrnoWe514, we514_transport());
        let set = session.read_measurement_set().await;
        let text = set.to_string();
        assert!(text.contains("L1 Voltage"));
        assert!(text.contains("230.000 V"));
        assert!(text.contains("575.000 W"));
        /* header with the capture time, then one line per value */
        assert_eq!(text.lines().count(), 10);
        let stamp = set.taken_at().with_timezone(&Local).format("%d/%m/%Y %H:%M:%S").to_string();
        assert_eq!(text.lines().next(), Some(format!("{} -- ORNO OR-WE-514 single phase meter", stamp).as_str()));
        assert!(matches!(CATALOG.lookup(MeterModel::OrnoWe514, MeasurementId::L1Power), Lookup::Absent));
    }
}
