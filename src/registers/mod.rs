use lazy_static::lazy_static;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{MeasurementId, MeterModel};

pub mod decoder;
pub mod meter_definitions;

/// Modbus function used to read a register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    ReadHolding = 3,
    ReadInput = 4,
}

impl FunctionCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            3 => Some(FunctionCode::ReadHolding),
            4 => Some(FunctionCode::ReadInput),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        return *self as u8;
    }
}

/// Sequence of the two 16 bit words forming a 32 bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    HighFirst = 0,
    LowFirst = 1,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericFormat {
    /// Integer scaled by 10^decimals
    Fixed { decimals: u8, signed: bool },
    /// IEEE-754 binary32 spread over two words
    Float32 { word_order: WordOrder },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterDescriptor {
    pub address: u16,
    pub width: u8,
    pub format: NumericFormat,
    pub function: FunctionCode,
    pub unit: &'static str,
}

/// Value computed from two other measurements of the same cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub id: MeasurementId,
    pub factors: (MeasurementId, MeasurementId),
    pub unit: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    Register(&'a RegisterDescriptor),
    Absent,
}

#[derive(Error, Debug, PartialEq)]
pub enum CatalogError {
    #[error("Unknown measurement {0}")]
    UnknownMeasurement(String),
}

struct ModelTable {
    registers: Vec<(MeasurementId, RegisterDescriptor)>,
    derivations: Vec<Derivation>,
}

pub struct RegisterCatalog {
    models: HashMap<MeterModel, ModelTable>,
}

impl RegisterCatalog {
    /// Build the catalog from the compiled in meter definitions
    pub fn builtin() -> Self {
        let mut models = HashMap::new();
        for model in MeterModel::ALL {
            let mut registers = meter_definitions::registers_for(model);
            /* Keep the enumeration stable no matter how a table is written down */
            registers.sort_by_key(|(id, _)| *id);
            models.insert(model, ModelTable {
                registers,
                derivations: meter_definitions::derivations_for(model),
            });
        }

        return RegisterCatalog { models };
    }

    pub fn lookup(&self, model: MeterModel, id: MeasurementId) -> Lookup<'_> {
        let table = match self.models.get(&model) {
            Some(t) => t,
            None => return Lookup::Absent,
        };

        match table.registers.iter().find(|(reg_id, _)| *reg_id == id) {
            Some((_, desc)) => Lookup::Register(desc),
            None => Lookup::Absent,
        }
    }

    pub fn lookup_name(&self, model: MeterModel, name: &str) -> Result<Lookup<'_>, CatalogError> {
        let id = MeasurementId::from_name(name)
            .ok_or_else(|| CatalogError::UnknownMeasurement(name.to_string()))?;
        return Ok(self.lookup(model, id));
    }

    /// All register backed measurements of a model in id order
    pub fn measurements(&self, model: MeterModel) -> impl Iterator<Item = &(MeasurementId, RegisterDescriptor)> + '_ {
        self.models.get(&model).into_iter().flat_map(|t| t.registers.iter())
    }

    pub fn derivations(&self, model: MeterModel) -> &[Derivation] {
        match self.models.get(&model) {
            Some(t) => &t.derivations,
            None => &[],
        }
    }

    pub fn derivation(&self, model: MeterModel, id: MeasurementId) -> Option<&Derivation> {
        self.derivations(model).iter().find(|d| d.id == id)
    }

    /// Unit for console output, derived values included
    pub fn unit(&self, model: MeterModel, id: MeasurementId) -> &'static str {
        if let Lookup::Register(desc) = self.lookup(model, id) {
            return desc.unit;
        }
        match self.derivation(model, id) {
            Some(d) => d.unit,
            None => "",
        }
    }

    /// Number of topics a model publishes per cycle
    pub fn published_count(&self, model: MeterModel) -> usize {
        return self.measurements(model).count() + self.derivations(model).len();
    }
}

lazy_static! {
    pub static ref CATALOG: RegisterCatalog = RegisterCatalog::builtin();
}
