use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;


/// Supported meter hardware, chosen once per session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MeterModel {
    /// ORNO OR-WE-514, single phase with fixed point registers
    #[serde(rename = "WE514")]
    OrnoWe514,
    /// ORNO OR-WE-517, three phase with float registers
    #[serde(rename = "WE517")]
    OrnoWe517,
    /// Eastron SDM72D-M v2, three phase, input registers only
    #[serde(rename = "SDM72DV2")]
    EastronSdm72dV2,
}

impl MeterModel {
    pub const ALL: [MeterModel; 3] = [MeterModel::OrnoWe514, MeterModel::OrnoWe517, MeterModel::EastronSdm72dV2];

    pub fn selector(&self) -> &'static str {
        match self {
            MeterModel::OrnoWe514 => "WE514",
            MeterModel::OrnoWe517 => "WE517",
            MeterModel::EastronSdm72dV2 => "SDM72DV2",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MeterModel::OrnoWe514 => "ORNO OR-WE-514 single phase meter",
            MeterModel::OrnoWe517 => "ORNO OR-WE-517 three phase meter",
            MeterModel::EastronSdm72dV2 => "Eastron SDM72D-M v2 three phase meter",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown meter model {0}, use one of WE514, WE517, SDM72DV2")]
pub struct UnknownModel(pub String);

impl FromStr for MeterModel {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WE514" | "OR-WE-514" => Ok(MeterModel::OrnoWe514),
            "WE517" | "OR-WE-517" => Ok(MeterModel::OrnoWe517),
            "SDM72DV2" | "SDM72D-M-V2" => Ok(MeterModel::EastronSdm72dV2),
            _ => Err(UnknownModel(s.to_string())),
        }
    }
}

impl Default for MeterModel {
    fn default() -> Self {
        return MeterModel::OrnoWe514;
    }
}

impl fmt::Display for MeterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

/* The names double as MQTT topic suffixes, never change them */
macro_rules! measurements {
    ($( $variant:ident => $name:literal, $label:literal; )*) => {
        /// Model independent name of a physical quantity
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MeasurementId {
            $( $variant, )*
        }

        impl MeasurementId {
            pub const ALL: &'static [MeasurementId] = &[ $( MeasurementId::$variant, )* ];

            pub fn from_name(s: &str) -> Option<Self> {
                match s {
                    $( $name => Some(MeasurementId::$variant), )*
                    _ => None,
                }
            }

            /// Topic suffix and key in published data
            pub fn name(&self) -> &'static str {
                match self {
                    $( MeasurementId::$variant => $name, )*
                }
            }

            /// Human readable label for console output
            pub fn label(&self) -> &'static str {
                match self {
                    $( MeasurementId::$variant => $label, )*
                }
            }
        }
    };
}

measurements! {
    L1Voltage => "L1_Voltage", "L1 Voltage";
    L2Voltage => "L2_Voltage", "L2 Voltage";
    L3Voltage => "L3_Voltage", "L3 Voltage";
    L1Frequency => "L1_Frequency", "L1 Frequency";
    GridFrequency => "GridFrequency", "Grid Frequency";
    L1Current => "L1_Current", "L1 Current";
    L2Current => "L2_Current", "L2 Current";
    L3Current => "L3_Current", "L3 Current";
    L1Power => "L1_Power", "L1 Power";
    TotalActivePower => "TotalActivePower", "Total Active Power";
    L1ActivePower => "L1_ActivePower", "L1 Active Power";
    L2ActivePower => "L2_ActivePower", "L2 Active Power";
    L3ActivePower => "L3_ActivePower", "L3 Active Power";
    TotalReactivePower => "TotalReactivePower", "Total Reactive Power";
    L1ReactivePower => "L1_ReactivePower", "L1 Reactive Power";
    L2ReactivePower => "L2_ReactivePower", "L2 Reactive Power";
    L3ReactivePower => "L3_ReactivePower", "L3 Reactive Power";
    TotalApparentPower => "TotalApparentPower", "Total Apparent Power";
    L1ApparentPower => "L1_ApparentPower", "L1 Apparent Power";
    L2ApparentPower => "L2_ApparentPower", "L2 Apparent Power";
    L3ApparentPower => "L3_ApparentPower", "L3 Apparent Power";
    TotalPF => "TotalPF", "Total Power Factor";
    L1PF => "L1_PF", "L1 Power Factor";
    L2PF => "L2_PF", "L2 Power Factor";
    L3PF => "L3_PF", "L3 Power Factor";
    TotalPower => "TotalPower", "Total Power";
    TotalActiveEnergy => "TotalActiveEnergy", "Total Active Energy";
    L1ActiveEnergy => "L1_ActiveEnergy", "L1 Active Energy";
    L2ActiveEnergy => "L2_ActiveEnergy", "L2 Active Energy";
    L3ActiveEnergy => "L3_ActiveEnergy", "L3 Active Energy";
    ForwardActiveEnergy => "ForwardActiveEnergy", "Forward Active Energy";
    L1ForwardActiveEnergy => "L1_ForwardActiveEnergy", "L1 Forward Active Energy";
    L2ForwardActiveEnergy => "L2_ForwardActiveEnergy", "L2 Forward Active Energy";
    L3ForwardActiveEnergy => "L3_ForwardActiveEnergy", "L3 Forward Active Energy";
    ReverseActiveEnergy => "ReverseActiveEnergy", "Reverse Active Energy";
    L1ReverseActiveEnergy => "L1_ReverseActiveEnergy", "L1 Reverse Active Energy";
    L2ReverseActiveEnergy => "L2_ReverseActiveEnergy", "L2 Reverse Active Energy";
    L3ReverseActiveEnergy => "L3_ReverseActiveEnergy", "L3 Reverse Active Energy";
    TotalReactiveEnergy => "TotalReactiveEnergy", "Total Reactive Energy";
    L1ReactiveEnergy => "L1_ReactiveEnergy", "L1 Reactive Energy";
    L2ReactiveEnergy => "L2_ReactiveEnergy", "L2 Reactive Energy";
    L3ReactiveEnergy => "L3_ReactiveEnergy", "L3 Reactive Energy";
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
