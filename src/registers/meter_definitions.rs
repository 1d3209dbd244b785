use super::{Derivation, FunctionCode, NumericFormat, RegisterDescriptor, WordOrder};
use crate::models::{MeasurementId, MeasurementId::*, MeterModel};

fn fixed(address: u16, decimals: u8, unit: &'static str) -> RegisterDescriptor {
    return RegisterDescriptor {
        address,
        width: 1,
        format: NumericFormat::Fixed { decimals, signed: false },
        function: FunctionCode::ReadHolding,
        unit,
    };
}

fn float(address: u16, function: FunctionCode, unit: &'static str) -> RegisterDescriptor {
    return RegisterDescriptor {
        address,
        width: 2,
        format: NumericFormat::Float32 { word_order: WordOrder::HighFirst },
        function,
        unit,
    };
}

pub fn registers_for(model: MeterModel) -> Vec<(MeasurementId, RegisterDescriptor)> {
    match model {
        MeterModel::OrnoWe514 => get_we514_registers(),
        MeterModel::OrnoWe517 => get_we517_registers(),
        MeterModel::EastronSdm72dV2 => get_sdm72dv2_registers(),
    }
}

pub fn derivations_for(model: MeterModel) -> Vec<Derivation> {
    match model {
        /* The WE-514 exposes no plain real power, build it from U * I */
        MeterModel::OrnoWe514 => vec![Derivation {
            id: L1Power,
            factors: (L1Voltage, L1Current),
            unit: "W",
        }],
        MeterModel::OrnoWe517 | MeterModel::EastronSdm72dV2 => Vec::new(),
    }
}

// ORNO OR-WE-514, one register per value, holding registers
fn get_we514_registers() -> Vec<(MeasurementId, RegisterDescriptor)> {
    return vec![
        (L1Frequency, fixed(304, 2, "Hz")),
        (L1Voltage, fixed(305, 2, "V")),
        (L1Current, fixed(314, 3, "A")),
        (L1ActivePower, fixed(321, 3, "kW")),
        (L1ReactivePower, fixed(329, 3, "kvar")),
        (L1ApparentPower, fixed(337, 3, "kVA")),
        (L1PF, fixed(344, 3, "")),
        (TotalPower, fixed(40961, 2, "kWh")),
    ];
}

// ORNO OR-WE-517, floats in holding registers
fn get_we517_registers() -> Vec<(MeasurementId, RegisterDescriptor)> {
    let h = FunctionCode::ReadHolding;
    return vec![
        (L1Voltage, float(0x000E, h, "V")),
        (L2Voltage, float(0x0010, h, "V")),
        (L3Voltage, float(0x0012, h, "V")),
        (GridFrequency, float(0x0014, h, "Hz")),
        (L1Frequency, float(0x0014, h, "Hz")),
        (L1Current, float(0x0016, h, "A")),
        (L2Current, float(0x0018, h, "A")),
        (L3Current, float(0x001A, h, "A")),
        (TotalActivePower, float(0x001C, h, "kW")),
        (L1ActivePower, float(0x001E, h, "kW")),
        (L2ActivePower, float(0x0020, h, "kW")),
        (L3ActivePower, float(0x0022, h, "kW")),
        (TotalReactivePower, float(0x0024, h, "kvar")),
        (L1ReactivePower, float(0x0026, h, "kvar")),
        (L2ReactivePower, float(0x0028, h, "kvar")),
        (L3ReactivePower, float(0x002A, h, "kvar")),
        (TotalApparentPower, float(0x002C, h, "kVA")),
        (L1ApparentPower, float(0x002E, h, "kVA")),
        (L2ApparentPower, float(0x0030, h, "kVA")),
        (L3ApparentPower, float(0x0032, h, "kVA")),
        (TotalPF, float(0x0034, h, "")),
        (L1PF, float(0x0036, h, "")),
        (L2PF, float(0x0038, h, "")),
        (L3PF, float(0x003A, h, "")),
        (TotalActiveEnergy, float(0x0100, h, "kWh")),
        (L1ActiveEnergy, float(0x0102, h, "kWh")),
        (L2ActiveEnergy, float(0x0104, h, "kWh")),
        (L3ActiveEnergy, float(0x0106, h, "kWh")),
        (ForwardActiveEnergy, float(0x0108, h, "kWh")),
        (L1ForwardActiveEnergy, float(0x010A, h, "kWh")),
        (L2ForwardActiveEnergy, float(0x010C, h, "kWh")),
        (L3ForwardActiveEnergy, float(0x010E, h, "kWh")),
        (ReverseActiveEnergy, float(0x0110, h, "kWh")),
        (L1ReverseActiveEnergy, float(0x0112, h, "kWh")),
        (L2ReverseActiveEnergy, float(0x0114, h, "kWh")),
        (L3ReverseActiveEnergy, float(0x0116, h, "kWh")),
        (TotalReactiveEnergy, float(0x0118, h, "kvarh")),
        (L1ReactiveEnergy, float(0x011A, h, "kvarh")),
        (L2ReactiveEnergy, float(0x011C, h, "kvarh")),
        (L3ReactiveEnergy, float(0x011E, h, "kvarh")),
    ];
}

// Eastron SDM72D-M v2, answers on input registers only
fn get_sdm72dv2_registers() -> Vec<(MeasurementId, RegisterDescriptor)> {
    let i = FunctionCode::ReadInput;
    return vec![
        (L1Voltage, float(0x0000, i, "V")),
        (L2Voltage, float(0x0002, i, "V")),
        (L3Voltage, float(0x0004, i, "V")),
        (L1Current, float(0x0006, i, "A")),
        (L2Current, float(0x0008, i, "A")),
        (L3Current, float(0x000A, i, "A")),
        (L1ActivePower, float(0x000C, i, "W")),
        (L2ActivePower, float(0x000E, i, "W")),
        (L3ActivePower, float(0x0010, i, "W")),
        (L1ApparentPower, float(0x0012, i, "VA")),
        (L2ApparentPower, float(0x0014, i, "VA")),
        (L3ApparentPower, float(0x0016, i, "VA")),
        (L1ReactivePower, float(0x0018, i, "var")),
        (L2ReactivePower, float(0x001A, i, "var")),
        (L3ReactivePower, float(0x001C, i, "var")),
        (L1PF, float(0x001E, i, "")),
        (L2PF, float(0x0020, i, "")),
        (L3PF, float(0x0022, i, "")),
        (TotalActivePower, float(0x0034, i, "W")),
        (TotalApparentPower, float(0x0038, i, "VA")),
        (TotalReactivePower, float(0x003C, i, "var")),
        (TotalPF, float(0x003E, i, "")),
        (GridFrequency, float(0x0046, i, "Hz")),
        (ForwardActiveEnergy, float(0x0048, i, "kWh")),
        (ReverseActiveEnergy, float(0x004A, i, "kWh")),
        (TotalActiveEnergy, float(0x0156, i, "kWh")),
        (TotalReactiveEnergy, float(0x0158, i, "kvarh")),
    ];
}
