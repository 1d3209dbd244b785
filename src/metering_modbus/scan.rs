use std::num::ParseIntError;
use std::time::Duration;
use log::debug;

use super::{MeterSession, RegisterTransport};
use crate::registers::FunctionCode;

pub const DEFAULT_START: u16 = 0x0000;
pub const DEFAULT_END: u16 = 0x0360;
/// Most meter registers carry two decimal places
pub const DEFAULT_DECIMALS: u8 = 2;

/// A register that answered during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanHit {
    pub address: u16,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct ScanRange {
    pub start: u16,
    /// Inclusive
    pub end: u16,
    pub decimals: u8,
    pub function: FunctionCode,
    pub delay: Duration,
}

impl Default for ScanRange {
    fn default() -> Self {
        return ScanRange {
            start: DEFAULT_START,
            end: DEFAULT_END,
            decimals: DEFAULT_DECIMALS,
            function: FunctionCode::ReadHolding,
            delay: Duration::from_millis(10),
        };
    }
}

/// Accepts "0x0130", "0X130" and "130", always hex
pub fn parse_address(s: &str) -> Result<u16, ParseIntError> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    return u16::from_str_radix(digits, 16);
}

/// Probe every address of the range, silent registers are skipped
pub async fn scan_range<T, F>(session: &mut MeterSession<T>, range: &ScanRange, mut on_hit: F) -> Vec<ScanHit>
where
    T: RegisterTransport,
    F: FnMut(&ScanHit),
{
    let mut hits = Vec::new();
    if range.start > range.end {
        return hits;
    }

    for address in range.start..=range.end {
        match session.read_raw(address, range.decimals, range.function).await {
            Ok(value) => {
                let hit = ScanHit { address, value };
                on_hit(&hit);
                hits.push(hit);
            }
            Err(e) => debug!("No answer from 0x{:04x}: {}", address, e),
        }

        if !range.delay.is_zero() {
            tokio::time::sleep(range.delay).await;
        }
    }

    return hits;
}
