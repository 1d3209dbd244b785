use thiserror::Error;

use super::{NumericFormat, RegisterDescriptor, WordOrder};

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("Decode width mismatch: descriptor wants {expected} words, got {actual}")]
    DecodeWidthMismatch { expected: u8, actual: usize },
}

/// Turn the raw words of one transport read into a measurement value
pub fn decode(raw: &[u16], descriptor: &RegisterDescriptor) -> Result<f64, DecodeError> {
    let mismatch = DecodeError::DecodeWidthMismatch { expected: descriptor.width, actual: raw.len() };
    if raw.len() != descriptor.width as usize {
        return Err(mismatch);
    }

    match descriptor.format {
        NumericFormat::Fixed { decimals, signed } => {
            let v = match (raw, signed) {
                ([w], false) => f64::from(*w),
                ([w], true) => f64::from(*w as i16),
                ([hi, lo], false) => f64::from(u32::from(*hi) << 16 | u32::from(*lo)),
                ([hi, lo], true) => f64::from((u32::from(*hi) << 16 | u32::from(*lo)) as i32),
                _ => return Err(mismatch),
            };
            return Ok(v / 10f64.powi(i32::from(decimals)));
        }
        NumericFormat::Float32 { word_order } => {
            let (hi, lo) = match (raw, word_order) {
                ([a, b], WordOrder::HighFirst) => (*a, *b),
                ([a, b], WordOrder::LowFirst) => (*b, *a),
                _ => return Err(mismatch),
            };
            let bits = u32::from(hi) << 16 | u32::from(lo);
            return Ok(f64::from(f32::from_bits(bits)));
        }
    }
}

/// Inverse of the float rule, mainly useful for simulated meters
pub fn encode_f32(value: f32, word_order: WordOrder) -> [u16; 2] {
    let bits = value.to_bits();
    let hi = (bits >> 16) as u16;
    let lo = (bits & 0xFFFF) as u16;
    match word_order {
        WordOrder::HighFirst => [hi, lo],
        WordOrder::LowFirst => [lo, hi],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::FunctionCode;

    fn fixed(width: u8, decimals: u8, signed: bool) -> RegisterDescriptor {
        RegisterDescriptor {
            address: 0,
            width,
            format: NumericFormat::Fixed { decimals, signed },
            function: FunctionCode::ReadHolding,
            unit: "",
        }
    }

    fn float(word_order: WordOrder) -> RegisterDescriptor {
        RegisterDescriptor {
            address: 0,
            width: 2,
            format: NumericFormat::Float32 { word_order },
            function: FunctionCode::ReadHolding,
            unit: "",
        }
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(decode(&[22015], &fixed(1, 2, false)), Ok(220.15));
        assert_eq!(decode(&[2500], &fixed(1, 3, false)), Ok(2.5));
        assert_eq!(decode(&[42], &fixed(1, 0, false)), Ok(42.0));
    }

    #[test]
    fn test_fixed_point_signed() {
        assert_eq!(decode(&[0xFFFF], &fixed(1, 0, false)), Ok(65535.0));
        assert_eq!(decode(&[0xFF9C], &fixed(1, 1, true)), Ok(-10.0));
    }

    #[test]
    fn test_fixed_point_two_words() {
        /* 0x0001_86A0 = 100000 */
        assert_eq!(decode(&[0x0001, 0x86A0], &fixed(2, 2, false)), Ok(1000.0));
        assert_eq!(decode(&[0xFFFF, 0xFFFE], &fixed(2, 0, true)), Ok(-2.0));
    }

    #[test]
    fn test_float32() {
        assert_eq!(decode(&[0x4348, 0x8000], &float(WordOrder::HighFirst)), Ok(200.5));
        assert_eq!(decode(&[0x4348, 0x0000], &float(WordOrder::HighFirst)), Ok(200.0));
        assert_eq!(decode(&[0x8000, 0x4348], &float(WordOrder::LowFirst)), Ok(200.5));
    }

    #[test]
    fn test_float32_encode() {
        assert_eq!(encode_f32(200.5, WordOrder::HighFirst), [0x4348, 0x8000]);
        assert_eq!(encode_f32(200.5, WordOrder::LowFirst), [0x8000, 0x4348]);

        let words = encode_f32(49.98, WordOrder::HighFirst);
        assert_eq!(decode(&words, &float(WordOrder::HighFirst)), Ok(f64::from(49.98f32)));
    }

    #[test]
    fn test_width_mismatch() {
        assert_eq!(
            decode(&[1, 2], &fixed(1, 2, false)),
            Err(DecodeError::DecodeWidthMismatch { expected: 1, actual: 2 })
        );
        assert_eq!(
            decode(&[0x4348], &float(WordOrder::HighFirst)),
            Err(DecodeError::DecodeWidthMismatch { expected: 2, actual: 1 })
        );
        assert!(decode(&[], &fixed(1, 2, false)).is_err());
    }

    #[test]
    fn test_float_descriptor_with_bad_width() {
        let mut desc = float(WordOrder::HighFirst);
        desc.width = 1;
        assert_eq!(
            decode(&[0x4348], &desc),
            Err(DecodeError::DecodeWidthMismatch { expected: 1, actual: 1 })
        );
    }
}
