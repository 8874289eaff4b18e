//! Scalar wire primitives
//!
//! Obfuscated 32-bit headers and IEEE-754 half-precision floats.

/// Obfuscate a header value: `(value + sub) ^ xor`, wrapping.
#[inline]
pub fn encode_header(value: u32, xor: u32, sub: u32) -> u32 {
    value.wrapping_add(sub) ^ xor
}

/// Inverse of [`encode_header`]: `(wire ^ xor) - sub`, wrapping.
#[inline]
pub fn decode_header(wire: u32, xor: u32, sub: u32) -> u32 {
    (wire ^ xor).wrapping_sub(sub)
}

/// A named pair of header obfuscation constants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObfuscationKey {
    pub xor: u32,
    pub sub: u32,
}

impl ObfuscationKey {
    pub const fn new(xor: u32, sub: u32) -> Self {
        Self { xor, sub }
    }

    #[inline]
    pub fn encode(&self, value: u32) -> u32 {
        encode_header(value, self.xor, self.sub)
    }

    #[inline]
    pub fn decode(&self, wire: u32) -> u32 {
        decode_header(wire, self.xor, self.sub)
    }
}

const F32_EXP_MASK: u32 = 0x7f80_0000;
const F32_MAN_MASK: u32 = 0x007f_ffff;
const HALF_INF: u16 = 0x7c00;
const HALF_QUIET: u16 = 0x0200;

/// Narrow an `f32` to binary16 bits, rounding to nearest even.
///
/// Values above the half range become infinity, values below half the
/// smallest subnormal become zero. NaN stays NaN (quiet).
pub fn encode_half(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits & F32_EXP_MASK) >> 23) as i32;
    let man = bits & F32_MAN_MASK;

    if exp == 0xff {
        if man == 0 {
            return sign | HALF_INF;
        }
        return sign | HALF_INF | HALF_QUIET | (man >> 13) as u16;
    }

    let half_exp = exp - 127 + 15;

    if half_exp >= 0x1f {
        return sign | HALF_INF;
    }

    if half_exp <= 0 {
        if half_exp < -10 {
            return sign;
        }
        // Subnormal: shift the full significand into the 10-bit field
        let full = man | 0x0080_0000;
        let shift = (14 - half_exp) as u32;
        let mut half_man = full >> shift;
        let round = (full >> (shift - 1)) & 1;
        let sticky = full & ((1 << (shift - 1)) - 1);
        if round != 0 && (sticky != 0 || half_man & 1 != 0) {
            half_man += 1;
        }
        return sign | half_man as u16;
    }

    let mut half = ((half_exp as u32) << 10) | (man >> 13);
    let round = (man >> 12) & 1;
    let sticky = man & 0x0fff;
    if round != 0 && (sticky != 0 || half & 1 != 0) {
        // May carry into the exponent, up to infinity
        half += 1;
    }
    sign | half as u16
}

/// Widen binary16 bits to an `f32`. Exact for every input.
pub fn decode_half(half: u16) -> f32 {
    let sign = ((half & 0x8000) as u32) << 16;
    let exp = ((half >> 10) & 0x1f) as u32;
    let man = (half & 0x03ff) as u32;

    match exp {
        0 => {
            // 2^-24 per subnormal step
            let magnitude = man as f32 * f32::from_bits(0x3380_0000);
            if sign != 0 {
                -magnitude
            } else {
                magnitude
            }
        }
        0x1f => f32::from_bits(sign | F32_EXP_MASK | (man << 13)),
        _ => f32::from_bits(sign | ((exp + 112) << 23) | (man << 13)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let keys = [(0u32, 0u32), (0x8BA4, 0xB6), (0xFFFF_FFFF, 1), (0x1234_5678, 0xFFFF_FFFF)];
        let values = [0u32, 1, 3, 4, 0x7FFF_FFFF, 0xFFFF_FFFE, u32::MAX];

        for (xor, sub) in keys {
            for value in values {
                let wire = encode_header(value, xor, sub);
                assert_eq!(decode_header(wire, xor, sub), value);
            }
        }
    }

    #[test]
    fn test_header_formula() {
        assert_eq!(encode_header(5, 0xFF, 3), (5 + 3) ^ 0xFF);
        // wraps instead of overflowing
        assert_eq!(encode_header(u32::MAX, 0, 2), 1);

        let key = ObfuscationKey::new(0x8BA4, 0xB6);
        assert_eq!(key.decode(key.encode(42)), 42);
    }

    #[test]
    fn test_half_exact_values() {
        assert_eq!(encode_half(1.5), 0x3E00);
        assert_eq!(decode_half(encode_half(1.5)), 1.5);
        assert_eq!(encode_half(0.0), 0x0000);
        assert_eq!(encode_half(-0.0), 0x8000);
        assert_eq!(encode_half(1.0), 0x3C00);
        assert_eq!(encode_half(-2.0), 0xC000);
        assert_eq!(encode_half(65504.0), 0x7BFF);
        assert_eq!(decode_half(0x7BFF), 65504.0);
    }

    #[test]
    fn test_half_special_values() {
        assert_eq!(encode_half(f32::INFINITY), 0x7C00);
        assert_eq!(encode_half(f32::NEG_INFINITY), 0xFC00);
        assert_eq!(encode_half(1.0e6), 0x7C00);
        // rounds up past the largest finite half
        assert_eq!(encode_half(65520.0), 0x7C00);
        assert!(decode_half(encode_half(f32::NAN)).is_nan());
        assert_eq!(encode_half(1.0e-10), 0);
    }

    #[test]
    fn test_half_subnormals() {
        let smallest = f32::from_bits(0x3380_0000);
        assert_eq!(encode_half(smallest), 0x0001);
        assert_eq!(decode_half(0x0001), smallest);
        assert_eq!(decode_half(0x03FF), 1023.0 * smallest);
        // exactly half the smallest subnormal ties to even (zero)
        assert_eq!(encode_half(smallest / 2.0), 0x0000);
    }

    #[test]
    fn test_half_rounding_is_fixed_point() {
        let samples = [
            0.1f32, -0.1, 3.14159, 100.25, -1234.567, 0.000061, 0.00001, 42000.0, 1.0e-7, 7.0e4,
        ];
        for value in samples {
            let half = encode_half(value);
            assert_eq!(encode_half(decode_half(half)), half, "value {value}");
        }
    }

    #[test]
    fn test_half_error_bounded_by_ulp() {
        let samples = [0.1f32, 0.7, 3.3, 17.77, 250.1, 1000.9, 30000.3];
        for value in samples {
            let widened = decode_half(encode_half(value));
            // half has 10 explicit mantissa bits
            let ulp = 2f32.powi(value.abs().log2().floor() as i32 - 10);
            assert!((widened - value).abs() <= ulp / 2.0, "value {value}");
        }
    }

    #[test]
    fn test_half_ties_to_even() {
        // 1 + 2^-11 sits exactly between 1.0 and the next half
        assert_eq!(encode_half(1.0 + 2f32.powi(-11)), 0x3C00);
        // 1 + 3 * 2^-11 rounds up to the even neighbour
        assert_eq!(encode_half(1.0 + 3.0 * 2f32.powi(-11)), 0x3C02);
    }
}
