//! Compressed length quantization.
//!
//! Magic integers only spend a handful of low bits on the compressed length of an entry. The
//! length those bits stand for is produced by a packed fixed-point routine from the game binary,
//! reproduced here operation for operation including its 32-bit wraparound.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Quantized lengths are always multiples of this many bytes
pub const LENGTH_QUANTUM: u32 = 0x800;

/// Whether adding the two values as unsigned 32-bit integers carries out, counted only when the
/// first value is negative.
fn carries(x: i32, y: i32) -> bool {
    x < 0 && (x as u32).overflowing_add(y as u32).1
}

/// Length in bytes encoded by `low_bits` in a container using `lsb_multiplier`.
pub fn quantized_length(low_bits: u32, lsb_multiplier: u32) -> u32 {
    let mut value = 0x7FFi32.wrapping_add(low_bits.wrapping_mul(lsb_multiplier) as i32);
    if value < 0x800 {
        return 0;
    }

    let mut shift = 0x1Cu32;
    let mut salt = (value as u32) >> 4;
    if 0x800 <= salt >> 12 {
        shift -= 16;
        salt >>= 16;
    }
    if 0x800 <= salt >> 4 {
        shift -= 8;
        salt >>= 8;
    }
    if 0x800 <= salt {
        shift -= 4;
        salt >>= 4;
    }

    value = ((value as u32) << shift) as i32;
    let increment = -0x800i32;

    let mut carry = carries(value, value);
    value = value.wrapping_mul(2);

    let mut counter = shift * 12;
    while counter <= 0x174 {
        let next = carries(increment, ((salt << 1) as i32).wrapping_add(carry as i32));
        salt = (increment as u32)
            .wrapping_add(salt << 1)
            .wrapping_add(carry as u32);
        carry = next;
        if !carry {
            salt = salt.wrapping_sub(increment as u32);
        }

        let next = carries(value, value.wrapping_add(carry as i32));
        value = value.wrapping_mul(2).wrapping_add(carry as i32);
        carry = next;

        counter += 12;
    }

    value.wrapping_mul(0x800) as u32
}

/// Map every length reachable with `0..=lsb_mask` to the first low bit value producing it.
pub fn build_inverse(lsb_mask: u32, lsb_multiplier: u32) -> HashMap<u32, u32> {
    let mut inverse = HashMap::new();
    for low_bits in 0..=lsb_mask {
        inverse
            .entry(quantized_length(low_bits, lsb_multiplier))
            .or_insert(low_bits);
    }
    inverse
}

/// Quantizer for a single container, holding its header scalars and the inverse length table
#[derive(Debug, Clone)]
pub struct LengthQuantizer {
    lsb_mask: u32,
    lsb_multiplier: u32,
    inverse: HashMap<u32, u32>,
}

impl LengthQuantizer {
    /// Build the quantizer, enumerating every low bit value allowed by `lsb_mask`.
    pub fn new(lsb_mask: u32, lsb_multiplier: u32) -> Self {
        Self {
            lsb_mask,
            lsb_multiplier,
            inverse: build_inverse(lsb_mask, lsb_multiplier),
        }
    }

    /// Mask selecting the length bits of a magic integer
    pub fn lsb_mask(&self) -> u32 {
        self.lsb_mask
    }

    /// Multiplier applied to the length bits
    pub fn lsb_multiplier(&self) -> u32 {
        self.lsb_multiplier
    }

    /// Compressed length stored in a magic integer
    pub fn length_of(&self, magic_integer: u32) -> u32 {
        quantized_length(magic_integer & self.lsb_mask, self.lsb_multiplier)
    }

    /// Low bit value encoding exactly `length`.
    ///
    /// `length` has to be rounded up to a multiple of [`LENGTH_QUANTUM`] beforehand.
    pub fn low_bits_for(&self, length: u32) -> Result<u32> {
        self.inverse
            .get(&length)
            .copied()
            .ok_or(Error::UnencodableLength { length })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use crate::error::{Error, Result};
    use crate::quantize::{build_inverse, quantized_length, LengthQuantizer};

    #[test]
    fn small_lengths() {
        let cases = [
            (0, 0x800, 0),
            (1, 0x800, 0x800),
            (2, 0x800, 0x1000),
            (3, 0x800, 0x1800),
            (4, 0x800, 0x2000),
            (1, 0x400, 0x800),
            (2, 0x400, 0x800),
            (3, 0x400, 0x1000),
            (4, 0x200, 0x800),
            (5, 0x200, 0x1000),
            (9, 0x100, 0x1000),
            (1, 0x1000, 0x1000),
            (2, 0x3000, 0x6000),
        ];

        for (low_bits, multiplier, expected) in cases {
            assert_eq!(
                quantized_length(low_bits, multiplier),
                expected,
                "quantized_length({low_bits:#x}, {multiplier:#x})"
            );
        }
    }

    #[test]
    fn large_lengths() {
        let cases = [
            (0xFFFF, 0x800, 0x7FFF800),
            (0x7FFFF, 0x800, 0x3FFFF800),
            (0xFFFFF, 0x800, 0x7FFFF800),
            (0xFFF, 0x7FFFF, 0x7FF7F800),
            (0x7FFF, 0xFFFF, 0x7FFE8800),
            (0xF000, 0x8000, 0x78000000),
            (1, 0x7FFFF7FF, 0x7FFFF800),
            (1, 0x7FFFF800, 0x7FFFF800),
        ];

        for (low_bits, multiplier, expected) in cases {
            assert_eq!(
                quantized_length(low_bits, multiplier),
                expected,
                "quantized_length({low_bits:#x}, {multiplier:#x})"
            );
        }
    }

    #[test]
    fn wrapped_lengths_are_zero() {
        assert_eq!(quantized_length(0x100000, 0x800), 0);
        assert_eq!(quantized_length(3, 0x2AAAAAAA), 0);
    }

    #[test]
    fn inverse_keeps_first_value() {
        let inverse = build_inverse(0xFF, 0x400);
        assert_eq!(inverse[&0], 0);
        assert_eq!(inverse[&0x800], 1);
        assert_eq!(inverse[&0x1000], 3);
    }

    #[test]
    fn quantizer_lookup() -> Result<()> {
        let quantizer = LengthQuantizer::new(0xFF, 0x800);
        assert_eq!(quantizer.length_of(0x1003), 0x1800);
        assert_eq!(quantizer.low_bits_for(0x1800)?, 3);
        assert!(matches!(
            quantizer.low_bits_for(0x1801),
            Err(Error::UnencodableLength { length: 0x1801 })
        ));
        assert!(matches!(
            quantizer.low_bits_for(0x100 * 0x800),
            Err(Error::UnencodableLength { .. })
        ));
        Ok(())
    }

    proptest! {
        #[test]
        fn inverse_reproduces_keys(mask in 0u32..0x400, multiplier in 1u32..0x10000) {
            for (length, low_bits) in build_inverse(mask, multiplier) {
                prop_assert!(low_bits <= mask);
                prop_assert_eq!(quantized_length(low_bits, multiplier), length);
            }
        }

        #[test]
        fn rounds_down_to_quantum(low_bits in 0u32..0x1000, multiplier in 0u32..0x10000) {
            let raw = low_bits * multiplier + 0x7FF;
            let expected = if raw < 0x800 { 0 } else { raw / 0x800 * 0x800 };
            prop_assert_eq!(quantized_length(low_bits, multiplier), expected);
        }
    }
}
