//! Packing and unpacking of bit fields inside a 64-bit word.
//!
//! A field is described by its `width` and the offset of its least
//! significant bit, `lsb`. Every function here is pure mask-and-shift
//! arithmetic, with two's-complement for signed fields.
//!
//! Fields as wide as the whole word are not supported: shifting a `u64` by
//! 64 is undefined on most hardware, so a `width` of 64 is reported as
//! [`Error::Shift64`] rather than special-cased.

/// Number of bits in the word all fields live in.
pub const WORD_BITS: u32 = 64;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
  /// The value does not fit in the requested number of bits.
  #[error("overflow packing {value:#x} into a {width}-bit field")]
  Overflow { value: i128, width: u32 },

  /// A full 64-bit field was requested.
  #[error("attempted to shift by 64")]
  Shift64,

  /// The field does not lie inside the word.
  #[error("field of width {width} at lsb {lsb} does not fit in a 64-bit word")]
  OutOfRange { width: u32, lsb: u32 },
}

fn check_width(width: u32) -> Result<(), Error> {
  if width > WORD_BITS {
    return Err(Error::OutOfRange { width, lsb: 0 });
  }
  if width == WORD_BITS {
    return Err(Error::Shift64);
  }
  Ok(())
}

fn check_field(width: u32, lsb: u32) -> Result<(), Error> {
  if width > WORD_BITS || lsb > WORD_BITS || width + lsb > WORD_BITS {
    return Err(Error::OutOfRange { width, lsb });
  }
  if width == WORD_BITS {
    return Err(Error::Shift64);
  }
  Ok(())
}

// width < 64 here
#[inline]
fn low_mask(width: u32) -> u64 {
  (1u64 << width) - 1
}

/// Whether `value` can be represented in `width` unsigned bits.
pub fn fits_unsigned(value: u64, width: u32) -> Result<bool, Error> {
  check_width(width)?;
  Ok(value < (1u64 << width))
}

/// Whether `value` can be represented in `width` two's-complement bits.
pub fn fits_signed(value: i64, width: u32) -> Result<bool, Error> {
  check_width(width)?;
  if width == 0 {
    return Ok(value == 0);
  }
  let high = (1i64 << (width - 1)) - 1;
  let low = !high;
  Ok(low <= value && value <= high)
}

/// Extract the field as an unsigned value.
pub fn get_unsigned(word: u64, width: u32, lsb: u32) -> Result<u64, Error> {
  check_field(width, lsb)?;
  if width == 0 {
    return Ok(0);
  }
  Ok((word >> lsb) & low_mask(width))
}

/// Extract the field, sign-extending from its own high bit.
pub fn get_signed(word: u64, width: u32, lsb: u32) -> Result<i64, Error> {
  let field = get_unsigned(word, width, lsb)?;
  if width == 0 {
    return Ok(0);
  }
  // park the field at the top of the word, then arithmetic-shift it back
  let unused = WORD_BITS - width;
  Ok(((field << unused) as i64) >> unused)
}

/// Return `word` with the field replaced by `value`.
pub fn set_unsigned(word: u64, width: u32, lsb: u32, value: u64) -> Result<u64, Error> {
  check_field(width, lsb)?;
  if !fits_unsigned(value, width)? {
    return Err(Error::Overflow {
      value: value as i128,
      width,
    });
  }
  let mask = low_mask(width) << lsb;
  Ok((word & !mask) | (value << lsb))
}

/// Return `word` with the field replaced by the two's-complement `value`.
pub fn set_signed(word: u64, width: u32, lsb: u32, value: i64) -> Result<u64, Error> {
  check_field(width, lsb)?;
  if !fits_signed(value, width)? {
    return Err(Error::Overflow {
      value: value as i128,
      width,
    });
  }
  let mask = low_mask(width);
  set_unsigned(word, width, lsb, (value as u64) & mask)
}

#[cfg(test)]
mod tests {
  use super::*;

  mod fits {
    use super::*;

    #[test]
    fn unsigned_boundaries() {
      assert_eq!(fits_unsigned(0, 0), Ok(true));
      assert_eq!(fits_unsigned(1, 0), Ok(false));
      assert_eq!(fits_unsigned(7, 3), Ok(true));
      assert_eq!(fits_unsigned(8, 3), Ok(false));
      assert_eq!(fits_unsigned(u64::MAX >> 1, 63), Ok(true));
    }

    #[test]
    fn unsigned_64_is_shift64() {
      assert_eq!(fits_unsigned(5, 64), Err(Error::Shift64));
    }

    #[test]
    fn unsigned_too_wide() {
      assert!(matches!(fits_unsigned(5, 65), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn signed_boundaries() {
      assert_eq!(fits_signed(3, 3), Ok(true));
      assert_eq!(fits_signed(4, 3), Ok(false));
      assert_eq!(fits_signed(-4, 3), Ok(true));
      assert_eq!(fits_signed(-5, 3), Ok(false));
      assert_eq!(fits_signed(0, 0), Ok(true));
      assert_eq!(fits_signed(-1, 0), Ok(false));
      assert_eq!(fits_signed(-1, 1), Ok(true));
      assert_eq!(fits_signed(1, 1), Ok(false));
    }

    #[test]
    fn signed_64_is_shift64() {
      assert_eq!(fits_signed(-1, 64), Err(Error::Shift64));
    }
  }

  mod get {
    use super::*;

    #[test]
    fn unsigned_field() {
      let word = 0x3f4;
      assert_eq!(get_unsigned(word, 6, 2), Ok(0x3d));
      assert_eq!(get_unsigned(word, 0, 5), Ok(0));
      assert_eq!(get_unsigned(0xF000_0000, 4, 28), Ok(0xF));
    }

    #[test]
    fn signed_field() {
      assert_eq!(get_signed(0x3f4, 6, 2), Ok(-3));
      assert_eq!(get_signed(0b0110, 3, 1), Ok(3));
      assert_eq!(get_signed(1 << 62, 1, 62), Ok(-1));
    }

    #[test]
    fn field_past_top_of_word() {
      assert_eq!(
        get_unsigned(0, 10, 60),
        Err(Error::OutOfRange { width: 10, lsb: 60 })
      );
      assert!(matches!(get_signed(0, 1, 64), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn full_width_is_shift64() {
      assert_eq!(get_unsigned(u64::MAX, 64, 0), Err(Error::Shift64));
      assert_eq!(get_signed(u64::MAX, 64, 0), Err(Error::Shift64));
    }

    #[test]
    fn range_is_checked_before_width() {
      // a 64-bit field can only start at bit 0
      assert_eq!(
        get_unsigned(0, 64, 1),
        Err(Error::OutOfRange { width: 64, lsb: 1 })
      );
      assert_eq!(
        get_signed(0, 65, 0),
        Err(Error::OutOfRange { width: 65, lsb: 0 })
      );
    }
  }

  mod set {
    use super::*;

    #[test]
    fn replaces_only_the_field() {
      let word = u64::MAX;
      let packed = set_unsigned(word, 4, 8, 0).unwrap();
      assert_eq!(packed, !0xF00);
      assert_eq!(set_unsigned(0, 8, 24, 0xAB), Ok(0xAB00_0000));
    }

    #[test]
    fn signed_negative() {
      let packed = set_signed(0, 6, 2, -3).unwrap();
      assert_eq!(packed, 0xF4);
      assert_eq!(get_signed(packed, 6, 2), Ok(-3));
      // neighbours untouched
      let packed = set_signed(u64::MAX, 4, 4, -8).unwrap();
      assert_eq!(packed, !0x70);
    }

    #[test]
    fn overflow() {
      assert_eq!(
        set_unsigned(0, 3, 0, 8),
        Err(Error::Overflow { value: 8, width: 3 })
      );
      assert_eq!(
        set_signed(0, 3, 0, -5),
        Err(Error::Overflow { value: -5, width: 3 })
      );
      assert_eq!(
        set_signed(0, 3, 0, 4),
        Err(Error::Overflow { value: 4, width: 3 })
      );
    }

    #[test]
    fn full_width_is_shift64() {
      assert_eq!(set_unsigned(0, 64, 0, 1), Err(Error::Shift64));
      assert_eq!(set_signed(0, 64, 0, -1), Err(Error::Shift64));
    }

    #[test]
    fn field_past_top_of_word() {
      assert!(matches!(
        set_unsigned(0, 8, 60, 1),
        Err(Error::OutOfRange { width: 8, lsb: 60 })
      ));
    }

    #[test]
    fn range_is_checked_first() {
      assert_eq!(
        set_signed(0, 64, 1, -1),
        Err(Error::OutOfRange { width: 64, lsb: 1 })
      );
      // 8 overflows three bits too, but the field does not fit the word
      assert_eq!(
        set_unsigned(0, 3, 62, 8),
        Err(Error::OutOfRange { width: 3, lsb: 62 })
      );
      assert_eq!(
        set_signed(0, 2, 63, 5),
        Err(Error::OutOfRange { width: 2, lsb: 63 })
      );
    }
  }

  mod properties {
    use super::*;
    use proptest::prelude::*;

    fn field() -> impl Strategy<Value = (u32, u32)> {
      (1u32..64).prop_flat_map(|width| (Just(width), 0..=(WORD_BITS - width)))
    }

    proptest! {
      #[test]
      fn fits_unsigned_matches_power_of_two(value in any::<u64>(), width in 0u32..64) {
        prop_assert_eq!(fits_unsigned(value, width).unwrap(), (value as u128) < (1u128 << width));
      }

      #[test]
      fn unsigned_round_trip(word in any::<u64>(), (width, lsb) in field(), raw in any::<u64>()) {
        let value = raw & ((1u64 << width) - 1);
        let packed = set_unsigned(word, width, lsb, value).unwrap();
        prop_assert_eq!(get_unsigned(packed, width, lsb).unwrap(), value);
      }

      #[test]
      fn signed_round_trip(word in any::<u64>(), (width, lsb) in field(), raw in any::<i64>()) {
        let unused = WORD_BITS - width;
        let value = (raw << unused) >> unused;
        let packed = set_signed(word, width, lsb, value).unwrap();
        prop_assert_eq!(get_signed(packed, width, lsb).unwrap(), value);
      }

      #[test]
      fn set_leaves_other_bits(word in any::<u64>(), (width, lsb) in field(), raw in any::<u64>()) {
        let value = raw & ((1u64 << width) - 1);
        let packed = set_unsigned(word, width, lsb, value).unwrap();
        let outside = !(((1u64 << width) - 1) << lsb);
        prop_assert_eq!(packed & outside, word & outside);
      }
    }
  }
}
