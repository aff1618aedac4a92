use std::fmt;
use std::ops::{Index, IndexMut};

use crate::Word;

/// Number of general-purpose registers
pub const REGISTER_COUNT: usize = 8;

/// Index of a register, always in `0..8`.
///
/// The only way to build one is from a 3-bit field, so the register file can
/// index without bounds checks failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(u8);

impl RegisterId {
  /// Build an id from the low three bits of `bits`.
  pub const fn from_bits(bits: u32) -> Self {
    Self((bits & 0b111) as u8)
  }

  pub const fn index(self) -> usize {
    self.0 as usize
  }
}

impl fmt::Display for RegisterId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "r{}", self.0)
  }
}

/// Eight 32-bit registers, zeroed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers([Word; REGISTER_COUNT]);

impl Registers {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn get(&self, id: RegisterId) -> Word {
    self.0[id.index()]
  }

  #[inline]
  pub fn set(&mut self, id: RegisterId, value: Word) {
    self.0[id.index()] = value;
  }

  pub fn as_slice(&self) -> &[Word] {
    &self.0
  }
}

impl Index<RegisterId> for Registers {
  type Output = Word;

  fn index(&self, id: RegisterId) -> &Word {
    &self.0[id.index()]
  }
}

impl IndexMut<RegisterId> for Registers {
  fn index_mut(&mut self, id: RegisterId) -> &mut Word {
    &mut self.0[id.index()]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zeroed() {
    let registers = Registers::new();
    assert!(registers.as_slice().iter().all(|&r| r == 0));
  }

  #[test]
  fn set_touches_one_slot() {
    let mut registers = Registers::new();
    let r3 = RegisterId::from_bits(3);
    registers.set(r3, 0xDEAD_BEEF);
    assert_eq!(registers.get(r3), 0xDEAD_BEEF);
    assert_eq!(registers[r3], 0xDEAD_BEEF);
    for i in (0..REGISTER_COUNT as u32).filter(|&i| i != 3) {
      assert_eq!(registers[RegisterId::from_bits(i)], 0);
    }
  }

  #[test]
  fn id_from_bits_masks() {
    assert_eq!(RegisterId::from_bits(0b1111).index(), 7);
    assert_eq!(RegisterId::from_bits(0b1000).index(), 0);
    assert_eq!(RegisterId::from_bits(0xFFFF_FFFA), RegisterId::from_bits(2));
    assert_eq!(RegisterId::from_bits(5).to_string(), "r5");
  }
}
