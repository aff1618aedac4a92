use std::fmt;
use std::io::{self, Write};

use crate::bitpack;
use crate::registers::RegisterId;
use crate::Word;

/// Bit layout of an instruction word: `(width, lsb)` pairs.
mod field {
  pub const OPCODE: (u32, u32) = (4, 28);
  pub const A: (u32, u32) = (3, 6);
  pub const B: (u32, u32) = (3, 3);
  pub const C: (u32, u32) = (3, 0);
  pub const VALUE_A: (u32, u32) = (3, 25);
  pub const VALUE: (u32, u32) = (25, 0);
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  /// | Operation        | Semantics/RTL                |
  /// |------------------|------------------------------|
  /// | Conditional Move | `if r[c] ≠ 0 : r[a] ← r[b]`  |
  ConditionalMove = 0x0,

  /// | Operation      | Semantics/RTL          |
  /// |----------------|------------------------|
  /// | Segmented Load | `r[a] ← m[r[b]][r[c]]` |
  SegmentedLoad = 0x1,

  /// | Operation       | Semantics/RTL          |
  /// |-----------------|------------------------|
  /// | Segmented Store | `m[r[a]][r[b]] ← r[c]` |
  SegmentedStore = 0x2,

  /// | Operation | Semantics/RTL                        |
  /// |-----------|--------------------------------------|
  /// | Add       | `r[a] ← (r[b] + r[c]) mod 2³²`       |
  Add = 0x3,

  /// | Operation | Semantics/RTL                        |
  /// |-----------|--------------------------------------|
  /// | Multiply  | `r[a] ← (r[b] × r[c]) mod 2³²`       |
  Multiply = 0x4,

  /// Division by zero faults the machine.
  ///
  /// | Operation | Semantics/RTL          |
  /// |-----------|------------------------|
  /// | Divide    | `r[a] ← ⌊r[b] ÷ r[c]⌋` |
  Divide = 0x5,

  /// | Operation    | Semantics/RTL           |
  /// |--------------|-------------------------|
  /// | Bitwise NAND | `r[a] ← ¬(r[b] ∧ r[c])` |
  Nand = 0x6,

  /// | Operation | Semantics/RTL      |
  /// |-----------|--------------------|
  /// | Halt      | `(stop execution)` |
  Halt = 0x7,

  /// The new segment is zeroed; its handle is the lowest one free.
  ///
  /// | Operation   | Semantics/RTL                     |
  /// |-------------|-----------------------------------|
  /// | Map Segment | `r[b] ← map(r[c] words)`          |
  MapSegment = 0x8,

  /// | Operation     | Semantics/RTL  |
  /// |---------------|----------------|
  /// | Unmap Segment | `unmap(r[c])`  |
  UnmapSegment = 0x9,

  /// Only values in `0..=255` may be written.
  ///
  /// | Operation | Semantics/RTL   |
  /// |-----------|-----------------|
  /// | Output    | `out ← r[c]`    |
  Output = 0xA,

  /// End of input loads `0xFFFF_FFFF`.
  ///
  /// | Operation | Semantics/RTL   |
  /// |-----------|-----------------|
  /// | Input     | `r[c] ← in`     |
  Input = 0xB,

  /// | Operation    | Semantics/RTL                                      |
  /// |--------------|----------------------------------------------------|
  /// | Load Program | `if r[b] ≠ 0 : m[0] ← m[r[b]]` ; `pc ← (0, r[c])`  |
  LoadProgram = 0xC,

  /// | Operation  | Semantics/RTL             |
  /// |------------|---------------------------|
  /// | Load Value | `r[a] ← vvvvvvv` (25 bit) |
  LoadValue = 0xD,
}

impl TryFrom<u8> for Opcode {
  type Error = u8;

  fn try_from(nibble: u8) -> Result<Self, u8> {
    Ok(match nibble {
      0x0 => Self::ConditionalMove,
      0x1 => Self::SegmentedLoad,
      0x2 => Self::SegmentedStore,
      0x3 => Self::Add,
      0x4 => Self::Multiply,
      0x5 => Self::Divide,
      0x6 => Self::Nand,
      0x7 => Self::Halt,
      0x8 => Self::MapSegment,
      0x9 => Self::UnmapSegment,
      0xA => Self::Output,
      0xB => Self::Input,
      0xC => Self::LoadProgram,
      0xD => Self::LoadValue,
      other => return Err(other),
    })
  }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("unknown opcode {opcode:#x} in word {word:#010x}")]
  UnknownOpcode { opcode: u8, word: Word },

  #[error(transparent)]
  Codec(#[from] bitpack::Error),
}

/// A decoded instruction with its register operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
  ConditionalMove { a: RegisterId, b: RegisterId, c: RegisterId },
  SegmentedLoad { a: RegisterId, b: RegisterId, c: RegisterId },
  SegmentedStore { a: RegisterId, b: RegisterId, c: RegisterId },
  Add { a: RegisterId, b: RegisterId, c: RegisterId },
  Multiply { a: RegisterId, b: RegisterId, c: RegisterId },
  Divide { a: RegisterId, b: RegisterId, c: RegisterId },
  Nand { a: RegisterId, b: RegisterId, c: RegisterId },
  Halt,
  MapSegment { b: RegisterId, c: RegisterId },
  UnmapSegment { c: RegisterId },
  Output { c: RegisterId },
  Input { c: RegisterId },
  LoadProgram { b: RegisterId, c: RegisterId },
  LoadValue { a: RegisterId, value: Word },
}

fn get((width, lsb): (u32, u32), word: Word) -> Result<u32, bitpack::Error> {
  // width <= 25, so the field always fits a u32
  Ok(bitpack::get_unsigned(word.into(), width, lsb)? as u32)
}

fn set((width, lsb): (u32, u32), word: u64, value: u32) -> Result<u64, bitpack::Error> {
  bitpack::set_unsigned(word, width, lsb, value.into())
}

fn register(field: (u32, u32), word: Word) -> Result<RegisterId, bitpack::Error> {
  get(field, word).map(RegisterId::from_bits)
}

impl Instruction {
  pub fn opcode(&self) -> Opcode {
    match self {
      Self::ConditionalMove { .. } => Opcode::ConditionalMove,
      Self::SegmentedLoad { .. } => Opcode::SegmentedLoad,
      Self::SegmentedStore { .. } => Opcode::SegmentedStore,
      Self::Add { .. } => Opcode::Add,
      Self::Multiply { .. } => Opcode::Multiply,
      Self::Divide { .. } => Opcode::Divide,
      Self::Nand { .. } => Opcode::Nand,
      Self::Halt => Opcode::Halt,
      Self::MapSegment { .. } => Opcode::MapSegment,
      Self::UnmapSegment { .. } => Opcode::UnmapSegment,
      Self::Output { .. } => Opcode::Output,
      Self::Input { .. } => Opcode::Input,
      Self::LoadProgram { .. } => Opcode::LoadProgram,
      Self::LoadValue { .. } => Opcode::LoadValue,
    }
  }

  /// Decode one instruction word.
  pub fn decode(word: Word) -> Result<Self, DecodeError> {
    let nibble = get(field::OPCODE, word)? as u8;
    let opcode = Opcode::try_from(nibble).map_err(|opcode| DecodeError::UnknownOpcode { opcode, word })?;

    let a = register(field::A, word)?;
    let b = register(field::B, word)?;
    let c = register(field::C, word)?;
    Ok(match opcode {
      Opcode::ConditionalMove => Self::ConditionalMove { a, b, c },
      Opcode::SegmentedLoad => Self::SegmentedLoad { a, b, c },
      Opcode::SegmentedStore => Self::SegmentedStore { a, b, c },
      Opcode::Add => Self::Add { a, b, c },
      Opcode::Multiply => Self::Multiply { a, b, c },
      Opcode::Divide => Self::Divide { a, b, c },
      Opcode::Nand => Self::Nand { a, b, c },
      Opcode::Halt => Self::Halt,
      Opcode::MapSegment => Self::MapSegment { b, c },
      Opcode::UnmapSegment => Self::UnmapSegment { c },
      Opcode::Output => Self::Output { c },
      Opcode::Input => Self::Input { c },
      Opcode::LoadProgram => Self::LoadProgram { b, c },
      Opcode::LoadValue => Self::LoadValue {
        a: register(field::VALUE_A, word)?,
        value: get(field::VALUE, word)?,
      },
    })
  }

  /// Encode back into an instruction word. Unused operand fields are zero.
  ///
  /// Fails with [`bitpack::Error::Overflow`] if a `LoadValue` literal needs
  /// more than 25 bits.
  pub fn encode(&self) -> Result<Word, bitpack::Error> {
    let zero = RegisterId::from_bits(0);
    let word = set(field::OPCODE, 0, self.opcode() as u32)?;
    let (a, b, c) = match *self {
      Self::LoadValue { a, value } => {
        let word = set(field::VALUE_A, word, a.index() as u32)?;
        return Ok(set(field::VALUE, word, value)? as Word);
      }
      Self::ConditionalMove { a, b, c }
      | Self::SegmentedLoad { a, b, c }
      | Self::SegmentedStore { a, b, c }
      | Self::Add { a, b, c }
      | Self::Multiply { a, b, c }
      | Self::Divide { a, b, c }
      | Self::Nand { a, b, c } => (a, b, c),
      Self::Halt => (zero, zero, zero),
      Self::MapSegment { b, c } | Self::LoadProgram { b, c } => (zero, b, c),
      Self::UnmapSegment { c } | Self::Output { c } | Self::Input { c } => (zero, zero, c),
    };
    let word = set(field::A, word, a.index() as u32)?;
    let word = set(field::B, word, b.index() as u32)?;
    let word = set(field::C, word, c.index() as u32)?;
    Ok(word as Word)
  }
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::ConditionalMove { a, b, c } => write!(f, "cmov {a}, {b}, {c}"),
      Self::SegmentedLoad { a, b, c } => write!(f, "sload {a}, {b}, {c}"),
      Self::SegmentedStore { a, b, c } => write!(f, "sstore {a}, {b}, {c}"),
      Self::Add { a, b, c } => write!(f, "add {a}, {b}, {c}"),
      Self::Multiply { a, b, c } => write!(f, "mul {a}, {b}, {c}"),
      Self::Divide { a, b, c } => write!(f, "div {a}, {b}, {c}"),
      Self::Nand { a, b, c } => write!(f, "nand {a}, {b}, {c}"),
      Self::Halt => write!(f, "halt"),
      Self::MapSegment { b, c } => write!(f, "map {b}, {c}"),
      Self::UnmapSegment { c } => write!(f, "unmap {c}"),
      Self::Output { c } => write!(f, "out {c}"),
      Self::Input { c } => write!(f, "in {c}"),
      Self::LoadProgram { b, c } => write!(f, "loadp {b}, {c}"),
      Self::LoadValue { a, value } => write!(f, "loadv {a}, {value:#x}"),
    }
  }
}

/// Write one line per word: offset, raw word, and its decoding. Words that
/// do not decode are shown as data.
pub fn disassemble<W: Write>(words: &[Word], mut out: W) -> io::Result<()> {
  for (offset, &word) in words.iter().enumerate() {
    match Instruction::decode(word) {
      Ok(instruction) => writeln!(out, "{offset:>8}: {word:08x}  {instruction}")?,
      Err(_) => writeln!(out, "{offset:>8}: {word:08x}  .word {word:#010x}")?,
    }
  }
  out.flush()
}
