//! A Universal Machine: a 14-instruction register machine over a segmented,
//! dynamically allocated address space.
//!
//! Programs are flat files of big-endian 32-bit words. The top nibble of each
//! word selects the instruction; the rest holds register indices or a 25-bit
//! literal.

pub mod bitpack;
pub mod cli;
pub mod device;
pub mod memory;
pub mod opcode;
pub mod region;
pub mod registers;
pub mod vm;

/// The machine's unit of storage: registers, memory cells and instructions.
pub type Word = u32;
