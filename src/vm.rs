use std::fmt;
use std::io;
use std::path::Path;

use tracing::{debug, info, trace};

use crate::device::Device;
use crate::memory::{self, Handle, Memory, PROGRAM};
use crate::opcode::{DecodeError, Instruction};
use crate::region::{Image, LoadError, Region};
use crate::registers::{RegisterId, Registers};
use crate::Word;

/// Where the next instruction is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pc {
  pub segment: Handle,
  pub offset: u32,
}

impl Pc {
  pub const fn new(segment: Handle, offset: u32) -> Self {
    Self { segment, offset }
  }
}

impl fmt::Display for Pc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "m[{}][{}]", self.segment, self.offset)
  }
}

/// Why a machine stopped without fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
  /// A `halt` instruction executed.
  Halt,
  /// The program counter ran past the end of its segment.
  EndOfProgram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  Running,
  Halted(Exit),
  /// A fault stopped the machine; it will not execute again.
  Faulted,
}

/// What a handler asks the driver to do with the program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
  Next,
  Jump(Pc),
  Halt,
}

/// A fault raised while executing instructions
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("machine is halted")]
  MachineHalted,

  #[error("at {pc}: {source}")]
  Decode {
    pc: Pc,
    #[source]
    source: DecodeError,
  },

  #[error("at {pc}: {source}")]
  Memory {
    pc: Pc,
    #[source]
    source: memory::Error,
  },

  #[error("at {pc}: division by zero")]
  DivideByZero { pc: Pc },

  #[error("at {pc}: cannot output {value:#x}, not a byte")]
  OutputOutOfRange { pc: Pc, value: Word },

  #[error("I/O device failed")]
  Io(#[from] io::Error),

  #[error(transparent)]
  Load(#[from] LoadError),
}

/// A Universal Machine: eight registers, segmented memory and a program
/// counter.
#[derive(Debug)]
pub struct Vm {
  pc: Pc,
  memory: Memory,
  registers: Registers,
  state: State,
  steps: u64,
}

impl Vm {
  /// Create a machine with an empty program segment
  pub fn new() -> Self {
    Self::with_memory(Memory::new(0))
  }

  fn with_memory(memory: Memory) -> Self {
    Self {
      pc: Pc::default(),
      memory,
      registers: Registers::new(),
      state: State::Running,
      steps: 0,
    }
  }

  /// Create a machine whose program segment holds exactly the words of
  /// `region`.
  pub fn boot<R>(region: &R) -> Self
  where
    R: Region,
  {
    let words = region.words();
    info!(words = words.len(), "loaded program");
    Self::with_memory(Memory::from_words(words))
  }

  /// Read a program image from `path` and boot from it.
  pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
    let image = Image::open(path)?;
    Ok(Self::boot(&image))
  }

  pub fn pc(&self) -> Pc {
    self.pc
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn registers(&self) -> &Registers {
    &self.registers
  }

  pub fn registers_mut(&mut self) -> &mut Registers {
    &mut self.registers
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut Memory {
    &mut self.memory
  }

  /// Number of instructions executed so far
  pub fn steps(&self) -> u64 {
    self.steps
  }

  /// Execute a single instruction.
  ///
  /// Any fault leaves the machine `Faulted`; stepping a machine that is not
  /// running fails with [`Error::MachineHalted`].
  pub fn step<D>(&mut self, device: &mut D) -> Result<(), Error>
  where
    D: Device,
  {
    if self.state != State::Running {
      return Err(Error::MachineHalted);
    }
    let mut task = Task::new(self, device);
    let result = task.run();
    if result.is_err() {
      self.state = State::Faulted;
    }
    result
  }

  /// Step until the machine halts or faults.
  pub fn run<D>(&mut self, device: &mut D) -> Result<Exit, Error>
  where
    D: Device,
  {
    let exit = loop {
      self.step(device)?;
      if let State::Halted(exit) = self.state {
        break exit;
      }
    };
    device.flush()?;
    info!(
      ?exit,
      steps = self.steps,
      segments = self.memory.mapped_count(),
      "machine stopped"
    );
    debug!(registers = ?self.registers.as_slice());
    Ok(exit)
  }
}

impl Default for Vm {
  fn default() -> Self {
    Self::new()
  }
}

struct Task<'vm, 'dev, D> {
  vm: &'vm mut Vm,
  device: &'dev mut D,
}

impl<'vm, 'dev, D> Task<'vm, 'dev, D>
where
  D: Device,
{
  fn new(vm: &'vm mut Vm, device: &'dev mut D) -> Self {
    Self { vm, device }
  }

  fn fetch(&self) -> Result<Option<Word>, Error> {
    let pc = self.vm.pc;
    let segment = self
      .vm
      .memory
      .segment(pc.segment)
      .map_err(memory_fault(pc))?;
    Ok(segment.get(pc.offset as usize).copied())
  }

  fn run(&mut self) -> Result<(), Error> {
    let pc = self.vm.pc;
    let Some(word) = self.fetch()? else {
      self.vm.state = State::Halted(Exit::EndOfProgram);
      return Ok(());
    };
    let instruction = Instruction::decode(word).map_err(|source| Error::Decode { pc, source })?;
    trace!(%pc, %instruction);

    let control = match instruction {
      Instruction::ConditionalMove { a, b, c } => conditional_move(self, a, b, c),
      Instruction::SegmentedLoad { a, b, c } => segmented_load(self, a, b, c)?,
      Instruction::SegmentedStore { a, b, c } => segmented_store(self, a, b, c)?,
      Instruction::Add { a, b, c } => add(self, a, b, c),
      Instruction::Multiply { a, b, c } => multiply(self, a, b, c),
      Instruction::Divide { a, b, c } => divide(self, a, b, c)?,
      Instruction::Nand { a, b, c } => nand(self, a, b, c),
      Instruction::Halt => Control::Halt,
      Instruction::MapSegment { b, c } => map_segment(self, b, c)?,
      Instruction::UnmapSegment { c } => unmap_segment(self, c)?,
      Instruction::Output { c } => output(self, c)?,
      Instruction::Input { c } => input(self, c)?,
      Instruction::LoadProgram { b, c } => load_program(self, b, c)?,
      Instruction::LoadValue { a, value } => load_value(self, a, value),
    };
    self.vm.steps += 1;

    match control {
      Control::Next => self.vm.pc.offset = pc.offset.wrapping_add(1),
      Control::Jump(target) => self.vm.pc = target,
      Control::Halt => self.vm.state = State::Halted(Exit::Halt),
    }
    Ok(())
  }

  #[inline]
  fn reg(&self, id: RegisterId) -> Word {
    self.vm.registers[id]
  }

  #[inline]
  fn set_reg(&mut self, id: RegisterId, value: Word) {
    self.vm.registers[id] = value;
  }
}

fn memory_fault(pc: Pc) -> impl FnOnce(memory::Error) -> Error {
  move |source| Error::Memory { pc, source }
}

// if r[c] ≠ 0 : r[a] ← r[b]
fn conditional_move<D>(task: &mut Task<'_, '_, D>, a: RegisterId, b: RegisterId, c: RegisterId) -> Control
where
  D: Device,
{
  if task.reg(c) != 0 {
    task.set_reg(a, task.reg(b));
  }
  Control::Next
}

// r[a] ← m[r[b]][r[c]]
fn segmented_load<D>(
  task: &mut Task<'_, '_, D>,
  a: RegisterId,
  b: RegisterId,
  c: RegisterId,
) -> Result<Control, Error>
where
  D: Device,
{
  let value = task
    .vm
    .memory
    .read(task.reg(b), task.reg(c))
    .map_err(memory_fault(task.vm.pc))?;
  task.set_reg(a, value);
  Ok(Control::Next)
}

// m[r[a]][r[b]] ← r[c]
fn segmented_store<D>(
  task: &mut Task<'_, '_, D>,
  a: RegisterId,
  b: RegisterId,
  c: RegisterId,
) -> Result<Control, Error>
where
  D: Device,
{
  let (segment, offset, value) = (task.reg(a), task.reg(b), task.reg(c));
  let fault = memory_fault(task.vm.pc);
  task.vm.memory.write(segment, offset, value).map_err(fault)?;
  Ok(Control::Next)
}

// r[a] ← (r[b] + r[c]) mod 2³²
fn add<D>(task: &mut Task<'_, '_, D>, a: RegisterId, b: RegisterId, c: RegisterId) -> Control
where
  D: Device,
{
  task.set_reg(a, task.reg(b).wrapping_add(task.reg(c)));
  Control::Next
}

// r[a] ← (r[b] × r[c]) mod 2³²
fn multiply<D>(task: &mut Task<'_, '_, D>, a: RegisterId, b: RegisterId, c: RegisterId) -> Control
where
  D: Device,
{
  task.set_reg(a, task.reg(b).wrapping_mul(task.reg(c)));
  Control::Next
}

// r[a] ← ⌊r[b] ÷ r[c]⌋
fn divide<D>(task: &mut Task<'_, '_, D>, a: RegisterId, b: RegisterId, c: RegisterId) -> Result<Control, Error>
where
  D: Device,
{
  let quotient = task
    .reg(b)
    .checked_div(task.reg(c))
    .ok_or(Error::DivideByZero { pc: task.vm.pc })?;
  task.set_reg(a, quotient);
  Ok(Control::Next)
}

// r[a] ← ¬(r[b] ∧ r[c])
fn nand<D>(task: &mut Task<'_, '_, D>, a: RegisterId, b: RegisterId, c: RegisterId) -> Control
where
  D: Device,
{
  task.set_reg(a, !(task.reg(b) & task.reg(c)));
  Control::Next
}

// r[b] ← map(r[c])
fn map_segment<D>(task: &mut Task<'_, '_, D>, b: RegisterId, c: RegisterId) -> Result<Control, Error>
where
  D: Device,
{
  let size = task.reg(c) as usize;
  let fault = memory_fault(task.vm.pc);
  let handle = task.vm.memory.allocate(size).map_err(fault)?;
  task.set_reg(b, handle);
  Ok(Control::Next)
}

// unmap(r[c])
fn unmap_segment<D>(task: &mut Task<'_, '_, D>, c: RegisterId) -> Result<Control, Error>
where
  D: Device,
{
  let handle = task.reg(c);
  let fault = memory_fault(task.vm.pc);
  task.vm.memory.free(handle).map_err(fault)?;
  Ok(Control::Next)
}

// out ← r[c]
fn output<D>(task: &mut Task<'_, '_, D>, c: RegisterId) -> Result<Control, Error>
where
  D: Device,
{
  let value = task.reg(c);
  let byte = u8::try_from(value).map_err(|_| Error::OutputOutOfRange {
    pc: task.vm.pc,
    value,
  })?;
  task.device.write_byte(byte)?;
  Ok(Control::Next)
}

// r[c] ← in, or all ones at end of input
fn input<D>(task: &mut Task<'_, '_, D>, c: RegisterId) -> Result<Control, Error>
where
  D: Device,
{
  let value = match task.device.read_byte()? {
    Some(byte) => byte.into(),
    None => Word::MAX,
  };
  task.set_reg(c, value);
  Ok(Control::Next)
}

// if r[b] ≠ 0 : m[0] ← m[r[b]] ; pc ← (0, r[c])
fn load_program<D>(task: &mut Task<'_, '_, D>, b: RegisterId, c: RegisterId) -> Result<Control, Error>
where
  D: Device,
{
  let (source, target) = (task.reg(b), task.reg(c));
  let fault = memory_fault(task.vm.pc);
  // the jump must land inside the program about to run
  let len = task.vm.memory.segment_len(source).map_err(fault)?;
  if target as usize >= len {
    return Err(Error::Memory {
      pc: task.vm.pc,
      source: memory::Error::OutOfBounds {
        handle: PROGRAM,
        offset: target,
        len,
      },
    });
  }
  if source != PROGRAM {
    let fault = memory_fault(task.vm.pc);
    task.vm.memory.duplicate_into_zero(source).map_err(fault)?;
  }
  Ok(Control::Jump(Pc::new(PROGRAM, target)))
}

// r[a] ← vvvvvvv
fn load_value<D>(task: &mut Task<'_, '_, D>, a: RegisterId, value: Word) -> Control
where
  D: Device,
{
  task.set_reg(a, value);
  Control::Next
}
