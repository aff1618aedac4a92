//! The machine's byte-wide I/O device.

use std::io::{self, BufWriter, ErrorKind, Read, Stdin, Stdout, Write};

/// Byte-at-a-time input and output, as seen by the `in` and `out`
/// instructions.
pub trait Device {
  /// Read one byte, or `None` at end of input.
  fn read_byte(&mut self) -> io::Result<Option<u8>>;

  fn write_byte(&mut self, byte: u8) -> io::Result<()>;

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// A device over any reader/writer pair.
///
/// Output is flushed before every read so a prompt is visible before the
/// program blocks on input.
#[derive(Debug)]
pub struct Console<R, W: Write> {
  input: R,
  output: W,
}

impl Console<Stdin, BufWriter<Stdout>> {
  /// The process's standard streams.
  pub fn stdio() -> Self {
    Self::new(io::stdin(), BufWriter::new(io::stdout()))
  }
}

impl<R, W: Write> Console<R, W> {
  pub fn new(input: R, output: W) -> Self {
    Self { input, output }
  }

  pub fn output(&self) -> &W {
    &self.output
  }

  pub fn into_output(self) -> W {
    self.output
  }
}

impl<R: Read, W: Write> Device for Console<R, W> {
  fn read_byte(&mut self) -> io::Result<Option<u8>> {
    self.output.flush()?;
    let mut byte = [0u8; 1];
    loop {
      match self.input.read(&mut byte) {
        Ok(0) => return Ok(None),
        Ok(_) => return Ok(Some(byte[0])),
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      }
    }
  }

  fn write_byte(&mut self, byte: u8) -> io::Result<()> {
    self.output.write_all(&[byte])
  }

  fn flush(&mut self) -> io::Result<()> {
    self.output.flush()
  }
}
