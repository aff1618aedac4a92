//! Program images and the regions a machine boots from.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::bitpack;
use crate::Word;

/// Bytes per instruction word in an image file.
pub const WORD_BYTES: usize = 4;

/// A region of instruction words that a machine may load into its program
/// segment
pub trait Region {
  fn words(&self) -> &[Word];
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
  #[error("program image is empty")]
  Empty,

  #[error("program image is {0} bytes, not a multiple of 4")]
  Misaligned(usize),

  #[error("failed to read program image")]
  Io(#[from] io::Error),

  #[error(transparent)]
  Codec(#[from] bitpack::Error),
}

/// A validated program image: big-endian 32-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
  words: Vec<Word>,
}

impl Image {
  /// Pack `bytes`, most significant byte first, into words.
  ///
  /// The length must be a positive multiple of four; anything else is
  /// rejected rather than padded.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
    if bytes.is_empty() {
      return Err(LoadError::Empty);
    }
    if bytes.len() % WORD_BYTES != 0 {
      return Err(LoadError::Misaligned(bytes.len()));
    }
    let words = bytes
      .chunks_exact(WORD_BYTES)
      .map(pack_word)
      .collect::<Result<_, _>>()?;
    Ok(Self { words })
  }

  pub fn read_from<R: Read>(mut reader: R) -> Result<Self, LoadError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Self::from_bytes(&bytes)
  }

  pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
    Self::read_from(File::open(path)?)
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  /// Serialise back into the on-disk byte layout.
  pub fn to_bytes(&self) -> Vec<u8> {
    self.words.iter().flat_map(|word| word.to_be_bytes()).collect()
  }
}

fn pack_word(group: &[u8]) -> Result<Word, bitpack::Error> {
  let mut word = 0u64;
  // first byte lands in the top 8 bits
  for (i, &byte) in group.iter().enumerate() {
    let lsb = (8 * (WORD_BYTES - 1 - i)) as u32;
    word = bitpack::set_unsigned(word, 8, lsb, byte.into())?;
  }
  Ok(word as Word)
}

impl From<Vec<Word>> for Image {
  fn from(words: Vec<Word>) -> Self {
    Self { words }
  }
}

impl Region for Image {
  fn words(&self) -> &[Word] {
    &self.words
  }
}
