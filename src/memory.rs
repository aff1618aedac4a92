//! Segmented memory: an arena of word buffers keyed by integer handle.
//!
//! Handles are handed out deterministically. Freed handles go into a sorted
//! pool and the lowest one is reused before a new handle is appended, so a
//! program that maps, unmaps and maps again sees the same number both times.

use std::collections::BTreeSet;

use tracing::debug;

use crate::Word;

/// Identifies a segment from `allocate` until the matching `free`.
pub type Handle = u32;

/// The segment instructions are fetched from. Mapped for the life of the
/// machine.
pub const PROGRAM: Handle = 0;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("segment {0} is not mapped")]
  Unmapped(Handle),

  #[error("offset {offset} is outside segment {handle} of {len} words")]
  OutOfBounds { handle: Handle, offset: u32, len: usize },

  #[error("segment 0 cannot be unmapped")]
  UnmapZero,

  #[error("no segment handles left to allocate")]
  HandlesExhausted,

  #[error("cannot allocate a segment of {0} words")]
  OutOfMemory(usize),
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
  // `None` marks an unmapped handle; its number is also in `free`
  segments: Vec<Option<Box<[Word]>>>,
  free: BTreeSet<Handle>,
}

impl Memory {
  /// Create memory whose program segment holds `size` zeroed words.
  pub fn new(size: usize) -> Self {
    Self {
      segments: vec![Some(vec![0; size].into_boxed_slice())],
      free: BTreeSet::new(),
    }
  }

  /// Create memory whose program segment is a copy of `words`.
  pub fn from_words(words: &[Word]) -> Self {
    Self {
      segments: vec![Some(Box::from(words))],
      free: BTreeSet::new(),
    }
  }

  /// Map a new zeroed segment of `size` words, returning its handle.
  ///
  /// A size the host cannot back fails with [`Error::OutOfMemory`] instead
  /// of aborting.
  pub fn allocate(&mut self, size: usize) -> Result<Handle, Error> {
    let segment = Some(zeroed(size)?);
    let handle = match self.free.pop_first() {
      Some(handle) => {
        self.segments[handle as usize] = segment;
        handle
      }
      None => {
        let handle = Handle::try_from(self.segments.len()).map_err(|_| Error::HandlesExhausted)?;
        self.segments.push(segment);
        handle
      }
    };
    debug!(handle, size, "mapped segment");
    Ok(handle)
  }

  /// Unmap `handle` and release its storage; the handle becomes reusable.
  pub fn free(&mut self, handle: Handle) -> Result<(), Error> {
    if handle == PROGRAM {
      return Err(Error::UnmapZero);
    }
    let slot = self
      .segments
      .get_mut(handle as usize)
      .ok_or(Error::Unmapped(handle))?;
    if slot.take().is_none() {
      return Err(Error::Unmapped(handle));
    }
    self.free.insert(handle);
    debug!(handle, "unmapped segment");
    Ok(())
  }

  /// Borrow the words of a mapped segment.
  pub fn segment(&self, handle: Handle) -> Result<&[Word], Error> {
    self
      .segments
      .get(handle as usize)
      .and_then(|slot| slot.as_deref())
      .ok_or(Error::Unmapped(handle))
  }

  fn segment_mut(&mut self, handle: Handle) -> Result<&mut [Word], Error> {
    self
      .segments
      .get_mut(handle as usize)
      .and_then(|slot| slot.as_deref_mut())
      .ok_or(Error::Unmapped(handle))
  }

  pub fn segment_len(&self, handle: Handle) -> Result<usize, Error> {
    self.segment(handle).map(<[Word]>::len)
  }

  /// Whether `handle` currently names a live segment.
  pub fn mapped(&self, handle: Handle) -> bool {
    self.segment(handle).is_ok()
  }

  /// Number of live segments, the program segment included.
  pub fn mapped_count(&self) -> usize {
    self.segments.len() - self.free.len()
  }

  pub fn read(&self, handle: Handle, offset: u32) -> Result<Word, Error> {
    let segment = self.segment(handle)?;
    segment
      .get(offset as usize)
      .copied()
      .ok_or(Error::OutOfBounds {
        handle,
        offset,
        len: segment.len(),
      })
  }

  pub fn write(&mut self, handle: Handle, offset: u32, word: Word) -> Result<(), Error> {
    let segment = self.segment_mut(handle)?;
    let len = segment.len();
    let cell = segment
      .get_mut(offset as usize)
      .ok_or(Error::OutOfBounds {
        handle,
        offset,
        len,
      })?;
    *cell = word;
    Ok(())
  }

  /// Replace the program segment with a copy of segment `handle`.
  ///
  /// Duplicating the program segment onto itself changes nothing.
  pub fn duplicate_into_zero(&mut self, handle: Handle) -> Result<(), Error> {
    if handle == PROGRAM {
      return Ok(());
    }
    let copy = Box::<[Word]>::from(self.segment(handle)?);
    debug!(handle, len = copy.len(), "loading program from segment");
    self.segments[PROGRAM as usize] = Some(copy);
    Ok(())
  }
}

fn zeroed(size: usize) -> Result<Box<[Word]>, Error> {
  let mut words = Vec::new();
  words
    .try_reserve_exact(size)
    .map_err(|_| Error::OutOfMemory(size))?;
  words.resize(size, 0);
  Ok(words.into_boxed_slice())
}
