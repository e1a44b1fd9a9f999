/// Wrap-aware ordering on 16-bit sequence numbers.
///
/// `a` is less than `b` iff `a` is at most half the sequence space behind it.
#[inline]
pub fn less_than(a: u16, b: u16) -> bool {
  (a.wrapping_sub(b) as i16) < 0
}

#[inline]
pub fn greater_than(a: u16, b: u16) -> bool {
  less_than(b, a)
}

struct Entry<T> {
  sequence: u16,
  occupied: bool,
  item: T,
}

impl<T: Default> Default for Entry<T> {
  fn default() -> Self {
    Self {
      sequence: 0,
      occupied: false,
      item: T::default(),
    }
  }
}

/// Fixed-capacity ring indexed by `sequence % capacity`.
///
/// Every slot carries the sequence it was stamped with: a non-empty slot may
/// belong to a different sequence that shares the modular index, so lookups
/// must compare stamps. All 65536 sequence values are legal, which rules out
/// a sentinel; occupancy is tracked explicitly instead.
pub struct Buffer<T: Default> {
  inner: Vec<Entry<T>>,
}

impl<T: Default> Buffer<T> {
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0);
    let mut inner = Vec::new();
    inner.resize_with(capacity, Default::default);
    Self { inner }
  }

  pub fn capacity(&self) -> usize {
    self.inner.len()
  }

  #[inline]
  fn entry(&self, sequence: u16) -> &Entry<T> {
    let index = sequence as usize % self.inner.len();
    &self.inner[index]
  }

  #[inline]
  fn entry_mut(&mut self, sequence: u16) -> &mut Entry<T> {
    let index = sequence as usize % self.inner.len();
    &mut self.inner[index]
  }

  /// Whether `insert(sequence, ..)` would succeed: the slot is empty, holds
  /// `sequence` itself, or holds a sequence older than every id that can still
  /// be live in a window ending at `sequence`. The newest same-slot occupant,
  /// `sequence - capacity`, may still be live and is never replaceable.
  pub fn available(&self, sequence: u16) -> bool {
    let entry = self.entry(sequence);
    !entry.occupied
      || entry.sequence == sequence
      || less_than(entry.sequence, sequence.wrapping_sub(self.inner.len() as u16))
  }

  /// Get the item at `sequence % capacity`, if the stamp matches.
  #[inline]
  pub fn get(&self, sequence: u16) -> Option<&T> {
    let entry = self.entry(sequence);
    if entry.occupied && entry.sequence == sequence {
      Some(&entry.item)
    } else {
      None
    }
  }

  /// Get the item at `sequence % capacity`, if the stamp matches.
  #[inline]
  pub fn get_mut(&mut self, sequence: u16) -> Option<&mut T> {
    let entry = self.entry_mut(sequence);
    if entry.occupied && entry.sequence == sequence {
      Some(&mut entry.item)
    } else {
      None
    }
  }

  /// Insert an item at `sequence % capacity`, overwriting the existing entry.
  /// Fails only when the slot holds a sequence that is still live.
  pub fn insert(&mut self, sequence: u16, item: T) -> bool {
    if !self.available(sequence) {
      return false;
    }
    let entry = self.entry_mut(sequence);
    entry.sequence = sequence;
    entry.occupied = true;
    entry.item = item;
    true
  }

  /// Reset the slot at `sequence % capacity` to the default item, stamp it,
  /// and return a handle. Unlike `insert` this never checks liveness.
  pub fn insert_default(&mut self, sequence: u16) -> &mut T {
    let entry = self.entry_mut(sequence);
    entry.sequence = sequence;
    entry.occupied = true;
    entry.item = T::default();
    &mut entry.item
  }

  /// Detach the item at `sequence` and clear the slot, if the stamp matches.
  pub fn take(&mut self, sequence: u16) -> Option<T> {
    let entry = self.entry_mut(sequence);
    if entry.occupied && entry.sequence == sequence {
      entry.occupied = false;
      Some(std::mem::take(&mut entry.item))
    } else {
      None
    }
  }
}
