use {crate::error::Error, tracing::debug};

/// Reassembles an oversize block delivered as fixed-size fragments.
///
/// This runs beside the reliable channel, not inside it: blocks above the
/// small-block ceiling are fragmented by the peer and each fragment is acked
/// individually. The block buffer and the fragment bitmap are allocated once
/// at construction; [`clear`](FragmentReceiver::clear) resets for the next
/// block without reallocating.
pub struct FragmentReceiver {
  fragment_size: usize,
  max_block_size: usize,
  max_fragments: usize,
  /// Fixed by the first accepted fragment; 0 until then.
  block_size: usize,
  /// Fixed by the first accepted fragment; 0 until then.
  num_fragments: usize,
  num_received: usize,
  received: Vec<bool>,
  data: Vec<u8>,
  failed: bool,
}

impl FragmentReceiver {
  pub fn new(fragment_size: usize, max_block_size: usize) -> Self {
    assert!(fragment_size > 0);
    assert!(max_block_size > 0);
    let max_fragments = (max_block_size + fragment_size - 1) / fragment_size;
    Self {
      fragment_size,
      max_block_size,
      max_fragments,
      block_size: 0,
      num_fragments: 0,
      num_received: 0,
      received: vec![false; max_fragments],
      data: vec![0; max_block_size],
      failed: false,
    }
  }

  /// Reset for the next block, keeping the allocations.
  pub fn clear(&mut self) {
    self.block_size = 0;
    self.num_fragments = 0;
    self.num_received = 0;
    self.failed = false;
    self.received.iter_mut().for_each(|r| *r = false);
  }

  /// Feed one fragment.
  ///
  /// `Ok(Some(fragment_id))` means the fragment was well formed and should be
  /// acked, duplicates included, since the peer resends until it sees the
  /// ack. `Ok(None)` means the fragment disagreed with what this block has
  /// already established and was ignored. A block larger than the
  /// construction-time maximum latches [`Error::BlockTooLarge`]: the latching
  /// call and every later one fail until [`clear`](FragmentReceiver::clear).
  pub fn process_fragment(
    &mut self,
    block_size: usize,
    num_fragments: usize,
    fragment_id: usize,
    payload: &[u8],
  ) -> Result<Option<usize>, Error> {
    if block_size > self.max_block_size {
      debug!(
        "block of {} bytes exceeds the {} byte maximum",
        block_size, self.max_block_size
      );
      self.failed = true;
    }
    if self.failed {
      return Err(Error::BlockTooLarge);
    }

    if self.block_size == 0 {
      self.block_size = block_size;
    }
    if self.block_size != block_size {
      return Ok(None);
    }

    if self.num_fragments == 0 {
      if num_fragments == 0 || num_fragments > self.max_fragments {
        return Ok(None);
      }
      self.num_fragments = num_fragments;
    }
    if self.num_fragments != num_fragments {
      return Ok(None);
    }

    if fragment_id >= self.num_fragments {
      return Ok(None);
    }

    let start = fragment_id * self.fragment_size;
    if start + payload.len() > self.block_size {
      return Ok(None);
    }

    // ack-worthy from here on; bytes commit only on first arrival
    if !self.received[fragment_id] {
      self.received[fragment_id] = true;
      self.num_received += 1;
      self.data[start..start + payload.len()].copy_from_slice(payload);

      if self.is_complete() {
        debug!(
          "block complete: {} bytes in {} fragments",
          self.block_size, self.num_fragments
        );
      }
    }
    Ok(Some(fragment_id))
  }

  pub fn is_complete(&self) -> bool {
    self.num_fragments > 0 && self.num_received == self.num_fragments
  }

  /// The reassembled block, once every fragment is in.
  pub fn block(&self) -> Option<&[u8]> {
    if self.is_complete() && self.block_size > 0 {
      Some(&self.data[..self.block_size])
    } else {
      None
    }
  }
}
