use {
  bytes::{BufMut, Bytes, BytesMut},
  thiserror::Error,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("unexpected end of input")]
  UnexpectedEof,
  #[error("bounded integer exceeds {max}: {value}")]
  OutOfRange { value: u64, max: u32 },
  #[error("unknown message kind: {0}")]
  UnknownKind(u32),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Number of bits needed to encode an integer in `[min, max]`.
pub fn bits_required(min: u32, max: u32) -> u32 {
  debug_assert!(min <= max);
  if min == max {
    0
  } else {
    u32::BITS - (max - min).leading_zeros()
  }
}

#[inline]
fn mask(bits: u32) -> u64 {
  if bits == 32 {
    u32::MAX as u64
  } else {
    (1u64 << bits) - 1
  }
}

/// Sink for bit-level serialization.
///
/// Implemented by [`Writer`], which stores bits, and [`Measure`], which only
/// counts them. Message serialization is written once against this trait and
/// serves both the wire path and size prediction.
pub trait WriteStream {
  /// Append the low `bits` bits of `value`, LSB first.
  fn write_bits(&mut self, value: u32, bits: u32);

  /// Bits appended so far.
  fn bits_written(&self) -> usize;

  /// Append `value` as a bounded integer in `[min, max]`, consuming
  /// `bits_required(min, max)` bits.
  fn write_range(&mut self, value: u32, min: u32, max: u32) {
    debug_assert!(min <= value && value <= max);
    self.write_bits(value - min, bits_required(min, max));
  }

  fn write_bytes(&mut self, bytes: &[u8]) {
    for &byte in bytes {
      self.write_bits(byte as u32, 8);
    }
  }
}

/// Bit writer backed by a growable byte buffer.
///
/// Bits accumulate in a 64-bit scratch and spill into the buffer one byte at
/// a time; `finish` pads the trailing partial byte with zeros.
pub struct Writer {
  buffer: BytesMut,
  scratch: u64,
  scratch_bits: u32,
}

impl Writer {
  pub fn new() -> Self {
    Self {
      buffer: BytesMut::new(),
      scratch: 0,
      scratch_bits: 0,
    }
  }

  pub fn with_capacity(bytes: usize) -> Self {
    Self {
      buffer: BytesMut::with_capacity(bytes),
      scratch: 0,
      scratch_bits: 0,
    }
  }

  pub fn finish(mut self) -> Bytes {
    if self.scratch_bits > 0 {
      // scratch_bits < 8 here, the write loop drains whole bytes eagerly
      self.buffer.put_u8(self.scratch as u8);
    }
    self.buffer.freeze()
  }
}

impl Default for Writer {
  fn default() -> Self {
    Self::new()
  }
}

impl WriteStream for Writer {
  fn write_bits(&mut self, value: u32, bits: u32) {
    debug_assert!(bits <= 32);
    debug_assert!(bits == 32 || (value as u64) < (1u64 << bits));
    if bits == 0 {
      return;
    }
    self.scratch |= (value as u64) << self.scratch_bits;
    self.scratch_bits += bits;
    while self.scratch_bits >= 8 {
      self.buffer.put_u8(self.scratch as u8);
      self.scratch >>= 8;
      self.scratch_bits -= 8;
    }
  }

  fn bits_written(&self) -> usize {
    self.buffer.len() * 8 + self.scratch_bits as usize
  }
}

/// Advances a bit counter without storing anything.
///
/// Running a message through this predicts its serialized size exactly, which
/// lets packet assembly respect a byte budget without re-serializing.
#[derive(Default)]
pub struct Measure {
  bits: usize,
}

impl Measure {
  pub fn new() -> Self {
    Self::default()
  }
}

impl WriteStream for Measure {
  fn write_bits(&mut self, _value: u32, bits: u32) {
    debug_assert!(bits <= 32);
    self.bits += bits as usize;
  }

  fn bits_written(&self) -> usize {
    self.bits
  }

  fn write_bytes(&mut self, bytes: &[u8]) {
    self.bits += bytes.len() * 8;
  }
}

/// Bit reader over a byte slice, the fallible mirror of [`Writer`].
pub struct Reader<'a> {
  buffer: &'a [u8],
  cursor: usize,
  scratch: u64,
  scratch_bits: u32,
}

impl<'a> Reader<'a> {
  pub fn new(buffer: &'a [u8]) -> Self {
    Self {
      buffer,
      cursor: 0,
      scratch: 0,
      scratch_bits: 0,
    }
  }

  pub fn read_bits(&mut self, bits: u32) -> Result<u32> {
    debug_assert!(bits <= 32);
    if bits == 0 {
      return Ok(0);
    }
    while self.scratch_bits < bits {
      let byte = *self.buffer.get(self.cursor).ok_or(Error::UnexpectedEof)?;
      self.scratch |= (byte as u64) << self.scratch_bits;
      self.scratch_bits += 8;
      self.cursor += 1;
    }
    let value = (self.scratch & mask(bits)) as u32;
    self.scratch >>= bits;
    self.scratch_bits -= bits;
    Ok(value)
  }

  pub fn read_range(&mut self, min: u32, max: u32) -> Result<u32> {
    let raw = self.read_bits(bits_required(min, max))?;
    let value = min as u64 + raw as u64;
    if value > max as u64 {
      return Err(Error::OutOfRange { value, max });
    }
    Ok(value as u32)
  }

  pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
    for byte in dst {
      *byte = self.read_bits(8)? as u8;
    }
    Ok(())
  }

  pub fn bits_read(&self) -> usize {
    self.cursor * 8 - self.scratch_bits as usize
  }
}

#[cfg(test)]
mod tests {
  use {super::*, pretty_assertions::assert_eq};

  #[test]
  fn bits_for_ranges() {
    assert_eq!(bits_required(0, 0), 0);
    assert_eq!(bits_required(0, 1), 1);
    assert_eq!(bits_required(0, 2), 2);
    assert_eq!(bits_required(0, 3), 2);
    assert_eq!(bits_required(0, 4), 3);
    assert_eq!(bits_required(0, 32), 6);
    assert_eq!(bits_required(0, 255), 8);
    assert_eq!(bits_required(0, 256), 9);
    assert_eq!(bits_required(0, u32::MAX), 32);
    assert_eq!(bits_required(100, 103), 2);
  }

  #[test]
  fn round_trip_unaligned() {
    let mut writer = Writer::new();
    writer.write_bits(0b101, 3);
    writer.write_bits(0x3FF, 10);
    writer.write_bits(0, 1);
    writer.write_bits(0xDEADBEEF, 32);
    writer.write_range(17, 10, 40);
    assert_eq!(writer.bits_written(), 3 + 10 + 1 + 32 + 5);
    let bytes = writer.finish();
    // padded up to the next whole byte
    assert_eq!(bytes.len(), (3 + 10 + 1 + 32 + 5 + 7) / 8);

    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_bits(3).unwrap(), 0b101);
    assert_eq!(reader.read_bits(10).unwrap(), 0x3FF);
    assert_eq!(reader.read_bits(1).unwrap(), 0);
    assert_eq!(reader.read_bits(32).unwrap(), 0xDEADBEEF);
    assert_eq!(reader.read_range(10, 40).unwrap(), 17);
    assert_eq!(reader.bits_read(), 3 + 10 + 1 + 32 + 5);
  }

  #[test]
  fn round_trip_bytes() {
    let payload = [1u8, 2, 3, 255];

    let mut writer = Writer::new();
    // a bit first, so the byte copy is not byte-aligned
    writer.write_bits(1, 1);
    writer.write_bytes(&payload);
    let bytes = writer.finish();

    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_bits(1).unwrap(), 1);
    let mut out = [0u8; 4];
    reader.read_bytes(&mut out).unwrap();
    assert_eq!(out, payload);
  }

  #[test]
  fn measure_matches_writer() {
    let mut writer = Writer::new();
    let mut measure = Measure::new();
    for stream in [&mut writer as &mut dyn WriteStream, &mut measure] {
      stream.write_bits(7, 3);
      stream.write_range(2, 0, 5);
      stream.write_bytes(&[0xAB; 9]);
    }
    assert_eq!(measure.bits_written(), writer.bits_written());
    assert_eq!(measure.bits_written(), 3 + 3 + 72);
  }

  #[test]
  fn zero_width_range() {
    // a [min, max] range with min == max consumes no bits at all
    let mut writer = Writer::new();
    writer.write_range(9, 9, 9);
    assert_eq!(writer.bits_written(), 0);
    let bytes = writer.finish();
    assert_eq!(bytes.len(), 0);

    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_range(9, 9).unwrap(), 9);
  }

  #[test]
  fn reader_eof() {
    let bytes = [0xFFu8];
    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_bits(6).unwrap(), 0b111111);
    assert_eq!(reader.read_bits(3), Err(Error::UnexpectedEof));
  }

  #[test]
  fn range_rejects_out_of_bounds() {
    // [0, 2] takes 2 bits, so the raw value 3 is encodable but invalid
    let mut writer = Writer::new();
    writer.write_bits(3, 2);
    let bytes = writer.finish();

    let mut reader = Reader::new(&bytes);
    assert_eq!(
      reader.read_range(0, 2),
      Err(Error::OutOfRange { value: 3, max: 2 })
    );
  }
}
