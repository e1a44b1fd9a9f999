use {
  crate::codec::{self, Reader, WriteStream},
  std::any::Any,
};

/// Ceiling on the length of a block carried as a single message. Channel
/// configurations may lower this per connection but never raise it, since it
/// fixes the wire width of the block length field.
pub const MAX_SMALL_BLOCK_SIZE: usize = 256;

/// A single application message moving through the reliable channel.
///
/// Messages are immutable once enqueued: the channel measures their
/// serialized size exactly once, at enqueue time.
pub trait Message {
  /// Wire tag for this message, in `[0, factory.max_kind()]`.
  fn kind(&self) -> u32;

  fn id(&self) -> u16;
  fn set_id(&mut self, id: u16);

  /// Serialize the payload. Runs against both the storing and the measuring
  /// stream, so it must be deterministic.
  fn write(&self, stream: &mut dyn WriteStream);

  /// Deserialize the payload into a factory-fresh instance.
  fn read(&mut self, reader: &mut Reader<'_>) -> codec::Result<()>;

  /// Escape hatch for recovering the concrete type after delivery.
  fn as_any(&self) -> &dyn Any;
}

/// Constructs fresh messages on the receive path.
///
/// Both ends of a connection must agree on the tag enumeration: `max_kind`
/// fixes the wire width of the tag field. Tag `0` is reserved for
/// [`BlockMessage`] by convention; factories that never carry blocks may
/// return `None` for it.
pub trait MessageFactory {
  /// Highest wire tag this factory can produce.
  fn max_kind(&self) -> u32;

  /// Construct an empty message for `kind`, or `None` for unknown tags.
  fn create(&self, kind: u32) -> Option<Box<dyn Message>>;
}

/// Adapter that carries a small opaque byte block as one reliable message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockMessage {
  id: u16,
  block: Vec<u8>,
}

impl BlockMessage {
  /// Wire tag reserved for block messages.
  pub const KIND: u32 = 0;

  pub fn new(block: Vec<u8>) -> Self {
    debug_assert!(block.len() <= MAX_SMALL_BLOCK_SIZE);
    Self { id: 0, block }
  }

  pub fn block(&self) -> &[u8] {
    &self.block
  }

  pub fn into_block(self) -> Vec<u8> {
    self.block
  }
}

impl Message for BlockMessage {
  fn kind(&self) -> u32 {
    Self::KIND
  }

  fn id(&self) -> u16 {
    self.id
  }

  fn set_id(&mut self, id: u16) {
    self.id = id;
  }

  fn write(&self, stream: &mut dyn WriteStream) {
    stream.write_range(self.block.len() as u32, 0, MAX_SMALL_BLOCK_SIZE as u32);
    stream.write_bytes(&self.block);
  }

  fn read(&mut self, reader: &mut Reader<'_>) -> codec::Result<()> {
    let len = reader.read_range(0, MAX_SMALL_BLOCK_SIZE as u32)? as usize;
    self.block = vec![0; len];
    reader.read_bytes(&mut self.block)
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}
