use {
  crate::{
    channel::ChannelConfig,
    codec::{self, Reader, WriteStream, Writer},
    message::Message,
  },
  bytes::Bytes,
  std::rc::Rc,
};

/// The reliable payload of one outbound packet: an ordered batch of messages.
///
/// Self-describing on the wire: a bounded message count, then per message a
/// kind tag, a 16-bit id, and the message's own payload. Both ends must agree
/// on `max_messages_per_packet` and on the factory's tag enumeration, since
/// those fix the field widths.
///
/// Messages are shared with the sender's queue, not cloned; the queue keeps
/// them alive until the carrying packet is acked.
#[derive(Default, Clone)]
pub struct ChannelData {
  pub messages: Vec<Rc<dyn Message>>,
}

impl std::fmt::Debug for ChannelData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChannelData")
      .field("messages", &self.messages.len())
      .finish()
  }
}

impl ChannelData {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn write(&self, stream: &mut dyn WriteStream, config: &ChannelConfig) {
    debug_assert!(self.messages.len() <= config.max_messages_per_packet);
    stream.write_range(
      self.messages.len() as u32,
      0,
      config.max_messages_per_packet as u32,
    );
    let max_kind = config.factory.max_kind();
    for message in &self.messages {
      stream.write_range(message.kind(), 0, max_kind);
      stream.write_bits(message.id() as u32, 16);
      message.write(stream);
    }
  }

  /// Decode a batch, constructing each message through the factory.
  ///
  /// Any failure discards the whole batch before it reaches the channel, so a
  /// corrupt packet never leaves partial state behind.
  pub fn read(reader: &mut Reader<'_>, config: &ChannelConfig) -> codec::Result<Self> {
    let count = reader.read_range(0, config.max_messages_per_packet as u32)?;
    let max_kind = config.factory.max_kind();
    let mut messages: Vec<Rc<dyn Message>> = Vec::with_capacity(count as usize);
    for _ in 0..count {
      let kind = reader.read_range(0, max_kind)?;
      let mut message = config
        .factory
        .create(kind)
        .ok_or(codec::Error::UnknownKind(kind))?;
      let id = reader.read_bits(16)? as u16;
      message.set_id(id);
      message.read(reader)?;
      messages.push(Rc::from(message));
    }
    Ok(Self { messages })
  }

  pub fn to_bytes(&self, config: &ChannelConfig) -> Bytes {
    let mut writer = Writer::with_capacity(config.packet_budget);
    self.write(&mut writer, config);
    writer.finish()
  }

  pub fn from_bytes(bytes: &[u8], config: &ChannelConfig) -> codec::Result<Self> {
    Self::read(&mut Reader::new(bytes), config)
  }
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    crate::{
      channel::ChannelConfig,
      codec::{Writer, WriteStream},
      message::{BlockMessage, MessageFactory},
      testing::{TestFactory, TestMessage},
    },
    pretty_assertions::assert_eq,
  };

  fn config() -> ChannelConfig {
    ChannelConfig::new(Rc::new(TestFactory))
  }

  fn message(value: u32, tag: u8, id: u16) -> Rc<dyn Message> {
    let mut message = TestMessage::new(value, tag);
    message.set_id(id);
    Rc::new(message)
  }

  #[test]
  fn round_trip_mixed_batch() {
    let config = config();

    let mut block = BlockMessage::new(vec![1, 2, 3]);
    block.set_id(2);

    let data = ChannelData {
      messages: vec![message(0xAABBCCDD, 7, 0), message(42, 0, 1), Rc::new(block)],
    };
    let bytes = data.to_bytes(&config);

    let out = ChannelData::from_bytes(&bytes, &config).unwrap();
    assert_eq!(out.messages.len(), 3);

    let first = out.messages[0]
      .as_any()
      .downcast_ref::<TestMessage>()
      .unwrap();
    assert_eq!(out.messages[0].id(), 0);
    assert_eq!((first.value, first.tag), (0xAABBCCDD, 7));

    let second = out.messages[1]
      .as_any()
      .downcast_ref::<TestMessage>()
      .unwrap();
    assert_eq!(out.messages[1].id(), 1);
    assert_eq!((second.value, second.tag), (42, 0));

    let third = out.messages[2]
      .as_any()
      .downcast_ref::<BlockMessage>()
      .unwrap();
    assert_eq!(out.messages[2].id(), 2);
    assert_eq!(third.block(), &[1, 2, 3]);
  }

  #[test]
  fn empty_batch_round_trip() {
    let config = config();

    let data = ChannelData::new();
    let bytes = data.to_bytes(&config);
    // just the count field, padded to one byte
    assert_eq!(bytes.len(), 1);

    let out = ChannelData::from_bytes(&bytes, &config).unwrap();
    assert!(out.messages.is_empty());
  }

  #[test]
  fn truncated_packet_fails() {
    let config = config();

    let data = ChannelData {
      messages: vec![message(1, 1, 0), message(2, 2, 1)],
    };
    let bytes = data.to_bytes(&config);

    let err = ChannelData::from_bytes(&bytes[..bytes.len() - 2], &config).unwrap_err();
    assert_eq!(err, codec::Error::UnexpectedEof);
  }

  #[test]
  fn count_beyond_maximum_fails() {
    let config = config();

    // the count field is 6 bits wide for a 32-message cap, so 33 is
    // encodable but invalid
    let mut writer = Writer::new();
    writer.write_bits(33, 6);
    let bytes = writer.finish();

    let err = ChannelData::from_bytes(&bytes, &config).unwrap_err();
    assert_eq!(err, codec::Error::OutOfRange { value: 33, max: 32 });
  }

  #[test]
  fn unknown_kind_fails() {
    // a factory that reserves tag space it cannot construct
    struct SparseFactory;
    impl MessageFactory for SparseFactory {
      fn max_kind(&self) -> u32 {
        3
      }
      fn create(&self, kind: u32) -> Option<Box<dyn Message>> {
        TestFactory.create(kind)
      }
    }

    let mut config = ChannelConfig::new(Rc::new(SparseFactory));
    config.max_messages_per_packet = 32;

    let mut writer = Writer::new();
    writer.write_range(1, 0, 32);
    writer.write_range(2, 0, 3);
    writer.write_bits(0, 16);
    let bytes = writer.finish();

    let err = ChannelData::from_bytes(&bytes, &config).unwrap_err();
    assert_eq!(err, codec::Error::UnknownKind(2));
  }
}
