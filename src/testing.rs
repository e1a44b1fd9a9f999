//! Shared fixtures for unit tests: a tiny message vocabulary and a factory
//! over it.

use {
  crate::{
    channel::ChannelConfig,
    codec::{self, Reader, WriteStream},
    message::{BlockMessage, Message, MessageFactory},
  },
  std::{any::Any, rc::Rc},
};

/// Fixed-size test message: 40 payload bits on the wire.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TestMessage {
  id: u16,
  pub value: u32,
  pub tag: u8,
}

impl TestMessage {
  pub const KIND: u32 = 1;

  pub fn new(value: u32, tag: u8) -> Self {
    Self { id: 0, value, tag }
  }
}

impl Message for TestMessage {
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
    stream.write_bits(self.value, 32);
    stream.write_bits(self.tag as u32, 8);
  }

  fn read(&mut self, reader: &mut Reader<'_>) -> codec::Result<()> {
    self.value = reader.read_bits(32)?;
    self.tag = reader.read_bits(8)? as u8;
    Ok(())
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

pub struct TestFactory;

impl MessageFactory for TestFactory {
  fn max_kind(&self) -> u32 {
    TestMessage::KIND
  }

  fn create(&self, kind: u32) -> Option<Box<dyn Message>> {
    match kind {
      BlockMessage::KIND => Some(Box::new(BlockMessage::default())),
      TestMessage::KIND => Some(Box::new(TestMessage::default())),
      _ => None,
    }
  }
}

/// Default channel configuration over [`TestFactory`].
///
/// With two message kinds the tag field is 1 bit, so a [`TestMessage`] costs
/// 40 + 16 + 1 = 57 bits in a packet.
pub fn config() -> ChannelConfig {
  ChannelConfig::new(Rc::new(TestFactory))
}
