use {crate::codec, thiserror::Error};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// The send queue has no free slot for the next message id. The caller
  /// should have checked `can_send` first; channel state is unchanged.
  #[error("message send queue overflow")]
  SendQueueOverflow,
  /// The transport delivered a message id beyond the receive window. With a
  /// shared configuration on both ends this cannot happen; treat it as a
  /// protocol violation and tear the connection down.
  #[error("received early message")]
  EarlyMessage,
  /// A message serialized to more than the configured `max_message_size`.
  #[error("message exceeds maximum serialized size")]
  MessageTooLarge,
  /// A block exceeds the small-block ceiling.
  #[error("block too large")]
  BlockTooLarge,
  #[error("decode error: {0}")]
  Codec(#[from] codec::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
