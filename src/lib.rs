//! Reliable, ordered message delivery over an unreliable datagram transport.
//!
//! [`Channel`] accepts application messages, packs them into per-packet
//! batches under a byte budget, and retires them as the transport reports
//! acks for the packets that carried them. The receiving side hands every
//! message to the application exactly once, in send order, even when the
//! transport drops, duplicates, or reorders datagrams.
//!
//! The transport stays external: it assigns a 16-bit sequence number to each
//! outgoing packet, asks the channel for that packet's payload with
//! [`Channel::get_data`], feeds inbound payloads to
//! [`Channel::process_data`], and reports per-sequence acks to
//! [`Channel::process_ack`]. [`FragmentReceiver`] reassembles blocks too
//! large to ride the channel as messages; it is a sibling of the channel,
//! not a layer inside it.

pub mod channel;
pub mod codec;
pub mod data;
pub mod error;
pub mod fragment;
pub mod message;

mod seq;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{Channel, ChannelConfig, ChannelCounters};
pub use data::ChannelData;
pub use error::Error;
pub use fragment::FragmentReceiver;
pub use message::{BlockMessage, Message, MessageFactory, MAX_SMALL_BLOCK_SIZE};
