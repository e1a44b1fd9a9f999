use {
  crate::{
    codec::{bits_required, Measure, WriteStream},
    data::ChannelData,
    error::Error,
    message::{BlockMessage, Message, MessageFactory, MAX_SMALL_BLOCK_SIZE},
    seq::{self, Buffer},
  },
  std::{rc::Rc, time::Duration},
  tracing::{debug, trace},
};

pub struct ChannelConfig {
  /// Minimum delay between two sends of the same message, until it is acked.
  pub resend_rate: Duration,
  /// Send window capacity, in messages.
  pub send_queue_size: usize,
  /// Receive window capacity, in messages.
  pub receive_queue_size: usize,
  /// Sent-packet tracker capacity.
  pub sent_packets_size: usize,
  /// Hard cap on messages per assembled packet.
  pub max_messages_per_packet: usize,
  /// Per-message serialized payload ceiling, in bytes.
  pub max_message_size: usize,
  /// Per-channel small block ceiling, at most [`MAX_SMALL_BLOCK_SIZE`].
  pub max_small_block_size: usize,
  /// Default per-packet byte budget used by [`Channel::get_data`].
  pub packet_budget: usize,
  /// Stop gathering once fewer than this many budget bits remain; scanning
  /// further cannot fit any plausible message.
  pub give_up_bits: usize,
  pub factory: Rc<dyn MessageFactory>,
}

impl ChannelConfig {
  pub fn new(factory: Rc<dyn MessageFactory>) -> Self {
    Self {
      resend_rate: Duration::from_millis(100),
      send_queue_size: 1024,
      receive_queue_size: 256,
      sent_packets_size: 256,
      max_messages_per_packet: 32,
      max_message_size: 64,
      max_small_block_size: 64,
      packet_budget: 128,
      give_up_bits: 64,
      factory,
    }
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCounters {
  /// Messages accepted into the send queue.
  pub messages_sent: u64,
  /// Messages written into assembled packets, resends included.
  pub messages_written: u64,
  /// Messages seen by `process_data`, discards included.
  pub messages_read: u64,
  /// Messages handed to the application in order.
  pub messages_received: u64,
  pub messages_discarded_late: u64,
  pub messages_discarded_early: u64,
}

#[derive(Default)]
struct SendEntry {
  message: Option<Rc<dyn Message>>,
  /// Serialized size in bits, payload plus per-message overhead, cached at
  /// enqueue time.
  measured_bits: usize,
  /// `None` until the first send.
  last_sent: Option<Duration>,
}

#[derive(Default)]
struct SentPacketEntry {
  acked: bool,
  #[allow(dead_code)]
  time_sent: Duration,
  /// The batch this packet carried, for retirement on ack.
  message_ids: Vec<u16>,
}

#[derive(Default)]
struct ReceiveEntry {
  message: Option<Rc<dyn Message>>,
  #[allow(dead_code)]
  time_received: Duration,
}

/// Reliable, ordered message channel over an unreliable packet transport.
///
/// The transport is external: it assigns a 16-bit sequence number to every
/// outgoing packet, asks the channel for that packet's payload via
/// [`get_data`](Channel::get_data), delivers inbound payloads through
/// [`process_data`](Channel::process_data), and reports packet-level acks
/// through [`process_ack`](Channel::process_ack). The channel keeps its send
/// queue, receive queue, and sent-packet tracker as sliding windows over the
/// 16-bit sequence spaces. It is driven from a single thread; no operation
/// blocks.
pub struct Channel {
  config: ChannelConfig,
  time: Duration,
  /// Id assigned to the next enqueued message.
  next_send_id: u16,
  /// Id of the next message to hand to the application.
  next_receive_id: u16,
  send_queue: Buffer<SendEntry>,
  sent_packets: Buffer<SentPacketEntry>,
  receive_queue: Buffer<ReceiveEntry>,
  counters: ChannelCounters,
  /// Per-message wire overhead: 16 id bits plus the kind tag width.
  overhead_bits: usize,
  /// Measurement ceiling; block messages may exceed `max_message_size`.
  max_payload_bits: usize,
}

impl Channel {
  pub fn new(config: ChannelConfig) -> Self {
    assert!(config.max_small_block_size <= MAX_SMALL_BLOCK_SIZE);

    let overhead_bits = 16 + bits_required(0, config.factory.max_kind()) as usize;
    let block_ceiling_bits = config.max_small_block_size * 8
      + bits_required(0, MAX_SMALL_BLOCK_SIZE as u32) as usize;
    let max_payload_bits = std::cmp::max(config.max_message_size * 8, block_ceiling_bits);

    Self {
      time: Duration::ZERO,
      next_send_id: 0,
      next_receive_id: 0,
      send_queue: Buffer::new(config.send_queue_size),
      sent_packets: Buffer::new(config.sent_packets_size),
      receive_queue: Buffer::new(config.receive_queue_size),
      counters: ChannelCounters::default(),
      overhead_bits,
      max_payload_bits,
      config,
    }
  }

  pub fn config(&self) -> &ChannelConfig {
    &self.config
  }

  pub fn counters(&self) -> &ChannelCounters {
    &self.counters
  }

  /// Store the monotonic time that subsequent operations see as now.
  pub fn update(&mut self, now: Duration) {
    self.time = now;
  }

  /// Whether the send queue can admit another message. Callers must check
  /// this (or handle [`Error::SendQueueOverflow`]) before sending.
  pub fn can_send(&self) -> bool {
    self.send_queue.available(self.next_send_id)
  }

  /// Enqueue a message for reliable, ordered delivery.
  ///
  /// Assigns the next message id and caches the serialized size, so the
  /// message must not change after this call.
  pub fn send_message(&mut self, mut message: Box<dyn Message>) -> Result<(), Error> {
    if !self.can_send() {
      return Err(Error::SendQueueOverflow);
    }

    message.set_id(self.next_send_id);

    let mut measure = Measure::new();
    message.write(&mut measure);
    let payload_bits = measure.bits_written();
    if payload_bits > self.max_payload_bits {
      return Err(Error::MessageTooLarge);
    }

    let inserted = self.send_queue.insert(
      self.next_send_id,
      SendEntry {
        message: Some(Rc::from(message)),
        measured_bits: payload_bits + self.overhead_bits,
        last_sent: None,
      },
    );
    debug_assert!(inserted);

    trace!(
      "queued message {} for send: {} bits",
      self.next_send_id,
      payload_bits + self.overhead_bits
    );

    self.counters.messages_sent += 1;
    self.next_send_id = self.next_send_id.wrapping_add(1);
    Ok(())
  }

  /// Send a small opaque byte block as a single message.
  pub fn send_block(&mut self, block: Vec<u8>) -> Result<(), Error> {
    if block.len() > self.config.max_small_block_size {
      return Err(Error::BlockTooLarge);
    }
    self.send_message(Box::new(BlockMessage::new(block)))
  }

  /// The next in-order message, or `None` if it has not arrived yet.
  pub fn receive_message(&mut self) -> Option<Rc<dyn Message>> {
    let entry = self.receive_queue.take(self.next_receive_id)?;
    let message = entry
      .message
      .expect("occupied receive slot holds a message");
    debug_assert_eq!(message.id(), self.next_receive_id);

    self.counters.messages_received += 1;
    self.next_receive_id = self.next_receive_id.wrapping_add(1);
    Some(message)
  }

  /// Assemble the payload for the packet the transport is about to send
  /// under sequence number `sequence`, using the configured byte budget.
  ///
  /// Call at most once per packet sequence. Returns `None` when nothing is
  /// due to send or nothing fits.
  pub fn get_data(&mut self, sequence: u16) -> Option<ChannelData> {
    self.get_data_with_budget(sequence, self.config.packet_budget * 8)
  }

  /// Like [`get_data`](Channel::get_data), with an explicit bit budget for
  /// this one packet.
  pub fn get_data_with_budget(
    &mut self,
    sequence: u16,
    budget_bits: usize,
  ) -> Option<ChannelData> {
    // find the oldest live message id in the send window
    let base_id = self
      .next_send_id
      .wrapping_sub(self.config.send_queue_size as u16);
    let mut oldest: Option<u16> = None;
    for i in 0..self.config.send_queue_size {
      let message_id = base_id.wrapping_add(i as u16);
      if self.send_queue.get(message_id).is_some() {
        match oldest {
          Some(o) if !seq::less_than(message_id, o) => {}
          _ => oldest = Some(message_id),
        }
      }
    }
    let oldest = oldest?;

    // gather due messages in ascending id order. The scan is bounded by the
    // receive window size: anything further ahead of the oldest live message
    // could only be discarded as early on the other side.
    let mut available_bits = budget_bits;
    let mut message_ids: Vec<u16> = Vec::with_capacity(self.config.max_messages_per_packet);
    for i in 0..self.config.receive_queue_size {
      if available_bits < self.config.give_up_bits {
        break;
      }
      let message_id = oldest.wrapping_add(i as u16);
      if let Some(entry) = self.send_queue.get_mut(message_id) {
        let due = match entry.last_sent {
          Some(last) => last + self.config.resend_rate <= self.time,
          None => true,
        };
        if due && available_bits >= entry.measured_bits {
          entry.last_sent = Some(self.time);
          available_bits -= entry.measured_bits;
          message_ids.push(message_id);
        }
      }
      if message_ids.len() == self.config.max_messages_per_packet {
        break;
      }
    }

    if message_ids.is_empty() {
      return None;
    }

    let mut data = ChannelData::new();
    data.messages.reserve(message_ids.len());
    for &message_id in &message_ids {
      let entry = self.send_queue.get(message_id).expect("slot selected above");
      let message = entry.message.clone().expect("live slot holds a message");
      data.messages.push(message);
    }

    debug!(
      "assembled packet {}: {} messages, {} of {} bits left",
      sequence,
      message_ids.len(),
      available_bits,
      budget_bits
    );

    self.counters.messages_written += message_ids.len() as u64;

    // record the batch so the ack for this packet can retire it
    let record = self.sent_packets.insert_default(sequence);
    record.time_sent = self.time;
    record.message_ids = message_ids;

    Some(data)
  }

  /// Feed a received batch into the receive queue.
  ///
  /// The packet sequence is informational here: ordering is carried by the
  /// message ids, and acks are the transport's business. Fails with
  /// [`Error::EarlyMessage`] if any id lies beyond the receive window, after
  /// the whole batch has been classified.
  pub fn process_data(&mut self, sequence: u16, data: ChannelData) -> Result<(), Error> {
    let window_min = self.next_receive_id;
    let window_max = self
      .next_receive_id
      .wrapping_add(self.config.receive_queue_size as u16 - 1);

    let mut early = false;
    for message in data.messages {
      let message_id = message.id();
      if seq::less_than(message_id, window_min) {
        // already delivered; the peer resent before it saw the ack
        trace!("late message {}", message_id);
        self.counters.messages_discarded_late += 1;
      } else if seq::greater_than(message_id, window_max) {
        trace!("early message {}", message_id);
        early = true;
        self.counters.messages_discarded_early += 1;
      } else {
        // a redelivered in-window id lands in its own slot again; the
        // overwrite is benign since the payload is identical
        let inserted = self.receive_queue.insert(
          message_id,
          ReceiveEntry {
            message: Some(message),
            time_received: self.time,
          },
        );
        debug_assert!(inserted);
      }
      self.counters.messages_read += 1;
    }

    if early {
      debug!("packet {} carried messages beyond the receive window", sequence);
      return Err(Error::EarlyMessage);
    }
    Ok(())
  }

  /// Retire every message carried by the packet acked under `sequence`.
  ///
  /// Repeated acks and acks for unknown or already-retired packets are
  /// silent no-ops.
  pub fn process_ack(&mut self, sequence: u16) {
    let record = match self.sent_packets.get_mut(sequence) {
      Some(record) if !record.acked => record,
      _ => return,
    };
    record.acked = true;
    let message_ids = std::mem::take(&mut record.message_ids);

    for message_id in message_ids {
      // the slot may have been cleared by an earlier ack for another packet
      // that carried the same message
      if self.send_queue.take(message_id).is_some() {
        trace!("acked message {}", message_id);
      }
    }
    debug!("packet {} acked", sequence);
  }
}
