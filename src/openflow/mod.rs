/*!
Implements the OpenFlow protocol version 0x01 wire format.

`messages` holds the typed bodies and their codecs, `actions` the action
lists. The connection plumbing shared by both ends of a control channel
lives here: transaction ids, reassembly of messages from a byte stream and
the queue of outgoing messages.
*/

pub mod actions;
pub mod error;
pub mod messages;

use openflow::messages::{Message, OfpHeader};

use rand;

use std::cmp;
use std::collections::VecDeque;

/// Generates a random transaction id
pub fn gen_xid() -> u32 {
    let xid = rand::random();
    trace!("Using xid {} for the outgoing message", xid);
    xid
}

/// Reassembles OpenFlow messages from a byte stream that may split and
/// merge them arbitrarily. Bytes of an incomplete message stay pending until
/// the rest arrives.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    pending: Vec<u8>,
}

impl MessageBuffer {
    pub fn new() -> MessageBuffer {
        MessageBuffer { pending: vec![] }
    }

    /// Appends received bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for a complete message
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Takes the next complete message, header included, off the buffer.
    /// A header advertising less than its own length yields just the header,
    /// so that a broken peer cannot stall the stream.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let header = OfpHeader::peek(&self.pending)?;
        let length = cmp::max(header.length(), OfpHeader::header_length());
        if self.pending.len() < length {
            trace!(
                "Waiting for {} more bytes of a message of type {}",
                length - self.pending.len(),
                header.typ()
            );
            return None;
        }
        Some(self.pending.drain(..length).collect())
    }
}

/// Serialized messages waiting to be written to the control channel
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Vec<u8>>,
}

impl Outbox {
    pub fn new() -> Outbox {
        Outbox {
            queue: VecDeque::new(),
        }
    }

    /// Serializes `message` with the given transaction id and queues it
    pub fn push(&mut self, message: &Message, xid: u32) {
        debug!("Outgoing message: {:?}", message.header(xid));
        trace!("Outgoing message body: {:?}", message);
        match message.marshal(xid) {
            Ok(bytes) => self.queue.push_back(bytes),
            Err(e) => error!("Dropping an outgoing message: {}", e),
        }
    }

    /// Takes the oldest queued message
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }

    /// Takes all queued messages in order
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_split_messages() {
        let mut stream = Message::EchoRequest(vec![1, 2, 3]).marshal(1).unwrap();
        stream.extend(Message::BarrierRequest.marshal(2).unwrap());
        let mut buf = MessageBuffer::new();
        buf.extend(&stream[..4]);
        assert_eq!(None, buf.next_frame());
        buf.extend(&stream[4..13]);
        assert_eq!(None, buf.next_frame());
        buf.extend(&stream[13..]);
        let first = buf.next_frame().unwrap();
        assert_eq!(11, first.len());
        assert_eq!(
            (1, Message::EchoRequest(vec![1, 2, 3]), 11),
            Message::deserialize(&first).unwrap()
        );
        assert_eq!(Message::BarrierRequest.marshal(2).unwrap(), buf.next_frame().unwrap());
        assert_eq!(None, buf.next_frame());
        assert_eq!(0, buf.pending());
    }

    #[test]
    fn short_length_consumes_header_only() {
        let mut buf = MessageBuffer::new();
        buf.extend(&[1, 2, 0, 3, 0, 0, 0, 1, 9]);
        assert_eq!(8, buf.next_frame().unwrap().len());
        assert_eq!(1, buf.pending());
    }

    #[test]
    fn outbox_keeps_order() {
        let mut outbox = Outbox::new();
        outbox.push(&Message::Hello, 1);
        outbox.push(&Message::FeaturesRequest, 2);
        assert_eq!(2, outbox.len());
        assert_eq!(Some(Message::Hello.marshal(1).unwrap()), outbox.pop());
        assert_eq!(vec![Message::FeaturesRequest.marshal(2).unwrap()], outbox.drain());
        assert!(outbox.is_empty());
    }

    #[test]
    fn outbox_drops_oversized_messages() {
        let mut outbox = Outbox::new();
        outbox.push(&Message::EchoReply(vec![0; 0x10000]), 1);
        outbox.push(&Message::BarrierReply, 2);
        assert_eq!(vec![Message::BarrierReply.marshal(2).unwrap()], outbox.drain());
    }
}
