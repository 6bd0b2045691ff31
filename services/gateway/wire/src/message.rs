//! VAINA control messages exchanged between the gateway and the mesh radio.

use crate::{frame::encode_frame, WireError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::net::Ipv6Addr;

/// Size of the type and sequence number header
pub const HEADER_SIZE: usize = 2;

/// Size of an IPv6 address on the wire
const ADDR_SIZE: usize = 16;

/// Largest serialized message (`NIB_ADD`/`NIB_DEL`)
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + 1 + ADDR_SIZE;

/// Implied prefix length of router client entries
pub const RCS_PREFIX_LEN: u8 = 128;

/// Serialized message, stored inline
pub type MsgBuf = SmallVec<[u8; MAX_MESSAGE_SIZE]>;

/// VAINA message types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Positive acknowledgement
    Ack = 0,
    /// Negative acknowledgement
    Nack = 1,
    /// Add a router client
    RcsAdd = 2,
    /// Delete a router client
    RcsDel = 3,
    /// Add a network information base entry
    NibAdd = 4,
    /// Delete a network information base entry
    NibDel = 5,
}

impl MessageType {
    /// Whether this type answers a request instead of making one
    pub fn is_reply(self) -> bool {
        matches!(self, MessageType::Ack | MessageType::Nack)
    }

    /// Protocol name of the type
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Ack => "ACK",
            MessageType::Nack => "NACK",
            MessageType::RcsAdd => "RCS_ADD",
            MessageType::RcsDel => "RCS_DEL",
            MessageType::NibAdd => "NIB_ADD",
            MessageType::NibDel => "NIB_DEL",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Ack),
            1 => Ok(MessageType::Nack),
            2 => Ok(MessageType::RcsAdd),
            3 => Ok(MessageType::RcsDel),
            4 => Ok(MessageType::NibAdd),
            5 => Ok(MessageType::NibDel),
            _ => Err(WireError::Type(value)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific message content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageBody {
    /// Request accepted
    Ack,
    /// Request rejected or undecodable
    Nack,
    /// Register `addr` as a router client (implied /128)
    RcsAdd {
        /// Client address
        addr: Ipv6Addr,
    },
    /// Remove the router client `addr`
    RcsDel {
        /// Client address
        addr: Ipv6Addr,
    },
    /// Add a prefix to the network information base
    NibAdd {
        /// Prefix length in bits (0..=128)
        prefix_len: u8,
        /// Prefix address
        addr: Ipv6Addr,
    },
    /// Remove a prefix from the network information base
    NibDel {
        /// Prefix length in bits (0..=128)
        prefix_len: u8,
        /// Prefix address
        addr: Ipv6Addr,
    },
}

impl MessageBody {
    /// Message type of this body
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Ack => MessageType::Ack,
            MessageBody::Nack => MessageType::Nack,
            MessageBody::RcsAdd { .. } => MessageType::RcsAdd,
            MessageBody::RcsDel { .. } => MessageType::RcsDel,
            MessageBody::NibAdd { .. } => MessageType::NibAdd,
            MessageBody::NibDel { .. } => MessageType::NibDel,
        }
    }

    /// Address carried by the message, if any
    pub fn addr(&self) -> Option<Ipv6Addr> {
        match *self {
            MessageBody::Ack | MessageBody::Nack => None,
            MessageBody::RcsAdd { addr } | MessageBody::RcsDel { addr } => Some(addr),
            MessageBody::NibAdd { addr, .. } | MessageBody::NibDel { addr, .. } => Some(addr),
        }
    }

    /// Prefix length of the carried address; RCS entries are always host routes
    pub fn prefix_len(&self) -> Option<u8> {
        match *self {
            MessageBody::Ack | MessageBody::Nack => None,
            MessageBody::RcsAdd { .. } | MessageBody::RcsDel { .. } => Some(RCS_PREFIX_LEN),
            MessageBody::NibAdd { prefix_len, .. } | MessageBody::NibDel { prefix_len, .. } => {
                Some(prefix_len)
            }
        }
    }
}

/// A VAINA message: header plus type-specific body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VainaMessage {
    /// Sequence number chosen by the sender
    pub seqno: u8,
    /// Message content
    pub body: MessageBody,
}

impl VainaMessage {
    /// Create a message
    pub fn new(seqno: u8, body: MessageBody) -> Self {
        Self { seqno, body }
    }

    /// Positive acknowledgement for `seqno`
    pub fn ack(seqno: u8) -> Self {
        Self::new(seqno, MessageBody::Ack)
    }

    /// Negative acknowledgement for `seqno`
    pub fn nack(seqno: u8) -> Self {
        Self::new(seqno, MessageBody::Nack)
    }

    /// Router client registration
    pub fn rcs_add(seqno: u8, addr: Ipv6Addr) -> Self {
        Self::new(seqno, MessageBody::RcsAdd { addr })
    }

    /// Router client removal
    pub fn rcs_del(seqno: u8, addr: Ipv6Addr) -> Self {
        Self::new(seqno, MessageBody::RcsDel { addr })
    }

    /// Message type
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Whether this message is an `ACK` or `NACK`
    pub fn is_reply(&self) -> bool {
        self.message_type().is_reply()
    }

    /// Build the `ACK` or `NACK` answering this message
    pub fn reply(&self, accepted: bool) -> Self {
        if accepted {
            Self::ack(self.seqno)
        } else {
            Self::nack(self.seqno)
        }
    }

    /// Serialized size in bytes
    pub fn encoded_len(&self) -> usize {
        match self.body {
            MessageBody::Ack | MessageBody::Nack => HEADER_SIZE,
            MessageBody::RcsAdd { .. } | MessageBody::RcsDel { .. } => HEADER_SIZE + ADDR_SIZE,
            MessageBody::NibAdd { .. } | MessageBody::NibDel { .. } => MAX_MESSAGE_SIZE,
        }
    }

    /// Serialize to the VAINA wire layout
    pub fn serialize(&self) -> MsgBuf {
        let mut buf = MsgBuf::new();
        buf.push(self.message_type() as u8);
        buf.push(self.seqno);

        match self.body {
            MessageBody::Ack | MessageBody::Nack => {}
            MessageBody::RcsAdd { addr } | MessageBody::RcsDel { addr } => {
                buf.extend_from_slice(&addr.octets());
            }
            MessageBody::NibAdd { prefix_len, addr } | MessageBody::NibDel { prefix_len, addr } => {
                buf.push(prefix_len);
                buf.extend_from_slice(&addr.octets());
            }
        }

        buf
    }

    /// Serialize and wrap in a serial link frame
    pub fn to_frame(&self) -> Result<Bytes, WireError> {
        encode_frame(&self.serialize())
    }

    /// Parse a message from a frame payload.
    ///
    /// The payload must be exactly as long as its type requires; short input
    /// yields [`WireError::Incomplete`] and trailing bytes yield
    /// [`WireError::Malformed`].
    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::Incomplete);
        }

        let msg_type = MessageType::try_from(buf[0])?;
        let seqno = buf[1];
        let rest = &buf[HEADER_SIZE..];

        let body = match msg_type {
            MessageType::Ack => MessageBody::Ack,
            MessageType::Nack => MessageBody::Nack,
            MessageType::RcsAdd => MessageBody::RcsAdd {
                addr: read_addr(rest)?,
            },
            MessageType::RcsDel => MessageBody::RcsDel {
                addr: read_addr(rest)?,
            },
            MessageType::NibAdd | MessageType::NibDel => {
                let (&prefix_len, addr_bytes) = rest.split_first().ok_or(WireError::Incomplete)?;
                let addr = read_addr(addr_bytes)?;
                if prefix_len > RCS_PREFIX_LEN {
                    return Err(WireError::PrefixLength(prefix_len));
                }
                if msg_type == MessageType::NibAdd {
                    MessageBody::NibAdd { prefix_len, addr }
                } else {
                    MessageBody::NibDel { prefix_len, addr }
                }
            }
        };

        let msg = Self { seqno, body };
        if buf.len() != msg.encoded_len() {
            return Err(WireError::Malformed);
        }

        Ok(msg)
    }
}

impl fmt::Display for VainaMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seq={}", self.message_type(), self.seqno)?;
        if let (Some(addr), Some(prefix_len)) = (self.body.addr(), self.body.prefix_len()) {
            write!(f, " {}/{}", addr, prefix_len)?;
        }
        Ok(())
    }
}

fn read_addr(buf: &[u8]) -> Result<Ipv6Addr, WireError> {
    let octets: [u8; ADDR_SIZE] = buf
        .get(..ADDR_SIZE)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(WireError::Incomplete)?;
    Ok(Ipv6Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station_addr() -> Ipv6Addr {
        "2000::c0a8:402".parse().unwrap()
    }

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::try_from(0).unwrap(), MessageType::Ack);
        assert_eq!(MessageType::try_from(5).unwrap(), MessageType::NibDel);
        assert_eq!(MessageType::try_from(6), Err(WireError::Type(6)));
        assert!(MessageType::Nack.is_reply());
        assert!(!MessageType::RcsAdd.is_reply());
    }

    #[test]
    fn test_rcs_add_layout() {
        let bytes = VainaMessage::rcs_add(1, station_addr()).serialize();

        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[2..14], &[0x20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[14..], &[0xc0, 0xa8, 0x04, 0x02]);
        assert!(!bytes.spilled());
    }

    #[test]
    fn test_nib_add_layout() {
        let msg = VainaMessage::new(
            9,
            MessageBody::NibAdd {
                prefix_len: 64,
                addr: "2001:db8::".parse().unwrap(),
            },
        );
        let bytes = msg.serialize();

        assert_eq!(bytes.len(), MAX_MESSAGE_SIZE);
        assert_eq!(&bytes[..3], &[4, 9, 64]);
        assert_eq!(VainaMessage::deserialize(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_deserialize_ack() {
        let msg = VainaMessage::deserialize(&[0x00, 0x05]).unwrap();
        assert_eq!(msg, VainaMessage::ack(5));
        assert_eq!(msg.body.addr(), None);
    }

    #[test]
    fn test_deserialize_rejects_bad_input() {
        assert_eq!(VainaMessage::deserialize(&[]), Err(WireError::Incomplete));
        assert_eq!(VainaMessage::deserialize(&[0x02]), Err(WireError::Incomplete));
        assert_eq!(VainaMessage::deserialize(&[0x07, 0x01]), Err(WireError::Type(7)));

        // RCS_ADD with a truncated address
        let mut short = VainaMessage::rcs_add(3, station_addr()).serialize();
        short.truncate(10);
        assert_eq!(VainaMessage::deserialize(&short), Err(WireError::Incomplete));

        // ACK with trailing garbage
        assert_eq!(
            VainaMessage::deserialize(&[0x00, 0x01, 0xFF]),
            Err(WireError::Malformed)
        );

        // NIB_DEL with an impossible prefix length
        let mut nib = VainaMessage::new(
            2,
            MessageBody::NibDel {
                prefix_len: 48,
                addr: Ipv6Addr::UNSPECIFIED,
            },
        )
        .serialize();
        nib[2] = 129;
        assert_eq!(
            VainaMessage::deserialize(&nib),
            Err(WireError::PrefixLength(129))
        );
    }

    #[test]
    fn test_reply_keeps_seqno() {
        let request = VainaMessage::rcs_del(200, station_addr());
        assert_eq!(request.reply(true), VainaMessage::ack(200));
        assert_eq!(request.reply(false), VainaMessage::nack(200));
    }

    #[test]
    fn test_prefix_len_and_display() {
        let msg = VainaMessage::rcs_add(4, station_addr());
        assert_eq!(msg.body.prefix_len(), Some(RCS_PREFIX_LEN));
        assert_eq!(msg.to_string(), "RCS_ADD seq=4 2000::c0a8:402/128");
        assert_eq!(VainaMessage::nack(4).to_string(), "NACK seq=4");
    }

    #[test]
    fn test_deserialize_inverts_serialize() {
        let addr = station_addr();
        let mut messages = Vec::new();
        for seqno in [0u8, 255] {
            messages.push(VainaMessage::ack(seqno));
            messages.push(VainaMessage::nack(seqno));
            messages.push(VainaMessage::rcs_add(seqno, addr));
            messages.push(VainaMessage::rcs_del(seqno, addr));
            for prefix_len in [0u8, 128] {
                messages.push(VainaMessage::new(seqno, MessageBody::NibAdd { prefix_len, addr }));
                messages.push(VainaMessage::new(seqno, MessageBody::NibDel { prefix_len, addr }));
            }
        }

        for msg in messages {
            let bytes = msg.serialize();
            assert_eq!(bytes.len(), msg.encoded_len());
            assert_eq!(VainaMessage::deserialize(&bytes), Ok(msg), "{}", msg);
        }
    }

    #[test]
    fn test_to_frame() {
        let frame = VainaMessage::ack(1).to_frame().unwrap();
        assert_eq!(&frame[..], &[2, 0, 1]);
    }
}
