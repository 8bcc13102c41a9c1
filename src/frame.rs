//! Wire-level data model: node addressing, message sequencing, and the
//! frame payloads exchanged by the MAC (§3 of the protocol).
//!
//! Payload is carried as a literal bitstring — the message source supplies
//! `'0'`/`'1'` characters directly, one bit per character, matching the
//! acoustic channel's per-symbol granularity rather than an implicit ASCII
//! encoding.

use std::fmt;

use crate::error::MacError;

/// A 2-bit node identifier. `00` is reserved as the broadcast destination
/// in unicast address fields and is never a valid source id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u8);

impl NodeId {
    pub const BROADCAST: NodeId = NodeId(0b00);

    /// Build a `NodeId` from its 2-bit wire value (0..=3).
    pub fn from_bits(bits: u8) -> Self {
        NodeId(bits & 0b11)
    }

    /// Build an addressable peer id from its integer value (1..=3).
    pub fn from_int(n: u8) -> Option<Self> {
        match n {
            1..=3 => Some(NodeId(n)),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Integer value (1..=3) used by the backoff formula; `0` for broadcast.
    pub fn as_int(self) -> u8 {
        self.0
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02b}", self.0)
    }
}

/// A 2-bit per-sender sequence counter; wraps modulo 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageId(u8);

impl MessageId {
    pub fn from_bits(bits: u8) -> Self {
        MessageId(bits & 0b11)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn next(self) -> Self {
        MessageId((self.0 + 1) & 0b11)
    }
}

/// Destination of an outbound item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Broadcast,
    Unicast(NodeId),
}

/// A literal bitstring payload (1..15 bits), the unit the wire format
/// actually carries. The message source hands these in pre-formed as
/// `'0'`/`'1'` characters; there is no implicit ASCII<->bits conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitString(Vec<bool>);

impl BitString {
    pub const MAX_BITS: usize = 15;

    /// Parse a string of `'0'`/`'1'` characters. Fails if empty, too long,
    /// or containing any other character.
    pub fn parse(s: &str) -> Result<Self, MacError> {
        if s.is_empty() || s.len() > Self::MAX_BITS {
            return Err(MacError::Config(format!(
                "payload bitstring must be 1..{} bits, got {}",
                Self::MAX_BITS,
                s.len()
            )));
        }
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(MacError::Config(format!(
                    "payload bitstring may only contain '0'/'1', found '{}'",
                    other
                ))),
            })
            .collect::<Result<Vec<bool>, _>>()?;
        Ok(BitString(bits))
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        BitString(bits)
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            write!(f, "{}", if b { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// A queued, not-yet-acknowledged outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundItem {
    pub payload: BitString,
    pub dest: Destination,
    pub msg_id: MessageId,
}

/// A fully decoded inbound DATA frame, ready for duplicate-suppression lookup
/// and application delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub sender: NodeId,
    pub msg_id: MessageId,
    pub payload: BitString,
}

/// RTS: `sender(2) || dest(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtsFrame {
    pub sender: NodeId,
    pub dest: NodeId,
}

impl RtsFrame {
    pub fn to_symbol(self) -> u8 {
        (self.sender.bits() << 2) | self.dest.bits()
    }

    pub fn from_symbol(symbol: u8) -> Self {
        RtsFrame {
            sender: NodeId::from_bits(symbol >> 2),
            dest: NodeId::from_bits(symbol),
        }
    }
}

/// CTS: `sender(2) || dest(2)`, dest is the node being granted the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtsFrame {
    pub sender: NodeId,
    pub dest: NodeId,
}

impl CtsFrame {
    pub fn to_symbol(self) -> u8 {
        (self.sender.bits() << 2) | self.dest.bits()
    }

    pub fn from_symbol(symbol: u8) -> Self {
        CtsFrame {
            sender: NodeId::from_bits(symbol >> 2),
            dest: NodeId::from_bits(symbol),
        }
    }
}

/// DATA: header symbol `sender(2) || msg_id(2)`, length symbol (bit-count,
/// 1..15), then `ceil(length/4)` payload symbols, final zero-padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub sender: NodeId,
    pub msg_id: MessageId,
    pub payload: BitString,
}

impl DataFrame {
    pub fn header_symbol(&self) -> u8 {
        (self.sender.bits() << 2) | self.msg_id.bits()
    }

    pub fn header_from_symbol(symbol: u8) -> (NodeId, MessageId) {
        (NodeId::from_bits(symbol >> 2), MessageId::from_bits(symbol))
    }

    /// Length symbol value: the payload bit count (1..15), carried in a
    /// single 4-bit nibble.
    pub fn length_symbol(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Chunk the payload bits into 4-bit nibble symbols, zero-padding the
    /// final nibble.
    pub fn payload_symbols(&self) -> Vec<u8> {
        let bits = self.payload.bits();
        let mut out = Vec::with_capacity(bits.len().div_ceil(4));
        for chunk in bits.chunks(4) {
            let mut nibble = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    nibble |= 1 << (3 - i);
                }
            }
            out.push(nibble);
        }
        out
    }

    /// Reassemble nibble symbols into a `DataFrame`, truncating the final
    /// nibble's padding bits to exactly `length` bits.
    pub fn from_symbols(
        sender: NodeId,
        msg_id: MessageId,
        length: u8,
        payload_symbols: &[u8],
    ) -> Self {
        let mut bits = Vec::with_capacity(length as usize);
        'outer: for &nibble in payload_symbols {
            for i in 0..4 {
                if bits.len() as u8 >= length {
                    break 'outer;
                }
                bits.push((nibble >> (3 - i)) & 1 == 1);
            }
        }
        DataFrame {
            sender,
            msg_id,
            payload: BitString::from_bits(bits),
        }
    }
}
