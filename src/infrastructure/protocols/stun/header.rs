/// STUN message header (RFC 5389 §6)
use super::message::StunError;

/// Fixed header size
pub const HEADER_SIZE: usize = 20;

/// Magic cookie for STUN (RFC 5389)
pub const MAGIC_COOKIE: u32 = 0x2112A442;

/// STUN message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunMessageType {
    BindingRequest,
    BindingIndication,
    BindingResponse,
    BindingErrorResponse,
}

impl StunMessageType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(StunMessageType::BindingRequest),
            0x0011 => Some(StunMessageType::BindingIndication),
            0x0101 => Some(StunMessageType::BindingResponse),
            0x0111 => Some(StunMessageType::BindingErrorResponse),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            StunMessageType::BindingRequest => 0x0001,
            StunMessageType::BindingIndication => 0x0011,
            StunMessageType::BindingResponse => 0x0101,
            StunMessageType::BindingErrorResponse => 0x0111,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunHeader {
    /// Raw type field; unknown methods are carried through unchanged
    pub message_type: u16,
    /// Attribute bytes following the header
    pub length: u16,
    pub magic_cookie: u32,
    pub transaction_id: [u8; 12],
}

impl Default for StunHeader {
    fn default() -> Self {
        Self {
            message_type: 0,
            length: 0,
            magic_cookie: MAGIC_COOKIE,
            transaction_id: [0u8; 12],
        }
    }
}

impl StunHeader {
    pub fn new(message_type: StunMessageType) -> Self {
        Self {
            message_type: message_type.to_u16(),
            transaction_id: rand::random(),
            ..Self::default()
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, StunError> {
        if data.len() < HEADER_SIZE {
            return Err(StunError::Truncated(data.len()));
        }

        let message_type = u16::from_be_bytes([data[0], data[1]]);
        // The two most significant bits of every STUN message are zero
        if message_type & 0xC000 != 0 {
            return Err(StunError::InvalidHeader(format!(
                "not a STUN message type: {:#06x}",
                message_type
            )));
        }

        let length = u16::from_be_bytes([data[2], data[3]]);
        if length % 4 != 0 {
            return Err(StunError::InvalidHeader(format!(
                "length {} is not a multiple of 4",
                length
            )));
        }

        let magic_cookie = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if magic_cookie != MAGIC_COOKIE {
            return Err(StunError::InvalidHeader(format!(
                "invalid magic cookie {:#010x}",
                magic_cookie
            )));
        }

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&data[8..HEADER_SIZE]);

        Ok(Self {
            message_type,
            length,
            magic_cookie,
            transaction_id,
        })
    }

    pub fn write(&self, buf: &mut [u8]) -> Result<(), StunError> {
        if buf.len() < HEADER_SIZE {
            return Err(StunError::BufferTooSmall {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }
        buf[0..2].copy_from_slice(&self.message_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.magic_cookie.to_be_bytes());
        buf[8..HEADER_SIZE].copy_from_slice(&self.transaction_id);
        Ok(())
    }

    pub fn kind(&self) -> Option<StunMessageType> {
        StunMessageType::from_u16(self.message_type)
    }
}
