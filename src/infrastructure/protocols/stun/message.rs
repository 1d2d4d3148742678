/// STUN message format (RFC 5389)
use super::attribute::{StunAttribute, StunAttributeType, ATTRIBUTE_HEADER_SIZE, MESSAGE_INTEGRITY_SIZE};
use super::header::{StunHeader, StunMessageType, HEADER_SIZE};
use super::integrity::{compute_hmac, StunCredential};
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StunError {
    #[error("Truncated data: {0} bytes")]
    Truncated(usize),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid attribute {attr_type:#06x}: {reason}")]
    InvalidAttribute { attr_type: u16, reason: String },

    #[error("Declared length {declared} exceeds {available} available bytes")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Message integrity error: {0}")]
    Integrity(String),
}

/// STUN message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StunMessage {
    pub header: StunHeader,
    pub attributes: Vec<StunAttribute>,
}

impl StunMessage {
    pub fn new(message_type: StunMessageType) -> Self {
        Self {
            header: StunHeader::new(message_type),
            attributes: Vec::new(),
        }
    }

    /// Create new STUN Binding Request
    pub fn new_binding_request() -> Self {
        Self::new(StunMessageType::BindingRequest)
    }

    pub fn message_type(&self) -> Option<StunMessageType> {
        self.header.kind()
    }

    pub fn transaction_id(&self) -> &[u8; 12] {
        &self.header.transaction_id
    }

    pub fn add_attribute(&mut self, attr: StunAttribute) {
        self.attributes.push(attr);
    }

    pub fn get_attribute(&self, attr_type: StunAttributeType) -> Option<&StunAttribute> {
        self.attributes.iter().find(|a| a.is(attr_type))
    }

    /// Add SOFTWARE attribute
    pub fn add_software(&mut self, software: &str) {
        self.add_attribute(StunAttribute::software(software));
    }

    pub fn add_username(&mut self, username: &str) {
        self.add_attribute(StunAttribute::username(username));
    }

    /// Append a MESSAGE-INTEGRITY placeholder signed at serialization time
    pub fn add_message_integrity(&mut self) {
        self.add_attribute(StunAttribute::message_integrity());
    }

    pub fn username(&self) -> Option<String> {
        self.get_attribute(StunAttributeType::Username)?.as_string()
    }

    pub fn software(&self) -> Option<String> {
        self.get_attribute(StunAttributeType::Software)?.as_string()
    }

    /// Get XOR-MAPPED-ADDRESS attribute
    pub fn xor_mapped_address(&self) -> Option<SocketAddr> {
        self.get_attribute(StunAttributeType::XorMappedAddress)?
            .as_xor_mapped_address(&self.header.transaction_id)
    }

    /// Get MAPPED-ADDRESS attribute
    pub fn mapped_address(&self) -> Option<SocketAddr> {
        self.get_attribute(StunAttributeType::MappedAddress)?
            .as_mapped_address()
    }

    pub fn error_code(&self) -> Option<(u16, String)> {
        self.get_attribute(StunAttributeType::ErrorCode)?.as_error_code()
    }

    /// Drop all attributes; the header is left as is
    pub fn clear(&mut self) {
        self.attributes.clear();
    }

    /// Serialized size
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.attributes.iter().map(StunAttribute::encoded_len).sum::<usize>()
    }

    /// Parse a message from `data`, replacing this one only on success.
    /// Returns the bytes consumed (header plus declared attribute length).
    pub fn parse(&mut self, data: &[u8]) -> Result<usize, StunError> {
        let header = StunHeader::parse(data)?;
        let end = HEADER_SIZE + header.length as usize;
        if end > data.len() {
            return Err(StunError::LengthMismatch {
                declared: header.length as usize,
                available: data.len() - HEADER_SIZE,
            });
        }

        let mut attributes = Vec::new();
        let mut offset = HEADER_SIZE;
        while offset < end {
            let (attr, consumed) = StunAttribute::parse(&data[offset..end])?;
            attributes.push(attr);
            offset += consumed;
        }

        self.header = header;
        self.attributes = attributes;
        Ok(end)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, StunError> {
        let mut message = Self::default();
        message.parse(data)?;
        Ok(message)
    }

    /// Serialize into `buf`, returning the bytes written.
    ///
    /// A MESSAGE-INTEGRITY attribute is signed over every byte before it, with
    /// the header length temporarily covering the message up to and including
    /// that attribute. The stored attribute value is replaced with the digest.
    pub fn to_bytes(
        &mut self,
        buf: &mut [u8],
        credential: Option<&StunCredential>,
    ) -> Result<usize, StunError> {
        let needed = self.encoded_len();
        if buf.len() < needed {
            return Err(StunError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        let total = u16::try_from(needed - HEADER_SIZE)
            .map_err(|_| StunError::InvalidHeader(format!("message of {} bytes", needed)))?;

        self.header.length = 0;
        self.header.write(buf)?;
        let mut offset = HEADER_SIZE;

        for attr in self.attributes.iter_mut() {
            if attr.is(StunAttributeType::MessageIntegrity) {
                let credential = credential.ok_or_else(|| {
                    StunError::Integrity("MESSAGE-INTEGRITY without a credential".to_string())
                })?;
                self.header.length =
                    (offset - HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE) as u16;
                self.header.write(buf)?;
                attr.value = compute_hmac(&credential.key(), &buf[..offset])?.to_vec();
            }
            offset += attr.write(&mut buf[offset..])?;
        }

        self.header.length = total;
        self.header.write(buf)?;
        Ok(offset)
    }

    /// Serialize into a freshly allocated buffer
    pub fn to_vec(&mut self, credential: Option<&StunCredential>) -> Result<Vec<u8>, StunError> {
        let mut buf = vec![0u8; self.encoded_len()];
        let written = self.to_bytes(&mut buf, credential)?;
        buf.truncate(written);
        Ok(buf)
    }
}
