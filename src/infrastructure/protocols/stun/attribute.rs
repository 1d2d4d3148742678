/// STUN attributes (type-length-value records)
use super::header::MAGIC_COOKIE;
use super::message::StunError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Size of an attribute's type and length fields
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;

/// HMAC-SHA1 digest length carried by MESSAGE-INTEGRITY
pub const MESSAGE_INTEGRITY_SIZE: usize = 20;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// Longest USERNAME value allowed (RFC 5389 §15.3)
const MAX_USERNAME_LEN: usize = 513;

/// STUN attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StunAttributeType {
    MappedAddress = 0x0001,
    Username = 0x0006,
    MessageIntegrity = 0x0008,
    ErrorCode = 0x0009,
    UnknownAttributes = 0x000A,
    Realm = 0x0014,
    Nonce = 0x0015,
    XorMappedAddress = 0x0020,
    Priority = 0x0024,
    UseCandidate = 0x0025,
    Software = 0x8022,
    AlternateServer = 0x8023,
    Fingerprint = 0x8028,
    IceControlled = 0x8029,
    IceControlling = 0x802A,
}

impl StunAttributeType {
    pub fn from_u16(value: u16) -> Option<Self> {
        use StunAttributeType::*;
        [
            MappedAddress,
            Username,
            MessageIntegrity,
            ErrorCode,
            UnknownAttributes,
            Realm,
            Nonce,
            XorMappedAddress,
            Priority,
            UseCandidate,
            Software,
            AlternateServer,
            Fingerprint,
            IceControlled,
            IceControlling,
        ]
        .into_iter()
        .find(|t| *t as u16 == value)
    }
}

/// A single attribute: type code plus raw value bytes (without padding)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunAttribute {
    pub attr_type: u16,
    pub value: Vec<u8>,
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

fn xor_key(transaction_id: &[u8; 12]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..16].copy_from_slice(transaction_id);
    key
}

fn encode_address(addr: SocketAddr, port: u16, ip: &[u8]) -> Vec<u8> {
    let family = if addr.is_ipv4() { FAMILY_IPV4 } else { FAMILY_IPV6 };
    let mut value = vec![0x00, family];
    value.extend_from_slice(&port.to_be_bytes());
    value.extend_from_slice(ip);
    value
}

fn decode_address(value: &[u8]) -> Option<(u16, IpAddr)> {
    if value.len() < 4 {
        return None;
    }
    let port = u16::from_be_bytes([value[2], value[3]]);
    let ip = match (value[1], value.len()) {
        (FAMILY_IPV4, 8) => IpAddr::V4(Ipv4Addr::new(value[4], value[5], value[6], value[7])),
        (FAMILY_IPV6, 20) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some((port, ip))
}

impl StunAttribute {
    pub fn new(attr_type: u16, value: Vec<u8>) -> Self {
        Self { attr_type, value }
    }

    fn typed(attr_type: StunAttributeType, value: Vec<u8>) -> Self {
        Self::new(attr_type as u16, value)
    }

    pub fn kind(&self) -> Option<StunAttributeType> {
        StunAttributeType::from_u16(self.attr_type)
    }

    pub fn is(&self, attr_type: StunAttributeType) -> bool {
        self.attr_type == attr_type as u16
    }

    pub fn username(username: &str) -> Self {
        Self::typed(StunAttributeType::Username, username.as_bytes().to_vec())
    }

    pub fn software(software: &str) -> Self {
        Self::typed(StunAttributeType::Software, software.as_bytes().to_vec())
    }

    pub fn realm(realm: &str) -> Self {
        Self::typed(StunAttributeType::Realm, realm.as_bytes().to_vec())
    }

    pub fn nonce(nonce: &str) -> Self {
        Self::typed(StunAttributeType::Nonce, nonce.as_bytes().to_vec())
    }

    /// Placeholder digest, filled in when the message is serialized
    pub fn message_integrity() -> Self {
        Self::typed(
            StunAttributeType::MessageIntegrity,
            vec![0u8; MESSAGE_INTEGRITY_SIZE],
        )
    }

    pub fn mapped_address(addr: SocketAddr) -> Self {
        let value = match addr.ip() {
            IpAddr::V4(ip) => encode_address(addr, addr.port(), &ip.octets()),
            IpAddr::V6(ip) => encode_address(addr, addr.port(), &ip.octets()),
        };
        Self::typed(StunAttributeType::MappedAddress, value)
    }

    pub fn xor_mapped_address(addr: SocketAddr, transaction_id: &[u8; 12]) -> Self {
        let key = xor_key(transaction_id);
        let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
        let value = match addr.ip() {
            IpAddr::V4(ip) => {
                let octets: Vec<u8> = ip.octets().iter().zip(&key).map(|(a, k)| a ^ k).collect();
                encode_address(addr, port, &octets)
            }
            IpAddr::V6(ip) => {
                let octets: Vec<u8> = ip.octets().iter().zip(&key).map(|(a, k)| a ^ k).collect();
                encode_address(addr, port, &octets)
            }
        };
        Self::typed(StunAttributeType::XorMappedAddress, value)
    }

    pub fn error_code(code: u16, reason: &str) -> Self {
        let mut value = vec![0x00, 0x00, (code / 100) as u8 & 0x07, (code % 100) as u8];
        value.extend_from_slice(reason.as_bytes());
        Self::typed(StunAttributeType::ErrorCode, value)
    }

    pub fn priority(priority: u32) -> Self {
        Self::typed(StunAttributeType::Priority, priority.to_be_bytes().to_vec())
    }

    pub fn ice_controlling(tie_breaker: u64) -> Self {
        Self::typed(StunAttributeType::IceControlling, tie_breaker.to_be_bytes().to_vec())
    }

    pub fn ice_controlled(tie_breaker: u64) -> Self {
        Self::typed(StunAttributeType::IceControlled, tie_breaker.to_be_bytes().to_vec())
    }

    pub fn use_candidate() -> Self {
        Self::typed(StunAttributeType::UseCandidate, Vec::new())
    }

    /// USERNAME, SOFTWARE, REALM and NONCE values
    pub fn as_string(&self) -> Option<String> {
        String::from_utf8(self.value.clone()).ok()
    }

    pub fn as_mapped_address(&self) -> Option<SocketAddr> {
        let (port, ip) = decode_address(&self.value)?;
        Some(SocketAddr::new(ip, port))
    }

    pub fn as_xor_mapped_address(&self, transaction_id: &[u8; 12]) -> Option<SocketAddr> {
        let (xor_port, xor_ip) = decode_address(&self.value)?;
        let port = xor_port ^ (MAGIC_COOKIE >> 16) as u16;
        let key = xor_key(transaction_id);

        let ip = match xor_ip {
            IpAddr::V4(ip) => {
                let ip_u32 = u32::from(ip) ^ MAGIC_COOKIE;
                IpAddr::V4(Ipv4Addr::from(ip_u32))
            }
            IpAddr::V6(ip) => {
                let mut ip_bytes = ip.octets();
                for (byte, k) in ip_bytes.iter_mut().zip(key) {
                    *byte ^= k;
                }
                IpAddr::V6(Ipv6Addr::from(ip_bytes))
            }
        };
        Some(SocketAddr::new(ip, port))
    }

    pub fn as_error_code(&self) -> Option<(u16, String)> {
        if self.value.len() < 4 {
            return None;
        }
        let code = (self.value[2] & 0x07) as u16 * 100 + self.value[3] as u16;
        let reason = String::from_utf8_lossy(&self.value[4..]).into_owned();
        Some((code, reason))
    }

    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    pub fn as_u64(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.value.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Bytes on the wire, padding included
    pub fn encoded_len(&self) -> usize {
        ATTRIBUTE_HEADER_SIZE + padded(self.value.len())
    }

    /// Length checks for the types this codec understands
    fn validate(&self) -> Result<(), StunError> {
        let len = self.value.len();
        let valid = match self.kind() {
            Some(StunAttributeType::MessageIntegrity) => len == MESSAGE_INTEGRITY_SIZE,
            Some(StunAttributeType::Priority) | Some(StunAttributeType::Fingerprint) => len == 4,
            Some(StunAttributeType::IceControlled) | Some(StunAttributeType::IceControlling) => {
                len == 8
            }
            Some(StunAttributeType::UseCandidate) => len == 0,
            Some(StunAttributeType::Username) => len <= MAX_USERNAME_LEN,
            Some(StunAttributeType::ErrorCode) => len >= 4,
            Some(StunAttributeType::MappedAddress)
            | Some(StunAttributeType::XorMappedAddress)
            | Some(StunAttributeType::AlternateServer) => decode_address(&self.value).is_some(),
            _ => true,
        };
        if valid {
            Ok(())
        } else {
            Err(StunError::InvalidAttribute {
                attr_type: self.attr_type,
                reason: format!("invalid value length {}", len),
            })
        }
    }

    /// Parse one attribute from the start of `data`; returns it with the
    /// number of bytes consumed (padding included)
    pub fn parse(data: &[u8]) -> Result<(Self, usize), StunError> {
        if data.len() < ATTRIBUTE_HEADER_SIZE {
            return Err(StunError::Truncated(data.len()));
        }

        let attr_type = u16::from_be_bytes([data[0], data[1]]);
        let attr_length = u16::from_be_bytes([data[2], data[3]]) as usize;
        let consumed = ATTRIBUTE_HEADER_SIZE + padded(attr_length);
        if consumed > data.len() {
            return Err(StunError::InvalidAttribute {
                attr_type,
                reason: format!("value of {} bytes overruns the message", attr_length),
            });
        }

        let value = data[ATTRIBUTE_HEADER_SIZE..ATTRIBUTE_HEADER_SIZE + attr_length].to_vec();
        let attr = Self { attr_type, value };
        attr.validate()?;
        Ok((attr, consumed))
    }

    /// Write the attribute at the start of `buf`; returns bytes written
    pub fn write(&self, buf: &mut [u8]) -> Result<usize, StunError> {
        let needed = self.encoded_len();
        if buf.len() < needed {
            return Err(StunError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        let length = u16::try_from(self.value.len()).map_err(|_| StunError::InvalidAttribute {
            attr_type: self.attr_type,
            reason: "value too long".to_string(),
        })?;

        buf[0..2].copy_from_slice(&self.attr_type.to_be_bytes());
        buf[2..4].copy_from_slice(&length.to_be_bytes());
        let end = ATTRIBUTE_HEADER_SIZE + self.value.len();
        buf[ATTRIBUTE_HEADER_SIZE..end].copy_from_slice(&self.value);
        buf[end..needed].fill(0);
        Ok(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TID: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    #[test]
    fn test_username_padding() {
        let attr = StunAttribute::username("evtj:h6vY");
        assert_eq!(attr.encoded_len(), 4 + 12);

        let mut buf = [0xFFu8; 16];
        assert_eq!(attr.write(&mut buf).unwrap(), 16);
        assert_eq!(&buf[0..4], &[0x00, 0x06, 0x00, 0x09]);
        assert_eq!(&buf[13..16], &[0, 0, 0]);

        let (parsed, consumed) = StunAttribute::parse(&buf).unwrap();
        assert_eq!(consumed, 16);
        assert_eq!(parsed.as_string().as_deref(), Some("evtj:h6vY"));
    }

    #[test]
    fn test_xor_mapped_address_ipv4() {
        // RFC 5769 §2.2: 192.0.2.1:32853
        let addr: SocketAddr = "192.0.2.1:32853".parse().unwrap();
        let attr = StunAttribute::xor_mapped_address(addr, &TID);
        assert_eq!(attr.value, vec![0x00, 0x01, 0xa1, 0x47, 0xe1, 0x12, 0xa6, 0x43]);
        assert_eq!(attr.as_xor_mapped_address(&TID), Some(addr));
    }

    #[test]
    fn test_xor_mapped_address_ipv6() {
        let addr: SocketAddr = "[2001:db8:1234:5678:11:2233:4455:6677]:32853".parse().unwrap();
        let attr = StunAttribute::xor_mapped_address(addr, &TID);
        assert_eq!(attr.value.len(), 20);
        assert_eq!(attr.as_xor_mapped_address(&TID), Some(addr));
        assert_ne!(attr.as_xor_mapped_address(&[0u8; 12]), Some(addr));
    }

    #[test]
    fn test_mapped_address_and_error_code() {
        let addr: SocketAddr = "10.0.0.7:5060".parse().unwrap();
        assert_eq!(StunAttribute::mapped_address(addr).as_mapped_address(), Some(addr));

        let err = StunAttribute::error_code(438, "Stale Nonce");
        assert_eq!(err.as_error_code(), Some((438, "Stale Nonce".to_string())));
    }

    #[test]
    fn test_ice_attributes() {
        assert_eq!(StunAttribute::priority(0x6e0001ff).as_u32(), Some(0x6e0001ff));
        assert_eq!(StunAttribute::ice_controlling(42).as_u64(), Some(42));
        assert_eq!(StunAttribute::use_candidate().encoded_len(), 4);
        assert_eq!(
            StunAttribute::ice_controlled(1).kind(),
            Some(StunAttributeType::IceControlled)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        // MESSAGE-INTEGRITY with a 4-byte value
        let data = [0x00, 0x08, 0x00, 0x04, 1, 2, 3, 4];
        assert!(matches!(
            StunAttribute::parse(&data),
            Err(StunError::InvalidAttribute { attr_type: 0x0008, .. })
        ));

        // Declared length past the end of the buffer
        let data = [0x80, 0x22, 0x00, 0x10, b'a', b'b'];
        assert!(StunAttribute::parse(&data).is_err());

        assert!(matches!(StunAttribute::parse(&[0x00]), Err(StunError::Truncated(1))));
    }

    #[test]
    fn test_unknown_attribute_kept_raw() {
        let data = [0x7f, 0x01, 0x00, 0x03, 9, 8, 7, 0];
        let (attr, consumed) = StunAttribute::parse(&data).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(attr.kind(), None);
        assert_eq!(attr.value, vec![9, 8, 7]);
    }
}
