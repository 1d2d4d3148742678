//! RTP endpoint descriptor
//!
//! Metadata describing one side of a media stream. Packets themselves are never
//! handled here; only the address, port and codec negotiated through SDP.

use serde::{Deserialize, Serialize};

/// Media direction attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RtpDirection {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl RtpDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtpDirection::SendRecv => "sendrecv",
            RtpDirection::SendOnly => "sendonly",
            RtpDirection::RecvOnly => "recvonly",
            RtpDirection::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sendrecv" => Some(RtpDirection::SendRecv),
            "sendonly" => Some(RtpDirection::SendOnly),
            "recvonly" => Some(RtpDirection::RecvOnly),
            "inactive" => Some(RtpDirection::Inactive),
            _ => None,
        }
    }
}

/// RTP endpoint (address, port, codec attributes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipCallRtp {
    pub ip: String,
    pub port: u16,
    /// Selected payload type, `-1` when none has been chosen
    pub codec: i32,
    pub codec_list: Vec<i32>,
    pub direction: RtpDirection,
}

impl SipCallRtp {
    pub fn new(ip: impl Into<String>, port: u16, codec: i32) -> Self {
        Self {
            ip: ip.into(),
            port,
            codec,
            codec_list: vec![codec],
            direction: RtpDirection::SendRecv,
        }
    }

    pub fn with_codecs(mut self, codec_list: Vec<i32>) -> Self {
        if let Some(first) = codec_list.first() {
            self.codec = *first;
        }
        self.codec_list = codec_list;
        self
    }

    pub fn with_direction(mut self, direction: RtpDirection) -> Self {
        self.direction = direction;
        self
    }

    /// A descriptor is usable once it names an address and a port.
    pub fn is_set(&self) -> bool {
        !self.ip.is_empty() && self.port != 0
    }
}
