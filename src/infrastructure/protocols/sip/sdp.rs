//! Audio-only SDP offer/answer bodies

use crate::domain::rtp::{RtpDirection, SipCallRtp};
use std::fmt;

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Session description carried in INVITE, 183, 200 and ACK bodies
#[derive(Debug, Clone)]
pub struct SdpSession {
    pub version: u32,
    pub origin: SdpOrigin,
    pub session_name: String,
    pub connection: SdpConnection,
    pub media: Vec<SdpMedia>,
}

#[derive(Debug, Clone)]
pub struct SdpOrigin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct SdpConnection {
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct SdpMedia {
    pub media_type: String,
    pub port: u16,
    pub protocol: String,
    /// Payload type numbers from the m= line
    pub formats: Vec<String>,
    /// `(payload type, encoding)` pairs from a=rtpmap
    pub rtpmap: Vec<(String, String)>,
    pub direction: Option<RtpDirection>,
    /// Media-level connection address, overrides the session one
    pub connection: Option<String>,
}

/// Encoding name for static payload types
fn codec_encoding(payload_type: i32) -> Option<&'static str> {
    match payload_type {
        0 => Some("PCMU/8000"),
        3 => Some("GSM/8000"),
        4 => Some("G723/8000"),
        8 => Some("PCMA/8000"),
        9 => Some("G722/8000"),
        18 => Some("G729/8000"),
        101 => Some("telephone-event/8000"),
        _ => None,
    }
}

fn address_type(address: &str) -> &'static str {
    if address.contains(':') {
        "IP6"
    } else {
        "IP4"
    }
}

impl SdpSession {
    /// Describe a local RTP endpoint as an audio session
    pub fn from_rtp(rtp: &SipCallRtp) -> Self {
        let connection = SdpConnection::internet(rtp.ip.clone());
        let rtpmap = rtp
            .codec_list
            .iter()
            .filter_map(|&pt| Some((pt.to_string(), codec_encoding(pt)?.to_string())))
            .collect();

        Self {
            version: 0,
            origin: SdpOrigin {
                username: "sipua".to_string(),
                session_id: chrono::Utc::now().timestamp().to_string(),
                session_version: "1".to_string(),
                network_type: connection.network_type.clone(),
                address_type: connection.address_type.clone(),
                address: connection.address.clone(),
            },
            session_name: "SipUserAgent".to_string(),
            connection,
            media: vec![SdpMedia {
                media_type: "audio".to_string(),
                port: rtp.port,
                protocol: "RTP/AVP".to_string(),
                formats: rtp.codec_list.iter().map(i32::to_string).collect(),
                rtpmap,
                direction: Some(rtp.direction),
                connection: None,
            }],
        }
    }

    /// Extract the audio RTP endpoint described by this session
    pub fn to_rtp(&self) -> Option<SipCallRtp> {
        let audio = self.audio_media()?;
        let codec_list = self.audio_codecs();
        let ip = audio
            .connection
            .clone()
            .unwrap_or_else(|| self.connection.address.clone());

        Some(SipCallRtp {
            ip,
            port: audio.port,
            codec: codec_list.first().copied().unwrap_or(-1),
            codec_list,
            direction: audio.direction.unwrap_or_default(),
        })
    }

    /// Parse a session description; `None` when the origin or every
    /// connection address is missing
    pub fn parse(body: &str) -> Option<Self> {
        let mut version = 0;
        let mut origin = None;
        let mut session_name = String::new();
        let mut connection = None;
        let mut media: Vec<SdpMedia> = Vec::new();

        for (kind, value) in body.lines().filter_map(split_field) {
            match kind {
                'v' => version = value.parse().unwrap_or(0),
                'o' => origin = parse_origin(value).or(origin),
                's' => session_name = value.to_string(),
                'c' => {
                    let Some(parsed) = parse_connection(value) else {
                        continue;
                    };
                    match media.last_mut() {
                        Some(m) => m.connection = Some(parsed.address),
                        None => connection = Some(parsed),
                    }
                }
                'm' => media.extend(parse_media(value)),
                'a' => {
                    if let Some(m) = media.last_mut() {
                        m.apply_attribute(value);
                    }
                }
                _ => {}
            }
        }

        let origin = origin?;
        // A media-level c= line is enough when the session omits one
        let connection = match connection {
            Some(c) => c,
            None => {
                let address = media.iter().find_map(|m| m.connection.clone())?;
                SdpConnection::internet(address)
            }
        };

        Some(Self {
            version,
            origin,
            session_name,
            connection,
            media,
        })
    }

    pub fn audio_media(&self) -> Option<&SdpMedia> {
        self.media.iter().find(|m| m.media_type == "audio")
    }

    /// Payload types offered on the audio stream
    pub fn audio_codecs(&self) -> Vec<i32> {
        self.audio_media()
            .map(|audio| audio.formats.iter().filter_map(|f| f.parse().ok()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for SdpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.origin;
        let c = &self.connection;
        write!(f, "v={}\r\n", self.version)?;
        write!(
            f,
            "o={} {} {} {} {} {}\r\n",
            o.username, o.session_id, o.session_version, o.network_type, o.address_type, o.address
        )?;
        write!(f, "s={}\r\n", self.session_name)?;
        write!(f, "c={} {} {}\r\nt=0 0\r\n", c.network_type, c.address_type, c.address)?;

        for m in &self.media {
            write!(f, "m={} {} {}", m.media_type, m.port, m.protocol)?;
            for format in &m.formats {
                write!(f, " {}", format)?;
            }
            f.write_str("\r\n")?;
            for (pt, encoding) in &m.rtpmap {
                write!(f, "a=rtpmap:{} {}\r\n", pt, encoding)?;
            }
            write!(f, "a={}\r\n", m.direction.unwrap_or_default().as_str())?;
        }
        Ok(())
    }
}

impl SdpConnection {
    fn internet(address: String) -> Self {
        Self {
            network_type: "IN".to_string(),
            address_type: address_type(&address).to_string(),
            address,
        }
    }
}

impl SdpMedia {
    fn apply_attribute(&mut self, value: &str) {
        if let Some(rtpmap) = value.strip_prefix("rtpmap:") {
            if let Some((pt, encoding)) = rtpmap.split_once(' ') {
                self.rtpmap.push((pt.to_string(), encoding.trim().to_string()));
            }
        } else if let Some(direction) = RtpDirection::parse(value) {
            self.direction = Some(direction);
        }
    }
}

/// `x=value` into its type letter and trimmed value
fn split_field(line: &str) -> Option<(char, &str)> {
    let (kind, value) = line.trim().split_once('=')?;
    let mut chars = kind.chars();
    match (chars.next(), chars.next()) {
        (Some(k), None) => Some((k, value.trim())),
        _ => None,
    }
}

fn parse_origin(value: &str) -> Option<SdpOrigin> {
    let mut it = value.split_whitespace().map(str::to_string);
    Some(SdpOrigin {
        username: it.next()?,
        session_id: it.next()?,
        session_version: it.next()?,
        network_type: it.next()?,
        address_type: it.next()?,
        address: it.next()?,
    })
}

fn parse_connection(value: &str) -> Option<SdpConnection> {
    let mut it = value.split_whitespace().map(str::to_string);
    Some(SdpConnection {
        network_type: it.next()?,
        address_type: it.next()?,
        address: it.next()?,
    })
}

fn parse_media(value: &str) -> Option<SdpMedia> {
    let mut it = value.split_whitespace();
    let media_type = it.next()?.to_string();
    let port = it.next()?.parse().unwrap_or(0);
    let protocol = it.next()?.to_string();
    let formats: Vec<String> = it.map(str::to_string).collect();
    if formats.is_empty() {
        return None;
    }
    Some(SdpMedia {
        media_type,
        port,
        protocol,
        formats,
        rtpmap: Vec::new(),
        direction: None,
        connection: None,
    })
}
