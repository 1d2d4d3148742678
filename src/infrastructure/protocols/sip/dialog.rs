//! SIP dialog entry
//!
//! Per-call state kept by the user agent: the stored INVITE, both RTP endpoints,
//! the identities and tags needed to build in-dialog requests, and the 100rel
//! sequence counter.

use super::builder::{RequestBuilder, ResponseBuilder};
use super::message::{header_uri, uri_user, SipError, SipMessage, SipMethod, SipRequest, SipResponse};
use super::sdp::{SdpSession, SDP_CONTENT_TYPE};
use crate::config::SipConfig;
use crate::domain::cdr::{CallDirection, SipCdr};
use crate::domain::rtp::SipCallRtp;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Methods advertised in Allow when sending reliable provisional responses
pub const ALLOW_METHODS: &str = "PRACK, INVITE, ACK, BYE, CANCEL, REFER, NOTIFY, MESSAGE";

pub fn generate_tag() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

pub fn generate_branch() -> String {
    format!("z9hG4bK{}", Uuid::new_v4().simple())
}

/// Remote RTP endpoint carried in a message body, if it holds SDP
pub fn body_rtp(body: &[u8]) -> Option<SipCallRtp> {
    if body.is_empty() {
        return None;
    }
    SdpSession::parse(&String::from_utf8_lossy(body))?.to_rtp()
}

/// Local transport address used in Via and Contact, plus the User-Agent we announce
#[derive(Debug, Clone)]
struct LocalContact {
    host: String,
    port: u16,
    transport: String,
    user_agent: String,
}

impl LocalContact {
    fn from_config(config: &SipConfig) -> Self {
        Self {
            host: config.local_ip.clone(),
            port: config.local_port,
            transport: config.transport.to_ascii_uppercase(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SipDialog {
    pub call_id: String,
    pub direction: CallDirection,

    pub from_id: String,
    pub to_id: String,

    pub local_uri: String,
    pub local_tag: String,
    pub remote_uri: String,
    pub remote_tag: String,
    /// Request-URI for in-dialog requests (peer Contact)
    pub remote_target: String,

    contact: LocalContact,
    /// Local CSeq counter
    seq: u32,
    invite_seq: u32,
    invite_branch: String,
    /// CSeq of the last INVITE received from the peer
    remote_invite_seq: u32,

    /// Received INVITE, held until answered or handed back to the application
    pub invite: Option<SipRequest>,

    pub local_rtp: Option<SipCallRtp>,
    pub remote_rtp: Option<SipCallRtp>,

    pub invite_time: DateTime<Utc>,
    /// `None` while ringing
    pub start_time: Option<DateTime<Utc>>,
    pub sip_status: u16,

    /// RSeq for reliable provisional responses, `-1` when 100rel is not in use
    pub rseq: i32,
    pub is_100rel: bool,
}

impl SipDialog {
    /// Dialog for an INVITE received from the peer
    pub fn new_incoming(invite: SipRequest, config: &SipConfig) -> Result<Self, SipError> {
        let call_id = invite
            .call_id()
            .ok_or_else(|| SipError::InvalidMessage("INVITE without Call-ID".to_string()))?;
        let from = invite
            .from_header()
            .ok_or_else(|| SipError::InvalidMessage("INVITE without From".to_string()))?;
        let to = invite
            .to_header()
            .ok_or_else(|| SipError::InvalidMessage("INVITE without To".to_string()))?;

        let remote_uri = header_uri(&from);
        let local_uri = header_uri(&to);
        let remote_target = invite.contact().unwrap_or_else(|| remote_uri.clone());

        Ok(Self {
            call_id,
            direction: CallDirection::Inbound,
            from_id: uri_user(&remote_uri),
            to_id: uri_user(&local_uri),
            remote_tag: invite.from_tag().unwrap_or_default(),
            local_tag: generate_tag(),
            local_uri,
            remote_uri,
            remote_target,
            contact: LocalContact::from_config(config),
            seq: 0,
            invite_seq: 0,
            invite_branch: String::new(),
            remote_invite_seq: invite.cseq().unwrap_or(0),
            remote_rtp: body_rtp(invite.body()),
            local_rtp: None,
            invite: Some(invite),
            invite_time: Utc::now(),
            start_time: None,
            sip_status: 0,
            rseq: -1,
            is_100rel: false,
        })
    }

    /// Dialog for a call placed by this agent
    pub fn new_outgoing(from_id: &str, to_id: &str, config: &SipConfig) -> Self {
        let contact = LocalContact::from_config(config);
        let remote_uri = format!("sip:{}@{}", to_id, config.domain);

        Self {
            call_id: format!("{}@{}", Uuid::new_v4().simple(), contact.host),
            direction: CallDirection::Outbound,
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            local_uri: format!("sip:{}@{}", from_id, config.domain),
            local_tag: generate_tag(),
            remote_target: remote_uri.clone(),
            remote_uri,
            remote_tag: String::new(),
            contact,
            seq: 0,
            invite_seq: 0,
            invite_branch: String::new(),
            remote_invite_seq: 0,
            invite: None,
            local_rtp: None,
            remote_rtp: None,
            invite_time: Utc::now(),
            start_time: None,
            sip_status: 0,
            rseq: -1,
            is_100rel: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn set_local_rtp(&mut self, rtp: &SipCallRtp) {
        self.local_rtp = Some(rtp.clone());
    }

    /// Negotiated remote endpoint, once the peer has described one
    pub fn select_remote_rtp(&self) -> Option<SipCallRtp> {
        self.remote_rtp.as_ref().filter(|rtp| rtp.is_set()).cloned()
    }

    /// Attach SDP describing the local RTP endpoint
    pub fn add_sdp(&self, message: &mut SipMessage) {
        if let Some(rtp) = &self.local_rtp {
            message.set_body(SDP_CONTENT_TYPE, SdpSession::from_rtp(rtp).to_string().into_bytes());
        }
    }

    fn contact_uri(&self) -> String {
        let user = match self.direction {
            CallDirection::Inbound => &self.to_id,
            CallDirection::Outbound => &self.from_id,
        };
        format!("sip:{}@{}:{}", user, self.contact.host, self.contact.port)
    }

    fn request(&self, method: SipMethod, seq: u32, branch: &str) -> RequestBuilder {
        let remote_tag = (!self.remote_tag.is_empty()).then_some(self.remote_tag.as_str());
        RequestBuilder::new(method, self.remote_target.clone())
            .via(&self.contact.transport, &self.contact.host, self.contact.port, branch)
            .from(&self.local_uri, &self.local_tag)
            .to(&self.remote_uri, remote_tag)
            .call_id(&self.call_id)
            .cseq(seq, method)
            .header("User-Agent", &self.contact.user_agent)
    }

    /// New in-dialog request with the next local CSeq
    pub fn create_request(&mut self, method: SipMethod) -> Result<SipRequest, SipError> {
        self.seq += 1;
        self.request(method, self.seq, &generate_branch())
            .contact(&self.contact_uri())
            .build()
    }

    /// INVITE (initial or re-INVITE) carrying the local SDP
    pub fn create_invite(&mut self) -> Result<SipRequest, SipError> {
        self.seq += 1;
        self.invite_seq = self.seq;
        self.invite_branch = generate_branch();

        let mut builder = self
            .request(SipMethod::Invite, self.invite_seq, &self.invite_branch)
            .contact(&self.contact_uri())
            .header("Allow", ALLOW_METHODS)
            .header("Supported", "100rel");
        if let Some(rtp) = &self.local_rtp {
            builder = builder.body(
                SDP_CONTENT_TYPE,
                SdpSession::from_rtp(rtp).to_string().into_bytes(),
            );
        }
        builder.build()
    }

    pub fn create_notify(&mut self) -> Result<SipRequest, SipError> {
        self.create_request(SipMethod::Notify)
    }

    pub fn create_bye(&mut self) -> Result<SipRequest, SipError> {
        self.create_request(SipMethod::Bye)
    }

    /// CANCEL for the pending outgoing INVITE (same branch and CSeq number)
    pub fn create_cancel(&self) -> Result<SipRequest, SipError> {
        RequestBuilder::new(SipMethod::Cancel, self.remote_target.clone())
            .via(&self.contact.transport, &self.contact.host, self.contact.port, &self.invite_branch)
            .from(&self.local_uri, &self.local_tag)
            .to(&self.remote_uri, None)
            .call_id(&self.call_id)
            .cseq(self.invite_seq, SipMethod::Cancel)
            .header("User-Agent", &self.contact.user_agent)
            .build()
    }

    /// ACK for a final INVITE response. A 2xx ACK is a new transaction; a
    /// non-2xx ACK reuses the INVITE branch.
    pub fn create_ack(&self, success: bool) -> Result<SipRequest, SipError> {
        let branch = if success {
            generate_branch()
        } else {
            self.invite_branch.clone()
        };
        self.request(SipMethod::Ack, self.invite_seq, &branch).build()
    }

    /// Response to the stored INVITE, tagged with the local tag
    pub fn create_invite_response(&self, status: u16) -> Option<Result<SipResponse, SipError>> {
        Some(self.respond(self.invite.as_ref()?, status))
    }

    fn respond(&self, request: &SipRequest, status: u16) -> Result<SipResponse, SipError> {
        let mut builder = ResponseBuilder::new(status).to_tag(self.local_tag.clone());
        if (101..300).contains(&status) {
            builder = builder.header(rsip::Header::Contact(format!("<{}>", self.contact_uri()).into()));
        }
        builder.build_for_request(request)
    }

    /// True for a new INVITE inside this established dialog. A request
    /// without our tag, or with a CSeq already seen, is a retransmission.
    pub fn is_reinvite(&self, request: &SipRequest) -> bool {
        self.is_connected()
            && request.to_tag().as_deref() == Some(self.local_tag.as_str())
            && request.cseq().is_some_and(|seq| seq > self.remote_invite_seq)
    }

    /// Take the peer's new media from a re-INVITE and answer with ours
    pub fn answer_reinvite(&mut self, request: &SipRequest) -> Result<SipMessage, SipError> {
        self.remote_invite_seq = request.cseq().unwrap_or(self.remote_invite_seq);
        if let Some(rtp) = body_rtp(request.body()) {
            self.remote_rtp = Some(rtp);
        }
        let mut message = SipMessage::from(self.respond(request, 200)?);
        self.add_sdp(&mut message);
        Ok(message)
    }

    /// Learn the peer tag, target and SDP from a response to our INVITE
    pub fn update_from_response(&mut self, response: &SipResponse) {
        if let Some(tag) = response.to_tag() {
            self.remote_tag = tag;
        }
        if let Some(contact) = response.contact() {
            self.remote_target = contact;
        }
        if let Some(rtp) = body_rtp(response.body()) {
            self.remote_rtp = Some(rtp);
        }
    }

    pub fn cdr(&self) -> SipCdr {
        SipCdr {
            call_id: self.call_id.clone(),
            from_id: self.from_id.clone(),
            to_id: self.to_id.clone(),
            direction: self.direction,
            invite_time: self.invite_time,
            start_time: self.start_time,
            sip_status: self.sip_status,
        }
    }
}
