//! SIP message types and parsing

use bytes::Bytes;
use rsip::{Header, Headers, Method, Request, Response, Uri};
use std::fmt;
use thiserror::Error;

use super::builder::ResponseBuilder;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// Headers that the message exposes through dedicated accessors. They are not
/// part of the generic header index searched by [`SipMessage::get_header`].
const DIALOG_HEADERS: &[&str] = &[
    "via",
    "from",
    "to",
    "call-id",
    "cseq",
    "contact",
    "content-type",
    "content-length",
    "max-forwards",
];

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Prack,
    Notify,
    Refer,
    Message,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Prack => "PRACK",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
        }
    }

    pub fn from_rsip(method: &Method) -> Option<Self> {
        match method {
            Method::Register => Some(SipMethod::Register),
            Method::Invite => Some(SipMethod::Invite),
            Method::Ack => Some(SipMethod::Ack),
            Method::Cancel => Some(SipMethod::Cancel),
            Method::Bye => Some(SipMethod::Bye),
            Method::Options => Some(SipMethod::Options),
            Method::PRack => Some(SipMethod::Prack),
            Method::Notify => Some(SipMethod::Notify),
            Method::Refer => Some(SipMethod::Refer),
            Method::Message => Some(SipMethod::Message),
            _ => None,
        }
    }

    pub fn to_rsip(&self) -> Method {
        match self {
            SipMethod::Register => Method::Register,
            SipMethod::Invite => Method::Invite,
            SipMethod::Ack => Method::Ack,
            SipMethod::Cancel => Method::Cancel,
            SipMethod::Bye => Method::Bye,
            SipMethod::Options => Method::Options,
            SipMethod::Prack => Method::PRack,
            SipMethod::Notify => Method::Notify,
            SipMethod::Refer => Method::Refer,
            SipMethod::Message => Method::Message,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Split a header into its name and value using its wire rendering.
pub fn header_name_value(header: &Header) -> (String, String) {
    let text = header.to_string();
    match text.split_once(':') {
        Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

fn find_header(headers: &Headers, name: &str) -> Option<String> {
    headers.iter().find_map(|h| {
        let (n, v) = header_name_value(h);
        n.eq_ignore_ascii_case(name).then_some(v)
    })
}

/// Extract a `;name=value` parameter from a header value.
pub fn header_param(value: &str, name: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| val.trim().to_string())
    })
}

/// Extract the URI from a name-addr (`"Alice" <sip:alice@host>;tag=x`) or addr-spec.
pub fn header_uri(value: &str) -> String {
    if let (Some(start), Some(end)) = (value.find('<'), value.find('>')) {
        if start < end {
            return value[start + 1..end].to_string();
        }
    }
    value.split(';').next().unwrap_or_default().trim().to_string()
}

/// User part of a SIP URI (`sip:alice@host` -> `alice`).
pub fn uri_user(uri: &str) -> String {
    let rest = uri
        .strip_prefix("sips:")
        .or_else(|| uri.strip_prefix("sip:"))
        .unwrap_or(uri);
    match rest.split_once('@') {
        Some((user, _)) => user.to_string(),
        None => String::new(),
    }
}

fn indexed_header(headers: &Headers, name: &str) -> Option<String> {
    if DIALOG_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
        return None;
    }
    find_header(headers, name)
}

fn rebuild_headers(headers: &mut Headers, keep: impl Fn(&Header) -> bool) {
    let kept: Vec<Header> = headers.iter().filter(|h| keep(h)).cloned().collect();
    *headers = Headers::from(kept);
}

fn set_body(headers: &mut Headers, body: &mut Vec<u8>, content_type: &str, content: Vec<u8>) {
    rebuild_headers(headers, |h| {
        !matches!(h, Header::ContentType(_) | Header::ContentLength(_))
    });
    if !content.is_empty() {
        headers.push(Header::ContentType(content_type.to_string().into()));
    }
    headers.push(Header::ContentLength(content.len().to_string().into()));
    *body = content;
}

fn declares_100rel(headers: &Headers) -> bool {
    headers.iter().any(|h| {
        let (name, value) = header_name_value(h);
        (name.eq_ignore_ascii_case("require") || name.eq_ignore_ascii_case("supported"))
            && value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("100rel"))
    })
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> Option<SipMethod> {
        SipMethod::from_rsip(&self.inner.method)
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        find_header(&self.inner.headers, "Call-ID")
    }

    pub fn from_header(&self) -> Option<String> {
        find_header(&self.inner.headers, "From")
    }

    pub fn to_header(&self) -> Option<String> {
        find_header(&self.inner.headers, "To")
    }

    pub fn contact(&self) -> Option<String> {
        find_header(&self.inner.headers, "Contact").map(|v| header_uri(&v))
    }

    pub fn from_tag(&self) -> Option<String> {
        self.from_header().and_then(|v| header_param(&v, "tag"))
    }

    pub fn to_tag(&self) -> Option<String> {
        self.to_header().and_then(|v| header_param(&v, "tag"))
    }

    pub fn cseq(&self) -> Option<u32> {
        find_header(&self.inner.headers, "CSeq")
            .and_then(|v| v.split_whitespace().next().and_then(|s| s.parse().ok()))
    }

    /// See [`SipMessage::get_header`].
    pub fn get_header(&self, name: &str) -> Option<String> {
        indexed_header(&self.inner.headers, name)
    }

    pub fn is_100rel(&self) -> bool {
        declares_100rel(&self.inner.headers)
    }

    /// Build a response to this request carrying the dialog-identity headers.
    pub fn create_response(&self, status_code: u16) -> Result<SipResponse, SipError> {
        ResponseBuilder::new(status_code).build_for_request(self)
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        find_header(&self.inner.headers, "Call-ID")
    }

    pub fn to_tag(&self) -> Option<String> {
        find_header(&self.inner.headers, "To").and_then(|v| header_param(&v, "tag"))
    }

    pub fn contact(&self) -> Option<String> {
        find_header(&self.inner.headers, "Contact").map(|v| header_uri(&v))
    }

    /// Method named in the CSeq header (the request this response answers).
    pub fn cseq_method(&self) -> Option<String> {
        find_header(&self.inner.headers, "CSeq")
            .and_then(|v| v.split_whitespace().nth(1).map(|m| m.to_ascii_uppercase()))
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    /// Parse a datagram as a request, falling back to a response
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        SipRequest::parse(data)
            .map(SipMessage::Request)
            .or_else(|_| SipResponse::parse(data).map(SipMessage::Response))
            .map_err(|e| SipError::ParseError(format!("neither request nor response: {}", e)))
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, SipMessage::Response(_))
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&SipResponse> {
        match self {
            SipMessage::Response(resp) => Some(resp),
            _ => None,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            SipMessage::Request(req) => &req.inner.headers,
            SipMessage::Response(resp) => &resp.inner.headers,
        }
    }

    fn headers_mut(&mut self) -> &mut Headers {
        match self {
            SipMessage::Request(req) => &mut req.inner.headers,
            SipMessage::Response(resp) => &mut resp.inner.headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            SipMessage::Request(req) => &req.inner.body,
            SipMessage::Response(resp) => &resp.inner.body,
        }
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(self.body()).into_owned()
    }

    pub fn call_id(&self) -> Option<String> {
        find_header(self.headers(), "Call-ID")
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers_mut()
            .push(Header::Other(name.to_string(), value.to_string()));
    }

    /// Look up a header by name (case-insensitive) in the generic header index.
    ///
    /// Dialog-identity headers (Via, From, To, Call-ID, CSeq, Contact, Content-Type,
    /// Content-Length, Max-Forwards) are not indexed here; they are reached through
    /// their dedicated accessors.
    pub fn get_header(&self, name: &str) -> Option<String> {
        indexed_header(self.headers(), name)
    }

    pub fn content_type(&self) -> Option<String> {
        find_header(self.headers(), "Content-Type")
    }

    /// Replace the body, updating Content-Type and Content-Length.
    pub fn set_body(&mut self, content_type: &str, body: Vec<u8>) {
        match self {
            SipMessage::Request(req) => {
                set_body(&mut req.inner.headers, &mut req.inner.body, content_type, body)
            }
            SipMessage::Response(resp) => {
                set_body(&mut resp.inner.headers, &mut resp.inner.body, content_type, body)
            }
        }
    }

    /// Whether the message declares 100rel in Require or Supported.
    pub fn is_100rel(&self) -> bool {
        declares_100rel(self.headers())
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            SipMessage::Request(req) => req.to_bytes(),
            SipMessage::Response(resp) => resp.to_bytes(),
        }
    }
}

impl From<SipRequest> for SipMessage {
    fn from(request: SipRequest) -> Self {
        SipMessage::Request(request)
    }
}

impl From<SipResponse> for SipMessage {
    fn from(response: SipResponse) -> Self {
        SipMessage::Response(response)
    }
}
