//! SIP message builder utilities

use super::message::{header_name_value, header_param, SipError, SipMethod, SipRequest, SipResponse};
use rsip::{Header, Headers, Request, Response, StatusCode, Uri, Version};

/// Build a SIP response from a request
pub struct ResponseBuilder {
    status_code: u16,
    to_tag: Option<String>,
    headers: Vec<Header>,
    body: Vec<u8>,
    content_type: Option<String>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            to_tag: None,
            headers: Vec::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Tag added to the To header when the request did not carry one.
    pub fn to_tag(mut self, tag: impl Into<String>) -> Self {
        self.to_tag = Some(tag.into());
        self
    }

    pub fn body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body;
        self
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn build_for_request(self, request: &SipRequest) -> Result<SipResponse, SipError> {
        let mut headers = Vec::new();

        // Copy essential headers from request
        for header in request.headers().iter() {
            match header {
                Header::Via(_) | Header::From(_) | Header::CallId(_) | Header::CSeq(_) => {
                    headers.push(header.clone());
                }
                Header::To(_) => match &self.to_tag {
                    Some(tag) => {
                        let (_, value) = header_name_value(header);
                        if header_param(&value, "tag").is_none() {
                            headers.push(Header::To(format!("{};tag={}", value, tag).into()));
                        } else {
                            headers.push(header.clone());
                        }
                    }
                    None => headers.push(header.clone()),
                },
                _ => {}
            }
        }

        headers.extend(self.headers);

        if let Some(content_type) = self.content_type.filter(|_| !self.body.is_empty()) {
            headers.push(Header::ContentType(content_type.into()));
        }
        headers.push(Header::ContentLength(self.body.len().to_string().into()));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers: Headers::from(headers),
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}

/// Build a request from explicit dialog state
pub struct RequestBuilder {
    method: SipMethod,
    uri: String,
    headers: Vec<Header>,
    body: Vec<u8>,
    content_type: Option<String>,
}

impl RequestBuilder {
    pub fn new(method: SipMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    pub fn via(mut self, transport: &str, host: &str, port: u16, branch: &str) -> Self {
        self.headers.push(Header::Via(
            format!("SIP/2.0/{} {}:{};branch={};rport", transport, host, port, branch).into(),
        ));
        self
    }

    pub fn from(mut self, uri: &str, tag: &str) -> Self {
        self.headers
            .push(Header::From(format!("<{}>;tag={}", uri, tag).into()));
        self
    }

    pub fn to(mut self, uri: &str, tag: Option<&str>) -> Self {
        let value = match tag {
            Some(tag) if !tag.is_empty() => format!("<{}>;tag={}", uri, tag),
            _ => format!("<{}>", uri),
        };
        self.headers.push(Header::To(value.into()));
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.headers.push(Header::CallId(call_id.to_string().into()));
        self
    }

    pub fn cseq(mut self, seq: u32, method: SipMethod) -> Self {
        self.headers
            .push(Header::CSeq(format!("{} {}", seq, method).into()));
        self
    }

    pub fn contact(mut self, uri: &str) -> Self {
        self.headers.push(Header::Contact(format!("<{}>", uri).into()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push(Header::Other(name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body;
        self
    }

    pub fn build(self) -> Result<SipRequest, SipError> {
        let uri = Uri::try_from(self.uri.as_str())?;

        let mut headers = self.headers;
        headers.push(Header::MaxForwards("70".into()));
        if let Some(content_type) = self.content_type.filter(|_| !self.body.is_empty()) {
            headers.push(Header::ContentType(content_type.into()));
        }
        headers.push(Header::ContentLength(self.body.len().to_string().into()));

        let request = Request {
            method: self.method.to_rsip(),
            uri,
            version: Version::V2,
            headers: Headers::from(headers),
            body: self.body,
        };

        Ok(SipRequest::new(request))
    }
}
