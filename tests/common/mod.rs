#![allow(dead_code)]

use sipua::application::UaEvent;
use sipua::domain::SipCallRtp;
use sipua::infrastructure::protocols::sip::{
    SipMessage, SipMethod, SipRequest, SipServerInfo, SipTransport, SipUserAgentCallback,
};
use std::sync::Mutex;

pub const SDP: &str = "v=0\r\n\
    o=- 1 1 IN IP4 192.168.1.100\r\n\
    s=-\r\n\
    c=IN IP4 192.168.1.100\r\n\
    t=0 0\r\n\
    m=audio 4000 RTP/AVP 0 8 101\r\n\
    a=rtpmap:101 telephone-event/8000\r\n\
    a=sendrecv\r\n";

/// INVITE from alice to bob; `extra` is inserted verbatim as additional header lines
pub fn invite_text(call_id: &str, extra: &str) -> String {
    format!(
        "INVITE sip:bob@example.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK-{call_id}\r\n\
         Max-Forwards: 70\r\n\
         From: Alice <sip:alice@example.com>;tag=a73kszlfl\r\n\
         To: Bob <sip:bob@example.com>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 INVITE\r\n\
         Contact: <sip:alice@192.168.1.100:5060>\r\n\
         {extra}\
         Content-Type: application/sdp\r\n\
         Content-Length: {}\r\n\r\n{}",
        SDP.len(),
        SDP
    )
}

pub fn invite(call_id: &str, extra: &str) -> SipRequest {
    SipRequest::parse(invite_text(call_id, extra).as_bytes()).unwrap()
}

/// In-dialog request from alice for a call created by [`invite`]
pub fn peer_request(method: &str, call_id: &str, cseq: u32) -> SipRequest {
    let text = format!(
        "{method} sip:bob@example.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK-{method}-{call_id}\r\n\
         Max-Forwards: 70\r\n\
         From: Alice <sip:alice@example.com>;tag=a73kszlfl\r\n\
         To: Bob <sip:bob@example.com>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: {cseq} {method}\r\n\
         Content-Length: 0\r\n\r\n"
    );
    SipRequest::parse(text.as_bytes()).unwrap()
}

/// Transport that keeps every message handed to it
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<SipMessage>>,
}

impl RecordingTransport {
    pub fn take(&self) -> Vec<SipMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl SipTransport for RecordingTransport {
    fn send_sip_message(&self, message: SipMessage) {
        self.sent.lock().unwrap().push(message);
    }
}

pub fn method_of(message: &SipMessage) -> Option<SipMethod> {
    message.as_request().and_then(SipRequest::method)
}

pub fn status_of(message: &SipMessage) -> Option<u16> {
    message.as_response().map(|r| r.status_code())
}

/// Callback that records events in arrival order
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<UaEvent>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<UaEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    fn push(&self, event: UaEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SipUserAgentCallback for Recorder {
    fn event_register(&self, server: &SipServerInfo, status: u16) {
        self.push(UaEvent::Register {
            server: server.clone(),
            status,
        });
    }

    fn event_incoming_call(&self, call_id: &str, from: &str, to: &str, rtp: Option<&SipCallRtp>) {
        self.push(UaEvent::IncomingCall {
            call_id: call_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            rtp: rtp.cloned(),
        });
    }

    fn event_call_ring(&self, call_id: &str, status: u16, rtp: Option<&SipCallRtp>) {
        self.push(UaEvent::CallRing {
            call_id: call_id.to_string(),
            status,
            rtp: rtp.cloned(),
        });
    }

    fn event_call_start(&self, call_id: &str, rtp: Option<&SipCallRtp>) {
        self.push(UaEvent::CallStart {
            call_id: call_id.to_string(),
            rtp: rtp.cloned(),
        });
    }

    fn event_call_end(&self, call_id: &str, status: u16) {
        self.push(UaEvent::CallEnd {
            call_id: call_id.to_string(),
            status,
        });
    }
}
