//! Transport collaborator
//!
//! The dialog engine never touches sockets. Outbound messages are handed to a
//! [`SipTransport`] after the dialog table lock has been released.

use super::message::SipMessage;
use tracing::{debug, info};

/// Fire-and-forget dispatch of an outbound SIP message
#[cfg_attr(test, mockall::automock)]
pub trait SipTransport: Send + Sync {
    fn send_sip_message(&self, message: SipMessage);
}

/// Transport that only logs what would have been sent
#[derive(Debug, Default)]
pub struct LoggingTransport;

impl SipTransport for LoggingTransport {
    fn send_sip_message(&self, message: SipMessage) {
        match &message {
            SipMessage::Request(req) => info!(
                "-> {} call_id={}",
                req.inner.method,
                req.call_id().unwrap_or_default()
            ),
            SipMessage::Response(resp) => info!(
                "-> {} call_id={}",
                resp.status_code(),
                resp.call_id().unwrap_or_default()
            ),
        }
        debug!("{}", String::from_utf8_lossy(&message.to_bytes()));
    }
}
