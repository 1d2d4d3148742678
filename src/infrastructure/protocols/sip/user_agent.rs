//! SIP user agent
//!
//! Public call-control surface. Each operation resolves the dialog through
//! [`SipDialogMap`] (lock held only for the lookup and mutation), then hands any
//! resulting message to the [`SipTransport`] and raises callbacks with the lock
//! released.

use super::callback::{SipServerInfo, SipUserAgentCallback};
use super::dialog::SipDialog;
use super::dialog_map::SipDialogMap;
use super::message::{SipError, SipMessage, SipMethod, SipRequest, SipResponse};
use super::status::reason_phrase;
use super::transport::SipTransport;
use crate::config::SipConfig;
use crate::domain::cdr::{CallDirection, SipCdr};
use crate::domain::rtp::SipCallRtp;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SIPFRAG_CONTENT_TYPE: &str = "message/sipfrag;version=2.0";

/// Final status used when rejecting an incoming call without an explicit code
const DEFAULT_REJECT_STATUS: u16 = 603;

/// `CallEnd` status for a connected call the peer hung up with BYE
pub const NORMAL_CLEARING_STATUS: u16 = 0;

pub struct SipUserAgent {
    config: SipConfig,
    dialogs: SipDialogMap,
    transport: Arc<dyn SipTransport>,
    callback: Option<Arc<dyn SipUserAgentCallback>>,
}

/// What `stop_call` has to send once the dialog is gone
enum Teardown {
    Request(Result<SipRequest, SipError>),
    Response(Option<Result<SipResponse, SipError>>),
}

impl SipUserAgent {
    pub fn new(config: SipConfig, transport: Arc<dyn SipTransport>) -> Self {
        Self {
            config,
            dialogs: SipDialogMap::new(),
            transport,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn SipUserAgentCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn set_callback(&mut self, callback: Arc<dyn SipUserAgentCallback>) {
        self.callback = Some(callback);
    }

    pub fn config(&self) -> &SipConfig {
        &self.config
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    fn send(&self, message: impl Into<SipMessage>) {
        self.transport.send_sip_message(message.into());
    }

    /// Send a built message, logging construction failures
    fn send_built<M: Into<SipMessage>>(&self, call_id: &str, built: Result<M, SipError>) {
        match built {
            Ok(message) => self.send(message),
            Err(e) => warn!("Failed to build message for call {}: {}", call_id, e),
        }
    }

    // ---------------------------------------------------------------------
    // Dialog table operations
    // ---------------------------------------------------------------------

    /// Remove a pending incoming call and return its INVITE to the caller
    pub fn delete_incoming_call(&self, call_id: &str) -> Option<SipRequest> {
        self.dialogs.delete_incoming_call(call_id)
    }

    /// Send a provisional response (180 / 183) for a pending incoming call
    pub fn ring_call(&self, call_id: &str, sip_status: u16, rtp: Option<&SipCallRtp>) -> bool {
        match self.dialogs.ring_call(call_id, sip_status, rtp) {
            Some(built) => {
                info!("Ringing call {} with {}", call_id, sip_status);
                self.send_built(call_id, built);
                true
            }
            None => false,
        }
    }

    pub fn get_remote_call_rtp(&self, call_id: &str) -> Option<SipCallRtp> {
        self.dialogs.get_remote_call_rtp(call_id)
    }

    pub fn get_to_id(&self, call_id: &str) -> Option<String> {
        self.dialogs.get_to_id(call_id)
    }

    pub fn get_from_id(&self, call_id: &str) -> Option<String> {
        self.dialogs.get_from_id(call_id)
    }

    pub fn get_cdr(&self, call_id: &str) -> Option<SipCdr> {
        self.dialogs.get_cdr(call_id)
    }

    pub fn is_ring_call(&self, call_id: &str, to_id: Option<&str>) -> bool {
        self.dialogs.is_ring_call(call_id, to_id)
    }

    pub fn get_invite_header_value(&self, call_id: &str, header_name: &str) -> Option<String> {
        self.dialogs.get_invite_header_value(call_id, header_name)
    }

    pub fn get_rseq(&self, call_id: &str) -> i32 {
        self.dialogs.get_rseq(call_id)
    }

    pub fn set_rseq(&self, call_id: &str, rseq: i32) {
        self.dialogs.set_rseq(call_id, rseq)
    }

    pub fn is_100rel(&self, call_id: &str) -> bool {
        self.dialogs.is_100rel(call_id)
    }

    /// Renegotiate media with a new local RTP endpoint
    pub fn send_re_invite(&self, call_id: &str, rtp: &SipCallRtp) -> bool {
        match self.dialogs.re_invite(call_id, rtp) {
            Some(built) => {
                info!("Sending re-INVITE for call {}", call_id);
                self.send_built(call_id, built);
                true
            }
            None => false,
        }
    }

    /// Report blind-transfer progress to the transferor
    pub fn send_notify(&self, call_id: &str, sip_code: u16) -> bool {
        let Some(built) = self.dialogs.notify(call_id) else {
            return false;
        };

        let mut notify = match built {
            Ok(request) => SipMessage::from(request),
            Err(e) => {
                warn!("Failed to build NOTIFY for call {}: {}", call_id, e);
                return true;
            }
        };

        notify.add_header("Event", "refer");
        let state = if sip_code >= 200 { "terminated" } else { "active" };
        notify.add_header("Subscription-State", state);
        let body = format!("SIP/2.0 {} {}", sip_code, reason_phrase(sip_code));
        notify.set_body(SIPFRAG_CONTENT_TYPE, body.into_bytes());

        info!("Sending NOTIFY ({}) for call {}", sip_code, call_id);
        self.send(notify);
        true
    }

    // ---------------------------------------------------------------------
    // Call control
    // ---------------------------------------------------------------------

    /// Place a call; returns the new Call-ID
    pub fn start_call(&self, from_id: &str, to_id: &str, rtp: &SipCallRtp) -> Result<String, SipError> {
        let mut dialog = SipDialog::new_outgoing(from_id, to_id, &self.config);
        dialog.set_local_rtp(rtp);
        let invite = dialog.create_invite()?;
        let call_id = dialog.call_id.clone();

        if !self.dialogs.insert(dialog) {
            return Err(SipError::Internal(format!("duplicate Call-ID {}", call_id)));
        }

        info!("Starting call {} ({} -> {})", call_id, from_id, to_id);
        self.send(invite);
        Ok(call_id)
    }

    /// Answer a pending incoming call with 200 OK
    pub fn accept_call(&self, call_id: &str, rtp: &SipCallRtp) -> bool {
        let built = self.dialogs.with_dialog(call_id, |dialog| {
            if dialog.is_connected() || dialog.invite.is_none() {
                return None;
            }
            dialog.set_local_rtp(rtp);
            let built = dialog.create_invite_response(200)?.map(|response| {
                let mut message = SipMessage::from(response);
                dialog.add_sdp(&mut message);
                message
            });
            dialog.invite = None;
            dialog.start_time = Some(Utc::now());
            dialog.sip_status = 200;
            Some(built)
        });

        match built.flatten() {
            Some(built) => {
                info!("Accepted call {}", call_id);
                self.send_built(call_id, built);
                true
            }
            None => false,
        }
    }

    /// Hang up, cancel or reject a call and forget its dialog
    pub fn stop_call(&self, call_id: &str, sip_status: u16) -> bool {
        let Some(mut dialog) = self.dialogs.remove(call_id) else {
            return false;
        };

        let teardown = if dialog.is_connected() {
            Teardown::Request(dialog.create_bye())
        } else {
            match dialog.direction {
                CallDirection::Outbound => Teardown::Request(dialog.create_cancel()),
                CallDirection::Inbound => {
                    let status = if sip_status >= 300 {
                        sip_status
                    } else {
                        DEFAULT_REJECT_STATUS
                    };
                    Teardown::Response(dialog.create_invite_response(status))
                }
            }
        };

        info!("Stopping call {}", call_id);
        match teardown {
            Teardown::Request(built) => self.send_built(call_id, built),
            Teardown::Response(Some(built)) => self.send_built(call_id, built),
            Teardown::Response(None) => debug!("Call {} has no INVITE to reject", call_id),
        }
        true
    }

    // ---------------------------------------------------------------------
    // Network events
    // ---------------------------------------------------------------------

    pub fn recv_message(&self, message: SipMessage) {
        match message {
            SipMessage::Request(request) => self.recv_request(request),
            SipMessage::Response(response) => self.recv_response(response),
        }
    }

    pub fn recv_request(&self, request: SipRequest) {
        match request.method() {
            Some(SipMethod::Invite) => self.recv_invite(request),
            Some(SipMethod::Ack) => {
                debug!("ACK for call {}", request.call_id().unwrap_or_default());
            }
            Some(SipMethod::Bye) => self.recv_bye(request),
            Some(SipMethod::Cancel) => self.recv_cancel(request),
            Some(SipMethod::Prack) | Some(SipMethod::Notify) => {
                let known = request
                    .call_id()
                    .is_some_and(|call_id| self.dialogs.contains(&call_id));
                self.send_built("", request.create_response(if known { 200 } else { 481 }));
            }
            _ => {
                warn!("Unsupported request {}", request.inner.method);
                self.send_built("", request.create_response(501));
            }
        }
    }

    fn recv_invite(&self, invite: SipRequest) {
        let Some(call_id) = invite.call_id() else {
            self.send_built("", invite.create_response(400));
            return;
        };

        // Known Call-ID: a re-INVITE gets our media, anything else is a retransmission
        let known = self.dialogs.with_dialog(&call_id, |dialog| {
            dialog
                .is_reinvite(&invite)
                .then(|| dialog.answer_reinvite(&invite))
        });
        match known {
            Some(Some(built)) => {
                info!("re-INVITE for call {}", call_id);
                self.send_built(&call_id, built);
                return;
            }
            Some(None) => {
                debug!("INVITE retransmission for call {}", call_id);
                return;
            }
            None => {}
        }

        let mut dialog = match SipDialog::new_incoming(invite.clone(), &self.config) {
            Ok(dialog) => dialog,
            Err(e) => {
                warn!("Rejecting INVITE {}: {}", call_id, e);
                self.send_built(&call_id, invite.create_response(400));
                return;
            }
        };

        let requires_100rel = invite
            .get_header("Require")
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("100rel")));
        if requires_100rel || (self.config.use_100rel && invite.is_100rel()) {
            dialog.rseq = 1;
            dialog.is_100rel = true;
        }

        let from_id = dialog.from_id.clone();
        let to_id = dialog.to_id.clone();
        let remote_rtp = dialog.select_remote_rtp();
        let trying = invite.create_response(100);

        if !self.dialogs.insert(dialog) {
            debug!("INVITE retransmission for call {}", call_id);
            return;
        }

        info!("Incoming call {} ({} -> {})", call_id, from_id, to_id);
        self.send_built(&call_id, trying);
        if let Some(callback) = &self.callback {
            callback.event_incoming_call(&call_id, &from_id, &to_id, remote_rtp.as_ref());
        }
    }

    fn recv_bye(&self, request: SipRequest) {
        let call_id = request.call_id().unwrap_or_default();
        let known = self.dialogs.remove(&call_id).is_some();
        self.send_built(&call_id, request.create_response(if known { 200 } else { 481 }));

        if known {
            info!("Call {} ended by peer", call_id);
            if let Some(callback) = &self.callback {
                callback.event_call_end(&call_id, NORMAL_CLEARING_STATUS);
            }
        }
    }

    fn recv_cancel(&self, request: SipRequest) {
        let call_id = request.call_id().unwrap_or_default();
        let cancelled = self.dialogs.remove_if(&call_id, |d| {
            !d.is_connected() && d.direction == CallDirection::Inbound
        });

        let Some(dialog) = cancelled else {
            self.send_built(&call_id, request.create_response(481));
            return;
        };

        self.send_built(&call_id, request.create_response(200));
        if let Some(built) = dialog.create_invite_response(487) {
            self.send_built(&call_id, built);
        }

        info!("Call {} cancelled by peer", call_id);
        if let Some(callback) = &self.callback {
            callback.event_call_end(&call_id, 487);
        }
    }

    pub fn recv_response(&self, response: SipResponse) {
        let Some(call_id) = response.call_id() else {
            return;
        };
        if response.cseq_method().as_deref() != Some(SipMethod::Invite.as_str()) {
            debug!("Response {} for call {}", response.status_code(), call_id);
            return;
        }

        let status = response.status_code();
        match status {
            100 => {}
            101..=199 => {
                let rtp = self.dialogs.with_dialog(&call_id, |dialog| {
                    dialog.update_from_response(&response);
                    dialog.select_remote_rtp()
                });
                if let (Some(rtp), Some(callback)) = (rtp, &self.callback) {
                    callback.event_call_ring(&call_id, status, rtp.as_ref());
                }
            }
            200..=299 => {
                let answered = self.dialogs.with_dialog(&call_id, |dialog| {
                    let first = !dialog.is_connected();
                    dialog.update_from_response(&response);
                    if first {
                        dialog.start_time = Some(Utc::now());
                        dialog.sip_status = status;
                    }
                    (first, dialog.create_ack(true), dialog.select_remote_rtp())
                });
                let Some((first, ack, rtp)) = answered else {
                    return;
                };
                self.send_built(&call_id, ack);
                if first {
                    info!("Call {} answered", call_id);
                    if let Some(callback) = &self.callback {
                        callback.event_call_start(&call_id, rtp.as_ref());
                    }
                }
            }
            _ => {
                // A failed re-INVITE leaves the established call alone
                let ack = self.dialogs.with_dialog(&call_id, |dialog| dialog.create_ack(false));
                let Some(ack) = ack else {
                    return;
                };
                self.send_built(&call_id, ack);

                if self.dialogs.remove_if(&call_id, |d| !d.is_connected()).is_some() {
                    info!("Call {} failed with {}", call_id, status);
                    if let Some(callback) = &self.callback {
                        callback.event_call_end(&call_id, status);
                    }
                }
            }
        }
    }

    pub fn recv_register_response(&self, server: &SipServerInfo, status: u16) {
        info!("REGISTER {}@{} -> {}", server.user_id, server.domain, status);
        if let Some(callback) = &self.callback {
            callback.event_register(server, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::sip::transport::MockSipTransport;

    #[test]
    fn test_unknown_call_sends_nothing() {
        let mut transport = MockSipTransport::new();
        transport.expect_send_sip_message().never();
        let ua = SipUserAgent::new(SipConfig::default(), Arc::new(transport));

        let rtp = SipCallRtp::new("10.0.0.1", 4000, 0);
        assert!(!ua.ring_call("missing", 180, Some(&rtp)));
        assert!(!ua.send_re_invite("missing", &rtp));
        assert!(!ua.send_notify("missing", 200));
        assert!(!ua.accept_call("missing", &rtp));
        assert!(!ua.stop_call("missing", 0));
        assert!(ua.delete_incoming_call("missing").is_none());
        assert!(ua.get_remote_call_rtp("missing").is_none());
        assert!(ua.get_to_id("missing").is_none());
        assert!(ua.get_from_id("missing").is_none());
        assert!(ua.get_cdr("missing").is_none());
        assert!(ua.get_invite_header_value("missing", "X-Test").is_none());
        assert_eq!(ua.get_rseq("missing"), -1);
        assert_eq!(ua.dialog_count(), 0);
    }

    #[test]
    fn test_accept_outgoing_call_leaves_dialog_untouched() {
        let mut transport = MockSipTransport::new();
        transport.expect_send_sip_message().times(1).return_const(());
        let ua = SipUserAgent::new(SipConfig::default(), Arc::new(transport));

        let offered = SipCallRtp::new("10.0.0.1", 4000, 0);
        let call_id = ua.start_call("1000", "2000", &offered).unwrap();

        assert!(!ua.accept_call(&call_id, &SipCallRtp::new("10.0.0.9", 6000, 8)));
        let local = ua.dialogs.with_dialog(&call_id, |d| d.local_rtp.clone()).flatten();
        assert_eq!(local, Some(offered));
        assert!(ua.is_ring_call(&call_id, None));
    }

    #[test]
    fn test_start_call_sends_invite() {
        let mut transport = MockSipTransport::new();
        transport
            .expect_send_sip_message()
            .withf(|m| {
                m.as_request()
                    .is_some_and(|r| r.method() == Some(SipMethod::Invite))
            })
            .times(1)
            .return_const(());
        let ua = SipUserAgent::new(SipConfig::default(), Arc::new(transport));

        let call_id = ua
            .start_call("1000", "2000", &SipCallRtp::new("10.0.0.1", 4000, 0))
            .unwrap();
        assert!(ua.is_ring_call(&call_id, Some("2000")));
        assert_eq!(ua.get_from_id(&call_id), Some("1000".to_string()));
    }
}
