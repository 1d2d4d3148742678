//! User agent event callbacks

use crate::domain::rtp::SipCallRtp;

/// Registrar the agent registers with
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SipServerInfo {
    pub ip: String,
    pub port: u16,
    pub domain: String,
    pub user_id: String,
    pub expires: u32,
}

/// Events raised by the user agent
///
/// Implementations are called from whichever thread processed the triggering
/// message, never while the dialog table is locked.
pub trait SipUserAgentCallback: Send + Sync {
    /// REGISTER response received
    fn event_register(&self, server: &SipServerInfo, status: u16);

    /// New incoming INVITE
    fn event_incoming_call(&self, call_id: &str, from: &str, to: &str, rtp: Option<&SipCallRtp>);

    /// 1xx received for an outgoing call
    fn event_call_ring(&self, call_id: &str, sip_status: u16, rtp: Option<&SipCallRtp>);

    /// Call answered
    fn event_call_start(&self, call_id: &str, rtp: Option<&SipCallRtp>);

    /// Call ended
    ///
    /// `sip_status` is the INVITE error response (or 487 for a peer CANCEL) when the
    /// call never connected, and `0` when a connected call was cleared by the peer's BYE.
    fn event_call_end(&self, call_id: &str, sip_status: u16);
}
