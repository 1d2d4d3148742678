//! Domain layer
//!
//! Plain data shared by the protocol layer and the application: RTP endpoint
//! descriptions and call detail records.

pub mod cdr;
pub mod rtp;

pub use cdr::{CallDirection, CallStatus, SipCdr};
pub use rtp::{RtpDirection, SipCallRtp};
