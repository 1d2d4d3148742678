//! Wire protocols: SIP signaling and the STUN codec

pub mod sip;
pub mod stun;
