//! sipua - SIP user agent with a concurrent dialog table and a STUN codec
//!
//! Layered the same way as the rest of the project: `domain` holds plain call
//! data, `infrastructure::protocols` holds the SIP dialog engine and the STUN
//! codec, and `application` relays user agent events to the application.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use config::Config;
pub use domain::{CallDirection, SipCallRtp, SipCdr};
pub use infrastructure::protocols::sip::{SipTransport, SipUserAgent, SipUserAgentCallback};
pub use infrastructure::protocols::stun::{StunCredential, StunMessage};
