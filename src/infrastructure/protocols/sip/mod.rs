//! SIP protocol implementation
//!
//! Dialog-level user agent on top of `rsip` message types.
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────┐
//! │   Application Layer     │
//! │  (callback / relay)     │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │    User Agent           │
//! │  (call control)         │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │    Dialog Table         │
//! │  (Call-ID -> dialog)    │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transport (trait)     │
//! └─────────────────────────┘
//! ```

pub mod builder;
pub mod callback;
pub mod dialog;
pub mod dialog_map;
pub mod message;
pub mod sdp;
pub mod status;
pub mod transport;
pub mod user_agent;

pub use builder::{RequestBuilder, ResponseBuilder};
pub use callback::{SipServerInfo, SipUserAgentCallback};
pub use dialog::SipDialog;
pub use dialog_map::SipDialogMap;
pub use message::{SipError, SipMessage, SipMethod, SipRequest, SipResponse};
pub use sdp::SdpSession;
pub use status::reason_phrase;
pub use transport::{LoggingTransport, SipTransport};
pub use user_agent::SipUserAgent;
