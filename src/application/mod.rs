//! Application layer
//!
//! Bridges user agent events to the application thread.

pub mod event_relay;

pub use event_relay::{event_relay, EventRelay, EventRelayReceiver, UaEvent};
