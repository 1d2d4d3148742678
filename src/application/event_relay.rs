//! Event relay
//!
//! Moves user agent callbacks from signaling threads to a single consumer task.
//! Registration results are posted and forgotten; call events block the
//! signaling thread until the consumer has handled them, so the application
//! observes each call's events in order and before the next message for that
//! call is processed.

use crate::domain::rtp::SipCallRtp;
use crate::infrastructure::protocols::sip::callback::{SipServerInfo, SipUserAgentCallback};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// User agent event as delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum UaEvent {
    Register {
        server: SipServerInfo,
        status: u16,
    },
    IncomingCall {
        call_id: String,
        from: String,
        to: String,
        rtp: Option<SipCallRtp>,
    },
    CallRing {
        call_id: String,
        status: u16,
        rtp: Option<SipCallRtp>,
    },
    CallStart {
        call_id: String,
        rtp: Option<SipCallRtp>,
    },
    CallEnd {
        call_id: String,
        status: u16,
    },
}

impl UaEvent {
    /// Forward the event to a callback implementation
    pub fn dispatch(&self, handler: &dyn SipUserAgentCallback) {
        match self {
            UaEvent::Register { server, status } => handler.event_register(server, *status),
            UaEvent::IncomingCall { call_id, from, to, rtp } => {
                handler.event_incoming_call(call_id, from, to, rtp.as_ref())
            }
            UaEvent::CallRing { call_id, status, rtp } => {
                handler.event_call_ring(call_id, *status, rtp.as_ref())
            }
            UaEvent::CallStart { call_id, rtp } => handler.event_call_start(call_id, rtp.as_ref()),
            UaEvent::CallEnd { call_id, status } => handler.event_call_end(call_id, *status),
        }
    }
}

struct Envelope {
    event: UaEvent,
    ack: Option<oneshot::Sender<()>>,
}

/// Producer side, registered with the user agent as its callback
///
/// Blocking sends use `blocking_recv`, so the call-event methods must be
/// invoked from plain threads (or `spawn_blocking`), never from async tasks.
#[derive(Clone)]
pub struct EventRelay {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Consumer side
pub struct EventRelayReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

pub fn event_relay() -> (EventRelay, EventRelayReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventRelay { tx }, EventRelayReceiver { rx })
}

impl EventRelay {
    /// Queue without waiting; false when the consumer is gone
    pub fn post(&self, event: UaEvent) -> bool {
        self.tx.send(Envelope { event, ack: None }).is_ok()
    }

    /// Queue and wait until the consumer has handled the event
    pub fn send(&self, event: UaEvent) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(Envelope {
                event,
                ack: Some(ack_tx),
            })
            .is_err()
        {
            warn!("Event consumer is gone, dropping event");
            return false;
        }
        ack_rx.blocking_recv().is_ok()
    }
}

impl SipUserAgentCallback for EventRelay {
    fn event_register(&self, server: &SipServerInfo, status: u16) {
        let event = UaEvent::Register {
            server: server.clone(),
            status,
        };
        if !self.post(event) {
            warn!("Event consumer is gone, dropping REGISTER result");
        }
    }

    fn event_incoming_call(&self, call_id: &str, from: &str, to: &str, rtp: Option<&SipCallRtp>) {
        self.send(UaEvent::IncomingCall {
            call_id: call_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            rtp: rtp.cloned(),
        });
    }

    fn event_call_ring(&self, call_id: &str, sip_status: u16, rtp: Option<&SipCallRtp>) {
        self.send(UaEvent::CallRing {
            call_id: call_id.to_string(),
            status: sip_status,
            rtp: rtp.cloned(),
        });
    }

    fn event_call_start(&self, call_id: &str, rtp: Option<&SipCallRtp>) {
        self.send(UaEvent::CallStart {
            call_id: call_id.to_string(),
            rtp: rtp.cloned(),
        });
    }

    fn event_call_end(&self, call_id: &str, sip_status: u16) {
        self.send(UaEvent::CallEnd {
            call_id: call_id.to_string(),
            status: sip_status,
        });
    }
}

impl EventRelayReceiver {
    /// Handle one event; returns false once every producer has been dropped
    pub async fn process_next(&mut self, handler: &dyn SipUserAgentCallback) -> bool {
        let Some(envelope) = self.rx.recv().await else {
            return false;
        };
        debug!("Dispatching {:?}", envelope.event);
        envelope.event.dispatch(handler);
        if let Some(ack) = envelope.ack {
            let _ = ack.send(());
        }
        true
    }

    /// Drain events until every producer has been dropped
    pub async fn run(mut self, handler: &dyn SipUserAgentCallback) {
        while self.process_next(handler).await {}
        debug!("Event relay closed");
    }
}
