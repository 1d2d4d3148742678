//! Call Detail Record (CDR) domain model
//!
//! A CDR is a snapshot copied out of a live dialog for billing and auditing.
//! The dialog is dropped when the call ends, so a CDR never describes a
//! finished call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// INVITE received from the peer
    Inbound,
    /// INVITE sent by this agent
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }
}

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Ringing, not yet answered
    Pending,
    /// Answered
    Active,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Active => "active",
        }
    }
}

/// Call Detail Record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipCdr {
    /// SIP Call-ID
    pub call_id: String,

    pub from_id: String,
    pub to_id: String,
    pub direction: CallDirection,

    /// INVITE sent or received
    pub invite_time: DateTime<Utc>,
    /// Answer time, `None` while ringing
    pub start_time: Option<DateTime<Utc>>,

    /// Final SIP status of the INVITE transaction, 0 while unknown
    pub sip_status: u16,
}

impl SipCdr {
    pub fn status(&self) -> CallStatus {
        match self.start_time {
            None => CallStatus::Pending,
            Some(_) => CallStatus::Active,
        }
    }

    /// Talk time so far in seconds
    pub fn call_duration(&self) -> Option<i64> {
        let start = self.start_time?;
        Some((Utc::now() - start).num_seconds().max(0))
    }

    /// Setup time in seconds (INVITE to answer)
    pub fn setup_duration(&self) -> Option<i64> {
        self.start_time
            .map(|start| (start - self.invite_time).num_seconds().max(0))
    }
}
