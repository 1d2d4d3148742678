//! SIP dialog table
//!
//! Call-ID to [`SipDialog`] map behind a single mutex. Every operation does its
//! lookup and mutation while holding the lock and returns whatever must be sent,
//! so callers can dispatch after the guard is dropped.

use super::dialog::{SipDialog, ALLOW_METHODS};
use super::message::{SipError, SipMessage, SipRequest};
use crate::domain::cdr::SipCdr;
use crate::domain::rtp::SipCallRtp;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
pub struct SipDialogMap {
    dialogs: Mutex<HashMap<String, SipDialog>>,
}

impl SipDialogMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SipDialog>> {
        // A panic in another holder cannot leave a half-updated entry, so keep going
        self.dialogs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a dialog; returns false when the Call-ID is already tracked
    pub fn insert(&self, dialog: SipDialog) -> bool {
        let mut dialogs = self.lock();
        if dialogs.contains_key(&dialog.call_id) {
            return false;
        }
        dialogs.insert(dialog.call_id.clone(), dialog);
        true
    }

    pub fn remove(&self, call_id: &str) -> Option<SipDialog> {
        self.lock().remove(call_id)
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.lock().contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` on the dialog while holding the table lock
    pub fn with_dialog<R>(&self, call_id: &str, f: impl FnOnce(&mut SipDialog) -> R) -> Option<R> {
        self.lock().get_mut(call_id).map(f)
    }

    /// Remove the dialog when `pred` accepts it
    pub fn remove_if(&self, call_id: &str, pred: impl FnOnce(&SipDialog) -> bool) -> Option<SipDialog> {
        let mut dialogs = self.lock();
        if pred(dialogs.get(call_id)?) {
            dialogs.remove(call_id)
        } else {
            None
        }
    }

    /// Hand the stored INVITE of a pending call back to the caller and drop the dialog
    pub fn delete_incoming_call(&self, call_id: &str) -> Option<SipRequest> {
        let mut dialogs = self.lock();
        let dialog = dialogs.get_mut(call_id)?;
        if dialog.is_connected() {
            return None;
        }
        let invite = dialog.invite.take()?;
        dialogs.remove(call_id);
        debug!("Deleted incoming call {}", call_id);
        Some(invite)
    }

    /// Build a provisional response for a pending call
    pub fn ring_call(
        &self,
        call_id: &str,
        sip_status: u16,
        rtp: Option<&SipCallRtp>,
    ) -> Option<Result<SipMessage, SipError>> {
        let mut dialogs = self.lock();
        let dialog = dialogs.get_mut(call_id)?;
        if dialog.is_connected() || dialog.invite.is_none() {
            return None;
        }

        let mut message = match dialog.create_invite_response(sip_status)? {
            Ok(response) => SipMessage::from(response),
            Err(e) => return Some(Err(e)),
        };

        if let Some(rtp) = rtp {
            dialog.set_local_rtp(rtp);
            dialog.add_sdp(&mut message);
        }

        if dialog.rseq != -1 {
            message.add_header("Allow", ALLOW_METHODS);
            message.add_header("Require", "100rel");
            message.add_header("RSeq", &dialog.rseq.to_string());
            dialog.rseq += 1;
        }

        Some(Ok(message))
    }

    pub fn get_remote_call_rtp(&self, call_id: &str) -> Option<SipCallRtp> {
        self.lock().get(call_id)?.select_remote_rtp()
    }

    pub fn get_to_id(&self, call_id: &str) -> Option<String> {
        self.lock().get(call_id).map(|d| d.to_id.clone())
    }

    pub fn get_from_id(&self, call_id: &str) -> Option<String> {
        self.lock().get(call_id).map(|d| d.from_id.clone())
    }

    pub fn get_cdr(&self, call_id: &str) -> Option<SipCdr> {
        self.lock().get(call_id).map(SipDialog::cdr)
    }

    /// True while the call exists, is unanswered and (if given) is addressed to `to_id`
    pub fn is_ring_call(&self, call_id: &str, to_id: Option<&str>) -> bool {
        match self.lock().get(call_id) {
            Some(dialog) if !dialog.is_connected() => match to_id {
                Some(to_id) => dialog.to_id == to_id,
                None => true,
            },
            _ => false,
        }
    }

    /// Header value from the stored INVITE's generic header index
    pub fn get_invite_header_value(&self, call_id: &str, header_name: &str) -> Option<String> {
        let dialogs = self.lock();
        let invite = dialogs.get(call_id)?.invite.as_ref()?;
        invite.get_header(header_name)
    }

    /// RSeq of the dialog, `-1` when absent
    pub fn get_rseq(&self, call_id: &str) -> i32 {
        self.lock().get(call_id).map(|d| d.rseq).unwrap_or(-1)
    }

    pub fn set_rseq(&self, call_id: &str, rseq: i32) {
        if let Some(dialog) = self.lock().get_mut(call_id) {
            dialog.rseq = rseq;
        }
    }

    /// Dialog flag first, then what the stored INVITE declares
    pub fn is_100rel(&self, call_id: &str) -> bool {
        match self.lock().get(call_id) {
            Some(dialog) => {
                dialog.is_100rel
                    || dialog
                        .invite
                        .as_ref()
                        .is_some_and(SipRequest::is_100rel)
            }
            None => false,
        }
    }

    /// Record the new local RTP and build a re-INVITE for it
    pub fn re_invite(&self, call_id: &str, rtp: &SipCallRtp) -> Option<Result<SipRequest, SipError>> {
        let mut dialogs = self.lock();
        let dialog = dialogs.get_mut(call_id)?;
        dialog.set_local_rtp(rtp);
        Some(dialog.create_invite())
    }

    pub fn notify(&self, call_id: &str) -> Option<Result<SipRequest, SipError>> {
        self.lock().get_mut(call_id).map(SipDialog::create_notify)
    }
}
