//! User agent call flow tests

mod common;

use common::{invite, method_of, peer_request, status_of, Recorder, RecordingTransport};
use sipua::application::UaEvent;
use sipua::config::SipConfig;
use sipua::domain::{CallDirection, SipCallRtp};
use sipua::infrastructure::protocols::sip::{
    ResponseBuilder, SdpSession, SipMethod, SipRequest, SipServerInfo, SipUserAgent,
};
use sipua::infrastructure::protocols::sip::user_agent::NORMAL_CLEARING_STATUS;
use std::sync::Arc;

const CALL_ID: &str = "call-1@192.168.1.100";

fn user_agent(config: SipConfig) -> (SipUserAgent, Arc<RecordingTransport>, Arc<Recorder>) {
    let transport = Arc::new(RecordingTransport::default());
    let recorder = Arc::new(Recorder::default());
    let ua = SipUserAgent::new(config, transport.clone()).with_callback(recorder.clone());
    (ua, transport, recorder)
}

fn local_rtp() -> SipCallRtp {
    SipCallRtp::new("10.0.0.1", 20000, 0).with_codecs(vec![0, 101])
}

#[test]
fn test_incoming_call_answer_and_hangup() {
    let (ua, transport, recorder) = user_agent(SipConfig::default());

    ua.recv_request(invite(CALL_ID, "X-Account: 42\r\n"));
    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(status_of(&sent[0]), Some(100));

    let events = recorder.take();
    match &events[..] {
        [UaEvent::IncomingCall { call_id, from, to, rtp: Some(rtp) }] => {
            assert_eq!(call_id, CALL_ID);
            assert_eq!(from, "alice");
            assert_eq!(to, "bob");
            assert_eq!(rtp.port, 4000);
            assert_eq!(rtp.codec_list, vec![0, 8, 101]);
        }
        other => panic!("unexpected events {:?}", other),
    }

    assert!(ua.is_ring_call(CALL_ID, None));
    assert!(ua.is_ring_call(CALL_ID, Some("bob")));
    assert_eq!(ua.get_from_id(CALL_ID), Some("alice".to_string()));
    assert_eq!(ua.get_to_id(CALL_ID), Some("bob".to_string()));
    assert_eq!(ua.get_invite_header_value(CALL_ID, "x-account"), Some("42".to_string()));
    assert_eq!(ua.get_invite_header_value(CALL_ID, "Call-ID"), None);
    assert_eq!(ua.get_remote_call_rtp(CALL_ID).map(|r| r.ip), Some("192.168.1.100".to_string()));

    assert!(ua.ring_call(CALL_ID, 183, Some(&local_rtp())));
    let sent = transport.take();
    assert_eq!(status_of(&sent[0]), Some(183));
    assert!(sent[0].body_str().contains("m=audio 20000"));
    assert_eq!(sent[0].get_header("RSeq"), None);

    assert!(ua.accept_call(CALL_ID, &local_rtp()));
    let sent = transport.take();
    assert_eq!(status_of(&sent[0]), Some(200));
    assert!(sent[0].body_str().contains("m=audio 20000"));
    assert!(!ua.is_ring_call(CALL_ID, None));
    assert!(!ua.accept_call(CALL_ID, &local_rtp()));

    let cdr = ua.get_cdr(CALL_ID).unwrap();
    assert_eq!(cdr.direction, CallDirection::Inbound);
    assert_eq!(cdr.sip_status, 200);
    assert!(cdr.start_time.is_some());

    assert!(ua.stop_call(CALL_ID, 0));
    let sent = transport.take();
    assert_eq!(method_of(&sent[0]), Some(SipMethod::Bye));
    assert_eq!(ua.dialog_count(), 0);
}

#[test]
fn test_reliable_provisional_responses() {
    let (ua, transport, _) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, "Require: 100rel\r\n"));
    transport.take();

    assert!(ua.is_100rel(CALL_ID));
    assert_eq!(ua.get_rseq(CALL_ID), 1);

    assert!(ua.ring_call(CALL_ID, 180, None));
    assert!(ua.ring_call(CALL_ID, 183, Some(&local_rtp())));
    let sent = transport.take();
    assert_eq!(sent[0].get_header("RSeq"), Some("1".to_string()));
    assert_eq!(sent[0].get_header("Require"), Some("100rel".to_string()));
    assert_eq!(sent[1].get_header("RSeq"), Some("2".to_string()));
    assert_eq!(ua.get_rseq(CALL_ID), 3);

    ua.set_rseq(CALL_ID, 10);
    assert_eq!(ua.get_rseq(CALL_ID), 10);
}

#[test]
fn test_supported_100rel_depends_on_config() {
    let (ua, transport, _) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, "Supported: 100rel\r\n"));
    assert_eq!(ua.get_rseq(CALL_ID), -1);
    // The stored INVITE still declares it
    assert!(ua.is_100rel(CALL_ID));
    assert!(ua.ring_call(CALL_ID, 180, None));
    assert_eq!(transport.take()[1].get_header("RSeq"), None);

    let config = SipConfig {
        use_100rel: true,
        ..SipConfig::default()
    };
    let (ua, _, _) = user_agent(config);
    ua.recv_request(invite(CALL_ID, "Supported: 100rel\r\n"));
    assert_eq!(ua.get_rseq(CALL_ID), 1);
}

#[test]
fn test_delete_incoming_call_hands_back_invite() {
    let (ua, transport, _) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, ""));
    transport.take();

    let stored = ua.delete_incoming_call(CALL_ID).unwrap();
    assert_eq!(stored.call_id(), Some(CALL_ID.to_string()));
    assert!(ua.delete_incoming_call(CALL_ID).is_none());
    assert!(!ua.ring_call(CALL_ID, 180, None));
    assert!(transport.take().is_empty());
}

#[test]
fn test_peer_cancel_sends_487() {
    let (ua, transport, recorder) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, ""));
    transport.take();
    recorder.take();

    ua.recv_request(peer_request("CANCEL", CALL_ID, 1));
    let statuses: Vec<_> = transport.take().iter().filter_map(status_of).collect();
    assert_eq!(statuses, vec![200, 487]);
    assert_eq!(
        recorder.take(),
        vec![UaEvent::CallEnd {
            call_id: CALL_ID.to_string(),
            status: 487
        }]
    );
    assert_eq!(ua.dialog_count(), 0);
}

#[test]
fn test_reject_incoming_call() {
    let (ua, transport, _) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, ""));
    transport.take();

    assert!(ua.stop_call(CALL_ID, 486));
    assert_eq!(status_of(&transport.take()[0]), Some(486));

    ua.recv_request(invite("call-2", ""));
    transport.take();
    assert!(ua.stop_call("call-2", 0));
    assert_eq!(status_of(&transport.take()[0]), Some(603));
}

#[test]
fn test_peer_bye_and_unknown_requests() {
    let (ua, transport, recorder) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, ""));
    ua.accept_call(CALL_ID, &local_rtp());
    transport.take();
    recorder.take();

    ua.recv_request(peer_request("BYE", CALL_ID, 2));
    assert_eq!(status_of(&transport.take()[0]), Some(200));
    assert_eq!(
        recorder.take(),
        vec![UaEvent::CallEnd {
            call_id: CALL_ID.to_string(),
            status: NORMAL_CLEARING_STATUS
        }]
    );

    ua.recv_request(peer_request("BYE", CALL_ID, 3));
    assert_eq!(status_of(&transport.take()[0]), Some(481));

    ua.recv_request(peer_request("OPTIONS", "other", 1));
    assert_eq!(status_of(&transport.take()[0]), Some(501));
}

#[test]
fn test_reinvite_from_peer_updates_remote_rtp() {
    let (ua, transport, _) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, ""));
    ua.accept_call(CALL_ID, &local_rtp());
    let local_tag = transport.take().last().unwrap().as_response().unwrap().to_tag().unwrap();

    let text = common::invite_text(CALL_ID, "")
        .replace("To: Bob <sip:bob@example.com>", &format!("To: Bob <sip:bob@example.com>;tag={}", local_tag))
        .replace("CSeq: 1 INVITE", "CSeq: 2 INVITE")
        .replace("m=audio 4000", "m=audio 4002");
    let reinvite = SipRequest::parse(text.as_bytes()).unwrap();
    ua.recv_request(reinvite.clone());

    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    let ok = sent[0].as_response().unwrap();
    assert_eq!(ok.status_code(), 200);
    assert_eq!(ok.to_tag(), Some(local_tag));
    assert!(sent[0].body_str().contains("m=audio 20000"));
    assert_eq!(ua.get_remote_call_rtp(CALL_ID).map(|r| r.port), Some(4002));
    assert_eq!(ua.dialog_count(), 1);

    // A retransmitted re-INVITE is not answered twice
    ua.recv_request(reinvite);
    assert!(transport.take().is_empty());
}

#[test]
fn test_invite_retransmission_is_not_answered() {
    let (ua, transport, recorder) = user_agent(SipConfig::default());
    ua.recv_request(invite(CALL_ID, ""));
    assert!(ua.ring_call(CALL_ID, 180, None));
    transport.take();
    recorder.take();

    ua.recv_request(invite(CALL_ID, ""));

    let sent = transport.take();
    assert!(
        sent.iter().all(|m| !status_of(m).is_some_and(|s| (200..300).contains(&s))),
        "ringing call answered by a retransmitted INVITE: {:?}",
        sent.iter().map(status_of).collect::<Vec<_>>()
    );
    assert!(recorder.take().is_empty());
    assert!(ua.is_ring_call(CALL_ID, None));
    assert!(ua.get_cdr(CALL_ID).unwrap().start_time.is_none());

    // The initial INVITE repeated after answer is absorbed too
    assert!(ua.accept_call(CALL_ID, &local_rtp()));
    transport.take();
    ua.recv_request(invite(CALL_ID, ""));
    assert!(transport.take().is_empty());
}

/// 180 and 200 for an INVITE we sent, the way the callee would build them
fn peer_responses(invite: &SipRequest) -> (sipua::infrastructure::protocols::sip::SipResponse, sipua::infrastructure::protocols::sip::SipResponse) {
    let ringing = ResponseBuilder::new(180)
        .to_tag("peer-tag")
        .build_for_request(invite)
        .unwrap();
    let sdp = SdpSession::from_rtp(&SipCallRtp::new("10.0.0.2", 30000, 8)).to_string();
    let ok = ResponseBuilder::ok()
        .to_tag("peer-tag")
        .header(rsip::Header::Contact("<sip:echo@10.0.0.2:5060>".to_string().into()))
        .body("application/sdp", sdp.into_bytes())
        .build_for_request(invite)
        .unwrap();
    (ringing, ok)
}

#[test]
fn test_outgoing_call_flow() {
    let (ua, transport, recorder) = user_agent(SipConfig::default());
    let call_id = ua.start_call("1000", "echo", &local_rtp()).unwrap();

    let sent = transport.take();
    let invite = sent[0].as_request().unwrap().clone();
    assert_eq!(invite.method(), Some(SipMethod::Invite));
    assert_eq!(invite.call_id(), Some(call_id.clone()));
    assert!(ua.is_ring_call(&call_id, Some("echo")));

    let (ringing, ok) = peer_responses(&invite);
    ua.recv_response(ringing);
    assert_eq!(
        recorder.take(),
        vec![UaEvent::CallRing {
            call_id: call_id.clone(),
            status: 180,
            rtp: None
        }]
    );

    ua.recv_response(ok.clone());
    let sent = transport.take();
    let ack = sent[0].as_request().unwrap();
    assert_eq!(ack.method(), Some(SipMethod::Ack));
    assert_eq!(ack.to_tag(), Some("peer-tag".to_string()));
    assert_eq!(ack.uri().to_string(), "sip:echo@10.0.0.2:5060");

    match &recorder.take()[..] {
        [UaEvent::CallStart { call_id: id, rtp: Some(rtp) }] => {
            assert_eq!(id, &call_id);
            assert_eq!(rtp.port, 30000);
            assert_eq!(rtp.codec, 8);
        }
        other => panic!("unexpected events {:?}", other),
    }

    // A retransmitted 200 is ACKed again without a second start event
    ua.recv_response(ok);
    assert_eq!(method_of(&transport.take()[0]), Some(SipMethod::Ack));
    assert!(recorder.take().is_empty());

    let cdr = ua.get_cdr(&call_id).unwrap();
    assert_eq!(cdr.direction, CallDirection::Outbound);
    assert_eq!(cdr.to_id, "echo");
}

#[test]
fn test_reinvite_and_notify() {
    let (ua, transport, _) = user_agent(SipConfig::default());
    let call_id = ua.start_call("1000", "echo", &local_rtp()).unwrap();
    let invite = transport.take()[0].as_request().unwrap().clone();
    let (_, ok) = peer_responses(&invite);
    ua.recv_response(ok);
    transport.take();

    let moved = SipCallRtp::new("10.0.0.9", 20002, 0);
    assert!(ua.send_re_invite(&call_id, &moved));
    let sent = transport.take();
    let reinvite = sent[0].as_request().unwrap();
    assert_eq!(reinvite.method(), Some(SipMethod::Invite));
    assert_eq!(reinvite.cseq(), Some(2));
    assert_eq!(reinvite.to_tag(), Some("peer-tag".to_string()));
    assert!(sent[0].body_str().contains("c=IN IP4 10.0.0.9"));

    assert!(ua.send_notify(&call_id, 180));
    assert!(ua.send_notify(&call_id, 200));
    let sent = transport.take();
    assert_eq!(method_of(&sent[0]), Some(SipMethod::Notify));
    assert_eq!(sent[0].get_header("Event"), Some("refer".to_string()));
    assert_eq!(sent[0].get_header("Subscription-State"), Some("active".to_string()));
    assert_eq!(sent[0].body_str(), "SIP/2.0 180 Ringing");
    assert_eq!(
        sent[0].content_type(),
        Some("message/sipfrag;version=2.0".to_string())
    );
    assert_eq!(sent[1].get_header("Subscription-State"), Some("terminated".to_string()));
    assert_eq!(sent[1].body_str(), "SIP/2.0 200 OK");
}

#[test]
fn test_outgoing_call_rejected() {
    let (ua, transport, recorder) = user_agent(SipConfig::default());
    let call_id = ua.start_call("1000", "busy", &local_rtp()).unwrap();
    let invite = transport.take()[0].as_request().unwrap().clone();

    let busy = ResponseBuilder::new(486)
        .to_tag("peer-tag")
        .build_for_request(&invite)
        .unwrap();
    ua.recv_response(busy);

    assert_eq!(method_of(&transport.take()[0]), Some(SipMethod::Ack));
    assert_eq!(
        recorder.take(),
        vec![UaEvent::CallEnd {
            call_id: call_id.clone(),
            status: 486
        }]
    );
    assert!(ua.get_cdr(&call_id).is_none());
}

#[test]
fn test_cancel_unanswered_outgoing_call() {
    let (ua, transport, _) = user_agent(SipConfig::default());
    let call_id = ua.start_call("1000", "echo", &local_rtp()).unwrap();
    let invite = transport.take()[0].as_request().unwrap().clone();

    assert!(ua.stop_call(&call_id, 0));
    let sent = transport.take();
    let cancel = sent[0].as_request().unwrap();
    assert_eq!(cancel.method(), Some(SipMethod::Cancel));
    assert_eq!(cancel.cseq(), invite.cseq());
    assert!(!ua.stop_call(&call_id, 0));
}

#[test]
fn test_register_response_reaches_callback() {
    let (ua, _, recorder) = user_agent(SipConfig::default());
    let server = SipServerInfo {
        ip: "10.0.0.254".to_string(),
        port: 5060,
        domain: "pbx.local".to_string(),
        user_id: "1000".to_string(),
        expires: 3600,
    };
    ua.recv_register_response(&server, 200);
    assert_eq!(recorder.take(), vec![UaEvent::Register { server, status: 200 }]);
}
