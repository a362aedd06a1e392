//! Handler tests for a single dialog driven with a channel sink.

use super::*;
use crate::dialog::dialog::Dialog;
use crate::dialog::fsm::CallState;
use crate::media::MediaOptions;
use crate::sip::sdp::AudioOffer;
use crate::Error;

fn dialog() -> Dialog {
    Dialog::new("aaa-bbb-ccc".to_string(), "127.0.0.1:5070".parse().unwrap()).unwrap()
}

fn offer() -> AudioOffer {
    AudioOffer::parse(&pcmu_offer(40000), false).unwrap()
}

#[tokio::test]
async fn test_register_answers_200_and_records_call_id() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    dialog
        .register_send_ok(&register_request("1 REGISTER", "c1"), &sink)
        .await
        .unwrap();

    assert_eq!(dialog.state(), CallState::RegisterSent200);
    assert_eq!(dialog.register_call_id().as_deref(), Some("c1"));

    let resp = next_response(&mut rx);
    assert_eq!(resp.status_code, StatusCode::OK);
    let rendered = resp.to_string();
    assert!(rendered.contains("urn:uuid:aaa-bbb-ccc"));
    assert!(rendered.contains("Expires: 3600"));
}

#[tokio::test]
async fn test_register_retransmission_is_answered_again() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();
    let req = register_request("1 REGISTER", "c1");

    dialog.register_send_ok(&req, &sink).await.unwrap();
    dialog.register_send_ok(&req, &sink).await.unwrap();

    assert_eq!(dialog.state(), CallState::RegisterSent200);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_register_mid_call_does_not_disturb_the_session() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    dialog
        .register_send_ok(&register_request("1 REGISTER", "c1"), &sink)
        .await
        .unwrap();
    dialog
        .answer_invite(
            &invite_request("2 INVITE", "c2"),
            &offer(),
            &audio_fixture("midcall.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();
    dialog
        .recv_ack(&request(Method::Ack, "2 ACK", "c2", None, vec![]))
        .unwrap();
    assert_eq!(dialog.state(), CallState::CallEstablished);

    dialog
        .register_send_ok(&register_request("3 REGISTER", "c9"), &sink)
        .await
        .unwrap();

    assert_eq!(dialog.state(), CallState::CallEstablished);
    assert_eq!(dialog.register_call_id().as_deref(), Some("c9"));
    // 200 to REGISTER, 200 to INVITE, 200 to mid-call REGISTER
    assert_eq!(next_status(&mut rx), StatusCode::OK);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
}

#[tokio::test]
async fn test_invite_fast_path_and_ack() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    dialog
        .register_send_ok(&register_request("1 REGISTER", "c1"), &sink)
        .await
        .unwrap();
    next_response(&mut rx);

    dialog
        .answer_invite(
            &invite_request("2 INVITE", "c2"),
            &offer(),
            &audio_fixture("fastpath.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();
    assert_eq!(dialog.state(), CallState::InviteSent200);

    let resp = next_response(&mut rx);
    assert_eq!(resp.status_code, StatusCode::OK);
    assert!(!resp.body.is_empty());
    let rendered = resp.to_string();
    assert!(rendered.contains("application/sdp"));
    assert!(rendered.contains("a=sendonly"));

    dialog
        .recv_ack(&request(Method::Ack, "2 ACK", "c2", None, vec![]))
        .unwrap();
    assert_eq!(dialog.state(), CallState::CallEstablished);
    assert!(dialog.knows_call_id("c1"));
    assert!(dialog.knows_call_id("c2"));
}

#[tokio::test]
async fn test_invite_retransmission_reanswers_without_advancing() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();
    let req = invite_request("2 INVITE", "c2");

    dialog
        .answer_invite(
            &req,
            &offer(),
            &audio_fixture("retrans.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();
    assert_eq!(next_status(&mut rx), StatusCode::OK);

    dialog
        .answer_invite(
            &req,
            &offer(),
            &audio_fixture("retrans.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(dialog.state(), CallState::InviteSent200);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_invite_provisional_chain() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();
    let mut req = invite_request("2 INVITE", "c2");
    req.headers
        .push(rsip::headers::Supported::new("100rel").into());

    dialog
        .answer_invite_with_progress(
            &req,
            &offer(),
            &audio_fixture("progress.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(dialog.state(), CallState::InviteSent200);
    assert_eq!(next_status(&mut rx), StatusCode::Trying);
    assert_eq!(next_status(&mut rx), StatusCode::Ringing);
    assert_eq!(next_status(&mut rx), StatusCode::SessionProgress);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_during_setup() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    dialog
        .answer_invite(
            &invite_request("2 INVITE", "c2"),
            &offer(),
            &audio_fixture("cancel.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();
    next_response(&mut rx);

    dialog
        .recv_cancel(&request(Method::Cancel, "3 CANCEL", "c2", None, vec![]), &sink)
        .await
        .unwrap();

    assert_eq!(dialog.state(), CallState::CallCancelled);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_retransmission_reanswers_200() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();
    let cancel = request(Method::Cancel, "3 CANCEL", "c2", None, vec![]);

    dialog
        .answer_invite(
            &invite_request("2 INVITE", "c2"),
            &offer(),
            &audio_fixture("cancel2.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();
    next_response(&mut rx);

    dialog.recv_cancel(&cancel, &sink).await.unwrap();
    dialog.recv_cancel(&cancel, &sink).await.unwrap();

    assert_eq!(dialog.state(), CallState::CallCancelled);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
}

#[tokio::test]
async fn test_bye_of_established_call() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    dialog
        .answer_invite(
            &invite_request("2 INVITE", "c2"),
            &offer(),
            &audio_fixture("bye.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();
    dialog
        .recv_ack(&request(Method::Ack, "2 ACK", "c2", None, vec![]))
        .unwrap();
    next_response(&mut rx);

    dialog
        .recv_bye(&request(Method::Bye, "4 BYE", "c3", None, vec![]), &sink)
        .await
        .unwrap();

    assert_eq!(dialog.state(), CallState::CallTerminated);
    assert_eq!(next_status(&mut rx), StatusCode::OK);

    // same CSeq again is absorbed as a retransmission
    dialog
        .recv_bye(&request(Method::Bye, "4 BYE", "c3", None, vec![]), &sink)
        .await
        .unwrap();
    assert_eq!(dialog.state(), CallState::CallTerminated);
    assert_eq!(next_status(&mut rx), StatusCode::OK);
}

#[tokio::test]
async fn test_bye_without_a_call_gets_481() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    let err = dialog
        .recv_bye(&request(Method::Bye, "4 BYE", "c3", None, vec![]), &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IllegalTransition(_, _)));
    assert_eq!(dialog.state(), CallState::Init);
    assert_eq!(
        next_status(&mut rx),
        StatusCode::CallTransactionDoesNotExist
    );
}

#[tokio::test]
async fn test_request_without_cseq_is_rejected() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    let mut req = request(Method::Bye, "4 BYE", "c3", None, vec![]);
    req.headers.retain(|h| !matches!(h, rsip::Header::CSeq(_)));

    let err = dialog.recv_bye(&req, &sink).await.unwrap_err();
    assert!(matches!(err, Error::MissingCseq));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_empty_dialog_key_is_rejected() {
    assert!(matches!(
        Dialog::new(String::new(), "127.0.0.1:5070".parse().unwrap()),
        Err(Error::MissingKey)
    ));
}

#[tokio::test]
async fn test_ack_with_stale_cseq_does_not_fire_the_automaton() {
    let dialog = dialog();
    let (sink, mut rx) = channel_sink();

    dialog
        .answer_invite(
            &invite_request("2 INVITE", "c2"),
            &offer(),
            &audio_fixture("stale.ulaw"),
            MediaOptions::default(),
            &sink,
        )
        .await
        .unwrap();
    next_response(&mut rx);

    let ack = request(Method::Ack, "2 ACK", "c2", None, vec![]);
    dialog.recv_ack(&ack).unwrap();
    assert_eq!(dialog.state(), CallState::CallEstablished);
    // the duplicate would be an illegal transition if it fired
    dialog.recv_ack(&ack).unwrap();
    assert_eq!(dialog.state(), CallState::CallEstablished);
}

#[test]
fn test_display_includes_key_and_state() {
    let dialog = dialog();
    let rendered = dialog.to_string();
    assert!(rendered.contains("key=aaa-bbb-ccc"));
    assert!(rendered.contains("state=init"));
}
