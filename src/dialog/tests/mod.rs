use crate::transport::ReplySink;
use rsip::headers::*;
use rsip::{Method, Request, SipMessage, StatusCode};
use std::path::PathBuf;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

mod test_dialog;

pub(super) const URN_CONTACT: &str =
    "<sip:alice@127.0.0.1:5070;transport=udp>;+sip.instance=\"<urn:uuid:aaa-bbb-ccc>\"";

pub(super) fn pcmu_offer(rtp_port: u16) -> Vec<u8> {
    format!(
        "v=0\r\n\
         o=alice 2890844526 2890844527 IN IP4 127.0.0.1\r\n\
         s=Talk\r\n\
         c=IN IP4 127.0.0.1\r\n\
         t=0 0\r\n\
         m=audio {} RTP/AVP 0\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=ssrc:1234 cname:alice\r\n",
        rtp_port
    )
    .into_bytes()
}

pub(super) fn request(
    method: Method,
    cseq: &str,
    call_id: &str,
    contact: Option<&str>,
    body: Vec<u8>,
) -> Request {
    let mut headers: Vec<rsip::Header> = vec![
        Via::new("SIP/2.0/UDP 127.0.0.1:5070;branch=z9hG4bKnashds").into(),
        MaxForwards::new("70").into(),
        From::new("Alice <sip:alice@example.com>;tag=f1").into(),
        To::new("<sip:playout@127.0.0.1:5061>").into(),
        CallId::new(call_id).into(),
        CSeq::new(cseq).into(),
    ];
    if let Some(contact) = contact {
        headers.push(Contact::new(contact).into());
    }
    if !body.is_empty() {
        headers.push(ContentType::new("application/sdp").into());
    }
    Request {
        method,
        uri: rsip::Uri::try_from("sip:playout@127.0.0.1:5061").unwrap(),
        headers: headers.into(),
        version: rsip::Version::V2,
        body,
    }
}

pub(super) fn register_request(cseq: &str, call_id: &str) -> Request {
    let mut req = request(Method::Register, cseq, call_id, Some(URN_CONTACT), vec![]);
    req.headers.push(Expires::new("3600").into());
    req
}

pub(super) fn invite_request(cseq: &str, call_id: &str) -> Request {
    request(
        Method::Invite,
        cseq,
        call_id,
        Some(URN_CONTACT),
        pcmu_offer(40000),
    )
}

pub(super) fn channel_sink() -> (ReplySink, UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = unbounded_channel();
    (ReplySink::Channel(tx), rx)
}

pub(super) fn next_status(rx: &mut UnboundedReceiver<Vec<u8>>) -> StatusCode {
    next_response(rx).status_code
}

pub(super) fn next_response(rx: &mut UnboundedReceiver<Vec<u8>>) -> rsip::Response {
    let bytes = rx.try_recv().expect("expected a response");
    let text = String::from_utf8(bytes).expect("response is utf8");
    match SipMessage::try_from(text.as_str()).expect("response parses") {
        SipMessage::Response(resp) => resp,
        SipMessage::Request(_) => panic!("expected a response, got a request"),
    }
}

/// A short μ-law file on disk for playout to read.
pub(super) fn audio_fixture(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sip-playout-tests-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, vec![0x7fu8; 320]).unwrap();
    path
}
