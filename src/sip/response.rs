use super::{random_tag, sdp::AudioOffer};
use crate::media::MediaOptions;
use crate::{Error, Result};
use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};
use rsip::{Header, Headers, Method, Param, Request, Response, StatusCode};

/// Build a response to `req` with no message body.
///
/// Headers mirror the request: Via, From, To (a tag is generated when the
/// request carried none), Call-ID and CSeq are copied; Allow is never
/// emitted. REGISTER responses echo the Contact and Expires headers
/// verbatim. BYE and CANCEL synthesize a To from the request uri when the
/// request had none. ACKs are never answered.
pub fn respond(req: &Request, status: StatusCode) -> Result<Response> {
    match req.method {
        Method::Register => {
            let mut headers = base_headers(req, &status);
            for header in req.headers.iter() {
                match header {
                    Header::Contact(c) => headers.push(Header::Contact(c.clone())),
                    Header::Expires(e) => headers.push(Header::Expires(e.clone())),
                    _ => {}
                }
            }
            Ok(assemble(req, status, headers, vec![]))
        }
        Method::Invite | Method::Bye | Method::Cancel => {
            let headers = base_headers(req, &status);
            Ok(assemble(req, status, headers, vec![]))
        }
        Method::Ack => Err(Error::UnsupportedForAck),
        ref method => Err(Error::UnsupportedMethod(method.to_string())),
    }
}

/// Build an INVITE response carrying the SDP answer. The Contact points
/// at the request uri, per the original exchange shape.
pub fn respond_with_answer(
    req: &Request,
    status: StatusCode,
    offer: &AudioOffer,
    opts: &MediaOptions,
) -> Result<Response> {
    if req.method != Method::Invite {
        return Err(Error::UnsupportedMethod(req.method.to_string()));
    }
    let mut headers = base_headers(req, &status);
    headers.push(rsip::typed::Contact::from(req.uri.clone()).into());
    headers.push(Header::ContentType("application/sdp".into()));
    Ok(assemble(req, status, headers, offer.answer_body(opts)))
}

/// Copy the dialog-identifying headers of `req` into a fresh header set.
fn base_headers(req: &Request, status: &StatusCode) -> Headers {
    let mut to: Option<rsip::headers::To> = None;
    let mut headers = Headers::default();

    for header in req.headers.iter() {
        match header {
            Header::Via(via) => headers.push(Header::Via(via.clone())),
            Header::From(from) => headers.push(Header::From(from.clone())),
            Header::To(t) => to = Some(t.clone()),
            _ => {}
        }
    }

    // some clients leave To out entirely; answer as if they had asked us
    let to = to.unwrap_or_else(|| match req.method {
        Method::Register => match req.from_header() {
            Ok(from) => rsip::headers::To::new(from.value()),
            Err(_) => rsip::headers::To::new(format!("<{}>", req.uri)),
        },
        _ => rsip::headers::To::new(format!("<{}>", req.uri)),
    });
    headers.push(Header::To(ensure_to_tag(to, status)));

    for header in req.headers.iter() {
        match header {
            Header::CallId(call_id) => headers.push(Header::CallId(call_id.clone())),
            Header::CSeq(cseq) => headers.push(Header::CSeq(cseq.clone())),
            _ => {}
        }
    }

    headers
}

/// Final responses identify our side of the dialog with a To tag; 100
/// Trying stays untagged.
fn ensure_to_tag(to: rsip::headers::To, status: &StatusCode) -> rsip::headers::To {
    if *status == StatusCode::Trying {
        return to;
    }
    match to.typed() {
        Ok(mut typed) => {
            if !typed.params.iter().any(|p| matches!(p, Param::Tag(_))) {
                typed.params.push(Param::Tag(random_tag()));
            }
            typed.into()
        }
        Err(_) => to,
    }
}

fn assemble(req: &Request, status: StatusCode, mut headers: Headers, body: Vec<u8>) -> Response {
    headers.push(Header::ContentLength((body.len() as u32).into()));
    Response {
        status_code: status,
        headers,
        body,
        version: req.version.clone(),
    }
}
