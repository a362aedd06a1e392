use crate::{Error, Result};
use rsip::prelude::{HeadersExt, UntypedHeader};
use rsip::{Header, Method, Request};

pub mod response;
pub mod sdp;

const TAG_LEN: usize = 8;

pub fn random_tag() -> rsip::param::Tag {
    random_text(TAG_LEN).into()
}

pub fn random_text(count: usize) -> String {
    use rand::Rng;
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(count)
        .map(char::from)
        .collect::<String>()
}

/// Device-stable id carried as `+sip.instance="<urn:uuid:...>"` on the
/// Contact header. Linphone-style clients send this on every REGISTER,
/// which makes it the preferred dialog key: it survives port remapping
/// and spans call-ids.
///
/// Returns `Ok(None)` when the Contact has no instance parameter,
/// `MissingContact` when there is no Contact at all, and `MalformedUrn`
/// when the urn is not of the `urn:uuid:<id>` shape.
pub fn instance_id(req: &Request) -> Result<Option<String>> {
    let contact = req.contact_header().map_err(|_| Error::MissingContact)?;
    let raw = contact.value();

    // contact params follow the closing '>' of the address; params inside
    // the brackets (;transport=udp) belong to the uri
    let params = match raw.find('>') {
        Some(pos) => &raw[pos + 1..],
        None => match raw.find(';') {
            Some(pos) => &raw[pos..],
            None => "",
        },
    };

    for param in params.split(';') {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("+sip.instance") {
            continue;
        }
        let value = value.trim().trim_matches('"');
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() != 3 {
            return Err(Error::MalformedUrn(value.to_string()));
        }
        return Ok(Some(parts[2].trim_end_matches('>').to_string()));
    }
    Ok(None)
}

/// The Contact header's uri as a plain string, used as the fallback
/// dialog key when no `+sip.instance` urn is present.
pub fn contact_uri(req: &Request) -> Result<String> {
    let contact = req.contact_header().map_err(|_| Error::MissingContact)?;
    let raw = contact.value().trim();
    let uri = match (raw.find('<'), raw.find('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw.split(';').next().unwrap_or(raw),
    };
    Ok(uri.to_string())
}

pub fn call_id_of(req: &Request) -> Result<String> {
    Ok(req.call_id_header()?.value().to_string())
}

/// (sequence number, method) from the CSeq header; `MissingCseq` when
/// either half is absent or the number is zero.
pub fn cseq_of(req: &Request) -> Result<(u32, Method)> {
    let cseq = req.cseq_header().map_err(|_| Error::MissingCseq)?;
    let seq = cseq.seq().map_err(|_| Error::MissingCseq)?;
    let method = cseq.method().map_err(|_| Error::MissingCseq)?;
    if seq == 0 {
        return Err(Error::MissingCseq);
    }
    Ok((seq, method))
}

/// Registration lifetime in seconds: the Expires header when present,
/// otherwise the Contact's `;expires=` parameter.
pub fn expires_of(req: &Request) -> Option<i64> {
    for header in req.headers.iter() {
        if let Header::Expires(e) = header {
            if let Ok(seconds) = e.value().trim().parse::<i64>() {
                return Some(seconds);
            }
        }
    }
    let contact = req.contact_header().ok()?;
    let raw = contact.value();
    let params = &raw[raw.find('>').map(|p| p + 1).unwrap_or(0)..];
    for param in params.split(';') {
        if let Some((name, value)) = param.split_once('=') {
            if name.trim().eq_ignore_ascii_case("expires") {
                return value.trim().parse::<i64>().ok();
            }
        }
    }
    None
}

/// A REGISTER carrying `Expires: 0` tears the binding down.
pub fn is_unregister(req: &Request) -> bool {
    req.method == Method::Register && matches!(expires_of(req), Some(seconds) if seconds <= 0)
}

/// Whether the client negotiates the reliable provisional-response flow
/// (100 -> 180 -> 183 -> 200) via `Supported: 100rel` or `Require: 100rel`.
pub fn supports_100rel(req: &Request) -> bool {
    req.headers.iter().any(|header| match header {
        Header::Supported(s) => contains_token(s.value(), "100rel"),
        Header::Require(r) => contains_token(r.value(), "100rel"),
        _ => false,
    })
}

fn contains_token(value: &str, token: &str) -> bool {
    value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Structural validation of an inbound request. SDP-level checks for
/// INVITE live in [`sdp::AudioOffer::parse`] so the dispatcher can answer
/// 488 instead of silently dropping.
pub fn validate(req: &Request) -> Result<()> {
    match req.method {
        Method::Register | Method::Invite => {
            match req.from_header()?.tag()? {
                Some(tag) if !tag.value().is_empty() => {}
                _ => {
                    return Err(Error::InvalidRequest(
                        "tag is empty in the From header".to_string(),
                    ))
                }
            }
            cseq_of(req)?;
            if call_id_of(req)?.is_empty() {
                return Err(Error::InvalidRequest("Call-ID is empty".to_string()));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
