use crate::{Error, Result};
use bytesstr::BytesStr;
use sdp_types::{
    Connection, Direction, IceOptions, Media, MediaDescription, MediaType, Origin, Rtcp, RtpMap,
    SessionDescription, TaggedAddress, Time, TransportProtocol, UnknownAttribute,
};
use std::net::{IpAddr, SocketAddr};

use crate::media::MediaOptions;

/// Static RTP/AVP payload number for PCMU.
pub const PCMU_PAYLOAD: u8 = 0;

/// Attributes the offer may carry that we deliberately ignore. Anything
/// else is also ignored unless strict mode is on.
const IGNORED_ATTRIBUTES: &[&str] = &["rtcp-xr", "record", "rtcp-fb", "ptime", "maxptime"];

/// Everything we need out of an SDP offer to answer it and to aim the
/// RTP stream: the peer's audio endpoint, optional RTCP endpoint,
/// optional SSRC/cname, and the origin/session fields echoed back in
/// the answer.
#[derive(Debug, Clone)]
pub struct AudioOffer {
    pub rtp_addr: SocketAddr,
    pub rtcp_addr: Option<SocketAddr>,
    /// SSRC from `a=ssrc`, zero when the offer did not carry one.
    pub ssrc: u32,
    pub cname: Option<String>,
    origin_id: BytesStr,
    origin_version: BytesStr,
    session_name: BytesStr,
}

impl AudioOffer {
    /// Parse and screen an SDP offer.
    ///
    /// Rejects offers without an audio m-line (`NoAudioMedia`) or without
    /// PCMU among the offered codecs (`CodecNotSupported`); both are
    /// answered with 488 by the dispatcher. With `strict` set, attributes
    /// outside the known set are also rejected.
    pub fn parse(body: &[u8], strict: bool) -> Result<Self> {
        let text = std::str::from_utf8(body).map_err(|e| Error::SdpError(e.to_string()))?;
        let session = SessionDescription::parse(&BytesStr::from(text))
            .map_err(|e| Error::SdpError(e.to_string()))?;

        let audio = session
            .media_descriptions
            .iter()
            .find(|desc| desc.media.media_type == MediaType::Audio)
            .ok_or(Error::NoAudioMedia)?;

        if !offers_pcmu(audio) {
            return Err(Error::CodecNotSupported);
        }

        screen_attributes(&session, audio, strict)?;

        let ip = connection_ip(audio.connection.as_ref().or(session.connection.as_ref()))?;
        let rtp_addr = SocketAddr::new(ip, audio.media.port);

        // a bare `a=rtcp:<port>` borrows the connection address
        let rtcp_addr = match audio.rtcp.as_ref() {
            Some(rtcp) => {
                let rtcp_ip = match rtcp.address.as_ref() {
                    Some(addr) => tagged_ip(addr)?,
                    None => ip,
                };
                Some(SocketAddr::new(rtcp_ip, rtcp.port))
            }
            None => None,
        };

        let (ssrc, cname) = match audio.ssrc.first() {
            Some(entry) => {
                let cname = match &entry.attribute {
                    sdp_types::SourceAttribute::CName { cname } => Some(cname.to_string()),
                    _ => None,
                };
                (entry.ssrc, cname)
            }
            None => (0, None),
        };

        Ok(AudioOffer {
            rtp_addr,
            rtcp_addr,
            ssrc,
            cname,
            origin_id: session.origin.session_id.clone(),
            origin_version: session.origin.session_version.clone(),
            session_name: session.name.clone(),
        })
    }

    /// Build the answer: PCMU only, `sendonly`, origin id/version and
    /// session name echoed from the offer, ptime from the media options,
    /// and an `a=rtcp` line iff the offer carried a resolvable one.
    pub fn answer(&self, opts: &MediaOptions) -> SessionDescription {
        SessionDescription {
            origin: Origin {
                username: "-".into(),
                session_id: self.origin_id.clone(),
                session_version: self.origin_version.clone(),
                address: self.rtp_addr.ip().into(),
            },
            name: self.session_name.clone(),
            connection: Some(Connection {
                address: self.rtp_addr.ip().into(),
                ttl: None,
                num: None,
            }),
            bandwidth: vec![],
            time: Time { start: 0, stop: 0 },
            direction: Direction::SendOnly,
            group: vec![],
            extmap: vec![],
            extmap_allow_mixed: false,
            ice_lite: false,
            ice_options: IceOptions::default(),
            ice_ufrag: None,
            ice_pwd: None,
            setup: None,
            fingerprint: vec![],
            attributes: vec![],
            media_descriptions: vec![MediaDescription {
                media: Media {
                    media_type: MediaType::Audio,
                    port: self.rtp_addr.port(),
                    ports_num: None,
                    proto: TransportProtocol::RtpAvp,
                    fmts: vec![PCMU_PAYLOAD],
                },
                connection: None,
                bandwidth: vec![],
                direction: Direction::SendOnly,
                rtcp: self.rtcp_addr.map(|addr| Rtcp {
                    port: addr.port(),
                    address: Some(addr.ip().into()),
                }),
                rtcp_mux: false,
                rtcp_rsize: false,
                mid: None,
                msid: None,
                rtpmap: vec![RtpMap {
                    payload: PCMU_PAYLOAD,
                    encoding: "PCMU".into(),
                    clock_rate: opts.sample_rate(),
                    params: None,
                }],
                fmtp: vec![],
                rtcp_fb: vec![],
                ice_ufrag: None,
                ice_pwd: None,
                ice_candidates: vec![],
                ice_end_of_candidates: false,
                crypto: vec![],
                extmap: vec![],
                extmap_allow_mixed: false,
                ssrc: vec![],
                setup: None,
                fingerprint: vec![],
                imageattr: vec![],
                attributes: vec![UnknownAttribute {
                    name: "ptime".into(),
                    value: Some(opts.ptime().to_string().into()),
                }],
            }],
        }
    }

    /// The answer as a SIP message body.
    pub fn answer_body(&self, opts: &MediaOptions) -> Vec<u8> {
        self.answer(opts).to_string().into_bytes()
    }
}

fn offers_pcmu(audio: &MediaDescription) -> bool {
    audio.media.fmts.contains(&PCMU_PAYLOAD)
        || audio
            .rtpmap
            .iter()
            .any(|map| map.encoding.eq_ignore_ascii_case("PCMU"))
}

fn screen_attributes(
    session: &SessionDescription,
    audio: &MediaDescription,
    strict: bool,
) -> Result<()> {
    for attr in session.attributes.iter().chain(audio.attributes.iter()) {
        let name: &str = &attr.name;
        if name.eq_ignore_ascii_case("x-nat") {
            // a non-zero X-nat means the peer sits behind a NAT, which
            // this server does not traverse
            if attr.value.as_deref().map(str::trim) != Some("0") {
                return Err(Error::SdpError("client is behind a NAT device".to_string()));
            }
        } else if strict
            && !IGNORED_ATTRIBUTES
                .iter()
                .any(|known| name.eq_ignore_ascii_case(known))
        {
            return Err(Error::SdpError(format!("unknown sdp attribute: {}", name)));
        }
    }
    Ok(())
}

fn connection_ip(conn: Option<&Connection>) -> Result<IpAddr> {
    let conn = conn.ok_or_else(|| Error::SdpError("offer has no connection line".to_string()))?;
    tagged_ip(&conn.address)
}

fn tagged_ip(address: &TaggedAddress) -> Result<IpAddr> {
    match address {
        TaggedAddress::IP4(ip) => Ok(IpAddr::V4(*ip)),
        TaggedAddress::IP6(ip) => Ok(IpAddr::V6(*ip)),
        other => Err(Error::SdpError(format!(
            "unresolvable address in offer: {:?}",
            other
        ))),
    }
}
