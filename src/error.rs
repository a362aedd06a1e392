use crate::dialog::fsm::{CallEvent, CallState};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("SIP message error: {0}")]
    SipMessageError(#[from] rsip::Error),

    #[error("SDP error: {0}")]
    SdpError(String),

    #[error("missing Contact header")]
    MissingContact,

    #[error("missing dialog key")]
    MissingKey,

    #[error("malformed +sip.instance urn: {0}")]
    MalformedUrn(String),

    #[error("dialog not found")]
    DialogNotFound,

    #[error("dialog already exists: {0}")]
    DialogExists(String),

    #[error("illegal transition: {0} from {1}")]
    IllegalTransition(CallEvent, CallState),

    #[error("CSeq number or method is missing")]
    MissingCseq,

    #[error("cannot build a response for an ACK")]
    UnsupportedForAck,

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("offer has no audio media line")]
    NoAudioMedia,

    #[error("offer does not include PCMU")]
    CodecNotSupported,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport write error: {0}")]
    TransportWrite(String),

    #[error("RTP packet error: {0}")]
    RtpError(String),

    #[error("channel send error: {0}")]
    ChannelSendError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("address parse error: {0}")]
    AddrParseError(#[from] std::net::AddrParseError),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelSendError(e.to_string())
    }
}
