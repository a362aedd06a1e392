use crate::dialog::DialogRegistry;
use crate::media::MediaOptions;
use crate::sip::{self, response, sdp::AudioOffer};
use crate::transport::ReplySink;
use crate::{Error, Result};
use rsip::{Method, Request, SipMessage, StatusCode};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Static configuration of the server.
#[derive(Debug, Clone)]
pub struct PlayoutConfig {
    /// Raw μ-law file streamed to every answered call.
    pub audio_path: PathBuf,
    pub media: MediaOptions,
    /// Reject SDP offers carrying attributes we do not recognize.
    pub strict_sdp: bool,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        PlayoutConfig {
            audio_path: PathBuf::from("ulaw-test.wav"),
            media: MediaOptions::default(),
            strict_sdp: false,
        }
    }
}

/// Routes each datagram to the dialog it belongs to and drives the
/// dialog's handler for the request method. Owns the dialog registry;
/// no error escaping a handler is fatal to the process.
pub struct Dispatcher {
    registry: DialogRegistry,
    config: PlayoutConfig,
}

impl Dispatcher {
    pub fn new(config: PlayoutConfig) -> Self {
        Dispatcher {
            registry: DialogRegistry::new(),
            config,
        }
    }

    pub fn registry(&self) -> &DialogRegistry {
        &self.registry
    }

    /// Handle one datagram from `remote`, answering through `sink`.
    pub async fn handle_message(
        &self,
        remote: SocketAddr,
        bytes: &[u8],
        sink: &ReplySink,
    ) -> Result<()> {
        if is_keep_alive(bytes) {
            return Ok(());
        }

        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                info!(%remote, "dropping non-utf8 datagram: {}", e);
                return Ok(());
            }
        };
        let req = match SipMessage::try_from(text) {
            Ok(SipMessage::Request(req)) => req,
            Ok(SipMessage::Response(resp)) => {
                debug!(%remote, code = %resp.status_code, "ignoring response");
                return Ok(());
            }
            Err(e) => {
                info!(%remote, "dropping unparsable datagram: {}", e);
                return Ok(());
            }
        };

        debug!(
            %remote,
            method = %req.method,
            bytes = bytes.len(),
            dialogs = self.registry.len(),
            "handling request"
        );

        if let Err(e) = sip::validate(&req) {
            info!(%remote, method = %req.method, "dropping invalid request: {}", e);
            return Err(e);
        }

        // resolve the dialog, creating one on first contact; requests
        // without a Contact stay unresolved and each method decides
        let dialog = match self.registry.lookup(&req)? {
            Some(dialog) => Some(dialog),
            None => match self.registry.create(&req, remote) {
                Ok(dialog) => Some(dialog),
                Err(Error::MissingContact) | Err(Error::MissingKey) => None,
                Err(e) => {
                    warn!(%remote, "failed to create dialog: {}", e);
                    return Err(e);
                }
            },
        };

        let outcome = match req.method {
            Method::Bye => match dialog {
                None => self.reply_unknown_dialog(&req, sink).await,
                Some(dialog) => dialog.recv_bye(&req, sink).await,
            },
            Method::Cancel => match dialog {
                None => self.reply_unknown_dialog(&req, sink).await,
                Some(dialog) => dialog.recv_cancel(&req, sink).await,
            },
            Method::Ack => dialog.ok_or(Error::DialogNotFound)?.recv_ack(&req),
            Method::Invite => {
                let dialog = dialog.ok_or(Error::DialogNotFound)?;
                self.handle_invite(&req, &dialog, sink).await
            }
            Method::Register => {
                if sip::is_unregister(&req) {
                    info!(%remote, "REGISTER with zero expiry, unregistering");
                    self.registry.close(&req)
                } else {
                    dialog
                        .ok_or(Error::DialogNotFound)?
                        .register_send_ok(&req, sink)
                        .await
                }
            }
            ref method => {
                warn!(%remote, method = %method, "ignoring unknown method");
                Ok(())
            }
        };

        debug!("dialogs:\n{}", self.registry.render());
        outcome
    }

    async fn handle_invite(
        &self,
        req: &Request,
        dialog: &crate::dialog::Dialog,
        sink: &ReplySink,
    ) -> Result<()> {
        let offer = match AudioOffer::parse(&req.body, self.config.strict_sdp) {
            Ok(offer) => offer,
            Err(e @ Error::NoAudioMedia) | Err(e @ Error::CodecNotSupported) => {
                info!(key = %dialog.key(), "rejecting INVITE with 488: {}", e);
                let resp = response::respond(req, StatusCode::NotAcceptableHere)?;
                sink.send(resp.to_string().as_bytes()).await?;
                return Err(e);
            }
            Err(e) => {
                info!(key = %dialog.key(), "dropping INVITE with a bad offer: {}", e);
                return Err(e);
            }
        };

        if sip::supports_100rel(req) {
            dialog
                .answer_invite_with_progress(
                    req,
                    &offer,
                    &self.config.audio_path,
                    self.config.media,
                    sink,
                )
                .await
        } else {
            dialog
                .answer_invite(req, &offer, &self.config.audio_path, self.config.media, sink)
                .await
        }
    }

    /// 481 for a BYE or CANCEL that matches no dialog, built straight
    /// off the request.
    async fn reply_unknown_dialog(&self, req: &Request, sink: &ReplySink) -> Result<()> {
        info!(method = %req.method, "no dialog for request, sending 481");
        let resp = response::respond(req, StatusCode::CallTransactionDoesNotExist)?;
        sink.send(resp.to_string().as_bytes()).await
    }
}

/// Clients keep the NAT binding open with tiny CRLF datagrams (2 bytes
/// from some phones, 4 from others).
fn is_keep_alive(bytes: &[u8]) -> bool {
    bytes.len() <= 4
}
