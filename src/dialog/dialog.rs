use super::fsm::{CallEvent, CallState};
use crate::media::{self, MediaOptions};
use crate::sip::{self, response, sdp::AudioOffer};
use crate::transport::ReplySink;
use crate::{Error, Result};
use rsip::{Request, StatusCode};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of the per-request sequence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CseqTrack {
    Fresh,
    Retransmission,
}

/// Shared state of one dialog.
///
/// Fields are individually locked so a cloned handle can be read while
/// the dispatcher drives a handler; in practice the dispatcher is the
/// only writer, one message at a time.
pub struct DialogInner {
    pub key: String,
    pub remote_addr: SocketAddr,
    pub cancel_token: CancellationToken,
    state: Mutex<CallState>,
    last_cseq: Mutex<Option<(u32, rsip::Method)>>,
    call_ids: Mutex<Vec<String>>,
    register_call_id: Mutex<Option<String>>,
    playout: Mutex<Option<CancellationToken>>,
}

pub(super) type DialogInnerRef = Arc<DialogInner>;

/// One SIP peer's dialog with this server. Cheap to clone; all clones
/// share the same state.
#[derive(Clone)]
pub struct Dialog {
    pub(super) inner: DialogInnerRef,
}

impl Dialog {
    pub fn new(key: String, remote_addr: SocketAddr) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::MissingKey);
        }
        Ok(Dialog {
            inner: Arc::new(DialogInner {
                key,
                remote_addr,
                cancel_token: CancellationToken::new(),
                state: Mutex::new(CallState::Init),
                last_cseq: Mutex::new(None),
                call_ids: Mutex::new(Vec::new()),
                register_call_id: Mutex::new(None),
                playout: Mutex::new(None),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn state(&self) -> CallState {
        *self.inner.state.lock().unwrap()
    }

    pub fn register_call_id(&self) -> Option<String> {
        self.inner.register_call_id.lock().unwrap().clone()
    }

    pub fn knows_call_id(&self, call_id: &str) -> bool {
        self.inner
            .call_ids
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == call_id)
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.inner.call_ids.lock().unwrap().clone()
    }

    /// Stop any media stream and cancel everything tied to this dialog.
    /// Called by the registry when the dialog is removed.
    pub fn close(&self) {
        self.stop_playout();
        self.inner.cancel_token.cancel();
    }

    fn fire(&self, event: CallEvent) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        let next = state.apply(event)?;
        debug!(key = %self.inner.key, "state {} -> {}", state, next);
        *state = next;
        Ok(())
    }

    /// The sequence prologue: remember the call-id, validate the CSeq
    /// pair and flag a retransmitted request.
    fn track_request(&self, req: &Request) -> Result<CseqTrack> {
        let call_id = sip::call_id_of(req)?;
        if !call_id.is_empty() {
            let mut ids = self.inner.call_ids.lock().unwrap();
            if !ids.iter().any(|id| *id == call_id) {
                ids.push(call_id);
            }
        }

        let (seq, method) = sip::cseq_of(req)?;
        let mut last = self.inner.last_cseq.lock().unwrap();
        match *last {
            Some((prev_seq, ref prev_method)) if prev_seq == seq && *prev_method == method => {
                Ok(CseqTrack::Retransmission)
            }
            _ => {
                *last = Some((seq, method));
                Ok(CseqTrack::Fresh)
            }
        }
    }

    /// Answer a REGISTER with 200. A REGISTER during an active or
    /// already-registered session must not disturb it, so the automaton
    /// only advances outside those states. A failed response write rolls
    /// the registration back.
    pub async fn register_send_ok(&self, req: &Request, sink: &ReplySink) -> Result<()> {
        let state = self.state();
        if !matches!(
            state,
            CallState::CallEstablished | CallState::InviteSent200 | CallState::RegisterSent200
        ) {
            self.fire(CallEvent::RegisterSend200)?;
        }

        if self.track_request(req)? == CseqTrack::Retransmission {
            info!(key = %self.inner.key, "duplicate CSeq on REGISTER, answering again");
        }

        *self.inner.register_call_id.lock().unwrap() = Some(sip::call_id_of(req)?);

        let resp = response::respond(req, StatusCode::OK)?;
        if let Err(e) = sink.send(resp.to_string().as_bytes()).await {
            if let Err(fsm_err) = self.fire(CallEvent::RegisterFailed) {
                warn!(key = %self.inner.key, "no rollback after failed REGISTER answer: {}", fsm_err);
            }
            return Err(e);
        }

        info!(key = %self.inner.key, "sent 200 OK in response to REGISTER");
        Ok(())
    }

    /// Fast-path INVITE answer: a single 200 with the SDP answer, then
    /// the media stream starts. A retransmitted INVITE gets the 200
    /// again but neither advances the automaton nor spawns a second
    /// stream.
    pub async fn answer_invite(
        &self,
        req: &Request,
        offer: &AudioOffer,
        audio_path: &Path,
        opts: MediaOptions,
        sink: &ReplySink,
    ) -> Result<()> {
        if self.track_request(req)? == CseqTrack::Retransmission {
            return self.reanswer_invite(req, offer, opts, sink).await;
        }

        self.fire(CallEvent::InviteSend200)?;

        let resp = response::respond_with_answer(req, StatusCode::OK, offer, &opts)?;
        sink.send(resp.to_string().as_bytes()).await?;
        info!(key = %self.inner.key, "sent 200 OK in response to INVITE");

        self.start_playout(offer, audio_path.to_path_buf(), opts);
        Ok(())
    }

    /// Provisional-response path for clients that advertise 100rel:
    /// 100 Trying, 180 Ringing and 183 Session Progress precede the 200.
    pub async fn answer_invite_with_progress(
        &self,
        req: &Request,
        offer: &AudioOffer,
        audio_path: &Path,
        opts: MediaOptions,
        sink: &ReplySink,
    ) -> Result<()> {
        if self.track_request(req)? == CseqTrack::Retransmission {
            return self.reanswer_invite(req, offer, opts, sink).await;
        }

        for (event, status) in [
            (CallEvent::InviteSend100, StatusCode::Trying),
            (CallEvent::InviteSend180, StatusCode::Ringing),
            (CallEvent::InviteSend183, StatusCode::SessionProgress),
            (CallEvent::InviteSend200, StatusCode::OK),
        ] {
            self.fire(event)?;
            let resp = response::respond_with_answer(req, status.clone(), offer, &opts)?;
            sink.send(resp.to_string().as_bytes()).await?;
            debug!(key = %self.inner.key, "sent {} in response to INVITE", status);
        }
        info!(key = %self.inner.key, "answered INVITE through the provisional chain");

        self.start_playout(offer, audio_path.to_path_buf(), opts);
        Ok(())
    }

    /// A retransmitted INVITE is absorbed; the 200 goes out again only
    /// if it went out the first time.
    async fn reanswer_invite(
        &self,
        req: &Request,
        offer: &AudioOffer,
        opts: MediaOptions,
        sink: &ReplySink,
    ) -> Result<()> {
        info!(key = %self.inner.key, "duplicate CSeq on INVITE");
        if matches!(
            self.state(),
            CallState::InviteSent200 | CallState::CallEstablished
        ) {
            let resp = response::respond_with_answer(req, StatusCode::OK, offer, &opts)?;
            sink.send(resp.to_string().as_bytes()).await?;
        }
        Ok(())
    }

    /// The peer confirmed our 200; the call is up. An ACK is never
    /// answered.
    pub fn recv_ack(&self, req: &Request) -> Result<()> {
        if self.track_request(req)? == CseqTrack::Retransmission {
            debug!(key = %self.inner.key, "duplicate ACK");
            return Ok(());
        }
        self.fire(CallEvent::InviteRecvAck)
    }

    /// The peer gave up on the call before or during setup. Answer 200
    /// and stop any media already flowing.
    pub async fn recv_cancel(&self, req: &Request, sink: &ReplySink) -> Result<()> {
        if self.track_request(req)? == CseqTrack::Retransmission {
            info!(key = %self.inner.key, "duplicate CSeq on CANCEL");
            if self.state() == CallState::CallCancelled {
                let resp = response::respond(req, StatusCode::OK)?;
                sink.send(resp.to_string().as_bytes()).await?;
            }
            return Ok(());
        }

        self.fire(CallEvent::RecvCancel)?;
        self.stop_playout();

        let resp = response::respond(req, StatusCode::OK)?;
        sink.send(resp.to_string().as_bytes()).await?;
        info!(key = %self.inner.key, "sent 200 OK in response to CANCEL");
        Ok(())
    }

    /// The peer hung up. A BYE that no state admits gets 481; a valid
    /// one gets 200 and stops the media stream.
    pub async fn recv_bye(&self, req: &Request, sink: &ReplySink) -> Result<()> {
        if self.track_request(req)? == CseqTrack::Retransmission {
            info!(key = %self.inner.key, "duplicate CSeq on BYE");
            if self.state() == CallState::CallTerminated {
                let resp = response::respond(req, StatusCode::OK)?;
                sink.send(resp.to_string().as_bytes()).await?;
            }
            return Ok(());
        }

        if let Err(e) = self.fire(CallEvent::RecvBye) {
            warn!(key = %self.inner.key, "cannot accept BYE, sending 481: {}", e);
            if let Ok(resp) = response::respond(req, StatusCode::CallTransactionDoesNotExist) {
                sink.send(resp.to_string().as_bytes()).await.ok();
            }
            return Err(e);
        }

        self.stop_playout();

        let resp = response::respond(req, StatusCode::OK)?;
        sink.send(resp.to_string().as_bytes()).await?;
        info!(key = %self.inner.key, "sent 200 OK in response to BYE");
        Ok(())
    }

    fn start_playout(&self, offer: &AudioOffer, path: PathBuf, opts: MediaOptions) {
        let token = self.inner.cancel_token.child_token();
        if let Some(stale) = self.inner.playout.lock().unwrap().replace(token.clone()) {
            stale.cancel();
        }

        let remote = offer.rtp_addr;
        let ssrc = offer.ssrc;
        let key = self.inner.key.clone();
        tokio::spawn(async move {
            if let Err(e) = media::rtp::play_ulaw_file(path, remote, ssrc, opts, token).await {
                warn!(key = %key, "playout ended with error: {}", e);
            }
        });
    }

    fn stop_playout(&self) {
        if let Some(token) = self.inner.playout.lock().unwrap().take() {
            token.cancel();
        }
    }
}

impl std::fmt::Display for Dialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "key={} state={} addr={} call_ids={:?}",
            self.inner.key,
            self.state(),
            self.inner.remote_addr,
            self.inner.call_ids.lock().unwrap()
        )
    }
}
