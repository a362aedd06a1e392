use super::{source::UlawSource, MediaOptions};
use crate::{Error, Result};
use rtp_rs::RtpPacketBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::UdpSocket;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Static payload type assigned to PCMU by RTP/AVP.
pub const PCMU_PAYLOAD_TYPE: u8 = 0;

/// Paced RTP emitter for a single media stream.
///
/// Owns a UDP socket connected to the peer's media endpoint. Sequence
/// number and timestamp start at random offsets and wrap naturally; the
/// timestamp advances by one frame of media-clock ticks per packet.
pub struct RtpSender {
    socket: UdpSocket,
    seq: u16,
    timestamp: u32,
    ssrc: u32,
    opts: MediaOptions,
}

impl RtpSender {
    /// `ssrc` normally comes from the offer's `a=ssrc` line; zero means
    /// the peer did not pick one and a random SSRC is used instead.
    pub async fn connect(remote: SocketAddr, ssrc: u32, opts: MediaOptions) -> Result<Self> {
        let bind_addr: SocketAddr = if remote.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(remote).await?;

        let ssrc = if ssrc == 0 { rand::random() } else { ssrc };
        Ok(RtpSender {
            socket,
            seq: rand::random(),
            timestamp: rand::random(),
            ssrc,
            opts,
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Frame one payload as an RTP packet and send it to the peer.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        let packet = RtpPacketBuilder::new()
            .payload_type(PCMU_PAYLOAD_TYPE)
            .ssrc(self.ssrc)
            .sequence(self.seq.into())
            .timestamp(self.timestamp)
            .payload(payload)
            .build()
            .map_err(|e| Error::RtpError(format!("{:?}", e)))?;

        self.socket.send(&packet).await?;

        self.seq = self.seq.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.opts.samples_per_frame());
        Ok(())
    }
}

/// Stream a μ-law file to `remote` at the packetization cadence.
///
/// Runs until the file is drained, a send fails, or `token` is
/// cancelled. The sender's socket closes when the task returns.
pub async fn play_ulaw_file(
    path: PathBuf,
    remote: SocketAddr,
    ssrc: u32,
    opts: MediaOptions,
    token: CancellationToken,
) -> Result<()> {
    let mut sender = RtpSender::connect(remote, ssrc, opts).await?;
    let mut source = UlawSource::open(&path, &opts).await?;
    info!(
        %remote,
        ssrc = sender.ssrc(),
        "streaming {} ({} bytes)",
        path.display(),
        source.remaining()
    );

    select! {
        _ = token.cancelled() => {
            info!(%remote, "playout cancelled");
        }
        result = async {
            let mut ticker = tokio::time::interval(opts.frame_interval());
            // the first tick completes immediately
            ticker.tick().await;
            while let Some(frame) = source.next_frame() {
                sender.send_frame(frame).await?;
                ticker.tick().await;
            }
            Ok::<(), Error>(())
        } => {
            result?;
            debug!(%remote, "playout finished");
        }
    }
    Ok(())
}
