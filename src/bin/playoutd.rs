use clap::Parser;
use sip_playout::media::MediaOptions;
use sip_playout::transport::udp::UdpServer;
use sip_playout::{Dispatcher, PlayoutConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A SIP server that answers calls and plays a μ-law audio file to the
/// caller over RTP.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listen address for SIP over UDP
    #[arg(long, default_value = "0.0.0.0:5061")]
    listen: String,

    /// Raw μ-law audio file streamed to answered calls
    #[arg(long, default_value = "ulaw-test.wav")]
    audio: PathBuf,

    /// RTP packetization time in milliseconds
    #[arg(long, default_value_t = 20)]
    ptime: u32,

    /// Reject SDP offers carrying unrecognized attributes
    #[arg(long)]
    strict_sdp: bool,
}

#[tokio::main]
async fn main() -> sip_playout::Result<()> {
    tracing_subscriber::fmt().with_target(false).try_init().ok();

    let args = Args::parse();
    let media = MediaOptions {
        ptime_ms: args.ptime,
        ..MediaOptions::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(PlayoutConfig {
        audio_path: args.audio,
        media,
        strict_sdp: args.strict_sdp,
    }));

    let server = UdpServer::bind(args.listen.parse()?, dispatcher).await?;
    info!("listening on {}", server.local_addr()?);
    server.serve_loop(CancellationToken::new()).await
}
