use super::ReplySink;
use crate::{Dispatcher, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Single-reader UDP listener feeding the dispatcher.
///
/// One task reads datagrams in arrival order and drives the dispatcher
/// inline, so messages from a peer are never reordered by this layer.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    dispatcher: Arc<Dispatcher>,
}

impl UdpServer {
    pub async fn bind(local: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        let server = UdpServer {
            socket: Arc::new(socket),
            dispatcher,
        };
        info!("created UDP listener: {}", server);
        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn serve_loop(&self, token: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; 10 * 1024 * 1024];
        loop {
            select! {
                _ = token.cancelled() => {
                    info!("UDP listener stopping: {}", self);
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            error!("error receiving UDP packet: {}", e);
                            continue;
                        }
                    };

                    let sink = ReplySink::Udp {
                        socket: self.socket.clone(),
                        peer,
                    };
                    if let Err(e) = self.dispatcher.handle_message(peer, &buf[..len], &sink).await {
                        warn!(%peer, "error handling SIP message: {}", e);
                    }
                }
            }
        }
    }
}

impl std::fmt::Display for UdpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.socket.local_addr() {
            Ok(addr) => write!(f, "{}", addr),
            Err(_) => write!(f, "*:*"),
        }
    }
}
