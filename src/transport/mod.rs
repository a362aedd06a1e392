use crate::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;

pub mod udp;

/// Where a handler writes its response bytes.
///
/// Keeps the dialog core transport-agnostic: the UDP server hands out
/// the `Udp` variant, tests collect responses through the `Channel`
/// variant.
#[derive(Clone)]
pub enum ReplySink {
    Udp {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
    Channel(UnboundedSender<Vec<u8>>),
}

impl ReplySink {
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        match self {
            ReplySink::Udp { socket, peer } => {
                socket
                    .send_to(bytes, peer)
                    .await
                    .map_err(|e| Error::TransportWrite(format!("{} -> {}", e, peer)))?;
                Ok(())
            }
            ReplySink::Channel(sender) => sender
                .send(bytes.to_vec())
                .map_err(|e| Error::ChannelSendError(e.to_string())),
        }
    }
}
