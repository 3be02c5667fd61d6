//! Network transport contract and the default TCP implementation.
//!
//! Each outbound message opens one TCP connection and writes a single
//! length-delimited JSON frame. Inbound connections may carry any number of
//! frames; each decoded frame is queued together with its byte length.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::Result;
use crate::message::Envelope;
use crate::queue::WorkQueue;

/// A received envelope and its size on the wire in bytes.
pub type Inbound = (Envelope, usize);

pub type Inbox = WorkQueue<Inbound>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Accept inbound traffic on `addr` and push it into `inbox`. Runs until
    /// the listener fails.
    async fn listen(&self, addr: SocketAddr, inbox: Inbox) -> Result<()>;

    async fn send(&self, addr: SocketAddr, envelope: &Envelope) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    /// Serve an already bound listener.
    pub async fn serve(listener: TcpListener, inbox: Inbox) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let inbox = inbox.clone();
                    tokio::spawn(async move {
                        read_frames(stream, peer, inbox).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

async fn read_frames(stream: TcpStream, peer: SocketAddr, inbox: Inbox) {
    let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(bytes) => match Envelope::from_bytes(&bytes) {
                Ok(envelope) => inbox.push((envelope, bytes.len())),
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Dropping undecodable frame");
                }
            },
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self, addr: SocketAddr, inbox: Inbox) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "Listening for node traffic");
        Self::serve(listener, inbox).await
    }

    async fn send(&self, addr: SocketAddr, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.to_bytes()?;
        let stream = TcpStream::connect(addr).await?;
        let mut framed = FramedWrite::new(stream, LengthDelimitedCodec::new());
        framed.send(Bytes::from(bytes)).await?;
        SinkExt::<Bytes>::close(&mut framed).await?;
        Ok(())
    }
}
