//! Framed IRC transport over TCP and TLS.
//!
//! The [`Connector`] trait is the seam between the handler state machine
//! and the network: production uses [`TcpConnector`], tests inject scripted
//! wires.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::warn;

use super::codec::IrcCodec;
use super::wire::Message;

/// Transport-level failures; every one of them triggers reconnect with
/// backoff.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Line exceeds {limit} bytes")]
    MessageTooLong { limit: usize },

    #[error("Connection closed")]
    Closed,
}

/// Write half of a wire.
#[async_trait]
pub trait WireTx: Send {
    async fn send(&mut self, message: Message) -> Result<(), TransportError>;
}

/// Read half of a wire. `None` means the peer closed the connection.
#[async_trait]
pub trait WireRx: Send {
    async fn recv(&mut self) -> Option<Result<Message, TransportError>>;
}

/// One established IRC connection, split into halves so the session can
/// write while a read is pending.
pub trait Wire: Send {
    fn split(self: Box<Self>) -> (Box<dyn WireTx>, Box<dyn WireRx>);
}

/// Produces connected wires; the handler reconnect loop calls this.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        server: &str,
        port: u16,
        tls: bool,
    ) -> Result<Box<dyn Wire>, TransportError>;
}

struct FramedWire<S> {
    framed: Framed<S, IrcCodec>,
}

struct FramedTx<S> {
    sink: SplitSink<Framed<S, IrcCodec>, Message>,
}

struct FramedRx<S> {
    stream: SplitStream<Framed<S, IrcCodec>>,
}

impl<S> Wire for FramedWire<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn split(self: Box<Self>) -> (Box<dyn WireTx>, Box<dyn WireRx>) {
        let (sink, stream) = self.framed.split();
        (Box::new(FramedTx { sink }), Box::new(FramedRx { stream }))
    }
}

#[async_trait]
impl<S> WireTx for FramedTx<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        self.sink.send(message).await
    }
}

#[async_trait]
impl<S> WireRx for FramedRx<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn recv(&mut self) -> Option<Result<Message, TransportError>> {
        self.stream.next().await
    }
}

/// Production connector: TCP, optionally upgraded to TLS with the system
/// root store.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        server: &str,
        port: u16,
        tls: bool,
    ) -> Result<Box<dyn Wire>, TransportError> {
        let stream = TcpStream::connect((server, port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if !tls {
            return Ok(Box::new(FramedWire {
                framed: Framed::new(stream, IrcCodec::new()),
            }));
        }

        let tls_stream = upgrade_to_tls(stream, server).await?;
        Ok(Box::new(FramedWire {
            framed: Framed::new(tls_stream, IrcCodec::new()),
        }))
    }
}

/// Upgrade a TCP stream to TLS using the system root certificates.
async fn upgrade_to_tls(
    stream: TcpStream,
    hostname: &str,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        if let Err(e) = roots.add(cert) {
            warn!("Failed to add root cert: {}", e);
        }
    }
    for e in &certs.errors {
        warn!("Error loading native certs: {}", e);
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| TransportError::Tls(e.to_string()))
}
