//! Async STOMP-over-WebSocket client for the platform's real-time channels.
//!
//! This module is organized by domain:
//! - [`stomp`] - Frame encoding and decoding
//! - [`subscription`] - Channel registration, (re)subscription and routing
//! - [`connection`] - Connection lifecycle, reconnection and dispatch

mod connection;
pub mod stomp;
mod subscription;

use std::future::Future;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use tungstenite::Message;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::{HeaderValue, StatusCode, Uri, header::AUTHORIZATION};

use crate::credentials::Credential;
use crate::{Result, TradewireError};

pub use connection::{
    ConnectionState, ConnectionSupervisor, SessionCommand, SupervisorHandle,
};
pub use stomp::{Command, Frame};
pub use subscription::{Routed, SubscriptionRegistry};

/// Write half of a platform WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a platform WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Opens authenticated sessions with the server.
///
/// A successful [`connect`](Connector::connect) returns a link on which
/// the STOMP CONNECT exchange has already completed.
pub trait Connector: Send + 'static {
    type Link: Link;

    /// Reports whether the endpoint can currently be resolved.
    fn probe(&mut self) -> impl Future<Output = bool> + Send;

    /// Opens the transport and authenticates it with `credential`.
    fn connect(&mut self, credential: &Credential)
    -> impl Future<Output = Result<Self::Link>> + Send;
}

/// One live, authenticated session.
pub trait Link: Send + 'static {
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<()>> + Send;

    /// Next frame from the server; `None` once the transport has closed.
    /// Heart-beats are consumed internally.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame>>> + Send;

    /// Ends the session. Never fails.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Establishes a WebSocket connection, sending `credential` on the upgrade
/// request.
///
/// # Errors
///
/// Returns [`TradewireError::CredentialRejected`] if the upgrade is refused
/// with 401 or 403, or another [`TradewireError`] if the connection or TLS
/// handshake fails.
pub async fn connect(url: &str, credential: &Credential) -> Result<(WsWriter, WsReader)> {
    let mut request = url.into_client_request()?;
    let bearer = HeaderValue::from_str(credential.bearer().as_str())
        .map_err(|e| TradewireError::Config(format!("credential is not a valid header: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (ws_stream, _) = match connect_async(request).await {
        Ok(pair) => pair,
        Err(tungstenite::Error::Http(response))
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            return Err(TradewireError::CredentialRejected(format!(
                "upgrade refused with HTTP {}",
                response.status()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// [`Connector`] for the platform's STOMP endpoint over `tokio-tungstenite`.
pub struct StompConnector {
    url: String,
}

impl StompConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn uri(&self) -> Result<Uri> {
        self.url
            .parse::<Uri>()
            .map_err(|e| TradewireError::Config(format!("invalid websocket url {}: {e}", self.url)))
    }
}

impl Connector for StompConnector {
    type Link = StompLink;

    async fn probe(&mut self) -> bool {
        let uri = match self.uri() {
            Ok(uri) => uri,
            Err(e) => {
                warn!("{e}");
                return false;
            }
        };
        let Some(host) = uri.host() else {
            return false;
        };
        let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
            Some("wss") | Some("https") => 443,
            _ => 80,
        });

        match tokio::net::lookup_host((host, port)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!(host, error = %e, "Endpoint not resolvable yet");
                false
            }
        }
    }

    async fn connect(&mut self, credential: &Credential) -> Result<StompLink> {
        let host = self
            .uri()?
            .host()
            .unwrap_or("localhost")
            .to_string();
        let (write, read) = connect(&self.url, credential).await?;
        let mut link = StompLink { write, read };

        link.send(Frame::connect(&host, credential.bearer().as_str()))
            .await?;

        match link.next_frame().await {
            Some(Ok(frame)) if frame.command == Command::Connected => {
                info!(
                    version = frame.get("version").unwrap_or("1.0"),
                    "STOMP session established"
                );
                Ok(link)
            }
            Some(Ok(frame)) if frame.command == Command::Error => {
                link.close().await;
                Err(TradewireError::ServerError(frame.error_text()))
            }
            Some(Ok(frame)) => {
                link.close().await;
                Err(TradewireError::MalformedFrame(format!(
                    "expected CONNECTED, got {}",
                    frame.command
                )))
            }
            Some(Err(e)) => Err(e),
            None => Err(TradewireError::ConnectionClosed(
                "closed during STOMP handshake".into(),
            )),
        }
    }
}

/// A STOMP session over a split WebSocket stream.
pub struct StompLink {
    write: WsWriter,
    read: WsReader,
}

impl Link for StompLink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        debug!(command = %frame.command, "Sending frame");
        self.write.send(Message::Text(frame.encode().into())).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let text = match self.read.next().await? {
                Ok(Message::Text(text)) => text.as_str().to_owned(),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        return Some(Err(TradewireError::MalformedFrame(format!(
                            "binary frame is not UTF-8: {e}"
                        ))));
                    }
                },
                Ok(Message::Close(close)) => {
                    debug!(?close, "Server closed the WebSocket");
                    return None;
                }
                Ok(_) => continue, // Ping/Pong/raw frames
                Err(e) => return Some(Err(e.into())),
            };

            match Frame::decode(&text) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => continue, // heart-beat
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.send(Frame::disconnect()).await {
            debug!("DISCONNECT not delivered: {e}");
        }
        if let Err(e) = self.write.close().await {
            debug!("WebSocket close failed: {e}");
        }
    }
}
