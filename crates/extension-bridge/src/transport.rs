//! WebSocket transport for the extension stream
//!
//! The host listens; the extension process connects back and speaks JSON
//! text messages, one [`ExtensionMessage`] per frame.

use crate::{BridgeError, ExtensionBridge, ExtensionMessage, Result};
use async_net::{TcpListener, TcpStream};
use async_tungstenite::{WebSocketStream, accept_async, client_async};
use futures::future::{BoxFuture, ready};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tracing::{debug, info};
use tungstenite::Message;

impl From<tungstenite::Error> for BridgeError {
    fn from(error: tungstenite::Error) -> Self {
        BridgeError::Transport(error.to_string())
    }
}

/// Listener accepting extension connections
pub struct ExtensionListener {
    listener: TcpListener,
}

impl ExtensionListener {
    /// Bind the listener; extensions are told the resulting address
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self> {
        let listener = TcpListener::bind(addr.as_ref()).await?;
        info!("Extension listener bound on {}", addr.as_ref());
        Ok(Self { listener })
    }

    /// The bound local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one extension connection and start a bridge over it.
    ///
    /// Returns the bridge handle and its driver future; the caller spawns
    /// the driver.
    pub async fn accept(&self) -> Result<(ExtensionBridge, BoxFuture<'static, Result<()>>)> {
        let (tcp, addr) = self.listener.accept().await?;
        let ws = accept_async(tcp).await?;
        debug!("Extension connected from {}", addr);
        Ok(bridge_over(ws))
    }
}

/// Connect to a listening host (used by extensions and tests)
pub async fn connect(addr: SocketAddr) -> Result<(ExtensionBridge, BoxFuture<'static, Result<()>>)> {
    let url = format!("ws://{}", addr);
    let tcp = TcpStream::connect(addr).await?;
    let (ws, _) = client_async(&url, tcp).await?;
    info!("Connected to extension host at {}", addr);
    Ok(bridge_over(ws))
}

fn bridge_over(
    ws: WebSocketStream<TcpStream>,
) -> (ExtensionBridge, BoxFuture<'static, Result<()>>) {
    let (ws_sink, ws_stream) = ws.split();

    let sink = ws_sink.with(|message: ExtensionMessage| {
        ready(
            serde_json::to_string(&message)
                .map(|json| Message::Text(json.into()))
                .map_err(BridgeError::from),
        )
    });

    let stream = ws_stream.filter_map(|frame| {
        ready(match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ExtensionMessage>(&text) {
                Ok(message) => Some(Ok(message)),
                Err(e) => Some(Err(BridgeError::protocol(format!(
                    "malformed extension message: {}",
                    e
                )))),
            },
            // Close completes the handshake; the stream ends after it
            Ok(_) => None,
            Err(e) => Some(Err(BridgeError::from(e))),
        })
    });

    ExtensionBridge::start(sink, stream)
}
