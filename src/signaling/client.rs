//! WebSocket signaling channel to the relay
//!
//! The channel is a thin conduit: connect, register the local identity,
//! then shuttle [`ClientMessage`]/[`RelayMessage`] frames over a pair of
//! background tasks. Inbound events are delivered through an mpsc channel
//! so the coordinator's dispatch can be driven without a live socket.

use super::protocol::{ClientMessage, RelayMessage};
use crate::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A live registered connection to the relay
#[derive(Debug)]
pub struct SignalingConnection {
    /// Relay-assigned id for the local participant
    pub local_peer_id: String,

    /// Outbound message sender; dropping it closes the channel
    pub outbound: mpsc::UnboundedSender<ClientMessage>,

    /// Inbound relay events
    pub inbound: mpsc::UnboundedReceiver<RelayMessage>,
}

/// Capability interface for establishing a relay connection
///
/// The production implementation is [`WebSocketConnector`]; tests drive the
/// coordinator through an in-memory implementation.
#[async_trait::async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Connect to the relay and register `identity`
    ///
    /// Resolves once the relay has acknowledged registration with the
    /// local participant id.
    async fn connect(&self, identity: &str) -> Result<SignalingConnection>;
}

/// WebSocket implementation of [`SignalingConnector`]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for the given relay URL (ws:// or wss://)
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    /// Sender task: serializes messages from the channel onto the socket
    async fn sender_task(
        mut write: futures_util::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<ClientMessage>,
    ) {
        while let Some(msg) = rx.recv().await {
            let json = match msg.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };

            if let Err(e) = write.send(Message::Text(json)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        // Channel closed: the call ended, close the socket politely.
        let _ = write.send(Message::Close(None)).await;
        debug!("Signaling sender task terminated");
    }

    /// Receiver task: parses socket frames into relay events
    async fn receiver_task(
        mut read: futures_util::stream::SplitStream<WsStream>,
        inbound_tx: mpsc::UnboundedSender<RelayMessage>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match RelayMessage::from_json(&text) {
                    Ok(msg) => {
                        if inbound_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping malformed relay frame: {}", e);
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("Relay closed the signaling connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }

        debug!("Signaling receiver task terminated");
    }
}

#[async_trait::async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn connect(&self, identity: &str) -> Result<SignalingConnection> {
        info!("Connecting to relay: {}", self.url);

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {e}")))?;

        let (mut write, mut read) = ws_stream.split();

        // Register before anything else; the relay replies with our id.
        let register = ClientMessage::Register {
            identity: identity.to_string(),
        };
        write
            .send(Message::Text(register.to_json()?))
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to register: {e}")))?;

        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        // Wait for the registration ack, forwarding any event the relay
        // interleaves before it.
        let local_peer_id = loop {
            let frame = read.next().await.ok_or_else(|| {
                Error::SignalingError("Relay closed before acknowledging registration".to_string())
            })?;

            match frame {
                Ok(Message::Text(text)) => match RelayMessage::from_json(&text) {
                    Ok(RelayMessage::Registered { peer_id }) => break peer_id,
                    Ok(other) => {
                        let _ = inbound_tx.send(other);
                    }
                    Err(e) => {
                        warn!("Dropping malformed relay frame: {}", e);
                    }
                },
                Ok(Message::Close(_)) => {
                    return Err(Error::SignalingError(
                        "Relay closed before acknowledging registration".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::WebSocketError(format!(
                        "WebSocket error during registration: {e}"
                    )));
                }
            }
        };

        info!("Registered with relay as peer {}", local_peer_id);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::sender_task(write, outbound_rx));
        tokio::spawn(Self::receiver_task(read, inbound_tx));

        Ok(SignalingConnection {
            local_peer_id,
            outbound,
            inbound,
        })
    }
}
