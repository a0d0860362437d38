//! WebSocket and HTTP transport for the engine.
//!
//! Provides the I/O half the sans-IO [`crate::Client`] asks for via its
//! actions: [`connect_channel`] opens the live channel and exposes it as a
//! pair of typed frame channels, and [`HttpApi`] wraps the request/response
//! fallback endpoints. Protocol logic stays in the engine - this layer only
//! moves frames.

use futures_util::{SinkExt, StreamExt};
use palaver_proto::{ClientFrame, DecodeError, Identity, Message, Room, ServerFrame};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

/// Timeout applied to every fallback request. The baseline design had none;
/// a hung request would otherwise stall its command forever.
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Live channel could not be opened.
    #[error("channel connect failed: {0}")]
    Connect(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(String),

    /// HTTP client could not be constructed.
    #[error("http client setup failed: {0}")]
    Setup(String),
}

/// Handle to an open live channel.
///
/// Frames flow through the channels; internal tasks handle the WebSocket
/// I/O. When the socket closes or errors, `from_server` yields `None` - the
/// driver feeds that into the engine as a channel-closed event.
pub struct ChannelHandle {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<ClientFrame>,
    /// Receive decoded frames from the server.
    pub from_server: mpsc::Receiver<ServerFrame>,
    reader_abort: tokio::task::AbortHandle,
    writer_abort: tokio::task::AbortHandle,
}

impl ChannelHandle {
    /// Tear down the channel tasks.
    pub fn stop(&self) {
        self.reader_abort.abort();
        self.writer_abort.abort();
    }
}

/// Open the live channel to `url` (a `ws://` or `wss://` endpoint).
pub async fn connect_channel(url: &str) -> Result<ChannelHandle, TransportError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let (mut write, mut read) = stream.split();

    let (to_server_tx, mut to_server_rx) = mpsc::channel::<ClientFrame>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<ServerFrame>(32);

    let writer = tokio::spawn(async move {
        while let Some(frame) = to_server_rx.recv().await {
            let text = match palaver_proto::encode(&frame) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(%err, "outbound frame encode failed");
                    continue;
                },
            };
            if write.send(tungstenite::Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let reader = tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(tungstenite::Message::Text(text)) => {
                    match palaver_proto::decode(text.as_str()) {
                        Ok(frame) => {
                            if from_server_tx.send(frame).await.is_err() {
                                break;
                            }
                        },
                        Err(DecodeError::UnknownFrameType(kind)) => {
                            tracing::debug!(%kind, "skipping unknown frame type");
                        },
                        Err(err) => {
                            tracing::warn!(%err, "dropping malformed frame");
                        },
                    }
                },
                Ok(tungstenite::Message::Close(_)) | Err(_) => break,
                // Ping/pong and binary frames are transport noise here.
                Ok(_) => {},
            }
        }
        // Dropping the sender closes `from_server`, which the driver
        // translates into a channel-closed event for the engine.
    });

    Ok(ChannelHandle {
        to_server: to_server_tx,
        from_server: from_server_rx,
        reader_abort: reader.abort_handle(),
        writer_abort: writer.abort_handle(),
    })
}

/// Request/response fallback endpoints.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base: String,
}

impl HttpApi {
    /// Create an API client for `base` (scheme + host, no trailing slash).
    pub fn new(base: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        Ok(Self { client, base: base.into() })
    }

    /// `GET /api/identity`
    pub async fn identity(&self) -> Result<Identity, TransportError> {
        self.get_json(&format!("{}/api/identity", self.base)).await
    }

    /// `GET /api/rooms`
    pub async fn rooms(&self) -> Result<Vec<Room>, TransportError> {
        self.get_json(&format!("{}/api/rooms", self.base)).await
    }

    /// `GET /api/messages?room_id=` - returns messages oldest first.
    pub async fn messages(&self, room_id: &str) -> Result<Vec<Message>, TransportError> {
        let url = format!("{}/api/messages", self.base);
        let response = self
            .client
            .get(url)
            .query(&[("room_id", room_id)])
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        response.json().await.map_err(|e| TransportError::Http(e.to_string()))
    }

    /// `POST /api/messages/send`
    pub async fn send_message(
        &self,
        room_id: &str,
        content: &str,
        client_tag: &str,
    ) -> Result<Message, TransportError> {
        let body = serde_json::json!({
            "room_id": room_id,
            "content": content,
            "client_tag": client_tag,
        });
        self.post_json(&format!("{}/api/messages/send", self.base), &body).await
    }

    /// `POST /api/rooms/create`
    pub async fn create_room(
        &self,
        name: &str,
        description: &str,
        is_private: bool,
    ) -> Result<Room, TransportError> {
        let body = serde_json::json!({
            "name": name,
            "description": description,
            "is_private": is_private,
        });
        self.post_json(&format!("{}/api/rooms/create", self.base), &body).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        response.json().await.map_err(|e| TransportError::Http(e.to_string()))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        response.json().await.map_err(|e| TransportError::Http(e.to_string()))
    }
}
