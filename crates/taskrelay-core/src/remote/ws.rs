//! Home Assistant WebSocket event subscription.
//!
//! Connects to `/api/websocket`, authenticates, subscribes to
//! `state_changed` events, and forwards the entity id of every tracked todo
//! entity that changes. The outer loop reconnects without an attempt bound
//! until the cancellation token fires; only an auth rejection ends it early.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const SUBSCRIPTION_ID: u64 = 1;

/// Messages the server can send. Unknown types fall into `Other` and are
/// ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    AuthRequired,
    AuthOk,
    AuthInvalid {
        #[serde(default)]
        message: String,
    },
    Result {
        #[serde(default)]
        success: bool,
    },
    Event {
        event: EventEnvelope,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    data: EventData,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    #[serde(default)]
    entity_id: String,
}

/// Derives the WebSocket endpoint from the configured HTTP base URL.
pub(crate) fn websocket_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    };
    format!("{ws_base}/api/websocket")
}

/// Connects once and authenticates, then closes. Used at engine start to
/// decide between event-driven and polling-only operation.
pub(crate) async fn probe(base_url: &str, token: &str) -> Result<()> {
    let url = websocket_url(base_url);
    let (mut stream, _) = connect_async(&url).await.map_err(ws_error)?;
    let result = authenticate(&mut stream, token).await;
    let _ = stream.close(None).await;
    result
}

/// Runs the subscription until `cancel` fires. Forwards changed entity ids
/// through `events`. Transport failures trigger reconnection with unbounded
/// attempts; an auth rejection is terminal.
pub(crate) async fn subscribe(
    base_url: &str,
    token: &str,
    entity_ids: &[String],
    events: mpsc::Sender<String>,
    cancel: CancelToken,
) -> Result<()> {
    let url = websocket_url(base_url);
    let tracked: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match run_session(&url, token, &tracked, &events, &cancel).await {
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err @ Error::Credential(_)) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "event subscription dropped, reconnecting");
            }
            Ok(()) => {
                tracing::warn!("event subscription stream ended, reconnecting");
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Performs the auth_required → auth → auth_ok handshake.
async fn authenticate(stream: &mut WsStream, token: &str) -> Result<()> {
    loop {
        let msg = next_text(stream).await?;
        match serde_json::from_str::<ServerMessage>(&msg)? {
            ServerMessage::AuthRequired => {
                let auth = json!({ "type": "auth", "access_token": token });
                stream
                    .send(Message::Text(auth.to_string()))
                    .await
                    .map_err(ws_error)?;
            }
            ServerMessage::AuthOk => return Ok(()),
            ServerMessage::AuthInvalid { message } => {
                return Err(Error::Credential(if message.is_empty() {
                    "Home Assistant rejected the access token".into()
                } else {
                    message
                }));
            }
            _ => {}
        }
    }
}

async fn run_session(
    url: &str,
    token: &str,
    tracked: &HashSet<&str>,
    events: &mpsc::Sender<String>,
    cancel: &CancelToken,
) -> Result<()> {
    let (mut stream, _) = connect_async(url).await.map_err(ws_error)?;
    authenticate(&mut stream, token).await?;

    let subscribe_msg = json!({
        "id": SUBSCRIPTION_ID,
        "type": "subscribe_events",
        "event_type": "state_changed",
    });
    stream
        .send(Message::Text(subscribe_msg.to_string()))
        .await
        .map_err(ws_error)?;

    tracing::info!("subscribed to Home Assistant state_changed events");

    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => {
                let _ = stream.close(None).await;
                return Err(Error::Cancelled);
            }
            msg = stream.next() => msg,
        };

        let Some(message) = message else {
            return Ok(()); // stream closed by the server
        };

        match message.map_err(ws_error)? {
            Message::Text(text) => {
                let parsed: ServerMessage = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        tracing::debug!(error = %err, "unparseable event message");
                        continue;
                    }
                };
                if let ServerMessage::Event { event } = parsed {
                    if event.event_type != "state_changed" {
                        continue;
                    }
                    if tracked.contains(event.data.entity_id.as_str()) {
                        tracing::debug!(entity_id = %event.data.entity_id, "tracked entity changed");
                        if events.send(event.data.entity_id).await.is_err() {
                            // Receiver gone: the engine is shutting down.
                            return Ok(());
                        }
                    }
                } else if let ServerMessage::Result { success } = parsed {
                    if !success {
                        return Err(Error::Remote("event subscription rejected".into()));
                    }
                }
            }
            Message::Ping(payload) => {
                stream.send(Message::Pong(payload)).await.map_err(ws_error)?;
            }
            Message::Close(_) => return Ok(()),
            _ => {}
        }
    }
}

/// Waits for the next text frame, answering pings along the way.
async fn next_text(stream: &mut WsStream) -> Result<String> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Ping(payload))) => {
                stream.send(Message::Pong(payload)).await.map_err(ws_error)?;
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(Error::Remote("connection closed during handshake".into()));
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(ws_error(err)),
        }
    }
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> Error {
    Error::Remote(format!("websocket: {err}"))
}
