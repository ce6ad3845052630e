//! WebSocket transport (§6.1): envelopes ride text frames as JSON; stream data rides binary
//! frames as `#<stream_id>#<raw bytes>` (§3.3, §9 design notes — no UTF-8 validation of the
//! payload beyond the two `#` delimiters).

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{envelope::Envelope, gateway::Space, participant::OutboundMessage};

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Shared state handed to every axum handler: the one space this gateway process serves.
///
/// The spec's space-per-process boundary (§6.1) keeps this a single `Arc<Space>` rather than a
/// registry keyed by space name; a gateway hosting multiple spaces runs one process per space.
pub type AppState = Arc<Space>;

pub async fn upgrade(
    State(space): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer_token(&headers).or(query.token);
    ws.on_upgrade(move |socket| async move {
        match token {
            Some(token) => handle_socket(space, socket, token).await,
            None => {
                let _ = socket_close_unauthorized(socket).await;
            }
        }
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

async fn socket_close_unauthorized(mut socket: WebSocket) -> Result<(), axum::Error> {
    socket.close().await
}

async fn handle_socket(space: AppState, socket: WebSocket, token: String) {
    let outcome = match space.connect(&token).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let _ = socket_close_unauthorized(socket).await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    space.attach_outbound(&outcome.participant_id, tx).await;

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = match message {
                OutboundMessage::Envelope(envelope) => {
                    let Ok(text) = serde_json::to_string(&envelope) else { continue };
                    Message::Text(text.into())
                }
                OutboundMessage::RawFrame(bytes) => Message::Binary(bytes.into()),
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    if let Err(error) = deliver_envelope(&space, &outcome.participant_id, outcome.welcome).await {
        tracing::warn!(?error, "failed to deliver welcome envelope");
    }
    broadcast_presence(&space, outcome.presence_join).await;

    let participant_id = outcome.participant_id.clone();
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else { continue };
                let (_, deliveries) = space.handle_envelope(&participant_id, envelope).await;
                for (recipient, envelope) in deliveries {
                    let _ = deliver_envelope(&space, &recipient, envelope).await;
                }
            }
            Message::Binary(bytes) => {
                if let Some((stream_id, data)) = parse_stream_frame(&bytes) {
                    if let Ok(frames) = space.handle_stream_frame(&participant_id, stream_id, data).await {
                        for (recipient, frame) in frames {
                            space.send_raw(&recipient, frame).await;
                        }
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    for envelope in space.disconnect(&participant_id).await {
        broadcast_presence(&space, envelope).await;
    }
    writer.abort();
}

/// Split a `#<stream_id>#<data>` binary frame on its first two `#` delimiters. Shared with
/// `runtime::Runtime`'s read loop, which decodes the same frames from the client side.
pub(crate) fn parse_stream_frame(bytes: &[u8]) -> Option<(&str, &[u8])> {
    if bytes.first() != Some(&b'#') {
        return None;
    }
    let rest = &bytes[1..];
    let sep = rest.iter().position(|b| *b == b'#')?;
    let stream_id = std::str::from_utf8(&rest[..sep]).ok()?;
    Some((stream_id, &rest[sep + 1..]))
}

async fn deliver_envelope(space: &Space, recipient: &str, envelope: Envelope) -> Result<(), ()> {
    space.send_envelope(recipient, envelope).await;
    Ok(())
}

async fn broadcast_presence(space: &Space, envelope: Envelope) {
    for recipient in space.connected_ids().await {
        space.send_envelope(&recipient, envelope.clone()).await;
    }
}
