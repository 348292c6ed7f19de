use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use signal_proto::RoomEventKind;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::error::SignalError;
use crate::state::AppState;

/// GET /sessions/{id}/room/ws - push a room snapshot on connect and after
/// every change. Clients that cannot hold a socket keep polling instead.
pub async fn room_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, SignalError> {
    let caller = state.caller(&headers);
    state
        .bridge()
        .gate()
        .authorize(caller.as_deref(), &session_id)
        .await?;
    let caller = caller.unwrap_or_default();
    Ok(ws.on_upgrade(move |socket| stream_room(socket, state, session_id, caller)))
}

async fn stream_room(socket: WebSocket, state: AppState, session_id: String, caller: String) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the first snapshot so no change slips between them.
    let mut events = state.feed().subscribe(&session_id);

    if send_snapshot(&mut sender, &state, &session_id, &caller)
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let expired = event.kind == RoomEventKind::Expired;
                        if send_snapshot(&mut sender, &state, &session_id, &caller).await.is_err() {
                            break;
                        }
                        if expired {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(
                            session = %session_id,
                            skipped,
                            "room feed lagged; resending snapshot"
                        );
                        if send_snapshot(&mut sender, &state, &session_id, &caller).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(session = %session_id, error = %err, "room feed socket error");
                        break;
                    }
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    debug!(session = %session_id, caller = %caller, "room feed closed");
}

async fn send_snapshot<S>(
    sender: &mut S,
    state: &AppState,
    session_id: &str,
    caller: &str,
) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let room = match state.service().get_room(session_id, Some(caller)).await {
        Ok(room) => room,
        Err(err) => {
            warn!(session = %session_id, error = %err, "room feed snapshot failed");
            return Err(());
        }
    };
    let text = serde_json::to_string(&room).map_err(|_| ())?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
