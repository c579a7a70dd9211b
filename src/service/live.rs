//! WebSocket spectator channel for one match
//!
//! On connect the client gets the current match view, then every event the
//! match channel carries. Lagging clients skip ahead; nothing is replayed.

use crate::error::{ArenaError, Result};
use crate::events::EventPublisher;
use crate::lifecycle::MatchView;
use crate::service::api_error::ApiError;
use crate::service::app::AppState;
use crate::types::{ArenaEvent, MatchId};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, warn};

pub async fn live_handler(
    ws: WebSocketUpgrade,
    Path(match_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Response, ApiError> {
    let match_id: MatchId = match_id
        .parse()
        .map_err(|_| ArenaError::match_not_found(&match_id))?;
    // Reject unknown matches before upgrading
    state.lifecycle().match_view(match_id).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, match_id)))
}

/// Where a spectator starts from
enum Feed {
    /// The match already ended; nothing more will be published
    Finished(MatchView),
    Live(MatchView, Receiver<ArenaEvent>),
}

/// Subscribe before reading the match, so an event published between the
/// read and the subscription cannot be missed. A match found terminal after
/// subscribing has its channel closed again, since settlement may already
/// have removed it before this subscription recreated it.
async fn open_feed(state: &AppState, match_id: MatchId) -> Result<Feed> {
    let rx = state.bus().subscribe(match_id)?;
    let view = match state.lifecycle().match_view(match_id).await {
        Ok(view) => view,
        Err(e) => {
            drop(rx);
            state.bus().close_match(match_id).await?;
            return Err(e);
        }
    };

    if view.status.is_terminal() {
        drop(rx);
        state.bus().close_match(match_id).await?;
        return Ok(Feed::Finished(view));
    }
    Ok(Feed::Live(view, rx))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, match_id: MatchId) {
    let (view, rx) = match open_feed(&state, match_id).await {
        Ok(Feed::Live(view, rx)) => (view, Some(rx)),
        Ok(Feed::Finished(view)) => (view, None),
        Err(e) => {
            warn!("Spectator snapshot for {} failed: {}", match_id, e);
            return;
        }
    };

    let snapshot = json!({ "type": "snapshot", "match_id": match_id, "match": view });
    if socket
        .send(Message::Text(snapshot.to_string().into()))
        .await
        .is_err()
    {
        return;
    }
    let Some(mut rx) = rx else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    state.metrics().record_spectator_connected();
    debug!("Spectator connected to match {}", match_id);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    let msg = match serde_json::to_string(&event) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!("Failed to serialize {} event: {}", event.kind(), e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    state.metrics().record_events_lagged(skipped);
                    debug!("Spectator of {} skipped {} events", match_id, skipped);
                }
                Err(RecvError::Closed) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                    if socket.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.metrics().record_spectator_disconnected();
    debug!("Spectator disconnected from match {}", match_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::rating::LocalIdentitySync;
    use crate::store::NewAgent;

    fn state() -> AppState {
        AppState::assemble(AppConfig::default(), None, Arc::new(LocalIdentitySync)).unwrap()
    }

    fn register(state: &AppState, name: &str) -> String {
        state
            .registry()
            .register(NewAgent {
                name: name.to_string(),
                description: None,
                owner: None,
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_finished_match_leaves_no_channel_behind() {
        let state = state();
        let alpha = register(&state, "alpha");
        let bravo = register(&state, "bravo");

        state.queue().enqueue(&alpha, "wikipedia-speedrun").await.unwrap();
        let paired = state.queue().enqueue(&bravo, "wikipedia-speedrun").await.unwrap();
        let match_id = paired.record.id;
        for agent in [&alpha, &bravo] {
            state.readiness().signal_ready(match_id, agent).await.unwrap();
        }
        state.lifecycle().claim_victory(match_id, &alpha).await.unwrap();

        let feed = open_feed(&state, match_id).await.unwrap();
        assert!(matches!(feed, Feed::Finished(_)));
        assert_eq!(state.bus().open_channels(), 0);
    }

    #[tokio::test]
    async fn test_running_match_keeps_its_subscription() {
        let state = state();
        let alpha = register(&state, "alpha");
        let waiting = state.queue().enqueue(&alpha, "wikipedia-speedrun").await.unwrap();

        let feed = open_feed(&state, waiting.record.id).await.unwrap();
        assert!(matches!(feed, Feed::Live(_, _)));
        assert_eq!(state.bus().open_channels(), 1);
    }
}
