use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::SubscriberHub;
use crate::db::models::BetStatus;
use crate::db::Database;

#[derive(Clone)]
pub struct AppState {
    pub hub: SubscriberHub,
    pub db: Database,
}

/// Build the Axum router: the subscriber socket plus a small read-only API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_handler))
        .route("/api/micro-bets", get(micro_bets_handler))
        .route("/api/micro-bets/:id", get(micro_bet_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.hub.subscribe();
    ws.on_upgrade(move |socket| serve_subscriber(socket, rx))
}

/// Forward hub messages to one socket until either side goes away.
async fn serve_subscriber(socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    info!("Subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(text) => {
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        debug!("Subscriber send failed: {}", e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagging, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Subscriber socket error: {}", e);
                    break;
                }
                // Pings are answered by axum; clients have nothing else to say.
                Some(Ok(_)) => {}
            },
        }
    }
    info!("Subscriber disconnected");
}

/// GET /api/health
async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let count = |status| {
        state
            .db
            .count_micro_bets(status)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    };
    Ok(Json(serde_json::json!({
        "status": "ok",
        "subscribers": state.hub.subscriber_count(),
        "activeMicroBets": count(BetStatus::Active)?,
        "closedMicroBets": count(BetStatus::Closed)?,
    })))
}

/// GET /api/micro-bets
async fn micro_bets_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .list_recent_micro_bets(50)
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// GET /api/micro-bets/:id
async fn micro_bet_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.db.get_micro_bet(&id) {
        Ok(Some(bet)) => Ok(Json(bet)),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("micro-bet {} not found", id))),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
