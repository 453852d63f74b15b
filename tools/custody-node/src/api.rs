use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::Method;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use custody_common::currency::{self, Amount};
use custody_common::wallet::WalletTransaction;
use custody_common::{EventRecord, HolderId, Product, ProductId, Receipt, SignedCommand};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

// ─── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub id: ProductId,
    pub history: Vec<HolderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountResponse {
    pub holder: HolderId,
    #[serde(with = "currency::as_decimal_string")]
    pub balance: Amount,
    pub entries: Vec<WalletTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub products: usize,
    pub last_seq: u64,
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    #[serde(default)]
    since: u64,
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/commands", post(command_handler))
        .route("/products", get(list_products_handler))
        .route("/products/{id}", get(product_handler))
        .route("/products/{id}/history", get(history_handler))
        .route("/holders/{holder}/products", get(holder_products_handler))
        .route("/holders/{holder}/account", get(account_handler))
        .route("/events", get(events_handler))
        .route("/events/ws", get(events_ws_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(signed): Json<SignedCommand>,
) -> Result<Json<Receipt>, ApiError> {
    state.execute(signed).await.map(Json)
}

async fn list_products_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Product>> {
    Json(state.read(|l| l.list()).await)
}

async fn product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id = ProductId(id);
    let product = state.read(|l| l.get(&id)).await?;
    Ok(Json(product))
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let id = ProductId(id);
    let history = state.read(|l| l.history(&id)).await?;
    Ok(Json(HistoryResponse { id, history }))
}

async fn holder_products_handler(
    State(state): State<Arc<AppState>>,
    Path(holder): Path<String>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let holder: HolderId = holder.parse()?;
    Ok(Json(state.read(|l| l.held_by(&holder)).await))
}

async fn account_handler(
    State(state): State<Arc<AppState>>,
    Path(holder): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let holder: HolderId = holder.parse()?;
    let account = state.read(|l| l.account(&holder)).await;
    Ok(Json(AccountResponse {
        holder,
        balance: account.balance(),
        entries: account.entries,
    }))
}

async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SinceQuery>,
) -> Json<Vec<EventRecord>> {
    Json(state.read(|l| l.events_since(query.since).to_vec()).await)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (products, last_seq) = state.read(|l| (l.len(), l.last_seq())).await;
    Json(HealthResponse {
        status: "ok".to_string(),
        products,
        last_seq,
    })
}

// ─── Event stream ────────────────────────────────────────────────────────────

async fn events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SinceQuery>,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state, query.since))
}

/// Send the journal after `since`, then live events, as JSON text frames.
///
/// A subscriber that falls too far behind is disconnected; it can reconnect
/// with `?since=<last seq>` and lose nothing.
async fn stream_events(mut socket: WebSocket, state: Arc<AppState>, since: u64) {
    // Subscribe before reading the backlog so nothing slips between them.
    let mut live = state.subscribe();
    let backlog = state.read(|l| l.events_since(since).to_vec()).await;

    let mut last_sent = since;
    for record in backlog {
        if send_record(&mut socket, &record).await.is_err() {
            return;
        }
        last_sent = record.seq;
    }

    loop {
        tokio::select! {
            received = live.recv() => match received {
                Ok(record) if record.seq <= last_sent => {}
                Ok(record) => {
                    if send_record(&mut socket, &record).await.is_err() {
                        break;
                    }
                    last_sent = record.seq;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, last_sent, "event subscriber lagged, closing");
                    socket.send(Message::Close(None)).await.ok();
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(last_sent, "event subscriber disconnected");
}

async fn send_record(socket: &mut WebSocket, record: &EventRecord) -> Result<(), axum::Error> {
    let text = serde_json::to_string(record).map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}
