//! Web server for the warehouse pick-list UI
//!
//! JSON API over the batch, item, and event tables plus a per-batch
//! websocket feed. Handlers take the database lock briefly and never hold
//! it across an await or a broadcast.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::broadcast::ConnectionManager;
use crate::db::{self, BatchCounts, BatchItem, BatchOverview, Db, EventRow, ItemFilter};
use crate::error::Error;
use crate::logic::{remaining_qty, sort_items};
use crate::manapool::ManapoolClient;
use crate::picking;
use crate::scryfall::{CardRef, ResolveStrategy, ScryfallCard, ScryfallClient};
use crate::sync;

/// Shared application state; the connection is behind one mutex, everything
/// else is immutable after startup
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub manapool: Arc<ManapoolClient>,
    pub scryfall: Arc<ScryfallClient>,
    pub manager: Arc<ConnectionManager>,
    pub sync_workers: usize,
    pub recent_minutes: i64,
}

/// API response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn api_err(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
}

fn map_error(e: Error) -> ApiError {
    let status = match &e {
        Error::NotConfigured => StatusCode::BAD_REQUEST,
        Error::Upstream(_) | Error::Network(_) => StatusCode::BAD_GATEWAY,
        Error::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_err(status, e.to_string())
}

fn db_err(e: rusqlite::Error) -> ApiError {
    log::error!("Database error: {e}");
    api_err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Item listing filters as query parameters
#[derive(Debug, Default, Deserialize)]
struct ItemParams {
    game: Option<String>,
    q: Option<String>,
    #[serde(default)]
    show_picked: bool,
    #[serde(default)]
    show_missing: bool,
    #[serde(default)]
    show_all: bool,
}

/// A batch item decorated with the derived fields the picker UI renders
#[derive(Serialize)]
struct ItemView {
    #[serde(flatten)]
    item: BatchItem,
    qty_remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reserved_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ActionBody {
    session_id: Option<String>,
    note: Option<String>,
}

impl ActionBody {
    /// Session id from the request, or a fresh one for an anonymous action
    fn session(&self) -> String {
        self.session_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ReserveBody {
    set_code: String,
    #[serde(default)]
    reserved_by: String,
}

/// POST /api/batches/generate-from-manapool
async fn generate_batch_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<sync::SyncSummary>>, ApiError> {
    let summary = sync::run_sync(
        &state.db,
        &state.manapool,
        &state.scryfall,
        state.sync_workers,
        state.recent_minutes,
    )
    .await
    .map_err(map_error)?;
    Ok(ApiResponse::ok(summary))
}

/// GET /api/batches - open batches, newest first
async fn list_batches_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<BatchOverview>>>, ApiError> {
    let conn = state.db.lock().unwrap();
    let batches = db::list_open_batches(&conn).map_err(db_err)?;
    Ok(ApiResponse::ok(batches))
}

/// GET /api/batch/{id}/items
async fn items_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
    Query(params): Query<ItemParams>,
) -> Result<Json<ApiResponse<Vec<ItemView>>>, ApiError> {
    let conn = state.db.lock().unwrap();
    let batch = db::get_batch(&conn, batch_id)
        .map_err(db_err)?
        .ok_or_else(|| api_err(StatusCode::NOT_FOUND, "batch not found"))?;

    // The missing view shows provenance, so patch up older rows from the
    // order cache before rendering it.
    if params.show_missing || params.show_all {
        let order_ids = sync::order_ids_from_payload(batch.source_payload.as_deref());
        if let Err(e) = sync::backfill_order_names(&conn, batch_id, &order_ids) {
            log::warn!("Provenance backfill failed for batch {batch_id}: {e}");
        }
    }

    let filter = ItemFilter {
        game: params.game.filter(|g| !g.is_empty()),
        name_like: params.q.filter(|q| !q.is_empty()),
        show_picked: params.show_picked,
        show_missing: params.show_missing,
        show_all: params.show_all,
    };
    let mut items = db::list_batch_items(&conn, batch_id, &filter).map_err(db_err)?;
    sort_items(&mut items);
    let reservations = db::reservation_map(&conn, batch_id).map_err(db_err)?;

    let views = items
        .into_iter()
        .map(|item| ItemView {
            qty_remaining: remaining_qty(item.qty_required, item.qty_picked),
            reserved_by: reservations.get(&item.set_code).cloned(),
            item,
        })
        .collect();
    Ok(ApiResponse::ok(views))
}

/// GET /api/batch/{id}/counts
async fn counts_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
) -> Result<Json<ApiResponse<BatchCounts>>, ApiError> {
    let conn = state.db.lock().unwrap();
    let counts = db::batch_counts(&conn, batch_id).map_err(db_err)?;
    Ok(ApiResponse::ok(counts))
}

#[derive(Serialize)]
struct BatchSummary {
    #[serde(flatten)]
    counts: db::BatchSummaryCounts,
    missing_items: Vec<BatchItem>,
}

/// GET /api/batch/{id}/summary - end-of-run review counts plus missing items
async fn summary_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
) -> Result<Json<ApiResponse<BatchSummary>>, ApiError> {
    let conn = state.db.lock().unwrap();
    let counts = db::batch_summary_counts(&conn, batch_id).map_err(db_err)?;
    let missing_items = db::list_missing_items(&conn, batch_id).map_err(db_err)?;
    Ok(ApiResponse::ok(BatchSummary {
        counts,
        missing_items,
    }))
}

/// GET /api/batch/{id}/events - full audit trail, newest first
async fn events_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<EventRow>>>, ApiError> {
    let conn = state.db.lock().unwrap();
    let events = db::list_events(&conn, batch_id).map_err(db_err)?;
    Ok(ApiResponse::ok(events))
}

/// POST /api/batch/{id}/close
async fn close_batch_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
) -> Result<Json<ApiResponse<db::Batch>>, ApiError> {
    let conn = state.db.lock().unwrap();
    db::get_batch(&conn, batch_id)
        .map_err(db_err)?
        .ok_or_else(|| api_err(StatusCode::NOT_FOUND, "batch not found"))?;
    db::close_batch(&conn, batch_id).map_err(db_err)?;
    let batch = db::get_batch(&conn, batch_id)
        .map_err(db_err)?
        .ok_or_else(|| api_err(StatusCode::NOT_FOUND, "batch not found"))?;
    Ok(ApiResponse::ok(batch))
}

#[derive(Serialize)]
struct ReservationResult {
    set_code: String,
    reserved_by: Option<String>,
}

/// POST /api/batch/{id}/reserve-set - toggle a soft claim on a set
async fn reserve_set_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
    Json(body): Json<ReserveBody>,
) -> Result<Json<ApiResponse<ReservationResult>>, ApiError> {
    let set_code = body.set_code.to_lowercase();
    let holder = {
        let mut conn = state.db.lock().unwrap();
        picking::toggle_reservation(&mut conn, batch_id, &set_code, &body.reserved_by)
            .map_err(map_error)?
    };
    state.manager.broadcast(
        batch_id,
        serde_json::json!({
            "type": "set_reserved",
            "set_code": set_code,
            "reserved_by": holder,
        }),
    );
    Ok(ApiResponse::ok(ReservationResult {
        set_code,
        reserved_by: holder,
    }))
}

#[derive(Serialize)]
struct ItemActionResult {
    #[serde(flatten)]
    item: BatchItem,
    qty_remaining: i64,
    changed: bool,
    session_id: String,
}

/// The four per-item transitions share the same request and response shape
async fn item_action(
    state: AppState,
    item_id: i64,
    action: &str,
    body: Option<Json<ActionBody>>,
) -> Result<Json<ApiResponse<ItemActionResult>>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let session_id = body.session();
    let transition = {
        let mut conn = state.db.lock().unwrap();
        let result = match action {
            "pick" => picking::pick_item(&mut conn, item_id, Some(&session_id)),
            "undo" => picking::undo_pick(&mut conn, item_id, Some(&session_id)),
            "missing" => picking::mark_missing(
                &mut conn,
                item_id,
                body.note.as_deref().unwrap_or(""),
                Some(&session_id),
            ),
            "unmissing" => picking::unmark_missing(&mut conn, item_id, Some(&session_id)),
            _ => unreachable!("unknown item action {action}"),
        };
        result.map_err(map_error)?
    };
    // No-op transitions changed nothing; other viewers have nothing to redraw.
    if transition.changed {
        state.manager.broadcast(
            transition.item.batch_id,
            serde_json::json!({
                "type": "item_update",
                "item_id": item_id,
            }),
        );
    }
    Ok(ApiResponse::ok(ItemActionResult {
        qty_remaining: remaining_qty(transition.item.qty_required, transition.item.qty_picked),
        changed: transition.changed,
        session_id,
        item: transition.item,
    }))
}

async fn pick_handler(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    body: Option<Json<ActionBody>>,
) -> Result<Json<ApiResponse<ItemActionResult>>, ApiError> {
    item_action(state, item_id, "pick", body).await
}

async fn undo_handler(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    body: Option<Json<ActionBody>>,
) -> Result<Json<ApiResponse<ItemActionResult>>, ApiError> {
    item_action(state, item_id, "undo", body).await
}

async fn missing_handler(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    body: Option<Json<ActionBody>>,
) -> Result<Json<ApiResponse<ItemActionResult>>, ApiError> {
    item_action(state, item_id, "missing", body).await
}

async fn unmissing_handler(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    body: Option<Json<ActionBody>>,
) -> Result<Json<ApiResponse<ItemActionResult>>, ApiError> {
    item_action(state, item_id, "unmissing", body).await
}

#[derive(Debug, Deserialize)]
struct CardSearchParams {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    20
}

/// GET /api/cards/search?q={name}&limit={limit} - candidates for manual linking
async fn card_search_handler(
    State(state): State<AppState>,
    Query(params): Query<CardSearchParams>,
) -> Json<ApiResponse<Vec<ScryfallCard>>> {
    let cards = state.scryfall.search_cards(&params.q, params.limit).await;
    ApiResponse::ok(cards)
}

#[derive(Debug, Deserialize)]
struct LinkBody {
    scryfall_id: String,
}

/// POST /api/items/{id}/link-card - pin an item to a catalog id
async fn link_card_handler(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Json(body): Json<LinkBody>,
) -> Result<Json<ApiResponse<BatchItem>>, ApiError> {
    let (item, batch_id) = {
        let conn = state.db.lock().unwrap();
        let updated = db::link_scryfall(&conn, item_id, &body.scryfall_id).map_err(db_err)?;
        if updated == 0 {
            return Err(api_err(StatusCode::NOT_FOUND, "item not found"));
        }
        let item = db::get_item(&conn, item_id)
            .map_err(db_err)?
            .ok_or_else(|| api_err(StatusCode::NOT_FOUND, "item not found"))?;
        let batch_id = item.batch_id;
        (item, batch_id)
    };
    state.manager.broadcast(
        batch_id,
        serde_json::json!({
            "type": "item_update",
            "item_id": item_id,
        }),
    );
    Ok(ApiResponse::ok(item))
}

#[derive(Serialize)]
struct ResolveResult {
    card: Option<ScryfallCard>,
    strategy: Option<ResolveStrategy>,
}

/// POST /api/items/{id}/resolve-card - run the catalog fallback chain for an
/// item and pin the result when one is found
async fn resolve_card_handler(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<Json<ApiResponse<ResolveResult>>, ApiError> {
    let (reference, batch_id) = {
        let conn = state.db.lock().unwrap();
        let item = db::get_item(&conn, item_id)
            .map_err(db_err)?
            .ok_or_else(|| api_err(StatusCode::NOT_FOUND, "item not found"))?;
        (CardRef::from_item(&item), item.batch_id)
    };

    let (card, strategy) = state.scryfall.resolve(&state.db, &reference).await;
    if let Some(card) = &card {
        let conn = state.db.lock().unwrap();
        db::link_scryfall(&conn, item_id, &card.id).map_err(db_err)?;
    }
    if card.is_some() {
        state.manager.broadcast(
            batch_id,
            serde_json::json!({
                "type": "item_update",
                "item_id": item_id,
            }),
        );
    }
    Ok(ApiResponse::ok(ResolveResult { card, strategy }))
}

#[derive(Serialize)]
struct BatchSourceInfo {
    batch_id: i64,
    name: String,
    order_labels: Vec<String>,
}

#[derive(Serialize)]
struct HealthStatus {
    manapool_configured: bool,
    open_batches: usize,
    cached_orders: i64,
    last_sync: Option<db::SyncLogRow>,
    batches: Vec<BatchSourceInfo>,
}

/// GET /api/health - liveness plus a snapshot of the sync state, including
/// the source order labels behind each open batch
async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthStatus>>, ApiError> {
    let conn = state.db.lock().unwrap();
    let open = db::list_open_batches(&conn).map_err(db_err)?;
    let cached_orders = db::order_cache_count(&conn).map_err(db_err)?;
    let last_sync = db::last_sync_log(&conn).map_err(db_err)?;
    let batches = open
        .iter()
        .map(|overview| BatchSourceInfo {
            batch_id: overview.batch.id,
            name: overview.batch.name.clone(),
            order_labels: sync::order_labels_from_cache(
                &conn,
                overview.batch.source_payload.as_deref(),
            ),
        })
        .collect();
    Ok(ApiResponse::ok(HealthStatus {
        manapool_configured: state.manapool.is_configured(),
        open_batches: open.len(),
        cached_orders,
        last_sync,
        batches,
    }))
}

/// GET /ws/batch/{id} - live update feed for one batch
async fn ws_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.manager, batch_id))
}

async fn handle_socket(mut socket: WebSocket, manager: Arc<ConnectionManager>, batch_id: i64) {
    let (conn_id, mut rx) = manager.subscribe(batch_id);
    log::debug!("Viewer {conn_id} joined batch {batch_id}");
    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some(update) = update else { break };
                if socket.send(Message::Text(update.to_string().into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                // Inbound traffic is ignored; a close or error ends the feed.
                match incoming {
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }
    manager.unsubscribe(batch_id, conn_id);
    log::debug!("Viewer {conn_id} left batch {batch_id}");
}

/// Build the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/batches/generate-from-manapool",
            post(generate_batch_handler),
        )
        .route("/api/batches", get(list_batches_handler))
        .route("/api/batch/{id}/items", get(items_handler))
        .route("/api/batch/{id}/counts", get(counts_handler))
        .route("/api/batch/{id}/summary", get(summary_handler))
        .route("/api/batch/{id}/events", get(events_handler))
        .route("/api/batch/{id}/close", post(close_batch_handler))
        .route("/api/batch/{id}/reserve-set", post(reserve_set_handler))
        .route("/api/items/{id}/pick", post(pick_handler))
        .route("/api/items/{id}/undo", post(undo_handler))
        .route("/api/items/{id}/missing", post(missing_handler))
        .route("/api/items/{id}/unmissing", post(unmissing_handler))
        .route("/api/items/{id}/link-card", post(link_card_handler))
        .route("/api/items/{id}/resolve-card", post(resolve_card_handler))
        .route("/api/cards/search", get(card_search_handler))
        .route("/api/health", get(health_handler))
        .route("/ws/batch/{id}", get(ws_handler))
        .with_state(state)
}

/// Start the web server (async). Binds all interfaces; restrict exposure
/// with port mapping or firewall rules.
pub async fn serve(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let addr = format!("0.0.0.0:{port}");
    log::info!("Pick-list API listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::manapool::ManapoolConfig;
    use crate::scryfall::ScryfallConfig;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn test_state() -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        AppState {
            db: Arc::new(Mutex::new(conn)),
            manapool: Arc::new(ManapoolClient::new(ManapoolConfig::default())),
            scryfall: Arc::new(ScryfallClient::new(ScryfallConfig::default())),
            manager: Arc::new(ConnectionManager::new()),
            sync_workers: 4,
            recent_minutes: 10,
        }
    }

    #[test]
    fn router_builds() {
        let _router = create_router(test_state());
    }

    #[tokio::test]
    async fn item_actions_broadcast_to_batch_viewers() {
        let state = test_state();
        let item_id = {
            let conn = state.db.lock().unwrap();
            let batch_id = db::insert_batch(&conn, "B", None, None).unwrap();
            db::insert_batch_item(
                &conn,
                batch_id,
                &db::NewBatchItem {
                    card_name: "Black Lotus".to_string(),
                    qty_required: 1,
                    ..Default::default()
                },
            )
            .unwrap()
        };
        let (_, mut rx) = state.manager.subscribe(1);

        let result = item_action(state.clone(), item_id, "pick", None).await.unwrap();
        assert!(result.0.success);
        let update = rx.try_recv().unwrap();
        assert_eq!(update["type"], "item_update");
        assert_eq!(update["item_id"], item_id);
    }

    #[tokio::test]
    async fn noop_transitions_do_not_broadcast() {
        let state = test_state();
        let item_id = {
            let conn = state.db.lock().unwrap();
            let batch_id = db::insert_batch(&conn, "B", None, None).unwrap();
            db::insert_batch_item(
                &conn,
                batch_id,
                &db::NewBatchItem {
                    card_name: "Black Lotus".to_string(),
                    qty_required: 1,
                    ..Default::default()
                },
            )
            .unwrap()
        };
        let (_, mut rx) = state.manager.subscribe(1);

        // Undo at zero changes nothing.
        let result = item_action(state.clone(), item_id, "undo", None).await.unwrap();
        assert!(!result.0.data.unwrap().changed);
        assert!(rx.try_recv().is_err());

        // Pick to the cap notifies; picking past it does not.
        item_action(state.clone(), item_id, "pick", None).await.unwrap();
        assert!(rx.try_recv().is_ok());
        let result = item_action(state, item_id, "pick", None).await.unwrap();
        assert!(!result.0.data.unwrap().changed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn item_action_on_unknown_item_is_404() {
        let state = test_state();
        let err = item_action(state, 999, "pick", None).await.err().unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reservation_round_trip_over_the_api() {
        let state = test_state();
        let batch_id = {
            let conn = state.db.lock().unwrap();
            db::insert_batch(&conn, "B", None, None).unwrap()
        };

        let result = reserve_set_handler(
            State(state.clone()),
            Path(batch_id),
            Json(ReserveBody {
                set_code: "LEA".to_string(),
                reserved_by: "alice".to_string(),
            }),
        )
        .await
        .unwrap();
        let data = result.0.data.unwrap();
        assert_eq!(data.set_code, "lea");
        assert_eq!(data.reserved_by.as_deref(), Some("alice"));

        let result = reserve_set_handler(
            State(state),
            Path(batch_id),
            Json(ReserveBody {
                set_code: "lea".to_string(),
                reserved_by: "alice".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(result.0.data.unwrap().reserved_by.is_none());
    }

    #[tokio::test]
    async fn link_card_pins_the_item_and_notifies() {
        let state = test_state();
        let item_id = {
            let conn = state.db.lock().unwrap();
            let batch_id = db::insert_batch(&conn, "B", None, None).unwrap();
            db::insert_batch_item(
                &conn,
                batch_id,
                &db::NewBatchItem {
                    card_name: "Brainstorm".to_string(),
                    qty_required: 1,
                    ..Default::default()
                },
            )
            .unwrap()
        };
        let (_, mut rx) = state.manager.subscribe(1);

        let result = link_card_handler(
            State(state),
            Path(item_id),
            Json(LinkBody {
                scryfall_id: "card-x".to_string(),
            }),
        )
        .await
        .unwrap();
        let item = result.0.data.unwrap();
        assert_eq!(item.scryfall_id.as_deref(), Some("card-x"));
        assert_eq!(rx.try_recv().unwrap()["type"], "item_update");
    }

    #[tokio::test]
    async fn link_card_on_unknown_item_is_404() {
        let state = test_state();
        let err = link_card_handler(
            State(state),
            Path(42),
            Json(LinkBody {
                scryfall_id: "card-x".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generate_without_credentials_is_bad_request() {
        let state = test_state();
        let err = generate_batch_handler(State(state))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_sync_state() {
        let state = test_state();
        // One failed sync attempt leaves a finalized log row behind.
        let _ = generate_batch_handler(State(state.clone())).await;

        let result = health_handler(State(state)).await.unwrap();
        let health = result.0.data.unwrap();
        assert!(!health.manapool_configured);
        assert_eq!(health.open_batches, 0);
        assert!(health.batches.is_empty());
        assert_eq!(health.last_sync.unwrap().status, "error");
    }

    #[tokio::test]
    async fn health_resolves_batch_order_labels_from_cache() {
        let state = test_state();
        {
            let conn = state.db.lock().unwrap();
            db::insert_batch(
                &conn,
                "ManaPool Unfulfilled - test",
                Some("manapool"),
                Some("{\"order_ids\":[\"ord_a\"]}"),
            )
            .unwrap();
            db::save_order_cache(&conn, "ord_a", r#"{"order":{"id":"ord_a","label":"100"}}"#)
                .unwrap();
        }

        let result = health_handler(State(state)).await.unwrap();
        let health = result.0.data.unwrap();
        assert_eq!(health.open_batches, 1);
        assert_eq!(health.cached_orders, 1);
        assert_eq!(health.batches.len(), 1);
        assert_eq!(health.batches[0].order_labels, vec!["100".to_string()]);
    }
}
