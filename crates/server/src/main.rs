use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use playback::PlaybackHandle;
use server_api::{
    add_item, control, current_state, edit_item, manage, saved_queue_len, trigger,
    update_settings, ApiContext,
};
use shared::{
    domain::SettingsPatch,
    error::{ApiError, ErrorCode},
    protocol::{
        AddRequest, CommandResponse, ControlAction, ControlRequest, EditItemRequest,
        ManageRequest, ServerEvent, StateSnapshot,
    },
};
use source_fetch::SyndicationClient;
use storage::{
    load_or_default, spawn_write_behind, BlobStore, MemoryStore, SnapshotStore, Storage,
};
use tokio::sync::{broadcast::error::RecvError, watch};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url, PersistenceBackend, Settings};

const MAX_BODY_BYTES: usize = 64 * 1024;
const SHUTDOWN_SAVE_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    /// Flips to `true` once shutdown starts so open sockets let go of the
    /// playback handle.
    shutdown: watch::Receiver<bool>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let store = open_store(&settings).await?;
    info!(store = %store.describe(), "persistence ready");

    let document = load_or_default(store.as_ref()).await;
    info!(items = document.queue.len(), "queue loaded");
    let (playback, documents) = PlaybackHandle::spawn(document, settings.event_capacity);
    let writer = spawn_write_behind(store.clone(), documents);

    let fetcher = SyndicationClient::new(settings.syndication_base_url.clone())
        .context("failed to build upstream client")?;
    let api = ApiContext {
        playback,
        fetcher: Arc::new(fetcher),
        store,
    };
    let (shutdown_tx, shutdown) = watch::channel(false);
    let app = build_router(Arc::new(AppState { api, shutdown }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // The saver ends once the last playback handle is gone and the newest
    // document has been written.
    if tokio::time::timeout(SHUTDOWN_SAVE_GRACE, writer).await.is_err() {
        warn!("saver still running at shutdown, latest queue may be unsaved");
    }
    Ok(())
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    let store: Arc<dyn SnapshotStore> = match settings.persistence {
        PersistenceBackend::Sqlite => {
            let database_url = prepare_database_url(&settings.database_url)?;
            let storage = Storage::new(&database_url).await.map_err(|error| {
                error!(
                    %database_url,
                    %error,
                    "failed to open SQLite database; verify parent directory exists and permissions are correct"
                );
                error
            })?;
            Arc::new(storage)
        }
        PersistenceBackend::Blob => {
            let url = settings
                .blob_url
                .clone()
                .context("blob persistence needs APP__BLOB_URL or blob_url in overlay.toml")?;
            Arc::new(BlobStore::new(url)?)
        }
        PersistenceBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/state", get(http_state))
        .route("/api/add", post(http_add))
        .route("/api/edit_tweet", post(http_edit))
        .route("/api/control", post(http_control))
        .route("/api/manage", post(http_manage))
        .route("/api/settings", post(http_settings))
        .route("/trigger_next", get(trigger_next))
        .route("/trigger_prev", get(trigger_prev))
        .route("/trigger_auto", get(trigger_auto))
        .route("/hide", get(trigger_hide))
        .route("/debug-save", get(debug_save))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Duplicate => StatusCode::CONFLICT,
        ErrorCode::UpstreamFetch => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    (status_for(err.code), Json(err))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_state(State(state): State<Arc<AppState>>) -> ApiResult<StateSnapshot> {
    current_state(&state.api).await.map(Json).map_err(reject)
}

async fn http_add(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddRequest>,
) -> ApiResult<CommandResponse> {
    add_item(&state.api, req).await.map_err(reject)?;
    Ok(Json(CommandResponse::OK))
}

async fn http_edit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EditItemRequest>,
) -> ApiResult<CommandResponse> {
    edit_item(&state.api, req).await.map_err(reject)?;
    Ok(Json(CommandResponse::OK))
}

async fn http_control(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ControlRequest>,
) -> ApiResult<CommandResponse> {
    control(&state.api, req).await.map_err(reject)?;
    Ok(Json(CommandResponse::OK))
}

async fn http_manage(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManageRequest>,
) -> ApiResult<CommandResponse> {
    manage(&state.api, req).await.map_err(reject)?;
    Ok(Json(CommandResponse::OK))
}

async fn http_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> ApiResult<CommandResponse> {
    update_settings(&state.api, patch).await.map_err(reject)?;
    Ok(Json(CommandResponse::OK))
}

async fn run_trigger(state: &AppState, action: ControlAction) -> impl IntoResponse {
    match trigger(&state.api, action).await {
        Ok(outcome) => (StatusCode::OK, outcome.to_string()),
        Err(err) => (status_for(err.code), err.message),
    }
}

async fn trigger_next(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run_trigger(&state, ControlAction::Next).await
}

async fn trigger_prev(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run_trigger(&state, ControlAction::Prev).await
}

async fn trigger_auto(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run_trigger(&state, ControlAction::ToggleAuto).await
}

async fn trigger_hide(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run_trigger(&state, ControlAction::Hide).await
}

async fn debug_save(State(state): State<Arc<AppState>>) -> String {
    match saved_queue_len(&state.api).await {
        Ok(len) => format!("Queue: {len}"),
        Err(err) => err.message,
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    use futures::{SinkExt, StreamExt};

    let (initial, mut events_rx) = match state.api.playback.subscribe().await {
        Ok(subscription) => subscription,
        Err(error) => {
            warn!(%error, "rejecting websocket, playback unavailable");
            return;
        }
    };
    let (mut sender, mut receiver) = socket.split();
    let playback = state.api.playback.clone();
    let mut shutdown = state.shutdown.clone();

    let send_task = tokio::spawn(async move {
        let mut next = Some(ServerEvent::StateUpdate(initial));
        loop {
            let event = match next.take() {
                Some(event) => event,
                None => match events_rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket client lagged, resyncing");
                        match playback.snapshot().await {
                            Ok(snapshot) => ServerEvent::StateUpdate(snapshot),
                            Err(_) => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            Ok(_) = shutdown.wait_for(|stop| *stop) => {
                debug!("closing websocket for shutdown");
                break;
            }
        }
    }

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
