use super::*;
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::domain::{CustomCard, GlobalSettings, Item};
use std::{sync::Mutex, time::Duration};
use tokio::net::TcpListener;

fn sample_document() -> QueueDocument {
    let settings = GlobalSettings {
        theme: "dark".into(),
        default_duration_seconds: 20,
        ..GlobalSettings::default()
    };
    let item = Item::custom(CustomCard {
        title: "Welcome".into(),
        text: "Stream starts soon".into(),
        image_url: None,
        media: Vec::new(),
    });
    QueueDocument::new(vec![item], settings)
}

#[tokio::test]
async fn sqlite_starts_empty_and_round_trips() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
    assert!(storage.load().await.expect("load").is_none());

    let document = sample_document().stamped();
    storage.save(&document).await.expect("save");
    storage.save(&document).await.expect("overwrite");
    let loaded = storage.load().await.expect("load").expect("document");
    assert_eq!(loaded, document);

    storage.clear().await.expect("clear");
    assert!(storage.load().await.expect("load").is_none());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("overlay.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    storage.save(&sample_document()).await.expect("save");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let loaded = reopened.load().await.expect("load").expect("document");
    assert_eq!(loaded.settings.theme, "dark");
}

#[tokio::test]
async fn load_or_default_survives_unreachable_store() {
    let store = MemoryStore::with_document(sample_document());
    store.set_failing(true);
    let document = load_or_default(&store).await;
    assert!(document.queue.is_empty());
    assert_eq!(document.settings, GlobalSettings::default());
}

#[test]
fn document_without_settings_gets_defaults() {
    let document: QueueDocument =
        serde_json::from_str(r#"{"queue": [], "updatedAt": "2024-05-01T10:00:00Z"}"#)
            .expect("document");
    assert_eq!(document.settings, GlobalSettings::default());
    assert!(document.updated_at.is_some());
}

async fn wait_for_saves(store: &MemoryStore, count: usize) {
    for _ in 0..200 {
        if store.save_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} saves, saw {}", store.save_count());
}

#[tokio::test]
async fn write_behind_saves_latest_document() {
    let store = MemoryStore::new();
    let (tx, rx) = watch::channel(QueueDocument::default());
    let worker = spawn_write_behind(Arc::new(store.clone()), rx);

    tx.send_replace(sample_document());
    wait_for_saves(&store, 1).await;
    let saved = store.current().expect("saved");
    assert_eq!(saved.queue.len(), 1);
    assert!(saved.updated_at.is_some());

    drop(tx);
    worker.await.expect("worker ends with sender");
}

#[tokio::test]
async fn write_behind_keeps_going_after_failures() {
    let store = MemoryStore::new();
    store.set_failing(true);
    let (tx, rx) = watch::channel(QueueDocument::default());
    let _worker = spawn_write_behind(Arc::new(store.clone()), rx);

    tx.send_replace(sample_document());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.save_count(), 0);

    store.set_failing(false);
    let mut next = sample_document();
    next.settings.theme = "light".into();
    tx.send_replace(next);
    wait_for_saves(&store, 1).await;
    assert_eq!(store.current().expect("saved").settings.theme, "light");
}

#[derive(Clone, Default)]
struct BlobState {
    document: std::sync::Arc<Mutex<Option<serde_json::Value>>>,
}

async fn get_blob(State(state): State<BlobState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let document = state.document.lock().expect("lock").clone();
    document.map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn put_blob(State(state): State<BlobState>, Json(body): Json<serde_json::Value>) -> StatusCode {
    *state.document.lock().expect("lock") = Some(body);
    StatusCode::OK
}

async fn spawn_blob_server() -> anyhow::Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/api/jsonBlob/test", get(get_blob).put(put_blob))
        .with_state(BlobState::default());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}/api/jsonBlob/test"))
}

#[tokio::test]
async fn blob_store_round_trips_over_http() {
    let url = spawn_blob_server().await.expect("server");
    let store = BlobStore::new(url).expect("client");

    assert!(store.load().await.expect("load").is_none());
    let document = sample_document().stamped();
    store.save(&document).await.expect("save");
    assert_eq!(store.load().await.expect("load"), Some(document));
}

#[tokio::test]
async fn blob_store_reports_unreachable_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let store = BlobStore::new(format!("http://{addr}/blob")).expect("client");
    assert!(store.load().await.is_err());
    assert!(store.save(&sample_document()).await.is_err());
}
