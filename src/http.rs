//! Small HTTP front end over a shared [`PersistentDatabase`].
//!
//! | **Route**       | **Input**              | **Output**                              |
//! |-----------------|------------------------|-----------------------------------------|
//! | `POST /insert`  | form `key`, `value`    | `{"success": true}`                     |
//! | `POST /delete`  | form `key`             | `{"success": <key was present>}`        |
//! | `GET /get_tree` |                        | nested node view of the tree            |
//! | `GET /stats`    |                        | tree statistics                         |
//!
//! Malformed input answers `{"success": false, "error": "Invalid input"}` with status 400.
use crate::errors;
use crate::persistence::PersistentDatabase;
use crate::storage::{Key, NodeView, TreeStatistics, Value};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid key pattern"));

const INVALID_INPUT: &str = "Invalid input";

pub type SharedDatabase = Arc<Mutex<PersistentDatabase>>;

#[derive(Deserialize, Debug, Default)]
pub struct InsertForm {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct DeleteForm {
    #[serde(default)]
    pub key: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type Reply = (StatusCode, Json<ApiResponse>);

fn ok(success: bool) -> Reply {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success,
            error: None,
        }),
    )
}

fn failure(status: StatusCode, message: impl Into<String>) -> Reply {
    (
        status,
        Json(ApiResponse {
            success: false,
            error: Some(message.into()),
        }),
    )
}

fn storage_failure(e: errors::Error) -> Reply {
    error!("Request failed. {}", e);
    failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn lock(db: &SharedDatabase) -> Result<MutexGuard<'_, PersistentDatabase>, Reply> {
    db.lock().map_err(|_| {
        error!("Database lock is poisoned");
        failure(StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable")
    })
}

/// Digits only; anything that does not fit a key is rejected too.
fn parse_form_key(key: &str) -> Option<Key> {
    let key = key.trim();
    if !KEY_PATTERN.is_match(key) {
        return None;
    }
    key.parse().ok()
}

pub async fn insert(State(db): State<SharedDatabase>, Form(form): Form<InsertForm>) -> Reply {
    let Some(key) = parse_form_key(&form.key) else {
        return failure(StatusCode::BAD_REQUEST, INVALID_INPUT);
    };
    if form.value.is_empty() {
        return failure(StatusCode::BAD_REQUEST, INVALID_INPUT);
    }
    debug!(key, "POST /insert");

    let mut db = match lock(&db) {
        Ok(db) => db,
        Err(reply) => return reply,
    };
    match db.insert(key, Value::from(form.value)) {
        Ok(_) => ok(true),
        Err(errors::Error::InvalidEntry(_)) => failure(StatusCode::BAD_REQUEST, INVALID_INPUT),
        Err(e) => storage_failure(e),
    }
}

pub async fn delete(State(db): State<SharedDatabase>, Form(form): Form<DeleteForm>) -> Reply {
    let Some(key) = parse_form_key(&form.key) else {
        return failure(StatusCode::BAD_REQUEST, INVALID_INPUT);
    };
    debug!(key, "POST /delete");

    let mut db = match lock(&db) {
        Ok(db) => db,
        Err(reply) => return reply,
    };
    match db.delete(key) {
        Ok(found) => ok(found),
        Err(e) => storage_failure(e),
    }
}

pub async fn get_tree(State(db): State<SharedDatabase>) -> Result<Json<NodeView<Key>>, Reply> {
    let db = lock(&db)?;
    Ok(Json(db.structure()))
}

pub async fn stats(State(db): State<SharedDatabase>) -> Result<Json<TreeStatistics>, Reply> {
    let db = lock(&db)?;
    Ok(Json(db.statistics()))
}

pub fn router(db: SharedDatabase) -> Router {
    Router::new()
        .route("/insert", post(insert))
        .route("/delete", post(delete))
        .route("/get_tree", get(get_tree))
        .route("/stats", get(stats))
        .with_state(db)
}

/// Serves the routes on `addr` until the process is stopped.
pub async fn serve(addr: SocketAddr, db: PersistentDatabase) -> Result<(), errors::Error> {
    let app = router(Arc::new(Mutex::new(db)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, app).await?;
    Ok(())
}
