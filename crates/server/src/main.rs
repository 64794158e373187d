use std::path::{Path, PathBuf};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use usage_app::{AppError, collect_stats, validate_range};
use usage_core::StatsResponse;
use usage_db::Db;

#[derive(Serialize)]
struct ApiError {
    error: String,
}

#[derive(Clone)]
struct AppState {
    db_path: PathBuf,
    agents_dir: PathBuf,
}

#[derive(Deserialize)]
struct StatsQuery {
    start: Option<String>,
    end: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let agents_dir = resolve_agents_dir();
    let db_path = resolve_db_path();
    if let Err(err) = setup_db(&db_path) {
        eprintln!("failed to initialize database: {}", err);
        std::process::exit(1);
    }
    let state = AppState {
        db_path,
        agents_dir,
    };

    let host = std::env::var("OCL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("OCL_PORT").unwrap_or_else(|_| "8585".to_string());
    let addr = format!("{host}:{port}");
    tracing::info!(
        addr = %addr,
        agents_dir = %state.agents_dir.display(),
        db_path = %state.db_path.display(),
        "starting usage server"
    );

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("bind server");
    axum::serve(listener, app).await.expect("serve");
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ApiError>)> {
    // Sync and aggregation do blocking file and SQLite work.
    let response = tokio::task::spawn_blocking(move || {
        let range = validate_range(query.start, query.end)?;
        let mut db = Db::open(&state.db_path)?;
        collect_stats(&mut db, &state.agents_dir, &range)
    })
    .await
    .map_err(to_api_error)?
    .map_err(to_error_response)?;
    Ok(Json(response))
}

fn to_error_response(err: AppError) -> (StatusCode, Json<ApiError>) {
    match err {
        AppError::InvalidInput(message) => to_bad_request(message),
        other => to_api_error(other),
    }
}

fn to_api_error(err: impl std::fmt::Display) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
}

fn to_bad_request(err: impl std::fmt::Display) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
}

fn setup_db(path: &Path) -> Result<(), usage_db::DbError> {
    let mut db = Db::open(path)?;
    db.ensure_schema()?;
    Ok(())
}

fn resolve_agents_dir() -> PathBuf {
    resolve_agents_dir_with(
        std::env::var_os("OCL_AGENTS_DIR").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn resolve_agents_dir_with(env_override: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_override {
        return dir;
    }
    home.unwrap_or_else(|| PathBuf::from("."))
        .join(".openclaw")
        .join("agents")
}

fn resolve_db_path() -> PathBuf {
    resolve_db_path_with(
        std::env::var_os("OCL_DB_PATH").map(PathBuf::from),
        std::env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(PathBuf::from)),
    )
}

fn resolve_db_path_with(env_override: Option<PathBuf>, exe_dir: Option<PathBuf>) -> PathBuf {
    if let Some(path) = env_override {
        return path;
    }
    exe_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join("usage_cache.db")
}
