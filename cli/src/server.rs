use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

use nibble_core::models::{DailySummary, EntryFilter, FoodEntry, NewFoodEntry};
use nibble_core::service::NibbleService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<NibbleService>>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, NibbleService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateFoodItemRequest {
    name: String,
    calories_per_serving: f64,
    servings: f64,
    logged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct FoodItemsQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
    Rejected(StatusCode, String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Rejected(status, msg) => (status, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<nibble_core::Error> for ApiError {
    fn from(err: nibble_core::Error) -> Self {
        match err {
            nibble_core::Error::Validation(e) => Self::BadRequest(e.to_string()),
            nibble_core::Error::NotFound(_) => Self::NotFound(err.to_string()),
            nibble_core::Error::Storage(e) => {
                Self::Internal(anyhow::Error::new(e).context("database error"))
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
    })
}

async fn create_food_item(
    State(state): State<AppState>,
    payload: Result<Json<CreateFoodItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FoodEntry>), ApiError> {
    let Json(req) = payload?;
    let entry = state.svc().add_food_item(&NewFoodEntry {
        name: req.name,
        calories_per_serving: req.calories_per_serving,
        servings: req.servings,
        logged_at: req.logged_at,
    })?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_food_items(
    State(state): State<AppState>,
    query: Result<Query<FoodItemsQuery>, QueryRejection>,
) -> Result<Json<Vec<FoodEntry>>, ApiError> {
    let Query(query) = query?;
    let filter = EntryFilter::parse(query.start_date.as_deref(), query.end_date.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let entries = state.svc().get_food_items(&filter)?;
    Ok(Json(entries))
}

async fn delete_food_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<FoodEntry>, ApiError> {
    let Path(id) = id?;
    let removed = state.svc().delete_food_item(id)?;
    Ok(Json(removed))
}

async fn daily_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<DailySummary>>, ApiError> {
    let summaries = state.svc().get_daily_summary()?;
    Ok(Json(summaries))
}

async fn today_summary(State(state): State<AppState>) -> Result<Json<DailySummary>, ApiError> {
    let summary = state.svc().get_today_summary()?;
    Ok(Json(summary))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/food-items",
            get(list_food_items).post(create_food_item),
        )
        .route(
            "/api/food-items/{id}",
            axum::routing::delete(delete_food_item),
        )
        .route("/api/summary", get(daily_summary))
        .route("/api/summary/today", get(today_summary))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(svc: NibbleService, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
    };

    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
