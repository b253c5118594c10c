use crate::config::ApiConfig;
use crate::domain::TodoItem;
use crate::error::TodoError;
use crate::todo_service::TodoService;
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const MAX_DESCRIPTION_CHARS: usize = 255;
const ALLOWED_EXTENSIONS: &[&str] = &["txt", "png", "jpg"];

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub todo_service: Arc<TodoService>,
    pub pool: PgPool,
    pub request_timeout: Duration,
    /// Cancelled on shutdown; each request works on a child token
    pub shutdown: CancellationToken,
}

/// Envelope for every intake response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Created todo as returned to the client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoResponse {
    pub id: Uuid,
    pub description: String,
    pub due_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error carried out of a handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    details: String,
}

impl ApiError {
    fn bad_request(code: &'static str, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            details: details.into(),
        }
    }

    /// Keep axum's status for body errors so an oversize upload stays a 413
    fn from_multipart(code: &'static str, err: MultipartError) -> Self {
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Self {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                code: "PayloadTooLarge",
                details: err.body_text(),
            },
            _ => Self::bad_request(code, err.body_text()),
        }
    }
}

impl From<TodoError> for ApiError {
    fn from(err: TodoError) -> Self {
        let (status, code) = match &err {
            e if e.is_client_error() => (StatusCode::BAD_REQUEST, "ValidationFailed"),
            TodoError::Cancelled => (StatusCode::GATEWAY_TIMEOUT, "RequestTimeout"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "CreateTodoFailed"),
        };
        Self {
            status,
            code,
            details: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ErrorResponse {
                error: self.code.to_string(),
                message: self
                    .status
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string(),
                details: Some(self.details),
            }),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Decoded multipart form
#[derive(Debug, Default)]
struct CreateTodoForm {
    description: Option<String>,
    due_date: Option<String>,
    file: Option<(Option<String>, Vec<u8>)>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/upload", post(create_todo))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "todo-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Accept a multipart todo submission
#[instrument(skip(state, multipart))]
async fn create_todo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<TodoResponse>>), ApiError> {
    let form = read_form(multipart).await?;

    let description = form
        .description
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::bad_request("BadRequest", "description is required"))?;
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::bad_request(
            "BadRequest",
            format!("description exceeds {MAX_DESCRIPTION_CHARS} characters"),
        ));
    }

    let due_date = form
        .due_date
        .ok_or_else(|| ApiError::bad_request("BadRequest", "dueDate is required"))?;
    let due_date = DateTime::parse_from_rfc3339(&due_date)
        .map_err(|e| ApiError::bad_request("InvalidDueDate", e.to_string()))?
        .with_timezone(&Utc);

    let file_data = match form.file {
        Some((file_name, data)) => {
            validate_file_extension(file_name.as_deref())?;
            Some(data)
        }
        None => None,
    };

    let item = TodoItem::new(Uuid::new_v4().to_string(), description, due_date);
    let cancel = state.shutdown.child_token();

    let result = tokio::select! {
        result = state.todo_service.create_todo(item, file_data, &cancel) => result,
        _ = tokio::time::sleep(state.request_timeout) => {
            cancel.cancel();
            warn!(timeout_secs = state.request_timeout.as_secs(), "Todo creation timed out");
            Err(TodoError::Cancelled)
        }
    };

    let created = result.map_err(|e| {
        if e.is_client_error() {
            warn!(error = %e, "Rejected todo");
        } else {
            error!(error = %e, "Failed to create todo");
        }
        ApiError::from(e)
    })?;

    info!(todo_id = %created.record.id, publish = ?created.publish, "Todo created");

    let record = created.record;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data: Some(TodoResponse {
                id: record.id,
                description: record.description,
                due_date: record.due_date,
                file_id: record.file_id,
            }),
            error: None,
        }),
    ))
}

async fn read_form(mut multipart: Multipart) -> Result<CreateTodoForm, ApiError> {
    let mut form = CreateTodoForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart("BadRequest", e))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("description") => {
                form.description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::from_multipart("BadRequest", e))?,
                );
            }
            Some("dueDate") => {
                form.due_date = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::from_multipart("BadRequest", e))?,
                );
            }
            Some("file") => {
                let file_name = field.file_name().map(str::to_owned);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::from_multipart("FileProcessingError", e))?;
                // Browsers send an empty, unnamed part when no file was chosen
                let unnamed = file_name.as_deref().map_or(true, str::is_empty);
                form.file = if unnamed && data.is_empty() {
                    None
                } else {
                    Some((file_name, data.to_vec()))
                };
            }
            _ => {}
        }
    }

    Ok(form)
}

fn validate_file_extension(file_name: Option<&str>) -> Result<(), ApiError> {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ApiError::bad_request(
            "FileProcessingError",
            "the uploaded file type is not supported",
        )),
    }
}

/// Start the API server; returns once `shutdown` is cancelled
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting todo API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    Ok(())
}
