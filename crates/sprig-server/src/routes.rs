use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sprig_core::datetime::DueDate;
use sprig_shared::{ErrorBody, Priority, Tag, TodoDto};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::documents::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid or missing 'text'")]
    InvalidText,

    #[error("Invalid '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Failed to fetch todos")]
    Fetch,

    #[error("Failed to add todo")]
    Add,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidText | Self::InvalidField { .. } => StatusCode::BAD_REQUEST,
            Self::Fetch | Self::Add => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Store details go to the log only.
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/todos",
            get(list_todos).post(create_todo).options(preflight),
        )
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

#[instrument(skip_all)]
async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<TodoDto>>, ApiError> {
    let store = Arc::clone(&state.store);
    let todos = tokio::task::spawn_blocking(move || store.list())
        .await
        .map_err(anyhow::Error::from)
        .and_then(|listed| listed)
        .map_err(|err| {
            error!(error = %format!("{err:#}"), "error fetching todos");
            ApiError::Fetch
        })?;

    info!(count = todos.len(), "returning todos");
    Ok(Json(todos))
}

#[instrument(skip_all)]
async fn create_todo(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoDto>), ApiError> {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable request body");
            return Err(ApiError::InvalidText);
        }
    };

    let todo = new_todo(&body, Uuid::new_v4().simple().to_string())?;
    let store = Arc::clone(&state.store);
    let record = todo.clone();
    tokio::task::spawn_blocking(move || store.insert(&record))
        .await
        .map_err(anyhow::Error::from)
        .and_then(|inserted| inserted)
        .map_err(|err| {
            error!(error = %format!("{err:#}"), "error adding todo");
            ApiError::Add
        })?;

    info!(id = %todo.id, "todo saved");
    Ok((StatusCode::CREATED, Json(todo)))
}

/// Builds the stored record from a create payload. Missing, null or empty
/// optional fields take their defaults; present ones must parse.
pub fn new_todo(body: &Value, id: String) -> Result<TodoDto, ApiError> {
    let text = body
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| {
            warn!(text = ?body.get("text"), "invalid 'text' field");
            ApiError::InvalidText
        })?;

    let priority = match optional_str(body, "priority")? {
        Some(raw) => raw.parse::<Priority>().map_err(|_| invalid("priority", raw))?,
        None => Priority::Medium,
    };
    let tag = match optional_str(body, "tag")? {
        Some(raw) => raw.parse::<Tag>().map_err(|_| invalid("tag", raw))?,
        None => Tag::General,
    };
    let due_date = optional_str(body, "dueDate")?
        .map(|raw| {
            raw.parse::<DueDate>()
                .map(|due| due.to_string())
                .map_err(|_| invalid("dueDate", raw))
        })
        .transpose()?;

    Ok(TodoDto {
        id,
        text: text.to_string(),
        completed: false,
        priority,
        tag,
        due_date,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn optional_str<'a>(body: &'a Value, field: &'static str) -> Result<Option<&'a str>, ApiError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => Ok(Some(raw.trim())),
        Some(other) => Err(invalid(field, &other.to_string())),
    }
}

fn invalid(field: &'static str, value: &str) -> ApiError {
    warn!(field, value, "invalid optional field");
    ApiError::InvalidField {
        field,
        value: value.to_string(),
    }
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_METHODS, "GET,POST,OPTIONS"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}
