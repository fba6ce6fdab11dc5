//! Submission JSON API.
//!
//! - `GET   /submissions`      : most recent submissions, oldest first
//! - `POST  /submissions`      : create a submission from `{conversion, price, stock, image}`
//! - `PATCH /submissions/{id}` : set `verified` on an existing submission

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use relay_core::{InterfaceError, Submission, SubmissionDraft, SubmissionId, SubmissionStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::health::{self, HealthState};

#[derive(Clone)]
pub struct ApiState {
    store: Arc<SubmissionStore>,
    recent_limit: usize,
}

impl ApiState {
    pub fn new(store: Arc<SubmissionStore>, recent_limit: usize) -> Self {
        Self { store, recent_limit }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSubmissionRequest {
    #[serde(default)]
    pub conversion: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub stock: Option<Value>,
    #[serde(default)]
    pub image: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub verified: Value,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/submissions", get(list_submissions).post(create_submission))
        .route("/submissions/{id}", patch(update_verification))
        .with_state(state)
}

/// Full HTTP surface: submissions plus health, with permissive CORS for the
/// separately hosted front end.
pub fn app(api: ApiState, health: HealthState) -> Router {
    router(api).merge(health::router(health)).layer(CorsLayer::permissive())
}

pub async fn spawn(bind_address: &str, port: u16, app: Router) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.api.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "submission api listening"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            error!(
                event_name = "system.api.error",
                correlation_id = "bootstrap",
                error = %error,
                "submission api server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn list_submissions(State(state): State<ApiState>) -> Json<Vec<Submission>> {
    Json(state.store.list_recent(state.recent_limit).await)
}

pub async fn create_submission(
    State(state): State<ApiState>,
    body: Result<Json<CreateSubmissionRequest>, JsonRejection>,
) -> ApiResult<Submission> {
    let correlation_id = request_id();
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(
                event_name = "api.submission.rejected_body",
                correlation_id = %correlation_id,
                error = %rejection,
                "create body is not a JSON object"
            );
            CreateSubmissionRequest::default()
        }
    };

    let draft = SubmissionDraft {
        source_message_id: None,
        conversion: field_text(request.conversion),
        price: field_text(request.price),
        stock: field_text(request.stock),
        image: field_text(request.image),
    };

    let submission = state
        .store
        .create(draft)
        .await
        .map_err(|error| error_response(error.into_interface(correlation_id.clone())))?;

    info!(
        event_name = "api.submission.created",
        correlation_id = %correlation_id,
        submission_id = %submission.id,
        conversion = %submission.conversion,
        "submission created via api"
    );
    Ok(Json(submission))
}

pub async fn update_verification(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Submission> {
    let correlation_id = request_id();
    let Ok(id) = id.trim().parse::<u64>().map(SubmissionId) else {
        return Err(error_response(InterfaceError::NotFound {
            message: format!("`{id}` is not a submission id"),
            correlation_id,
        }));
    };

    // Without a JSON content type there is no `verified` value, which coerces to false.
    let verified = match body {
        Ok(Json(request)) => truthy(&request.verified),
        Err(JsonRejection::MissingJsonContentType(_)) => false,
        Err(rejection) => {
            return Err(error_response(InterfaceError::MalformedBody {
                message: rejection.body_text(),
                correlation_id,
            }));
        }
    };

    let submission = state
        .store
        .set_verified(id, verified)
        .await
        .map_err(|error| error_response(error.into_interface(correlation_id.clone())))?;

    info!(
        event_name = "api.submission.verification_changed",
        correlation_id = %correlation_id,
        submission_id = %submission.id,
        verified,
        "submission verification updated via api"
    );
    Ok(Json(submission))
}

fn error_response(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } | InterfaceError::MalformedBody { .. } => {
            StatusCode::BAD_REQUEST
        }
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
    };
    warn!(
        event_name = "api.submission.error",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "submission request rejected"
    );
    (status, Json(ApiError { error: error.user_message().to_string() }))
}

/// Only JSON strings count; any other value is treated as missing.
fn field_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        _ => None,
    }
}

/// JavaScript truthiness, so `{ "verified": 1 }` and `{ "verified": "yes" }`
/// both verify.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn request_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}
