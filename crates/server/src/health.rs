use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use relay_core::SubmissionStore;
use relay_discord::events::Readiness;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    store: Arc<SubmissionStore>,
    readiness: Readiness,
    ingress_enabled: bool,
}

impl HealthState {
    pub fn new(store: Arc<SubmissionStore>, readiness: Readiness, ingress_enabled: bool) -> Self {
        Self { store, readiness, ingress_enabled }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub ingress: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Always 200: a gateway that is not live yet degrades ingress but never the API.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let ingress = ingress_check(&state);
    let degraded = ingress.status == "connecting";

    let stored = state.store.len().await;
    let payload = HealthResponse {
        status: if degraded { "degraded" } else { "ready" },
        service: HealthCheck { status: "ready", detail: "relay-server api initialized".to_string() },
        ingress,
        store: HealthCheck {
            status: "ready",
            detail: format!("{stored}/{} submissions held", state.store.capacity()),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

fn ingress_check(state: &HealthState) -> HealthCheck {
    if !state.ingress_enabled {
        return HealthCheck {
            status: "disabled",
            detail: "discord token or channel id not configured".to_string(),
        };
    }

    if state.readiness.is_ready() {
        HealthCheck { status: "ready", detail: "gateway session is live".to_string() }
    } else {
        HealthCheck { status: "connecting", detail: "waiting for gateway ready".to_string() }
    }
}
