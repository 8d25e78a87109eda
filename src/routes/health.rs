use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::health::HealthResponse, services::health_service, state::SharedContext};

/// Return the current health status of the backend and probe snapshot storage.
pub async fn healthcheck(State(context): State<SharedContext>) -> Json<HealthResponse> {
    let status = health_service::health_status(&context).await;
    Json(status)
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedContext> {
    Router::<SharedContext>::new().route("/healthcheck", get(healthcheck))
}
