use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::session::CacheStatsResponse, services::session_service, state::SharedContext};

/// Question cache inspection routes.
pub fn router() -> Router<SharedContext> {
    Router::new().route("/cache/stats", get(cache_stats))
}

/// Entry counts of the question cache.
pub async fn cache_stats(State(context): State<SharedContext>) -> Json<CacheStatsResponse> {
    Json(session_service::cache_stats(&context).into())
}
