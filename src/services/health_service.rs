use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedContext};

/// Report liveness, degrading when snapshot storage cannot be reached.
pub async fn health_status(context: &SharedContext) -> HealthResponse {
    match context.snapshots().health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "snapshot storage health check failed");
            HealthResponse::degraded()
        }
    }
}
