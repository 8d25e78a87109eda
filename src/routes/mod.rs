use axum::Router;

use crate::state::SharedContext;

pub mod cache;
pub mod health;
pub mod session;

/// Compose all route trees, wiring in the shared session context.
pub fn router(context: SharedContext) -> Router<()> {
    health::router()
        .merge(session::router())
        .merge(cache::router())
        .with_state(context)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::EngineConfig, dao::snapshot_store::memory::MemorySnapshotStore,
        generator::testing::ScriptedService, state::SessionContext,
    };

    fn app() -> Router<()> {
        let context = SessionContext::new(
            EngineConfig::default(),
            ScriptedService::new(),
            Arc::new(MemorySnapshotStore::new()),
        );
        router(context)
    }

    async fn call(app: &Router<()>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn start_payload() -> Value {
        json!({
            "teams": [{ "name": "Falcons" }, { "name": "Owls" }],
            "categories": [
                { "id": "geo", "name": "Geography" },
                { "id": "sci", "name": "Science" },
                { "id": "art", "name": "Art" }
            ]
        })
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let (status, body) = call(&app(), "GET", "/healthcheck", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn session_flow_over_http() {
        let app = app();

        let (status, body) = call(&app, "POST", "/session", Some(start_payload())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "categorySelection");
        assert_eq!(body["teams"]["teamA"]["color"], "#4F46E5");

        let (status, body) = call(&app, "POST", "/session/begin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "game");
        assert_eq!(body["currentTeam"], "teamA");

        let (status, question) = call(
            &app,
            "POST",
            "/session/question",
            Some(json!({ "categoryId": "geo", "points": 300 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(question["points"], 300);
        assert!(question.get("correctAnswer").is_none());

        let (_, session) = call(&app, "GET", "/session", None).await;
        assert_eq!(session["phase"], "question");
        assert!(session["currentQuestion"].get("correctAnswer").is_none());

        let (status, answer) = call(
            &app,
            "POST",
            "/session/answer",
            Some(json!({ "answer": "no idea" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(answer["isCorrect"], false);
        assert_eq!(answer["pointsAwarded"], 0);
        assert_eq!(answer["phase"], "game");

        let (status, body) = call(
            &app,
            "POST",
            "/session/answer",
            Some(json!({ "answer": "again" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].as_str().unwrap().contains("no question"));

        let (status, stats) = call(&app, "GET", "/cache/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(stats["totalEntries"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn invalid_payloads_are_bad_requests() {
        let app = app();

        let mut payload = start_payload();
        payload["teams"][1]["name"] = json!("falcons");
        let (status, _) = call(&app, "POST", "/session", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut payload = start_payload();
        payload["categories"] = json!([{ "id": "geo", "name": "Geography" }]);
        let (status, _) = call(&app, "POST", "/session", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(&app, "POST", "/session", Some(start_payload())).await;
        call(&app, "POST", "/session/begin", None).await;
        let (status, _) = call(
            &app,
            "POST",
            "/session/question",
            Some(json!({ "categoryId": "geo", "points": 250 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn out_of_order_operations_conflict() {
        let app = app();
        let (status, _) = call(&app, "POST", "/session/begin", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(&app, "POST", "/session/reset", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
