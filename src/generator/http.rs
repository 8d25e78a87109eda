//! HTTP transport for the serverless generation/grading functions.
//!
//! Both functions follow the callable-function convention: the input is posted as
//! `{"data": ...}` and the output comes back as `{"result": ...}`. The result is either the
//! JSON object itself or the raw model output as a JSON string.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::generator::{
    QuestionService,
    error::{UpstreamError, UpstreamResult},
    models::{GeneratedQuestion, GenerationRequest, GradingRequest, GradingVerdict},
};

const GENERATE_PATH: &str = "generateQuestion";
const GRADE_PATH: &str = "validateAnswer";

/// Runtime configuration describing where the functions live.
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CallableRequest<'a, T> {
    data: &'a T,
}

#[derive(Deserialize)]
struct CallableResponse {
    result: Value,
}

/// [`QuestionService`] backed by HTTP calls to the serverless functions.
#[derive(Clone)]
pub struct HttpQuestionService {
    client: Client,
    base_url: Arc<str>,
}

impl HttpQuestionService {
    /// Build the HTTP client with the configured per-request timeout.
    pub fn new(config: HttpServiceConfig) -> UpstreamResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| UpstreamError::unavailable("failed to build HTTP client", source))?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
        })
    }

    async fn call<T: Serialize>(
        client: Client,
        url: String,
        payload: T,
    ) -> UpstreamResult<String> {
        let response = client
            .post(&url)
            .json(&CallableRequest { data: &payload })
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::unavailable(format!("failed to send request to `{url}`"), err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "upstream function returned an error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|err| {
            UpstreamError::unavailable(format!("failed to read response from `{url}`"), err)
        })?;

        unwrap_result(&body)
    }
}

/// Extract the `result` member of a callable reply as a JSON document.
fn unwrap_result(body: &str) -> UpstreamResult<String> {
    let envelope: CallableResponse = serde_json::from_str(body)
        .map_err(|err| UpstreamError::malformed(format!("callable envelope: {err}")))?;
    match envelope.result {
        Value::String(raw) => Ok(raw),
        other @ Value::Object(_) => Ok(other.to_string()),
        other => Err(UpstreamError::malformed(format!(
            "callable result is not an object: {other}"
        ))),
    }
}

impl QuestionService for HttpQuestionService {
    fn generate_question(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'static, UpstreamResult<GeneratedQuestion>> {
        let client = self.client.clone();
        let url = format!("{}/{}", self.base_url, GENERATE_PATH);
        Box::pin(async move {
            let raw = Self::call(client, url, request).await?;
            GeneratedQuestion::parse(&raw)
        })
    }

    fn grade_answer(
        &self,
        request: GradingRequest,
    ) -> BoxFuture<'static, UpstreamResult<GradingVerdict>> {
        let client = self.client.clone();
        let url = format!("{}/{}", self.base_url, GRADE_PATH);
        Box::pin(async move {
            let raw = Self::call(client, url, request).await?;
            GradingVerdict::parse(&raw)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_object_is_passed_through() {
        let raw = unwrap_result(r#"{"result":{"question":"Q","correct_answer":"A"}}"#).unwrap();
        let parsed = GeneratedQuestion::parse(&raw).unwrap();
        assert_eq!(parsed.question, "Q");
    }

    #[test]
    fn result_string_is_parsed_as_model_output() {
        let raw = unwrap_result(
            r#"{"result":"{\"isCorrect\":false,\"feedback\":\"no\",\"similarity\":0.2}"}"#,
        )
        .unwrap();
        let verdict = GradingVerdict::parse(&raw).unwrap();
        assert!(!verdict.is_correct);
    }

    #[test]
    fn broken_envelopes_are_malformed() {
        assert!(matches!(
            unwrap_result("<html>502</html>"),
            Err(UpstreamError::Malformed(_))
        ));
        assert!(matches!(
            unwrap_result(r#"{"result":42}"#),
            Err(UpstreamError::Malformed(_))
        ));
        assert!(matches!(
            unwrap_result(r#"{"error":{"message":"INTERNAL"}}"#),
            Err(UpstreamError::Malformed(_))
        ));
    }
}
