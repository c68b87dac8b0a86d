//! REST bridge between browser render surfaces and the analysis session

use crate::session::{AnalysisSession, SessionError, SessionId, SessionSnapshot};
use crate::stages::{Stage, StageInfo};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// API state
pub struct ApiState {
    pub session: Arc<AnalysisSession>,
    /// Model server base URL, reported by `/health`
    pub endpoint: String,
}

/// Request to analyse a text
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub session_id: SessionId,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub endpoint: String,
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stages", get(list_stages))
        .route("/analyze", post(analyze))
        .route("/session", get(current_session))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoint: state.endpoint.clone(),
    })
}

async fn list_stages() -> Json<Vec<StageInfo>> {
    Json(Stage::ALL.iter().map(|s| s.info()).collect())
}

/// Start an analysis; progress is read from `/session`
async fn analyze(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), (StatusCode, String)> {
    match state.session.start(&request.text) {
        Ok(handle) => Ok((
            StatusCode::ACCEPTED,
            Json(AnalyzeResponse {
                session_id: handle.id(),
            }),
        )),
        Err(e @ SessionError::EmptyInput) => Err((StatusCode::BAD_REQUEST, e.to_string())),
    }
}

async fn current_session(State(state): State<Arc<ApiState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::ResultNormalizer;
    use crate::provider::{
        ClassProbabilities, InferenceProvider, PredictRequest, ProviderError, RawInferenceResult,
    };
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::time::Duration;

    struct InstantProvider;

    #[async_trait]
    impl InferenceProvider for InstantProvider {
        fn name(&self) -> &str {
            "instant"
        }

        async fn predict(
            &self,
            request: &PredictRequest,
        ) -> Result<RawInferenceResult, ProviderError> {
            Ok(RawInferenceResult {
                label: "Trung tính 😐".to_string(),
                confidence: 55.0,
                original_text: request.text.clone(),
                tokens: request.text.split_whitespace().map(str::to_string).collect(),
                embeddings: None,
                attention_scores: None,
                class_probabilities: ClassProbabilities {
                    positive: 0.2,
                    negative: 0.25,
                    neutral: 0.55,
                },
            })
        }
    }

    async fn spawn_api() -> String {
        let session = AnalysisSession::with_normalizer(
            Arc::new(InstantProvider),
            Duration::from_secs(5),
            ResultNormalizer::seeded(5),
        );
        let state = Arc::new(ApiState {
            session: Arc::new(session),
            endpoint: "http://model:8000".to_string(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_and_stages() {
        let base = spawn_api().await;
        let client = reqwest::Client::new();

        let health: Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["endpoint"], "http://model:8000");

        let stages: Vec<Value> = client
            .get(format!("{base}/stages"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stages.len(), Stage::count());
        assert_eq!(stages[0]["name"], "Input Text");
        assert_eq!(stages[0]["index"], 0);
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let base = spawn_api().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/analyze"))
            .json(&json!({"text": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let session: Value = client
            .get(format!("{base}/session"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["phase"], "idle");
        assert!(session["session"].is_null());
    }

    #[tokio::test]
    async fn test_analyze_starts_session() {
        let base = spawn_api().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/analyze"))
            .json(&json!({"text": "Thầy dạy hơi nhanh"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        let body: Value = response.json().await.unwrap();
        let id = body["session_id"].clone();

        let session: Value = client
            .get(format!("{base}/session"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["session"], id);
        assert!(matches!(
            session["phase"].as_str(),
            Some("requesting") | Some("revealing")
        ));
        assert!(session["model"].is_null());
    }
}
