//! HTTP provider for a model server exposing `POST /predict`

use super::{ConfidenceScale, InferenceProvider, PredictRequest, ProviderError, RawInferenceResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

/// Provider for a FastAPI-style `/predict` endpoint
pub struct HttpPredictProvider {
    client: Client,
    base_url: String,
    scale: ConfidenceScale,
    name: String,
}

impl HttpPredictProvider {
    /// Create a provider; `timeout` bounds each whole request
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let name = format!("predict:{}", base_url);

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url,
            scale: ConfidenceScale::default(),
            name,
        })
    }

    /// Declare the scale this server reports `confidence` on
    pub fn with_confidence_scale(mut self, scale: ConfidenceScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InferenceProvider for HttpPredictProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, request: &PredictRequest) -> Result<RawInferenceResult, ProviderError> {
        let url = format!("{}/predict", self.base_url);
        let start = Instant::now();

        let response = self.client.post(&url).json(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::HttpError(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let body = response.text().await?;
        let raw = RawInferenceResult::from_json(&body)?.with_confidence_scale(self.scale);

        debug!(
            provider = %self.name,
            tokens = raw.tokens.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Got inference response"
        );

        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn echo_predict(Json(body): Json<Value>) -> Json<Value> {
        let text = body["text"].as_str().unwrap_or_default().to_string();
        let tokens: Vec<&str> = text.split_whitespace().collect();
        Json(json!({
            "label": "Tích cực 😃",
            "confidence": 0.875,
            "original_text": text,
            "tokens": tokens,
            "probs": {"positive": 0.875, "negative": 0.05, "neutral": 0.075}
        }))
    }

    #[test]
    fn test_provider_creation() {
        let provider =
            HttpPredictProvider::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.base_url(), "http://localhost:8000");
        assert!(provider.name().contains("predict"));
    }

    #[tokio::test]
    async fn test_predict_posts_text() {
        let url = spawn_stub(Router::new().route("/predict", post(echo_predict))).await;
        let provider = HttpPredictProvider::new(url, Duration::from_secs(5))
            .unwrap()
            .with_confidence_scale(ConfidenceScale::Fraction);

        let raw = provider
            .predict(&PredictRequest::new("tốt quá"))
            .await
            .unwrap();

        assert_eq!(raw.tokens, vec!["tốt", "quá"]);
        assert_eq!(raw.original_text, "tốt quá");
        assert_eq!(raw.confidence, 87.5);
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let router = Router::new().route(
            "/predict",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let url = spawn_stub(router).await;
        let provider = HttpPredictProvider::new(url, Duration::from_secs(5)).unwrap();

        let err = provider.predict(&PredictRequest::new("x")).await.unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_body_without_tokens_is_malformed() {
        let router = Router::new().route(
            "/predict",
            post(|| async {
                Json(json!({"label": "Tích cực", "confidence": 90.0, "clean_text": "x"}))
            }),
        );
        let url = spawn_stub(router).await;
        let provider = HttpPredictProvider::new(url, Duration::from_secs(5)).unwrap();

        let err = provider.predict(&PredictRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider =
            HttpPredictProvider::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let err = provider.predict(&PredictRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::HttpError(_)));
    }
}
