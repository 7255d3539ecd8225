//! Image generation through Replicate's hosted models.
//!
//! A prediction is created with `Prefer: wait`, which makes Replicate hold
//! the connection until the model finishes (up to its own limit). If the
//! prediction is still running when the response arrives, the client polls
//! the prediction URL until it reaches a terminal state.
//!
//! The model's `output` (usually one URL, sometimes a list of them) is
//! passed through untouched.

use crate::config::ServiceConfig;
use crate::error::InvoiceError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: u32 = 120;

/// What to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

/// Generates an image from a prompt and returns the model's output.
pub trait ImageGenerator: Send + Sync {
    fn generate<'a>(&'a self, request: &'a ImageRequest) -> BoxFuture<'a, Result<Value, InvoiceError>>;
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

enum PredictionState {
    Running,
    Done(Value),
    Failed(String),
}

impl Prediction {
    fn state(&self) -> PredictionState {
        match self.status.as_str() {
            "succeeded" => match &self.output {
                Some(output) if !output.is_null() => PredictionState::Done(output.clone()),
                _ => PredictionState::Failed("prediction succeeded without output".into()),
            },
            "failed" | "canceled" => PredictionState::Failed(
                self.error
                    .as_ref()
                    .map(|e| e.as_str().map(String::from).unwrap_or_else(|| e.to_string()))
                    .unwrap_or_else(|| format!("prediction {}", self.status)),
            ),
            _ => PredictionState::Running,
        }
    }
}

/// [`ImageGenerator`] backed by the Replicate predictions API.
pub struct ReplicateClient {
    http: reqwest::Client,
    api_token: Option<String>,
    base_url: String,
    model: String,
    default_aspect_ratio: String,
}

impl ReplicateClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, InvoiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| InvoiceError::Internal(format!("HTTP client: {e}")))?;

        if config.replicate_api_token.is_none() {
            warn!("REPLICATE_API_TOKEN is not set; image generation will fail");
        }

        Ok(Self {
            http,
            api_token: config.replicate_api_token.clone(),
            base_url: config.replicate_url.trim_end_matches('/').to_string(),
            model: config.image_model.clone(),
            default_aspect_ratio: config.default_aspect_ratio.clone(),
        })
    }

    /// Request body for a prediction.
    fn input(&self, request: &ImageRequest) -> Value {
        let aspect_ratio = request
            .aspect_ratio
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(self.default_aspect_ratio.as_str());
        json!({
            "input": {
                "prompt": request.prompt,
                "aspect_ratio": aspect_ratio,
            }
        })
    }

    async fn run(&self, request: &ImageRequest) -> Result<Value, InvoiceError> {
        if request.prompt.trim().is_empty() {
            return Err(InvoiceError::EmptyPrompt);
        }
        let token = self.api_token.as_deref().ok_or(InvoiceError::MissingCredential {
            service: "Replicate",
            var: "REPLICATE_API_TOKEN",
        })?;

        info!("Generating image with {}", self.model);
        let response = self
            .http
            .post(format!("{}/v1/models/{}/predictions", self.base_url, self.model))
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&self.input(request))
            .send()
            .await
            .map_err(|e| InvoiceError::ImageGenerationFailed(e.to_string()))?;

        let mut prediction = read_prediction(response).await?;
        let mut polls = 0;
        loop {
            match prediction.state() {
                PredictionState::Done(output) => {
                    debug!("Prediction {} finished after {} polls", prediction.id, polls);
                    return Ok(output);
                }
                PredictionState::Failed(reason) => {
                    return Err(InvoiceError::ImageGenerationFailed(reason));
                }
                PredictionState::Running => {
                    let url = prediction
                        .urls
                        .as_ref()
                        .and_then(|u| u.get.clone())
                        .ok_or_else(|| {
                            InvoiceError::ImageGenerationFailed(format!(
                                "prediction {} still {} and has no poll URL",
                                prediction.id, prediction.status
                            ))
                        })?;
                    polls += 1;
                    if polls > MAX_POLLS {
                        return Err(InvoiceError::ImageGenerationFailed(format!(
                            "prediction {} did not finish after {} polls",
                            prediction.id, MAX_POLLS
                        )));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                    let response = self
                        .http
                        .get(url)
                        .bearer_auth(token)
                        .send()
                        .await
                        .map_err(|e| InvoiceError::ImageGenerationFailed(e.to_string()))?;
                    prediction = read_prediction(response).await?;
                }
            }
        }
    }
}

impl ImageGenerator for ReplicateClient {
    fn generate<'a>(&'a self, request: &'a ImageRequest) -> BoxFuture<'a, Result<Value, InvoiceError>> {
        Box::pin(self.run(request))
    }
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction, InvoiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(InvoiceError::ImageGenerationFailed(format!(
            "HTTP {status}: {}",
            body.trim()
        )));
    }
    response
        .json::<Prediction>()
        .await
        .map_err(|e| InvoiceError::ImageGenerationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(body: Value) -> Prediction {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn input_uses_default_aspect_ratio() {
        let client = ReplicateClient::new(&ServiceConfig::default()).unwrap();
        let body = client.input(&ImageRequest {
            prompt: "a receipt".into(),
            aspect_ratio: None,
        });
        assert_eq!(body["input"]["aspect_ratio"], "3:2");
        assert_eq!(body["input"]["prompt"], "a receipt");

        let body = client.input(&ImageRequest {
            prompt: "a receipt".into(),
            aspect_ratio: Some("16:9".into()),
        });
        assert_eq!(body["input"]["aspect_ratio"], "16:9");
    }

    #[test]
    fn succeeded_prediction_yields_output() {
        let p = prediction(json!({
            "id": "p1",
            "status": "succeeded",
            "output": "https://replicate.delivery/out.jpg"
        }));
        match p.state() {
            PredictionState::Done(v) => assert_eq!(v, "https://replicate.delivery/out.jpg"),
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn failed_prediction_carries_error() {
        let p = prediction(json!({"id": "p2", "status": "failed", "error": "NSFW content"}));
        match p.state() {
            PredictionState::Failed(m) => assert_eq!(m, "NSFW content"),
            _ => panic!("expected Failed"),
        }
    }

    #[test]
    fn processing_prediction_is_running() {
        let p = prediction(json!({
            "id": "p3",
            "status": "processing",
            "urls": {"get": "https://api.replicate.com/v1/predictions/p3"}
        }));
        assert!(matches!(p.state(), PredictionState::Running));
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected() {
        let client = ReplicateClient::new(&ServiceConfig::default()).unwrap();
        let err = client
            .generate(&ImageRequest {
                prompt: "  ".into(),
                aspect_ratio: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::EmptyPrompt));
    }
}
