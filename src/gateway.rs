//! LLM Gateway (C2): an opaque request/response interface to a
//! constrained-JSON generator.
//!
//! This wraps the transport-level [`Backend`](crate::backend::Backend)
//! trait (connection retries, NDJSON streaming, provider quirks) behind
//! the narrower contract `spec.md` §4.2 asks for: `generate`,
//! `health_check`, `model_info`. The gateway never parses or validates
//! `content` — that is the Validation Pipeline's job.

use crate::backend::{self, BackoffConfig, Backend, ChatMessage, LlmRequest, Role};
use crate::client::LlmConfig;
use crate::error::{PipelineError, TriageError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A provider-agnostic generation request.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub format_schema: Option<serde_json::Value>,
    pub stop_sequences: Vec<String>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Incomplete,
}

/// A provider-agnostic generation response.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub content: String,
    pub model_version: Option<String>,
    pub finish_reason: FinishReason,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub latency_ms: u64,
    pub created_at: Option<String>,
    pub raw_meta: Option<serde_json::Value>,
}

/// Three operations: generate, a non-throwing liveness check, and a
/// model-metadata lookup for the audit trail.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn generate(
        &self,
        req: &GatewayRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<GatewayResponse, TriageError>;

    async fn health_check(&self) -> bool;

    async fn model_info(&self, model: &str) -> Option<serde_json::Value>;
}

/// The Ollama-backed implementation of [`Gateway`], built on
/// [`crate::backend::OllamaBackend`] plus transport-level backoff.
pub struct OllamaGateway {
    backend: Arc<dyn Backend>,
    client: Client,
    base_url: String,
    backoff: BackoffConfig,
    timeout: Duration,
}

impl OllamaGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(backend::OllamaBackend),
            client: Client::new(),
            base_url: base_url.into(),
            backoff: BackoffConfig::standard(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(client) = Client::builder().timeout(timeout).build() {
            self.client = client;
        }
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Gateway for OllamaGateway {
    async fn generate(
        &self,
        req: &GatewayRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<GatewayResponse, TriageError> {
        let started = Instant::now();

        let config = build_llm_config(req);

        let llm_request = LlmRequest {
            model: req.model.clone(),
            system_prompt: req.system_prompt.clone(),
            prompt: req.prompt.clone(),
            messages: req
                .system_prompt
                .as_ref()
                .map(|sp| {
                    vec![ChatMessage {
                        role: Role::System,
                        content: sp.clone(),
                    }]
                })
                .unwrap_or_default(),
            config,
        };

        let response = backend::with_backoff(
            &self.backend,
            &self.client,
            &self.base_url,
            &llm_request,
            &self.backoff,
            cancel,
            None,
        )
        .await
        .map_err(|e| {
            let mapped = to_triage_error(e, self.timeout);
            tracing::warn!(model = %req.model, error = %mapped, "gateway generation failed");
            mapped
        })?;

        let finish_reason = response
            .metadata
            .as_ref()
            .and_then(|m| m.get("done_reason"))
            .and_then(|v| v.as_str())
            .map(|reason| match reason {
                "stop" => FinishReason::Stop,
                "length" => FinishReason::Length,
                _ => FinishReason::Incomplete,
            })
            .unwrap_or_else(|| {
                response
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("done").and_then(|d| d.as_bool()))
                    .map(|done| if done { FinishReason::Stop } else { FinishReason::Incomplete })
                    .unwrap_or(FinishReason::Stop)
            });

        Ok(GatewayResponse {
            content: response.text,
            model_version: response
                .metadata
                .as_ref()
                .and_then(|m| m.get("model"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            finish_reason,
            prompt_tokens: response
                .metadata
                .as_ref()
                .and_then(|m| m.get("prompt_eval_count"))
                .and_then(|v| v.as_u64())
                .map(|v| v as u32),
            completion_tokens: response
                .metadata
                .as_ref()
                .and_then(|m| m.get("eval_count"))
                .and_then(|v| v.as_u64())
                .map(|v| v as u32),
            latency_ms: started.elapsed().as_millis() as u64,
            created_at: response
                .metadata
                .as_ref()
                .and_then(|m| m.get("created_at"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            raw_meta: response.metadata,
        })
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/version", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn model_info(&self, model: &str) -> Option<serde_json::Value> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .ok()?;
        let body: serde_json::Value = resp.json().await.ok()?;
        body.get("models")?
            .as_array()?
            .iter()
            .find(|m| m.get("name").and_then(|n| n.as_str()) == Some(model))
            .cloned()
    }
}

/// Translate a provider-agnostic [`GatewayRequest`] into the transport-level
/// [`LlmConfig`], forwarding every sampling knob `spec.md` §4.2 names
/// (including `seed`, the only controllable source of generation
/// stochasticity) through to the backend's options object.
fn build_llm_config(req: &GatewayRequest) -> LlmConfig {
    let mut config = LlmConfig::default()
        .with_temperature(req.temperature)
        .with_max_tokens(req.max_tokens);
    if let Some(schema) = &req.format_schema {
        config = config.with_json_schema(schema.clone());
    }
    if let Some(top_p) = req.top_p {
        config = config.with_top_p(top_p);
    }
    if let Some(seed) = req.seed {
        config = config.with_seed(seed);
    }
    config
}

fn to_triage_error(err: PipelineError, timeout: Duration) -> TriageError {
    match err {
        PipelineError::HttpError { status, body, .. } if status == 404 => {
            TriageError::ModelNotAvailable(body)
        }
        PipelineError::HttpError { status, body, .. } if status >= 500 => {
            TriageError::GatewayGeneration(format!("{}: {}", status, body))
        }
        PipelineError::Request(e) if e.is_timeout() => TriageError::GatewayTimeout(timeout),
        PipelineError::Request(e) => TriageError::GatewayConnection(e.to_string()),
        PipelineError::Cancelled => TriageError::Cancelled,
        other => TriageError::GatewayGeneration(other.to_string()),
    }
}
