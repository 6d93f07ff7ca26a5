//! Retry Engine (C4): a linear escalation over three strategies with
//! per-strategy attempt budgets, replacing exception-based retry loops
//! with a typed result sum the caller pattern-matches on.
//!
//! Stateless by design: the fallback-model cursor is threaded in as a
//! parameter (`fallback_start`) rather than held on `self`, so one
//! `RetryEngine` can safely serve concurrent requests (`spec.md` §9).

use crate::config::Config;
use crate::error::{TriageError, ValidationError};
use crate::gateway::{FinishReason, Gateway, GatewayRequest};
use crate::models::{EmailTriageResponse, LlmMetadata, PipelineVersion, RetryMetadata, Strategy};
use crate::prompt_assembler::{self, AssembleMode, PromptTemplates};
use crate::validation::{ValidationPipeline, Warning};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::Instant as TokioInstant;

/// Poll interval used while racing a backoff sleep against cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep for `duration`, but wake early and return `true` the moment
/// `cancel` flips — so a per-request deadline can abort mid-backoff
/// instead of waiting out the full sleep.
async fn sleep_respecting_cancel(duration: Duration, cancel: Option<&AtomicBool>) -> bool {
    let Some(cancel) = cancel else {
        tokio::time::sleep(duration).await;
        return false;
    };

    let deadline = TokioInstant::now() + duration;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return true;
        }
        let remaining = deadline.saturating_duration_since(TokioInstant::now());
        if remaining.is_zero() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(remaining.min(CANCEL_POLL_INTERVAL)) => {}
        }
    }
}

pub struct RetryEngine<'a> {
    gateway: &'a dyn Gateway,
    validation: &'a ValidationPipeline,
    templates: &'a PromptTemplates,
    config: &'a Config,
}

pub struct RetryOutcome {
    pub response: EmailTriageResponse,
    pub metadata: RetryMetadata,
    pub warnings: Vec<Warning>,
}

impl<'a> RetryEngine<'a> {
    pub fn new(
        gateway: &'a dyn Gateway,
        validation: &'a ValidationPipeline,
        templates: &'a PromptTemplates,
        config: &'a Config,
    ) -> Self {
        Self { gateway, validation, templates, config }
    }

    /// Run the full S0 -> S1 -> S2 ladder for one request. `fallback_start`
    /// is the round-robin cursor into `config.fallback_models`, owned by
    /// the caller (see module docs).
    pub async fn run(
        &self,
        request: &crate::models::TriageRequest,
        fallback_start: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<RetryOutcome, TriageError> {
        let started = Instant::now();

        let strategies: [(Strategy, u32); 3] = [
            (Strategy::Standard, self.config.max_retries),
            (Strategy::Shrink, 2),
            (Strategy::Fallback, self.config.fallback_models.len().max(1) as u32),
        ];

        let mut total_attempts: u32 = 0;
        let mut strategies_used: Vec<Strategy> = Vec::new();
        let mut validation_failures = Vec::new();
        let mut last_validation_error: Option<ValidationError> = None;
        let mut last_llm_metadata: Option<LlmMetadata> = None;

        for (strategy, max_attempts) in strategies {
            if max_attempts == 0 {
                continue;
            }
            strategies_used.push(strategy);

            for attempt in 1..=max_attempts {
                let _span = tracing::info_span!(
                    "retry_attempt",
                    request_uid = %request.email.uid,
                    strategy = ?strategy,
                    attempt,
                )
                .entered();

                if cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false) {
                    return Err(TriageError::Cancelled);
                }

                if attempt > 1 {
                    let backoff_secs = self.config.retry_backoff_base.powi(attempt as i32);
                    let cancelled =
                        sleep_respecting_cancel(Duration::from_secs_f64(backoff_secs), cancel).await;
                    if cancelled {
                        return Err(TriageError::Cancelled);
                    }
                }

                total_attempts += 1;

                let model = self.model_for(strategy, fallback_start, attempt);
                tracing::debug!(model = %model, "dispatching attempt");
                let mode = if strategy == Strategy::Shrink { AssembleMode::Shrink } else { AssembleMode::Normal };
                let assembled = prompt_assembler::assemble(request, mode, self.config, self.templates);

                let gw_request = GatewayRequest {
                    prompt: assembled.user_prompt,
                    system_prompt: Some(assembled.system_prompt),
                    model: model.clone(),
                    temperature: self.config.temperature,
                    max_tokens: self.config.max_tokens,
                    format_schema: Some(assembled.schema),
                    stop_sequences: Vec::new(),
                    top_p: None,
                    seed: None,
                };

                let gw_result = self.gateway.generate(&gw_request, cancel).await;

                let gw_response = match gw_result {
                    Ok(resp) => resp,
                    Err(TriageError::ModelNotAvailable(_)) if strategy == Strategy::Fallback => {
                        // Skip this fallback entry; cycle to the next attempt/model.
                        continue;
                    }
                    Err(other) => return Err(other),
                };

                last_llm_metadata = Some(LlmMetadata {
                    model: model.clone(),
                    model_version: gw_response.model_version.clone(),
                    latency_ms: gw_response.latency_ms,
                    attempt: total_attempts,
                    finish_reason: finish_reason_str(gw_response.finish_reason).to_string(),
                    truncation_applied: assembled.metadata.truncation_applied,
                    candidate_count: assembled.metadata.candidate_count,
                });

                match self.validation.validate(&gw_response.content, request, self.config) {
                    Ok((response, mut warnings)) => {
                        if gw_response.finish_reason == FinishReason::Length {
                            warnings.push(Warning::LongGenerationAccepted);
                        }
                        let metadata = RetryMetadata {
                            total_attempts,
                            strategies_used: strategies_used.clone(),
                            final_strategy: strategy,
                            total_latency_ms: started.elapsed().as_millis() as u64,
                            llm_metadata: last_llm_metadata.expect("set above on this iteration"),
                            validation_failures,
                        };
                        return Ok(RetryOutcome { response, metadata, warnings });
                    }
                    Err(validation_error) => {
                        validation_failures.push(validation_error.to_detail());
                        last_validation_error = Some(validation_error);
                    }
                }
            }
        }

        Err(TriageError::RetryExhausted {
            total_attempts,
            strategies_used,
            total_latency_ms: started.elapsed().as_millis() as u64,
            validation_failures,
            last_error: Box::new(
                last_validation_error.expect("at least one attempt runs before exhaustion"),
            ),
        })
    }

    fn model_for(&self, strategy: Strategy, fallback_start: usize, attempt: u32) -> String {
        match strategy {
            Strategy::Standard | Strategy::Shrink => self.config.ollama_model.clone(),
            Strategy::Fallback => {
                let models = &self.config.fallback_models;
                if models.is_empty() {
                    self.config.ollama_model.clone()
                } else {
                    let idx = (fallback_start + attempt as usize - 1) % models.len();
                    models[idx].clone()
                }
            }
        }
    }
}

fn finish_reason_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::Error => "error",
        FinishReason::Incomplete => "incomplete",
    }
}

/// Freeze the `PipelineVersion` for a request once, at the start of the
/// retry ladder, independent of which strategy eventually succeeds.
pub fn freeze_version(
    request: &crate::models::TriageRequest,
    config: &Config,
) -> PipelineVersion {
    PipelineVersion::freeze(
        &request.email.pipeline_version,
        request.dictionary_version,
        config.ollama_model.clone(),
        config.schema_version.clone(),
        config.inference_layer_version.clone(),
    )
}
