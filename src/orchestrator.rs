//! Worker Orchestrator (C5): owns the per-process singletons and exposes
//! the two entry points `spec.md` §4.5 names — a synchronous `triage()`
//! call and an asynchronous `submit_batch()`/`job_status()` pair defined
//! against a `TaskQueue` contract rather than a concrete broker (the
//! broker itself is out of scope per `spec.md` §1).

use crate::config::Config;
use crate::error::TriageError;
use crate::gateway::Gateway;
use crate::models::{DlqEntry, TriageRequest, TriageResult};
use crate::prompt_assembler::{self, PromptTemplates};
use crate::retry_engine::{self, RetryEngine};
use crate::store::Store;
use crate::validation::ValidationPipeline;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// State of one enqueued job, mirroring Celery's task states
/// (`spec.md` §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Started,
    Success(Box<TriageResult>),
    Failure(String),
    Retry,
}

/// Contract for the task-queue collaborator (`spec.md` §6): `enqueue`,
/// `state`, `result`. The core depends only on this trait, never on a
/// concrete broker.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, job_id: &str, request: TriageRequest);
    async fn state(&self, job_id: &str) -> Option<JobState>;
    async fn set_state(&self, job_id: &str, state: JobState);
}

/// In-process test double: a single `Mutex<HashMap>`, no real broker
/// round-trip. Exercises the `TaskQueue` contract in tests.
pub struct NullTaskQueue {
    jobs: Mutex<HashMap<String, JobState>>,
}

impl NullTaskQueue {
    pub fn new() -> Self {
        Self { jobs: Mutex::new(HashMap::new()) }
    }
}

impl Default for NullTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for NullTaskQueue {
    async fn enqueue(&self, job_id: &str, _request: TriageRequest) {
        self.jobs.lock().await.insert(job_id.to_string(), JobState::Pending);
    }

    async fn state(&self, job_id: &str) -> Option<JobState> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    async fn set_state(&self, job_id: &str, state: JobState) {
        self.jobs.lock().await.insert(job_id.to_string(), state);
    }
}

#[derive(Debug)]
pub struct BatchHandle {
    pub batch_id: String,
    pub job_ids: Vec<String>,
}

/// Owns every heavy per-process resource: the prompt templates, the
/// gateway client, the validation pipeline, the store, and (optionally)
/// a task queue. Constructed once per worker process; `triage()` and
/// `submit_batch()` borrow from it rather than re-initializing anything.
pub struct Orchestrator {
    config: Config,
    gateway: Arc<dyn Gateway>,
    validation: ValidationPipeline,
    templates: PromptTemplates,
    store: Arc<dyn Store>,
    task_queue: Arc<dyn TaskQueue>,
    fallback_cursor: AtomicUsize,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        gateway: Arc<dyn Gateway>,
        schema: serde_json::Value,
        store: Arc<dyn Store>,
        task_queue: Arc<dyn TaskQueue>,
    ) -> Result<Self, String> {
        let validation = ValidationPipeline::new(&schema)?;
        let templates = PromptTemplates::load(schema);
        Ok(Self {
            config,
            gateway,
            validation,
            templates,
            store,
            task_queue,
            fallback_cursor: AtomicUsize::new(0),
        })
    }

    fn next_fallback_cursor(&self) -> usize {
        self.fallback_cursor.fetch_add(1, Ordering::Relaxed)
    }

    /// Synchronous entry point: run the full retry ladder in-line and
    /// measure `processing_duration_ms` around the whole call.
    #[tracing::instrument(name = "triage_request", skip_all, fields(request_uid = %request.email.uid))]
    pub async fn triage(
        &self,
        request: &TriageRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<TriageResult, TriageError> {
        let started = std::time::Instant::now();
        let engine = RetryEngine::new(
            self.gateway.as_ref(),
            &self.validation,
            &self.templates,
            &self.config,
        );

        let fallback_start = self.next_fallback_cursor();
        let outcome = engine.run(request, fallback_start, cancel).await?;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(TriageResult {
            triage_response: outcome.response,
            pipeline_version: retry_engine::freeze_version(request, &self.config),
            request_uid: request.email.uid.clone(),
            validation_warnings: outcome.warnings.iter().map(|w| w.to_string()).collect(),
            retries_used: outcome.metadata.total_attempts.saturating_sub(1),
            processing_duration_ms: duration_ms,
            created_at: Utc::now(),
        })
    }

    /// Reject batches over 100 requests at the boundary
    /// (`TriageError::BatchTooLarge`), then enqueue one job per request.
    pub async fn submit_batch(&self, requests: Vec<TriageRequest>) -> Result<BatchHandle, TriageError> {
        if requests.len() > self.config.batch_max_size {
            return Err(TriageError::BatchTooLarge {
                submitted: requests.len(),
                limit: self.config.batch_max_size,
            });
        }

        let batch_id = format!("batch-{}", fastrand::u64(..));
        let mut job_ids = Vec::with_capacity(requests.len());
        for request in requests {
            let job_id = format!("job-{}", fastrand::u64(..));
            self.task_queue.enqueue(&job_id, request).await;
            job_ids.push(job_id);
        }

        Ok(BatchHandle { batch_id, job_ids })
    }

    pub async fn job_status(&self, job_id: &str) -> Option<JobState> {
        self.task_queue.state(job_id).await
    }

    /// Worker job contract: decode one request, run `triage()` (which
    /// already owns the retry ladder), and persist the terminal outcome.
    /// Never re-enters the retry ladder at the queue level.
    pub async fn run_job(&self, job_id: &str, request: TriageRequest) {
        self.task_queue.set_state(job_id, JobState::Started).await;

        match self.triage(&request, None).await {
            Ok(result) => {
                tracing::info!(job_id, uid = %request.email.uid, "triage succeeded");
                self.store.save_result(&result, Some(job_id)).await;
                self.task_queue
                    .set_state(job_id, JobState::Success(Box::new(result)))
                    .await;
            }
            Err(TriageError::RetryExhausted {
                total_attempts,
                strategies_used,
                total_latency_ms,
                validation_failures,
                last_error,
            }) => {
                tracing::warn!(
                    job_id,
                    uid = %request.email.uid,
                    total_attempts,
                    "retry ladder exhausted, writing to dead-letter queue"
                );
                let stored_request = redact_request_for_storage(request, self.config.redact_for_storage);

                let entry = DlqEntry {
                    request_uid: stored_request.email.uid.clone(),
                    timestamp: Utc::now(),
                    total_attempts,
                    strategies_used,
                    total_latency_ms,
                    validation_failures,
                    last_error: last_error.to_string(),
                    last_error_kind: "RetryExhausted".to_string(),
                    request: stored_request,
                };
                self.store.save_dlq(entry).await;
                self.task_queue
                    .set_state(job_id, JobState::Failure("retry ladder exhausted".to_string()))
                    .await;
            }
            Err(TriageError::Cancelled) => {
                tracing::info!(job_id, uid = %request.email.uid, "job cancelled");
                self.task_queue.set_state(job_id, JobState::Failure("cancelled".to_string())).await;
            }
            Err(other) => {
                tracing::error!(job_id, uid = %request.email.uid, error = %other, "job failed");
                self.task_queue.set_state(job_id, JobState::Failure(other.to_string())).await;
            }
        }
    }
}

/// Apply `redactForStorage` (`spec.md` §6) to a request before it is
/// persisted to the DLQ: PII spans in the body are replaced the same way
/// the Prompt Assembler redacts for an external LLM, but gated on a
/// separate flag since "safe to send off-box" and "safe to keep at rest"
/// are independent decisions.
fn redact_request_for_storage(mut request: TriageRequest, redact: bool) -> TriageRequest {
    if !redact {
        return request;
    }
    let entities = request.email.pii_entities.clone();
    request.email.body_text_canonical =
        prompt_assembler::redact_body(&request.email.body_text_canonical, &entities);
    if !request.email.body_html_canonical.is_empty() {
        request.email.body_html_canonical =
            prompt_assembler::redact_body(&request.email.body_html_canonical, &entities);
    }
    request
}
