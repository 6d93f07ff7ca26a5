//! # Email Triage Orchestration Core
//!
//! Drives structured-output classification of redacted, pre-processed
//! emails through a local LLM. The core is a fixed six-component pipeline:
//!
//! - **[`prompt_assembler`]** — assembles a system/user prompt pair from a
//!   [`models::TriageRequest`], truncating and redacting the body and
//!   selecting the top-scoring candidate keywords.
//! - **[`gateway`]** — the [`gateway::Gateway`] trait and its
//!   [`gateway::OllamaGateway`] implementation: a provider-agnostic
//!   `generate`/`health_check`/`model_info` contract wrapping the
//!   transport-level [`backend::Backend`].
//! - **[`validation`]** — a four-stage pipeline (strict JSON parse, JSON
//!   Schema validation, business-rule checks, quality warnings) plus
//!   evidence/keyword/span verifiers.
//! - **[`retry_engine`]** — a three-strategy escalation ladder (standard
//!   retry, shrink the prompt, fall back to another model) with
//!   exponential backoff between attempts.
//! - **[`orchestrator`]** — [`orchestrator::Orchestrator`], the per-process
//!   owner of the gateway, validation pipeline, and store; exposes a
//!   synchronous `triage()` call and an async `submit_batch()`/
//!   `job_status()` pair defined against a [`orchestrator::TaskQueue`].
//! - **[`store`]** — the [`store::Store`] trait (results + dead-letter
//!   queue) and an in-memory reference implementation.
//!
//! [`config::Config`] and [`error::TriageError`] cut across all six.
//!
//! ## Quick start
//!
//! ```no_run
//! use triage_core::{Config, InMemoryStore, OllamaGateway, Orchestrator};
//! use triage_core::orchestrator::NullTaskQueue;
//! use std::sync::Arc;
//!
//! # async fn run(request: triage_core::models::TriageRequest, schema: serde_json::Value) -> Result<(), String> {
//! let config = Config::default();
//! let gateway = Arc::new(OllamaGateway::new(&config.ollama_base_url));
//! let store = Arc::new(InMemoryStore::new(config.dlq_max_entries, config.result_ttl_seconds));
//!
//! let orchestrator = Orchestrator::new(
//!     config,
//!     gateway,
//!     schema,
//!     store,
//!     Arc::new(NullTaskQueue::new()),
//! )?;
//!
//! let result = orchestrator.triage(&request, None).await;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod backend;

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub mod config;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod prompt_assembler;
pub mod retry_engine;
pub mod store;
pub mod validation;

pub use backend::{BackoffConfig, MockBackend, OllamaBackend};

pub use client::LlmConfig;
pub use error::{PipelineError, Result};
pub use types::PipelineContext;

pub use config::Config;
pub use error::{TriageError, TriageOutcome, ValidationError};
pub use gateway::{Gateway, GatewayRequest, GatewayResponse, OllamaGateway};
pub use orchestrator::Orchestrator;
pub use store::{InMemoryStore, Store};
