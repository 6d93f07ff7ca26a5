use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A pipeline stage failed with a descriptive message.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    /// The pipeline or payload was cancelled via the cancellation flag.
    #[error("Pipeline was cancelled")]
    Cancelled,

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the provider returns a non-success status code. The `retry_after` field
    /// is populated from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// The three hard-fail validation stages, unified behind one error so the
/// Retry Engine can pattern-match a single variant instead of three
/// separate exception types (Design Note: typed result sums, not
/// exception-based control flow).
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("JSON parse error: {message} (input started with: {input_prefix:?})")]
    JsonParse {
        message: String,
        input_prefix: String,
    },

    #[error("schema validation failed: {} violation(s), first: {}", .violations.len(), .violations.first().cloned().unwrap_or_default())]
    Schema { violations: Vec<String> },

    #[error("business rule '{rule_name}' violated at {field_path}: invalid value {invalid_value:?}")]
    BusinessRule {
        rule_name: String,
        invalid_value: String,
        field_path: String,
        expected_values: Option<Vec<String>>,
    },
}

impl ValidationError {
    pub fn stage_name(&self) -> &'static str {
        match self {
            ValidationError::JsonParse { .. } => "stage1_parse",
            ValidationError::Schema { .. } => "stage2_schema",
            ValidationError::BusinessRule { .. } => "stage3_business_rules",
        }
    }

    pub fn to_detail(&self) -> crate::models::ValidationFailureDetail {
        match self {
            ValidationError::JsonParse { message, .. } => crate::models::ValidationFailureDetail {
                stage: self.stage_name().to_string(),
                rule_name: None,
                field_path: None,
                invalid_value: None,
                message: message.clone(),
            },
            ValidationError::Schema { violations } => crate::models::ValidationFailureDetail {
                stage: self.stage_name().to_string(),
                rule_name: None,
                field_path: None,
                invalid_value: None,
                message: violations.join("; "),
            },
            ValidationError::BusinessRule {
                rule_name,
                invalid_value,
                field_path,
                ..
            } => crate::models::ValidationFailureDetail {
                stage: self.stage_name().to_string(),
                rule_name: Some(rule_name.clone()),
                field_path: Some(field_path.clone()),
                invalid_value: Some(invalid_value.clone()),
                message: self.to_string(),
            },
        }
    }
}

/// Top-level error for the triage orchestration core (`spec.md` §7).
#[derive(Error, Debug, Clone)]
pub enum TriageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("gateway connection error: {0}")]
    GatewayConnection(String),

    #[error("gateway timeout after {0:?}")]
    GatewayTimeout(std::time::Duration),

    #[error("gateway generation error: {0}")]
    GatewayGeneration(String),

    #[error("model '{0}' not available")]
    ModelNotAvailable(String),

    #[error("retry ladder exhausted after {total_attempts} attempt(s), strategies used: {strategies_used:?}")]
    RetryExhausted {
        total_attempts: u32,
        strategies_used: Vec<crate::models::Strategy>,
        total_latency_ms: u64,
        validation_failures: Vec<crate::models::ValidationFailureDetail>,
        last_error: Box<ValidationError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("batch of {submitted} requests exceeds the limit of {limit}")]
    BatchTooLarge { submitted: usize, limit: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<PipelineError> for TriageError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Cancelled => TriageError::Cancelled,
            PipelineError::HttpError { status, body, .. } if status == 404 => {
                TriageError::ModelNotAvailable(body)
            }
            PipelineError::Request(e) => TriageError::GatewayConnection(e.to_string()),
            other => TriageError::GatewayGeneration(other.to_string()),
        }
    }
}

pub type TriageOutcome<T> = std::result::Result<T, TriageError>;
