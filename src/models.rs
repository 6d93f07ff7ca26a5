//! Data model for the triage orchestration core.
//!
//! Every type here is a value type: constructed once per request and
//! immutable thereafter. Ownership of a `TriageRequest` belongs to the
//! caller; the orchestrator constructs the `TriageResult` and the store
//! owns `DLQEntry` values once persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed taxonomy of e-mail topics. Multi-label: a response carries 1-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TopicLabel {
    Fatturazione,
    Assistenzatecnica,
    Reclamo,
    Infocommerciali,
    Documenti,
    Appuntamento,
    Contratto,
    Garanzia,
    Spedizione,
    Unknowntopic,
}

impl TopicLabel {
    pub const ALL: [TopicLabel; 10] = [
        TopicLabel::Fatturazione,
        TopicLabel::Assistenzatecnica,
        TopicLabel::Reclamo,
        TopicLabel::Infocommerciali,
        TopicLabel::Documenti,
        TopicLabel::Appuntamento,
        TopicLabel::Contratto,
        TopicLabel::Garanzia,
        TopicLabel::Spedizione,
        TopicLabel::Unknowntopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopicLabel::Fatturazione => "FATTURAZIONE",
            TopicLabel::Assistenzatecnica => "ASSISTENZATECNICA",
            TopicLabel::Reclamo => "RECLAMO",
            TopicLabel::Infocommerciali => "INFOCOMMERCIALI",
            TopicLabel::Documenti => "DOCUMENTI",
            TopicLabel::Appuntamento => "APPUNTAMENTO",
            TopicLabel::Contratto => "CONTRATTO",
            TopicLabel::Garanzia => "GARANZIA",
            TopicLabel::Spedizione => "SPEDIZIONE",
            TopicLabel::Unknowntopic => "UNKNOWNTOPIC",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Sentiment classification (single-label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

/// Priority / urgency classification (single-label, ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }

    /// 0=low .. 3=urgent, for ordinal comparisons.
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

/// Half-open span `[start, end)` into a body string, in byte offsets.
///
/// Serialized as a two-element `[start, end]` array (`spec.md` §6: "Spans
/// are `[integer,integer]`"), the wire shape the LLM is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_well_formed(&self, text_len: usize) -> bool {
        self.start < self.end && self.end <= text_len
    }
}

impl Serialize for Span {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        (self.start, self.end).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Span {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (start, end) = <(usize, usize)>::deserialize(deserializer)?;
        Ok(Span { start, end })
    }
}

/// PII span fields as they appear on the upstream preprocessor's wire
/// format: separate `span_start`/`span_end` integers rather than the
/// two-element array the LLM output schema uses.
mod span_pair {
    use super::Span;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Pair {
        span_start: usize,
        span_end: usize,
    }

    pub fn serialize<S: Serializer>(span: &Span, serializer: S) -> Result<S::Ok, S::Error> {
        Pair {
            span_start: span.start,
            span_end: span.end,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Span, D::Error> {
        let pair = Pair::deserialize(deserializer)?;
        Ok(Span::new(pair.span_start, pair.span_end))
    }
}

/// A PII entity detected (not redacted) in `EmailDocument::body`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiEntity {
    pub r#type: String,
    pub original_hash: String,
    pub redacted: String,
    #[serde(flatten, with = "span_pair")]
    pub span: Span,
    pub confidence: f64,
    pub detection_method: String,
}

/// A section (quote, signature, disclaimer) stripped during canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedSection {
    pub r#type: String,
    #[serde(flatten, with = "span_pair")]
    pub span: Span,
    pub content_preview: String,
    pub confidence: f64,
}

/// Version stamps contributed by the upstream preprocessing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputPipelineVersion {
    pub parser_version: String,
    pub canonicalization_version: String,
    pub ner_model_version: String,
    pub pii_redaction_version: String,
}

/// Canonicalized e-mail document, as produced by the upstream preprocessor.
///
/// Treated as authoritative; the core does not re-derive any of these
/// fields, it only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDocument {
    pub uid: String,
    pub uidvalidity: Option<String>,
    pub mailbox: String,
    pub message_id: String,
    pub fetched_at: DateTime<Utc>,
    pub size: u64,

    pub from_addr_redacted: String,
    pub to_addrs_redacted: Vec<String>,
    pub subject_canonical: String,
    pub date_parsed: String,
    pub headers_canonical: HashMap<String, serde_json::Value>,

    pub body_text_canonical: String,
    #[serde(default)]
    pub body_html_canonical: String,
    pub body_original_hash: String,

    #[serde(default)]
    pub removed_sections: Vec<RemovedSection>,
    #[serde(default)]
    pub pii_entities: Vec<PiiEntity>,

    pub pipeline_version: InputPipelineVersion,
    pub processing_timestamp: DateTime<Utc>,
    pub processing_duration_ms: u64,
}

/// A deterministically generated keyword the LLM may cite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateKeyword {
    pub candidate_id: String,
    pub term: String,
    pub lemma: String,
    pub count: u32,
    pub source: String,
    pub score: f64,
}

/// Optional per-request overrides of a subset of `Config` fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    pub body_truncation_limit: Option<usize>,
    pub candidate_top_n: Option<usize>,
}

/// Top-level request to the triage core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageRequest {
    pub email: EmailDocument,
    pub candidate_keywords: Vec<CandidateKeyword>,
    pub dictionary_version: u32,
    #[serde(default)]
    pub config_overrides: Option<ConfigOverrides>,
}

/// A keyword the LLM selected from the candidate list, anchored to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordInText {
    pub candidateid: String,
    pub lemma: String,
    pub count: u32,
    #[serde(default)]
    pub spans: Option<Vec<Span>>,
}

/// A quote supporting a topic classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub quote: String,
    #[serde(default)]
    pub span: Option<Span>,
}

/// A single topic classification with anchored keywords and evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicResult {
    pub labelid: TopicLabel,
    pub confidence: f64,
    pub keywordsintext: Vec<KeywordInText>,
    pub evidence: Vec<EvidenceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub value: Sentiment,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityResult {
    pub value: Priority,
    pub confidence: f64,
    pub signals: Vec<String>,
}

/// Structured LLM verdict, post multi-stage validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTriageResponse {
    pub dictionaryversion: u32,
    pub sentiment: SentimentResult,
    pub priority: PriorityResult,
    pub topics: Vec<TopicResult>,
}

/// Frozen tuple of every component version touched by a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineVersion {
    pub parser_version: String,
    pub canonicalization_version: String,
    pub ner_model_version: String,
    pub pii_redaction_version: String,
    pub dictionary_version: u32,
    pub model_version: String,
    pub schema_version: String,
    pub inference_layer_version: String,
    pub stoplist_version: Option<String>,
}

impl PipelineVersion {
    pub fn freeze(
        upstream: &InputPipelineVersion,
        dictionary_version: u32,
        model_version: impl Into<String>,
        schema_version: impl Into<String>,
        inference_layer_version: impl Into<String>,
    ) -> Self {
        Self {
            parser_version: upstream.parser_version.clone(),
            canonicalization_version: upstream.canonicalization_version.clone(),
            ner_model_version: upstream.ner_model_version.clone(),
            pii_redaction_version: upstream.pii_redaction_version.clone(),
            dictionary_version,
            model_version: model_version.into(),
            schema_version: schema_version.into(),
            inference_layer_version: inference_layer_version.into(),
            stoplist_version: None,
        }
    }
}

/// The retry strategies, in escalation order. `strategies_used` is always
/// a prefix of this sequence (P7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Standard,
    Shrink,
    Fallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Standard => "standard",
            Strategy::Shrink => "shrink",
            Strategy::Fallback => "fallback",
        }
    }
}

/// One stage's worth of detail about a caught validation failure, kept
/// for the audit trail (`RetryMetadata::validation_failures`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailureDetail {
    pub stage: String,
    pub rule_name: Option<String>,
    pub field_path: Option<String>,
    pub invalid_value: Option<String>,
    pub message: String,
}

/// Snapshot of the generation call that eventually succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMetadata {
    pub model: String,
    pub model_version: Option<String>,
    pub latency_ms: u64,
    pub attempt: u32,
    pub finish_reason: String,
    pub truncation_applied: bool,
    pub candidate_count: usize,
}

/// Full audit trail of a request's journey through the retry ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryMetadata {
    pub total_attempts: u32,
    pub strategies_used: Vec<Strategy>,
    pub final_strategy: Strategy,
    pub total_latency_ms: u64,
    pub llm_metadata: LlmMetadata,
    pub validation_failures: Vec<ValidationFailureDetail>,
}

/// Successful, persisted result of a triage request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub triage_response: EmailTriageResponse,
    pub pipeline_version: PipelineVersion,
    pub request_uid: String,
    #[serde(default)]
    pub validation_warnings: Vec<String>,
    pub retries_used: u32,
    pub processing_duration_ms: f64,
    pub created_at: DateTime<Utc>,
}

/// A request that exhausted the retry ladder, queued for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub request_uid: String,
    pub timestamp: DateTime<Utc>,
    pub total_attempts: u32,
    pub strategies_used: Vec<Strategy>,
    pub total_latency_ms: u64,
    pub validation_failures: Vec<ValidationFailureDetail>,
    pub last_error: String,
    pub last_error_kind: String,
    pub request: TriageRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_label_round_trips_through_str() {
        for t in TopicLabel::ALL {
            assert_eq!(TopicLabel::from_str_opt(t.as_str()), Some(t));
        }
    }

    #[test]
    fn sentiment_round_trips_through_str() {
        for s in Sentiment::ALL {
            assert_eq!(Sentiment::from_str_opt(s.as_str()), Some(s));
        }
    }

    #[test]
    fn priority_ordinal_is_low_to_urgent() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!(Priority::Low.ordinal(), 0);
        assert_eq!(Priority::Urgent.ordinal(), 3);
    }

    #[test]
    fn span_well_formed_checks_bounds_and_order() {
        assert!(Span::new(0, 5).is_well_formed(10));
        assert!(!Span::new(5, 5).is_well_formed(10));
        assert!(!Span::new(5, 3).is_well_formed(10));
        assert!(!Span::new(0, 11).is_well_formed(10));
    }
}
