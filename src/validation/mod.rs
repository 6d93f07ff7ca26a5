//! Validation Pipeline (C3): four stages plus three verifiers run against
//! a raw gateway response and the originating request.
//!
//! Stages 1-3 are hard-fail (`ValidationError`, handled by the Retry
//! Engine). Stage 4 and the verifiers only ever append to `warnings[]`.

mod pipeline;
mod stage1;
mod stage2;
mod stage3;
mod stage4;
mod verifiers;

pub use pipeline::ValidationPipeline;

use std::fmt;

/// A non-fatal observation about an otherwise-valid response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    LowConfidence { field: String, value_milli: i64, threshold_milli: i64 },
    DuplicateTopicLabel { label: String },
    DuplicateCandidateInTopic { label: String, candidate_id: String },
    DuplicateEvidenceQuote { label: String },
    EmptyKeywords { label: String },
    EmptyEvidence { label: String },
    EmptyPrioritySignals,
    EvidenceQuoteNearCap { label: String, length: usize },
    EvidenceQuoteNotFound { quote: String },
    EvidenceSpanMismatch { quote: String },
    KeywordNotPresent { candidate_id: String },
    KeywordSpanOutOfBounds { candidate_id: String },
    SpanMalformed { context: String },
    LongGenerationAccepted,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::LowConfidence { field, value_milli, threshold_milli } => write!(
                f,
                "{} confidence {:.3} is below the warning threshold {:.3}",
                field,
                *value_milli as f64 / 1000.0,
                *threshold_milli as f64 / 1000.0
            ),
            Warning::DuplicateTopicLabel { label } => {
                write!(f, "duplicate topic label {}", label)
            }
            Warning::DuplicateCandidateInTopic { label, candidate_id } => write!(
                f,
                "duplicate candidate {} within topic {}",
                candidate_id, label
            ),
            Warning::DuplicateEvidenceQuote { label } => {
                write!(f, "duplicate evidence quote within topic {}", label)
            }
            Warning::EmptyKeywords { label } => {
                write!(f, "topic {} has no keywords", label)
            }
            Warning::EmptyEvidence { label } => {
                write!(f, "topic {} has no evidence", label)
            }
            Warning::EmptyPrioritySignals => write!(f, "priority has no signals"),
            Warning::EvidenceQuoteNearCap { label, length } => write!(
                f,
                "evidence quote in topic {} is {} characters, approaching the 200 cap",
                label, length
            ),
            Warning::EvidenceQuoteNotFound { quote } => {
                write!(f, "evidence quote not found in body: {:?}", quote)
            }
            Warning::EvidenceSpanMismatch { quote } => write!(
                f,
                "evidence span does not match its quote: {:?}",
                quote
            ),
            Warning::KeywordNotPresent { candidate_id } => write!(
                f,
                "keyword for candidate {} not present in body",
                candidate_id
            ),
            Warning::KeywordSpanOutOfBounds { candidate_id } => write!(
                f,
                "keyword span for candidate {} is out of bounds",
                candidate_id
            ),
            Warning::SpanMalformed { context } => {
                write!(f, "malformed span in {}", context)
            }
            Warning::LongGenerationAccepted => write!(
                f,
                "generation stopped due to length limit but validation passed"
            ),
        }
    }
}
