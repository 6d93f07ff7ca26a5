//! Verifiers: warning-only checks that cross-reference the response
//! against the request's body and candidate set. `SpansCoherenceVerifier`
//! always runs; the other two can be disabled by configuration.

use crate::config::Config;
use crate::models::{EmailTriageResponse, Span, TriageRequest};
use crate::validation::Warning;
use std::collections::HashMap;

pub fn run(response: &EmailTriageResponse, request: &TriageRequest, config: &Config) -> Vec<Warning> {
    let body = &request.email.body_text_canonical;
    let mut warnings = Vec::new();

    if config.enable_evidence_presence_check {
        evidence_presence(response, body, &mut warnings);
    }
    if config.enable_keyword_presence_check {
        keyword_presence(response, request, body, &mut warnings);
    }
    span_coherence(response, body.len(), &mut warnings);

    warnings
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn evidence_presence(response: &EmailTriageResponse, body: &str, warnings: &mut Vec<Warning>) {
    let body_lower = body.to_lowercase();
    for topic in &response.topics {
        for ev in &topic.evidence {
            let quote_norm = normalize(&ev.quote);
            if !body_lower.contains(&quote_norm) {
                warnings.push(Warning::EvidenceQuoteNotFound {
                    quote: ev.quote.clone(),
                });
                continue;
            }
            if let Some(Span { start, end }) = ev.span {
                if end <= body.len() && body.is_char_boundary(start) && body.is_char_boundary(end) {
                    let slice = normalize(&body[start..end]);
                    if slice != quote_norm {
                        warnings.push(Warning::EvidenceSpanMismatch {
                            quote: ev.quote.clone(),
                        });
                    }
                }
            }
        }
    }
}

fn keyword_presence(
    response: &EmailTriageResponse,
    request: &TriageRequest,
    body: &str,
    warnings: &mut Vec<Warning>,
) {
    let by_id: HashMap<&str, &crate::models::CandidateKeyword> = request
        .candidate_keywords
        .iter()
        .map(|c| (c.candidate_id.as_str(), c))
        .collect();
    let body_lower = body.to_lowercase();

    for topic in &response.topics {
        for kw in &topic.keywordsintext {
            let Some(candidate) = by_id.get(kw.candidateid.as_str()) else {
                continue;
            };
            let term = candidate.term.to_lowercase();
            let lemma = candidate.lemma.to_lowercase();
            let present = body_lower.contains(&term) || (lemma != term && body_lower.contains(&lemma));
            if !present {
                warnings.push(Warning::KeywordNotPresent {
                    candidate_id: kw.candidateid.clone(),
                });
            }

            if let Some(spans) = &kw.spans {
                for span in spans {
                    if !(span.start < span.end && span.end <= body.len()) {
                        warnings.push(Warning::KeywordSpanOutOfBounds {
                            candidate_id: kw.candidateid.clone(),
                        });
                    }
                }
            }
        }
    }
}

fn span_coherence(response: &EmailTriageResponse, body_len: usize, warnings: &mut Vec<Warning>) {
    for topic in &response.topics {
        for kw in &topic.keywordsintext {
            if let Some(spans) = &kw.spans {
                for span in spans {
                    if !span.is_well_formed(body_len) {
                        warnings.push(Warning::SpanMalformed {
                            context: format!("keyword {}", kw.candidateid),
                        });
                    }
                }
            }
        }
        for ev in &topic.evidence {
            if let Some(span) = ev.span {
                if !span.is_well_formed(body_len) {
                    warnings.push(Warning::SpanMalformed {
                        context: format!("evidence in topic {}", topic.labelid.as_str()),
                    });
                }
            }
        }
    }
}
