//! Stage 4 — Quality: warnings only, never fails the response.

use crate::config::Config;
use crate::models::EmailTriageResponse;
use crate::validation::Warning;
use std::collections::HashSet;

fn milli(v: f64) -> i64 {
    (v * 1000.0).round() as i64
}

pub fn check(response: &EmailTriageResponse, config: &Config) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let threshold_milli = milli(config.min_confidence_warning_threshold);

    confidence_gating(response, threshold_milli, &mut warnings);
    duplicate_detection(response, &mut warnings);
    completeness(response, &mut warnings);

    warnings
}

fn confidence_gating(response: &EmailTriageResponse, threshold_milli: i64, warnings: &mut Vec<Warning>) {
    if milli(response.sentiment.confidence) < threshold_milli {
        warnings.push(Warning::LowConfidence {
            field: "sentiment".to_string(),
            value_milli: milli(response.sentiment.confidence),
            threshold_milli,
        });
    }
    if milli(response.priority.confidence) < threshold_milli {
        warnings.push(Warning::LowConfidence {
            field: "priority".to_string(),
            value_milli: milli(response.priority.confidence),
            threshold_milli,
        });
    }
    for topic in &response.topics {
        if milli(topic.confidence) < threshold_milli {
            warnings.push(Warning::LowConfidence {
                field: format!("topics[{}]", topic.labelid.as_str()),
                value_milli: milli(topic.confidence),
                threshold_milli,
            });
        }
    }
}

fn duplicate_detection(response: &EmailTriageResponse, warnings: &mut Vec<Warning>) {
    let mut seen_labels = HashSet::new();
    for topic in &response.topics {
        if !seen_labels.insert(topic.labelid) {
            warnings.push(Warning::DuplicateTopicLabel {
                label: topic.labelid.as_str().to_string(),
            });
        }

        let mut seen_candidates = HashSet::new();
        for kw in &topic.keywordsintext {
            if !seen_candidates.insert(kw.candidateid.as_str()) {
                warnings.push(Warning::DuplicateCandidateInTopic {
                    label: topic.labelid.as_str().to_string(),
                    candidate_id: kw.candidateid.clone(),
                });
            }
        }

        let mut seen_quotes = HashSet::new();
        for ev in &topic.evidence {
            let normalized = ev.quote.trim().to_lowercase();
            if !seen_quotes.insert(normalized) {
                warnings.push(Warning::DuplicateEvidenceQuote {
                    label: topic.labelid.as_str().to_string(),
                });
            }
        }
    }
}

fn completeness(response: &EmailTriageResponse, warnings: &mut Vec<Warning>) {
    for topic in &response.topics {
        if topic.keywordsintext.is_empty() {
            warnings.push(Warning::EmptyKeywords {
                label: topic.labelid.as_str().to_string(),
            });
        }
        if topic.evidence.is_empty() {
            warnings.push(Warning::EmptyEvidence {
                label: topic.labelid.as_str().to_string(),
            });
        }
        for ev in &topic.evidence {
            if ev.quote.chars().count() > 180 {
                warnings.push(Warning::EvidenceQuoteNearCap {
                    label: topic.labelid.as_str().to_string(),
                    length: ev.quote.chars().count(),
                });
            }
        }
    }
    if response.priority.signals.is_empty() {
        warnings.push(Warning::EmptyPrioritySignals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceItem, KeywordInText, PriorityResult, Sentiment, SentimentResult, TopicLabel, TopicResult, Priority};

    fn base_response() -> EmailTriageResponse {
        EmailTriageResponse {
            dictionaryversion: 1,
            sentiment: SentimentResult { value: Sentiment::Neutral, confidence: 0.9 },
            priority: PriorityResult { value: Priority::Medium, confidence: 0.9, signals: vec!["x".into()] },
            topics: vec![TopicResult {
                labelid: TopicLabel::Contratto,
                confidence: 0.9,
                keywordsintext: vec![KeywordInText {
                    candidateid: "h1".into(),
                    lemma: "contratto".into(),
                    count: 1,
                    spans: None,
                }],
                evidence: vec![EvidenceItem { quote: "contratto".into(), span: None }],
            }],
        }
    }

    #[test]
    fn clean_response_has_no_warnings() {
        let cfg = Config::default();
        assert!(check(&base_response(), &cfg).is_empty());
    }

    #[test]
    fn low_confidence_triggers_warning() {
        let mut resp = base_response();
        resp.sentiment.confidence = 0.05;
        let cfg = Config::default();
        let warnings = check(&resp, &cfg);
        assert!(warnings.iter().any(|w| matches!(w, Warning::LowConfidence { field, .. } if field == "sentiment")));
    }

    #[test]
    fn empty_signals_triggers_warning() {
        let mut resp = base_response();
        resp.priority.signals.clear();
        let cfg = Config::default();
        assert!(check(&resp, &cfg).contains(&Warning::EmptyPrioritySignals));
    }

    #[test]
    fn duplicate_topic_label_triggers_warning() {
        let mut resp = base_response();
        resp.topics.push(resp.topics[0].clone());
        let cfg = Config::default();
        let warnings = check(&resp, &cfg);
        assert!(warnings.iter().any(|w| matches!(w, Warning::DuplicateTopicLabel { .. })));
    }
}
