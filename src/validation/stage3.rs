//! Stage 3 — Business rules: fail-fast checks that the JSON Schema alone
//! cannot express, most importantly the anti-hallucination invariant.

use crate::error::ValidationError;
use crate::models::{Sentiment, TopicLabel, TriageRequest};
use std::collections::HashSet;

fn violation(
    rule_name: &str,
    invalid_value: impl Into<String>,
    field_path: impl Into<String>,
    expected_values: Option<Vec<String>>,
) -> ValidationError {
    ValidationError::BusinessRule {
        rule_name: rule_name.to_string(),
        invalid_value: invalid_value.into(),
        field_path: field_path.into(),
        expected_values,
    }
}

/// Runs against the raw parsed JSON (post schema validation, pre typed
/// deserialization) so enum mismatches surface as a `BusinessRule`
/// violation with a field path, rather than a generic deserialization
/// error.
pub fn validate(parsed: &serde_json::Value, request: &TriageRequest) -> Result<(), ValidationError> {
    dictionary_version_match(parsed, request)?;
    topic_label_in_enum(parsed)?;
    candidate_id_exists_in_input(parsed, request)?;
    sentiment_in_enum(parsed)?;
    priority_in_enum(parsed)?;
    Ok(())
}

fn dictionary_version_match(
    parsed: &serde_json::Value,
    request: &TriageRequest,
) -> Result<(), ValidationError> {
    let got = parsed
        .get("dictionaryversion")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    if got != request.dictionary_version as u64 {
        return Err(violation(
            "dictionary_version_match",
            got.to_string(),
            "dictionaryversion",
            Some(vec![request.dictionary_version.to_string()]),
        ));
    }
    Ok(())
}

fn topics(parsed: &serde_json::Value) -> &[serde_json::Value] {
    parsed
        .get("topics")
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

fn topic_label_in_enum(parsed: &serde_json::Value) -> Result<(), ValidationError> {
    for (i, topic) in topics(parsed).iter().enumerate() {
        let label = topic.get("labelid").and_then(|v| v.as_str()).unwrap_or("");
        if TopicLabel::from_str_opt(label).is_none() {
            return Err(violation(
                "topic_label_in_enum",
                label,
                format!("topics[{}].labelid", i),
                Some(TopicLabel::ALL.iter().map(|t| t.as_str().to_string()).collect()),
            ));
        }
    }
    Ok(())
}

fn candidate_id_exists_in_input(
    parsed: &serde_json::Value,
    request: &TriageRequest,
) -> Result<(), ValidationError> {
    let known: HashSet<&str> = request
        .candidate_keywords
        .iter()
        .map(|c| c.candidate_id.as_str())
        .collect();

    for (t, topic) in topics(parsed).iter().enumerate() {
        let keywords = topic
            .get("keywordsintext")
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        for (k, kw) in keywords.iter().enumerate() {
            let candidate_id = kw.get("candidateid").and_then(|v| v.as_str()).unwrap_or("");
            if !known.contains(candidate_id) {
                return Err(violation(
                    "candidateid_exists_in_input",
                    candidate_id,
                    format!("topics[{}].keywordsintext[{}].candidateid", t, k),
                    None,
                ));
            }
        }
    }
    Ok(())
}

fn sentiment_in_enum(parsed: &serde_json::Value) -> Result<(), ValidationError> {
    let value = parsed
        .get("sentiment")
        .and_then(|s| s.get("value"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if Sentiment::from_str_opt(value).is_none() {
        return Err(violation(
            "sentiment_in_enum",
            value,
            "sentiment.value",
            Some(Sentiment::ALL.iter().map(|s| s.as_str().to_string()).collect()),
        ));
    }
    Ok(())
}

fn priority_in_enum(parsed: &serde_json::Value) -> Result<(), ValidationError> {
    let value = parsed
        .get("priority")
        .and_then(|p| p.get("value"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if crate::models::Priority::from_str_opt(value).is_none() {
        return Err(violation(
            "priority_in_enum",
            value,
            "priority.value",
            Some(
                crate::models::Priority::ALL
                    .iter()
                    .map(|p| p.as_str().to_string())
                    .collect(),
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateKeyword, EmailDocument, InputPipelineVersion};
    use chrono::Utc;
    use serde_json::json;

    fn request() -> TriageRequest {
        TriageRequest {
            email: EmailDocument {
                uid: "u1".into(),
                uidvalidity: None,
                mailbox: "INBOX".into(),
                message_id: "<m>".into(),
                fetched_at: Utc::now(),
                size: 10,
                from_addr_redacted: "a@example.com".into(),
                to_addrs_redacted: vec![],
                subject_canonical: "s".into(),
                date_parsed: "2026-01-01".into(),
                headers_canonical: Default::default(),
                body_text_canonical: "informazioni sul contratto".into(),
                body_html_canonical: String::new(),
                body_original_hash: "h".into(),
                removed_sections: vec![],
                pii_entities: vec![],
                pipeline_version: InputPipelineVersion {
                    parser_version: "1".into(),
                    canonicalization_version: "1".into(),
                    ner_model_version: "1".into(),
                    pii_redaction_version: "1".into(),
                },
                processing_timestamp: Utc::now(),
                processing_duration_ms: 1,
            },
            candidate_keywords: vec![CandidateKeyword {
                candidate_id: "h1".into(),
                term: "contratto".into(),
                lemma: "contratto".into(),
                count: 1,
                source: "tfidf".into(),
                score: 0.9,
            }],
            dictionary_version: 1,
            config_overrides: None,
        }
    }

    fn valid_response() -> serde_json::Value {
        json!({
            "dictionaryversion": 1,
            "sentiment": {"value": "neutral", "confidence": 0.8},
            "priority": {"value": "medium", "confidence": 0.7, "signals": []},
            "topics": [{
                "labelid": "CONTRATTO",
                "confidence": 0.9,
                "keywordsintext": [{"candidateid": "h1", "lemma": "contratto", "count": 1}],
                "evidence": [{"quote": "informazioni sul contratto"}]
            }]
        })
    }

    #[test]
    fn accepts_well_formed_response() {
        assert!(validate(&valid_response(), &request()).is_ok());
    }

    #[test]
    fn rejects_dictionary_version_mismatch() {
        let mut resp = valid_response();
        resp["dictionaryversion"] = json!(2);
        let err = validate(&resp, &request()).unwrap_err();
        assert_eq!(err.stage_name(), "stage3_business_rules");
    }

    #[test]
    fn rejects_hallucinated_candidate_id() {
        let mut resp = valid_response();
        resp["topics"][0]["keywordsintext"][0]["candidateid"] = json!("fake");
        let err = validate(&resp, &request()).unwrap_err();
        match err {
            ValidationError::BusinessRule { rule_name, .. } => {
                assert_eq!(rule_name, "candidateid_exists_in_input")
            }
            _ => panic!("expected BusinessRule"),
        }
    }

    #[test]
    fn rejects_unknown_topic_label() {
        let mut resp = valid_response();
        resp["topics"][0]["labelid"] = json!("NOTAREALTOPIC");
        assert!(validate(&resp, &request()).is_err());
    }

    #[test]
    fn rejects_unknown_sentiment() {
        let mut resp = valid_response();
        resp["sentiment"]["value"] = json!("furious");
        assert!(validate(&resp, &request()).is_err());
    }
}
