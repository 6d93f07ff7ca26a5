use crate::config::Config;
use crate::error::ValidationError;
use crate::models::{EmailTriageResponse, TriageRequest};
use crate::validation::{stage1, stage2, stage3, stage4, verifiers, Warning};

/// Owns the compiled schema validator; constructed once per process and
/// shared by reference across requests.
pub struct ValidationPipeline {
    validator: jsonschema::Validator,
}

impl ValidationPipeline {
    pub fn new(schema: &serde_json::Value) -> Result<Self, String> {
        Ok(Self {
            validator: stage2::build_validator(schema)?,
        })
    }

    /// Run all four stages plus the verifiers against a raw gateway
    /// response. Stages 1-3 short-circuit on the first failure; stage 4
    /// and the verifiers always run and only ever append warnings.
    #[tracing::instrument(name = "validation_stage", skip_all, fields(request_uid = %request.email.uid))]
    pub fn validate(
        &self,
        content: &str,
        request: &TriageRequest,
        config: &Config,
    ) -> Result<(EmailTriageResponse, Vec<Warning>), ValidationError> {
        let parsed = stage1::parse(content).inspect_err(|e| {
            tracing::warn!(stage = "stage1_parse", error = %e, "validation failed");
        })?;
        stage2::validate(&parsed, &self.validator).inspect_err(|e| {
            tracing::warn!(stage = "stage2_schema", error = %e, "validation failed");
        })?;
        stage3::validate(&parsed, request).inspect_err(|e| {
            tracing::warn!(stage = "stage3_business_rules", error = %e, "validation failed");
        })?;

        let response: EmailTriageResponse =
            serde_json::from_value(parsed).map_err(|e| ValidationError::JsonParse {
                message: format!("response passed schema and business rules but failed to deserialize: {e}"),
                input_prefix: content.chars().take(500).collect(),
            })?;

        let mut warnings = stage4::check(&response, config);
        warnings.extend(verifiers::run(&response, request, config));

        if !warnings.is_empty() {
            tracing::info!(warning_count = warnings.len(), "validation warnings");
        }

        Ok((response, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateKeyword, EmailDocument, InputPipelineVersion};
    use chrono::Utc;
    use serde_json::json;

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["dictionaryversion", "sentiment", "priority", "topics"],
            "properties": {
                "dictionaryversion": {"type": "integer", "minimum": 1},
                "sentiment": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["value", "confidence"],
                    "properties": {
                        "value": {"type": "string"},
                        "confidence": {"type": "number"}
                    }
                },
                "priority": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["value", "confidence", "signals"],
                    "properties": {
                        "value": {"type": "string"},
                        "confidence": {"type": "number"},
                        "signals": {"type": "array", "items": {"type": "string"}, "maxItems": 6}
                    }
                },
                "topics": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 5,
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["labelid", "confidence", "keywordsintext", "evidence"],
                        "properties": {
                            "labelid": {"type": "string"},
                            "confidence": {"type": "number"},
                            "keywordsintext": {
                                "type": "array",
                                "minItems": 1,
                                "maxItems": 15,
                                "items": {
                                    "type": "object",
                                    "additionalProperties": false,
                                    "required": ["candidateid", "lemma", "count"],
                                    "properties": {
                                        "candidateid": {"type": "string"},
                                        "lemma": {"type": "string"},
                                        "count": {"type": "integer", "minimum": 1},
                                        "spans": {"type": "array"}
                                    }
                                }
                            },
                            "evidence": {
                                "type": "array",
                                "minItems": 1,
                                "maxItems": 2,
                                "items": {
                                    "type": "object",
                                    "additionalProperties": false,
                                    "required": ["quote"],
                                    "properties": {
                                        "quote": {"type": "string", "maxLength": 200},
                                        "span": {"type": "array"}
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    fn request() -> TriageRequest {
        TriageRequest {
            email: EmailDocument {
                uid: "u1".into(),
                uidvalidity: None,
                mailbox: "INBOX".into(),
                message_id: "<m>".into(),
                fetched_at: Utc::now(),
                size: 40,
                from_addr_redacted: "a@example.com".into(),
                to_addrs_redacted: vec![],
                subject_canonical: "s".into(),
                date_parsed: "2026-01-01".into(),
                headers_canonical: Default::default(),
                body_text_canonical: "Vorrei informazioni sul contratto firmato.".into(),
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

    #[test]
    fn happy_path_yields_no_warnings() {
        let pipeline = ValidationPipeline::new(&schema()).unwrap();
        let content = r#"{
            "dictionaryversion": 1,
            "sentiment": {"value": "neutral", "confidence": 0.8},
            "priority": {"value": "medium", "confidence": 0.7, "signals": []},
            "topics": [{
                "labelid": "CONTRATTO",
                "confidence": 0.9,
                "keywordsintext": [{"candidateid": "h1", "lemma": "contratto", "count": 1}],
                "evidence": [{"quote": "informazioni sul contratto"}]
            }]
        }"#;
        let (response, warnings) = pipeline.validate(content, &request(), &Config::default()).unwrap();
        assert_eq!(response.dictionaryversion, 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn invalid_json_fails_stage1() {
        let pipeline = ValidationPipeline::new(&schema()).unwrap();
        let err = pipeline
            .validate(r#"{"broken": "#, &request(), &Config::default())
            .unwrap_err();
        assert_eq!(err.stage_name(), "stage1_parse");
    }

    #[test]
    fn hallucinated_candidate_fails_stage3() {
        let pipeline = ValidationPipeline::new(&schema()).unwrap();
        let content = r#"{
            "dictionaryversion": 1,
            "sentiment": {"value": "neutral", "confidence": 0.8},
            "priority": {"value": "medium", "confidence": 0.7, "signals": []},
            "topics": [{
                "labelid": "CONTRATTO",
                "confidence": 0.9,
                "keywordsintext": [{"candidateid": "fake", "lemma": "contratto", "count": 1}],
                "evidence": [{"quote": "informazioni sul contratto"}]
            }]
        }"#;
        let err = pipeline.validate(content, &request(), &Config::default()).unwrap_err();
        assert_eq!(err.stage_name(), "stage3_business_rules");
    }

    #[test]
    fn evidence_not_found_is_a_warning_not_a_failure() {
        let pipeline = ValidationPipeline::new(&schema()).unwrap();
        let content = r#"{
            "dictionaryversion": 1,
            "sentiment": {"value": "neutral", "confidence": 0.8},
            "priority": {"value": "medium", "confidence": 0.7, "signals": []},
            "topics": [{
                "labelid": "CONTRATTO",
                "confidence": 0.9,
                "keywordsintext": [{"candidateid": "h1", "lemma": "contratto", "count": 1}],
                "evidence": [{"quote": "This quote does not appear"}]
            }]
        }"#;
        let (_, warnings) = pipeline.validate(content, &request(), &Config::default()).unwrap();
        assert!(warnings.iter().any(|w| w.to_string().contains("evidence quote not found")));
    }
}
