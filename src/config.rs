//! Runtime configuration, loaded from `TRIAGE_`-prefixed environment
//! variables with the defaults `spec.md` §6 enumerates.
//!
//! Collaborator-specific settings (database URL, task-queue broker URL,
//! metrics port) belong to the surface that embeds this core, not to the
//! core itself, and are not modeled here.

use std::env;
use std::time::Duration;

/// Application settings for the triage core.
#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_timeout: Duration,
    pub fallback_models: Vec<String>,

    pub temperature: f64,
    pub max_tokens: u32,

    pub body_truncation_limit: usize,
    pub candidate_top_n: usize,
    pub shrink_body_limit: usize,
    pub shrink_top_n: usize,

    pub max_retries: u32,
    pub retry_backoff_base: f64,

    pub redact_for_llm: bool,
    pub redact_for_storage: bool,

    pub result_ttl_seconds: u64,
    pub dlq_max_entries: usize,

    pub min_confidence_warning_threshold: f64,
    pub enable_evidence_presence_check: bool,
    pub enable_keyword_presence_check: bool,

    pub batch_max_size: usize,

    pub dictionary_version: u32,
    pub inference_layer_version: String,
    pub schema_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "qwen2.5:7b".to_string(),
            ollama_timeout: Duration::from_secs(60),
            fallback_models: Vec::new(),

            temperature: 0.1,
            max_tokens: 2048,

            body_truncation_limit: 8000,
            candidate_top_n: 100,
            shrink_body_limit: 4000,
            shrink_top_n: 50,

            max_retries: 3,
            retry_backoff_base: 2.0,

            redact_for_llm: false,
            redact_for_storage: true,

            result_ttl_seconds: 86_400,
            dlq_max_entries: 10_000,

            min_confidence_warning_threshold: 0.2,
            enable_evidence_presence_check: true,
            enable_keyword_presence_check: true,

            batch_max_size: 100,

            dictionary_version: 1,
            inference_layer_version: "0.1.0".to_string(),
            schema_version: "email_triage_v2".to_string(),
        }
    }
}

impl Config {
    /// Load settings from `TRIAGE_*` environment variables, falling back
    /// to [`Config::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_string("TRIAGE_OLLAMA_BASE_URL") {
            cfg.ollama_base_url = v;
        }
        if let Some(v) = env_string("TRIAGE_OLLAMA_MODEL") {
            cfg.ollama_model = v;
        }
        if let Some(v) = env_u64("TRIAGE_OLLAMA_TIMEOUT_SECS") {
            cfg.ollama_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_string("TRIAGE_FALLBACK_MODELS") {
            cfg.fallback_models = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = env_f64("TRIAGE_TEMPERATURE") {
            cfg.temperature = v;
        }
        if let Some(v) = env_u32("TRIAGE_MAX_TOKENS") {
            cfg.max_tokens = v;
        }
        if let Some(v) = env_usize("TRIAGE_BODY_TRUNCATION_LIMIT") {
            cfg.body_truncation_limit = v;
        }
        if let Some(v) = env_usize("TRIAGE_CANDIDATE_TOP_N") {
            cfg.candidate_top_n = v;
        }
        if let Some(v) = env_usize("TRIAGE_SHRINK_BODY_LIMIT") {
            cfg.shrink_body_limit = v;
        }
        if let Some(v) = env_usize("TRIAGE_SHRINK_TOP_N") {
            cfg.shrink_top_n = v;
        }
        if let Some(v) = env_u32("TRIAGE_MAX_RETRIES") {
            cfg.max_retries = v;
        }
        if let Some(v) = env_f64("TRIAGE_RETRY_BACKOFF_BASE") {
            cfg.retry_backoff_base = v;
        }
        if let Some(v) = env_bool("TRIAGE_REDACT_FOR_LLM") {
            cfg.redact_for_llm = v;
        }
        if let Some(v) = env_bool("TRIAGE_REDACT_FOR_STORAGE") {
            cfg.redact_for_storage = v;
        }
        if let Some(v) = env_u64("TRIAGE_RESULT_TTL_SECONDS") {
            cfg.result_ttl_seconds = v;
        }
        if let Some(v) = env_usize("TRIAGE_DLQ_MAX_ENTRIES") {
            cfg.dlq_max_entries = v;
        }
        if let Some(v) = env_f64("TRIAGE_MIN_CONFIDENCE_WARNING_THRESHOLD") {
            cfg.min_confidence_warning_threshold = v;
        }
        if let Some(v) = env_bool("TRIAGE_ENABLE_EVIDENCE_PRESENCE_CHECK") {
            cfg.enable_evidence_presence_check = v;
        }
        if let Some(v) = env_bool("TRIAGE_ENABLE_KEYWORD_PRESENCE_CHECK") {
            cfg.enable_keyword_presence_check = v;
        }
        if let Some(v) = env_usize("TRIAGE_BATCH_MAX_SIZE") {
            cfg.batch_max_size = v;
        }
        if let Some(v) = env_u32("TRIAGE_DICTIONARY_VERSION") {
            cfg.dictionary_version = v;
        }
        if let Some(v) = env_string("TRIAGE_INFERENCE_LAYER_VERSION") {
            cfg.inference_layer_version = v;
        }
        if let Some(v) = env_string("TRIAGE_SCHEMA_VERSION") {
            cfg.schema_version = v;
        }

        cfg
    }

    /// Resolve `(bodyCharLimit, topN)` for a given assembler mode.
    pub fn limits_for(&self, shrink_mode: bool) -> (usize, usize) {
        if shrink_mode {
            (self.shrink_body_limit, self.shrink_top_n)
        } else {
            (self.body_truncation_limit, self.candidate_top_n)
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|s| s.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_string(key).and_then(|s| s.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_string(key).and_then(|s| s.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_string(key).and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).and_then(|s| match s.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_configuration_table() {
        let cfg = Config::default();
        assert_eq!(cfg.body_truncation_limit, 8000);
        assert_eq!(cfg.shrink_body_limit, 4000);
        assert_eq!(cfg.candidate_top_n, 100);
        assert_eq!(cfg.shrink_top_n, 50);
        assert_eq!(cfg.temperature, 0.1);
        assert_eq!(cfg.max_tokens, 2048);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_backoff_base, 2.0);
        assert!(cfg.fallback_models.is_empty());
        assert!(!cfg.redact_for_llm);
        assert!(cfg.redact_for_storage);
        assert_eq!(cfg.result_ttl_seconds, 86_400);
        assert_eq!(cfg.dlq_max_entries, 10_000);
        assert_eq!(cfg.min_confidence_warning_threshold, 0.2);
        assert_eq!(cfg.batch_max_size, 100);
    }

    #[test]
    fn limits_for_mode_selects_shrink_or_normal() {
        let cfg = Config::default();
        assert_eq!(cfg.limits_for(false), (8000, 100));
        assert_eq!(cfg.limits_for(true), (4000, 50));
    }
}
