use serde_json::Value;

/// Configuration for LLM requests.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Enable extended thinking mode (DeepSeek R1 style `<think>` tags).
    pub thinking: bool,

    /// Request JSON format output from the model.
    pub json_mode: bool,

    /// Structural constraint (JSON Schema) for the generation, sent as
    /// Ollama's `format` field in place of the bare `"json"` string.
    /// Takes precedence over `json_mode` when present.
    pub format_schema: Option<Value>,

    /// Nucleus sampling cutoff.
    pub top_p: Option<f64>,

    /// Fixed RNG seed. The only controllable source of generation
    /// stochasticity — set this to make a run reproducible.
    pub seed: Option<i64>,

    /// Custom options merged into the Ollama options object.
    pub options: Option<Value>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            thinking: false,
            json_mode: false,
            format_schema: None,
            top_p: None,
            seed: None,
            options: None,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_thinking(mut self, enabled: bool) -> Self {
        self.thinking = enabled;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.format_schema = Some(schema);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 2048);
        assert!(!config.thinking);
        assert!(!config.json_mode);
        assert!(config.top_p.is_none());
        assert!(config.seed.is_none());
        assert!(config.options.is_none());
    }

    #[test]
    fn test_llm_config_seed_and_top_p_builders() {
        let config = LlmConfig::default().with_seed(42).with_top_p(0.9);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.top_p, Some(0.9));
    }

    #[test]
    fn test_llm_config_builder() {
        let config = LlmConfig::default()
            .with_temperature(0.3)
            .with_max_tokens(4096)
            .with_thinking(true)
            .with_json_mode(true);
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.max_tokens, 4096);
        assert!(config.thinking);
        assert!(config.json_mode);
    }

    #[test]
    fn test_llm_config_json_schema_builder() {
        let schema = serde_json::json!({"type": "object"});
        let config = LlmConfig::default().with_json_schema(schema.clone());
        assert_eq!(config.format_schema, Some(schema));
    }
}
