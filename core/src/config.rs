use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Centralizes the "is this a test run" question so no component reads
/// `std::env` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Live,
    Test,
}

impl RuntimeMode {
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            env::var(name)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };
        if flag("TEST_MODE") || flag("SKIP_MODEL_LOAD") {
            RuntimeMode::Test
        } else {
            RuntimeMode::Live
        }
    }

    pub fn is_test(self) -> bool {
        matches!(self, RuntimeMode::Test)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_cache_mb")]
    pub cache_mb: u32,
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_cache_mb() -> u32 {
    64
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub device: Device,
}

const fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorIndexConfig {
    pub url: String,
    pub collection_name: String,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub allow_empty_collection: bool,
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: u64,
    #[serde(default)]
    pub qdrant_disabled: bool,
}

const fn default_timeout_s() -> f64 {
    0.5
}

const fn default_delta_threshold() -> u64 {
    0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub test_data_patterns: Vec<String>,
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    /// Defaults to never embedding email_summary rows; flip on once
    /// summary text is deemed worth the extra index volume.
    #[serde(default)]
    pub embed_email_summaries: bool,
}

const fn default_min_body_chars() -> usize {
    5
}

const fn default_min_year() -> i32 {
    2014
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            test_data_patterns: Vec::new(),
            min_body_chars: default_min_body_chars(),
            min_year: default_min_year(),
            embed_email_summaries: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HybridConfig {
    #[serde(default = "default_hybrid_k")]
    pub k: f64,
    #[serde(default = "default_w_semantic")]
    pub w_semantic: f64,
    #[serde(default = "default_w_keyword")]
    pub w_keyword: f64,
}

const fn default_hybrid_k() -> f64 {
    60.0
}

const fn default_w_semantic() -> f64 {
    0.7
}

const fn default_w_keyword() -> f64 {
    0.3
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            k: default_hybrid_k(),
            w_semantic: default_w_semantic(),
            w_keyword: default_w_keyword(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default = "default_exclude_source_types")]
    pub literal_default_exclude_source_types: Vec<String>,
}

fn default_exclude_source_types() -> Vec<String> {
    vec!["email_message".to_string(), "email_summary".to_string()]
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid: HybridConfig::default(),
            literal_default_exclude_source_types: default_exclude_source_types(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let builder = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("CORPUS").separator("__"));
        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.apply_env_toggles();
        Ok(config)
    }

    /// Binds the handful of bare (non-`CORPUS__`-prefixed) environment
    /// toggles callers expect — `QDRANT_DISABLED`, `ALLOW_EMPTY_COLLECTION`,
    /// `DELTA_THRESHOLD` — onto the deserialized config, the same way
    /// `RuntimeMode::from_env` reads `TEST_MODE`/`SKIP_MODEL_LOAD` right
    /// here rather than leaving every caller to re-read `std::env` itself.
    fn apply_env_toggles(&mut self) {
        if let Ok(v) = env::var("QDRANT_DISABLED") {
            self.vector_index.qdrant_disabled = parse_bool_toggle(&v);
        }
        if let Ok(v) = env::var("ALLOW_EMPTY_COLLECTION") {
            self.vector_index.allow_empty_collection = parse_bool_toggle(&v);
        }
        if let Ok(v) = env::var("DELTA_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                self.vector_index.delta_threshold = parsed;
            }
        }
    }
}

fn parse_bool_toggle(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_mode_detects_test_mode() {
        env::remove_var("TEST_MODE");
        env::remove_var("SKIP_MODEL_LOAD");
        assert_eq!(RuntimeMode::from_env(), RuntimeMode::Live);
        env::set_var("TEST_MODE", "1");
        assert_eq!(RuntimeMode::from_env(), RuntimeMode::Test);
        env::remove_var("TEST_MODE");
    }

    #[test]
    fn hybrid_defaults_match_documented_values() {
        let hybrid = HybridConfig::default();
        assert_eq!(hybrid.k, 60.0);
        assert_eq!(hybrid.w_semantic, 0.7);
        assert_eq!(hybrid.w_keyword, 0.3);
    }
}
