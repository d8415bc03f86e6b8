//! Lightweight configuration loader, typed retrieval settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__GUARD__THRESHOLD=0.5`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::default("retrieval", RetrievalConfig::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => tracing::debug!(env = %env_name, "no environment-specific config file"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed `retrieval` section, validated.
    pub fn retrieval(&self) -> anyhow::Result<RetrievalConfig> {
        let cfg: RetrievalConfig = self.get("retrieval")?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned to the caller.
    pub top_k: usize,
    pub corpus: CorpusConfig,
    pub fast_path: FastPathConfig,
    pub expansion: ExpansionConfig,
    pub fusion: FusionConfig,
    pub rerank: RerankConfig,
    pub guard: GuardConfig,
    pub vector: VectorConfig,
    pub llm: LlmConfig,
    pub themes: Vec<ThemeRuleConfig>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            corpus: CorpusConfig::default(),
            fast_path: FastPathConfig::default(),
            expansion: ExpansionConfig::default(),
            fusion: FusionConfig::default(),
            rerank: RerankConfig::default(),
            guard: GuardConfig::default(),
            vector: VectorConfig::default(),
            llm: LlmConfig::default(),
            themes: Vec::new(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> crate::Result<()> {
        let weights = [
            ("fusion.lexical_weight", self.fusion.lexical_weight),
            ("fusion.vector_weight", self.fusion.vector_weight),
            ("fusion.jump_boost", self.fusion.jump_boost),
            ("rerank.theme_match_bonus", self.rerank.theme_match_bonus),
            ("rerank.alias_bonus", self.rerank.alias_bonus),
            ("fast_path.hit_score", self.fast_path.hit_score),
            ("fast_path.theme_default_score", self.fast_path.theme_default_score),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        if !(0.0..=1.0).contains(&self.rerank.classifier_weight) {
            return Err(Error::InvalidConfig(format!(
                "rerank.classifier_weight must be within [0, 1], got {}",
                self.rerank.classifier_weight
            )));
        }
        if !self.guard.threshold.is_finite() {
            return Err(Error::InvalidConfig("guard.threshold must be finite".into()));
        }
        if self.expansion.max_variants == 0 {
            return Err(Error::InvalidConfig("expansion.max_variants must be at least 1".into()));
        }
        for rule in &self.themes {
            if rule.topic.trim().is_empty() {
                return Err(Error::InvalidConfig("theme rule without topic".into()));
            }
            if !rule.weight.is_finite() {
                return Err(Error::InvalidConfig(format!("theme '{}' has a non-finite weight", rule.topic)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub dir: String,
    /// Bodies shorter than this (in characters) are skipped unless they carry
    /// a phone number, price or percentage.
    pub min_body_chars: usize,
    /// Extra file names treated as navigation/alias indices.
    pub skip_files: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self { dir: "knowledge".to_string(), min_body_chars: 400, skip_files: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastPathConfig {
    pub enabled: bool,
    pub min_substring_chars: usize,
    pub hit_score: f32,
    pub theme_default_score: f32,
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self { enabled: true, min_substring_chars: 3, hit_score: 1.0, theme_default_score: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Upper bound on variants, the original query included.
    pub max_variants: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self { enabled: true, timeout_ms: 3000, max_variants: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub lexical_weight: f32,
    pub vector_weight: f32,
    /// Hits requested from each engine per query variant.
    pub search_top_n: usize,
    pub enable_theme_boost: bool,
    pub jump_boost: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { lexical_weight: 0.6, vector_weight: 0.4, search_top_n: 20, enable_theme_boost: true, jump_boost: 0.3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub top_n: usize,
    pub classifier_weight: f32,
    pub timeout_ms: u64,
    pub theme_match_bonus: f32,
    pub alias_bonus: f32,
    pub keyword_bonuses: Vec<KeywordBonus>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n: 6,
            classifier_weight: 0.7,
            timeout_ms: 5000,
            theme_match_bonus: 0.2,
            alias_bonus: 0.1,
            keyword_bonuses: Vec::new(),
        }
    }
}

/// Fires when the normalized query contains any of `query_terms` and the
/// candidate either has `topic` or contains one of `text_terms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordBonus {
    pub query_terms: Vec<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub text_terms: Vec<String>,
    pub bonus: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub threshold: f32,
    /// How many ranked candidates contribute to the confidence.
    pub top_n: usize,
    pub missing_score_confidence: f32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self { threshold: 0.35, top_n: 3, missing_score_confidence: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackendKind {
    #[default]
    Auto,
    Lance,
    BruteForce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackendKind,
    pub embed_timeout_ms: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { backend: VectorBackendKind::Auto, embed_timeout_ms: 2000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub paraphrase_temperature: f32,
    pub rerank_temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            paraphrase_temperature: 0.3,
            rerank_temperature: 0.1,
            max_tokens: 150,
            timeout_ms: 8000,
        }
    }
}

fn default_theme_weight() -> f32 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeRuleConfig {
    pub topic: String,
    /// Case-insensitive regex matched against the raw query.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_theme_weight")]
    pub weight: f32,
    #[serde(default)]
    pub default_target: Option<DefaultTarget>,
}

/// Chunk served by the theme-default fast path. Without `section_id` the
/// first chunk of `file` is used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultTarget {
    pub file: String,
    #[serde(default)]
    pub section_id: Option<String>,
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
