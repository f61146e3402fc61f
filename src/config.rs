//! TOML configuration.
//!
//! Everything both workflow stages need is read once at process start into a
//! [`Config`] and passed by reference. Only `[document].path` is required;
//! every other field has a default matching the reference deployment
//! (500/100 character chunks, `text-embedding-3-large` at 3072 dims, top-5
//! retrieval filtered to `zh-CN`, `gpt-4o-mini` for generation).
//!
//! ```toml
//! [document]
//! path = "data/policy.pdf"
//!
//! [retrieval]
//! top_k = 5
//! language = "zh-CN"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub document: DocumentConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    pub path: PathBuf,
}

/// Splitter settings. Lengths are counted in characters, not bytes or
/// tokens, so mixed CJK/Latin text is measured consistently.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Highest priority first.
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_separators() -> Vec<String> {
    [
        "\n\n", "\n", "。", ".", "！", "!", "？", "?", ";", "；",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Tags attached to every chunk at index-build time.
#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    #[serde(default = "default_chunk_type")]
    pub chunk_type: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            chunk_type: default_chunk_type(),
            language: default_language(),
            source: default_source(),
        }
    }
}

fn default_chunk_type() -> String {
    "insurance_policy".to_string()
}
fn default_language() -> String {
    "zh-CN".to_string()
}
fn default_source() -> String {
    "FortuneXtra_Savings_Plan".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: default_openai_base_url(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_dims() -> usize {
    3072
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Only chunks tagged with this language are eligible.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            language: default_language(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Returned verbatim when retrieval finds nothing to ground an answer on.
    #[serde(default = "default_no_context_answer")]
    pub no_context_answer: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            base_url: default_openai_base_url(),
            temperature: None,
            timeout_secs: default_timeout_secs(),
            no_context_answer: default_no_context_answer(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_no_context_answer() -> String {
    "抱歉，保单文件中没有找到与您的问题相关的信息。\
     No relevant information was found in the policy document."
        .to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkflowConfig {
    /// Reuse a successfully built index across requests instead of
    /// rebuilding it for every question.
    #[serde(default)]
    pub cache_index: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:4111".to_string()
}

impl Config {
    /// All-defaults configuration for the given source document.
    pub fn from_document(path: impl Into<PathBuf>) -> Self {
        Self {
            document: DocumentConfig { path: path.into() },
            chunking: ChunkingConfig::default(),
            metadata: MetadataConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            workflow: WorkflowConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.chunking.separators.iter().any(|s| s.is_empty()) {
            bail!("chunking.separators must not contain empty strings");
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.language.trim().is_empty() {
            bail!("retrieval.language must not be empty");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.trim().is_empty() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.generation.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_reference_defaults() {
        let config: Config = toml::from_str("[document]\npath = \"policy.pdf\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.chunking.separators[0], "\n\n");
        assert_eq!(config.chunking.separators.len(), 10);
        assert_eq!(config.embedding.model, "text-embedding-3-large");
        assert_eq!(config.embedding.dims, 3072);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.language, "zh-CN");
        assert_eq!(config.metadata.language, "zh-CN");
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert!(!config.workflow.cache_index);
        config.validate().unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut config = Config::from_document("policy.pdf");
        config.chunking.chunk_overlap = 500;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let mut config = Config::from_document("policy.pdf");
        config.embedding.provider = "cohere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_separator_rejected() {
        let mut config = Config::from_document("policy.pdf");
        config.chunking.separators.push(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_reads_overrides() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("faq.toml");
        std::fs::write(
            &path,
            r#"
[document]
path = "policy.txt"

[chunking]
chunk_size = 200
chunk_overlap = 20

[retrieval]
top_k = 3

[workflow]
cache_index = true
"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 200);
        assert_eq!(config.retrieval.top_k, 3);
        assert!(config.workflow.cache_index);
    }

    #[test]
    fn missing_config_file_has_context() {
        let err = load_config(Path::new("/nonexistent/faq.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
