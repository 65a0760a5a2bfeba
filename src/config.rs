use crate::storage::{self, StorageManager};
use serde::{Deserialize, Serialize};

const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEFAULT_COMPLETION_MODEL: &str = "deepseek-chat";
const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-m3";

/// Default request timeout for completion and embedding calls, milliseconds.
const DEFAULT_AI_TIMEOUT_MS: u64 = 30_000;

/// Default similarity threshold for semantic search
const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.5;

/// Configuration for the chat completion provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Provider label, informational only (e.g. "deepseek", "openai")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key. Empty string disables completion-backed features.
    #[serde(default)]
    pub api_key: String,

    /// OpenAI-compatible base URL, without the trailing endpoint path
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Model name sent with every request
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            base_url: default_completion_base_url(),
            model: default_completion_model(),
            timeout_ms: DEFAULT_AI_TIMEOUT_MS,
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// API key. Empty string disables semantic search and embedding writes.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            timeout_ms: DEFAULT_AI_TIMEOUT_MS,
        }
    }
}

/// Admin account for the web API. The password is stored as a lowercase hex
/// SHA-256 digest, set via `blogd set-password`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password_sha256: String,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_completion_base_url() -> String {
    DEFAULT_COMPLETION_BASE_URL.to_string()
}

fn default_completion_model() -> String {
    DEFAULT_COMPLETION_MODEL.to_string()
}

fn default_embedding_base_url() -> String {
    DEFAULT_EMBEDDING_BASE_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_ai_timeout_ms() -> u64 {
    DEFAULT_AI_TIMEOUT_MS
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_semantic_threshold() -> f32 {
    DEFAULT_SEMANTIC_THRESHOLD
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Default similarity threshold for semantic search [0.0, 1.0]
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin: AdminConfig::default(),
            completion: CompletionConfig::default(),
            embedding: EmbeddingConfig::default(),
            semantic_threshold: DEFAULT_SEMANTIC_THRESHOLD,
            base_path: String::new(),
        }
    }
}

impl Config {
    fn validate(&self) {
        if !(0.0..=1.0).contains(&self.semantic_threshold) {
            panic!(
                "semantic_threshold must be between 0.0 and 1.0, got {}",
                self.semantic_threshold
            );
        }

        if self.completion.timeout_ms == 0 {
            panic!("completion.timeout_ms must be greater than 0");
        }
        if self.embedding.timeout_ms == 0 {
            panic!("embedding.timeout_ms must be greater than 0");
        }

        for (name, base_url) in [
            ("completion.base_url", &self.completion.base_url),
            ("embedding.base_url", &self.embedding.base_url),
        ] {
            if url::Url::parse(base_url).is_err() {
                panic!("{name} is not a valid url: {base_url}");
            }
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("cannot create data directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("cannot write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("cannot read config"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();
        config.apply_env_overrides();
        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    /// Environment variables win over config.yaml. The embedding key falls
    /// back to the completion key when only the latter is set.
    fn apply_env_overrides(&mut self) {
        if let Some(provider) = env_non_empty("AI_PROVIDER") {
            self.completion.provider = provider;
        }
        if let Some(key) = env_non_empty("AI_API_KEY") {
            self.completion.api_key = key;
        }
        if let Some(base_url) = env_non_empty("AI_BASE_URL") {
            self.completion.base_url = base_url;
        }
        if let Some(model) = env_non_empty("AI_MODEL") {
            self.completion.model = model;
        }
        if let Some(timeout) = env_non_empty("AI_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.completion.timeout_ms = ms,
                Err(_) => log::warn!("ignoring non-numeric AI_TIMEOUT: {timeout}"),
            }
        }

        if let Some(key) = env_non_empty("EMBEDDING_API_KEY") {
            self.embedding.api_key = key;
        } else if self.embedding.api_key.is_empty() && !self.completion.api_key.is_empty() {
            self.embedding.api_key = self.completion.api_key.clone();
        }
        if let Some(base_url) = env_non_empty("EMBEDDING_BASE_URL") {
            self.embedding.base_url = base_url;
        }
        if let Some(model) = env_non_empty("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("cannot create data directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("cannot write config");
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[cfg(test)]
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
