use crate::storage::{BackendLocal, StorageManager};
use serde::{Deserialize, Serialize};

const DEFAULT_DIMENSION: usize = 1024;
const DEFAULT_TOP_K: usize = 5;
/// Default weight of the semantic ranking in hybrid search
const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;
const DEFAULT_SNAPSHOT_FILE: &str = "vectors.bin";
/// Default embedding model requested from the remote service
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
/// Default embedding request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BATCH_SIZE: usize = 16;

/// Configuration for retrieval and ranking
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Vector dimension of the store
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Default number of results per search
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Weight of the semantic ranking in hybrid search [0.0, 1.0]
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Snapshot file name inside the data directory
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            default_top_k: DEFAULT_TOP_K,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
        }
    }
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_semantic_weight() -> f32 {
    DEFAULT_SEMANTIC_WEIGHT
}

fn default_snapshot_file() -> String {
    DEFAULT_SNAPSHOT_FILE.to_string()
}

/// Configuration for the embedding collaborators
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Remote embedding endpoint URL; local fallback only when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name requested from the remote service
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Recover from remote failures with the local hash fallback
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            fallback_enabled: true,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_fallback_enabled() -> bool {
    true
}

/// Configuration for the consistency pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Notes embedded per reindex batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&mut self) {
        if self.retrieval.dimension == 0 {
            panic!("retrieval.dimension must be greater than 0");
        }
        if self.retrieval.default_top_k == 0 {
            self.retrieval.default_top_k = 1;
        }
        if !(0.0..=1.0).contains(&self.retrieval.semantic_weight) {
            panic!(
                "retrieval.semantic_weight must be between 0.0 and 1.0, got {}",
                self.retrieval.semantic_weight
            );
        }
        if self.retrieval.snapshot_file.is_empty() {
            panic!("retrieval.snapshot_file must not be empty");
        }

        if let Some(endpoint) = &self.embedding.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                panic!("embedding.endpoint must be an http(s) URL, got '{endpoint}'");
            }
        }
        if self.embedding.timeout_secs == 0 {
            panic!("embedding.timeout_secs must be greater than 0");
        }

        if self.pipeline.batch_size == 0 {
            self.pipeline.batch_size = 1;
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = BackendLocal::new(base_path).expect("failed to open data directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("failed to write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("config unreadable"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store = match BackendLocal::new(&self.base_path) {
            Ok(store) => store,
            Err(err) => {
                log::error!("failed to open data directory: {err}");
                return;
            }
        };

        let config_str = serde_yml::to_string(&self).unwrap();
        if let Err(err) = store.write("config.yaml", config_str.as_bytes()) {
            log::error!("failed to write config: {err}");
        }
    }
}
