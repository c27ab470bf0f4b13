//! TOML configuration parsing and validation.
//!
//! Every section is optional: a missing file or a missing section falls
//! back to the built-in defaults, which index a handful of `/etc` files,
//! the `man1`/`man5`/`man8` manual pages and common home-directory
//! configuration, and talk to a vector service on `localhost:8000`.
//!
//! A leading `~` in any path expands to the current user's home directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::{DEFAULT_MAX_LINES, MANPAGE_MAX_LINES};
use crate::models::Category;
use crate::store::Space;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub model: ModelConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Remote vector service speaking the Chroma HTTP API.
    Chroma,
    /// Local SQLite file with brute-force search.
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    /// Chroma tenant and database that own the collection.
    pub tenant: String,
    pub database: String,
    pub collection: String,
    pub path: PathBuf,
    pub space: Space,
    pub hnsw_num_threads: Option<u32>,
    pub hnsw_construction_ef: Option<u32>,
    pub hnsw_search_ef: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Chroma,
            url: "http://localhost:8000".to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
            collection: "assis-docs".to_string(),
            path: PathBuf::from("~/.assis/assis.sqlite"),
            space: Space::L2,
            hnsw_num_threads: None,
            hnsw_construction_ef: None,
            hnsw_search_ef: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Disabled,
    Ollama,
    Local,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dims: Option<usize>,
    pub url: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            model: "all-minilm".to_string(),
            dims: None,
            url: "http://localhost:11434".to_string(),
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != EmbeddingProviderKind::Disabled
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_lines: usize,
    pub manpage_max_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            manpage_max_lines: MANPAGE_MAX_LINES,
        }
    }
}

impl ChunkingConfig {
    pub fn max_lines_for(&self, category: Category) -> usize {
        match category {
            Category::Manpage => self.manpage_max_lines,
            Category::Config | Category::Home => self.max_lines,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexingConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub prune_stale: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            batch_size: 256,
            prune_stale: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            threshold: 0.8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub command: String,
    pub args: Vec<String>,
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: "ollama".to_string(),
            args: vec![
                "run".to_string(),
                "mistral:7b-instruct-v0.3-q4_K_M".to_string(),
            ],
            system_prompt: crate::answer::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Per-category source overrides as written in `[sources.<category>]`.
///
/// Unset fields keep the category's built-in default.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourceOverrides {
    pub roots: Option<Vec<String>>,
    pub include_globs: Option<Vec<String>>,
    pub exclude_dirs: Option<Vec<String>>,
    pub max_size_bytes: Option<u64>,
    pub skip_hidden: Option<bool>,
    pub follow_symlinks: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub config: SourceOverrides,
    pub manpage: SourceOverrides,
    pub home: SourceOverrides,
}

/// Fully resolved selection settings for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub category: Category,
    pub roots: Vec<PathBuf>,
    /// Globs matched against the path relative to its root. Empty = all.
    pub include_globs: Vec<String>,
    /// Path components that exclude a file wherever they appear.
    pub exclude_dirs: Vec<String>,
    pub max_size_bytes: u64,
    pub skip_hidden: bool,
    pub follow_symlinks: bool,
}

impl SourcesConfig {
    pub fn resolve(&self, category: Category) -> SourceConfig {
        let overrides = match category {
            Category::Config => &self.config,
            Category::Manpage => &self.manpage,
            Category::Home => &self.home,
        };
        let defaults = SourceConfig::default_for(category);

        SourceConfig {
            category,
            roots: overrides
                .roots
                .as_ref()
                .map(|roots| roots.iter().map(|r| expand_home(r)).collect())
                .unwrap_or(defaults.roots),
            include_globs: overrides
                .include_globs
                .clone()
                .unwrap_or(defaults.include_globs),
            exclude_dirs: overrides
                .exclude_dirs
                .clone()
                .unwrap_or(defaults.exclude_dirs),
            max_size_bytes: overrides.max_size_bytes.unwrap_or(defaults.max_size_bytes),
            skip_hidden: overrides.skip_hidden.unwrap_or(defaults.skip_hidden),
            follow_symlinks: overrides
                .follow_symlinks
                .unwrap_or(defaults.follow_symlinks),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SourceConfig {
    pub fn default_for(category: Category) -> Self {
        match category {
            Category::Config => Self {
                category,
                roots: [
                    "/etc/fstab",
                    "/etc/hostname",
                    "/etc/pacman.conf",
                    "/etc/resolv.conf",
                    "/etc/systemd/system.conf",
                ]
                .iter()
                .map(PathBuf::from)
                .collect(),
                include_globs: Vec::new(),
                exclude_dirs: Vec::new(),
                max_size_bytes: 100 * 1024,
                skip_hidden: true,
                follow_symlinks: false,
            },
            Category::Manpage => Self {
                category,
                roots: vec![PathBuf::from("/usr/share/man")],
                include_globs: strings(&["man1/*.gz", "man5/*.gz", "man8/*.gz"]),
                exclude_dirs: Vec::new(),
                max_size_bytes: 500 * 1024,
                skip_hidden: false,
                follow_symlinks: false,
            },
            Category::Home => Self {
                category,
                roots: [
                    "~/.config",
                    "~/.local/share",
                    "~/.bashrc",
                    "~/.zshrc",
                    "~/.profile",
                    "~/.xinitrc",
                    "~/.Xresources",
                ]
                .iter()
                .map(|r| expand_home(r))
                .collect(),
                include_globs: Vec::new(),
                exclude_dirs: strings(&[
                    ".cache",
                    ".cargo",
                    ".mozilla",
                    ".npm",
                    ".steam",
                    "BraveSoftware",
                    "chromium",
                    "Code",
                    "teams-for-linux",
                    "rambox",
                ]),
                max_size_bytes: 100 * 1024,
                skip_hidden: true,
                follow_symlinks: false,
            },
        }
    }
}

/// Expand a leading `~` to the home directory. Other paths pass through.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Location used when `--config` is not given: `~/.assis/assis.toml`.
pub fn default_config_path() -> PathBuf {
    expand_home("~/.assis/assis.toml")
}

/// Load configuration from `path`, or the defaults if the file is absent.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.store.path = expand_home(&config.store.path.to_string_lossy());
    validate(&config)?;
    Ok(config)
}

/// Parse TOML text into a [`Config`] without touching the filesystem.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_lines == 0 {
        bail!("chunking.max_lines must be > 0");
    }
    if config.chunking.manpage_max_lines == 0 {
        bail!("chunking.manpage_max_lines must be > 0");
    }

    if config.indexing.workers == 0 {
        bail!("indexing.workers must be > 0");
    }
    if config.indexing.batch_size == 0 {
        bail!("indexing.batch_size must be > 0");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !config.retrieval.threshold.is_finite() || config.retrieval.threshold < 0.0 {
        bail!("retrieval.threshold must be a finite number >= 0");
    }

    if config.embedding.is_enabled() && config.embedding.model.trim().is_empty() {
        bail!("embedding.model must be specified when an embedding provider is enabled");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    if config.store.collection.trim().is_empty() {
        bail!("store.collection must not be empty");
    }
    if config.store.tenant.trim().is_empty() || config.store.database.trim().is_empty() {
        bail!("store.tenant and store.database must not be empty");
    }

    if config.model.command.trim().is_empty() {
        bail!("model.command must not be empty");
    }

    Ok(())
}
