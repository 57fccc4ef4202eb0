//! Build configuration, loaded from YAML
//!
//! ```yaml
//! wiki_name: lotm
//! sections:
//!   - kind: characters
//!     cadence: { personality: 5 }
//!   - kind: settings
//!     name: Places
//! agent:
//!   command: ./bin/agent
//!   args: ["--model", "large"]
//!   timeout_secs: 120
//! retry: { max_attempts: 10, initial_backoff_ms: 500 }
//! context: { window: 5 }
//! ingest: { chunk_words: 2000 }
//! checkpoint_every: 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::context::{RunningContext, DEFAULT_MAX_SUMMARY_CHARS, DEFAULT_WINDOW};
use crate::processor::RetryPolicy;
use crate::wiki::{KnowledgeTree, Section, SectionKind, WikiError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("section '{section}': cadence for '{attribute}' must be at least 1")]
    ZeroCadence { section: String, attribute: String },

    #[error("section '{section}' has no attribute '{attribute}'")]
    UnknownAttribute { section: String, attribute: String },

    #[error("duplicate section name '{0}'")]
    DuplicateSection(String),

    #[error("sections '{first}' and '{second}' are both {kind}; each kind may appear once")]
    DuplicateKind {
        kind: SectionKind,
        first: String,
        second: String,
    },

    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("context.window must be at least 1")]
    ZeroWindow,

    #[error("ingest.chunk_words must be at least 1")]
    ZeroChunkWords,

    #[error(transparent)]
    Wiki(#[from] WikiError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    pub kind: SectionKind,
    /// Defaults to the kind's name ("Characters", "Settings")
    #[serde(default)]
    pub name: Option<String>,
    /// Per-attribute `update_every_n_insertions` overrides
    #[serde(default)]
    pub cadence: BTreeMap<String, u32>,
}

impl SectionConfig {
    pub fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            name: None,
            cadence: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.default_name())
    }
}

/// Subprocess agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub window: usize,
    pub max_summary_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_summary_chars: DEFAULT_MAX_SUMMARY_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_words: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { chunk_words: 2000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub wiki_name: String,
    pub sections: Vec<SectionConfig>,
    pub agent: AgentConfig,
    pub retry: RetryConfig,
    pub context: ContextConfig,
    pub ingest: IngestConfig,
    /// Chunks between store checkpoints; 0 saves only at the end
    pub checkpoint_every: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            wiki_name: "wiki".to_string(),
            sections: SectionKind::ALL.iter().copied().map(SectionConfig::new).collect(),
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
            context: ContextConfig::default(),
            ingest: IngestConfig::default(),
            checkpoint_every: 10,
        }
    }
}

impl BuildConfig {
    /// Read, parse and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.context.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.ingest.chunk_words == 0 {
            return Err(ConfigError::ZeroChunkWords);
        }

        let mut names = HashSet::new();
        let mut kinds: HashMap<SectionKind, &str> = HashMap::new();
        for section in &self.sections {
            let name = section.name();
            if !names.insert(name) {
                return Err(ConfigError::DuplicateSection(name.to_string()));
            }
            if let Some(first) = kinds.insert(section.kind, name) {
                return Err(ConfigError::DuplicateKind {
                    kind: section.kind,
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }

            let template = section.kind.template();
            for (attribute, &n) in &section.cadence {
                if !template.iter().any(|a| a.name() == attribute) {
                    return Err(ConfigError::UnknownAttribute {
                        section: name.to_string(),
                        attribute: attribute.clone(),
                    });
                }
                if n == 0 {
                    return Err(ConfigError::ZeroCadence {
                        section: name.to_string(),
                        attribute: attribute.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// An empty tree with the configured sections and cadences.
    pub fn build_tree(&self) -> Result<KnowledgeTree, ConfigError> {
        let mut tree = KnowledgeTree::new(&self.wiki_name);
        for sc in &self.sections {
            let mut section = Section::new(sc.name(), sc.kind);
            for (attribute, &n) in &sc.cadence {
                section = section.with_cadence(attribute, n);
            }
            tree.add_section(section)?;
        }
        Ok(tree)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            backoff_multiplier: self.retry.multiplier,
            timeout: Duration::from_secs(self.agent.timeout_secs.max(1)),
        }
    }

    pub fn running_context(&self) -> RunningContext {
        RunningContext::new(self.context.window, self.context.max_summary_chars)
    }
}
