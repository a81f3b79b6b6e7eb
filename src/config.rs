use anyhow::{bail, Context, Result};
use refguard_protocol::GIT_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::trust::{MetadataLayout, TrustPolicy, DEFAULT_METADATA_PATH, DEFAULT_METADATA_REF};

pub const GLOBAL_CONFIG_FILE: &str = ".refguard.toml";
pub const REPO_CONFIG_FILE: &str = "refguard.toml";

/// How objects are read from the repository.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    #[serde(rename = "libgit2")]
    Libgit2,
    #[serde(rename = "cli")]
    Cli,
}

/// One config file on disk (`~/.refguard.toml` or `<GIT_DIR>/refguard.toml`).
/// Unknown keys are an error: a misspelt key must not silently fall back
/// to a default policy.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub trust_policy: Option<TrustPolicy>,

    #[serde(default)]
    pub metadata_ref: Option<String>,

    #[serde(default)]
    pub metadata_path: Option<String>,

    #[serde(default)]
    pub backend: Option<Backend>,

    #[serde(default)]
    pub parallel: Option<bool>,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Some(config))
    }

    /// Fields set in `self` win over those in `base`.
    fn over(self, base: FileConfig) -> FileConfig {
        FileConfig {
            namespace: self.namespace.or(base.namespace),
            trust_policy: self.trust_policy.or(base.trust_policy),
            metadata_ref: self.metadata_ref.or(base.metadata_ref),
            metadata_path: self.metadata_path.or(base.metadata_path),
            backend: self.backend.or(base.backend),
            parallel: self.parallel.or(base.parallel),
            log_level: self.log_level.or(base.log_level),
        }
    }
}

/// Merged configuration (repo > global > defaults)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub namespace: String,
    pub trust_policy: TrustPolicy,
    pub metadata_ref: String,
    pub metadata_path: String,
    pub backend: Backend,
    pub parallel: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(FileConfig::default())
    }
}

impl Config {
    /// Load `~/.refguard.toml` and, when a git dir is known,
    /// `<git_dir>/refguard.toml`.
    pub fn load(git_dir: Option<&Path>) -> Result<Self> {
        let global = Self::global_path();
        let repo = git_dir.map(|dir| dir.join(REPO_CONFIG_FILE));
        Self::load_from(global.as_deref(), repo.as_deref())
    }

    pub fn load_from(global: Option<&Path>, repo: Option<&Path>) -> Result<Self> {
        let global = match global {
            Some(path) => FileConfig::read(path).context("Failed to load global config")?,
            None => None,
        };
        let repo = match repo {
            Some(path) => FileConfig::read(path).context("Failed to load repository config")?,
            None => None,
        };

        let merged = repo
            .unwrap_or_default()
            .over(global.unwrap_or_default());
        let config = Self::merge(merged);
        config.validate()?;
        Ok(config)
    }

    fn global_path() -> Option<PathBuf> {
        let mut path = dirs::home_dir()?;
        path.push(GLOBAL_CONFIG_FILE);
        Some(path)
    }

    fn merge(file: FileConfig) -> Self {
        Self {
            namespace: file.namespace.unwrap_or_else(|| GIT_NAMESPACE.to_string()),
            trust_policy: file.trust_policy.unwrap_or_default(),
            metadata_ref: file
                .metadata_ref
                .unwrap_or_else(|| DEFAULT_METADATA_REF.to_string()),
            metadata_path: file
                .metadata_path
                .unwrap_or_else(|| DEFAULT_METADATA_PATH.to_string()),
            backend: file.backend.unwrap_or_default(),
            parallel: file.parallel.unwrap_or(false),
            log_level: file.log_level.unwrap_or_else(|| "info".to_string()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            bail!("namespace must not be empty");
        }
        if self.metadata_ref.is_empty() || self.metadata_ref.contains('/') {
            bail!(
                "metadata_ref must be a single ref segment, got {:?}",
                self.metadata_ref
            );
        }
        if self.metadata_path.is_empty() || self.metadata_path.starts_with('/') {
            bail!(
                "metadata_path must be a relative path, got {:?}",
                self.metadata_path
            );
        }
        if let Err(e) = EnvFilter::try_new(&self.log_level) {
            bail!("invalid log_level {:?}: {e}", self.log_level);
        }
        Ok(())
    }

    pub fn metadata_layout(&self) -> MetadataLayout {
        MetadataLayout {
            reference_segment: self.metadata_ref.clone(),
            path: self.metadata_path.clone(),
        }
    }
}
