//! Tool locations and LM estimation settings
//!
//! Loaded from, in increasing priority:
//! - ~/.config/qe-clean/config.toml
//! - ./qe-clean.toml, or the file passed with `--config`
//! - CLI flags and environment variables (applied by the caller)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default cdec checkout location
pub const DEFAULT_CDEC: &str = "/opt/cdec";

const DEFAULT_LM_ORDER: u32 = 4;
const DEFAULT_LM_MEMORY: &str = "80%";

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub lm: LmConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// cdec base directory; binaries not set below are found under it
    pub cdec: Option<PathBuf>,

    /// Word aligner (default: CDEC/word-aligner/fast_align)
    pub fast_align: Option<PathBuf>,

    /// LM estimator (default: CDEC/klm/lm/builder/builder)
    pub lmplz: Option<PathBuf>,

    /// ARPA to binary compiler (default: CDEC/klm/lm/build_binary)
    pub build_binary: Option<PathBuf>,

    /// LM query tool (default: CDEC/klm/lm/ngram_query)
    pub ngram_query: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct LmConfig {
    /// N-gram order
    pub order: Option<u32>,

    /// Memory budget passed to the estimator (e.g. "80%", "4G")
    pub memory: Option<String>,
}

impl Config {
    pub const FILENAME: &'static str = "qe-clean.toml";

    /// Load config from all file sources.
    ///
    /// An explicit path must exist and parse. The implicit files are
    /// optional, and a broken user config is skipped with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(user_path) = Self::user_config_path().filter(|p| p.exists()) {
            match Self::from_file(&user_path) {
                Ok(user) => config.merge(user),
                Err(e) => warn!("Ignoring user config: {:#}", e),
            }
        }

        match explicit {
            Some(path) => config.merge(Self::from_file(path)?),
            None => {
                let local = Path::new(Self::FILENAME);
                if local.exists() {
                    config.merge(Self::from_file(local)?);
                }
            }
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config `{}`", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config `{}`", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("qe-clean").join("config.toml"))
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Config) {
        let tools = other.tools;
        if tools.cdec.is_some() {
            self.tools.cdec = tools.cdec;
        }
        if tools.fast_align.is_some() {
            self.tools.fast_align = tools.fast_align;
        }
        if tools.lmplz.is_some() {
            self.tools.lmplz = tools.lmplz;
        }
        if tools.build_binary.is_some() {
            self.tools.build_binary = tools.build_binary;
        }
        if tools.ngram_query.is_some() {
            self.tools.ngram_query = tools.ngram_query;
        }
        if other.lm.order.is_some() {
            self.lm.order = other.lm.order;
        }
        if other.lm.memory.is_some() {
            self.lm.memory = other.lm.memory;
        }
    }

    /// cdec base directory, falling back to [`DEFAULT_CDEC`]
    pub fn cdec(&self) -> PathBuf {
        self.tools
            .cdec
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CDEC))
    }

    pub fn lm_order(&self) -> u32 {
        self.lm.order.unwrap_or(DEFAULT_LM_ORDER)
    }

    pub fn lm_memory(&self) -> &str {
        self.lm.memory.as_deref().unwrap_or(DEFAULT_LM_MEMORY)
    }

    /// Create the user config directory and an example config
    pub fn init_user_config() -> Result<PathBuf> {
        let config_path = Self::user_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if !config_path.exists() {
            let example = r#"# qe-clean configuration

[tools]
# cdec base directory; fast_align and the klm tools are found under it
# cdec = "/opt/cdec"

# Override individual binaries
# fast_align = "/opt/cdec/word-aligner/fast_align"
# lmplz = "/opt/kenlm/bin/lmplz"
# build_binary = "/opt/kenlm/bin/build_binary"
# ngram_query = "/opt/kenlm/bin/query"

[lm]
# order = 4
# memory = "80%"
"#;
            std::fs::write(&config_path, example)?;
        }

        Ok(config_path)
    }
}
