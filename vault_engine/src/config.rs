//! Engine settings from `vault.toml`.
//!
//! Every field has a default, so a partial file is fine and a missing or
//! broken one falls back to the defaults with a warning.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;

/// Default settings file looked for in the working directory.
pub const CONFIG_FILE: &str = "vault.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest allowed nesting of script calls into the host.
    pub max_call_depth: usize,
    /// Interpreter memory ceiling in KB; 0 disables it.
    pub memory_limit_kb: usize,
    /// Instructions one top-level chunk call may execute; 0 disables it.
    pub instruction_budget: u64,
    /// How many instructions run between budget checks.
    pub hook_interval: u32,
    /// RON catalog replacing the built-in one.
    pub catalog: Option<PathBuf>,
    /// Where `vault cache` writes index and data files.
    pub cache_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 100,
            memory_limit_kb: 6 * 1024,
            instruction_budget: 10_000_000,
            hook_interval: 1000,
            catalog: None,
            cache_dir: PathBuf::from("des_cache"),
        }
    }
}

impl EngineConfig {
    /// The configured catalog, or the built-in one.
    ///
    /// # Errors
    /// Fails if the catalog file cannot be loaded or does not validate.
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => Catalog::load(path),
            None => Catalog::builtin(),
        }
    }
}

/// Load settings, falling back to defaults if the file is missing or invalid.
pub fn load_config(toml_path: &Path) -> EngineConfig {
    match try_load_config(toml_path) {
        Ok(config) => {
            info!("engine settings loaded from '{}'", toml_path.display());
            config
        },
        Err(e) => {
            warn!(
                "Could not load engine settings from '{}': {e:#}. Using defaults.",
                toml_path.display()
            );
            EngineConfig::default()
        },
    }
}

/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn try_load_config(toml_path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(toml_path)
        .with_context(|| format!("reading engine settings from '{}'", toml_path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing engine settings from '{}'", toml_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_files_keep_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "max_call_depth = 8\ncache_dir = \"out\"")?;
        let config = try_load_config(file.path())?;
        assert_eq!(config.max_call_depth, 8);
        assert_eq!(config.cache_dir, PathBuf::from("out"));
        assert_eq!(config.instruction_budget, EngineConfig::default().instruction_budget);
        Ok(())
    }

    #[test]
    fn broken_files_fall_back() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "max_call_depth = \"lots\"")?;
        assert!(try_load_config(file.path()).is_err());
        assert_eq!(load_config(file.path()), EngineConfig::default());
        assert_eq!(load_config(Path::new("/no/such/vault.toml")), EngineConfig::default());
        Ok(())
    }
}
