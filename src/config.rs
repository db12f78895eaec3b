use crate::core::models::{KeepDynamicImports, ListOptions, ResourceConfig, ResourceOptions, SkipTransform};
use crate::utils::{Logger, ModulesError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "ui5-modules.json";

/// Configuration file format (ui5-modules.json)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModulesConfig {
    /// Rebuild on every request instead of trusting the mtime
    pub skip_cache: bool,

    /// Report chunk counts at info level
    pub debug: bool,

    /// `true`, `false` or a list of packages whose dynamic imports stay split
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_dynamic_imports: Option<KeepDynamicImports>,

    /// `true`, `false` or globs of specifiers served untransformed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_transform: Option<SkipTransform>,

    /// Extra lookup roots, relative to the project root
    pub dep_paths: Vec<PathBuf>,

    /// Globs removed from package listings
    pub ignore: Vec<String>,
}

/// Flags given on the command line; each one overrides the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub skip_cache: bool,
    pub debug: bool,
    pub keep_dynamic_imports: Option<bool>,
    pub skip_transform: Option<bool>,
    pub dep_paths: Vec<PathBuf>,
    pub ignore: Vec<String>,
}

impl ModulesConfig {
    pub fn resource_config(&self) -> ResourceConfig {
        ResourceConfig {
            skip_cache: self.skip_cache,
            debug: self.debug,
            keep_dynamic_imports: self.keep_dynamic_imports.clone().unwrap_or_default(),
        }
    }

    pub fn resource_options(&self, cwd: &Path) -> ResourceOptions {
        ResourceOptions {
            cwd: cwd.to_path_buf(),
            dep_paths: self.dep_paths_from(cwd),
            skip_transform: self.skip_transform.clone().unwrap_or_default(),
        }
    }

    pub fn list_options(&self, cwd: &Path) -> ListOptions {
        ListOptions {
            cwd: cwd.to_path_buf(),
            dep_paths: self.dep_paths_from(cwd),
            ignore: self.ignore.clone(),
        }
    }

    fn dep_paths_from(&self, cwd: &Path) -> Vec<PathBuf> {
        self.dep_paths
            .iter()
            .map(|path| if path.is_absolute() { path.clone() } else { cwd.join(path) })
            .collect()
    }
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `ui5-modules.json` from the project root if it exists
    pub fn load_from_file(root: &Path) -> Result<Option<ModulesConfig>> {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));

        let content = std::fs::read_to_string(&config_path)?;
        let config: ModulesConfig = serde_json::from_str(&content)
            .map_err(|e| ModulesError::config(format!("Failed to parse {}: {}", CONFIG_FILE, e)))?;

        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(file_config: Option<ModulesConfig>, cli: CliOverrides) -> ModulesConfig {
        let mut config = file_config.unwrap_or_default();

        config.skip_cache |= cli.skip_cache;
        config.debug |= cli.debug;
        if let Some(keep) = cli.keep_dynamic_imports {
            config.keep_dynamic_imports = Some(KeepDynamicImports::All(keep));
        }
        if let Some(skip) = cli.skip_transform {
            config.skip_transform = Some(SkipTransform::All(skip));
        }
        if !cli.dep_paths.is_empty() {
            config.dep_paths = cli.dep_paths;
        }
        config.ignore.extend(cli.ignore);

        config
    }
}
