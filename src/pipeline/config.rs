//! Migration configuration types

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Target runtime of the generated artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetRuntime {
    /// Python with pandas and SQLAlchemy
    #[default]
    Pandas,
}

impl TargetRuntime {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pandas => "pandas",
        }
    }
}

impl fmt::Display for TargetRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TargetRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pandas" | "python" => Ok(Self::Pandas),
            _ => Err(format!("Unknown target runtime: {}", s)),
        }
    }
}

/// Settings for converting one package or a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory receiving one sub-directory of artifacts per package
    pub output_dir: PathBuf,
    /// Worker threads for batch conversion
    pub max_workers: usize,
    /// Look for `.dtsConfig` files next to each package
    pub discover_sibling_configs: bool,
    /// Override files applied after the discovered ones
    pub extra_config_files: Vec<PathBuf>,
    /// Write artifacts to disk; when false they are only returned
    pub write_artifacts: bool,
    /// Module name of the runtime helpers
    pub runtime_module: String,
    pub target: TargetRuntime,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            max_workers: 4,
            discover_sibling_configs: true,
            extra_config_files: Vec::new(),
            write_artifacts: true,
            runtime_module: "etl_runtime".to_string(),
            target: TargetRuntime::Pandas,
        }
    }
}

impl MigrationConfig {
    /// Create a new migration config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output directory
    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    /// Set the number of batch workers
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_sibling_discovery(mut self, enabled: bool) -> Self {
        self.discover_sibling_configs = enabled;
        self
    }

    /// Add an override file applied after the discovered ones
    pub fn with_extra_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_config_files.push(path.into());
        self
    }

    pub fn with_write_artifacts(mut self, write: bool) -> Self {
        self.write_artifacts = write;
        self
    }

    pub fn with_runtime_module(mut self, module: impl Into<String>) -> Self {
        self.runtime_module = module.into();
        self
    }

    pub fn with_target(mut self, target: TargetRuntime) -> Self {
        self.target = target;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be at least 1".to_string());
        }
        if self.write_artifacts && self.output_dir.as_os_str().is_empty() {
            return Err("Output directory is required when artifacts are written".to_string());
        }
        let module = self.runtime_module.trim();
        let valid_module = !module.is_empty()
            && !module.starts_with(|c: char| c.is_ascii_digit())
            && module.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_module {
            return Err(format!("Invalid runtime module name '{}'", self.runtime_module));
        }
        Ok(())
    }

    /// Load from a TOML or YAML file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read migration config {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let config: Self = match extension.as_str() {
            "toml" => toml::from_str(&text)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?,
            other => bail!("Unsupported config format '{}' for {}", other, path.display()),
        };
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid migration config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_migration_config_default() {
        let config = MigrationConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.runtime_module, "etl_runtime");
        assert!(config.discover_sibling_configs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_migration_config_builder() {
        let config = MigrationConfig::new()
            .with_output_dir("/data/out")
            .with_max_workers(2)
            .with_sibling_discovery(false)
            .with_extra_config_file("/data/prod.dtsConfig")
            .with_write_artifacts(false);
        assert_eq!(config.output_dir, PathBuf::from("/data/out"));
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.extra_config_files.len(), 1);
        assert!(!config.write_artifacts);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(MigrationConfig::new().with_max_workers(0).validate().is_err());
        assert!(MigrationConfig::new().with_runtime_module("etl-runtime").validate().is_err());
        assert!(MigrationConfig::new().with_runtime_module("1runtime").validate().is_err());
    }

    #[test]
    fn test_target_runtime_parse() {
        assert_eq!("pandas".parse::<TargetRuntime>().unwrap(), TargetRuntime::Pandas);
        assert_eq!(TargetRuntime::Pandas.to_string(), "pandas");
        assert!("spark".parse::<TargetRuntime>().is_err());
    }

    #[test]
    fn test_from_file_toml_and_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("migration.toml");
        std::fs::write(&toml_path, "output_dir = \"generated\"\nmax_workers = 8\ntarget = \"pandas\"\n").unwrap();
        let config = MigrationConfig::from_file(&toml_path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("generated"));
        assert_eq!(config.max_workers, 8);
        assert!(config.discover_sibling_configs);

        let yaml_path = temp.path().join("migration.yaml");
        std::fs::write(&yaml_path, "max_workers: 1\nwrite_artifacts: false\n").unwrap();
        let config = MigrationConfig::from_file(&yaml_path).unwrap();
        assert_eq!(config.max_workers, 1);
        assert!(!config.write_artifacts);
    }

    #[test]
    fn test_from_file_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("migration.ini");
        std::fs::write(&path, "max_workers=1").unwrap();
        assert!(MigrationConfig::from_file(&path).is_err());

        let invalid = temp.path().join("migration.toml");
        std::fs::write(&invalid, "max_workers = 0\n").unwrap();
        let err = MigrationConfig::from_file(&invalid).unwrap_err();
        assert!(format!("{:#}", err).contains("max_workers"));

        assert!(MigrationConfig::from_file(&temp.path().join("missing.toml")).is_err());
    }
}
