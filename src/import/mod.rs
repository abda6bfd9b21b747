//! Import functionality
//!
//! Provides the readers for the two input formats:
//! - `.dtsx` packages (connection managers, variables, data flows, tasks)
//! - `.dtsConfig` override files
//!
//! plus discovery of the override files that apply to a package.

pub mod dataflow;
pub mod dtsconfig;
pub mod dtsx;
pub mod xml;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ConfigResolutionError, Diagnostic};
use crate::models::{ConfigFile, PackageModel};

pub use dataflow::ComponentExtractor;
pub use dtsconfig::ConfigImporter;
pub use dtsx::{DtsxImporter, ImportOutcome};
pub use xml::{NsAlias, XmlDocument, XmlElement};

/// Locates and reads the override files that apply to a package
///
/// Files are returned in application order (later entries win):
/// 1. XML configurations declared by the package,
/// 2. `<stem>.dtsConfig` next to the package,
/// 3. `package.dtsConfig` next to the package,
/// 4. any other `*.dtsConfig` in that directory, by file name,
/// 5. explicitly supplied files.
#[derive(Debug, Clone)]
pub struct ConfigDiscovery {
    discover_siblings: bool,
    extra_files: Vec<PathBuf>,
    importer: ConfigImporter,
}

impl Default for ConfigDiscovery {
    fn default() -> Self {
        Self {
            discover_siblings: true,
            extra_files: Vec::new(),
            importer: ConfigImporter::new(),
        }
    }
}

impl ConfigDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sibling_discovery(mut self, enabled: bool) -> Self {
        self.discover_siblings = enabled;
        self
    }

    pub fn with_extra_files(mut self, files: Vec<PathBuf>) -> Self {
        self.extra_files = files;
        self
    }

    /// Candidate paths in application order, deduplicated
    pub fn candidates(&self, package_path: &Path, model: &PackageModel) -> (Vec<PathBuf>, Vec<Diagnostic>) {
        let directory = package_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut diagnostics = Vec::new();
        let mut ordered = Vec::new();

        for declared in &model.declared_configurations {
            if !declared.is_xml_file() {
                let error = ConfigResolutionError::UnsupportedConfigurationType {
                    name: declared.name.clone(),
                    kind: declared.configuration_type,
                    source_string: declared.configuration_string.clone(),
                };
                warn!(configuration = %declared.name, "{}", error);
                diagnostics.push(error.into());
                continue;
            }
            match locate_declared(&directory, &declared.configuration_string) {
                Some(path) => ordered.push(path),
                None => {
                    let error = ConfigResolutionError::UnreadableFile {
                        path: PathBuf::from(&declared.configuration_string),
                        message: format!("declared configuration '{}' not found", declared.name),
                    };
                    warn!(configuration = %declared.name, "{}", error);
                    diagnostics.push(error.into());
                }
            }
        }

        if self.discover_siblings {
            ordered.extend(sibling_configs(&directory, package_path));
        }
        ordered.extend(self.extra_files.iter().cloned());

        let mut seen = HashSet::new();
        let unique = ordered
            .into_iter()
            .filter(|p| seen.insert(fs::canonicalize(p).unwrap_or_else(|_| p.clone())))
            .collect();
        (unique, diagnostics)
    }

    /// Read every candidate; unreadable files become diagnostics and are skipped
    pub fn load(&self, package_path: &Path, model: &PackageModel) -> (Vec<ConfigFile>, Vec<Diagnostic>) {
        let (candidates, mut diagnostics) = self.candidates(package_path, model);
        let mut files = Vec::with_capacity(candidates.len());
        for path in candidates {
            match self.importer.import_file(&path) {
                Ok(file) => files.push(file),
                Err(error) => {
                    warn!(path = %path.display(), "{}", error);
                    diagnostics.push(error.into());
                }
            }
        }
        debug!(package = %package_path.display(), files = files.len(), "Discovered configuration files");
        (files, diagnostics)
    }
}

/// Resolve a declared configuration string relative to the package directory
///
/// Designer-authored strings are often absolute Windows paths; when such a
/// path does not exist, the file name is looked up next to the package.
fn locate_declared(directory: &Path, configuration_string: &str) -> Option<PathBuf> {
    let raw = configuration_string.trim().trim_matches('"');
    if raw.is_empty() {
        return None;
    }
    let direct = Path::new(raw);
    let candidate = if direct.is_absolute() {
        direct.to_path_buf()
    } else {
        directory.join(raw.replace('\\', "/"))
    };
    if candidate.is_file() {
        return Some(candidate);
    }
    let file_name = raw.rsplit(['\\', '/']).next()?;
    let sibling = directory.join(file_name);
    sibling.is_file().then_some(sibling)
}

fn sibling_configs(directory: &Path, package_path: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(directory = %directory.display(), error = %e, "Cannot list package directory");
            return Vec::new();
        }
    };
    let mut configs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("dtsconfig"))
        })
        .collect();
    configs.sort();

    let stem = package_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let rank = |path: &PathBuf| {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name == stem {
            0
        } else if name == "package" {
            1
        } else {
            2
        }
    };
    configs.sort_by_key(rank);
    configs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeclaredConfiguration;

    const EMPTY_CONFIG: &str = "<DTSConfiguration></DTSConfiguration>";

    #[test]
    fn test_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta.dtsConfig", "package.dtsConfig", "LoadOrders.dtsConfig", "alpha.dtsConfig"] {
            fs::write(dir.path().join(name), EMPTY_CONFIG).unwrap();
        }
        fs::create_dir(dir.path().join("declared")).unwrap();
        fs::write(dir.path().join("declared").join("env.dtsConfig"), EMPTY_CONFIG).unwrap();
        let package = dir.path().join("LoadOrders.dtsx");

        let mut model = PackageModel::new("LoadOrders");
        model.declared_configurations.push(DeclaredConfiguration {
            name: "Env".to_string(),
            configuration_type: 1,
            configuration_string: "declared\\env.dtsConfig".to_string(),
        });
        model.declared_configurations.push(DeclaredConfiguration {
            name: "Registry".to_string(),
            configuration_type: 4,
            configuration_string: "HKCU\\Software\\Etl".to_string(),
        });

        let (paths, diagnostics) = ConfigDiscovery::new().candidates(&package, &model);
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["env.dtsConfig", "LoadOrders.dtsConfig", "package.dtsConfig", "alpha.dtsConfig", "zeta.dtsConfig"]
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0],
            Diagnostic::ConfigResolution(ConfigResolutionError::UnsupportedConfigurationType { kind: 4, .. })
        ));
    }

    #[test]
    fn test_declared_absolute_windows_path_falls_back_to_sibling() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("prod.dtsConfig"), EMPTY_CONFIG).unwrap();
        let package = dir.path().join("Pkg.dtsx");
        let mut model = PackageModel::new("Pkg");
        model.declared_configurations.push(DeclaredConfiguration {
            name: "Prod".to_string(),
            configuration_type: 1,
            configuration_string: "C:\\SSIS\\Config\\prod.dtsConfig".to_string(),
        });

        let discovery = ConfigDiscovery::new().with_sibling_discovery(false);
        let (paths, diagnostics) = discovery.candidates(&package, &model);
        assert_eq!(paths, vec![dir.path().join("prod.dtsConfig")]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_load_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Pkg.dtsConfig"), EMPTY_CONFIG).unwrap();
        fs::write(dir.path().join("broken.dtsConfig"), "<DTSConfiguration>").unwrap();
        let package = dir.path().join("Pkg.dtsx");

        let (files, diagnostics) = ConfigDiscovery::new().load(&package, &PackageModel::new("Pkg"));
        assert_eq!(files.len(), 1);
        assert_eq!(diagnostics.len(), 1);
    }
}
