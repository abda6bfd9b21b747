//! Package conversion pipeline
//!
//! Drives one package through every stage:
//! - read and extract the `.dtsx` document (classification included)
//! - discover and read the applicable `.dtsConfig` files
//! - overlay the configuration and collect required bindings
//! - map data flows and tasks
//! - emit the artifacts and write them atomically
//!
//! [`BatchRunner`] runs many packages on a bounded worker pool.
//!
//! # Example
//!
//! ```rust,ignore
//! use ssis_migration_sdk::pipeline::{MigrationConfig, MigrationPipeline};
//!
//! let config = MigrationConfig::new().with_output_dir("generated");
//! let pipeline = MigrationPipeline::new(config)?;
//! let conversion = pipeline.convert_file(Path::new("packages/Orders.dtsx"))?;
//! for report in conversion.reports() {
//!     eprintln!("{}: {}", report.severity, report.message);
//! }
//! ```

mod batch;
mod config;

pub use batch::{BatchOutcome, BatchReport, BatchRunner, SharedConnection};
pub use config::{MigrationConfig, TargetRuntime};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::classify::ComponentClassifier;
use crate::error::{Diagnostic, ErrorReport, MigrationError, MigrationResult, Reportable};
use crate::export::{ArtifactSet, ScriptEmitter};
use crate::import::{ConfigDiscovery, DtsxImporter};
use crate::mapping::python::slugify;
use crate::mapping::{MappingEngine, PackageMapping};
use crate::models::{ConfigFile, PackageModel, PackageSummary};
use crate::overlay::{BindingSet, ConfigResolver};

/// Everything produced for one package
#[derive(Debug, Clone)]
pub struct PackageConversion {
    pub source_path: Option<PathBuf>,
    /// Model after the configuration overlay
    pub model: PackageModel,
    pub bindings: BindingSet,
    pub mapping: PackageMapping,
    pub artifacts: ArtifactSet,
    /// Every recoverable condition, extraction first, mapping last
    pub diagnostics: Vec<Diagnostic>,
    /// Directory the artifacts were written to, if any
    pub output_dir: Option<PathBuf>,
    pub duration_ms: u64,
}

impl PackageConversion {
    pub fn summary(&self) -> PackageSummary {
        self.model.summary()
    }

    /// Whether any artifact carries a manual-review flag
    pub fn needs_review(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::needs_review)
    }

    /// Error reports for every diagnostic, attributed to the package file
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.diagnostics
            .iter()
            .map(|d| d.report().in_file(self.source_path.as_ref()))
            .collect()
    }
}

/// Converts packages according to a [`MigrationConfig`]
#[derive(Debug)]
pub struct MigrationPipeline {
    config: MigrationConfig,
    importer: DtsxImporter,
    discovery: ConfigDiscovery,
    resolver: ConfigResolver,
    engine: MappingEngine,
    emitter: ScriptEmitter,
}

impl MigrationPipeline {
    /// Create a pipeline; the configuration is validated first
    pub fn new(config: MigrationConfig) -> MigrationResult<Self> {
        config.validate().map_err(MigrationError::Config)?;
        let discovery = ConfigDiscovery::new()
            .with_sibling_discovery(config.discover_sibling_configs)
            .with_extra_files(config.extra_config_files.clone());
        let emitter = ScriptEmitter::new().with_runtime_module(config.runtime_module.clone());
        Ok(Self {
            config,
            importer: DtsxImporter::new(),
            discovery,
            resolver: ConfigResolver::new(),
            engine: MappingEngine::new(),
            emitter,
        })
    }

    /// Use a custom classification chain
    pub fn with_classifier(mut self, classifier: ComponentClassifier) -> Self {
        self.importer = DtsxImporter::with_classifier(classifier);
        self
    }

    /// Use a custom rule table
    pub fn with_engine(mut self, engine: MappingEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Convert a package file, writing into `<output_dir>/<package stem>`
    pub fn convert_file(&self, path: &Path) -> MigrationResult<PackageConversion> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.convert_file_into(path, &slugify(&stem))
    }

    /// Convert a package file, writing into `<output_dir>/<dir_name>`
    pub fn convert_file_into(&self, path: &Path, dir_name: &str) -> MigrationResult<PackageConversion> {
        let _span = info_span!("convert_package", package = %path.display()).entered();
        let start = Instant::now();

        let outcome = self.importer.import_file(path)?;
        info!(
            package = %outcome.model.name,
            connections = outcome.model.connection_managers.len(),
            variables = outcome.model.variables.len(),
            data_flows = outcome.model.data_flow_components.len(),
            tasks = outcome.model.control_flow_tasks.len(),
            diagnostics = outcome.diagnostics.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Package extracted"
        );

        let (files, discovery_diagnostics) = self.discovery.load(path, &outcome.model);
        let mut diagnostics = outcome.diagnostics;
        diagnostics.extend(discovery_diagnostics);

        let mut conversion = self.convert_model(&outcome.model, &files, diagnostics);
        if self.config.write_artifacts {
            let target = self.config.output_dir.join(dir_name);
            write_atomically(&conversion.artifacts, &target)?;
            info!(output = %target.display(), artifacts = conversion.artifacts.len(), "Artifacts written");
            conversion.output_dir = Some(target);
        }
        conversion.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            package = %conversion.model.name,
            failed_flows = conversion.mapping.failed_flows.len(),
            diagnostics = conversion.diagnostics.len(),
            duration_ms = conversion.duration_ms,
            "Package converted"
        );
        Ok(conversion)
    }

    /// Overlay, map and emit an already extracted model without any I/O
    ///
    /// `diagnostics` are the conditions raised before this point.
    pub fn convert_model(
        &self,
        model: &PackageModel,
        files: &[ConfigFile],
        diagnostics: Vec<Diagnostic>,
    ) -> PackageConversion {
        let start = Instant::now();
        let overlay = self.resolver.apply(model, files);
        let mut diagnostics = diagnostics;
        diagnostics.extend(overlay.diagnostics);

        let mapping = self.engine.map_package(&overlay.model);
        for diagnostic in mapping.all_diagnostics() {
            warn!(package = %overlay.model.name, "{}", diagnostic);
        }
        info!(
            package = %overlay.model.name,
            data_flows = mapping.data_flows.len(),
            failed_flows = mapping.failed_flows.len(),
            tasks = mapping.tasks.len(),
            "Package mapped"
        );

        let artifacts = self
            .emitter
            .emit(&overlay.model, &overlay.bindings, &mapping, &diagnostics);
        diagnostics.extend(mapping.all_diagnostics().cloned());
        debug!(package = %overlay.model.name, artifacts = artifacts.len(), "Artifacts rendered");

        PackageConversion {
            source_path: overlay.model.source_path.clone(),
            model: overlay.model,
            bindings: overlay.bindings,
            mapping,
            artifacts,
            diagnostics,
            output_dir: None,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Write into `<target>.partial`, then rename over `target`
///
/// The staging directory is removed on failure, so `target` only ever
/// holds a complete artifact set.
fn write_atomically(artifacts: &ArtifactSet, target: &Path) -> MigrationResult<()> {
    let mut staging = target.as_os_str().to_owned();
    staging.push(".partial");
    let staging = PathBuf::from(staging);

    if staging.exists() {
        fs::remove_dir_all(&staging)
            .map_err(|e| MigrationError::output(&staging, "failed to clear stale staging directory", e))?;
    }
    fs::create_dir_all(&staging)
        .map_err(|e| MigrationError::output(&staging, "failed to create staging directory", e))?;

    let result = artifacts.write_to(&staging).and_then(|()| {
        if target.exists() {
            fs::remove_dir_all(target)
                .map_err(|e| MigrationError::output(target, "failed to replace previous artifacts", e))?;
        }
        fs::rename(&staging, target)
            .map_err(|e| MigrationError::output(target, "failed to move artifacts into place", e))
    });
    if result.is_err() {
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
        }
    }
    result
}

/// Convert one package with the given configuration
pub fn convert_package(path: &Path, config: MigrationConfig) -> MigrationResult<PackageConversion> {
    MigrationPipeline::new(config)?.convert_file(path)
}
