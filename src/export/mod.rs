//! Export functionality
//!
//! Assembles mapped fragments into the generated Python artifacts:
//! - `<pkg>_main.py` (control flow and `main()`)
//! - `<pkg>_config.py` (connections, variables, bindings, manual inputs)
//! - `<pkg>_dataflow_<slug>.py` per mapped data flow
//! - `<pkg>_task_<slug>.py` per lowered task
//! - `requirements.txt`
//! - the shared runtime helper module
//!
//! Emission is a pure function of the package model and the mapping
//! output: artifacts are ordered by name and contain no timestamps.

pub mod config;
pub mod dialect;
pub mod runtime;
pub mod scripts;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path};

use tracing::debug;

use crate::error::{Diagnostic, MigrationError, MigrationResult};
use crate::mapping::python::slugify;
use crate::mapping::PackageMapping;
use crate::models::PackageModel;
use crate::overlay::BindingSet;

pub use dialect::{Dialect, dialect_for};
pub use runtime::RUNTIME_SOURCE;
pub use scripts::ModuleNames;

/// Requirements every generated package needs
const BASE_REQUIREMENTS: &[&str] = &["pandas", "sqlalchemy"];

/// One generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name relative to the output directory
    pub name: String,
    pub content: String,
}

/// Generated files of one package, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl From<Vec<Artifact>> for ArtifactSet {
    fn from(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts }
    }
}

impl ArtifactSet {
    fn push(&mut self, name: String, content: String) {
        debug!(artifact = %name, bytes = content.len(), "Rendered artifact");
        self.artifacts.push(Artifact { name, content });
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Write every artifact into `dir`, which must exist
    ///
    /// Artifact names are plain file names; anything with a directory
    /// component is rejected.
    pub fn write_to(&self, dir: &Path) -> MigrationResult<()> {
        for artifact in &self.artifacts {
            let name = Path::new(&artifact.name);
            let plain = name.components().count() == 1
                && matches!(name.components().next(), Some(Component::Normal(_)));
            if !plain {
                return Err(MigrationError::output(
                    dir.join(name),
                    "artifact name must be a plain file name",
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, artifact.name.clone()),
                ));
            }
            let path = dir.join(name);
            fs::write(&path, &artifact.content)
                .map_err(|e| MigrationError::output(&path, "failed to write artifact", e))?;
        }
        Ok(())
    }
}

/// Renders the artifacts of one package
#[derive(Debug, Clone)]
pub struct ScriptEmitter {
    runtime_module: String,
}

impl Default for ScriptEmitter {
    fn default() -> Self {
        Self {
            runtime_module: "etl_runtime".to_string(),
        }
    }
}

impl ScriptEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the runtime helper module (without `.py`)
    pub fn with_runtime_module(mut self, module: impl Into<String>) -> Self {
        let module = slugify(&module.into());
        self.runtime_module = module;
        self
    }

    pub fn runtime_module(&self) -> &str {
        &self.runtime_module
    }

    /// Module names for a package
    pub fn module_names(&self, package: &PackageModel) -> ModuleNames {
        ModuleNames {
            package: slugify(&package.name),
            runtime: self.runtime_module.clone(),
        }
    }

    /// Sorted, deduplicated pip requirements
    pub fn requirements(&self, package: &PackageModel, mapping: &PackageMapping) -> BTreeSet<String> {
        let mut requirements: BTreeSet<String> = BASE_REQUIREMENTS.iter().map(|r| r.to_string()).collect();
        requirements.extend(mapping.dependencies());
        requirements.extend(
            package
                .connection_managers
                .iter()
                .filter_map(dialect_for)
                .filter_map(|d| d.requirement)
                .map(str::to_string),
        );
        requirements
    }

    /// Render every artifact
    ///
    /// `diagnostics` are the conditions raised before mapping (extraction
    /// and overlay); the mapping's own diagnostics are appended.
    pub fn emit(
        &self,
        package: &PackageModel,
        bindings: &BindingSet,
        mapping: &PackageMapping,
        diagnostics: &[Diagnostic],
    ) -> ArtifactSet {
        let names = self.module_names(package);
        let mut set = ArtifactSet::default();

        set.push(
            format!("{}.py", names.main()),
            scripts::render_main(&names, package, mapping),
        );
        set.push(
            format!("{}.py", names.config()),
            config::render_config(
                package,
                bindings,
                diagnostics.iter().chain(mapping.all_diagnostics()),
                &self.runtime_module,
            ),
        );
        for flow in &mapping.data_flows {
            set.push(
                format!("{}.py", names.data_flow(&flow.slug)),
                scripts::render_data_flow(&names, package, flow),
            );
        }
        for task in &mapping.tasks {
            set.push(
                format!("{}.py", names.task(&task.slug)),
                scripts::render_task(&names, package, task),
            );
        }
        let mut requirements = self
            .requirements(package, mapping)
            .into_iter()
            .collect::<Vec<_>>()
            .join("\n");
        requirements.push('\n');
        set.push("requirements.txt".to_string(), requirements);
        set.push(format!("{}.py", self.runtime_module), RUNTIME_SOURCE.to_string());

        set.artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        set
    }
}
