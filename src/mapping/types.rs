//! Types produced by the mapping engine

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConversionError, Diagnostic};
use crate::models::{ComponentKey, OperatorType};

/// Python imports required by a set of fragments
///
/// Runtime helpers and configuration names are tracked separately because
/// their module names are only known when the artifacts are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSet {
    /// Plain `import x` / `import x as y` statements
    modules: BTreeSet<String>,
    /// `from module import name` statements
    names: BTreeMap<String, BTreeSet<String>>,
    /// Names imported from the runtime helper module
    runtime: BTreeSet<String>,
    /// Names imported from the generated configuration module
    config: BTreeSet<String>,
}

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&mut self, statement: &str) -> &mut Self {
        self.modules.insert(statement.to_string());
        self
    }

    pub fn from(&mut self, module: &str, name: &str) -> &mut Self {
        self.names
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string());
        self
    }

    pub fn runtime(&mut self, name: &str) -> &mut Self {
        self.runtime.insert(name.to_string());
        self
    }

    pub fn config(&mut self, name: &str) -> &mut Self {
        self.config.insert(name.to_string());
        self
    }

    pub fn merge(&mut self, other: &ImportSet) {
        self.modules.extend(other.modules.iter().cloned());
        for (module, names) in &other.names {
            self.names
                .entry(module.clone())
                .or_default()
                .extend(names.iter().cloned());
        }
        self.runtime.extend(other.runtime.iter().cloned());
        self.config.extend(other.config.iter().cloned());
    }

    pub fn runtime_names(&self) -> impl Iterator<Item = &str> {
        self.runtime.iter().map(String::as_str)
    }

    pub fn config_names(&self) -> impl Iterator<Item = &str> {
        self.config.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.names.is_empty() && self.runtime.is_empty() && self.config.is_empty()
    }

    /// Import statements: standard and third-party first, then the
    /// runtime and configuration modules
    pub fn render(&self, runtime_module: &str, config_module: &str) -> Vec<String> {
        let mut lines: Vec<String> = self.modules.iter().map(|m| format!("import {}", m)).collect();
        for (module, names) in &self.names {
            lines.push(format!(
                "from {} import {}",
                module,
                names.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        let mut local = Vec::new();
        if !self.runtime.is_empty() {
            local.push(format!(
                "from {} import {}",
                runtime_module,
                self.runtime.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !self.config.is_empty() {
            local.push(format!(
                "from {} import {}",
                config_module,
                self.config.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !lines.is_empty() && !local.is_empty() {
            lines.push(String::new());
        }
        lines.extend(local);
        lines
    }
}

/// Code generated for one data-flow component
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFragment {
    pub component: ComponentKey,
    pub component_name: String,
    pub operator_type: OperatorType,
    /// Frame keys read by the fragment, in input order
    pub reads: Vec<String>,
    /// Frame keys written by the fragment
    pub writes: Vec<String>,
    /// Statement lines, unindented
    pub code: Vec<String>,
    pub imports: ImportSet,
    /// Pip requirement names
    pub dependencies: BTreeSet<String>,
    /// Statement lines for the validation entry point
    pub assertions: Vec<String>,
    /// Notes flagged for manual review
    pub manual_review: Vec<String>,
    /// Conditions raised while mapping; moved to the flow mapping by the engine
    pub diagnostics: Vec<Diagnostic>,
}

impl MappedFragment {
    pub fn new(component: ComponentKey, component_name: impl Into<String>, operator_type: OperatorType) -> Self {
        Self {
            component,
            component_name: component_name.into(),
            operator_type,
            reads: Vec::new(),
            writes: Vec::new(),
            code: Vec::new(),
            imports: ImportSet::new(),
            dependencies: BTreeSet::new(),
            assertions: Vec::new(),
            manual_review: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn line(&mut self, line: impl Into<String>) -> &mut Self {
        self.code.push(line.into());
        self
    }

    pub fn depends_on(&mut self, requirement: &str) -> &mut Self {
        self.dependencies.insert(requirement.to_string());
        self
    }

    /// Record a manual-review note and mark the code at this point
    pub fn review(&mut self, note: impl Into<String>) -> &mut Self {
        let note = note.into();
        self.code.push(format!("# MANUAL REVIEW: {}", super::python::comment_text(&note)));
        self.manual_review.push(note);
        self
    }

    pub fn needs_review(&self) -> bool {
        !self.manual_review.is_empty()
    }
}

/// Ordered fragments of one data flow
#[derive(Debug, Clone, PartialEq)]
pub struct DataFlowMapping {
    pub ref_path: String,
    pub name: String,
    /// Identifier used for the artifact and its entry points
    pub slug: String,
    /// Fragments in topological order
    pub fragments: Vec<MappedFragment>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DataFlowMapping {
    pub fn imports(&self) -> ImportSet {
        let mut imports = ImportSet::new();
        for fragment in &self.fragments {
            imports.merge(&fragment.imports);
        }
        imports
    }

    /// Sorted, deduplicated requirements
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.fragments
            .iter()
            .flat_map(|f| f.dependencies.iter().cloned())
            .collect()
    }

    /// Component keys in execution order
    pub fn order(&self) -> Vec<&ComponentKey> {
        self.fragments.iter().map(|f| &f.component).collect()
    }

    pub fn fragment(&self, component_name: &str) -> Option<&MappedFragment> {
        self.fragments.iter().find(|f| f.component_name == component_name)
    }

    pub fn needs_review(&self) -> bool {
        self.fragments.iter().any(MappedFragment::needs_review)
    }
}

/// A data flow whose lowering failed
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDataFlow {
    pub ref_path: String,
    pub name: String,
    pub slug: String,
    pub error: ConversionError,
}

/// Code generated for one control-flow task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFragment {
    pub ref_path: String,
    pub name: String,
    pub slug: String,
    pub task_type: String,
    /// Body of the task entry point, unindented
    pub code: Vec<String>,
    pub imports: ImportSet,
    pub dependencies: BTreeSet<String>,
    pub manual_review: Vec<String>,
}

impl TaskFragment {
    pub fn needs_review(&self) -> bool {
        !self.manual_review.is_empty()
    }
}

/// What a control-flow step invokes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTarget {
    DataFlow { slug: String },
    FailedDataFlow { slug: String, reason: String },
    Task { slug: String },
    /// Grouping container; its children are separate steps
    Container,
}

/// One entry of the control flow in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStep {
    pub ref_path: String,
    pub name: String,
    pub target: StepTarget,
    pub disabled: bool,
}

/// Mapping output for a whole package
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageMapping {
    pub data_flows: Vec<DataFlowMapping>,
    pub failed_flows: Vec<FailedDataFlow>,
    pub tasks: Vec<TaskFragment>,
    pub steps: Vec<ExecutionStep>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PackageMapping {
    pub fn data_flow(&self, name: &str) -> Option<&DataFlowMapping> {
        self.data_flows.iter().find(|f| f.name == name)
    }

    /// Requirements of every fragment and task, sorted and deduplicated
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.data_flows
            .iter()
            .flat_map(|f| f.dependencies())
            .chain(self.tasks.iter().flat_map(|t| t.dependencies.iter().cloned()))
            .collect()
    }

    /// Every diagnostic raised while mapping, flow diagnostics included
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.data_flows.iter().flat_map(|f| f.diagnostics.iter()))
    }
}
