//! Package model and its structured summary

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::component::DataFlow;
use super::config::{ConfigFile, DeclaredConfiguration};
use super::connection::ConnectionManager;
use super::task::{ControlFlowTask, PrecedenceConstraint};
use super::value::PropertyMap;
use super::variable::Variable;

/// The assembled intermediate representation of one package
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageModel {
    pub name: String,
    /// `VersionMajor.VersionMinor.VersionBuild`
    pub version: String,
    pub description: String,
    pub creation_date: Option<String>,
    pub creator: Option<String>,
    /// DTSID of the package
    pub package_id: String,
    pub connection_managers: Vec<ConnectionManager>,
    pub variables: Vec<Variable>,
    /// One entry per declared data-flow container
    pub data_flow_components: Vec<DataFlow>,
    pub control_flow_tasks: Vec<ControlFlowTask>,
    pub config_files: Vec<ConfigFile>,
    pub metadata: BTreeMap<String, String>,
    /// Package properties set by configuration entries, kept typed
    pub properties: PropertyMap,
    pub precedence_constraints: Vec<PrecedenceConstraint>,
    pub declared_configurations: Vec<DeclaredConfiguration>,
    /// Ref paths of every executable (tasks and data flows) in declaration order
    pub executable_order: Vec<String>,
    /// File the package was read from, when known
    pub source_path: Option<PathBuf>,
}

impl PackageModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Resolve a connection reference (DTSID, name or `Package.ConnectionManagers[Name]`)
    pub fn connection(&self, reference: &str) -> Option<&ConnectionManager> {
        self.connection_managers.iter().find(|c| c.matches_ref(reference))
    }

    pub fn variable(&self, namespace: Option<&str>, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.matches(namespace, name))
    }

    /// Data flow or task at an executable path (`Package\Flow` or `\Package\Flow`)
    pub fn data_flow_at(&self, path: &str) -> Option<&DataFlow> {
        let wanted = normalize_executable_path(path);
        self.data_flow_components
            .iter()
            .find(|f| normalize_executable_path(&f.ref_path) == wanted)
    }

    pub fn task_at(&self, path: &str) -> Option<&ControlFlowTask> {
        let wanted = normalize_executable_path(path);
        self.control_flow_tasks
            .iter()
            .find(|t| normalize_executable_path(&t.ref_path) == wanted)
    }

    /// Executable ref paths in declaration order
    ///
    /// Models assembled without an importer fall back to tasks followed by
    /// data flows.
    pub fn executables_in_order(&self) -> Vec<String> {
        if !self.executable_order.is_empty() {
            return self.executable_order.clone();
        }
        self.control_flow_tasks
            .iter()
            .map(|t| t.ref_path.clone())
            .chain(self.data_flow_components.iter().map(|f| f.ref_path.clone()))
            .collect()
    }

    /// Total number of data-flow components across containers
    pub fn component_count(&self) -> usize {
        self.data_flow_components.iter().map(|f| f.components.len()).sum()
    }

    /// Externally representable summary
    pub fn summary(&self) -> PackageSummary {
        PackageSummary::from(self)
    }
}

/// Compare executable paths without the leading backslash or case
pub(crate) fn normalize_executable_path(path: &str) -> String {
    path.trim().trim_start_matches('\\').to_ascii_lowercase()
}

/// Structured summary of a package with a fixed field set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    pub version: String,
    pub description: String,
    pub creation_date: Option<String>,
    pub creator: Option<String>,
    pub package_id: String,
    pub connection_managers: Vec<ConnectionManager>,
    pub variables: Vec<Variable>,
    pub data_flow_components: Vec<DataFlow>,
    pub control_flow_tasks: Vec<ControlFlowTask>,
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
}

impl From<&PackageModel> for PackageSummary {
    fn from(model: &PackageModel) -> Self {
        Self {
            name: model.name.clone(),
            version: model.version.clone(),
            description: model.description.clone(),
            creation_date: model.creation_date.clone(),
            creator: model.creator.clone(),
            package_id: model.package_id.clone(),
            connection_managers: model.connection_managers.clone(),
            variables: model.variables.clone(),
            data_flow_components: model.data_flow_components.clone(),
            control_flow_tasks: model.control_flow_tasks.clone(),
            metadata: model.metadata.clone(),
            properties: model.properties.clone(),
        }
    }
}

impl PackageSummary {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionManager, Variable};

    #[test]
    fn test_summary_field_set() {
        let mut model = PackageModel::new("LoadOrders");
        model.package_id = "{PKG}".to_string();
        model
            .connection_managers
            .push(ConnectionManager::new("{1}", "Source", "OLEDB"));
        model.variables.push(Variable::new("User", "SourceTable", "dbo.Orders"));

        let json = model.summary().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "connection_managers",
                "control_flow_tasks",
                "creation_date",
                "creator",
                "data_flow_components",
                "description",
                "metadata",
                "name",
                "package_id",
                "variables",
                "version",
            ]
        );

        let back = PackageSummary::from_json(&json).unwrap();
        assert_eq!(back, model.summary());
    }

    #[test]
    fn test_yaml_round_trip() {
        let model = PackageModel::new("Pkg");
        let yaml = model.summary().to_yaml().unwrap();
        assert_eq!(PackageSummary::from_yaml(&yaml).unwrap(), model.summary());
    }

    #[test]
    fn test_normalize_executable_path() {
        assert_eq!(
            normalize_executable_path("\\Package\\Load Orders"),
            normalize_executable_path("package\\load orders")
        );
    }
}
