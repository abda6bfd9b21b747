//! Control-flow task model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::PropertyMap;

/// A control-flow executable other than a data flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFlowTask {
    pub task_id: String,
    pub name: String,
    /// Executable type tag (`Microsoft.ExecuteSQLTask`, `STOCK:SEQUENCE`, ...)
    pub task_type: String,
    pub creation_name: String,
    #[serde(default)]
    pub description: String,
    /// Executable path, e.g. `Package\Prepare\Truncate Staging`
    pub ref_path: String,
    /// Ref path of the enclosing container, if nested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Task properties; SQL tasks carry `connection`, `sql_statement`, `result_type`
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Coarse task kind used for lowering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ExecuteSql,
    Container,
    Script,
    Other,
}

impl ControlFlowTask {
    pub fn new(task_id: impl Into<String>, name: impl Into<String>, task_type: impl Into<String>) -> Self {
        let task_type = task_type.into();
        Self {
            task_id: task_id.into(),
            name: name.into(),
            creation_name: task_type.clone(),
            task_type,
            description: String::new(),
            ref_path: String::new(),
            parent: None,
            properties: PropertyMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        let tag = format!("{} {}", self.task_type, self.creation_name).to_ascii_lowercase();
        if tag.contains("executesqltask") || tag.contains("sqltask") {
            TaskKind::ExecuteSql
        } else if tag.contains("stock:sequence")
            || tag.contains("stock:forloop")
            || tag.contains("stock:foreachloop")
        {
            TaskKind::Container
        } else if tag.contains("scripttask") {
            TaskKind::Script
        } else {
            TaskKind::Other
        }
    }
}

/// `From → To` ordering between two executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecedenceConstraint {
    pub from: String,
    pub to: String,
    /// Evaluation value (`0` success, `1` failure, `2` completion), when declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}
