//! Package variable model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::{PropertyValue, SemanticType};

/// A package-scoped variable or parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    /// Namespace such as `User`, `System` or `$Package`
    pub namespace: String,
    /// Current value; starts as a string and is replaced by overlays
    pub value: PropertyValue,
    pub data_type: SemanticType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub is_parameter: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Variable {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let namespace = namespace.into();
        Self {
            id: String::new(),
            name: name.into(),
            is_parameter: is_parameter_namespace(&namespace),
            namespace,
            data_type: SemanticType::infer(&value),
            value: PropertyValue::String(value),
            description: None,
            read_only: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_data_type(mut self, data_type: SemanticType) -> Self {
        self.data_type = data_type;
        self
    }

    /// `Namespace::Name` as used in scoped references
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }

    /// Match a `Namespace::Name` or bare-name reference
    pub fn matches(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name
            && namespace.is_none_or(|ns| ns.eq_ignore_ascii_case(&self.namespace))
    }
}

pub(crate) fn is_parameter_namespace(namespace: &str) -> bool {
    namespace.eq_ignore_ascii_case("Parameter") || namespace.starts_with('$')
}
