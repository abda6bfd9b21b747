//! Override configuration model (`.dtsConfig`)

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::value::{PropertyValue, parse_bool, parse_date_time};

/// Declared type of a configured value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConfigValueType {
    #[default]
    String,
    Int32,
    Boolean,
    Double,
    DateTime,
    /// Any other declared type; the value is kept raw
    Other(String),
}

impl ConfigValueType {
    /// Convert a configured value to a typed property value
    pub fn coerce(&self, raw: &str) -> Result<PropertyValue, String> {
        match self {
            ConfigValueType::String => Ok(PropertyValue::String(raw.to_string())),
            ConfigValueType::Int32 => raw
                .trim()
                .parse::<i32>()
                .map(PropertyValue::Int32)
                .map_err(|e| format!("'{}' is not a valid Int32: {}", raw, e)),
            ConfigValueType::Double => raw
                .trim()
                .parse::<f64>()
                .map(PropertyValue::Double)
                .map_err(|e| format!("'{}' is not a valid Double: {}", raw, e)),
            ConfigValueType::Boolean => parse_bool(raw)
                .map(PropertyValue::Boolean)
                .ok_or_else(|| format!("'{}' is not a valid Boolean", raw)),
            ConfigValueType::DateTime => parse_date_time(raw)
                .map(PropertyValue::DateTime)
                .ok_or_else(|| format!("'{}' is not a valid DateTime", raw)),
            ConfigValueType::Other(type_name) => Ok(PropertyValue::Raw {
                type_name: type_name.clone(),
                value: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for ConfigValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValueType::String => write!(f, "String"),
            ConfigValueType::Int32 => write!(f, "Int32"),
            ConfigValueType::Boolean => write!(f, "Boolean"),
            ConfigValueType::Double => write!(f, "Double"),
            ConfigValueType::DateTime => write!(f, "DateTime"),
            ConfigValueType::Other(name) => write!(f, "{}", name),
        }
    }
}

impl std::str::FromStr for ConfigValueType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "" | "string" => ConfigValueType::String,
            "int32" | "int16" | "int64" | "byte" => ConfigValueType::Int32,
            "boolean" | "bool" => ConfigValueType::Boolean,
            "double" | "single" | "decimal" => ConfigValueType::Double,
            "datetime" => ConfigValueType::DateTime,
            _ => ConfigValueType::Other(s.trim().to_string()),
        })
    }
}

/// One `Configuration` element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Addressing expression, e.g. `\Package.Connections[Src].Properties[ConnectionString]`
    pub path: String,
    pub value_type: ConfigValueType,
    pub configured_value: String,
    #[serde(default)]
    pub encrypted: bool,
    /// `ConfiguredType` attribute, usually `Property`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConfigEntry {
    pub fn new(path: impl Into<String>, value_type: ConfigValueType, configured_value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value_type,
            configured_value: configured_value.into(),
            encrypted: false,
            configured_type: None,
            description: None,
        }
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Encrypted entries are never decrypted; the target stays sealed
    pub fn requires_manual_decryption(&self) -> bool {
        self.encrypted
    }
}

/// `DTSConfigurationFileInfo` heading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigHeading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_date: Option<String>,
}

/// A parsed override configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub heading: ConfigHeading,
    pub entries: Vec<ConfigEntry>,
}

impl ConfigFile {
    pub fn new(entries: Vec<ConfigEntry>) -> Self {
        Self {
            path: None,
            heading: ConfigHeading::default(),
            entries,
        }
    }

    /// Name used in diagnostics
    pub fn label(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<inline>".to_string())
    }
}

/// Configuration source declared inside the package (`DTS:Configuration`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredConfiguration {
    pub name: String,
    /// `ConfigurationType`: 1 = XML file, 2 = environment variable, ...
    pub configuration_type: u8,
    pub configuration_string: String,
}

impl DeclaredConfiguration {
    pub fn is_xml_file(&self) -> bool {
        self.configuration_type == 1
    }
}
