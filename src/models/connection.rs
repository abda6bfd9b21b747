//! Connection manager model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::{PropertyMap, PropertyValue};

/// Connection manager declared by a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionManager {
    /// DTSID of the connection manager
    pub id: String,
    pub name: String,
    /// Normalized type tag (OLEDB, FLATFILE, ...)
    pub connection_type: String,
    /// Raw `CreationName`
    pub creation_name: String,
    /// Opaque connection string; sealed when overridden by an encrypted entry
    pub connection_string: PropertyValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
}

impl ConnectionManager {
    pub fn new(id: impl Into<String>, name: impl Into<String>, creation_name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection_type: connection_type_tag(creation_name),
            creation_name: creation_name.to_string(),
            connection_string: PropertyValue::String(String::new()),
            description: None,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = PropertyValue::String(connection_string.into());
        self
    }

    /// Whether a component or task reference (id or name) points at this manager
    pub fn matches_ref(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.id.eq_ignore_ascii_case(reference)
            || self.name == reference
            || reference
                .strip_prefix("Package.ConnectionManagers[")
                .and_then(|r| r.strip_suffix(']'))
                .is_some_and(|n| n == self.name)
    }

    /// Parse `key=value;` pairs of the connection string (keys lower-cased)
    ///
    /// Returns an empty map for sealed connection strings.
    pub fn parameters(&self) -> BTreeMap<String, String> {
        self.connection_string
            .text()
            .map(|s| parse_connection_string(&s))
            .unwrap_or_default()
    }

    pub fn is_file_based(&self) -> bool {
        matches!(self.connection_type.as_str(), "FLATFILE" | "EXCEL" | "FILE" | "MULTIFILE")
    }
}

/// Derive the type tag from the last dotted segment of a creation name
///
/// `Microsoft.OLEDB` / `OLEDB` → `OLEDB`, `ADO.NET:System.Data.SqlClient...` → `ADO.NET`.
pub fn connection_type_tag(creation_name: &str) -> String {
    let trimmed = creation_name.trim();
    if trimmed.to_ascii_uppercase().starts_with("ADO.NET") {
        return "ADO.NET".to_string();
    }
    let last = trimmed.rsplit('.').next().unwrap_or(trimmed);
    let last = last.split(':').next().unwrap_or(last).to_ascii_uppercase();
    match last.as_str() {
        "OLEDB" | "FLATFILE" | "EXCEL" | "FTP" | "HTTP" | "SMTP" | "FILE" | "MULTIFILE"
        | "ODBC" | "MSOLAP100" => last,
        "" => "UNKNOWN".to_string(),
        _ => last,
    }
}

/// Split an OLE DB style connection string into lower-cased keys and values
pub fn parse_connection_string(connection_string: &str) -> BTreeMap<String, String> {
    connection_string
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim().to_ascii_lowercase();
            (!key.is_empty()).then(|| (key, value.trim().to_string()))
        })
        .collect()
}
