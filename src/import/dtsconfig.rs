//! Override configuration importer (`.dtsConfig`)

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::xml::{NsAlias, XmlDocument, XmlElement};
use crate::error::{ConfigResolutionError, ParsingError};
use crate::models::value::parse_bool;
use crate::models::{ConfigEntry, ConfigFile, ConfigHeading, ConfigValueType};

const PLAIN: NsAlias = NsAlias::Plain;

/// Reads override configuration files
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigImporter;

impl ConfigImporter {
    pub fn new() -> Self {
        Self
    }

    /// Read a configuration file; failures are reported, never fatal
    pub fn import_file(&self, path: &Path) -> Result<ConfigFile, ConfigResolutionError> {
        let unreadable = |message: String| ConfigResolutionError::UnreadableFile {
            path: path.to_path_buf(),
            message,
        };

        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("dtsconfig"));
        if !has_extension {
            warn!(path = %path.display(), "Configuration file does not use the .dtsConfig extension");
        }

        let bytes = fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        let mut file = self.parse(&bytes).map_err(|e| unreadable(e.to_string()))?;
        file.path = Some(path.to_path_buf());
        debug!(path = %path.display(), entries = file.entries.len(), "Read configuration file");
        Ok(file)
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<ConfigFile, ParsingError> {
        let document = XmlDocument::parse(bytes)?;
        read_document(&document)
    }

    pub fn parse_str(&self, xml: &str) -> Result<ConfigFile, ParsingError> {
        let document = XmlDocument::parse_str(xml)?;
        read_document(&document)
    }
}

fn read_document(document: &XmlDocument) -> Result<ConfigFile, ParsingError> {
    let root = &document.root;
    if !root.is(PLAIN, "DTSConfiguration") {
        return Err(ParsingError::missing("DTSConfiguration", "configuration document root"));
    }

    let heading = root
        .find_path(PLAIN, &["DTSConfigurationHeading", "DTSConfigurationFileInfo"])
        .map(|info| {
            let attr = |name: &str| {
                info.attr(PLAIN, name)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            ConfigHeading {
                generated_by: attr("GeneratedBy"),
                package_name: attr("GeneratedFromPackageName"),
                package_id: attr("GeneratedFromPackageID"),
                generated_date: attr("GeneratedDate"),
            }
        })
        .unwrap_or_default();

    let entries = root.children(PLAIN, "Configuration").map(read_entry).collect();
    Ok(ConfigFile {
        path: None,
        heading,
        entries,
    })
}

fn read_entry(element: &XmlElement) -> ConfigEntry {
    let path = element.attr(PLAIN, "Path").unwrap_or_default().trim().to_string();
    let value_type: ConfigValueType = element
        .attr(PLAIN, "ValueType")
        .unwrap_or_default()
        .parse()
        .unwrap_or_default();
    let configured_value = element
        .child(PLAIN, "ConfiguredValue")
        .map(|v| v.text().to_string())
        .unwrap_or_default();

    let mut entry = ConfigEntry::new(path, value_type, configured_value);
    entry.encrypted = element
        .attr(PLAIN, "Encrypted")
        .and_then(parse_bool)
        .unwrap_or(false);
    entry.configured_type = element
        .attr(PLAIN, "ConfiguredType")
        .map(str::to_string);
    entry.description = element
        .attr(PLAIN, "Description")
        .filter(|d| !d.trim().is_empty())
        .map(str::to_string);
    entry
}
