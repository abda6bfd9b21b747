//! Applies override configuration onto a package model

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};

use super::path::ConfigTarget;
use super::placeholder::BindingSet;
use crate::error::{ConfigResolutionError, Diagnostic, ManualInputRequired};
use crate::models::package::normalize_executable_path;
use crate::models::{ConfigEntry, ConfigFile, PackageModel, PropertyValue, SemanticType};

/// Overlaid model with the conditions met while applying it
#[derive(Debug, Clone)]
pub struct OverlayOutcome {
    pub model: PackageModel,
    pub diagnostics: Vec<Diagnostic>,
    pub bindings: BindingSet,
}

/// Applies configuration entries in file-declaration order
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigResolver;

impl ConfigResolver {
    pub fn new() -> Self {
        Self
    }

    /// Overlay `files` onto a copy of `model`
    ///
    /// Applying the same files to the result again yields the same model.
    pub fn apply(&self, model: &PackageModel, files: &[ConfigFile]) -> OverlayOutcome {
        let mut overlaid = model.clone();
        let mut diagnostics = Vec::new();
        let mut applied = 0usize;

        for file in files {
            for entry in &file.entries {
                match apply_entry(&mut overlaid, entry) {
                    Ok(Some(manual)) => {
                        applied += 1;
                        warn!(path = %entry.path, "{}", manual);
                        diagnostics.push(manual.into());
                    }
                    Ok(None) => applied += 1,
                    Err(error) => {
                        warn!(file = %file.label(), path = %entry.path, "{}", error);
                        diagnostics.push(error.into());
                    }
                }
            }
        }
        overlaid.config_files = files.to_vec();

        let bindings = scan_bindings(&overlaid);
        info!(
            package = %overlaid.name,
            files = files.len(),
            applied,
            skipped = diagnostics.len(),
            bindings = bindings.len(),
            "Configuration overlay applied"
        );
        OverlayOutcome {
            model: overlaid,
            diagnostics,
            bindings,
        }
    }
}

/// Typed value of an entry; encrypted entries stay sealed
fn entry_value(entry: &ConfigEntry) -> Result<PropertyValue, ConfigResolutionError> {
    if entry.requires_manual_decryption() {
        return Ok(PropertyValue::sealed(entry.configured_value.clone()));
    }
    entry
        .value_type
        .coerce(&entry.configured_value)
        .map_err(|reason| ConfigResolutionError::InvalidCoercion {
            path: entry.path.clone(),
            value_type: entry.value_type.to_string(),
            reason,
        })
}

fn manual_decryption_note(entry: &ConfigEntry) -> ManualInputRequired {
    let size = STANDARD
        .decode(entry.configured_value.trim())
        .map(|bytes| format!("{} bytes of ciphertext", bytes.len()))
        .unwrap_or_else(|_| format!("{} characters of ciphertext", entry.configured_value.trim().len()));
    ManualInputRequired::new(
        entry.path.clone(),
        format!("encrypted value requires manual decryption ({})", size),
    )
}

/// Apply one entry; returns a manual-input note for encrypted entries
fn apply_entry(
    model: &mut PackageModel,
    entry: &ConfigEntry,
) -> Result<Option<ManualInputRequired>, ConfigResolutionError> {
    let target = ConfigTarget::parse(&entry.path)?;
    let dangling = |target: &ConfigTarget| ConfigResolutionError::DanglingReference {
        path: entry.path.clone(),
        target: target.to_string(),
    };
    let value = entry_value(entry)?;
    let property = target.property();

    match &target {
        ConfigTarget::Package { .. } => {
            let field = if property.eq_ignore_ascii_case("Description") {
                Some(&mut model.description)
            } else if property.eq_ignore_ascii_case("Name") || property.eq_ignore_ascii_case("ObjectName") {
                Some(&mut model.name)
            } else {
                None
            };
            match field {
                Some(field) if !value.is_sealed() => *field = value.to_string(),
                _ => {
                    model.properties.insert(property, value);
                }
            }
        }
        ConfigTarget::Connection { name, .. } => {
            let connection = model
                .connection_managers
                .iter_mut()
                .find(|c| c.name == *name || c.id.eq_ignore_ascii_case(name))
                .ok_or_else(|| dangling(&target))?;
            if property.eq_ignore_ascii_case("ConnectionString") {
                connection.connection_string = value;
            } else {
                connection.properties.insert(property, value);
            }
        }
        ConfigTarget::Variable { namespace, name, .. } => {
            let variable = model
                .variables
                .iter_mut()
                .find(|v| v.matches(namespace.as_deref(), name))
                .ok_or_else(|| dangling(&target))?;
            if property.eq_ignore_ascii_case("Value") {
                if variable.data_type == SemanticType::Unknown {
                    variable.data_type = semantic_type_of(&value);
                }
                variable.value = value;
            } else if !value.is_sealed() {
                variable.metadata.insert(property.to_string(), value.to_string());
            }
        }
        ConfigTarget::Executable { path, .. } => {
            let wanted = normalize_executable_path(path);
            if let Some(flow) = model
                .data_flow_components
                .iter_mut()
                .find(|f| normalize_executable_path(&f.ref_path) == wanted)
            {
                if property.eq_ignore_ascii_case("Description") && !value.is_sealed() {
                    flow.description = value.to_string();
                } else {
                    flow.properties.insert(property, value);
                }
            } else {
                let task = model
                    .control_flow_tasks
                    .iter_mut()
                    .find(|t| normalize_executable_path(&t.ref_path) == wanted)
                    .ok_or_else(|| dangling(&target))?;
                if property.eq_ignore_ascii_case("Description") && !value.is_sealed() {
                    task.description = value.to_string();
                } else {
                    task.properties.insert(property, value);
                }
            }
        }
        ConfigTarget::Component {
            container, component, ..
        } => {
            let wanted = normalize_executable_path(container);
            let component = model
                .data_flow_components
                .iter_mut()
                .find(|f| normalize_executable_path(&f.ref_path) == wanted)
                .and_then(|f| f.component_by_name_mut(component))
                .ok_or_else(|| dangling(&target))?;
            component.properties.insert(property, value);
        }
    }

    debug!(path = %entry.path, target = %target, "Applied configuration entry");
    Ok(entry.requires_manual_decryption().then(|| manual_decryption_note(entry)))
}

fn semantic_type_of(value: &PropertyValue) -> SemanticType {
    match value {
        PropertyValue::String(_) => SemanticType::String,
        PropertyValue::Int32(_) => SemanticType::Int32,
        PropertyValue::Double(_) => SemanticType::Double,
        PropertyValue::Boolean(_) => SemanticType::Boolean,
        PropertyValue::DateTime(_) => SemanticType::DateTime,
        PropertyValue::Raw { .. } | PropertyValue::Sealed { .. } => SemanticType::Unknown,
    }
}

/// Scan configured values, then every property value of the model
fn scan_bindings(model: &PackageModel) -> BindingSet {
    let mut bindings = BindingSet::new();
    let mut scan = |value: &PropertyValue, location: String| {
        if let Some(text) = value.text() {
            bindings.scan(&text, &location);
        }
    };

    for file in &model.config_files {
        for entry in file.entries.iter().filter(|e| !e.encrypted) {
            scan(
                &PropertyValue::String(entry.configured_value.clone()),
                format!("{}:{}", file.label(), entry.path),
            );
        }
    }
    for (name, value) in model.properties.iter() {
        scan(value, format!("Package.Properties[{}]", name));
    }
    for connection in &model.connection_managers {
        let base = format!("Package.Connections[{}]", connection.name);
        scan(&connection.connection_string, format!("{}.Properties[ConnectionString]", base));
        for (name, value) in connection.properties.iter() {
            scan(value, format!("{}.Properties[{}]", base, name));
        }
    }
    for variable in &model.variables {
        let location = format!("Package.Variables[{}].Properties[Value]", variable.qualified_name());
        scan(&variable.value, location);
        if let Some(expression) = variable.metadata.get("expression") {
            scan(
                &PropertyValue::String(expression.clone()),
                format!("Package.Variables[{}].Properties[Expression]", variable.qualified_name()),
            );
        }
    }
    for flow in &model.data_flow_components {
        for (name, value) in flow.properties.iter() {
            scan(value, format!("{}.Properties[{}]", flow.ref_path, name));
        }
        for component in &flow.components {
            let base = format!("{}.Properties[[{}]", flow.ref_path, component.name);
            for (name, value) in component.properties.iter() {
                scan(value, format!("{}.[{}]]", base, name));
            }
            for port in component.inputs.iter().chain(component.outputs.iter()) {
                for (name, value) in port.properties.iter() {
                    scan(value, format!("{}/{}.{}", component.key(), port.name, name));
                }
                for column in &port.columns {
                    for (name, value) in column.properties.iter() {
                        scan(value, format!("{}/{}.{}", component.key(), column.name, name));
                    }
                }
            }
        }
    }
    for task in &model.control_flow_tasks {
        for (name, value) in task.properties.iter() {
            scan(value, format!("{}.Properties[{}]", task.ref_path, name));
        }
    }
    bindings
}
