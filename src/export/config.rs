//! Rendering of the generated configuration module

use std::collections::BTreeMap;

use crate::error::{Diagnostic, Reportable};
use crate::mapping::python::{doc_text, py_str};
use crate::models::{ConnectionManager, PackageModel, PropertyValue, Variable};
use crate::overlay::{BindingKind, BindingSet};

use super::dialect::dialect_for;

const SEALED_REASON: &str = "encrypted value requires manual decryption";

/// Python literal for a property value; sealed values become `ManualInput`
pub fn py_value(value: &PropertyValue, location: &str) -> String {
    match value {
        PropertyValue::String(s) => py_str(s),
        PropertyValue::Int32(i) => i.to_string(),
        PropertyValue::Double(d) => py_float(*d),
        PropertyValue::Boolean(true) => "True".to_string(),
        PropertyValue::Boolean(false) => "False".to_string(),
        PropertyValue::DateTime(dt) => py_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        PropertyValue::Raw { value, .. } => py_str(value),
        PropertyValue::Sealed { .. } => manual_input(location, SEALED_REASON),
    }
}

fn py_float(value: f64) -> String {
    if value.is_nan() {
        return "float(\"nan\")".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "float(\"inf\")" } else { "float(\"-inf\")" }.to_string();
    }
    let text = value.to_string();
    if text.contains(['.', 'e', 'E']) { text } else { format!("{}.0", text) }
}

fn manual_input(location: &str, reason: &str) -> String {
    format!("ManualInput({}, {})", py_str(location), py_str(reason))
}

fn optional(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => py_str(v),
        None => "None".to_string(),
    }
}

/// File path of a file-based connection
fn file_path(manager: &ConnectionManager, location: &str) -> String {
    if manager.connection_string.is_sealed() {
        return manual_input(location, SEALED_REASON);
    }
    if manager.connection_type == "EXCEL" {
        return optional(manager.parameters().get("data source").map(String::as_str));
    }
    optional(manager.connection_string.text().as_deref())
}

/// Connection properties that stand in for a connection-string key
const PROPERTY_PARAMETERS: &[(&str, &str)] = &[
    ("ServerName", "data source"),
    ("InitialCatalog", "initial catalog"),
    ("UserName", "user id"),
    ("Password", "password"),
];

/// Rendered connection-string parameters; explicit properties win over the string
fn connection_parameters(manager: &ConnectionManager) -> BTreeMap<String, String> {
    let mut parameters: BTreeMap<String, String> = manager
        .parameters()
        .into_iter()
        .filter(|(key, _)| key != "provider")
        .map(|(key, value)| (key, py_str(&value)))
        .collect();
    for (property, key) in PROPERTY_PARAMETERS {
        if let Some(value) = manager.properties.get(property) {
            let location = format!("Package.Connections[{}].Properties[{}]", manager.name, property);
            parameters.insert(key.to_string(), py_value(value, &location));
        }
    }
    parameters
}

fn connection_block(manager: &ConnectionManager) -> Vec<String> {
    let location = format!("Package.Connections[{}].ConnectionString", manager.name);
    let dialect = dialect_for(manager);
    let mut lines = vec![format!("    {}: {{", py_str(&manager.name))];
    lines.push(format!("        \"type\": {},", py_str(&manager.connection_type)));
    lines.push(format!("        \"creation_name\": {},", py_str(&manager.creation_name)));
    lines.push(format!("        \"dialect\": {},", optional(dialect.map(|d| d.name))));
    lines.push(format!(
        "        \"connection_string\": {},",
        py_value(&manager.connection_string, &location)
    ));
    let parameters = connection_parameters(manager);
    if parameters.is_empty() {
        lines.push("        \"parameters\": {},".to_string());
    } else {
        lines.push("        \"parameters\": {".to_string());
        for (key, value) in &parameters {
            lines.push(format!("            {}: {},", py_str(key), value));
        }
        lines.push("        },".to_string());
    }
    let path = if manager.is_file_based() {
        file_path(manager, &location)
    } else {
        "None".to_string()
    };
    lines.push(format!("        \"path\": {},", path));
    lines.push("        \"url\": None,".to_string());
    lines.push("    },".to_string());
    lines
}

fn variable_line(variable: &Variable) -> String {
    let name = variable.qualified_name();
    let location = format!("Package.Variables[{}].Value", name);
    format!("    {}: {},", py_str(&name), py_value(&variable.value, &location))
}

fn binding_block(bindings: &BindingSet) -> Vec<String> {
    let mut lines = Vec::new();
    for binding in bindings.iter() {
        let (kind, variable) = match binding.kind {
            BindingKind::Environment => ("environment", "None".to_string()),
            BindingKind::PackageVariable => ("package_variable", py_str(&binding.qualified_name())),
        };
        lines.push(format!("    {}: {{", py_str(&binding.name)));
        lines.push(format!("        \"kind\": {},", py_str(kind)));
        lines.push(format!("        \"token\": {},", py_str(&binding.token)));
        lines.push(format!("        \"variable\": {},", variable));
        lines.push(format!(
            "        \"locations\": [{}],",
            binding.locations.iter().map(|l| py_str(l)).collect::<Vec<_>>().join(", ")
        ));
        lines.push("    },".to_string());
    }
    lines
}

fn manual_input_block<'d>(diagnostics: impl Iterator<Item = &'d Diagnostic>) -> Vec<String> {
    let mut lines = Vec::new();
    for diagnostic in diagnostics.filter(|d| d.needs_review()) {
        let report = diagnostic.report();
        let location = report.source_location.as_ref().and_then(|l| {
            l.component
                .as_ref()
                .map(|c| c.to_string())
                .or_else(|| l.element_path.clone())
        });
        lines.push(format!(
            "    {{\"category\": {}, \"location\": {}, \"message\": {}}},",
            py_str(&report.category.to_string()),
            optional(location.as_deref()),
            py_str(&report.message)
        ));
    }
    lines
}

fn is_package_field(name: &str) -> bool {
    ["Name", "ObjectName", "Description"]
        .iter()
        .any(|field| field.eq_ignore_ascii_case(name))
}

/// A package text field, or its placeholder when an override sealed it
fn package_field(package: &PackageModel, property: &str, text: &str) -> String {
    let sealed = package
        .properties
        .iter()
        .find(|(name, value)| {
            value.is_sealed()
                && (name.eq_ignore_ascii_case(property)
                    || (property == "Name" && name.eq_ignore_ascii_case("ObjectName")))
        });
    match sealed {
        Some((name, value)) => py_value(value, &format!("Package.Properties[{}]", name)),
        None => py_str(text),
    }
}

fn block(lines: &mut Vec<String>, header: &str, body: Vec<String>, open: char, close: char) {
    if body.is_empty() {
        lines.push(format!("{} = {}{}", header, open, close));
    } else {
        lines.push(format!("{} = {}", header, open));
        lines.extend(body);
        lines.push(close.to_string());
    }
    lines.push(String::new());
}

/// Render the configuration module
pub fn render_config<'d>(
    package: &PackageModel,
    bindings: &BindingSet,
    diagnostics: impl Iterator<Item = &'d Diagnostic>,
    runtime_module: &str,
) -> String {
    let mut lines = vec![
        format!("\"\"\"Configuration for package {}\"\"\"", doc_text(&package.name)),
        String::new(),
        "import os".to_string(),
        String::new(),
        format!("from {} import ManualInput", runtime_module),
        String::new(),
    ];

    let mut metadata = vec![
        format!("    \"name\": {},", package_field(package, "Name", &package.name)),
        format!("    \"version\": {},", py_str(&package.version)),
        format!("    \"description\": {},", package_field(package, "Description", &package.description)),
        format!("    \"package_id\": {},", py_str(&package.package_id)),
        format!("    \"creator\": {},", optional(package.creator.as_deref())),
        format!("    \"creation_date\": {},", optional(package.creation_date.as_deref())),
    ];
    let overrides: Vec<(&str, &PropertyValue)> = package
        .properties
        .iter()
        .filter(|(name, _)| !is_package_field(name))
        .collect();
    if !package.metadata.is_empty() || !overrides.is_empty() {
        metadata.push("    \"properties\": {".to_string());
        for (key, value) in &package.metadata {
            metadata.push(format!("        {}: {},", py_str(key), py_str(value)));
        }
        for (key, value) in overrides {
            let location = format!("Package.Properties[{}]", key);
            metadata.push(format!("        {}: {},", py_str(key), py_value(value, &location)));
        }
        metadata.push("    },".to_string());
    }
    block(&mut lines, "PACKAGE_METADATA", metadata, '{', '}');

    let connections = package.connection_managers.iter().flat_map(connection_block).collect();
    block(&mut lines, "CONNECTIONS", connections, '{', '}');

    let variables = package.variables.iter().map(variable_line).collect();
    block(&mut lines, "VARIABLES", variables, '{', '}');

    block(&mut lines, "REQUIRED_BINDINGS", binding_block(bindings), '{', '}');
    block(&mut lines, "MANUAL_INPUTS", manual_input_block(diagnostics), '[', ']');

    lines.push(String::new());
    lines.extend(
        RESOLVE_BINDINGS
            .lines()
            .map(str::to_string),
    );
    let mut source = lines.join("\n");
    source.push('\n');
    source
}

const RESOLVE_BINDINGS: &str = r#"def resolve_bindings(environ=None):
    """Return the value of every required binding

    Environment bindings read `environ` (default: the process environment),
    variable bindings read VARIABLES. Raises LookupError naming every
    binding that is unset or still needs manual input.
    """
    environ = os.environ if environ is None else environ
    values = {}
    missing = []
    for name, binding in REQUIRED_BINDINGS.items():
        if binding["kind"] == "environment":
            value = environ.get(name)
        else:
            value = VARIABLES.get(binding["variable"])
        if value is None or isinstance(value, ManualInput):
            missing.append(name)
        else:
            values[name] = value
    if missing:
        raise LookupError("unresolved bindings: " + ", ".join(sorted(missing)))
    return values"#;
