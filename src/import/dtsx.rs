//! Package importer
//!
//! Walks a parsed `.dtsx` document and extracts connection managers,
//! variables and parameters, executables (data flows and control-flow
//! tasks), precedence constraints and declared configurations into a
//! [`PackageModel`].

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::dataflow::ComponentExtractor;
use super::xml::{NsAlias, XmlDocument, XmlElement};
use crate::classify::ComponentClassifier;
use crate::error::{
    Diagnostic, FileSystemError, ManualInputRequired, MigrationResult, ParsingError,
    StructureWarning,
};
use crate::models::value::parse_bool;
use crate::models::{
    ConnectionManager, ControlFlowTask, DataFlow, DeclaredConfiguration, PackageModel,
    PrecedenceConstraint, PropertyMap, PropertyValue, SemanticType, TaskKind, Variable,
};

const DTS: NsAlias = NsAlias::Dts;

/// Executable type tags that denote a data-flow container
const DATA_FLOW_TYPES: &[&str] = &[
    "microsoft.pipeline",
    "ssis.pipeline",
    "microsoft.dataflowtask",
    "stock:pipelinetask",
    "{5918251b-2970-45a4-ab5f-01c3c588fe5a}",
];

/// Root attributes stored in named fields or under a fixed metadata key
const MAPPED_ROOT_ATTRIBUTES: &[&str] = &[
    "ObjectName",
    "DTSID",
    "Description",
    "CreationDate",
    "CreatorName",
    "CreatorComputerName",
    "VersionMajor",
    "VersionMinor",
    "VersionBuild",
    "VersionGUID",
    "PackageType",
    "ExecutableType",
    "CreationName",
];

/// Result of extracting one package
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub model: PackageModel,
    /// Recoverable conditions met during extraction, in discovery order
    pub diagnostics: Vec<Diagnostic>,
}

/// Imports `.dtsx` packages into the package model
#[derive(Debug, Default)]
pub struct DtsxImporter {
    classifier: ComponentClassifier,
}

impl DtsxImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom classification chain
    pub fn with_classifier(classifier: ComponentClassifier) -> Self {
        Self { classifier }
    }

    /// Read and extract a package file
    pub fn import_file(&self, path: &Path) -> MigrationResult<ImportOutcome> {
        if !path.exists() {
            return Err(FileSystemError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let is_package = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("dtsx"));
        if !is_package {
            return Err(FileSystemError::UnexpectedExtension {
                path: path.to_path_buf(),
                expected: "dtsx".to_string(),
            }
            .into());
        }

        let bytes = fs::read(path).map_err(|e| FileSystemError::io(path, "failed to read package", e))?;
        let mut outcome = self.parse(&bytes)?;
        if outcome.model.name.is_empty() {
            outcome.model.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        outcome.model.source_path = Some(path.to_path_buf());
        Ok(outcome)
    }

    /// Extract a package from raw document bytes
    pub fn parse(&self, bytes: &[u8]) -> Result<ImportOutcome, ParsingError> {
        let document = XmlDocument::parse(bytes)?;
        self.import_document(&document)
    }

    pub fn parse_str(&self, xml: &str) -> Result<ImportOutcome, ParsingError> {
        let document = XmlDocument::parse_str(xml)?;
        self.import_document(&document)
    }

    fn import_document(&self, document: &XmlDocument) -> Result<ImportOutcome, ParsingError> {
        let root = &document.root;
        if !root.is(DTS, "Executable") {
            return Err(ParsingError::missing("DTS:Executable", "document root"));
        }

        let mut extraction = Extraction {
            classifier: &self.classifier,
            model: PackageModel::default(),
            diagnostics: Vec::new(),
        };
        extraction.package_attributes(root);
        extraction.connections(root);
        extraction.variables(root);
        let root_path = root
            .value_non_empty(DTS, "refId")
            .unwrap_or_else(|| "Package".to_string());
        extraction.executables(root, &root_path, None);
        extraction.configurations(root);

        let model = &extraction.model;
        info!(
            package = %model.name,
            connections = model.connection_managers.len(),
            variables = model.variables.len(),
            data_flows = model.data_flow_components.len(),
            components = model.component_count(),
            tasks = model.control_flow_tasks.len(),
            diagnostics = extraction.diagnostics.len(),
            "Package extracted"
        );

        Ok(ImportOutcome {
            model: extraction.model,
            diagnostics: extraction.diagnostics,
        })
    }
}

/// Mutable state of one extraction run
struct Extraction<'a> {
    classifier: &'a ComponentClassifier,
    model: PackageModel,
    diagnostics: Vec<Diagnostic>,
}

impl Extraction<'_> {
    fn package_attributes(&mut self, root: &XmlElement) {
        let model = &mut self.model;
        model.name = root.value_non_empty(DTS, "ObjectName").unwrap_or_default();
        model.package_id = root.value_non_empty(DTS, "DTSID").unwrap_or_default();
        model.description = root.value(DTS, "Description").unwrap_or_default();
        model.creation_date = root.value_non_empty(DTS, "CreationDate");
        model.creator = root.value_non_empty(DTS, "CreatorName");

        let part = |name: &str| root.value_non_empty(DTS, name).unwrap_or_else(|| "0".to_string());
        model.version = format!("{}.{}.{}", part("VersionMajor"), part("VersionMinor"), part("VersionBuild"));

        for (key, attribute) in [
            ("executable_type", "ExecutableType"),
            ("creation_name", "CreationName"),
            ("creator_computer", "CreatorComputerName"),
            ("package_type", "PackageType"),
            ("version_guid", "VersionGUID"),
        ] {
            if let Some(value) = root.value_non_empty(DTS, attribute) {
                model.metadata.insert(key.to_string(), value);
            }
        }
        for attribute in &root.attributes {
            let local = attribute.name.local.as_str();
            if MAPPED_ROOT_ATTRIBUTES.contains(&local) || attribute.value.trim().is_empty() {
                continue;
            }
            model
                .metadata
                .entry(local.to_string())
                .or_insert_with(|| attribute.value.clone());
        }
    }

    fn connections(&mut self, root: &XmlElement) {
        let elements: Vec<&XmlElement> = root
            .child(DTS, "ConnectionManagers")
            .into_iter()
            .flat_map(|c| c.children(DTS, "ConnectionManager"))
            .collect();
        for (index, element) in elements.into_iter().enumerate() {
            let connection = self.connection(element, index);
            debug!(name = %connection.name, kind = %connection.connection_type, "Extracted connection manager");
            self.model.connection_managers.push(connection);
        }
    }

    fn connection(&mut self, element: &XmlElement, index: usize) -> ConnectionManager {
        let name = element
            .value_non_empty(DTS, "ObjectName")
            .unwrap_or_else(|| format!("Connection {}", index + 1));
        let id = element.value_non_empty(DTS, "DTSID").unwrap_or_else(|| name.clone());
        let creation_name = element.value_non_empty(DTS, "CreationName").unwrap_or_default();

        let mut connection = ConnectionManager::new(id, name, &creation_name);
        connection.description = element.value_non_empty(DTS, "Description");

        let inner = element.find_path(DTS, &["ObjectData", "ConnectionManager"]);
        let connection_string = element
            .value_non_empty(DTS, "ConnectionString")
            .or_else(|| inner.and_then(|i| i.value_non_empty(DTS, "ConnectionString")));
        if let Some(connection_string) = connection_string {
            connection.connection_string = PropertyValue::String(connection_string);
        }

        if let Some(inner) = inner {
            for (key, value) in payload_properties(inner).iter() {
                if key.eq_ignore_ascii_case("ConnectionString") {
                    continue;
                }
                connection.properties.insert(key, value.clone());
            }
            for password in inner.children(DTS, "Password") {
                connection
                    .properties
                    .insert("Password", PropertyValue::sealed(password.text()));
            }
        }

        for (key, value) in connection.properties.iter() {
            if value.is_sealed() {
                let location = format!("Package.Connections[{}].Properties[{}]", connection.name, key);
                self.diagnostics.push(
                    ManualInputRequired::new(location, "encrypted value requires manual decryption").into(),
                );
            }
        }
        connection
    }

    fn variables(&mut self, root: &XmlElement) {
        let variables: Vec<&XmlElement> = root
            .child(DTS, "Variables")
            .into_iter()
            .flat_map(|c| c.children(DTS, "Variable"))
            .collect();
        for (index, element) in variables.into_iter().enumerate() {
            let variable = read_variable(element, index);
            debug!(variable = %variable.qualified_name(), data_type = %variable.data_type, "Extracted variable");
            self.model.variables.push(variable);
        }

        let parameters: Vec<&XmlElement> = root
            .child(DTS, "PackageParameters")
            .into_iter()
            .flat_map(|c| c.children(DTS, "PackageParameter"))
            .collect();
        for (index, element) in parameters.into_iter().enumerate() {
            let parameter = read_parameter(element, index);
            if parameter.value.is_sealed() {
                self.diagnostics.push(
                    ManualInputRequired::new(
                        parameter.qualified_name(),
                        "sensitive parameter value requires manual input",
                    )
                    .into(),
                );
            }
            debug!(parameter = %parameter.qualified_name(), "Extracted package parameter");
            self.model.variables.push(parameter);
        }
    }

    /// Walk the executables of a container, recursing into nested containers
    fn executables(&mut self, container: &XmlElement, container_path: &str, parent: Option<&str>) {
        let executables: Vec<&XmlElement> = container
            .child(DTS, "Executables")
            .into_iter()
            .flat_map(|c| c.children(DTS, "Executable"))
            .collect();

        for (index, executable) in executables.into_iter().enumerate() {
            let name = executable
                .value_non_empty(DTS, "ObjectName")
                .unwrap_or_else(|| format!("Executable {}", index + 1));
            let ref_path = executable
                .value_non_empty(DTS, "refId")
                .unwrap_or_else(|| format!("{}\\{}", container_path, name));
            let id = executable.value_non_empty(DTS, "DTSID").unwrap_or_else(|| ref_path.clone());
            let creation_name = executable.value_non_empty(DTS, "CreationName").unwrap_or_default();
            let executable_type = executable
                .value_non_empty(DTS, "ExecutableType")
                .unwrap_or_else(|| creation_name.clone());
            let description = executable.value(DTS, "Description").unwrap_or_default();

            if is_data_flow(&executable_type) || is_data_flow(&creation_name) {
                let mut flow = DataFlow::new(id, name, ref_path);
                flow.description = description;
                if let Some(parent) = parent {
                    flow.properties.insert("parent", PropertyValue::String(parent.to_string()));
                }
                let (flow, diagnostics) = ComponentExtractor::new(self.classifier).extract(executable, flow);
                debug!(
                    data_flow = %flow.ref_path,
                    components = flow.components.len(),
                    edges = flow.edges.len(),
                    "Extracted data flow"
                );
                self.diagnostics.extend(diagnostics);
                self.model.executable_order.push(flow.ref_path.clone());
                self.model.data_flow_components.push(flow);
                continue;
            }

            let mut task = ControlFlowTask::new(id, name, executable_type);
            if !creation_name.is_empty() {
                task.creation_name = creation_name;
            }
            task.description = description;
            task.ref_path = ref_path.clone();
            task.parent = parent.map(str::to_string);
            task.properties = task_properties(executable);
            if executable.value(DTS, "Disabled").as_deref().and_then(parse_bool) == Some(true) {
                task.metadata.insert("disabled".to_string(), "true".to_string());
            }
            let nested = task.kind() == TaskKind::Container || executable.child(DTS, "Executables").is_some();
            debug!(task = %task.ref_path, task_type = %task.task_type, "Extracted task");
            self.model.executable_order.push(task.ref_path.clone());
            self.model.control_flow_tasks.push(task);

            if nested {
                self.executables(executable, &ref_path, Some(&ref_path));
            }
        }

        self.precedence_constraints(container, container_path);
    }

    fn precedence_constraints(&mut self, container: &XmlElement, container_path: &str) {
        let constraints = container
            .child(DTS, "PrecedenceConstraints")
            .into_iter()
            .flat_map(|c| c.children(DTS, "PrecedenceConstraint"));
        for constraint in constraints {
            match (
                constraint.value_non_empty(DTS, "From"),
                constraint.value_non_empty(DTS, "To"),
            ) {
                (Some(from), Some(to)) => self.model.precedence_constraints.push(PrecedenceConstraint {
                    from,
                    to,
                    value: constraint.value_non_empty(DTS, "Value"),
                }),
                _ => self.diagnostics.push(
                    StructureWarning::new(
                        "Precedence constraint without From/To ignored",
                        Some(container_path.to_string()),
                    )
                    .into(),
                ),
            }
        }
    }

    fn configurations(&mut self, root: &XmlElement) {
        let declared = root.children(DTS, "Configuration").chain(
            root.child(DTS, "Configurations")
                .into_iter()
                .flat_map(|c| c.children(DTS, "Configuration")),
        );
        for (index, element) in declared.enumerate() {
            let configuration = DeclaredConfiguration {
                name: element
                    .value_non_empty(DTS, "ObjectName")
                    .unwrap_or_else(|| format!("Configuration {}", index + 1)),
                configuration_type: element
                    .value_non_empty(DTS, "ConfigurationType")
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0),
                configuration_string: element.value_non_empty(DTS, "ConfigurationString").unwrap_or_default(),
            };
            debug!(name = %configuration.name, kind = configuration.configuration_type, "Declared configuration");
            self.model.declared_configurations.push(configuration);
        }
    }
}

fn is_data_flow(tag: &str) -> bool {
    let tag = tag.trim().to_ascii_lowercase();
    DATA_FLOW_TYPES.iter().any(|t| tag == *t || tag.starts_with(&format!("{}.", t)))
}

/// Whether a nested `Property` element is flagged sensitive or encrypted
fn is_sensitive(element: &XmlElement) -> bool {
    ["Sensitive", "Encrypted"]
        .iter()
        .any(|flag| element.attr(DTS, flag).and_then(parse_bool).unwrap_or(false))
}

/// Attributes and nested `Property` elements of an `ObjectData` payload
fn payload_properties(element: &XmlElement) -> PropertyMap {
    let mut properties = PropertyMap::new();
    for attribute in &element.attributes {
        properties.insert(
            attribute.name.local.clone(),
            PropertyValue::String(attribute.value.clone()),
        );
    }
    for property in element.children(DTS, "Property") {
        let Some(name) = property.attr(DTS, "Name") else {
            continue;
        };
        let value = if is_sensitive(property) {
            PropertyValue::sealed(property.text())
        } else {
            PropertyValue::String(property.text().to_string())
        };
        properties.insert(name, value);
    }
    properties
}

/// Task properties from `ObjectData`; SQL tasks get canonical keys
fn task_properties(executable: &XmlElement) -> PropertyMap {
    let Some(object_data) = executable.child(DTS, "ObjectData") else {
        return PropertyMap::new();
    };
    let Some(sql) = object_data.child(NsAlias::SqlTask, "SqlTaskData") else {
        return object_data
            .children
            .first()
            .map(payload_properties)
            .unwrap_or_default();
    };

    let raw = payload_properties(sql);
    let mut properties = PropertyMap::new();
    for (key, source) in [
        ("connection", "Connection"),
        ("sql_statement", "SqlStatementSource"),
        ("result_type", "ResultType"),
    ] {
        let value = raw.get(source).cloned().unwrap_or_default();
        properties.insert(key, value);
    }
    for (key, value) in raw.iter() {
        if !["Connection", "SqlStatementSource", "ResultType"]
            .iter()
            .any(|k| k.eq_ignore_ascii_case(key))
        {
            properties.insert(key, value.clone());
        }
    }

    let bindings: Vec<String> = sql
        .children(NsAlias::SqlTask, "ParameterBinding")
        .filter_map(|b| b.attr(NsAlias::SqlTask, "DtsVariableName").map(str::to_string))
        .collect();
    if !bindings.is_empty() {
        properties.insert("parameter_bindings", PropertyValue::String(bindings.join(",")));
    }
    properties
}

fn read_variable(element: &XmlElement, index: usize) -> Variable {
    let name = element
        .value_non_empty(DTS, "ObjectName")
        .unwrap_or_else(|| format!("Variable{}", index + 1));
    let namespace = element
        .value_non_empty(DTS, "Namespace")
        .unwrap_or_else(|| "User".to_string());
    let value_element = element.child(DTS, "VariableValue");
    let raw = value_element
        .map(|v| v.text().to_string())
        .or_else(|| element.value(DTS, "Value"))
        .unwrap_or_default();
    let code = element
        .value_non_empty(DTS, "DataType")
        .or_else(|| value_element.and_then(|v| v.attr(DTS, "DataType")).map(str::to_string))
        .and_then(|c| c.trim().parse::<i32>().ok());

    let mut variable = Variable::new(namespace, name, raw);
    if let Some(code) = code {
        variable = variable.with_data_type(SemanticType::from_dts_code(code));
    }
    variable.id = element.value_non_empty(DTS, "DTSID").unwrap_or_default();
    variable.description = element.value_non_empty(DTS, "Description");
    variable.read_only = element
        .value(DTS, "ReadOnly")
        .as_deref()
        .and_then(parse_bool)
        .unwrap_or(false);
    if element.value(DTS, "EvaluateAsExpression").as_deref().and_then(parse_bool) == Some(true) {
        variable.metadata.insert("evaluate_as_expression".to_string(), "true".to_string());
    }
    if let Some(expression) = element.value_non_empty(DTS, "Expression") {
        variable.metadata.insert("expression".to_string(), expression);
    }
    variable
}

fn read_parameter(element: &XmlElement, index: usize) -> Variable {
    let name = element
        .value_non_empty(DTS, "ObjectName")
        .unwrap_or_else(|| format!("Parameter{}", index + 1));
    let raw = element.value(DTS, "ParameterValue").unwrap_or_default();
    let sensitive = element.value(DTS, "Sensitive").as_deref().and_then(parse_bool) == Some(true);

    let mut parameter = Variable::new("$Package", name, raw.clone());
    if let Some(code) = element
        .value_non_empty(DTS, "DataType")
        .and_then(|c| c.trim().parse::<i32>().ok())
    {
        parameter = parameter.with_data_type(SemanticType::from_dts_code(code));
    }
    if sensitive {
        parameter.value = PropertyValue::sealed(raw);
    }
    parameter.id = element.value_non_empty(DTS, "DTSID").unwrap_or_default();
    parameter.description = element.value_non_empty(DTS, "Description");
    parameter.is_parameter = true;
    if element.value(DTS, "Required").as_deref().and_then(parse_bool) == Some(true) {
        parameter.metadata.insert("required".to_string(), "true".to_string());
    }
    parameter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperatorType;

    const PACKAGE: &str = r#"<?xml version="1.0"?>
<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts"
    DTS:refId="Package"
    DTS:ObjectName="LoadOrders"
    DTS:DTSID="{PKG-1}"
    DTS:Description="Nightly order load"
    DTS:CreationDate="3/1/2023 10:00:00 AM"
    DTS:CreatorName="etl"
    DTS:VersionMajor="1" DTS:VersionMinor="2" DTS:VersionBuild="7"
    DTS:ExecutableType="Microsoft.Package"
    DTS:LocaleID="1033">
  <DTS:ConnectionManagers>
    <DTS:ConnectionManager DTS:ObjectName="Warehouse" DTS:DTSID="{CM-1}" DTS:CreationName="OLEDB">
      <DTS:ObjectData>
        <DTS:ConnectionManager DTS:ConnectionString="Data Source=db01;Initial Catalog=Sales;Provider=SQLNCLI11.1;" DTS:Retain="True">
          <DTS:Password DTS:Name="Password" Sensitive="1">AQAAANCMnd8</DTS:Password>
        </DTS:ConnectionManager>
      </DTS:ObjectData>
    </DTS:ConnectionManager>
  </DTS:ConnectionManagers>
  <DTS:Variables>
    <DTS:Variable DTS:ObjectName="SourceTable" DTS:Namespace="User" DTS:DTSID="{V-1}">
      <DTS:VariableValue DTS:DataType="8">dbo.Orders</DTS:VariableValue>
    </DTS:Variable>
    <DTS:Variable DTS:ObjectName="BatchSize">
      <DTS:VariableValue DTS:DataType="3">500</DTS:VariableValue>
    </DTS:Variable>
  </DTS:Variables>
  <DTS:Executables>
    <DTS:Executable DTS:refId="Package\Prepare" DTS:ObjectName="Prepare" DTS:ExecutableType="STOCK:SEQUENCE">
      <DTS:Executables>
        <DTS:Executable DTS:refId="Package\Prepare\Truncate" DTS:ObjectName="Truncate" DTS:ExecutableType="Microsoft.ExecuteSQLTask">
          <DTS:ObjectData>
            <SQLTask:SqlTaskData xmlns:SQLTask="www.microsoft.com/sqlserver/dts/tasks/sqltask"
                SQLTask:Connection="{CM-1}" SQLTask:SqlStatementSource="TRUNCATE TABLE stg.Orders">
              <SQLTask:ParameterBinding SQLTask:ParameterName="0" SQLTask:DtsVariableName="User::BatchSize"/>
            </SQLTask:SqlTaskData>
          </DTS:ObjectData>
        </DTS:Executable>
      </DTS:Executables>
    </DTS:Executable>
    <DTS:Executable DTS:refId="Package\Load" DTS:ObjectName="Load" DTS:ExecutableType="Microsoft.Pipeline">
      <DTS:ObjectData>
        <pipeline version="1">
          <components>
            <component refId="Package\Load\Sort" name="Sort" componentClassID="Microsoft.Sort"/>
          </components>
        </pipeline>
      </DTS:ObjectData>
    </DTS:Executable>
  </DTS:Executables>
  <DTS:PrecedenceConstraints>
    <DTS:PrecedenceConstraint DTS:From="Package\Prepare" DTS:To="Package\Load" DTS:Value="0"/>
  </DTS:PrecedenceConstraints>
  <DTS:Configurations>
    <DTS:Configuration DTS:ObjectName="Env" DTS:ConfigurationType="1" DTS:ConfigurationString="LoadOrders.dtsConfig"/>
  </DTS:Configurations>
</DTS:Executable>"#;

    fn import() -> ImportOutcome {
        DtsxImporter::new().parse_str(PACKAGE).unwrap()
    }

    #[test]
    fn test_package_attributes() {
        let model = import().model;
        assert_eq!(model.name, "LoadOrders");
        assert_eq!(model.package_id, "{PKG-1}");
        assert_eq!(model.version, "1.2.7");
        assert_eq!(model.creator.as_deref(), Some("etl"));
        assert_eq!(model.metadata.get("executable_type").map(String::as_str), Some("Microsoft.Package"));
        assert_eq!(model.metadata.get("LocaleID").map(String::as_str), Some("1033"));
    }

    #[test]
    fn test_connection_from_object_data() {
        let outcome = import();
        let connection = &outcome.model.connection_managers[0];
        assert_eq!(connection.connection_type, "OLEDB");
        assert_eq!(connection.parameters().get("initial catalog").map(String::as_str), Some("Sales"));
        assert!(connection.properties.get("Password").unwrap().is_sealed());
        assert_eq!(connection.properties.text("Retain").as_deref(), Some("True"));
        assert!(
            outcome
                .diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::ManualInput(m) if m.location.contains("Warehouse")))
        );
    }

    #[test]
    fn test_variables() {
        let model = import().model;
        assert_eq!(model.variables.len(), 2);
        let table = model.variable(Some("User"), "SourceTable").unwrap();
        assert_eq!(table.value, PropertyValue::String("dbo.Orders".to_string()));
        assert_eq!(table.data_type, SemanticType::String);
        let batch = model.variable(None, "BatchSize").unwrap();
        assert_eq!(batch.namespace, "User");
        assert_eq!(batch.data_type, SemanticType::Int32);
    }

    #[test]
    fn test_nested_tasks_and_data_flows() {
        let model = import().model;
        assert_eq!(model.control_flow_tasks.len(), 2);
        let truncate = model.task_at("\\Package\\Prepare\\Truncate").unwrap();
        assert_eq!(truncate.parent.as_deref(), Some("Package\\Prepare"));
        assert_eq!(truncate.kind(), TaskKind::ExecuteSql);
        assert_eq!(truncate.properties.text("connection").as_deref(), Some("{CM-1}"));
        assert_eq!(
            truncate.properties.text("sql_statement").as_deref(),
            Some("TRUNCATE TABLE stg.Orders")
        );
        assert_eq!(
            truncate.properties.text("parameter_bindings").as_deref(),
            Some("User::BatchSize")
        );

        assert_eq!(model.data_flow_components.len(), 1);
        let flow = &model.data_flow_components[0];
        assert_eq!(flow.components[0].id, "Package\\Load\\Sort");
        assert_eq!(flow.components[0].operator_type, OperatorType::Sort);
    }

    #[test]
    fn test_constraints_and_configurations() {
        let model = import().model;
        assert_eq!(model.precedence_constraints.len(), 1);
        assert_eq!(model.precedence_constraints[0].to, "Package\\Load");
        assert_eq!(model.declared_configurations.len(), 1);
        assert!(model.declared_configurations[0].is_xml_file());
    }

    #[test]
    fn test_missing_sections_yield_empty_sequences() {
        let xml = r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts" DTS:ObjectName="Empty"/>"#;
        let model = DtsxImporter::new().parse_str(xml).unwrap().model;
        assert!(model.connection_managers.is_empty());
        assert!(model.variables.is_empty());
        assert!(model.data_flow_components.is_empty());
        assert!(model.control_flow_tasks.is_empty());
        assert_eq!(model.version, "0.0.0");
    }

    #[test]
    fn test_wrong_root_rejected() {
        let err = DtsxImporter::new().parse_str("<Package/>").unwrap_err();
        assert!(matches!(err, ParsingError::MissingElement { .. }));
    }

    #[test]
    fn test_legacy_nested_properties() {
        let xml = r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts">
  <DTS:Property DTS:Name="ObjectName">Legacy</DTS:Property>
  <DTS:Variables>
    <DTS:Variable>
      <DTS:Property DTS:Name="ObjectName">Cutoff</DTS:Property>
      <DTS:Property DTS:Name="Namespace">User</DTS:Property>
      <DTS:VariableValue DTS:DataType="7">2023-01-01 00:00:00</DTS:VariableValue>
    </DTS:Variable>
  </DTS:Variables>
</DTS:Executable>"#;
        let model = DtsxImporter::new().parse_str(xml).unwrap().model;
        assert_eq!(model.name, "Legacy");
        assert_eq!(model.variables[0].name, "Cutoff");
        assert_eq!(model.variables[0].data_type, SemanticType::DateTime);
    }
}
