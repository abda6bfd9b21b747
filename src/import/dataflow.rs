//! Data-flow payload extraction
//!
//! Reads the `ObjectData/pipeline` payload of a data-flow executable into
//! a [`DataFlow`]: components with their ports and columns, the path graph,
//! and the lineage index used to name input columns and fill in edges that
//! the path section leaves out.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::xml::{NsAlias, XmlElement};
use crate::classify::ComponentClassifier;
use crate::error::{Diagnostic, StructureWarning};
use crate::models::value::parse_bool;
use crate::models::{
    ColumnDef, ComponentKey, ComponentPort, ConnectionRef, DataFlow, DataFlowComponent,
    DataFlowEdge, PropertyMap, PropertyValue, SemanticType,
};

const P: NsAlias = NsAlias::Pipeline;

/// Extracts the components of one data-flow container
pub struct ComponentExtractor<'a> {
    classifier: &'a ComponentClassifier,
}

impl<'a> ComponentExtractor<'a> {
    pub fn new(classifier: &'a ComponentClassifier) -> Self {
        Self { classifier }
    }

    /// Populate `flow` from the payload of its executable element
    pub fn extract(&self, executable: &XmlElement, mut flow: DataFlow) -> (DataFlow, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let Some(payload) = data_flow_payload(executable) else {
            debug!(data_flow = %flow.ref_path, "Data flow has no pipeline payload");
            return (flow, diagnostics);
        };

        let mut seen: HashMap<String, usize> = HashMap::new();
        let elements = payload
            .child(P, "components")
            .into_iter()
            .flat_map(|c| c.children(P, "component"));
        for (index, element) in elements.enumerate() {
            let mut component = read_component(element, &flow.ref_path, index);

            let count = seen.entry(component.id.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                let renamed = format!("{}#{}", component.id, count);
                let warning = StructureWarning::new(
                    format!(
                        "Duplicate component id '{}' in '{}' renamed to '{}'",
                        component.id, flow.ref_path, renamed
                    ),
                    Some(flow.ref_path.clone()),
                );
                warn!(data_flow = %flow.ref_path, id = %component.id, "{}", warning);
                diagnostics.push(warning.into());
                component.id = renamed;
            }

            if let Some(warning) = self.classifier.apply(&mut component) {
                diagnostics.push(warning.into());
            }
            debug!(
                component = %component.key(),
                operator = %component.operator_type,
                "Extracted component"
            );
            flow.components.push(component);
        }

        flow.reindex();
        name_input_columns(&mut flow);
        diagnostics.extend(resolve_paths(payload, &mut flow));
        add_lineage_edges(&mut flow);
        (flow, diagnostics)
    }
}

/// `ObjectData/pipeline` (current layout) or `ObjectData/dataflow`
fn data_flow_payload(executable: &XmlElement) -> Option<&XmlElement> {
    let object_data = executable.child(NsAlias::Dts, "ObjectData")?;
    object_data
        .child(P, "pipeline")
        .or_else(|| object_data.child(P, "dataflow"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_u32(value: Option<&str>) -> Option<u32> {
    value.and_then(|v| v.trim().parse().ok())
}

fn read_component(element: &XmlElement, container: &str, index: usize) -> DataFlowComponent {
    let ref_id = non_empty(element.attr(P, "refId"));
    let id = non_empty(element.attr(P, "id"))
        .or_else(|| ref_id.clone())
        .unwrap_or_else(|| format!("component{}", index + 1));
    let name = element.attr(P, "name").unwrap_or_default().to_string();

    let mut component = DataFlowComponent::new(container, id, name);
    component.ref_id = ref_id;
    component.description = element.attr(P, "description").unwrap_or_default().to_string();
    component.class_id = element.attr(P, "componentClassID").unwrap_or_default().to_string();
    if let Some(contact) = non_empty(element.attr(P, "contactInfo")) {
        component.metadata.insert("contact_info".to_string(), contact);
    }
    if let Some(version) = non_empty(element.attr(P, "version")) {
        component.metadata.insert("version".to_string(), version);
    }
    component.properties = read_properties(element.child(P, "properties"));

    component.connections = element
        .child(P, "connections")
        .into_iter()
        .flat_map(|c| c.children(P, "connection"))
        .filter_map(|c| {
            let manager = non_empty(c.attr(P, "connectionManagerID"))
                .or_else(|| non_empty(c.attr(P, "connectionManagerRefId")))?;
            Some(ConnectionRef {
                name: non_empty(c.attr(P, "name")),
                manager,
            })
        })
        .collect();

    component.inputs = element
        .child(P, "inputs")
        .into_iter()
        .flat_map(|c| c.children(P, "input"))
        .enumerate()
        .map(|(i, el)| read_port(el, "Input", i, ("inputColumns", "inputColumn")))
        .collect();
    component.outputs = element
        .child(P, "outputs")
        .into_iter()
        .flat_map(|c| c.children(P, "output"))
        .enumerate()
        .map(|(i, el)| read_port(el, "Output", i, ("outputColumns", "outputColumn")))
        .collect();

    component
}

/// `<properties><property name=".." dataType="..">value</property></properties>`
fn read_properties(container: Option<&XmlElement>) -> PropertyMap {
    let mut properties = PropertyMap::new();
    let Some(container) = container else {
        return properties;
    };
    for property in container.children(P, "property") {
        let Some(name) = non_empty(property.attr(P, "name")) else {
            continue;
        };
        let raw = if property.text().is_empty() {
            property.attr(P, "value").unwrap_or_default()
        } else {
            property.text()
        };
        let encrypted = ["isEncrypted", "encrypted", "Sensitive"]
            .iter()
            .any(|flag| property.attr(P, flag).and_then(parse_bool).unwrap_or(false));
        let value = if encrypted {
            PropertyValue::sealed(raw)
        } else {
            PropertyValue::from_typed(property.attr(P, "dataType"), raw)
        };
        properties.insert(name, value);
    }
    properties
}

fn read_port(element: &XmlElement, kind: &str, index: usize, tags: (&str, &str)) -> ComponentPort {
    let name = non_empty(element.attr(P, "name")).unwrap_or_else(|| format!("{} {}", kind, index + 1));
    let mut port = ComponentPort::new(name);
    port.id = non_empty(element.attr(P, "id"));
    port.ref_id = non_empty(element.attr(P, "refId"));
    port.is_error_out = element.attr(P, "isErrorOut").and_then(parse_bool).unwrap_or(false);
    port.properties = read_properties(element.child(P, "properties"));
    copy_disposition(element, &mut port.properties);
    port.is_default_out = element.attr(P, "isDefaultOut").and_then(parse_bool).unwrap_or(false)
        || port.properties.flag("IsDefaultOut");

    let (list_tag, column_tag) = tags;
    port.columns = element
        .child(P, list_tag)
        .into_iter()
        .flat_map(|c| c.children(P, column_tag))
        .map(read_column)
        .collect();
    port
}

fn read_column(element: &XmlElement) -> ColumnDef {
    let first = |names: &[&str]| names.iter().find_map(|n| non_empty(element.attr(P, n)));

    let name = first(&["name", "cachedName"]).unwrap_or_default();
    let data_type = first(&["dataType", "cachedDataType"]);
    let semantic_type = data_type
        .as_deref()
        .map(SemanticType::from_pipeline_type)
        .unwrap_or_default();

    let mut column = ColumnDef::new(name, semantic_type);
    column.data_type = data_type;
    column.length = parse_u32(first(&["length", "cachedLength"]).as_deref());
    column.precision = parse_u32(first(&["precision", "cachedPrecision"]).as_deref());
    column.scale = parse_u32(first(&["scale", "cachedScale"]).as_deref());
    column.id = first(&["id", "refId"]);
    column.lineage_id = first(&["lineageId"]);
    column.properties = read_properties(element.child(P, "properties"));
    copy_disposition(element, &mut column.properties);
    column.expression = first(&["expression"])
        .or_else(|| column.properties.text("FriendlyExpression"))
        .or_else(|| column.properties.text("Expression"));
    column
}

/// Keep the `errorRowDisposition` attribute next to the declared properties
fn copy_disposition(element: &XmlElement, properties: &mut PropertyMap) {
    if let Some(disposition) = non_empty(element.attr(P, "errorRowDisposition")) {
        if !properties.contains("ErrorRowDisposition") {
            properties.insert("ErrorRowDisposition", PropertyValue::String(disposition));
        }
    }
}

/// Input columns without a name take the upstream column name
fn name_input_columns(flow: &mut DataFlow) {
    let lineage = &flow.lineage;
    for component in flow.components.iter_mut() {
        for column in component.inputs.iter_mut().flat_map(|p| p.columns.iter_mut()) {
            if !column.name.trim().is_empty() {
                continue;
            }
            if let Some(entry) = column.lineage_id.as_deref().and_then(|id| lineage.resolve(id)) {
                column.name = entry.column.clone();
            }
        }
    }
}

struct Endpoint {
    component: ComponentKey,
    port: String,
}

/// Resolve `<paths>` through port ids and refIds
fn resolve_paths(payload: &XmlElement, flow: &mut DataFlow) -> Vec<Diagnostic> {
    let mut outputs: HashMap<String, Endpoint> = HashMap::new();
    let mut inputs: HashMap<String, Endpoint> = HashMap::new();
    for component in &flow.components {
        for (ports, index) in [(&component.outputs, &mut outputs), (&component.inputs, &mut inputs)] {
            for port in ports {
                for id in [port.id.as_deref(), port.ref_id.as_deref()].into_iter().flatten() {
                    index.entry(id.to_string()).or_insert_with(|| Endpoint {
                        component: component.key(),
                        port: port.name.clone(),
                    });
                }
            }
        }
    }

    let mut diagnostics = Vec::new();
    let paths = payload
        .child(P, "paths")
        .into_iter()
        .flat_map(|p| p.children(P, "path"));
    for path in paths {
        let start_id = path.attr(P, "startId").unwrap_or_default().trim();
        let end_id = path.attr(P, "endId").unwrap_or_default().trim();
        match (outputs.get(start_id), inputs.get(end_id)) {
            (Some(start), Some(end)) => {
                let mut edge = DataFlowEdge::new(start.component.clone(), end.component.clone())
                    .from_output(start.port.clone());
                edge.end_input = Some(end.port.clone());
                flow.add_edge(edge);
            }
            (start, _) => {
                let unresolved = if start.is_none() { start_id } else { end_id };
                let label = path.attr(P, "name").unwrap_or("path");
                let warning = StructureWarning::new(
                    format!(
                        "Path '{}' in '{}' has an unresolved endpoint '{}'",
                        label, flow.ref_path, unresolved
                    ),
                    Some(flow.ref_path.clone()),
                );
                warn!(data_flow = %flow.ref_path, endpoint = unresolved, "Unresolved path endpoint");
                diagnostics.push(warning.into());
            }
        }
    }
    diagnostics
}

/// Derive edges from input-column lineage for components no path reaches
fn add_lineage_edges(flow: &mut DataFlow) {
    let mut derived = Vec::new();
    for component in &flow.components {
        let key = component.key();
        if flow.incoming(&key).next().is_some() {
            continue;
        }
        for port in &component.inputs {
            for column in &port.columns {
                let Some(entry) = column
                    .lineage_id
                    .as_deref()
                    .and_then(|id| flow.lineage.resolve(id))
                    .filter(|entry| entry.component != key)
                else {
                    continue;
                };
                let mut edge = DataFlowEdge::new(entry.component.clone(), key.clone())
                    .from_output(entry.output.clone());
                edge.end_input = Some(port.name.clone());
                derived.push(edge);
            }
        }
    }
    for edge in derived {
        flow.add_edge(edge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::xml::XmlDocument;
    use crate::models::{MatchStrategy, OperatorType};

    fn extract(xml: &str) -> (DataFlow, Vec<Diagnostic>) {
        let doc = XmlDocument::parse_str(xml).unwrap();
        let classifier = ComponentClassifier::new();
        ComponentExtractor::new(&classifier).extract(&doc.root, DataFlow::new("{F}", "Flow", "Package\\Flow"))
    }

    const FLOW: &str = r#"
<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts">
  <DTS:ObjectData>
    <pipeline version="1">
      <components>
        <component id="1" name="Read Orders" componentClassID="{E9216C7C-4A8A-4F77-8948-60C5D8C75F70}" description="OLE DB Source">
          <properties>
            <property name="CommandTimeout" dataType="System.Int32">30</property>
            <property name="SqlCommand" dataType="System.String">SELECT * FROM dbo.Orders</property>
          </properties>
          <connections>
            <connection id="5" name="OleDbConnection" connectionManagerID="{CM-1}"/>
          </connections>
          <outputs>
            <output id="2" name="OLE DB Source Output">
              <outputColumns>
                <outputColumn id="3" name="Amount" lineageId="3" dataType="r8"/>
              </outputColumns>
            </output>
            <output id="4" name="OLE DB Source Error Output" isErrorOut="true"/>
          </outputs>
        </component>
        <component id="10" name="Add Load Date" componentClassID="{C9C7375C-8340-4F56-A550-919B1E4F4C66}">
          <inputs>
            <input id="11" name="Derived Column Input">
              <inputColumns>
                <inputColumn id="12" lineageId="3"/>
              </inputColumns>
            </input>
          </inputs>
          <outputs>
            <output id="13" name="Derived Column Output">
              <outputColumns>
                <outputColumn id="14" name="LoadDate" lineageId="14" dataType="dbTimeStamp">
                  <properties>
                    <property name="Expression">GETDATE()</property>
                    <property name="FriendlyExpression">GETDATE()</property>
                  </properties>
                </outputColumn>
              </outputColumns>
            </output>
          </outputs>
        </component>
        <component id="10" name="Twin" componentClassID="Microsoft.Sort"/>
      </components>
      <paths>
        <path id="20" name="Source to Derived" startId="2" endId="11"/>
        <path id="21" name="Dangling" startId="99" endId="11"/>
      </paths>
    </pipeline>
  </DTS:ObjectData>
</DTS:Executable>"#;

    #[test]
    fn test_components_and_columns() {
        let (flow, _) = extract(FLOW);
        assert_eq!(flow.components.len(), 3);

        let source = &flow.components[0];
        assert_eq!(source.operator_type, OperatorType::Source);
        assert_eq!(source.matched_by, MatchStrategy::Description);
        assert_eq!(source.properties.get("CommandTimeout"), Some(&PropertyValue::Int32(30)));
        assert_eq!(source.connection_ref().as_deref(), Some("{CM-1}"));
        assert_eq!(source.output_columns().count(), 1);
        assert!(source.outputs[1].is_error_out);

        let derived = &flow.components[1];
        assert_eq!(derived.operator_type, OperatorType::DerivedColumn);
        let load_date = derived.output_columns().next().unwrap();
        assert_eq!(load_date.expression.as_deref(), Some("GETDATE()"));
        assert_eq!(load_date.semantic_type, SemanticType::DateTime);
    }

    #[test]
    fn test_input_column_named_through_lineage() {
        let (flow, _) = extract(FLOW);
        let column = flow.components[1].input_columns().next().unwrap();
        assert_eq!(column.name, "Amount");
        assert_eq!(flow.lineage.resolve("3").unwrap().component, ComponentKey::new("Package\\Flow", "1"));
    }

    #[test]
    fn test_duplicate_local_id_suffixed() {
        let (flow, diagnostics) = extract(FLOW);
        assert_eq!(flow.components[2].id, "10#2");
        assert!(diagnostics.iter().any(|d| d.to_string().contains("Duplicate component id '10'")));
    }

    #[test]
    fn test_paths_resolved_and_dangling_reported() {
        let (flow, diagnostics) = extract(FLOW);
        assert_eq!(flow.edges.len(), 1);
        let edge = &flow.edges[0];
        assert_eq!(edge.start.local_id, "1");
        assert_eq!(edge.end.local_id, "10");
        assert_eq!(edge.start_output.as_deref(), Some("OLE DB Source Output"));
        assert!(diagnostics.iter().any(|d| d.to_string().contains("unresolved endpoint '99'")));
    }

    #[test]
    fn test_path_back_into_same_component_kept() {
        let xml = FLOW.replace(
            r#"<path id="21" name="Dangling" startId="99" endId="11"/>"#,
            r#"<path id="21" name="Loop" startId="13" endId="11"/>"#,
        );
        let (flow, _) = extract(&xml);
        assert_eq!(flow.edges.len(), 2);
        assert!(flow.edges[1].is_self_loop());
        assert_eq!(flow.edges[1].start.local_id, "10");
    }

    #[test]
    fn test_lineage_edges_without_paths() {
        let xml = FLOW.replace(r#"<path id="20" name="Source to Derived" startId="2" endId="11"/>"#, "");
        let (flow, _) = extract(&xml);
        assert_eq!(flow.edges.len(), 1);
        assert_eq!(flow.edges[0].end_input.as_deref(), Some("Derived Column Input"));
    }

    #[test]
    fn test_missing_payload_yields_empty_flow() {
        let (flow, diagnostics) = extract(r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts"/>"#);
        assert!(flow.components.is_empty());
        assert!(diagnostics.is_empty());
    }
}
