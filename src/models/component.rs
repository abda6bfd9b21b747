//! Data-flow model: containers, components, columns, edges and lineage

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::{PropertyMap, SemanticType};

/// Identity of a component: its container plus its local id
///
/// Local ids are only unique inside one data-flow container, so components
/// are never addressed by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub container: String,
    pub local_id: String,
}

impl ComponentKey {
    pub fn new(container: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            local_id: local_id.into(),
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.local_id)
    }
}

/// Classified operator type of a data-flow component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Source,
    Destination,
    DerivedColumn,
    Lookup,
    Sort,
    Aggregate,
    ConditionalSplit,
    DataConversion,
    /// Recognized by name but without a dedicated translation rule
    Passthrough,
    #[default]
    Unknown,
}

impl OperatorType {
    pub fn all() -> &'static [OperatorType] {
        &[
            OperatorType::Source,
            OperatorType::Destination,
            OperatorType::DerivedColumn,
            OperatorType::Lookup,
            OperatorType::Sort,
            OperatorType::Aggregate,
            OperatorType::ConditionalSplit,
            OperatorType::DataConversion,
            OperatorType::Passthrough,
            OperatorType::Unknown,
        ]
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorType::Source => write!(f, "source"),
            OperatorType::Destination => write!(f, "destination"),
            OperatorType::DerivedColumn => write!(f, "derived_column"),
            OperatorType::Lookup => write!(f, "lookup"),
            OperatorType::Sort => write!(f, "sort"),
            OperatorType::Aggregate => write!(f, "aggregate"),
            OperatorType::ConditionalSplit => write!(f, "conditional_split"),
            OperatorType::DataConversion => write!(f, "data_conversion"),
            OperatorType::Passthrough => write!(f, "passthrough"),
            OperatorType::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for OperatorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "source" => Ok(OperatorType::Source),
            "destination" => Ok(OperatorType::Destination),
            "derived_column" | "derivedcolumn" => Ok(OperatorType::DerivedColumn),
            "lookup" => Ok(OperatorType::Lookup),
            "sort" => Ok(OperatorType::Sort),
            "aggregate" => Ok(OperatorType::Aggregate),
            "conditional_split" | "conditionalsplit" => Ok(OperatorType::ConditionalSplit),
            "data_conversion" | "dataconversion" => Ok(OperatorType::DataConversion),
            "passthrough" => Ok(OperatorType::Passthrough),
            "unknown" => Ok(OperatorType::Unknown),
            _ => Err(format!("Unknown operator type: {}", s)),
        }
    }
}

/// Which classification strategy produced the operator type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Identifier,
    Description,
    #[default]
    Unmatched,
}

/// A pipeline column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ColumnDef {
    pub name: String,
    pub semantic_type: SemanticType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_id: Option<String>,
    /// Raw pipeline data type (`wstr`, `i4`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            ..Default::default()
        }
    }

    pub fn with_lineage_id(mut self, lineage_id: impl Into<String>) -> Self {
        self.lineage_id = Some(lineage_id.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_property(mut self, name: &str, value: super::PropertyValue) -> Self {
        self.properties.insert(name, value);
        self
    }
}

/// An input or output of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ComponentPort {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub is_error_out: bool,
    #[serde(default)]
    pub is_default_out: bool,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
    pub columns: Vec<ColumnDef>,
}

impl ComponentPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDef>) -> Self {
        self.columns = columns;
        self
    }

    /// Whether an endpoint id from a path element addresses this port
    pub fn matches_endpoint(&self, endpoint: &str) -> bool {
        self.id.as_deref() == Some(endpoint) || self.ref_id.as_deref() == Some(endpoint)
    }
}

/// Reference from a component to a connection manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectionRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Connection manager DTSID or `Package.ConnectionManagers[Name]`
    pub manager: String,
}

/// A data-flow component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowComponent {
    /// Local id, unique only inside the owning container
    pub id: String,
    /// Ref path of the owning container
    pub container: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Raw `componentClassID`
    pub class_id: String,
    pub operator_type: OperatorType,
    /// Catalog label of the recognized type (e.g. `OLE DB Source`, `Multicast`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_label: Option<String>,
    #[serde(default)]
    pub matched_by: MatchStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub inputs: Vec<ComponentPort>,
    #[serde(default)]
    pub outputs: Vec<ComponentPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DataFlowComponent {
    pub fn new(container: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            container: container.into(),
            name: name.into(),
            description: String::new(),
            class_id: String::new(),
            operator_type: OperatorType::Unknown,
            type_label: None,
            matched_by: MatchStrategy::Unmatched,
            ref_id: None,
            properties: PropertyMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            connections: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.container.clone(), self.id.clone())
    }

    /// All input columns, in declaration order
    pub fn input_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.inputs.iter().flat_map(|p| p.columns.iter())
    }

    /// All output columns of non-error outputs, in declaration order
    pub fn output_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.outputs
            .iter()
            .filter(|p| !p.is_error_out)
            .flat_map(|p| p.columns.iter())
    }

    /// Non-error outputs
    pub fn data_outputs(&self) -> impl Iterator<Item = &ComponentPort> {
        self.outputs.iter().filter(|p| !p.is_error_out)
    }

    /// Connection reference, from `<connections>` or the `Connection` property
    pub fn connection_ref(&self) -> Option<String> {
        self.connections
            .iter()
            .map(|c| c.manager.trim().to_string())
            .find(|m| !m.is_empty())
            .or_else(|| self.properties.text("Connection"))
    }

    /// Text describing the component for classification fallback
    pub fn description_text(&self) -> &str {
        if !self.description.trim().is_empty() {
            &self.description
        } else if !self.name.trim().is_empty() {
            &self.name
        } else {
            self.metadata
                .get("contact_info")
                .map(String::as_str)
                .unwrap_or_default()
        }
    }
}

/// Directed path between two components of the same container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFlowEdge {
    pub start: ComponentKey,
    pub end: ComponentKey,
    /// Output of the start component feeding this edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_input: Option<String>,
}

impl DataFlowEdge {
    pub fn new(start: ComponentKey, end: ComponentKey) -> Self {
        Self {
            start,
            end,
            start_output: None,
            end_input: None,
        }
    }

    pub fn from_output(mut self, output: impl Into<String>) -> Self {
        self.start_output = Some(output.into());
        self
    }

    /// Same components joined through the same output and input
    fn same_link(&self, other: &DataFlowEdge) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.start_output == other.start_output
            && self.end_input == other.end_input
    }

    pub fn is_self_loop(&self) -> bool {
        self.start == self.end
    }
}

/// Where a lineage id was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub component: ComponentKey,
    pub column: String,
    pub output: String,
    #[serde(default)]
    pub semantic_type: SemanticType,
}

/// Index from lineage id to the producing (component, column)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageIndex {
    entries: HashMap<String, LineageEntry>,
}

impl LineageIndex {
    /// Index every output column that declares a lineage id (or a refId)
    pub fn build(components: &[DataFlowComponent]) -> Self {
        let mut entries = HashMap::new();
        for component in components {
            for output in &component.outputs {
                for column in &output.columns {
                    let entry = LineageEntry {
                        component: component.key(),
                        column: column.name.clone(),
                        output: output.name.clone(),
                        semantic_type: column.semantic_type,
                    };
                    for id in [column.lineage_id.as_deref(), column.id.as_deref()]
                        .into_iter()
                        .flatten()
                    {
                        entries.entry(id.to_string()).or_insert_with(|| entry.clone());
                    }
                }
            }
        }
        Self { entries }
    }

    pub fn resolve(&self, lineage_id: &str) -> Option<&LineageEntry> {
        self.entries.get(lineage_id.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A data-flow container with its components and path graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlow {
    /// DTSID of the data-flow task
    pub id: String,
    pub name: String,
    /// Executable path, e.g. `Package\Load Orders`
    pub ref_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
    pub components: Vec<DataFlowComponent>,
    pub edges: Vec<DataFlowEdge>,
    #[serde(skip)]
    pub lineage: LineageIndex,
}

impl DataFlow {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ref_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ref_path: ref_path.into(),
            description: String::new(),
            properties: PropertyMap::new(),
            components: Vec::new(),
            edges: Vec::new(),
            lineage: LineageIndex::default(),
        }
    }

    pub fn component(&self, key: &ComponentKey) -> Option<&DataFlowComponent> {
        self.components.iter().find(|c| c.key() == *key)
    }

    pub fn component_by_name(&self, name: &str) -> Option<&DataFlowComponent> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn component_by_name_mut(&mut self, name: &str) -> Option<&mut DataFlowComponent> {
        self.components.iter_mut().find(|c| c.name == name)
    }

    /// Add an edge unless the same port-to-port link is already present
    ///
    /// Self loops are kept so ordering reports them as a cycle.
    pub fn add_edge(&mut self, edge: DataFlowEdge) -> bool {
        if self.edges.iter().any(|e| e.same_link(&edge)) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Rebuild the lineage index from the current components
    pub fn reindex(&mut self) {
        self.lineage = LineageIndex::build(&self.components);
    }

    /// Edges entering the given component, in declaration order
    pub fn incoming(&self, key: &ComponentKey) -> impl Iterator<Item = &DataFlowEdge> {
        self.edges.iter().filter(move |e| e.end == *key)
    }
}
