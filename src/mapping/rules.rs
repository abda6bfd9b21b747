//! Per-operator code-generation rules
//!
//! Every rule reads its upstream frames from the `frames` dict and stores
//! what it produces under its own keys. Generated statements use `df` as
//! the working frame, `engines` for SQLAlchemy engines keyed by connection
//! name, and the `CONNECTIONS` / `VARIABLES` tables of the configuration
//! module.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{ConversionError, ExpressionWarning, ManualInputRequired};
use crate::models::{
    ColumnDef, ComponentPort, DataFlow, DataFlowComponent, OperatorType, PackageModel, PropertyMap,
    PropertyValue, SemanticType,
};

use super::expression::ExpressionTranslator;
use super::python::{comment_text, frame_ref, py_str, py_str_list};
use super::types::MappedFragment;

/// A code-generation function for one operator type
pub type MappingRule = fn(&RuleContext<'_>) -> Result<MappedFragment, ConversionError>;

/// Rules registered for each operator type
pub static DEFAULT_RULES: Lazy<HashMap<OperatorType, MappingRule>> = Lazy::new(|| {
    let mut rules: HashMap<OperatorType, MappingRule> = HashMap::new();
    rules.insert(OperatorType::Source, map_source);
    rules.insert(OperatorType::Destination, map_destination);
    rules.insert(OperatorType::DerivedColumn, map_derived_column);
    rules.insert(OperatorType::Lookup, map_lookup);
    rules.insert(OperatorType::Sort, map_sort);
    rules.insert(OperatorType::Aggregate, map_aggregate);
    rules.insert(OperatorType::ConditionalSplit, map_conditional_split);
    rules.insert(OperatorType::DataConversion, map_data_conversion);
    rules.insert(OperatorType::Passthrough, map_passthrough);
    rules.insert(OperatorType::Unknown, map_passthrough);
    rules
});

/// Everything a rule may look at while mapping one component
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub package: &'a PackageModel,
    pub flow: &'a DataFlow,
    pub component: &'a DataFlowComponent,
    /// Upstream frame keys, in edge order
    pub inputs: Vec<String>,
    /// Frame key of this component
    pub frame: String,
}

impl<'a> RuleContext<'a> {
    /// Frame key for one of the component's outputs
    pub fn output_frame(&self, output: &str) -> String {
        output_key(&self.frame, self.component, output)
    }

    /// Keys written when every data output receives the working frame
    pub fn data_output_frames(&self) -> Vec<String> {
        let keys: Vec<String> = self
            .component
            .data_outputs()
            .map(|o| self.output_frame(&o.name))
            .collect();
        if keys.is_empty() { vec![self.frame.clone()] } else { keys }
    }

    /// Key of the first data output, used for validation assertions
    fn frame_for_assertions(&self) -> String {
        self.data_output_frames()
            .into_iter()
            .next()
            .unwrap_or_else(|| self.frame.clone())
    }

    fn fragment(&self) -> MappedFragment {
        let mut fragment = MappedFragment::new(
            self.component.key(),
            self.component.name.clone(),
            self.component.operator_type,
        );
        fragment.imports.module("pandas as pd");
        fragment.depends_on("pandas");
        fragment
    }

    fn translator(&self) -> ExpressionTranslator<'a> {
        let columns = self
            .component
            .inputs
            .first()
            .map(|p| p.columns.as_slice())
            .unwrap_or_default();
        ExpressionTranslator::new("df")
            .with_lineage(&self.flow.lineage)
            .with_variables(&self.package.variables)
            .with_columns(columns)
    }

    fn unmappable(&self, property: &str, reason: &str) -> ConversionError {
        ConversionError::unmappable(self.component.key(), property, reason)
    }

    fn manual_input(&self, fragment: &mut MappedFragment, reason: String) {
        fragment.diagnostics.push(ManualInputRequired::for_component(&self.component.key(), reason.clone()).into());
        fragment.review(reason);
    }

    /// Bind `df` to the first upstream frame
    fn read_input(&self, fragment: &mut MappedFragment, copy: bool) {
        match self.inputs.first() {
            Some(key) => {
                let suffix = if copy { ".copy()" } else { "" };
                fragment.line(format!("df = {}{}", frame_ref(key), suffix));
                fragment.reads.push(key.clone());
            }
            None => {
                self.manual_input(fragment, "component has no upstream path; an empty frame is used".to_string());
                fragment.line("df = pd.DataFrame()");
            }
        }
    }

    /// Store `df` under every data output
    fn write_outputs(&self, fragment: &mut MappedFragment) {
        for key in self.data_output_frames() {
            fragment.line(format!("{} = df", frame_ref(&key)));
            fragment.writes.push(key);
        }
    }

    /// A component property as generated code sees it
    fn literal(&self, name: &str) -> Option<Literal> {
        match self.component.properties.get(name)? {
            PropertyValue::Sealed { .. } => Some(Literal::Sealed {
                property: name.to_string(),
                location: format!(
                    "{}.Properties[[{}].[{}]]",
                    self.flow.ref_path, self.component.name, name
                ),
            }),
            value => value
                .text()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(Literal::Text),
        }
    }

    /// Record the manual-input note for a sealed literal
    fn note_sealed(&self, fragment: &mut MappedFragment, literal: &Literal) {
        if let Literal::Sealed { property, location } = literal {
            fragment.imports.runtime("ManualInput").runtime("require");
            self.manual_input(
                fragment,
                format!("encrypted value of {} requires manual decryption ({})", property, location),
            );
        }
    }

    fn connection(&self, fragment: &mut MappedFragment) -> Result<Connection, ConversionError> {
        let reference = self
            .component
            .connection_ref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| self.unmappable("Connection", "is not set"))?;
        match self.package.connection(&reference) {
            Some(manager) => Ok(Connection {
                key: manager.name.clone(),
                connection_type: manager.connection_type.clone(),
                properties: manager.properties.clone(),
            }),
            None => {
                self.manual_input(
                    fragment,
                    format!("connection reference '{}' does not resolve to a connection manager", reference),
                );
                Ok(Connection {
                    key: reference,
                    connection_type: "UNKNOWN".to_string(),
                    properties: PropertyMap::new(),
                })
            }
        }
    }
}

/// Frame key for an output: `Component.Output` when the component has
/// several data outputs or the output is an error output
pub(crate) fn output_key(frame: &str, component: &DataFlowComponent, output: &str) -> String {
    let is_error = component
        .outputs
        .iter()
        .any(|o| o.name == output && o.is_error_out);
    if is_error || component.data_outputs().count() > 1 {
        format!("{}.{}", frame, output)
    } else {
        frame.to_string()
    }
}

struct Connection {
    key: String,
    connection_type: String,
    properties: PropertyMap,
}

impl Connection {
    fn engine(&self) -> String {
        format!("engines[{}]", py_str(&self.key))
    }

    fn path(&self) -> String {
        format!("CONNECTIONS[{}][\"path\"]", py_str(&self.key))
    }

    fn has_header(&self) -> bool {
        self.properties
            .get("ColumnNamesInFirstDataRow")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}

fn text_prop(properties: &PropertyMap, name: &str) -> Option<String> {
    properties
        .text(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

const SEALED_REASON: &str = "encrypted value requires manual decryption";

/// Text of a component property, or a marker for an encrypted one
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Sealed { property: String, location: String },
}

impl Literal {
    /// Python string literal; sealed values fail at run time through `require`
    fn py(&self) -> String {
        match self {
            Literal::Text(text) => py_str(text),
            Literal::Sealed { property, location } => format!(
                "require(ManualInput({}, {}), {})",
                py_str(location),
                py_str(SEALED_REASON),
                py_str(property)
            ),
        }
    }

    /// Lookup of the variable the property names
    fn variable(&self) -> String {
        match self {
            Literal::Text(name) => variable_expr(name),
            sealed => sealed.py(),
        }
    }

    /// Sheet name of an Excel `OpenRowset`
    fn sheet(&self) -> String {
        match self {
            Literal::Text(text) => py_str(text.trim_matches(|c: char| c == '[' || c == ']' || c == '\'').trim_end_matches('$')),
            sealed => sealed.py(),
        }
    }
}

fn qualify_variable(name: &str) -> String {
    let name = name.trim().trim_start_matches("@[").trim_end_matches(']');
    if name.contains("::") {
        name.to_string()
    } else {
        format!("User::{}", name)
    }
}

fn variable_expr(name: &str) -> String {
    format!("VARIABLES[{}]", py_str(&qualify_variable(name)))
}

/// Strip `#`, `{` and `}` from a lineage reference
fn lineage_ref(raw: &str) -> &str {
    raw.trim().trim_start_matches('#').trim_start_matches('{').trim_end_matches('}')
}

fn column_names<'c>(columns: impl Iterator<Item = &'c ColumnDef>) -> Vec<String> {
    columns
        .map(|c| c.name.clone())
        .filter(|n| !n.trim().is_empty())
        .collect()
}

fn assert_columns(fragment: &mut MappedFragment, key: &str, columns: &[String]) {
    if columns.is_empty() {
        return;
    }
    fragment.imports.runtime("assert_columns");
    fragment
        .assertions
        .push(format!("assert_columns({}, {})", frame_ref(key), py_str_list(columns)));
}

/// Statement or table a source, destination or lookup reads
enum Query {
    Statement(String),
    Table(String),
}

impl Query {
    /// Resolve from `AccessMode` (0 table, 1 table variable, 2 command,
    /// 3 command variable), falling back to whichever property is set
    fn resolve(ctx: &RuleContext<'_>) -> Option<(Query, Literal)> {
        let statement = || ctx.literal("SqlCommand").map(|l| (Query::Statement(l.py()), l));
        let statement_var = || ctx.literal("SqlCommandVariable").map(|l| (Query::Statement(l.variable()), l));
        let table = || ctx.literal("OpenRowset").map(|l| (Query::Table(l.py()), l));
        let table_var = || ctx.literal("OpenRowsetVariable").map(|l| (Query::Table(l.variable()), l));

        let preferred = match ctx.component.properties.get("AccessMode").and_then(|v| v.as_i64()) {
            Some(0) => table(),
            Some(1) => table_var(),
            Some(2) => statement(),
            Some(3) => statement_var(),
            _ => None,
        };
        preferred
            .or_else(statement)
            .or_else(table)
            .or_else(table_var)
            .or_else(statement_var)
    }

    fn sql(&self) -> String {
        match self {
            Query::Statement(expr) => format!("text(bind_placeholders({}, VARIABLES))", expr),
            Query::Table(expr) => format!("text(\"SELECT * FROM \" + bind_placeholders({}, VARIABLES))", expr),
        }
    }
}

fn use_sql(fragment: &mut MappedFragment) {
    fragment.imports.from("sqlalchemy", "text").runtime("bind_placeholders").config("VARIABLES");
    fragment.depends_on("sqlalchemy");
}

fn map_source(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    let connection = ctx.connection(&mut fragment)?;

    match connection.connection_type.as_str() {
        "FLATFILE" | "FILE" | "MULTIFILE" => {
            fragment.imports.config("CONNECTIONS");
            let header = if connection.has_header() { "0" } else { "None" };
            let mut arguments = vec![connection.path(), format!("header={}", header)];
            if !connection.has_header() {
                let names = column_names(ctx.component.output_columns());
                if !names.is_empty() {
                    arguments.push(format!("names={}", py_str_list(&names)));
                }
            }
            if let Some(skip) = connection
                .properties
                .get("HeaderRowsToSkip")
                .and_then(|v| v.as_i64())
                .filter(|n| *n > 0)
            {
                arguments.push(format!("skiprows={}", skip));
            }
            fragment.line(format!("df = pd.read_csv({})", arguments.join(", ")));
        }
        "EXCEL" => {
            fragment.imports.config("CONNECTIONS");
            fragment.depends_on("openpyxl");
            match ctx.literal("OpenRowset") {
                Some(sheet) => {
                    ctx.note_sealed(&mut fragment, &sheet);
                    fragment.line(format!(
                        "df = pd.read_excel({}, sheet_name={})",
                        connection.path(),
                        sheet.sheet()
                    ));
                }
                None => {
                    match ctx.literal("SqlCommand") {
                        Some(Literal::Text(statement)) => ctx.manual_input(
                            &mut fragment,
                            format!("SQL over a workbook is not translated: {}", statement),
                        ),
                        Some(sealed) => ctx.note_sealed(&mut fragment, &sealed),
                        None => {}
                    }
                    fragment.line(format!("df = pd.read_excel({})", connection.path()));
                }
            }
        }
        _ => {
            let (query, literal) =
                Query::resolve(ctx).ok_or_else(|| ctx.unmappable("SqlCommand", "and OpenRowset are both empty"))?;
            ctx.note_sealed(&mut fragment, &literal);
            use_sql(&mut fragment);
            fragment.line(format!("df = pd.read_sql({}, {})", query.sql(), connection.engine()));
        }
    }

    ctx.write_outputs(&mut fragment);
    let columns = column_names(ctx.component.output_columns());
    assert_columns(&mut fragment, &ctx.frame_for_assertions(), &columns);
    Ok(fragment)
}

/// Full-load destinations replace the table instead of appending
fn is_full_load(properties: &PropertyMap) -> bool {
    properties.flag("FullLoad")
        || properties.flag("TruncateBeforeLoad")
        || text_prop(properties, "InsertMode").is_some_and(|m| {
            m.eq_ignore_ascii_case("FullLoad") || m.eq_ignore_ascii_case("Replace")
        })
}

fn map_destination(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    let connection = ctx.connection(&mut fragment)?;
    let properties = &ctx.component.properties;
    ctx.read_input(&mut fragment, false);

    match connection.connection_type.as_str() {
        "FLATFILE" | "FILE" | "MULTIFILE" => {
            fragment.imports.config("CONNECTIONS");
            let overwrite = properties
                .get("Overwrite")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            let (mode, header) = if overwrite {
                ("w", if connection.has_header() { "True" } else { "False" })
            } else {
                ("a", "False")
            };
            fragment.line(format!(
                "df.to_csv({}, index=False, header={}, mode=\"{}\")",
                connection.path(),
                header,
                mode
            ));
        }
        "EXCEL" => {
            fragment.imports.config("CONNECTIONS");
            fragment.depends_on("openpyxl");
            let sheet = ctx
                .literal("OpenRowset")
                .unwrap_or_else(|| Literal::Text("Sheet1".to_string()));
            ctx.note_sealed(&mut fragment, &sheet);
            fragment.line(format!(
                "df.to_excel({}, sheet_name={}, index=False)",
                connection.path(),
                sheet.sheet()
            ));
        }
        _ => {
            let table = || ctx.literal("OpenRowset").map(|l| (l.py(), l));
            let table_var = || ctx.literal("OpenRowsetVariable").map(|l| (l.variable(), l));
            let (table, literal) = match properties.get("AccessMode").and_then(|v| v.as_i64()) {
                Some(1) | Some(4) => table_var().or_else(table),
                _ => table().or_else(table_var),
            }
            .ok_or_else(|| ctx.unmappable("OpenRowset", "is empty"))?;
            ctx.note_sealed(&mut fragment, &literal);

            fragment
                .imports
                .runtime("bind_placeholders")
                .runtime("split_table_name")
                .config("VARIABLES");
            fragment.depends_on("sqlalchemy");

            if let Some(options) = text_prop(properties, "FastLoadOptions") {
                fragment.line(format!("# FastLoadOptions: {}", comment_text(&options)));
            }
            let if_exists = if is_full_load(properties) { "replace" } else { "append" };
            let mut arguments = vec![
                "table".to_string(),
                connection.engine(),
                "schema=schema".to_string(),
                format!("if_exists=\"{}\"", if_exists),
                "index=False".to_string(),
            ];
            if let Some(chunk) = properties
                .get("FastLoadMaxInsertCommitSize")
                .and_then(|v| v.as_i64())
                .filter(|n| *n > 0)
            {
                arguments.push(format!("chunksize={}", chunk));
            }
            fragment.line(format!(
                "schema, table = split_table_name(bind_placeholders({}, VARIABLES))",
                table
            ));
            fragment.line(format!("df.to_sql({})", arguments.join(", ")));
        }
    }

    fragment.line(format!("{} = df", frame_ref(&ctx.frame)));
    fragment.writes.push(ctx.frame.clone());
    let columns = column_names(ctx.component.input_columns());
    assert_columns(&mut fragment, &ctx.frame, &columns);
    Ok(fragment)
}

fn map_derived_column(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    ctx.read_input(&mut fragment, true);
    let translator = ctx.translator();

    let derived = ctx
        .component
        .input_columns()
        .chain(ctx.component.output_columns())
        .filter_map(|c| {
            c.expression
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .map(|e| (c.name.clone(), e.to_string()))
        });

    let mut produced = Vec::new();
    for (column, expression) in derived {
        match translator.translate(&expression) {
            Ok(translated) => {
                if !translated.variables.is_empty() {
                    fragment.imports.config("VARIABLES");
                }
                fragment.line(format!("df[{}] = {}", py_str(&column), translated.code));
                produced.push(column);
            }
            Err(unsupported) => {
                fragment.diagnostics.push(
                    ExpressionWarning {
                        component: ctx.component.key(),
                        column: column.clone(),
                        token: unsupported.0.clone(),
                        expression: expression.clone(),
                    }
                    .into(),
                );
                fragment.review(format!(
                    "{} in expression for '{}'; column passed through unmodified: {}",
                    unsupported, column, expression
                ));
            }
        }
    }

    ctx.write_outputs(&mut fragment);
    assert_columns(&mut fragment, &ctx.frame_for_assertions(), &produced);
    Ok(fragment)
}

/// What happens to rows without a reference match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchPolicy {
    Fail,
    Redirect,
    Ignore,
}

impl NoMatchPolicy {
    fn from_disposition(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.trim_start_matches("rd_") {
            "ignorefailure" | "1" => Some(NoMatchPolicy::Ignore),
            "redirectrow" | "2" => Some(NoMatchPolicy::Redirect),
            "failcomponent" | "3" => Some(NoMatchPolicy::Fail),
            _ => None,
        }
    }

    /// `NoMatchBehavior` first, then the first declared `ErrorRowDisposition`
    pub fn for_component(component: &DataFlowComponent) -> Self {
        let behavior = component.properties.get("NoMatchBehavior");
        let redirect_behavior = behavior.and_then(|v| v.as_i64()) == Some(1)
            || behavior
                .and_then(|v| v.text())
                .is_some_and(|t| t.to_ascii_lowercase().contains("nomatch"));
        if redirect_behavior {
            return NoMatchPolicy::Redirect;
        }

        let ports = component.outputs.iter().chain(component.inputs.iter());
        std::iter::once(&component.properties)
            .chain(ports.clone().map(|p: &ComponentPort| &p.properties))
            .chain(ports.flat_map(|p| p.columns.iter().map(|c| &c.properties)))
            .find_map(|props| {
                props
                    .text("ErrorRowDisposition")
                    .and_then(|d| NoMatchPolicy::from_disposition(&d))
            })
            .unwrap_or(NoMatchPolicy::Fail)
    }
}

fn map_lookup(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    let connection = ctx.connection(&mut fragment)?;
    let component = ctx.component;

    let keys: Vec<(String, String)> = component
        .input_columns()
        .filter_map(|c| text_prop(&c.properties, "JoinToReferenceColumn").map(|r| (c.name.clone(), r)))
        .collect();
    if keys.is_empty() {
        return Err(ctx.unmappable("JoinToReferenceColumn", "is not set on any input column"));
    }
    let copied: Vec<(String, String)> = component
        .output_columns()
        .filter_map(|c| text_prop(&c.properties, "CopyFromReferenceColumn").map(|r| (r, c.name.clone())))
        .collect();
    let (reference, literal) = ctx
        .literal("SqlCommand")
        .map(|l| (Query::Statement(l.py()), l))
        .or_else(|| ctx.literal("OpenRowset").map(|l| (Query::Table(l.py()), l)))
        .ok_or_else(|| ctx.unmappable("SqlCommand", "has no reference query or table"))?;

    ctx.note_sealed(&mut fragment, &literal);
    use_sql(&mut fragment);
    ctx.read_input(&mut fragment, false);
    fragment.line(format!("reference = pd.read_sql({}, {})", reference.sql(), connection.engine()));
    fragment.line("reference = pd.DataFrame({");
    for (input, reference_column) in &keys {
        fragment.line(format!("    {}: reference[{}],", py_str(input), py_str(reference_column)));
    }
    for (reference_column, output) in &copied {
        fragment.line(format!("    {}: reference[{}],", py_str(output), py_str(reference_column)));
    }
    let key_names: Vec<&String> = keys.iter().map(|(input, _)| input).collect();
    fragment.line(format!("}}).drop_duplicates(subset={})", py_str_list(&key_names)));
    fragment.line(format!(
        "merged = df.merge(reference, how=\"left\", on={}, indicator=True)",
        py_str_list(&key_names)
    ));
    fragment.line("matched = merged[\"_merge\"] == \"both\"");
    fragment.line("merged = merged.drop(columns=[\"_merge\"])");

    let policy = NoMatchPolicy::for_component(component);
    let match_output = component
        .data_outputs()
        .find(|o| !o.name.to_ascii_lowercase().contains("no match"))
        .map(|o| ctx.output_frame(&o.name))
        .unwrap_or_else(|| ctx.frame.clone());
    let no_match_output = component
        .data_outputs()
        .find(|o| o.name.to_ascii_lowercase().contains("no match"))
        .or_else(|| component.outputs.iter().find(|o| o.is_error_out))
        .map(|o| ctx.output_frame(&o.name));

    match (policy, no_match_output) {
        (NoMatchPolicy::Fail, _) => {
            fragment.imports.runtime("LookupNoMatchError");
            fragment.line("if not matched.all():");
            fragment.line(format!(
                "    raise LookupNoMatchError({}, int((~matched).sum()))",
                py_str(&component.name)
            ));
            fragment.line(format!("{} = merged", frame_ref(&match_output)));
            fragment.writes.push(match_output.clone());
        }
        (NoMatchPolicy::Redirect, Some(no_match)) => {
            fragment.line(format!("{} = merged[matched].reset_index(drop=True)", frame_ref(&match_output)));
            fragment.line(format!(
                "{} = df[~matched.to_numpy()].reset_index(drop=True)",
                frame_ref(&no_match)
            ));
            fragment.writes.push(match_output.clone());
            fragment.writes.push(no_match);
        }
        (NoMatchPolicy::Redirect, None) => {
            fragment.review("rows without a match are redirected to an output that is not declared; they are dropped");
            fragment.line(format!("{} = merged[matched].reset_index(drop=True)", frame_ref(&match_output)));
            fragment.writes.push(match_output.clone());
        }
        (NoMatchPolicy::Ignore, _) => {
            fragment.line(format!("{} = merged", frame_ref(&match_output)));
            fragment.writes.push(match_output.clone());
        }
    }

    let produced: Vec<String> = copied.into_iter().map(|(_, output)| output).collect();
    assert_columns(&mut fragment, &match_output, &produced);
    Ok(fragment)
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn map_sort(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    let mut keys: Vec<(i64, String)> = ctx
        .component
        .input_columns()
        .filter_map(|c| {
            c.properties
                .get("NewSortKeyPosition")
                .and_then(|v| v.as_i64())
                .filter(|p| *p != 0)
                .map(|p| (p, c.name.clone()))
        })
        .collect();
    if keys.is_empty() {
        return Err(ctx.unmappable("NewSortKeyPosition", "is not set on any input column"));
    }
    keys.sort_by_key(|(position, _)| position.abs());

    let columns: Vec<&String> = keys.iter().map(|(_, name)| name).collect();
    let ascending: Vec<&str> = keys.iter().map(|(position, _)| py_bool(*position > 0)).collect();

    ctx.read_input(&mut fragment, false);
    fragment.line(format!(
        "df = df.sort_values(by={}, ascending=[{}], kind=\"mergesort\").reset_index(drop=True)",
        py_str_list(&columns),
        ascending.join(", ")
    ));
    if ctx.component.properties.flag("EliminateDuplicates") {
        fragment.line(format!(
            "df = df.drop_duplicates(subset={}).reset_index(drop=True)",
            py_str_list(&columns)
        ));
    }
    ctx.write_outputs(&mut fragment);
    Ok(fragment)
}

/// Pandas function for an `AggregationType` code or name; `None` means group by
fn aggregation(raw: &str) -> Result<Option<&'static str>, ()> {
    let normalized: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect();
    match normalized.as_str() {
        "0" | "groupby" => Ok(None),
        "1" | "count" => Ok(Some("count")),
        "2" | "countall" => Ok(Some("size")),
        "3" | "countdistinct" => Ok(Some("nunique")),
        "4" | "sum" => Ok(Some("sum")),
        "5" | "average" | "avg" | "mean" => Ok(Some("mean")),
        "6" | "minimum" | "min" => Ok(Some("min")),
        "7" | "maximum" | "max" => Ok(Some("max")),
        _ => Err(()),
    }
}

fn map_aggregate(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    let component = ctx.component;
    let mut outputs = component.data_outputs();
    let Some(output) = outputs.next() else {
        return Err(ctx.unmappable("AggregationType", "component declares no output"));
    };
    for extra in outputs {
        ctx.manual_input(
            &mut fragment,
            format!("additional aggregate output '{}' is not translated", extra.name),
        );
    }

    let mut group_keys: Vec<(String, String)> = Vec::new();
    let mut aggregations: Vec<(String, String, &'static str)> = Vec::new();
    for column in &output.columns {
        let Some(kind) = column.properties.text("AggregationType") else {
            ctx.manual_input(
                &mut fragment,
                format!("output column '{}' has no AggregationType", column.name),
            );
            continue;
        };
        let source = column
            .properties
            .text("AggregationColumnId")
            .and_then(|id| ctx.flow.lineage.resolve(lineage_ref(&id)).map(|e| e.column.clone()))
            .or_else(|| {
                let name = column.name.trim();
                (!name.is_empty()).then(|| name.to_string())
            });
        match aggregation(&kind) {
            Ok(None) => match source {
                Some(source) => group_keys.push((source, column.name.clone())),
                None => ctx.manual_input(&mut fragment, "group-by column without a source column".to_string()),
            },
            Ok(Some(function)) => {
                let source_expr = match (&source, function) {
                    (Some(source), _) if function != "size" || component.input_columns().any(|c| &c.name == source) => {
                        py_str(source)
                    }
                    _ => group_keys
                        .first()
                        .map(|(key, _)| py_str(key))
                        .unwrap_or_else(|| "df.columns[0]".to_string()),
                };
                aggregations.push((column.name.clone(), source_expr, function));
            }
            Err(()) => ctx.manual_input(
                &mut fragment,
                format!("unsupported AggregationType '{}' on column '{}'", kind, column.name),
            ),
        }
    }
    if group_keys.is_empty() && aggregations.is_empty() {
        return Err(ctx.unmappable("AggregationType", "is not set on any output column"));
    }

    ctx.read_input(&mut fragment, false);
    let key_sources: Vec<&String> = group_keys.iter().map(|(source, _)| source).collect();
    let grouped = if key_sources.is_empty() {
        "df.groupby(lambda _: 0)".to_string()
    } else {
        format!("df.groupby({}, as_index=False, dropna=False)", py_str_list(&key_sources))
    };
    if aggregations.is_empty() {
        fragment.line(format!("df = {}.first()[{}]", grouped, py_str_list(&key_sources)));
    } else {
        fragment.line(format!("df = {}.agg(**{{", grouped));
        for (name, source, function) in &aggregations {
            fragment.line(format!("    {}: ({}, \"{}\"),", py_str(name), source, function));
        }
        if key_sources.is_empty() {
            fragment.line("}).reset_index(drop=True)");
        } else {
            fragment.line("})");
        }
    }
    let renames: Vec<String> = group_keys
        .iter()
        .filter(|(source, output)| source != output)
        .map(|(source, output)| format!("{}: {}", py_str(source), py_str(output)))
        .collect();
    if !renames.is_empty() {
        fragment.line(format!("df = df.rename(columns={{{}}})", renames.join(", ")));
    }
    ctx.write_outputs(&mut fragment);

    let columns = column_names(output.columns.iter());
    assert_columns(&mut fragment, &ctx.output_frame(&output.name), &columns);
    Ok(fragment)
}

fn map_conditional_split(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    let translator = ctx.translator();

    let mut conditions: Vec<(i64, usize, &ComponentPort)> = Vec::new();
    let mut default_output = None;
    for (index, output) in ctx.component.data_outputs().enumerate() {
        if output.is_default_out {
            default_output = Some(output);
            continue;
        }
        let order = output
            .properties
            .get("EvaluationOrder")
            .and_then(|v| v.as_i64())
            .unwrap_or(i64::MAX);
        conditions.push((order, index, output));
    }
    conditions.sort_by_key(|(order, index, _)| (*order, *index));

    ctx.read_input(&mut fragment, false);
    fragment.line("remaining = pd.Series(True, index=df.index)");
    for (_, _, output) in conditions {
        let key = ctx.output_frame(&output.name);
        let expression = text_prop(&output.properties, "FriendlyExpression")
            .or_else(|| text_prop(&output.properties, "Expression"));
        let Some(expression) = expression else {
            ctx.manual_input(
                &mut fragment,
                format!("output '{}' has no condition; it never matches", output.name),
            );
            fragment.line(format!("{} = df.iloc[0:0]", frame_ref(&key)));
            fragment.writes.push(key);
            continue;
        };
        match translator.translate(&expression) {
            Ok(translated) => {
                if !translated.variables.is_empty() {
                    fragment.imports.config("VARIABLES");
                }
                fragment.line(format!(
                    "condition = pd.Series({}, index=df.index).fillna(False).astype(bool)",
                    translated.code
                ));
                fragment.line(format!("{} = df[remaining & condition]", frame_ref(&key)));
                fragment.line("remaining = remaining & ~condition");
            }
            Err(unsupported) => {
                fragment.diagnostics.push(
                    ExpressionWarning {
                        component: ctx.component.key(),
                        column: output.name.clone(),
                        token: unsupported.0.clone(),
                        expression: expression.clone(),
                    }
                    .into(),
                );
                fragment.review(format!(
                    "{} in condition for output '{}'; it never matches: {}",
                    unsupported, output.name, expression
                ));
                fragment.line(format!("{} = df.iloc[0:0]", frame_ref(&key)));
            }
        }
        fragment.writes.push(key);
    }

    match default_output {
        Some(output) => {
            let key = ctx.output_frame(&output.name);
            fragment.line(format!("{} = df[remaining]", frame_ref(&key)));
            fragment.writes.push(key);
        }
        None => {
            fragment.line("# rows matching no condition are discarded");
        }
    }
    Ok(fragment)
}

/// Statement converting `source` to the target semantic type
fn conversion(semantic_type: SemanticType, source: &str) -> Option<String> {
    match semantic_type {
        SemanticType::Int32 => Some(format!("pd.to_numeric({}).astype(\"Int64\")", source)),
        SemanticType::Double => Some(format!("pd.to_numeric({}).astype(\"float64\")", source)),
        SemanticType::String => Some(format!("{}.astype(\"string\")", source)),
        SemanticType::Boolean => Some(format!("{}.astype(\"boolean\")", source)),
        SemanticType::DateTime => Some(format!("pd.to_datetime({})", source)),
        SemanticType::Unknown => None,
    }
}

fn map_data_conversion(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    ctx.read_input(&mut fragment, true);
    fragment.imports.runtime("DataConversionError");

    let mut produced = Vec::new();
    for column in ctx.component.output_columns() {
        let Some(reference) = column.properties.text("SourceInputColumnLineageID") else {
            continue;
        };
        let reference = lineage_ref(&reference);
        let source = ctx
            .flow
            .lineage
            .resolve(reference)
            .map(|e| e.column.clone())
            .or_else(|| {
                ctx.component
                    .input_columns()
                    .find(|c| {
                        c.lineage_id.as_deref() == Some(reference) || c.id.as_deref() == Some(reference)
                    })
                    .map(|c| c.name.clone())
            });
        let Some(source) = source else {
            ctx.manual_input(
                &mut fragment,
                format!("source column '{}' of '{}' cannot be resolved", reference, column.name),
            );
            continue;
        };

        let source_expr = format!("df[{}]", py_str(&source));
        match conversion(column.semantic_type, &source_expr) {
            Some(converted) => {
                fragment.line("try:");
                fragment.line(format!("    df[{}] = {}", py_str(&column.name), converted));
                fragment.line("except (TypeError, ValueError) as exc:");
                fragment.line(format!(
                    "    raise DataConversionError({}, {}, \"{}\") from exc",
                    py_str(&ctx.component.name),
                    py_str(&source),
                    column.semantic_type
                ));
            }
            None => {
                ctx.manual_input(
                    &mut fragment,
                    format!(
                        "target type of '{}' is unknown ({}); value copied unchanged",
                        column.name,
                        column.data_type.as_deref().unwrap_or("no data type")
                    ),
                );
                fragment.line(format!("df[{}] = {}", py_str(&column.name), source_expr));
            }
        }
        produced.push(column.name.clone());
    }

    ctx.write_outputs(&mut fragment);
    assert_columns(&mut fragment, &ctx.frame_for_assertions(), &produced);
    Ok(fragment)
}

/// Marked stub forwarding the upstream frame
pub(crate) fn map_passthrough(ctx: &RuleContext<'_>) -> Result<MappedFragment, ConversionError> {
    let mut fragment = ctx.fragment();
    let label = ctx
        .component
        .type_label
        .clone()
        .unwrap_or_else(|| ctx.component.operator_type.to_string());
    if label == "Union All" && ctx.inputs.len() > 1 {
        ctx.manual_input(
            &mut fragment,
            format!("{} '{}' stacks its inputs by column name; check the column mapping", label, ctx.component.name),
        );
        let frames: Vec<String> = ctx.inputs.iter().map(|k| frame_ref(k)).collect();
        fragment.line(format!("df = pd.concat([{}], ignore_index=True)", frames.join(", ")));
        fragment.reads.extend(ctx.inputs.iter().cloned());
        ctx.write_outputs(&mut fragment);
        return Ok(fragment);
    }
    ctx.manual_input(
        &mut fragment,
        format!("no automatic translation for {} '{}'; upstream frame forwarded", label, ctx.component.name),
    );
    if ctx.inputs.is_empty() {
        fragment.line("df = pd.DataFrame()");
    } else {
        ctx.read_input(&mut fragment, false);
        for extra in ctx.inputs.iter().skip(1) {
            fragment.line(format!("# additional input: {}", frame_ref(extra)));
            fragment.reads.push(extra.clone());
        }
    }
    ctx.write_outputs(&mut fragment);
    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostic;
    use crate::models::{ConnectionManager, ConnectionRef, PropertyValue};

    const FLOW: &str = "Package\\Load";

    fn package() -> PackageModel {
        let mut package = PackageModel::new("Pkg");
        package.connection_managers.push(
            ConnectionManager::new("{CM-1}", "Warehouse", "OLEDB")
                .with_connection_string("Data Source=db01;Initial Catalog=Sales;Provider=SQLNCLI11.1;"),
        );
        package
            .connection_managers
            .push(ConnectionManager::new("{CM-2}", "Orders File", "FLATFILE").with_connection_string("C:\\in\\orders.csv"));
        package
    }

    fn component(id: &str, name: &str, operator_type: OperatorType) -> DataFlowComponent {
        let mut component = DataFlowComponent::new(FLOW, id, name);
        component.operator_type = operator_type;
        component
    }

    fn connected(mut component: DataFlowComponent, manager: &str) -> DataFlowComponent {
        component.connections.push(ConnectionRef {
            name: Some("OleDbConnection".to_string()),
            manager: manager.to_string(),
        });
        component
    }

    fn text(value: &str) -> PropertyValue {
        PropertyValue::String(value.to_string())
    }

    fn run(rule: MappingRule, package: &PackageModel, component: &DataFlowComponent, inputs: &[&str]) -> Result<MappedFragment, ConversionError> {
        let flow = DataFlow::new("{F}", "Load", FLOW);
        let ctx = RuleContext {
            package,
            flow: &flow,
            component,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            frame: component.name.clone(),
        };
        rule(&ctx)
    }

    fn code(fragment: &MappedFragment) -> String {
        fragment.code.join("\n")
    }

    #[test]
    fn test_source_statement_keeps_placeholders() {
        let mut source = connected(component("1", "Orders", OperatorType::Source), "{CM-1}");
        source
            .properties
            .insert("SqlCommand", text("SELECT * FROM @[User::SourceTable]"));
        source.outputs.push(
            ComponentPort::new("Output").with_columns(vec![ColumnDef::new("OrderId", SemanticType::Int32)]),
        );

        let fragment = run(map_source, &package(), &source, &[]).unwrap();
        assert_eq!(
            fragment.code,
            vec![
                "df = pd.read_sql(text(bind_placeholders(\"SELECT * FROM @[User::SourceTable]\", VARIABLES)), engines[\"Warehouse\"])",
                "frames[\"Orders\"] = df",
            ]
        );
        assert_eq!(fragment.writes, vec!["Orders"]);
        assert_eq!(fragment.assertions, vec!["assert_columns(frames[\"Orders\"], [\"OrderId\"])"]);
        assert!(fragment.dependencies.contains("sqlalchemy"));
    }

    #[test]
    fn test_source_table_variable_access_mode() {
        let mut source = connected(component("1", "Orders", OperatorType::Source), "Warehouse");
        source.properties.insert("AccessMode", PropertyValue::Int32(1));
        source.properties.insert("OpenRowsetVariable", text("User::SourceTable"));
        let fragment = run(map_source, &package(), &source, &[]).unwrap();
        assert!(code(&fragment).contains("text(\"SELECT * FROM \" + bind_placeholders(VARIABLES[\"User::SourceTable\"], VARIABLES))"));
    }

    #[test]
    fn test_source_without_statement_is_unmappable() {
        let source = connected(component("1", "Orders", OperatorType::Source), "{CM-1}");
        let err = run(map_source, &package(), &source, &[]).unwrap_err();
        assert!(matches!(err, ConversionError::UnmappableProperty { ref property, .. } if property == "SqlCommand"));

        let detached = component("2", "Detached", OperatorType::Source);
        assert!(run(map_source, &package(), &detached, &[]).is_err());
    }

    #[test]
    fn test_flat_file_source_reads_csv() {
        let source = connected(component("1", "Orders", OperatorType::Source), "{CM-2}");
        let fragment = run(map_source, &package(), &source, &[]).unwrap();
        assert_eq!(fragment.code[0], "df = pd.read_csv(CONNECTIONS[\"Orders File\"][\"path\"], header=0)");
    }

    #[test]
    fn test_unresolved_connection_is_flagged() {
        let mut source = connected(component("1", "Orders", OperatorType::Source), "{MISSING}");
        source.properties.insert("SqlCommand", text("SELECT 1"));
        let fragment = run(map_source, &package(), &source, &[]).unwrap();
        assert!(fragment.needs_review());
        assert!(code(&fragment).contains("engines[\"{MISSING}\"]"));
        assert!(matches!(fragment.diagnostics[0], Diagnostic::ManualInput(_)));
    }

    #[test]
    fn test_destination_append_and_full_load() {
        let mut destination = connected(component("3", "Stage", OperatorType::Destination), "{CM-1}");
        destination.properties.insert("OpenRowset", text("[dbo].[Orders]"));
        destination.properties.insert("FastLoadMaxInsertCommitSize", PropertyValue::Int32(5000));
        destination.properties.insert("FastLoadOptions", text("TABLOCK,CHECK_CONSTRAINTS"));

        let fragment = run(map_destination, &package(), &destination, &["Derive"]).unwrap();
        let body = code(&fragment);
        assert!(body.starts_with("df = frames[\"Derive\"]"));
        assert!(body.contains("# FastLoadOptions: TABLOCK,CHECK_CONSTRAINTS"));
        assert!(body.contains(
            "df.to_sql(table, engines[\"Warehouse\"], schema=schema, if_exists=\"append\", index=False, chunksize=5000)"
        ));

        destination.properties.insert("TruncateBeforeLoad", PropertyValue::Boolean(true));
        let fragment = run(map_destination, &package(), &destination, &["Derive"]).unwrap();
        assert!(code(&fragment).contains("if_exists=\"replace\""));
    }

    #[test]
    fn test_derived_column_translation_and_warning() {
        let mut derive = component("2", "Derive", OperatorType::DerivedColumn);
        derive.outputs.push(ComponentPort::new("Derived Output").with_columns(vec![
            ColumnDef::new("LoadDate", SemanticType::DateTime).with_expression("GETDATE()"),
            ColumnDef::new("Code", SemanticType::String).with_expression("(DT_WSTR, 5)[Id]"),
        ]));

        let fragment = run(map_derived_column, &package(), &derive, &["Orders"]).unwrap();
        assert_eq!(fragment.code[0], "df = frames[\"Orders\"].copy()");
        assert_eq!(fragment.code[1], "df[\"LoadDate\"] = pd.Timestamp.now()");
        assert!(fragment.code[2].starts_with("# MANUAL REVIEW: unsupported token '(DT_WSTR'"));
        assert!(!code(&fragment).contains("df[\"Code\"] ="));
        assert!(matches!(
            &fragment.diagnostics[0],
            Diagnostic::Expression(w) if w.column == "Code" && w.token == "(DT_WSTR"
        ));
    }

    #[test]
    fn test_lookup_policies() {
        let mut lookup = connected(component("4", "Customers", OperatorType::Lookup), "{CM-1}");
        lookup.properties.insert("SqlCommand", text("SELECT CustomerId, Segment FROM dbo.Customers"));
        let mut input = ComponentPort::new("Lookup Input");
        input.columns.push(
            ColumnDef::new("CustId", SemanticType::Int32).with_property("JoinToReferenceColumn", text("CustomerId")),
        );
        lookup.inputs.push(input);
        lookup.outputs.push(ComponentPort::new("Lookup Match Output").with_columns(vec![
            ColumnDef::new("Segment", SemanticType::String).with_property("CopyFromReferenceColumn", text("Segment")),
        ]));

        let fragment = run(map_lookup, &package(), &lookup, &["Orders"]).unwrap();
        let body = code(&fragment);
        assert!(body.contains("    \"CustId\": reference[\"CustomerId\"],"));
        assert!(body.contains("    \"Segment\": reference[\"Segment\"],"));
        assert!(body.contains("merged = df.merge(reference, how=\"left\", on=[\"CustId\"], indicator=True)"));
        assert!(body.contains("raise LookupNoMatchError(\"Customers\""));

        lookup.properties.insert("NoMatchBehavior", PropertyValue::Int32(1));
        lookup.outputs.push(ComponentPort::new("Lookup No Match Output"));
        let fragment = run(map_lookup, &package(), &lookup, &["Orders"]).unwrap();
        assert_eq!(
            fragment.writes,
            vec!["Customers.Lookup Match Output", "Customers.Lookup No Match Output"]
        );

        lookup.properties.insert("NoMatchBehavior", PropertyValue::Int32(0));
        lookup.outputs[0]
            .properties
            .insert("ErrorRowDisposition", text("IgnoreFailure"));
        assert_eq!(NoMatchPolicy::for_component(&lookup), NoMatchPolicy::Ignore);
    }

    #[test]
    fn test_lookup_without_keys_is_unmappable() {
        let mut lookup = connected(component("4", "Customers", OperatorType::Lookup), "{CM-1}");
        lookup.properties.insert("SqlCommand", text("SELECT 1"));
        let err = run(map_lookup, &package(), &lookup, &["Orders"]).unwrap_err();
        assert!(err.to_string().contains("JoinToReferenceColumn"));
    }

    #[test]
    fn test_sort_orders_by_position() {
        let mut sort = component("5", "Sort", OperatorType::Sort);
        sort.properties.insert("EliminateDuplicates", PropertyValue::Boolean(true));
        let mut input = ComponentPort::new("Sort Input");
        input.columns = vec![
            ColumnDef::new("Amount", SemanticType::Double).with_property("NewSortKeyPosition", PropertyValue::Int32(-2)),
            ColumnDef::new("Note", SemanticType::String),
            ColumnDef::new("Region", SemanticType::String).with_property("NewSortKeyPosition", PropertyValue::Int32(1)),
        ];
        sort.inputs.push(input);
        sort.outputs.push(ComponentPort::new("Sort Output"));

        let fragment = run(map_sort, &package(), &sort, &["Orders"]).unwrap();
        assert_eq!(
            fragment.code[1],
            "df = df.sort_values(by=[\"Region\", \"Amount\"], ascending=[True, False], kind=\"mergesort\").reset_index(drop=True)"
        );
        assert_eq!(
            fragment.code[2],
            "df = df.drop_duplicates(subset=[\"Region\", \"Amount\"]).reset_index(drop=True)"
        );
    }

    #[test]
    fn test_aggregate_codes() {
        let mut aggregate = component("6", "Totals", OperatorType::Aggregate);
        aggregate.outputs.push(ComponentPort::new("Aggregate Output").with_columns(vec![
            ColumnDef::new("Region", SemanticType::String).with_property("AggregationType", PropertyValue::Int32(0)),
            ColumnDef::new("Total", SemanticType::Double).with_property("AggregationType", PropertyValue::Int32(4)),
            ColumnDef::new("Orders", SemanticType::Int32).with_property("AggregationType", text("Count all")),
        ]));
        aggregate.outputs[0].columns[1]
            .properties
            .insert("AggregationColumnId", text("#77"));

        let fragment = run(map_aggregate, &package(), &aggregate, &["Orders"]).unwrap();
        let body = code(&fragment);
        assert!(body.contains("df = df.groupby([\"Region\"], as_index=False, dropna=False).agg(**{"));
        // unresolved lineage falls back to the column name
        assert!(body.contains("    \"Total\": (\"Total\", \"sum\"),"));
        assert!(body.contains("    \"Orders\": (\"Region\", \"size\"),"));
    }

    #[test]
    fn test_conditional_split_order_and_default() {
        let mut split = component("7", "Split", OperatorType::ConditionalSplit);
        let mut low = ComponentPort::new("Low");
        low.properties.insert("EvaluationOrder", PropertyValue::Int32(1));
        low.properties.insert("FriendlyExpression", text("[Amount] < 10"));
        let mut high = ComponentPort::new("High");
        high.properties.insert("EvaluationOrder", PropertyValue::Int32(0));
        high.properties.insert("FriendlyExpression", text("[Amount] > 100 ? 1 : 0"));
        let mut rest = ComponentPort::new("Default");
        rest.is_default_out = true;
        split.outputs = vec![low, high, rest];

        let fragment = run(map_conditional_split, &package(), &split, &["Orders"]).unwrap();
        assert_eq!(fragment.writes, vec!["Split.High", "Split.Low", "Split.Default"]);
        let body = code(&fragment);
        assert!(body.contains("frames[\"Split.High\"] = df.iloc[0:0]"));
        assert!(body.contains("condition = pd.Series((df[\"Amount\"] < 10), index=df.index).fillna(False).astype(bool)"));
        assert!(body.ends_with("frames[\"Split.Default\"] = df[remaining]"));
        assert_eq!(fragment.diagnostics.len(), 1);
    }

    #[test]
    fn test_data_conversion_raises_at_run_time() {
        let mut convert = component("8", "Convert", OperatorType::DataConversion);
        convert.inputs.push(ComponentPort::new("Input").with_columns(vec![
            ColumnDef::new("Amount", SemanticType::String).with_lineage_id("11"),
        ]));
        convert.outputs.push(ComponentPort::new("Output").with_columns(vec![
            ColumnDef::new("Amount Num", SemanticType::Double)
                .with_property("SourceInputColumnLineageID", text("#11")),
        ]));

        let fragment = run(map_data_conversion, &package(), &convert, &["Orders"]).unwrap();
        let body = code(&fragment);
        assert!(body.contains("    df[\"Amount Num\"] = pd.to_numeric(df[\"Amount\"]).astype(\"float64\")"));
        assert!(body.contains("    raise DataConversionError(\"Convert\", \"Amount\", \"Double\") from exc"));
    }

    #[test]
    fn test_passthrough_forwards_to_every_output() {
        let mut multicast = component("9", "Fan Out", OperatorType::Passthrough);
        multicast.type_label = Some("Multicast".to_string());
        multicast.outputs = vec![ComponentPort::new("Output 1"), ComponentPort::new("Output 2")];

        let fragment = run(map_passthrough, &package(), &multicast, &["Orders"]).unwrap();
        assert!(fragment.needs_review());
        assert_eq!(fragment.writes, vec!["Fan Out.Output 1", "Fan Out.Output 2"]);
        assert!(fragment.code[0].contains("no automatic translation for Multicast 'Fan Out'"));
    }

    #[test]
    fn test_union_all_stacks_every_input() {
        let mut union = component("11", "Union", OperatorType::Passthrough);
        union.type_label = Some("Union All".to_string());
        union.outputs.push(ComponentPort::new("Union All Output 1"));

        let fragment = run(map_passthrough, &package(), &union, &["Split.Big", "Split.Small"]).unwrap();
        assert!(code(&fragment).contains("df = pd.concat([frames[\"Split.Big\"], frames[\"Split.Small\"]], ignore_index=True)"));
        assert_eq!(fragment.reads, vec!["Split.Big", "Split.Small"]);
        assert_eq!(fragment.writes, vec!["Union"]);
    }

    #[test]
    fn test_sealed_statement_becomes_manual_input() {
        let mut source = connected(component("1", "Orders", OperatorType::Source), "{CM-1}");
        source.properties.insert("SqlCommand", PropertyValue::sealed("AQAAANCMnd8BFdERjHoAwE"));

        let fragment = run(map_source, &package(), &source, &[]).unwrap();
        let body = code(&fragment);
        assert!(body.contains(
            "require(ManualInput(\"Package\\\\Load.Properties[[Orders].[SqlCommand]]\", \"encrypted value requires manual decryption\"), \"SqlCommand\")"
        ));
        assert!(!body.contains("AQAAANCMnd8BFdERjHoAwE"));
        assert!(fragment.needs_review());
        assert!(matches!(fragment.diagnostics[0], Diagnostic::ManualInput(_)));
    }

    #[test]
    fn test_sealed_destination_table_becomes_manual_input() {
        let mut destination = connected(component("3", "Stage", OperatorType::Destination), "{CM-1}");
        destination.properties.insert("OpenRowset", PropertyValue::sealed("AQAAANCMnd8BFdERjHoAwE"));

        let fragment = run(map_destination, &package(), &destination, &["Orders"]).unwrap();
        assert!(code(&fragment).contains("split_table_name(bind_placeholders(require(ManualInput("));
        assert!(fragment.needs_review());
    }

    #[test]
    fn test_rule_table_covers_every_operator() {
        for operator in OperatorType::all() {
            assert!(DEFAULT_RULES.contains_key(operator), "missing rule for {}", operator);
        }
    }
}
