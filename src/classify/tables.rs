//! Static classification tables

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::models::OperatorType;

/// Class identifiers shared by visually distinct components
///
/// The OLE DB, flat-file and Excel adapters use one identifier for both the
/// source and the destination, so these are resolved from the description.
pub const SHARED_FAMILY_IDENTIFIERS: &[&str] = &[
    "{E9216C7C-4A8A-4F77-8948-60C5D8C75F70}",
    "{A560E93D-4177-4C8B-9F5F-96F8FD959C4B}",
    "{C27664E8-786E-4EB0-9A94-D2CCF1AFE4EE}",
];

/// Exact class identifier → (operator type, catalog label)
const IDENTIFIER_ENTRIES: &[(&str, OperatorType, &str)] = &[
    ("{C8C8C883-0E37-4C98-A094-E4B6BB9E42B5}", OperatorType::Source, "XML Source"),
    ("{C9C7375C-8340-4F56-A550-919B1E4F4C66}", OperatorType::DerivedColumn, "Derived Column"),
    ("{149447B8-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::DataConversion, "Data Conversion"),
    ("{1E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::Lookup, "Lookup"),
    ("{2E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::Passthrough, "Merge Join"),
    ("{3E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::Passthrough, "Union All"),
    ("{4E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::Sort, "Sort"),
    ("{5E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::Aggregate, "Aggregate"),
    ("{6E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::ConditionalSplit, "Conditional Split"),
    ("{7E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::Passthrough, "Multicast"),
    ("{8E7B0B8A-8A7C-4FC7-B4E6-5DD2687916C1}", OperatorType::Passthrough, "Script Component"),
    ("Microsoft.OLEDBSource", OperatorType::Source, "OLE DB Source"),
    ("Microsoft.OLEDBDestination", OperatorType::Destination, "OLE DB Destination"),
    ("Microsoft.FlatFileSource", OperatorType::Source, "Flat File Source"),
    ("Microsoft.FlatFileDestination", OperatorType::Destination, "Flat File Destination"),
    ("Microsoft.ExcelSource", OperatorType::Source, "Excel Source"),
    ("Microsoft.ExcelDestination", OperatorType::Destination, "Excel Destination"),
    ("Microsoft.RawSource", OperatorType::Source, "Raw File Source"),
    ("Microsoft.RawDestination", OperatorType::Destination, "Raw File Destination"),
    ("Microsoft.SQLServerDestination", OperatorType::Destination, "SQL Server Destination"),
    ("Microsoft.DerivedColumn", OperatorType::DerivedColumn, "Derived Column"),
    ("Microsoft.DataConvert", OperatorType::DataConversion, "Data Conversion"),
    ("Microsoft.Lookup", OperatorType::Lookup, "Lookup"),
    ("Microsoft.Sort", OperatorType::Sort, "Sort"),
    ("Microsoft.Aggregate", OperatorType::Aggregate, "Aggregate"),
    ("Microsoft.ConditionalSplit", OperatorType::ConditionalSplit, "Conditional Split"),
    ("Microsoft.MergeJoin", OperatorType::Passthrough, "Merge Join"),
    ("Microsoft.Merge", OperatorType::Passthrough, "Merge"),
    ("Microsoft.UnionAll", OperatorType::Passthrough, "Union All"),
    ("Microsoft.Multicast", OperatorType::Passthrough, "Multicast"),
    ("Microsoft.RowCount", OperatorType::Passthrough, "Row Count"),
    ("Microsoft.FuzzyLookup", OperatorType::Passthrough, "Fuzzy Lookup"),
    ("Microsoft.ManagedComponentHost", OperatorType::Passthrough, "Script Component"),
    ("DTSAdapter.OLEDBSource", OperatorType::Source, "OLE DB Source"),
    ("DTSAdapter.OLEDBDestination", OperatorType::Destination, "OLE DB Destination"),
    ("DTSAdapter.FlatFileSource", OperatorType::Source, "Flat File Source"),
    ("DTSAdapter.FlatFileDestination", OperatorType::Destination, "Flat File Destination"),
    ("DTSAdapter.ExcelSource", OperatorType::Source, "Excel Source"),
    ("DTSAdapter.ExcelDestination", OperatorType::Destination, "Excel Destination"),
    ("DTSTransform.DerivedColumn", OperatorType::DerivedColumn, "Derived Column"),
    ("DTSTransform.DataConvert", OperatorType::DataConversion, "Data Conversion"),
    ("DTSTransform.Lookup", OperatorType::Lookup, "Lookup"),
    ("DTSTransform.Sort", OperatorType::Sort, "Sort"),
    ("DTSTransform.Aggregate", OperatorType::Aggregate, "Aggregate"),
    ("DTSTransform.ConditionalSplit", OperatorType::ConditionalSplit, "Conditional Split"),
    ("DTSTransform.MergeJoin", OperatorType::Passthrough, "Merge Join"),
    ("DTSTransform.UnionAll", OperatorType::Passthrough, "Union All"),
    ("DTSTransform.Multicast", OperatorType::Passthrough, "Multicast"),
    ("DTSTransform.RowCount", OperatorType::Passthrough, "Row Count"),
];

/// Description phrase → (operator type, catalog label), in table order
pub const DESCRIPTION_PHRASES: &[(&str, OperatorType, &str)] = &[
    ("ole db source", OperatorType::Source, "OLE DB Source"),
    ("ole db destination", OperatorType::Destination, "OLE DB Destination"),
    ("flat file source", OperatorType::Source, "Flat File Source"),
    ("flat file destination", OperatorType::Destination, "Flat File Destination"),
    ("excel source", OperatorType::Source, "Excel Source"),
    ("excel destination", OperatorType::Destination, "Excel Destination"),
    ("xml source", OperatorType::Source, "XML Source"),
    ("ado net source", OperatorType::Source, "ADO NET Source"),
    ("ado net destination", OperatorType::Destination, "ADO NET Destination"),
    ("raw file source", OperatorType::Source, "Raw File Source"),
    ("raw file destination", OperatorType::Destination, "Raw File Destination"),
    ("sql server destination", OperatorType::Destination, "SQL Server Destination"),
    ("derived column", OperatorType::DerivedColumn, "Derived Column"),
    ("data conversion", OperatorType::DataConversion, "Data Conversion"),
    ("fuzzy lookup", OperatorType::Passthrough, "Fuzzy Lookup"),
    ("fuzzy grouping", OperatorType::Passthrough, "Fuzzy Grouping"),
    ("term lookup", OperatorType::Passthrough, "Term Lookup"),
    ("lookup", OperatorType::Lookup, "Lookup"),
    ("sort", OperatorType::Sort, "Sort"),
    ("aggregate", OperatorType::Aggregate, "Aggregate"),
    ("conditional split", OperatorType::ConditionalSplit, "Conditional Split"),
    ("merge join", OperatorType::Passthrough, "Merge Join"),
    ("union all", OperatorType::Passthrough, "Union All"),
    ("multicast", OperatorType::Passthrough, "Multicast"),
    ("row count", OperatorType::Passthrough, "Row Count"),
    ("script component", OperatorType::Passthrough, "Script Component"),
    ("slowly changing dimension", OperatorType::Passthrough, "Slowly Changing Dimension"),
    ("unpivot", OperatorType::Passthrough, "Unpivot"),
    ("pivot", OperatorType::Passthrough, "Pivot"),
    ("audit", OperatorType::Passthrough, "Audit"),
    ("source", OperatorType::Source, "Source"),
    ("destination", OperatorType::Destination, "Destination"),
];

/// Identifier table keyed by [`normalize_identifier`]
pub static IDENTIFIER_TABLE: Lazy<HashMap<String, (OperatorType, &'static str)>> = Lazy::new(|| {
    IDENTIFIER_ENTRIES
        .iter()
        .map(|(id, op, label)| (normalize_identifier(id), (*op, *label)))
        .collect()
});

/// Upper-case, strip braces and a trailing numeric version (`DTSTransform.Sort.3`)
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('{').trim_end_matches('}');
    let unversioned = match trimmed.rsplit_once('.') {
        Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => head,
        _ => trimmed,
    };
    unversioned.to_ascii_uppercase()
}

pub fn is_shared_identifier(raw: &str) -> bool {
    let normalized = normalize_identifier(raw);
    SHARED_FAMILY_IDENTIFIERS
        .iter()
        .any(|id| normalize_identifier(id) == normalized)
}
