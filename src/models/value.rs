//! Typed property values
//!
//! Property bags in the package format are arbitrary string-keyed maps whose
//! values carry an optional type name. They are modelled as a tagged variant
//! with a raw fallback for unrecognized type names and a sealed variant for
//! encrypted values.

use std::fmt;

use chrono::NaiveDateTime;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Accepted textual date-time layouts, tried in order
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parse a date-time in one of the layouts produced by package designers
pub fn parse_date_time(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Semantic data type shared by variables and pipeline columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SemanticType {
    String,
    Int32,
    Double,
    Boolean,
    DateTime,
    #[default]
    Unknown,
}

impl SemanticType {
    /// Map a DTS variable `DataType` code
    pub fn from_dts_code(code: i32) -> Self {
        match code {
            2 | 3 | 16 | 17 | 18 | 19 | 20 | 21 | 22 => SemanticType::Int32,
            4 | 5 | 6 | 14 => SemanticType::Double,
            7 | 133 | 135 => SemanticType::DateTime,
            8 => SemanticType::String,
            11 => SemanticType::Boolean,
            _ => SemanticType::Unknown,
        }
    }

    /// Map a pipeline column `dataType` (e.g. `i4`, `wstr`, `dbTimeStamp`)
    pub fn from_pipeline_type(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().trim_start_matches("dt_") {
            "i1" | "i2" | "i4" | "i8" | "ui1" | "ui2" | "ui4" | "ui8" => SemanticType::Int32,
            "r4" | "r8" | "numeric" | "decimal" | "cy" => SemanticType::Double,
            "str" | "wstr" | "text" | "ntext" | "guid" => SemanticType::String,
            "bool" => SemanticType::Boolean,
            "date" | "dbdate" | "dbtime" | "dbtime2" | "dbtimestamp" | "dbtimestamp2"
            | "dbtimestampoffset" | "filetime" => SemanticType::DateTime,
            _ => SemanticType::Unknown,
        }
    }

    /// Infer a type from a literal value when no declared type is available
    pub fn infer(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return SemanticType::Unknown;
        }
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            SemanticType::Boolean
        } else if trimmed.parse::<i32>().is_ok() {
            SemanticType::Int32
        } else if trimmed.parse::<f64>().is_ok() {
            SemanticType::Double
        } else if parse_date_time(trimmed).is_some() {
            SemanticType::DateTime
        } else {
            SemanticType::String
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::String => write!(f, "String"),
            SemanticType::Int32 => write!(f, "Int32"),
            SemanticType::Double => write!(f, "Double"),
            SemanticType::Boolean => write!(f, "Boolean"),
            SemanticType::DateTime => write!(f, "DateTime"),
            SemanticType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Int32(i32),
    Double(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    /// Value whose declared type is not recognized; kept verbatim
    Raw { type_name: String, value: String },
    /// Encrypted value. Never rendered; the ciphertext is not serialized.
    Sealed {
        #[serde(skip_serializing, default)]
        ciphertext: String,
    },
}

impl PropertyValue {
    /// Build a value from raw text and an optional declared type name
    ///
    /// Accepts CLR names (`System.Int32`), config names (`Int32`) and
    /// variant names; a value that does not parse as its declared type
    /// falls back to [`PropertyValue::Raw`].
    pub fn from_typed(type_name: Option<&str>, raw: &str) -> Self {
        let Some(type_name) = type_name.map(str::trim).filter(|t| !t.is_empty()) else {
            return PropertyValue::String(raw.to_string());
        };
        let short = type_name.rsplit('.').next().unwrap_or(type_name);
        let parsed = match short.to_ascii_lowercase().as_str() {
            "string" | "char" => Some(PropertyValue::String(raw.to_string())),
            "int16" | "int32" | "int64" | "uint16" | "uint32" | "uint64" | "byte" | "sbyte" => {
                raw.trim().parse::<i32>().ok().map(PropertyValue::Int32)
            }
            "double" | "single" | "decimal" => {
                raw.trim().parse::<f64>().ok().map(PropertyValue::Double)
            }
            "boolean" | "bool" => parse_bool(raw).map(PropertyValue::Boolean),
            "datetime" => parse_date_time(raw).map(PropertyValue::DateTime),
            _ => None,
        };
        parsed.unwrap_or_else(|| PropertyValue::Raw {
            type_name: type_name.to_string(),
            value: raw.to_string(),
        })
    }

    /// Wrap an encrypted value
    pub fn sealed(ciphertext: impl Into<String>) -> Self {
        PropertyValue::Sealed {
            ciphertext: ciphertext.into(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, PropertyValue::Sealed { .. })
    }

    /// Textual form of the value, or `None` when sealed
    pub fn text(&self) -> Option<String> {
        match self {
            PropertyValue::Sealed { .. } => None,
            other => Some(other.to_string()),
        }
    }

    /// Interpret the value as a flag (`true`, `1`, `-1`)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            PropertyValue::Int32(i) => Some(*i != 0),
            PropertyValue::String(s) | PropertyValue::Raw { value: s, .. } => parse_bool(s),
            _ => None,
        }
    }

    /// Interpret the value as an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int32(i) => Some(i64::from(*i)),
            PropertyValue::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            PropertyValue::String(s) | PropertyValue::Raw { value: s, .. } => {
                s.trim().parse().ok()
            }
            _ => None,
        }
    }

    /// The encrypted payload, only reachable through this explicit accessor
    pub fn ciphertext(&self) -> Option<&str> {
        match self {
            PropertyValue::Sealed { ciphertext } => Some(ciphertext),
            _ => None,
        }
    }
}

impl Default for PropertyValue {
    fn default() -> Self {
        PropertyValue::String(String::new())
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Int32(i) => write!(f, "{}", i),
            PropertyValue::Double(d) => write!(f, "{}", d),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            PropertyValue::Raw { value, .. } => write!(f, "{}", value),
            PropertyValue::Sealed { .. } => write!(f, "<encrypted>"),
        }
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "-1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Ordered, case-insensitively keyed property map
///
/// Declaration order is preserved; re-inserting an existing name replaces
/// the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        let name = name.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Non-empty textual value of a property; `None` when absent, blank or sealed
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(PropertyValue::text)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(PropertyValue::as_bool).unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PropertyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertyMapVisitor;

        impl<'de> Visitor<'de> for PropertyMapVisitor {
            type Value = PropertyMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of property values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PropertyMap, A::Error> {
                let mut map = PropertyMap::new();
                while let Some((k, v)) = access.next_entry::<String, PropertyValue>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(PropertyMapVisitor)
    }
}
