//! Namespace-aware document tree
//!
//! Package documents mix the DTS, pipeline and SQL task namespaces, and some
//! producers omit the qualification on nested `ObjectData` payloads. Elements
//! and attributes are therefore looked up through a namespace-alias table:
//!
//! 1. a name bound to the alias namespace URI (compared case-insensitively),
//! 2. a name using the alias prefix even when that prefix is undeclared,
//! 3. an unqualified name.

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;

use crate::error::ParsingError;

/// Namespaces known to the package format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsAlias {
    Dts,
    Pipeline,
    SqlTask,
    /// Unqualified documents such as `.dtsConfig`
    Plain,
}

/// Alias → (conventional prefix, namespace URI)
const NAMESPACE_ALIASES: &[(NsAlias, &str, &str)] = &[
    (NsAlias::Dts, "DTS", "www.microsoft.com/SqlServer/Dts"),
    (NsAlias::Pipeline, "pipeline", "www.microsoft.com/sqlserver/dts/pipeline"),
    (NsAlias::SqlTask, "SQLTask", "www.microsoft.com/sqlserver/dts/tasks/sqltask"),
];

impl NsAlias {
    fn binding(self) -> Option<(&'static str, &'static str)> {
        NAMESPACE_ALIASES
            .iter()
            .find(|(alias, _, _)| *alias == self)
            .map(|(_, prefix, uri)| (*prefix, *uri))
    }
}

/// Qualified name with its resolved namespace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl XmlName {
    fn in_namespace(&self, alias: NsAlias) -> bool {
        match (alias.binding(), &self.namespace) {
            (Some((_, uri)), Some(ns)) => ns.trim_end_matches('/').eq_ignore_ascii_case(uri),
            _ => false,
        }
    }

    fn has_alias_prefix(&self, alias: NsAlias) -> bool {
        match (alias.binding(), &self.prefix) {
            (Some((prefix, _)), Some(p)) => p.eq_ignore_ascii_case(prefix),
            _ => false,
        }
    }

    fn is_unqualified(&self) -> bool {
        self.prefix.is_none()
    }

    /// Lookup tier for this name, lower is better; `None` when it does not match
    fn tier(&self, alias: NsAlias, local: &str) -> Option<u8> {
        if self.local != local {
            return None;
        }
        if self.in_namespace(alias) {
            Some(0)
        } else if self.has_alias_prefix(alias) {
            Some(1)
        } else if self.is_unqualified() {
            Some(2)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: XmlName,
    pub value: String,
}

/// Element of the document tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: XmlName,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    pub fn is(&self, alias: NsAlias, local: &str) -> bool {
        self.name.tier(alias, local).is_some()
    }

    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    /// Attribute value, preferring the best-qualified match
    pub fn attr(&self, alias: NsAlias, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter_map(|a| a.name.tier(alias, local).map(|t| (t, a)))
            .min_by_key(|(t, _)| *t)
            .map(|(_, a)| a.value.as_str())
    }

    /// Value held either as an attribute or as a nested
    /// `<Property Name="local">value</Property>` element
    pub fn value(&self, alias: NsAlias, local: &str) -> Option<String> {
        if let Some(v) = self.attr(alias, local) {
            return Some(v.to_string());
        }
        self.children(alias, "Property")
            .find(|p| p.attr(alias, "Name") == Some(local))
            .map(|p| p.text().to_string())
    }

    /// Non-empty value, trimmed
    pub fn value_non_empty(&self, alias: NsAlias, local: &str) -> Option<String> {
        self.value(alias, local)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn child(&self, alias: NsAlias, local: &str) -> Option<&XmlElement> {
        self.children(alias, local).next()
    }

    /// Matching children in document order
    pub fn children<'a, 'b>(&'a self, alias: NsAlias, local: &'b str) -> impl Iterator<Item = &'a XmlElement> + use<'a, 'b> {
        self.children.iter().filter(move |c| c.is(alias, local))
    }

    /// Follow a path of child names, taking the first match at each step
    pub fn find_path(&self, alias: NsAlias, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |el, step| el.child(alias, step))
    }

    /// First descendant (depth-first, document order) with a matching name
    pub fn descendant(&self, alias: NsAlias, local: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|c| {
            if c.is(alias, local) {
                Some(c)
            } else {
                c.descendant(alias, local)
            }
        })
    }

    /// Trimmed text content
    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

/// Parsed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    /// Parse raw document bytes (UTF-8, with or without BOM, or UTF-16 with BOM)
    pub fn parse(bytes: &[u8]) -> Result<Self, ParsingError> {
        let text = decode(bytes)?;
        Self::parse_str(&text)
    }

    pub fn parse_str(xml: &str) -> Result<Self, ParsingError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let (ns, event) = match reader.read_resolved_event() {
                Ok((ns, event)) => (resolved_namespace(ns), event),
                Err(e) => {
                    return Err(ParsingError::Malformed {
                        message: e.to_string(),
                        position: reader.error_position() as u64,
                    });
                }
            };
            match event {
                Event::Start(e) => {
                    stack.push(build_element(&reader, ns, &e)?);
                }
                Event::Empty(e) => {
                    let element = build_element(&reader, ns, &e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| ParsingError::Malformed {
                        message: "unexpected closing tag".to_string(),
                        position: reader.buffer_position() as u64,
                    })?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t.unescape().map_err(|e| ParsingError::Malformed {
                            message: e.to_string(),
                            position: reader.buffer_position() as u64,
                        })?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(ParsingError::Malformed {
                message: format!("element '{}' is not closed", open.name.local),
                position: reader.buffer_position() as u64,
            });
        }

        root.map(|root| XmlDocument { root })
            .ok_or_else(|| ParsingError::missing("root element", "document"))
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn build_element(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> Result<XmlElement, ParsingError> {
    let name = XmlName {
        prefix: start
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
        local: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        namespace,
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParsingError::Malformed {
            message: e.to_string(),
            position: reader.buffer_position() as u64,
        })?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (attr_ns, local) = reader.resolve_attribute(attr.key);
        let value = attr.unescape_value().map_err(|e| ParsingError::Malformed {
            message: e.to_string(),
            position: reader.buffer_position() as u64,
        })?;
        attributes.push(XmlAttribute {
            name: XmlName {
                prefix: attr
                    .key
                    .prefix()
                    .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
                local: String::from_utf8_lossy(local.as_ref()).into_owned(),
                namespace: resolved_namespace(attr_ns),
            },
            value: value.into_owned(),
        });
    }

    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn resolved_namespace(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn decode(bytes: &[u8]) -> Result<String, ParsingError> {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => std::str::from_utf8(rest)
            .map(str::to_string)
            .map_err(|e| ParsingError::Encoding(e.to_string())),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| ParsingError::Encoding(e.to_string())),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String, ParsingError> {
    if bytes.len() % 2 != 0 {
        return Err(ParsingError::Encoding("odd byte count in UTF-16 document".to_string()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| ParsingError::Encoding(e.to_string()))
}
