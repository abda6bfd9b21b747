//! Placeholder detection
//!
//! Values may defer to the environment (`$(NAME)`, `%NAME%`) or to a package
//! variable (`@[Namespace::Name]`). Each distinct name becomes one required
//! binding for the generated code. Detection never mutates the scanned text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DOLLAR_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\(([A-Za-z_][A-Za-z0-9_]*)\)").unwrap());
static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%").unwrap());
static VARIABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@\[(\$?[A-Za-z_][A-Za-z0-9_]*)::([A-Za-z_][A-Za-z0-9_]*)\]").unwrap()
});

/// Where a binding is expected to come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// `$(NAME)` or `%NAME%`
    Environment,
    /// `@[Namespace::Name]`
    PackageVariable,
}

/// One placeholder occurrence in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMatch {
    pub name: String,
    pub namespace: Option<String>,
    pub kind: BindingKind,
    /// Exact matched text, e.g. `$(SERVER_NAME)`
    pub token: String,
    pub start: usize,
}

/// Find every placeholder in `text`, ordered by position
pub fn detect(text: &str) -> Vec<PlaceholderMatch> {
    let mut found = Vec::new();
    for (regex, kind) in [(&*DOLLAR_PAREN, BindingKind::Environment), (&*PERCENT, BindingKind::Environment)] {
        for captures in regex.captures_iter(text) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            found.push(PlaceholderMatch {
                name: name.as_str().to_string(),
                namespace: None,
                kind,
                token: whole.as_str().to_string(),
                start: whole.start(),
            });
        }
    }
    for captures in VARIABLE_REF.captures_iter(text) {
        let (Some(whole), Some(namespace), Some(name)) = (captures.get(0), captures.get(1), captures.get(2)) else {
            continue;
        };
        found.push(PlaceholderMatch {
            name: name.as_str().to_string(),
            namespace: Some(namespace.as_str().to_string()),
            kind: BindingKind::PackageVariable,
            token: whole.as_str().to_string(),
            start: whole.start(),
        });
    }
    found.sort_by_key(|m| m.start);
    found
}

/// A required external binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Placeholder text as first seen
    pub token: String,
    /// Locations where the placeholder was seen, in discovery order
    pub locations: Vec<String>,
}

impl Binding {
    /// Qualified variable name for package-variable bindings
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}::{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

/// Bindings coalesced by name in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSet {
    bindings: Vec<Binding>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a value and record every placeholder under `location`
    pub fn scan(&mut self, text: &str, location: &str) {
        for found in detect(text) {
            self.record(found, location);
        }
    }

    pub fn record(&mut self, found: PlaceholderMatch, location: &str) {
        match self.bindings.iter_mut().find(|b| b.name == found.name) {
            Some(binding) => {
                if !binding.locations.iter().any(|l| l == location) {
                    binding.locations.push(location.to_string());
                }
            }
            None => self.bindings.push(Binding {
                name: found.name,
                kind: found.kind,
                namespace: found.namespace,
                token: found.token,
                locations: vec![location.to_string()],
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
