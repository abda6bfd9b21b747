//! Configuration path expressions
//!
//! ```text
//! \Package.Connections[Name].Properties[P]
//! \Package.Variables[Ns::Name].Properties[P]
//! \Package.Properties[P]
//! \Package\Container\Task.Properties[P]
//! \Package\Flow.Properties[[Component].[P]]
//! ```
//!
//! The leading backslash is optional.

use std::fmt;

use crate::error::ConfigResolutionError;

const PROPERTIES: &str = ".Properties[";
const CONNECTIONS: &str = ".Connections[";
const VARIABLES: &str = ".Variables[";

/// Entity addressed by a configuration path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigTarget {
    Package {
        property: String,
    },
    Connection {
        name: String,
        property: String,
    },
    Variable {
        /// Executable path of the owning scope, when not the package
        scope: Option<String>,
        namespace: Option<String>,
        name: String,
        property: String,
    },
    Executable {
        path: String,
        property: String,
    },
    Component {
        container: String,
        component: String,
        property: String,
    },
}

impl ConfigTarget {
    pub fn property(&self) -> &str {
        match self {
            ConfigTarget::Package { property }
            | ConfigTarget::Connection { property, .. }
            | ConfigTarget::Variable { property, .. }
            | ConfigTarget::Executable { property, .. }
            | ConfigTarget::Component { property, .. } => property,
        }
    }

    /// Parse a path expression
    pub fn parse(path: &str) -> Result<Self, ConfigResolutionError> {
        let malformed = || ConfigResolutionError::MalformedPath {
            path: path.to_string(),
        };
        let trimmed = path.trim();
        let split = trimmed.rfind(PROPERTIES).ok_or_else(malformed)?;
        let (head, tail) = trimmed.split_at(split);
        let inner = tail[PROPERTIES.len()..].strip_suffix(']').ok_or_else(malformed)?;
        let head = head.trim_start_matches('\\');

        if !starts_with_ignore_case(head, "Package") {
            return Err(malformed());
        }

        // `[Component].[Property]`
        if let Some(component_form) = inner.strip_prefix('[') {
            let (component, property) = component_form.split_once("].[").ok_or_else(malformed)?;
            let property = property.strip_suffix(']').ok_or_else(malformed)?;
            if component.is_empty() || property.is_empty() || !head.contains('\\') || head.contains('[') {
                return Err(malformed());
            }
            return Ok(ConfigTarget::Component {
                container: head.to_string(),
                component: component.to_string(),
                property: property.to_string(),
            });
        }

        let property = inner.to_string();
        if property.is_empty() || property.contains(['[', ']']) {
            return Err(malformed());
        }

        if head.eq_ignore_ascii_case("Package") {
            return Ok(ConfigTarget::Package { property });
        }
        if let Some((scope, key)) = collection(head, CONNECTIONS) {
            if scope.is_some() {
                return Err(malformed());
            }
            return Ok(ConfigTarget::Connection {
                name: key.to_string(),
                property,
            });
        }
        if let Some((scope, key)) = collection(head, VARIABLES) {
            let (namespace, name) = match key.split_once("::") {
                Some((ns, name)) => (Some(ns.to_string()), name.to_string()),
                None => (None, key.to_string()),
            };
            if name.is_empty() {
                return Err(malformed());
            }
            return Ok(ConfigTarget::Variable {
                scope,
                namespace,
                name,
                property,
            });
        }
        if head.contains('\\') && !head.contains(['[', ']']) {
            return Ok(ConfigTarget::Executable {
                path: head.to_string(),
                property,
            });
        }
        Err(malformed())
    }
}

impl fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigTarget::Package { .. } => write!(f, "package"),
            ConfigTarget::Connection { name, .. } => write!(f, "connection '{}'", name),
            ConfigTarget::Variable { namespace, name, .. } => match namespace {
                Some(ns) => write!(f, "variable '{}::{}'", ns, name),
                None => write!(f, "variable '{}'", name),
            },
            ConfigTarget::Executable { path, .. } => write!(f, "executable '{}'", path),
            ConfigTarget::Component {
                container, component, ..
            } => write!(f, "component '{}' in '{}'", component, container),
        }
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Split `<scope>.Collection[Key]` into (scope unless it is the package, key)
fn collection<'a>(head: &'a str, marker: &str) -> Option<(Option<String>, &'a str)> {
    let at = head.find(marker)?;
    let key = head[at + marker.len()..].strip_suffix(']')?;
    if key.is_empty() {
        return None;
    }
    let scope = &head[..at];
    let scope = (!scope.eq_ignore_ascii_case("Package")).then(|| scope.to_string());
    Some((scope, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_and_variable_paths() {
        assert_eq!(
            ConfigTarget::parse("\\Package.Connections[Warehouse].Properties[ConnectionString]").unwrap(),
            ConfigTarget::Connection {
                name: "Warehouse".to_string(),
                property: "ConnectionString".to_string()
            }
        );
        assert_eq!(
            ConfigTarget::parse("Package.Variables[User::BatchSize].Properties[Value]").unwrap(),
            ConfigTarget::Variable {
                scope: None,
                namespace: Some("User".to_string()),
                name: "BatchSize".to_string(),
                property: "Value".to_string()
            }
        );
    }

    #[test]
    fn test_package_executable_and_component_paths() {
        assert_eq!(
            ConfigTarget::parse("\\Package.Properties[Description]").unwrap(),
            ConfigTarget::Package {
                property: "Description".to_string()
            }
        );
        assert_eq!(
            ConfigTarget::parse("\\Package\\Prepare\\Truncate v1.2.Properties[Disable]").unwrap(),
            ConfigTarget::Executable {
                path: "Package\\Prepare\\Truncate v1.2".to_string(),
                property: "Disable".to_string()
            }
        );
        assert_eq!(
            ConfigTarget::parse("\\Package\\Load.Properties[[Read Orders].[SqlCommand]]").unwrap(),
            ConfigTarget::Component {
                container: "Package\\Load".to_string(),
                component: "Read Orders".to_string(),
                property: "SqlCommand".to_string()
            }
        );
    }

    #[test]
    fn test_scoped_variable() {
        let target = ConfigTarget::parse("\\Package\\Loop.Variables[User::Index].Properties[Value]").unwrap();
        assert!(matches!(target, ConfigTarget::Variable { scope: Some(ref s), .. } if s == "Package\\Loop"));
    }

    #[test]
    fn test_malformed_paths() {
        for path in [
            "",
            "Connections[X]",
            "\\Package.Connections[X]",
            "\\Package.Properties[]",
            "\\Other.Properties[Name]",
            "\\Package.Connections[X].Properties[[A].[B]]",
            "\\Package\\Flow.Properties[[A]]",
        ] {
            assert!(
                matches!(ConfigTarget::parse(path), Err(ConfigResolutionError::MalformedPath { .. })),
                "{path} should be malformed"
            );
        }
    }
}
