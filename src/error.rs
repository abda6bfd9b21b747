//! Error types for package migration
//!
//! Fatal conditions abort the affected unit of work (a package, or a single
//! data flow for [`ConversionError`]). Recoverable conditions are collected
//! as [`Diagnostic`] values and surfaced as manual-review items. Every
//! condition converts into an [`ErrorReport`] for external aggregation.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ComponentKey;

/// Severity of a reported condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Category of a reported condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    FileSystem,
    Parsing,
    Conversion,
    ConfigResolution,
    Classification,
    Expression,
    ManualInput,
    Structure,
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::FileSystem => "file_system",
            ErrorCategory::Parsing => "parsing",
            ErrorCategory::Conversion => "conversion",
            ErrorCategory::ConfigResolution => "config_resolution",
            ErrorCategory::Classification => "classification",
            ErrorCategory::Expression => "expression",
            ErrorCategory::ManualInput => "manual_input",
            ErrorCategory::Structure => "structure",
            ErrorCategory::Configuration => "configuration",
        };
        write!(f, "{}", name)
    }
}

/// Where a condition was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Executable path or configuration path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentKey>,
}

impl SourceLocation {
    pub fn element(path: impl Into<String>) -> Self {
        Self {
            element_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn component(key: &ComponentKey) -> Self {
        Self {
            element_path: Some(key.container.clone()),
            component: Some(key.clone()),
            ..Default::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Externally representable form of any raised condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub severity: Severity,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
}

impl ErrorReport {
    pub fn new(severity: Severity, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            recovery_suggestion: None,
            source_location: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.source_location = Some(location);
        self
    }

    /// Attach the package file unless a file is already recorded
    pub fn in_file(mut self, file: Option<&PathBuf>) -> Self {
        if let Some(file) = file {
            let location = self.source_location.get_or_insert_with(SourceLocation::default);
            if location.file.is_none() {
                location.file = Some(file.clone());
            }
        }
        self
    }
}

/// Conversion into the error-report interface
pub trait Reportable {
    fn report(&self) -> ErrorReport;
}

/// File access failures (fatal for the package)
#[derive(Error, Debug)]
pub enum FileSystemError {
    /// Package file does not exist
    #[error("File not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// Extension does not match the expected document type
    #[error("Unexpected file extension for {}: expected .{expected}", .path.display())]
    UnexpectedExtension { path: PathBuf, expected: String },

    /// IO error with path context
    #[error("IO error with {}: {message}", .path.display())]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl FileSystemError {
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            FileSystemError::NotFound { path }
            | FileSystemError::UnexpectedExtension { path, .. }
            | FileSystemError::Io { path, .. } => path,
        }
    }
}

impl Reportable for FileSystemError {
    fn report(&self) -> ErrorReport {
        let suggestion = match self {
            FileSystemError::NotFound { .. } => "Check that the file exists and the path is correct.",
            FileSystemError::UnexpectedExtension { .. } => "Pass a .dtsx package file.",
            FileSystemError::Io { .. } => "Check file permissions and available disk space.",
        };
        ErrorReport::new(Severity::Critical, ErrorCategory::FileSystem, self.to_string())
            .with_suggestion(suggestion)
            .with_location(SourceLocation::file(self.path().clone()))
    }
}

/// Malformed document structure (fatal for the package)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParsingError {
    /// XML is not well-formed
    #[error("Malformed XML at position {position}: {message}")]
    Malformed { message: String, position: u64 },

    /// Required element is missing
    #[error("Missing required element '{element}' in {context}")]
    MissingElement { element: String, context: String },

    /// Document bytes are not valid text
    #[error("Unreadable document encoding: {0}")]
    Encoding(String),

    /// Elements are present but inconsistent
    #[error("Invalid package structure: {0}")]
    InvalidStructure(String),
}

impl ParsingError {
    pub fn missing(element: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingElement {
            element: element.into(),
            context: context.into(),
        }
    }
}

impl Reportable for ParsingError {
    fn report(&self) -> ErrorReport {
        let suggestion = match self {
            ParsingError::Malformed { .. } | ParsingError::Encoding(_) => {
                "Open the package in the designer and re-save it to repair the XML."
            }
            ParsingError::MissingElement { .. } | ParsingError::InvalidStructure(_) => {
                "Verify the file is an SSIS package exported by a supported designer version."
            }
        };
        ErrorReport::new(Severity::Critical, ErrorCategory::Parsing, self.to_string())
            .with_suggestion(suggestion)
    }
}

/// Data-flow lowering failures (fatal for that data flow only)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// The path graph is not a DAG
    #[error("cycle detected in data flow '{data_flow}' between components: {}", .members.join(", "))]
    CycleDetected { data_flow: String, members: Vec<String> },

    /// A property the translation depends on is missing or unusable
    #[error("Component '{component}' cannot be mapped: property '{property}' {reason}")]
    UnmappableProperty {
        component: ComponentKey,
        property: String,
        reason: String,
    },
}

impl ConversionError {
    pub fn unmappable(component: ComponentKey, property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnmappableProperty {
            component,
            property: property.into(),
            reason: reason.into(),
        }
    }
}

impl Reportable for ConversionError {
    fn report(&self) -> ErrorReport {
        match self {
            ConversionError::CycleDetected { data_flow, .. } => {
                ErrorReport::new(Severity::High, ErrorCategory::Conversion, self.to_string())
                    .with_suggestion("Remove the circular path between the listed components.")
                    .with_location(SourceLocation::element(data_flow.clone()))
            }
            ConversionError::UnmappableProperty { component, property, .. } => {
                ErrorReport::new(Severity::High, ErrorCategory::Conversion, self.to_string())
                    .with_suggestion(format!(
                        "Set '{}' on the component or supply it through a configuration file.",
                        property
                    ))
                    .with_location(SourceLocation::component(component))
            }
        }
    }
}

/// Override application failures (non-fatal, entry skipped)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigResolutionError {
    /// Path addresses an entity that does not exist
    #[error("Dangling configuration reference '{path}': {target} not found")]
    DanglingReference { path: String, target: String },

    /// Value cannot be converted to its declared type
    #[error("Invalid value for '{path}' ({value_type}): {reason}")]
    InvalidCoercion {
        path: String,
        value_type: String,
        reason: String,
    },

    /// Path expression cannot be parsed
    #[error("Malformed configuration path '{path}'")]
    MalformedPath { path: String },

    /// Configuration file could not be read or parsed
    #[error("Configuration file {} skipped: {message}", .path.display())]
    UnreadableFile { path: PathBuf, message: String },

    /// Configuration source type other than XML file
    #[error("Unsupported configuration type {kind} for '{name}' ({source_string})")]
    UnsupportedConfigurationType {
        name: String,
        kind: u8,
        source_string: String,
    },
}

impl Reportable for ConfigResolutionError {
    fn report(&self) -> ErrorReport {
        let (severity, suggestion, location) = match self {
            ConfigResolutionError::DanglingReference { path, .. } => (
                Severity::Medium,
                "Remove the entry or rename the target in the package.",
                SourceLocation::element(path.clone()),
            ),
            ConfigResolutionError::InvalidCoercion { path, .. } => (
                Severity::Medium,
                "Correct the ConfiguredValue or its ValueType.",
                SourceLocation::element(path.clone()),
            ),
            ConfigResolutionError::MalformedPath { path } => (
                Severity::Medium,
                "Use the \\Package.<Collection>[Key].Properties[Name] form.",
                SourceLocation::element(path.clone()),
            ),
            ConfigResolutionError::UnreadableFile { path, .. } => (
                Severity::High,
                "Fix or remove the configuration file.",
                SourceLocation::file(path.clone()),
            ),
            ConfigResolutionError::UnsupportedConfigurationType { name, .. } => (
                Severity::Medium,
                "Export the configuration to an XML .dtsConfig file.",
                SourceLocation::element(name.clone()),
            ),
        };
        ErrorReport::new(severity, ErrorCategory::ConfigResolution, self.to_string())
            .with_suggestion(suggestion)
            .with_location(location)
    }
}

/// Component type could not be recognized
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown component type for '{component}' (class '{class_id}', description '{description}')")]
pub struct ClassificationWarning {
    pub component: ComponentKey,
    pub class_id: String,
    pub description: String,
}

impl Reportable for ClassificationWarning {
    fn report(&self) -> ErrorReport {
        ErrorReport::new(Severity::Medium, ErrorCategory::Classification, self.to_string())
            .with_suggestion("Translate this component by hand; a stub was generated.")
            .with_location(SourceLocation::component(&self.component))
    }
}

/// Expression token outside the supported grammar
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unsupported token '{token}' in expression for '{column}' of {component}: {expression}")]
pub struct ExpressionWarning {
    pub component: ComponentKey,
    pub column: String,
    pub token: String,
    pub expression: String,
}

impl Reportable for ExpressionWarning {
    fn report(&self) -> ErrorReport {
        ErrorReport::new(Severity::Medium, ErrorCategory::Expression, self.to_string())
            .with_suggestion("Rewrite the expression in pandas; the column was passed through unchanged.")
            .with_location(SourceLocation::component(&self.component))
    }
}

/// A value or construct that needs a human to supply or translate it
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Manual input required for {location}: {reason}")]
pub struct ManualInputRequired {
    pub location: String,
    pub reason: String,
    pub component: Option<ComponentKey>,
}

impl ManualInputRequired {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
            component: None,
        }
    }

    pub fn for_component(key: &ComponentKey, reason: impl Into<String>) -> Self {
        Self {
            location: key.to_string(),
            reason: reason.into(),
            component: Some(key.clone()),
        }
    }
}

impl Reportable for ManualInputRequired {
    fn report(&self) -> ErrorReport {
        let location = match &self.component {
            Some(key) => SourceLocation::component(key),
            None => SourceLocation::element(self.location.clone()),
        };
        ErrorReport::new(Severity::Medium, ErrorCategory::ManualInput, self.to_string())
            .with_suggestion("Supply the value or translation in the generated artifacts.")
            .with_location(location)
    }
}

/// Recoverable inconsistency in the package structure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StructureWarning {
    pub message: String,
    pub element_path: Option<String>,
}

impl StructureWarning {
    pub fn new(message: impl Into<String>, element_path: Option<String>) -> Self {
        Self {
            message: message.into(),
            element_path,
        }
    }
}

impl Reportable for StructureWarning {
    fn report(&self) -> ErrorReport {
        let report = ErrorReport::new(Severity::Low, ErrorCategory::Structure, self.to_string());
        match &self.element_path {
            Some(path) => report.with_location(SourceLocation::element(path.clone())),
            None => report,
        }
    }
}

/// A recoverable condition attached to a package conversion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error(transparent)]
    ConfigResolution(#[from] ConfigResolutionError),
    #[error(transparent)]
    Classification(#[from] ClassificationWarning),
    #[error(transparent)]
    Expression(#[from] ExpressionWarning),
    #[error(transparent)]
    ManualInput(#[from] ManualInputRequired),
    #[error(transparent)]
    Structure(#[from] StructureWarning),
    /// A data flow that failed lowering while its siblings succeeded
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl Diagnostic {
    /// Whether the condition calls for a manual-review flag in the artifacts
    pub fn needs_review(&self) -> bool {
        !matches!(self, Diagnostic::Structure(_))
    }
}

impl Reportable for Diagnostic {
    fn report(&self) -> ErrorReport {
        match self {
            Diagnostic::ConfigResolution(e) => e.report(),
            Diagnostic::Classification(e) => e.report(),
            Diagnostic::Expression(e) => e.report(),
            Diagnostic::ManualInput(e) => e.report(),
            Diagnostic::Structure(e) => e.report(),
            Diagnostic::Conversion(e) => e.report(),
        }
    }
}

/// Errors that abort a package conversion
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    Parsing(#[from] ParsingError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Migration configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Artifact output could not be written
    #[error("Failed to write artifacts to {}: {message}", .path.display())]
    Output {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Multiple errors occurred
    #[error("Multiple errors occurred: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<MigrationError>),
}

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    pub fn output(path: impl Into<PathBuf>, message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Pipeline stage the error belongs to
    pub fn stage_name(&self) -> &'static str {
        match self {
            MigrationError::FileSystem(_) => "read",
            MigrationError::Parsing(_) => "parse",
            MigrationError::Conversion(_) => "map",
            MigrationError::Config(_) => "configure",
            MigrationError::Output { .. } => "write",
            MigrationError::Multiple(_) => "batch",
        }
    }

    /// Whether the error aborts the whole package
    ///
    /// A bare `ConversionError` only fails its own data flow.
    pub fn is_fatal(&self) -> bool {
        match self {
            MigrationError::Conversion(_) => false,
            MigrationError::Multiple(errors) => errors.iter().any(MigrationError::is_fatal),
            _ => true,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            MigrationError::FileSystem(FileSystemError::NotFound { path }) => format!(
                "File not found: {}\n\nHint: Check that the file exists and the path is correct.",
                path.display()
            ),
            MigrationError::FileSystem(FileSystemError::UnexpectedExtension { path, .. }) => format!(
                "Not a package file: {}\n\nHint: Only .dtsx files can be converted.",
                path.display()
            ),
            MigrationError::Parsing(e) => {
                format!("{e}\n\nHint: Open the package in the designer and re-save it.")
            }
            MigrationError::Config(msg) => {
                format!("Configuration error: {msg}\n\nHint: Check your migration configuration file.")
            }
            MigrationError::Output { path, .. } => format!(
                "{self}\n\nHint: Check that {} is writable.",
                path.display()
            ),
            _ => self.to_string(),
        }
    }
}

impl Reportable for MigrationError {
    fn report(&self) -> ErrorReport {
        match self {
            MigrationError::FileSystem(e) => e.report(),
            MigrationError::Parsing(e) => e.report(),
            MigrationError::Conversion(e) => e.report(),
            MigrationError::Config(_) => {
                ErrorReport::new(Severity::High, ErrorCategory::Configuration, self.to_string())
                    .with_suggestion("Check your migration configuration file.")
            }
            MigrationError::Output { path, .. } => {
                ErrorReport::new(Severity::Critical, ErrorCategory::FileSystem, self.to_string())
                    .with_suggestion("Check that the output directory is writable.")
                    .with_location(SourceLocation::file(path.clone()))
            }
            MigrationError::Multiple(_) => {
                ErrorReport::new(Severity::Critical, ErrorCategory::Conversion, self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConversionError::CycleDetected {
            data_flow: "Package\\Flow".to_string(),
            members: vec!["A".to_string(), "B".to_string()],
        };
        assert!(err.to_string().contains("cycle detected"));
        assert!(err.to_string().contains("A, B"));

        let err = ParsingError::missing("DTS:Executable", "document root");
        assert!(err.to_string().contains("DTS:Executable"));
    }

    #[test]
    fn test_report_shape() {
        let err = ConfigResolutionError::DanglingReference {
            path: "\\Package.Connections[Missing].Properties[ConnectionString]".to_string(),
            target: "connection 'Missing'".to_string(),
        };
        let report = err.report();
        assert_eq!(report.category, ErrorCategory::ConfigResolution);
        assert_eq!(report.severity, Severity::Medium);
        assert!(report.recovery_suggestion.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("recoverySuggestion").is_some());
        assert!(json.get("sourceLocation").is_some());
    }

    #[test]
    fn test_user_message() {
        let err = MigrationError::FileSystem(FileSystemError::NotFound {
            path: PathBuf::from("/data/missing.dtsx"),
        });
        let msg = err.user_message();
        assert!(msg.contains("/data/missing.dtsx"));
        assert!(msg.contains("Hint:"));
        assert_eq!(err.stage_name(), "read");
    }

    #[test]
    fn test_multiple_errors() {
        let errors = vec![
            MigrationError::Config("error 1".to_string()),
            MigrationError::Config("error 2".to_string()),
        ];
        let err = MigrationError::Multiple(errors);
        let display = err.to_string();
        assert!(display.contains("error 1"));
        assert!(display.contains("error 2"));
    }

    #[test]
    fn test_report_in_file() {
        let report = StructureWarning::new("duplicate id", None)
            .report()
            .in_file(Some(&PathBuf::from("a.dtsx")));
        assert_eq!(
            report.source_location.unwrap().file,
            Some(PathBuf::from("a.dtsx"))
        );
    }
}
