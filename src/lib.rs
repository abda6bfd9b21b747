//! SSIS Migration SDK - Converts SSIS packages into Python ETL scripts
//!
//! Provides unified interfaces for:
//! - Package parsing (`.dtsx`) and override files (`.dtsConfig`)
//! - Component classification
//! - Configuration overlay and placeholder detection
//! - Rule-based lowering of data flows and tasks
//! - Emission of the generated Python artifacts
//! - Single-package and batch conversion pipelines

pub mod classify;
pub mod error;
pub mod export;
pub mod import;
pub mod mapping;
pub mod models;
pub mod overlay;
pub mod pipeline;

// Re-export commonly used types
pub use classify::{ClassificationStrategy, ComponentClassifier};
pub use error::{
    ClassificationWarning, ConfigResolutionError, ConversionError, Diagnostic, ErrorCategory,
    ErrorReport, ExpressionWarning, FileSystemError, ManualInputRequired, MigrationError,
    MigrationResult, ParsingError, Reportable, Severity, SourceLocation, StructureWarning,
};
pub use export::{Artifact, ArtifactSet, ScriptEmitter};
pub use import::{ConfigDiscovery, ConfigImporter, DtsxImporter, ImportOutcome};
pub use mapping::{MappingEngine, PackageMapping};
pub use overlay::{BindingSet, ConfigResolver, OverlayOutcome};
pub use pipeline::{
    BatchReport, BatchRunner, MigrationConfig, MigrationPipeline, PackageConversion, TargetRuntime,
    convert_package,
};

// Re-export models
pub use models::{
    ConnectionManager, ControlFlowTask, DataFlow, DataFlowComponent, OperatorType, PackageModel,
    PackageSummary, PropertyValue, SemanticType, Variable,
};
