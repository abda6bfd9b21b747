//! Models module for the SDK
//!
//! Defines the intermediate representation produced by the importers and
//! consumed by the mapping engine and the script emitter.

pub mod component;
pub mod config;
pub mod connection;
pub mod package;
pub mod task;
pub mod value;
pub mod variable;

pub use component::{
    ColumnDef, ComponentKey, ComponentPort, ConnectionRef, DataFlow, DataFlowComponent,
    DataFlowEdge, LineageEntry, LineageIndex, MatchStrategy, OperatorType,
};
pub use config::{ConfigEntry, ConfigFile, ConfigHeading, ConfigValueType, DeclaredConfiguration};
pub use connection::ConnectionManager;
pub use package::{PackageModel, PackageSummary};
pub use task::{ControlFlowTask, PrecedenceConstraint, TaskKind};
pub use value::{PropertyMap, PropertyValue, SemanticType};
pub use variable::Variable;
