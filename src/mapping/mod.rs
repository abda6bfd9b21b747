//! Component mapping
//!
//! Lowers the data flows and tasks of a [`PackageModel`] into Python code
//! fragments. Each data flow is checked for cycles, ordered topologically
//! (declaration order breaks ties) and every component is handed to the
//! rule registered for its operator type.
//!
//! # Example
//!
//! ```rust
//! use ssis_migration_sdk::mapping::MappingEngine;
//! use ssis_migration_sdk::models::PackageModel;
//!
//! let package = PackageModel::new("Orders");
//! let mapping = MappingEngine::new().map_package(&package);
//! assert!(mapping.data_flows.is_empty());
//! ```

pub mod engine;
pub mod expression;
pub mod python;
pub mod rules;
pub mod tasks;
pub mod types;

pub use engine::MappingEngine;
pub use expression::{ExpressionTranslator, Translated, UnsupportedToken};
pub use rules::{MappingRule, RuleContext, DEFAULT_RULES};
pub use tasks::{control_flow_order, lower_task};
pub use types::{
    DataFlowMapping, ExecutionStep, FailedDataFlow, ImportSet, MappedFragment, PackageMapping,
    StepTarget, TaskFragment,
};

use crate::models::PackageModel;

/// Map a package with the default rule table
pub fn map_package(package: &PackageModel) -> PackageMapping {
    MappingEngine::default().map_package(package)
}
