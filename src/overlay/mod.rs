//! Configuration overlay
//!
//! Applies `.dtsConfig` entries onto a package model by path expression and
//! collects the external bindings referenced by placeholders in the result.

pub mod path;
pub mod placeholder;
pub mod resolver;

pub use path::ConfigTarget;
pub use placeholder::{Binding, BindingKind, BindingSet, PlaceholderMatch, detect};
pub use resolver::{ConfigResolver, OverlayOutcome};
