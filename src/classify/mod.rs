//! Component classification
//!
//! Resolves a raw component descriptor (class identifier plus description
//! text) to an operator type through an ordered chain of strategies. The
//! identifier table is authoritative; the description phrase list is the
//! fallback for identifiers shared by several component kinds.

pub mod strategy;
pub mod tables;

use tracing::{debug, warn};

use crate::error::ClassificationWarning;
use crate::models::DataFlowComponent;

pub use strategy::{Classification, ClassificationStrategy, DescriptionPhrases, IdentifierTable};

/// Ordered chain of classification strategies
#[derive(Debug)]
pub struct ComponentClassifier {
    strategies: Vec<Box<dyn ClassificationStrategy>>,
}

impl Default for ComponentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentClassifier {
    /// Identifier table first, then description phrases
    pub fn new() -> Self {
        Self {
            strategies: vec![Box::new(IdentifierTable), Box::new(DescriptionPhrases)],
        }
    }

    /// Chain with custom strategies, consulted in order
    pub fn with_strategies(strategies: Vec<Box<dyn ClassificationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Append a strategy consulted after the existing ones
    pub fn push(&mut self, strategy: Box<dyn ClassificationStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn classify(&self, class_id: &str, description: &str) -> Classification {
        self.strategies
            .iter()
            .find_map(|s| {
                s.classify(class_id, description).inspect(|c| {
                    debug!(strategy = s.name(), class_id, operator = %c.operator_type, "Classified component");
                })
            })
            .unwrap_or_else(Classification::unmatched)
    }

    /// Classify a component in place; returns a warning when it stays unknown
    pub fn apply(&self, component: &mut DataFlowComponent) -> Option<ClassificationWarning> {
        let description = component.description_text().to_string();
        let classification = self.classify(&component.class_id, &description);
        component.operator_type = classification.operator_type;
        component.matched_by = classification.matched_by;
        component.type_label = classification.label.clone();

        if classification.is_unknown() {
            let warning = ClassificationWarning {
                component: component.key(),
                class_id: component.class_id.clone(),
                description,
            };
            warn!(component = %warning.component, class_id = %warning.class_id, "Unknown component type");
            Some(warning)
        } else {
            None
        }
    }
}
