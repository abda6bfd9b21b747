//! Classification strategies

use std::fmt;

use crate::models::{MatchStrategy, OperatorType};

use super::tables::{DESCRIPTION_PHRASES, IDENTIFIER_TABLE, is_shared_identifier, normalize_identifier};

/// Result of a successful classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub operator_type: OperatorType,
    pub matched_by: MatchStrategy,
    pub label: Option<String>,
}

impl Classification {
    pub fn unmatched() -> Self {
        Self {
            operator_type: OperatorType::Unknown,
            matched_by: MatchStrategy::Unmatched,
            label: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.operator_type == OperatorType::Unknown
    }
}

/// One link of the classification chain
pub trait ClassificationStrategy: fmt::Debug + Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    fn classify(&self, class_id: &str, description: &str) -> Option<Classification>;
}

/// Exact lookup of the component class identifier
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifierTable;

impl ClassificationStrategy for IdentifierTable {
    fn name(&self) -> &'static str {
        "identifier"
    }

    fn classify(&self, class_id: &str, _description: &str) -> Option<Classification> {
        if class_id.trim().is_empty() || is_shared_identifier(class_id) {
            return None;
        }
        IDENTIFIER_TABLE
            .get(&normalize_identifier(class_id))
            .map(|(operator_type, label)| Classification {
                operator_type: *operator_type,
                matched_by: MatchStrategy::Identifier,
                label: Some(label.to_string()),
            })
    }
}

/// Case-insensitive substring match on the description; longest phrase wins
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptionPhrases;

impl ClassificationStrategy for DescriptionPhrases {
    fn name(&self) -> &'static str {
        "description"
    }

    fn classify(&self, _class_id: &str, description: &str) -> Option<Classification> {
        let haystack = description.to_lowercase();
        if haystack.trim().is_empty() {
            return None;
        }
        let mut best: Option<&(&str, OperatorType, &str)> = None;
        for entry in DESCRIPTION_PHRASES {
            if haystack.contains(entry.0) && best.is_none_or(|b| entry.0.len() > b.0.len()) {
                best = Some(entry);
            }
        }
        best.map(|(_, operator_type, label)| Classification {
            operator_type: *operator_type,
            matched_by: MatchStrategy::Description,
            label: Some(label.to_string()),
        })
    }
}
