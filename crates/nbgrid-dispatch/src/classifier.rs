//! Ordered substring classification of workload identifiers.

use nbgrid_core::{Category, ClassificationRule, DispatchSettings};

/// First-match-wins rule list with a fallback category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
    fallback: Category,
}

impl Classifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self {
            rules,
            fallback: Category::Default,
        }
    }

    pub fn with_fallback(mut self, fallback: Category) -> Self {
        self.fallback = fallback;
        self
    }

    /// Category of the first rule whose needle occurs in `identifier`.
    /// Matching is case-sensitive.
    pub fn classify(&self, identifier: &str) -> Category {
        self.rules
            .iter()
            .find(|rule| rule.matches(identifier))
            .map(|rule| rule.category)
            .unwrap_or(self.fallback)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DispatchSettings::default().rules)
    }
}

impl From<&DispatchSettings> for Classifier {
    fn from(settings: &DispatchSettings) -> Self {
        Self::new(settings.rules.clone())
    }
}
