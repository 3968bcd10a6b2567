//! Longest-prefix classification of filenames.

use crate::models::FileTypeRule;
use serde::Serialize;

/// A rule set ordered for matching: longest prefix first, then lexicographic
/// prefix, then smallest type id. Prefixes are stored lower-cased.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrefixRules {
    rules: Vec<FileTypeRule>,
}

impl PrefixRules {
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = FileTypeRule>,
    {
        let mut rules: Vec<FileTypeRule> = rules
            .into_iter()
            .map(|r| FileTypeRule {
                prefix: r.prefix.to_lowercase(),
                type_id: r.type_id,
            })
            .collect();
        rules.sort_by(|a, b| {
            b.prefix
                .chars()
                .count()
                .cmp(&a.prefix.chars().count())
                .then_with(|| a.prefix.cmp(&b.prefix))
                .then_with(|| a.type_id.cmp(&b.type_id))
        });
        Self { rules }
    }

    /// Returns the type id of the most specific rule matching `filename`, or
    /// `None` when no prefix matches.
    pub fn classify(&self, filename: &str) -> Option<i64> {
        let filename = filename.to_lowercase();
        self.rules
            .iter()
            .find(|r| filename.starts_with(&r.prefix))
            .map(|r| r.type_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in the order they are tried.
    pub fn iter(&self) -> impl Iterator<Item = &FileTypeRule> {
        self.rules.iter()
    }
}

impl FromIterator<FileTypeRule> for PrefixRules {
    fn from_iter<T: IntoIterator<Item = FileTypeRule>>(iter: T) -> Self {
        Self::new(iter)
    }
}
