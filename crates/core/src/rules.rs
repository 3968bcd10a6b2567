//! Loads the prefix rule set from the store at the start of every cycle, and
//! seeds the rule table from TOML.

use crate::classifier::PrefixRules;
use crate::error::IntakeError;
use crate::models::FileTypeRule;
use crate::store::IntakeStore;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Reads every row of the rule table. Rows that fail to decode are skipped
/// with a warning; a failed query fails the load.
pub async fn load_rules(store: &dyn IntakeStore) -> Result<PrefixRules, IntakeError> {
    let rows = store.type_rule_rows().await.map_err(IntakeError::RuleLoad)?;
    let mut skipped = 0usize;
    let rules: Vec<FileTypeRule> = rows
        .into_iter()
        .filter_map(|row| match row {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(error = %e, "Skipping row");
                skipped += 1;
                None
            }
        })
        .collect();
    debug!(loaded = rules.len(), skipped, "loaded type prefixes");
    Ok(PrefixRules::new(rules))
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    rule: Vec<FileTypeRule>,
}

/// Parses `[[rule]]` tables with `prefix` and `type_id` keys.
pub fn parse_seed(content: &str) -> anyhow::Result<Vec<FileTypeRule>> {
    let seed: SeedFile = toml::from_str(content)?;
    Ok(seed.rule)
}

pub fn load_seed_file(path: &Path) -> anyhow::Result<Vec<FileTypeRule>> {
    let content = fs::read_to_string(path)?;
    parse_seed(&content)
}

/// Upserts each rule; returns how many were newly inserted.
pub async fn seed_rules(store: &dyn IntakeStore, rules: &[FileTypeRule]) -> anyhow::Result<usize> {
    let mut inserted = 0;
    for rule in rules {
        if store.upsert_type_rule(rule).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}
