use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maps filenames starting with `prefix` (case-insensitive) to `type_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeRule {
    pub prefix: String,
    pub type_id: i64,
}

/// A discovered file, written once per distinct `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub type_id: i64,
}
