use crate::error::IntakeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROOT: &str = "./watch_folder";
pub const DEFAULT_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_rule_table")]
    pub rule_table: String,
    #[serde(default = "default_file_table")]
    pub file_table: String,
    /// Apply the bundled migrations on connect.
    #[serde(default = "default_true")]
    pub migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            rule_table: default_rule_table(),
            file_table: default_file_table(),
            migrate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub skip_hidden: bool,
    #[serde(default)]
    pub follow_links: bool,
    #[serde(default)]
    pub existence_policy: ExistencePolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            exclude: Vec::new(),
            skip_hidden: false,
            follow_links: false,
            existence_policy: ExistencePolicy::default(),
        }
    }
}

impl ScanConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// What a cycle does when the existence check for one file fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistencePolicy {
    /// Skip that file and keep walking.
    #[default]
    Lenient,
    /// Abort the whole cycle.
    Strict,
}

impl std::fmt::Display for ExistencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExistencePolicy::Lenient => f.write_str("lenient"),
            ExistencePolicy::Strict => f.write_str("strict"),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://data/intake.db".to_string()
}

fn default_rule_table() -> String {
    "file_types".to_string()
}

fn default_file_table() -> String {
    "files".to_string()
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

/// Loads configuration from defaults, an optional file and `INTAKE__*`
/// environment variables, in increasing precedence.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("INTAKE").separator("__"));
    let cfg: AppConfig = settings.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.scan.root.trim().is_empty() {
            return Err(IntakeError::Config("scan.root must not be empty".into()));
        }
        if self.scan.interval_secs == 0 {
            return Err(IntakeError::Config(
                "scan.interval_secs must be greater than zero".into(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(IntakeError::Config("database.url must not be empty".into()));
        }
        for (key, name) in [
            ("database.rule_table", &self.database.rule_table),
            ("database.file_table", &self.database.file_table),
        ] {
            if !is_identifier(name) {
                return Err(IntakeError::Config(format!(
                    "{key} is not a plain SQL identifier: {name:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Table names are spliced into SQL text, so only plain identifiers pass.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
