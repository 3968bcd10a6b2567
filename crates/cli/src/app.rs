//! Wiring shared by the `intake` commands: store setup, orchestrator
//! construction and output rendering.

use anyhow::Context;
use intake_core::classifier::PrefixRules;
use intake_core::config::AppConfig;
use intake_core::pipeline::{ScanOrchestrator, ScanSummary};
use intake_core::scanner::LocalSource;
use intake_core::store::SqliteIntakeStore;
use std::fmt::Write;
use std::sync::Arc;
use tracing::info;

/// Connects to the configured database, running migrations when enabled.
pub async fn open_store(cfg: &AppConfig) -> anyhow::Result<Arc<SqliteIntakeStore>> {
    let pool = storage::connect(&cfg.database.url)
        .await
        .context("db connect")?;
    if cfg.database.migrate {
        storage::migrate(&pool).await.context("db migrate")?;
    }
    info!(url = %cfg.database.url, "Connected to database");
    Ok(Arc::new(SqliteIntakeStore::from_config(pool, &cfg.database)))
}

pub fn build_orchestrator(
    cfg: &AppConfig,
    store: Arc<SqliteIntakeStore>,
) -> anyhow::Result<ScanOrchestrator> {
    let source = LocalSource::from_config(&cfg.scan).context("invalid scan.exclude pattern")?;
    Ok(ScanOrchestrator::from_config(cfg, store, Arc::new(source)))
}

pub fn render_summary(summary: &ScanSummary, json: bool) -> anyhow::Result<String> {
    if json {
        let value = serde_json::json!({
            "status": "ok",
            "summary": summary,
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }
    let mut out = String::new();
    for file in &summary.recorded_files {
        writeln!(out, "recorded: {} [type_id: {}]", file.path, file.type_id)?;
    }
    write!(
        out,
        "scan: seen {}, recorded {}, already recorded {}, unclassified {}, insert failures {}, lookup failures {}, walk errors {}",
        summary.files_seen,
        summary.recorded,
        summary.already_recorded,
        summary.unclassified,
        summary.insert_failures,
        summary.existence_errors,
        summary.walk_errors,
    )?;
    Ok(out)
}

pub fn render_rules(rules: &PrefixRules, json: bool) -> anyhow::Result<String> {
    if json {
        let list: Vec<_> = rules.iter().collect();
        return Ok(serde_json::to_string_pretty(&list)?);
    }
    if rules.is_empty() {
        return Ok("no rules".to_string());
    }
    let mut out = String::new();
    for rule in rules.iter() {
        writeln!(out, "{:<24} {}", format!("{:?}", rule.prefix), rule.type_id)?;
    }
    Ok(out.trim_end().to_string())
}

pub fn render_classification(filename: &str, type_id: Option<i64>) -> String {
    match type_id {
        Some(id) => format!("{filename}: {id}"),
        None => format!("{filename}: no match"),
    }
}
