//! One scan cycle: load rules, walk the tree, record each new classifiable file.

use crate::classifier::PrefixRules;
use crate::config::{AppConfig, ExistencePolicy};
use crate::error::{IntakeError, StoreError};
use crate::models::FileRecord;
use crate::rules;
use crate::scanner::{DirectorySource, WalkEntry, WalkError};
use crate::store::IntakeStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub rules_loaded: usize,
    pub files_seen: usize,
    pub directories: usize,
    pub already_recorded: usize,
    pub recorded: usize,
    pub unclassified: usize,
    pub existence_errors: usize,
    pub insert_failures: usize,
    pub walk_errors: usize,
    pub recorded_files: Vec<RecordedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedFile {
    pub path: String,
    pub type_id: i64,
}

/// Returns true when `path` already has at least one row. Lookup failures are
/// returned, never read as "absent".
pub async fn file_exists(store: &dyn IntakeStore, path: &str) -> Result<bool, StoreError> {
    Ok(store.count_files_with_path(path).await? > 0)
}

/// Inserts one record, logging a failure before returning it.
pub async fn record_file(store: &dyn IntakeStore, record: &FileRecord) -> Result<(), StoreError> {
    store.insert_file(record).await.map_err(|e| {
        error!(path = %record.path, error = %e, "Failed to insert file");
        e
    })
}

pub struct ScanOrchestrator {
    store: Arc<dyn IntakeStore>,
    source: Arc<dyn DirectorySource>,
    root: PathBuf,
    existence_policy: ExistencePolicy,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn IntakeStore>,
        source: Arc<dyn DirectorySource>,
        root: impl Into<PathBuf>,
        existence_policy: ExistencePolicy,
    ) -> Self {
        Self {
            store,
            source,
            root: root.into(),
            existence_policy,
        }
    }

    pub fn from_config(
        cfg: &AppConfig,
        store: Arc<dyn IntakeStore>,
        source: Arc<dyn DirectorySource>,
    ) -> Self {
        Self::new(store, source, cfg.scan.root_path(), cfg.scan.existence_policy)
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Runs a single cycle. Rule-load and enumeration failures end the cycle
    /// with an error; per-file failures are counted in the summary.
    pub async fn run_cycle(&self) -> Result<ScanSummary, IntakeError> {
        info!(
            root = %self.root.display(),
            existence_policy = %self.existence_policy,
            "Starting scan cycle"
        );
        let rules = rules::load_rules(self.store.as_ref()).await?;
        if rules.is_empty() {
            warn!("No type prefixes loaded; nothing will be recorded this cycle");
        }

        let (tx, mut rx) = mpsc::channel(100);
        let source = Arc::clone(&self.source);
        let root = self.root.clone();

        // Walker task
        let walker_handle = task::spawn_blocking(move || {
            for item in source.walk(&root) {
                if tx.blocking_send(item).is_err() {
                    // Receiver dropped, stop walking.
                    break;
                }
            }
        });

        let mut summary = ScanSummary {
            rules_loaded: rules.len(),
            ..ScanSummary::default()
        };
        let mut outcome = Ok(());
        while let Some(item) = rx.recv().await {
            let step = match item {
                Ok(entry) => self.process_entry(entry, &rules, &mut summary).await,
                Err(e) => self.handle_walk_error(e, &mut summary),
            };
            if let Err(e) = step {
                outcome = Err(e);
                break;
            }
        }
        drop(rx);

        walker_handle
            .await
            .map_err(|e| IntakeError::Walker(e.to_string()))?;
        outcome?;

        info!(
            seen = summary.files_seen,
            recorded = summary.recorded,
            unclassified = summary.unclassified,
            failures = summary.insert_failures + summary.existence_errors,
            "Scan cycle complete"
        );
        Ok(summary)
    }

    async fn process_entry(
        &self,
        entry: WalkEntry,
        rules: &PrefixRules,
        summary: &mut ScanSummary,
    ) -> Result<(), IntakeError> {
        if entry.is_dir {
            summary.directories += 1;
            return Ok(());
        }
        summary.files_seen += 1;
        let path = entry.path.to_string_lossy().into_owned();

        match file_exists(self.store.as_ref(), &path).await {
            Ok(true) => {
                summary.already_recorded += 1;
                debug!(path = %path, "already recorded");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                summary.existence_errors += 1;
                match self.existence_policy {
                    ExistencePolicy::Lenient => {
                        warn!(path = %path, error = %e, "Existence check failed, skipping file");
                        return Ok(());
                    }
                    ExistencePolicy::Strict => {
                        return Err(IntakeError::ExistenceCheck { path, source: e });
                    }
                }
            }
        }

        let Some(type_id) = rules.classify(&entry.name) else {
            summary.unclassified += 1;
            warn!(file = %entry.name, "No matching prefix for file (skipped)");
            return Ok(());
        };

        let record = FileRecord {
            name: entry.name,
            path,
            size: entry.size,
            mod_time: entry.modified,
            type_id,
        };
        match record_file(self.store.as_ref(), &record).await {
            Ok(()) => {
                summary.recorded += 1;
                info!(path = %record.path, type_id, "Inserted");
                summary.recorded_files.push(RecordedFile {
                    path: record.path,
                    type_id,
                });
            }
            Err(_) => summary.insert_failures += 1,
        }
        Ok(())
    }

    fn handle_walk_error(&self, e: WalkError, summary: &mut ScanSummary) -> Result<(), IntakeError> {
        let path = e
            .path
            .as_deref()
            .unwrap_or(&self.root)
            .display()
            .to_string();
        if e.fatal {
            return Err(IntakeError::Enumeration {
                path,
                message: e.message,
            });
        }
        summary.walk_errors += 1;
        warn!(path = %path, error = %e.message, "Skipping unreadable entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{LocalSource, WalkIter};
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ListSource {
        items: Vec<Result<WalkEntry, WalkError>>,
        walks: AtomicUsize,
    }

    impl ListSource {
        fn files(paths: &[&str]) -> Self {
            Self {
                items: paths.iter().map(|p| Ok(file(p))).collect(),
                walks: AtomicUsize::new(0),
            }
        }
    }

    impl DirectorySource for ListSource {
        fn walk(&self, _root: &Path) -> WalkIter {
            self.walks.fetch_add(1, Ordering::SeqCst);
            Box::new(self.items.clone().into_iter())
        }
    }

    fn file(path: &str) -> WalkEntry {
        WalkEntry {
            name: path.rsplit('/').next().unwrap().to_string(),
            path: PathBuf::from(path),
            is_dir: false,
            size: 10,
            modified: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    fn dir(path: &str) -> WalkEntry {
        WalkEntry {
            is_dir: true,
            ..file(path)
        }
    }

    fn walk_error(path: &str, fatal: bool) -> WalkError {
        WalkError {
            path: Some(PathBuf::from(path)),
            fatal,
            message: "permission denied".into(),
        }
    }

    fn orchestrator(
        store: &Arc<MemoryStore>,
        source: &Arc<ListSource>,
        policy: ExistencePolicy,
    ) -> ScanOrchestrator {
        ScanOrchestrator::new(store.clone(), source.clone(), "/in", policy)
    }

    fn recorded_paths(store: &MemoryStore) -> Vec<String> {
        store.files().into_iter().map(|f| f.path).collect()
    }

    #[tokio::test]
    async fn second_cycle_over_unchanged_tree_records_nothing() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5), ("ach_rep", 6)]));
        let source = Arc::new(ListSource::files(&["/in/ach_1.txt", "/in/ACH_REP_2.csv"]));
        let orch = orchestrator(&store, &source, ExistencePolicy::Lenient);

        let first = orch.run_cycle().await.unwrap();
        assert_eq!(first.recorded, 2);
        assert_eq!(
            first.recorded_files,
            vec![
                RecordedFile {
                    path: "/in/ach_1.txt".into(),
                    type_id: 5
                },
                RecordedFile {
                    path: "/in/ACH_REP_2.csv".into(),
                    type_id: 6
                },
            ]
        );

        let second = orch.run_cycle().await.unwrap();
        assert_eq!(second.recorded, 0);
        assert_eq!(second.already_recorded, 2);
        assert_eq!(store.files().len(), 2);
        assert_eq!(store.rule_loads(), 2);
    }

    #[tokio::test]
    async fn record_keeps_walk_metadata() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        let source = Arc::new(ListSource::files(&["/in/sub/ach_1.txt"]));
        orchestrator(&store, &source, ExistencePolicy::Lenient)
            .run_cycle()
            .await
            .unwrap();

        let files = store.files();
        assert_eq!(
            files[0],
            FileRecord {
                name: "ach_1.txt".into(),
                path: "/in/sub/ach_1.txt".into(),
                size: 10,
                mod_time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
                type_id: 5,
            }
        );
    }

    #[tokio::test]
    async fn unmatched_files_wait_for_a_matching_rule() {
        let store = Arc::new(MemoryStore::with_rules(&[("xyz", 9)]));
        let source = Arc::new(ListSource::files(&["/in/report.csv"]));
        let orch = orchestrator(&store, &source, ExistencePolicy::Lenient);

        for _ in 0..2 {
            let summary = orch.run_cycle().await.unwrap();
            assert_eq!(summary.unclassified, 1);
            assert_eq!(summary.recorded, 0);
        }
        assert!(store.files().is_empty());

        store.push_rule("rep", 3);
        let summary = orch.run_cycle().await.unwrap();
        assert_eq!(summary.recorded, 1);
        assert_eq!(store.files()[0].type_id, 3);
    }

    #[tokio::test]
    async fn insert_failure_does_not_stop_the_walk() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        store.fail_insert_for("/in/ach_2.txt");
        let source = Arc::new(ListSource::files(&[
            "/in/ach_1.txt",
            "/in/ach_2.txt",
            "/in/ach_3.txt",
        ]));

        let summary = orchestrator(&store, &source, ExistencePolicy::Lenient)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(summary.insert_failures, 1);
        assert_eq!(summary.recorded, 2);
        assert_eq!(recorded_paths(&store), vec!["/in/ach_1.txt", "/in/ach_3.txt"]);
    }

    #[tokio::test]
    async fn lenient_policy_skips_failed_lookups() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        store.fail_lookup_for("/in/ach_1.txt");
        let source = Arc::new(ListSource::files(&["/in/ach_1.txt", "/in/ach_2.txt"]));

        let summary = orchestrator(&store, &source, ExistencePolicy::Lenient)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(summary.existence_errors, 1);
        assert_eq!(recorded_paths(&store), vec!["/in/ach_2.txt"]);
    }

    #[tokio::test]
    async fn strict_policy_aborts_on_failed_lookup() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        store.fail_lookup_for("/in/ach_1.txt");
        let source = Arc::new(ListSource::files(&["/in/ach_1.txt", "/in/ach_2.txt"]));

        let err = orchestrator(&store, &source, ExistencePolicy::Strict)
            .run_cycle()
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::ExistenceCheck { ref path, .. } if path == "/in/ach_1.txt"));
        assert!(store.files().is_empty());
    }

    #[tokio::test]
    async fn failed_rule_load_skips_the_walk() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        store.fail_rule_query();
        let source = Arc::new(ListSource::files(&["/in/ach_1.txt"]));

        let err = orchestrator(&store, &source, ExistencePolicy::Lenient)
            .run_cycle()
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::RuleLoad(_)));
        assert_eq!(source.walks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn partial_rule_load_still_classifies() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        store.push_malformed_rule("prefix has type null, expected text");
        let source = Arc::new(ListSource::files(&["/in/ach_1.txt"]));

        let summary = orchestrator(&store, &source, ExistencePolicy::Lenient)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(summary.rules_loaded, 1);
        assert_eq!(summary.recorded, 1);
    }

    #[tokio::test]
    async fn directories_and_entry_errors_are_skipped() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        let source = Arc::new(ListSource {
            items: vec![
                Ok(dir("/in/ach_dir")),
                Err(walk_error("/in/locked", false)),
                Ok(file("/in/ach_dir/ach_1.txt")),
            ],
            walks: AtomicUsize::new(0),
        });

        let summary = orchestrator(&store, &source, ExistencePolicy::Lenient)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(summary.directories, 1);
        assert_eq!(summary.walk_errors, 1);
        assert_eq!(recorded_paths(&store), vec!["/in/ach_dir/ach_1.txt"]);
    }

    #[tokio::test]
    async fn enumeration_failure_ends_the_cycle() {
        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5)]));
        let source = Arc::new(ListSource {
            items: vec![Err(walk_error("/in", true)), Ok(file("/in/ach_1.txt"))],
            walks: AtomicUsize::new(0),
        });

        let err = orchestrator(&store, &source, ExistencePolicy::Lenient)
            .run_cycle()
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Enumeration { .. }));
        assert!(store.files().is_empty());
    }

    #[tokio::test]
    async fn local_tree_end_to_end() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("batch")).unwrap();
        std::fs::write(temp.path().join("ach_1.txt"), "a").unwrap();
        std::fs::write(temp.path().join("batch/wire_2.xml"), "bb").unwrap();
        std::fs::write(temp.path().join("batch/notes.md"), "c").unwrap();

        let store = Arc::new(MemoryStore::with_rules(&[("ach", 5), ("WIRE", 7)]));
        let source = Arc::new(LocalSource::new(&[], false, false).unwrap());
        let orch = ScanOrchestrator::new(
            store.clone(),
            source,
            temp.path(),
            ExistencePolicy::Lenient,
        );

        let summary = orch.run_cycle().await.unwrap();
        assert_eq!(summary.files_seen, 3);
        assert_eq!(summary.recorded, 2);
        assert_eq!(summary.unclassified, 1);
        let wire = store
            .files()
            .into_iter()
            .find(|f| f.name == "wire_2.xml")
            .unwrap();
        assert_eq!(wire.type_id, 7);
        assert_eq!(wire.size, 2);
        assert_eq!(
            wire.path,
            temp.path().join("batch/wire_2.xml").to_string_lossy()
        );

        assert_eq!(orch.run_cycle().await.unwrap().recorded, 0);
    }
}
