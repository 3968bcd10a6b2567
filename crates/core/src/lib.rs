//! Core library: prefix classification, rule loading, directory walking and
//! the scan cycle that records newly seen files.

pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rules;
pub mod scanner;
pub mod scheduler;
pub mod store;

pub use classifier::PrefixRules;
pub use error::{IntakeError, StoreError};
pub use pipeline::{ScanOrchestrator, ScanSummary};
