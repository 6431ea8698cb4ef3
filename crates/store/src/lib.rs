//! Single-database persistence for every entity in §3: providers and
//! tools (for the registry/indexer to load), the usage log, and the
//! first-party feature managers' own state (memory, tasks, test runs,
//! guides, agents, context snapshots, sessions).
//!
//! One [`Store`] owns the one `rusqlite::Connection`; everything else in
//! this crate is a thin, typed layer of queries over it.

mod db;
mod schema;

pub mod agents;
pub mod context_snapshots;
pub mod guides;
pub mod memory;
pub mod providers;
pub mod sessions;
pub mod tasks;
pub mod testruns;
pub mod tools;
pub mod usage_log;

pub use db::{map_err, Store};
