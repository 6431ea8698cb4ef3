//! The one optional background sweep: pruning expired context snapshots
//! (§5). Adapted from the teacher's periodic-cleanup idiom in
//! `gateway/src/main.rs` (a `tokio::time::interval` loop spawned once at
//! startup), narrowed to the one janitor this spec actually calls for.

use std::sync::Arc;
use std::time::Duration;

use sa_store::Store;
use tracing::warn;

/// How many of the newest snapshots to keep per session.
const KEEP_PER_SESSION: u32 = 10;

/// Sweep every known session, pruning all but the newest
/// [`KEEP_PER_SESSION`] context snapshots. Runs once per tick; a
/// per-session failure is logged and does not stop the sweep.
pub async fn run(store: Arc<Store>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        sweep_once(&store);
    }
}

fn sweep_once(store: &Store) {
    let ids = match store.session_all_ids() {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "context-snapshot janitor failed to list sessions");
            return;
        }
    };
    for id in ids {
        if let Err(e) = store.snapshot_prune(&id, KEEP_PER_SESSION) {
            warn!(session = %id, error = %e, "context-snapshot janitor failed to prune");
        }
    }
}
