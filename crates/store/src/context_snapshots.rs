use chrono::{DateTime, Utc};
use rusqlite::params;
use sa_domain::models::ContextSnapshot;
use sa_domain::{Error, Result};

use crate::{map_err, Store};

const SELECT_COLS: &str = "id, session_id, captured_at, snapshot_json, metadata_json";

impl Store {
    pub fn snapshot_capture(
        &self,
        session_id: &str,
        snapshot: &serde_json::Value,
        metadata: Option<&serde_json::Value>,
    ) -> Result<ContextSnapshot> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let snapshot_json = snapshot.to_string();
        let metadata_json = metadata.map(|v| v.to_string());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO context_snapshots (id, session_id, captured_at, snapshot_json, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, session_id, now.to_rfc3339(), snapshot_json, metadata_json],
            )
            .map_err(map_err)?;
            get_by_id(conn, &id)?
                .ok_or_else(|| Error::Internal("snapshot vanished after insert".into()))
        })
    }

    pub fn snapshot_latest(&self, session_id: &str) -> Result<Option<ContextSnapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM context_snapshots WHERE session_id = ?1 ORDER BY captured_at DESC LIMIT 1"
                ))
                .map_err(map_err)?;
            let mut rows = stmt.query(params![session_id]).map_err(map_err)?;
            match rows.next().map_err(map_err)? {
                Some(row) => Ok(Some(row_to_snapshot(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn snapshot_history(&self, session_id: &str, limit: u32) -> Result<Vec<ContextSnapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM context_snapshots WHERE session_id = ?1 ORDER BY captured_at DESC LIMIT ?2"
                ))
                .map_err(map_err)?;
            let rows = stmt
                .query_map(params![session_id, limit], |row| Ok(row_to_snapshot(row)))
                .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }

    /// Delete all but the `keep` most recent snapshots per session —
    /// the janitor's pruning pass.
    pub fn snapshot_prune(&self, session_id: &str, keep: u32) -> Result<u64> {
        self.with_conn(|conn| {
            let n = conn
                .execute(
                    "DELETE FROM context_snapshots
                     WHERE session_id = ?1 AND id NOT IN (
                        SELECT id FROM context_snapshots
                        WHERE session_id = ?1
                        ORDER BY captured_at DESC LIMIT ?2
                     )",
                    params![session_id, keep],
                )
                .map_err(map_err)?;
            Ok(n as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn capture_then_latest_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let snap = store
            .snapshot_capture("session-1", &serde_json::json!({"turns": 3}), None)
            .unwrap();
        let latest = store.snapshot_latest("session-1").unwrap().unwrap();
        assert_eq!(latest.id, snap.id);
        assert_eq!(latest.snapshot, serde_json::json!({"turns": 3}));
    }

    #[test]
    fn latest_for_unknown_session_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.snapshot_latest("nobody").unwrap().is_none());
    }

    #[test]
    fn history_returns_newest_first_bounded_by_limit() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .snapshot_capture("session-1", &serde_json::json!({"turn": i}), None)
                .unwrap();
        }
        let history = store.snapshot_history("session-1", 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].snapshot, serde_json::json!({"turn": 2}));
        assert_eq!(history[1].snapshot, serde_json::json!({"turn": 1}));
    }

    #[test]
    fn prune_keeps_only_the_newest_n() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .snapshot_capture("session-1", &serde_json::json!({"turn": i}), None)
                .unwrap();
        }
        let removed = store.snapshot_prune("session-1", 2).unwrap();
        assert_eq!(removed, 3);
        let remaining = store.snapshot_history("session-1", 10).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].snapshot, serde_json::json!({"turn": 4}));
        assert_eq!(remaining[1].snapshot, serde_json::json!({"turn": 3}));
    }

    #[test]
    fn prune_does_not_touch_other_sessions() {
        let store = Store::open_in_memory().unwrap();
        store
            .snapshot_capture("session-a", &serde_json::json!({}), None)
            .unwrap();
        store
            .snapshot_capture("session-b", &serde_json::json!({}), None)
            .unwrap();
        store.snapshot_prune("session-a", 0).unwrap();
        assert!(store.snapshot_latest("session-a").unwrap().is_none());
        assert!(store.snapshot_latest("session-b").unwrap().is_some());
    }
}

fn get_by_id(conn: &rusqlite::Connection, id: &str) -> Result<Option<ContextSnapshot>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {SELECT_COLS} FROM context_snapshots WHERE id = ?1"))
        .map_err(map_err)?;
    let mut rows = stmt.query(params![id]).map_err(map_err)?;
    match rows.next().map_err(map_err)? {
        Some(row) => Ok(Some(row_to_snapshot(row)?)),
        None => Ok(None),
    }
}

fn row_to_snapshot(row: &rusqlite::Row) -> Result<ContextSnapshot> {
    let captured_at: String = row.get(2).map_err(map_err)?;
    let snapshot_json: String = row.get(3).map_err(map_err)?;
    let metadata_json: Option<String> = row.get(4).map_err(map_err)?;
    Ok(ContextSnapshot {
        id: row.get(0).map_err(map_err)?,
        session_id: row.get(1).map_err(map_err)?,
        captured_at: parse_ts(&captured_at)?,
        snapshot: serde_json::from_str(&snapshot_json)?,
        metadata: metadata_json.map(|s| serde_json::from_str(&s)).transpose()?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::Internal(e.to_string()))?
        .with_timezone(&Utc))
}
