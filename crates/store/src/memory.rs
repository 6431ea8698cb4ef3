use chrono::{DateTime, Utc};
use rusqlite::params;
use sa_domain::models::MemoryEntry;
use sa_domain::{Error, Result};

use crate::{map_err, Store};

const SELECT_COLS: &str =
    "id, key, value, category, tags_json, created_at, last_access_at, access_count";

impl Store {
    /// Keys are user-chosen labels, not unique identifiers (§3: "key not
    /// required unique") — every call inserts a fresh row with a fresh id.
    pub fn memory_set(
        &self,
        key: &str,
        value: &str,
        category: Option<&str>,
        tags: &[String],
    ) -> Result<MemoryEntry> {
        let now = Utc::now();
        let tags_json = serde_json::to_string(tags)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memory (id, key, value, category, tags_json, created_at, last_access_at, access_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 0)",
                params![id, key, value, category, tags_json, now.to_rfc3339()],
            )
            .map_err(map_err)?;
            get_by_id(conn, &id)?.ok_or_else(|| Error::Internal("memory row vanished after insert".into()))
        })
    }

    /// Bumps `access_count` on every successful lookup by id.
    pub fn memory_get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        self.with_conn(|conn| {
            bump_access(conn, id)?;
            get_by_id(conn, id)
        })
    }

    /// Looks a row up without touching `access_count` — for callers that
    /// need to inspect a candidate (e.g. to filter by category) before
    /// deciding whether it counts as an access.
    pub fn memory_peek(&self, id: &str) -> Result<Option<MemoryEntry>> {
        self.with_conn(|conn| get_by_id(conn, id))
    }

    /// Bumps `access_count` without re-fetching the row.
    pub fn memory_bump_access(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| bump_access(conn, id))
    }

    /// Idempotent: deleting a missing id reports `false`, not an error.
    pub fn memory_delete(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM memory WHERE id = ?1", params![id])
                .map_err(map_err)?;
            Ok(n > 0)
        })
    }

    pub fn memory_search(&self, category: Option<&str>, limit: u32) -> Result<Vec<MemoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = if category.is_some() {
                conn.prepare(&format!(
                    "SELECT {SELECT_COLS} FROM memory WHERE category = ?1 ORDER BY created_at DESC LIMIT ?2"
                ))
                .map_err(map_err)?
            } else {
                conn.prepare(&format!(
                    "SELECT {SELECT_COLS} FROM memory ORDER BY created_at DESC LIMIT ?1"
                ))
                .map_err(map_err)?
            };
            let rows = if let Some(cat) = category {
                stmt.query_map(params![cat, limit], |row| Ok(row_to_entry(row)))
            } else {
                stmt.query_map(params![limit], |row| Ok(row_to_entry(row)))
            }
            .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }
}

fn bump_access(conn: &rusqlite::Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE memory SET access_count = access_count + 1, last_access_at = ?2 WHERE id = ?1",
        params![id, Utc::now().to_rfc3339()],
    )
    .map_err(map_err)?;
    Ok(())
}

fn get_by_id(conn: &rusqlite::Connection, id: &str) -> Result<Option<MemoryEntry>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {SELECT_COLS} FROM memory WHERE id = ?1"))
        .map_err(map_err)?;
    let mut rows = stmt.query(params![id]).map_err(map_err)?;
    match rows.next().map_err(map_err)? {
        Some(row) => Ok(Some(row_to_entry(row)?)),
        None => Ok(None),
    }
}

fn row_to_entry(row: &rusqlite::Row) -> Result<MemoryEntry> {
    let tags_json: String = row.get(4).map_err(map_err)?;
    let created_at: String = row.get(5).map_err(map_err)?;
    let last_access_at: String = row.get(6).map_err(map_err)?;
    let access_count: i64 = row.get(7).map_err(map_err)?;
    Ok(MemoryEntry {
        id: row.get(0).map_err(map_err)?,
        key: row.get(1).map_err(map_err)?,
        value: row.get(2).map_err(map_err)?,
        category: row.get(3).map_err(map_err)?,
        tags: serde_json::from_str(&tags_json)?,
        created_at: parse_ts(&created_at)?,
        last_access_at: parse_ts(&last_access_at)?,
        access_count: access_count as u64,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::Internal(e.to_string()))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn set_then_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let entry = store.memory_set("pref", "dark", None, &[]).unwrap();
        assert_eq!(entry.key, "pref");
        assert_eq!(entry.access_count, 0);

        let fetched = store.memory_get(&entry.id).unwrap().unwrap();
        assert_eq!(fetched.id, entry.id);
        assert_eq!(fetched.access_count, 1, "memory_get bumps access_count");
    }

    #[test]
    fn set_with_a_repeated_key_inserts_a_distinct_row() {
        let store = Store::open_in_memory().unwrap();
        let first = store.memory_set("pref", "dark", None, &[]).unwrap();
        let second = store.memory_set("pref", "light", None, &[]).unwrap();
        assert_ne!(first.id, second.id, "key is not required unique, so both rows survive");
        assert_eq!(store.memory_search(None, 100).unwrap().len(), 2);
    }

    #[test]
    fn delete_then_list_reflects_removal() {
        let store = Store::open_in_memory().unwrap();
        let entry = store.memory_set("pref", "dark", None, &[]).unwrap();
        assert_eq!(store.memory_search(None, 100).unwrap().len(), 1);

        let deleted = store.memory_delete(&entry.id).unwrap();
        assert!(deleted);
        assert_eq!(store.memory_search(None, 100).unwrap().len(), 0);
    }

    #[test]
    fn delete_missing_id_reports_false() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.memory_delete("nonexistent").unwrap());
    }

    #[test]
    fn peek_does_not_bump_access_count() {
        let store = Store::open_in_memory().unwrap();
        let entry = store.memory_set("pref", "dark", None, &[]).unwrap();
        store.memory_peek(&entry.id).unwrap();
        store.memory_peek(&entry.id).unwrap();
        assert_eq!(store.memory_peek(&entry.id).unwrap().unwrap().access_count, 0);
    }

    #[test]
    fn bump_access_increments_without_returning_the_row() {
        let store = Store::open_in_memory().unwrap();
        let entry = store.memory_set("pref", "dark", None, &[]).unwrap();
        store.memory_bump_access(&entry.id).unwrap();
        assert_eq!(store.memory_peek(&entry.id).unwrap().unwrap().access_count, 1);
    }

    #[test]
    fn search_filters_by_category() {
        let store = Store::open_in_memory().unwrap();
        store.memory_set("a", "1", Some("notes"), &[]).unwrap();
        store.memory_set("b", "2", Some("prefs"), &[]).unwrap();
        let notes = store.memory_search(Some("notes"), 10).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].key, "a");
    }
}
