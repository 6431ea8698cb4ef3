use chrono::{DateTime, Utc};
use rusqlite::params;
use sa_domain::models::SessionRecord;
use sa_domain::{Error, Result};

use crate::{map_err, Store};

impl Store {
    /// Record a session the first time it's seen; a no-op thereafter.
    pub fn session_touch(&self, id: &str) -> Result<SessionRecord> {
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, created_at) VALUES (?1, ?2)
                 ON CONFLICT(id) DO NOTHING",
                params![id, now.to_rfc3339()],
            )
            .map_err(map_err)?;
            let created_at: String = conn
                .query_row(
                    "SELECT created_at FROM sessions WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(map_err)?;
            Ok(SessionRecord {
                id: id.to_string(),
                created_at: parse_ts(&created_at)?,
            })
        })
    }

    pub fn session_get(&self, id: &str) -> Result<Option<SessionRecord>> {
        self.with_conn(|conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM sessions WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .ok();
            row.map(|created_at| {
                Ok(SessionRecord {
                    id: id.to_string(),
                    created_at: parse_ts(&created_at)?,
                })
            })
            .transpose()
        })
    }

    /// Every known session id — the janitor's sweep list for context-
    /// snapshot pruning.
    pub fn session_all_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM sessions").map_err(map_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_err)?;
            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(map_err)
        })
    }
}


fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::Internal(e.to_string()))?
        .with_timezone(&Utc))
}
