use chrono::DateTime;
use rusqlite::params;
use sa_domain::models::UsageLogEntry;
use sa_domain::Result;

use crate::{map_err, Store};

impl Store {
    /// Most recent usage-log rows for a tool, newest first, bounded by
    /// `limit`.
    pub fn recent_usage(&self, tool_name: &str, limit: u32) -> Result<Vec<UsageLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, ts, tool_name, args_json, success, elapsed_ms
                     FROM usage_log WHERE tool_name = ?1
                     ORDER BY ts DESC LIMIT ?2",
                )
                .map_err(map_err)?;
            let rows = stmt
                .query_map(params![tool_name, limit], |row| Ok(row_to_entry(row)))
                .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }

    pub fn usage_count(&self, tool_name: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row(
                    "SELECT usage_count FROM tools WHERE name = ?1",
                    params![tool_name],
                    |row| row.get(0),
                )
                .map_err(map_err)?;
            Ok(n as u64)
        })
    }
}


fn row_to_entry(row: &rusqlite::Row) -> Result<UsageLogEntry> {
    let ts_str: String = row.get(1).map_err(map_err)?;
    let args_json: String = row.get(3).map_err(map_err)?;
    let success: i64 = row.get(4).map_err(map_err)?;
    let elapsed_ms: i64 = row.get(5).map_err(map_err)?;
    Ok(UsageLogEntry {
        id: row.get(0).map_err(map_err)?,
        ts: DateTime::parse_from_rfc3339(&ts_str)
            .map_err(|e| sa_domain::Error::Internal(e.to_string()))?
            .with_timezone(&chrono::Utc),
        tool_name: row.get(2).map_err(map_err)?,
        arguments: serde_json::from_str(&args_json)?,
        success: success != 0,
        elapsed_ms: elapsed_ms as u64,
    })
}
