use rusqlite::params;
use sa_domain::tool::ToolDescriptor;
use sa_domain::Result;

use crate::{map_err, Store};

const SELECT_COLS: &str =
    "name, provider_id, description, input_schema, category, keywords_json, usage_count";

impl Store {
    pub fn upsert_tool(&self, tool: &ToolDescriptor) -> Result<()> {
        let schema_json = tool.input_schema.to_string();
        let keywords_json = serde_json::to_string(&tool.keywords)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tools (name, provider_id, description, input_schema, category, keywords_json, usage_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                    provider_id = excluded.provider_id,
                    description = excluded.description,
                    input_schema = excluded.input_schema,
                    category = excluded.category,
                    keywords_json = excluded.keywords_json",
                params![
                    tool.name,
                    tool.provider_id,
                    tool.description,
                    schema_json,
                    tool.category,
                    keywords_json,
                    tool.usage_count,
                ],
            )
            .map_err(map_err)?;
            Ok(())
        })
    }

    pub fn remove_tools_for_provider(&self, provider_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM tools WHERE provider_id = ?1",
                params![provider_id],
            )
            .map_err(map_err)?;
            Ok(())
        })
    }

    pub fn get_tool(&self, name: &str) -> Result<Option<ToolDescriptor>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLS} FROM tools WHERE name = ?1"))
                .map_err(map_err)?;
            let mut rows = stmt.query(params![name]).map_err(map_err)?;
            match rows.next().map_err(map_err)? {
                Some(row) => Ok(Some(row_to_tool(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLS} FROM tools ORDER BY name"))
                .map_err(map_err)?;
            let rows = stmt
                .query_map([], |row| Ok(row_to_tool(row)))
                .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }

    /// Append a usage-log row and bump `tools.usage_count` atomically —
    /// this is the only writer of `usage_count`, so the indexer's
    /// usage-boost term always matches the log it's derived from.
    pub fn record_tool_usage(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
        success: bool,
        elapsed_ms: u64,
    ) -> Result<()> {
        let ts = chrono::Utc::now().to_rfc3339();
        let args_json = arguments.to_string();
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO usage_log (ts, tool_name, args_json, success, elapsed_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![ts, tool_name, args_json, success as i64, elapsed_ms as i64],
            )
            .map_err(map_err)?;
            tx.execute(
                "UPDATE tools SET usage_count = usage_count + 1 WHERE name = ?1",
                params![tool_name],
            )
            .map_err(map_err)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn sample(name: &str, provider_id: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            provider_id: provider_id.to_string(),
            description: "a tool".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
            category: None,
            keywords: Vec::new(),
            usage_count: 0,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_tool(&sample("read_file", "internal:fs")).unwrap();
        let fetched = store.get_tool("read_file").unwrap().unwrap();
        assert_eq!(fetched.provider_id, "internal:fs");
    }

    #[test]
    fn upsert_on_existing_name_overwrites() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_tool(&sample("read_file", "internal:fs")).unwrap();
        let mut updated = sample("read_file", "internal:fs");
        updated.description = "reads a file from disk".to_string();
        store.upsert_tool(&updated).unwrap();
        let fetched = store.get_tool("read_file").unwrap().unwrap();
        assert_eq!(fetched.description, "reads a file from disk");
    }

    #[test]
    fn record_usage_appends_log_and_bumps_count() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_tool(&sample("read_file", "internal:fs")).unwrap();
        store
            .record_tool_usage("read_file", &serde_json::json!({}), true, 12)
            .unwrap();
        store
            .record_tool_usage("read_file", &serde_json::json!({}), false, 8)
            .unwrap();
        assert_eq!(store.usage_count("read_file").unwrap(), 2);
        let log = store.recent_usage("read_file", 10).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn remove_tools_for_provider_only_removes_its_own() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_tool(&sample("read_file", "internal:fs")).unwrap();
        store.upsert_tool(&sample("send_slack", "ext:slack")).unwrap();
        store.remove_tools_for_provider("internal:fs").unwrap();
        assert!(store.get_tool("read_file").unwrap().is_none());
        assert!(store.get_tool("send_slack").unwrap().is_some());
    }
}

fn row_to_tool(row: &rusqlite::Row) -> Result<ToolDescriptor> {
    let schema_json: String = row.get(3).map_err(map_err)?;
    let keywords_json: String = row.get(5).map_err(map_err)?;
    Ok(ToolDescriptor {
        name: row.get(0).map_err(map_err)?,
        provider_id: row.get(1).map_err(map_err)?,
        description: row.get(2).map_err(map_err)?,
        input_schema: serde_json::from_str(&schema_json)?,
        category: row.get(4).map_err(map_err)?,
        keywords: serde_json::from_str(&keywords_json)?,
        usage_count: {
            let n: i64 = row.get(6).map_err(map_err)?;
            n as u64
        },
    })
}
