use std::collections::HashMap;

use rusqlite::params;
use sa_domain::tool::{ProviderDescriptor, ProviderInvocation};
use sa_domain::Result;

use crate::{map_err, Store};

impl Store {
    pub fn upsert_provider(&self, provider: &ProviderDescriptor) -> Result<()> {
        let args_json = serde_json::to_string(&provider.invocation.args)?;
        let env_json = serde_json::to_string(&provider.invocation.env)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO providers (id, display_name, command, args_json, env_json, quality_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    display_name = excluded.display_name,
                    command = excluded.command,
                    args_json = excluded.args_json,
                    env_json = excluded.env_json,
                    quality_score = excluded.quality_score",
                params![
                    provider.id,
                    provider.display_name,
                    provider.invocation.command,
                    args_json,
                    env_json,
                    provider.quality_score,
                ],
            )
            .map_err(map_err)?;
            Ok(())
        })
    }

    pub fn remove_provider(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM providers WHERE id = ?1", params![id])
                .map_err(map_err)?;
            Ok(())
        })
    }

    pub fn get_provider(&self, id: &str) -> Result<Option<ProviderDescriptor>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, display_name, command, args_json, env_json, quality_score
                     FROM providers WHERE id = ?1",
                )
                .map_err(map_err)?;
            let mut rows = stmt.query(params![id]).map_err(map_err)?;
            match rows.next().map_err(map_err)? {
                Some(row) => Ok(Some(row_to_provider(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn list_providers(&self) -> Result<Vec<ProviderDescriptor>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, display_name, command, args_json, env_json, quality_score
                     FROM providers ORDER BY id",
                )
                .map_err(map_err)?;
            let rows = stmt
                .query_map([], |row| Ok(row_to_provider(row)))
                .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn sample(id: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_string(),
            display_name: "Slack connector".to_string(),
            invocation: ProviderInvocation {
                command: "slack-mcp".to_string(),
                args: vec!["--stdio".to_string()],
                env: HashMap::new(),
            },
            quality_score: Some(0.9),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_provider(&sample("ext:slack")).unwrap();
        let fetched = store.get_provider("ext:slack").unwrap().unwrap();
        assert_eq!(fetched.display_name, "Slack connector");
        assert_eq!(fetched.invocation.command, "slack-mcp");
    }

    #[test]
    fn remove_cascades_to_its_tools() {
        // §8 property 7: after connect/disconnect, no tools remain for P.
        let store = Store::open_in_memory().unwrap();
        store.upsert_provider(&sample("ext:slack")).unwrap();
        let tool = sa_domain::tool::ToolDescriptor {
            name: "send_slack".to_string(),
            provider_id: "ext:slack".to_string(),
            description: "send a message".to_string(),
            input_schema: serde_json::json!({}),
            category: None,
            keywords: Vec::new(),
            usage_count: 0,
        };
        store.upsert_tool(&tool).unwrap();

        store.remove_provider("ext:slack").unwrap();
        assert!(store.get_provider("ext:slack").unwrap().is_none());
        assert!(store.get_tool("send_slack").unwrap().is_none());
    }

    #[test]
    fn list_providers_is_sorted_by_id() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_provider(&sample("ext:zeta")).unwrap();
        store.upsert_provider(&sample("ext:alpha")).unwrap();
        let ids: Vec<String> = store.list_providers().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["ext:alpha".to_string(), "ext:zeta".to_string()]);
    }
}

fn row_to_provider(row: &rusqlite::Row) -> Result<ProviderDescriptor> {
    let command: String = row.get(2).map_err(map_err)?;
    let args_json: String = row.get(3).map_err(map_err)?;
    let env_json: String = row.get(4).map_err(map_err)?;
    let args: Vec<String> = serde_json::from_str(&args_json)?;
    let env: HashMap<String, String> = serde_json::from_str(&env_json)?;
    Ok(ProviderDescriptor {
        id: row.get(0).map_err(map_err)?,
        display_name: row.get(1).map_err(map_err)?,
        invocation: ProviderInvocation { command, args, env },
        quality_score: row.get(5).map_err(map_err)?,
    })
}
