use chrono::{DateTime, Utc};
use rusqlite::params;
use sa_domain::models::{AgentRecord, AgentStatus};
use sa_domain::{Error, Result};

use crate::{map_err, Store};

const SELECT_COLS: &str =
    "id, agent_type, task, status, parent_task_id, result_json, spawned_at, completed_at";

impl Store {
    pub fn agent_spawn(
        &self,
        agent_type: &str,
        task: &str,
        parent_task_id: Option<&str>,
    ) -> Result<AgentRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agents (id, agent_type, task, status, parent_task_id, spawned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    agent_type,
                    task,
                    AgentStatus::Pending.as_str(),
                    parent_task_id,
                    now.to_rfc3339(),
                ],
            )
            .map_err(map_err)?;
            get_by_id(conn, &id)?.ok_or_else(|| Error::Internal("agent vanished after insert".into()))
        })
    }

    pub fn agent_set_status(
        &self,
        id: &str,
        status: AgentStatus,
        result: Option<&serde_json::Value>,
    ) -> Result<AgentRecord> {
        let completed_at = matches!(
            status,
            AgentStatus::Completed | AgentStatus::Failed | AgentStatus::TimedOut
        )
        .then(|| Utc::now().to_rfc3339());
        let result_json = result.map(|v| v.to_string());
        self.with_conn(|conn| {
            let n = conn
                .execute(
                    "UPDATE agents SET status = ?2, result_json = ?3, completed_at = ?4 WHERE id = ?1",
                    params![id, status.as_str(), result_json, completed_at],
                )
                .map_err(map_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("agent {id} not found")));
            }
            get_by_id(conn, id)?.ok_or_else(|| Error::Internal("agent vanished after update".into()))
        })
    }

    pub fn agent_get(&self, id: &str) -> Result<Option<AgentRecord>> {
        self.with_conn(|conn| get_by_id(conn, id))
    }

    pub fn agent_list_by_status(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>> {
        self.with_conn(|conn| {
            let mut stmt = if status.is_some() {
                conn.prepare(&format!(
                    "SELECT {SELECT_COLS} FROM agents WHERE status = ?1 ORDER BY spawned_at"
                ))
                .map_err(map_err)?
            } else {
                conn.prepare(&format!("SELECT {SELECT_COLS} FROM agents ORDER BY spawned_at"))
                    .map_err(map_err)?
            };
            let rows = if let Some(s) = status {
                stmt.query_map(params![s.as_str()], |row| Ok(row_to_agent(row)))
            } else {
                stmt.query_map([], |row| Ok(row_to_agent(row)))
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


fn get_by_id(conn: &rusqlite::Connection, id: &str) -> Result<Option<AgentRecord>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {SELECT_COLS} FROM agents WHERE id = ?1"))
        .map_err(map_err)?;
    let mut rows = stmt.query(params![id]).map_err(map_err)?;
    match rows.next().map_err(map_err)? {
        Some(row) => Ok(Some(row_to_agent(row)?)),
        None => Ok(None),
    }
}

fn row_to_agent(row: &rusqlite::Row) -> Result<AgentRecord> {
    let status: String = row.get(3).map_err(map_err)?;
    let result_json: Option<String> = row.get(5).map_err(map_err)?;
    let spawned_at: String = row.get(6).map_err(map_err)?;
    let completed_at: Option<String> = row.get(7).map_err(map_err)?;
    Ok(AgentRecord {
        id: row.get(0).map_err(map_err)?,
        agent_type: row.get(1).map_err(map_err)?,
        task: row.get(2).map_err(map_err)?,
        status: AgentStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("bad agent status {status}")))?,
        parent_task_id: row.get(4).map_err(map_err)?,
        result: result_json.map(|s| serde_json::from_str(&s)).transpose()?,
        spawned_at: parse_ts(&spawned_at)?,
        completed_at: completed_at.map(|s| parse_ts(&s)).transpose()?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::Internal(e.to_string()))?
        .with_timezone(&Utc))
}
