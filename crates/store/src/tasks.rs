use chrono::{DateTime, Utc};
use rusqlite::params;
use sa_domain::models::{TaskItem, TaskStatus, TddPhase};
use sa_domain::{Error, Result};

use crate::{map_err, Store};

const SELECT_COLS: &str = "id, content, status, parent_id, tags_json, item_type, tdd_phase, test_path, agent_id, created_at, completed_at";

impl Store {
    pub fn task_create(
        &self,
        content: &str,
        parent_id: Option<&str>,
        tags: &[String],
        item_type: Option<&str>,
    ) -> Result<TaskItem> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let tags_json = serde_json::to_string(tags)?;
        self.with_tx(|tx| {
            if let Some(parent) = parent_id {
                let exists: bool = tx
                    .query_row(
                        "SELECT 1 FROM tasks WHERE id = ?1",
                        params![parent],
                        |_| Ok(true),
                    )
                    .unwrap_or(false);
                if !exists {
                    return Err(Error::NotFound(format!("parent task {parent} not found")));
                }
            }
            tx.execute(
                "INSERT INTO tasks (id, content, status, parent_id, tags_json, item_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    content,
                    TaskStatus::Pending.as_str(),
                    parent_id,
                    tags_json,
                    item_type,
                    now.to_rfc3339(),
                ],
            )
            .map_err(map_err)?;
            get_by_id(tx, &id)?.ok_or_else(|| Error::Internal("task vanished after insert".into()))
        })
    }

    /// Reparent a task, rejecting any move that would create a cycle.
    /// Cycle detection walks `parent_id` ancestors of `new_parent` inside
    /// the same transaction as the update, so the check and the write
    /// are atomic against concurrent moves.
    pub fn task_set_parent(&self, id: &str, new_parent: Option<&str>) -> Result<TaskItem> {
        self.with_tx(|tx| {
            if !row_exists(tx, id)? {
                return Err(Error::NotFound(format!("task {id} not found")));
            }
            if let Some(parent) = new_parent {
                if parent == id {
                    return Err(Error::CycleDetected {
                        offending_id: id.to_string(),
                    });
                }
                if !row_exists(tx, parent)? {
                    return Err(Error::NotFound(format!("parent task {parent} not found")));
                }
                let mut cursor = Some(parent.to_string());
                while let Some(current) = cursor {
                    if current == id {
                        return Err(Error::CycleDetected {
                            offending_id: id.to_string(),
                        });
                    }
                    cursor = tx
                        .query_row(
                            "SELECT parent_id FROM tasks WHERE id = ?1",
                            params![current],
                            |row| row.get::<_, Option<String>>(0),
                        )
                        .map_err(map_err)?;
                }
            }
            tx.execute(
                "UPDATE tasks SET parent_id = ?2 WHERE id = ?1",
                params![id, new_parent],
            )
            .map_err(map_err)?;
            get_by_id(tx, id)?.ok_or_else(|| Error::Internal("task vanished after update".into()))
        })
    }

    pub fn task_set_status(&self, id: &str, status: TaskStatus) -> Result<TaskItem> {
        let completed_at = matches!(status, TaskStatus::Completed).then(|| Utc::now().to_rfc3339());
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    "UPDATE tasks SET status = ?2, completed_at = ?3 WHERE id = ?1",
                    params![id, status.as_str(), completed_at],
                )
                .map_err(map_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("task {id} not found")));
            }
            get_by_id(tx, id)?.ok_or_else(|| Error::Internal("task vanished after update".into()))
        })
    }

    pub fn task_set_content(&self, id: &str, content: &str) -> Result<TaskItem> {
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    "UPDATE tasks SET content = ?2 WHERE id = ?1",
                    params![id, content],
                )
                .map_err(map_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("task {id} not found")));
            }
            get_by_id(tx, id)?.ok_or_else(|| Error::Internal("task vanished after update".into()))
        })
    }

    pub fn task_set_tdd(
        &self,
        id: &str,
        phase: Option<TddPhase>,
        test_path: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<TaskItem> {
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    "UPDATE tasks SET tdd_phase = ?2, test_path = ?3, agent_id = ?4 WHERE id = ?1",
                    params![id, phase.map(|p| p.as_str()), test_path, agent_id],
                )
                .map_err(map_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("task {id} not found")));
            }
            get_by_id(tx, id)?.ok_or_else(|| Error::Internal("task vanished after update".into()))
        })
    }

    /// Delete a task and, via `ON DELETE CASCADE` on `tasks.parent_id`,
    /// its entire subtree.
    pub fn task_delete(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM tasks WHERE id = ?1", params![id])
                .map_err(map_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("task {id} not found")));
            }
            Ok(())
        })
    }

    pub fn task_get(&self, id: &str) -> Result<Option<TaskItem>> {
        self.with_conn(|conn| get_by_id(conn, id))
    }

    pub fn task_children(&self, parent_id: Option<&str>) -> Result<Vec<TaskItem>> {
        self.with_conn(|conn| {
            let mut stmt = if parent_id.is_some() {
                conn.prepare(&format!(
                    "SELECT {SELECT_COLS} FROM tasks WHERE parent_id = ?1 ORDER BY created_at"
                ))
                .map_err(map_err)?
            } else {
                conn.prepare(&format!(
                    "SELECT {SELECT_COLS} FROM tasks WHERE parent_id IS NULL ORDER BY created_at"
                ))
                .map_err(map_err)?
            };
            let rows = if let Some(p) = parent_id {
                stmt.query_map(params![p], |row| Ok(row_to_task(row)))
            } else {
                stmt.query_map([], |row| Ok(row_to_task(row)))
            }
            .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }

    pub fn task_all(&self) -> Result<Vec<TaskItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLS} FROM tasks ORDER BY created_at"))
                .map_err(map_err)?;
            let rows = stmt
                .query_map([], |row| Ok(row_to_task(row)))
                .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }
}

fn row_exists(conn: &rusqlite::Connection, id: &str) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM tasks WHERE id = ?1", params![id], |_| {
            Ok(true)
        })
        .unwrap_or(false))
}

fn get_by_id(conn: &rusqlite::Connection, id: &str) -> Result<Option<TaskItem>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {SELECT_COLS} FROM tasks WHERE id = ?1"))
        .map_err(map_err)?;
    let mut rows = stmt.query(params![id]).map_err(map_err)?;
    match rows.next().map_err(map_err)? {
        Some(row) => Ok(Some(row_to_task(row)?)),
        None => Ok(None),
    }
}

fn row_to_task(row: &rusqlite::Row) -> Result<TaskItem> {
    let status: String = row.get(2).map_err(map_err)?;
    let tags_json: String = row.get(4).map_err(map_err)?;
    let tdd_phase: Option<String> = row.get(6).map_err(map_err)?;
    let created_at: String = row.get(9).map_err(map_err)?;
    let completed_at: Option<String> = row.get(10).map_err(map_err)?;
    Ok(TaskItem {
        id: row.get(0).map_err(map_err)?,
        content: row.get(1).map_err(map_err)?,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("bad task status {status}")))?,
        parent_id: row.get(3).map_err(map_err)?,
        tags: serde_json::from_str(&tags_json)?,
        item_type: row.get(5).map_err(map_err)?,
        tdd_phase: tdd_phase.and_then(|p| TddPhase::parse(&p)),
        test_path: row.get(7).map_err(map_err)?,
        agent_id: row.get(8).map_err(map_err)?,
        created_at: parse_ts(&created_at)?,
        completed_at: completed_at.map(|s| parse_ts(&s)).transpose()?,
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
    use sa_domain::models::TaskStatus;
    use sa_domain::Error;

    #[test]
    fn create_then_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let task = store.task_create("write the thing", None, &[], None).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        let fetched = store.task_get(&task.id).unwrap().unwrap();
        assert_eq!(fetched.content, "write the thing");
    }

    #[test]
    fn create_with_missing_parent_fails() {
        let store = Store::open_in_memory().unwrap();
        let err = store.task_create("child", Some("nonexistent"), &[], None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn reparenting_to_self_is_a_cycle() {
        let store = Store::open_in_memory().unwrap();
        let a = store.task_create("A", None, &[], None).unwrap();
        let err = store.task_set_parent(&a.id, Some(&a.id)).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn reparenting_to_a_descendant_is_rejected() {
        // S2: A -> B, then trying A.parent = B must fail and leave the tree unchanged.
        let store = Store::open_in_memory().unwrap();
        let a = store.task_create("A", None, &[], None).unwrap();
        let b = store.task_create("B", Some(&a.id), &[], None).unwrap();

        let err = store.task_set_parent(&a.id, Some(&b.id)).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));

        let a_after = store.task_get(&a.id).unwrap().unwrap();
        assert_eq!(a_after.parent_id, None, "tree must be unchanged after a rejected move");
        let b_after = store.task_get(&b.id).unwrap().unwrap();
        assert_eq!(b_after.parent_id.as_deref(), Some(a.id.as_str()));
    }

    #[test]
    fn deleting_a_task_cascades_to_its_subtree() {
        // S3: A -> B -> C, delete A leaves zero rows.
        let store = Store::open_in_memory().unwrap();
        let a = store.task_create("A", None, &[], None).unwrap();
        let b = store.task_create("B", Some(&a.id), &[], None).unwrap();
        let _c = store.task_create("C", Some(&b.id), &[], None).unwrap();

        store.task_delete(&a.id).unwrap();
        assert!(store.task_all().unwrap().is_empty());
    }

    #[test]
    fn set_status_to_completed_stamps_completed_at() {
        let store = Store::open_in_memory().unwrap();
        let a = store.task_create("A", None, &[], None).unwrap();
        let updated = store.task_set_status(&a.id, TaskStatus::Completed).unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert!(updated.completed_at.is_some());
    }

    #[test]
    fn set_status_on_missing_task_errors() {
        let store = Store::open_in_memory().unwrap();
        let err = store.task_set_status("nonexistent", TaskStatus::Completed).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn children_lists_only_direct_descendants() {
        let store = Store::open_in_memory().unwrap();
        let a = store.task_create("A", None, &[], None).unwrap();
        let b = store.task_create("B", Some(&a.id), &[], None).unwrap();
        let _c = store.task_create("C", Some(&b.id), &[], None).unwrap();

        let roots = store.task_children(None).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, a.id);

        let a_children = store.task_children(Some(&a.id)).unwrap();
        assert_eq!(a_children.len(), 1);
        assert_eq!(a_children[0].id, b.id);
    }
}
