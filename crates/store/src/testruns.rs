use chrono::{DateTime, Utc};
use rusqlite::params;
use sa_domain::models::{TddPhase, TestRun};
use sa_domain::{Error, Result};

use crate::{map_err, Store};

const SELECT_COLS: &str = "id, task_id, test_path, phase, passed, created_at, coverage";

impl Store {
    pub fn testrun_record(
        &self,
        task_id: &str,
        test_path: &str,
        phase: TddPhase,
        passed: bool,
        coverage: Option<f64>,
    ) -> Result<TestRun> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        self.with_tx(|tx| {
            let task_exists: bool = tx
                .query_row(
                    "SELECT 1 FROM tasks WHERE id = ?1",
                    params![task_id],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !task_exists {
                return Err(Error::NotFound(format!("task {task_id} not found")));
            }
            tx.execute(
                "INSERT INTO testruns (id, task_id, test_path, phase, passed, created_at, coverage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    task_id,
                    test_path,
                    phase.as_str(),
                    passed as i64,
                    now.to_rfc3339(),
                    coverage,
                ],
            )
            .map_err(map_err)?;
            get_by_id(tx, &id)?.ok_or_else(|| Error::Internal("testrun vanished after insert".into()))
        })
    }

    pub fn testrun_history(&self, test_path: &str, limit: u32) -> Result<Vec<TestRun>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM testruns WHERE test_path = ?1 ORDER BY created_at DESC LIMIT ?2"
                ))
                .map_err(map_err)?;
            let rows = stmt
                .query_map(params![test_path, limit], |row| Ok(row_to_run(row)))
                .map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)??);
            }
            Ok(out)
        })
    }

    pub fn testrun_latest_for_task(&self, task_id: &str) -> Result<Option<TestRun>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM testruns WHERE task_id = ?1 ORDER BY created_at DESC LIMIT 1"
                ))
                .map_err(map_err)?;
            let mut rows = stmt.query(params![task_id]).map_err(map_err)?;
            match rows.next().map_err(map_err)? {
                Some(row) => Ok(Some(row_to_run(row)?)),
                None => Ok(None),
            }
        })
    }
}

fn get_by_id(conn: &rusqlite::Connection, id: &str) -> Result<Option<TestRun>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {SELECT_COLS} FROM testruns WHERE id = ?1"))
        .map_err(map_err)?;
    let mut rows = stmt.query(params![id]).map_err(map_err)?;
    match rows.next().map_err(map_err)? {
        Some(row) => Ok(Some(row_to_run(row)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;
    use sa_domain::models::TddPhase;
    use sa_domain::Error;

    #[test]
    fn record_for_missing_task_fails() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .testrun_record("nonexistent", "tests/foo.rs", TddPhase::Red, false, None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn history_is_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let task = store.task_create("impl foo", None, &[], None).unwrap();
        store
            .testrun_record(&task.id, "tests/foo.rs", TddPhase::Red, false, None)
            .unwrap();
        store
            .testrun_record(&task.id, "tests/foo.rs", TddPhase::Green, true, Some(0.9))
            .unwrap();
        let history = store.testrun_history("tests/foo.rs", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].phase, TddPhase::Green);
        assert_eq!(history[1].phase, TddPhase::Red);
    }

    #[test]
    fn latest_for_task_matches_most_recent_run() {
        let store = Store::open_in_memory().unwrap();
        let task = store.task_create("impl foo", None, &[], None).unwrap();
        store
            .testrun_record(&task.id, "tests/foo.rs", TddPhase::Red, false, None)
            .unwrap();
        let second = store
            .testrun_record(&task.id, "tests/foo.rs", TddPhase::Green, true, None)
            .unwrap();
        let latest = store.testrun_latest_for_task(&task.id).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }
}

fn row_to_run(row: &rusqlite::Row) -> Result<TestRun> {
    let phase: String = row.get(3).map_err(map_err)?;
    let passed: i64 = row.get(4).map_err(map_err)?;
    let created_at: String = row.get(5).map_err(map_err)?;
    Ok(TestRun {
        id: row.get(0).map_err(map_err)?,
        task_id: row.get(1).map_err(map_err)?,
        test_path: row.get(2).map_err(map_err)?,
        phase: TddPhase::parse(&phase)
            .ok_or_else(|| Error::Internal(format!("bad tdd phase {phase}")))?,
        passed: passed != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Internal(e.to_string()))?
            .with_timezone(&Utc),
        coverage: row.get(6).map_err(map_err)?,
    })
}
