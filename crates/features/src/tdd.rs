//! §4.5.3 TDD Manager: `tdd_red` / `tdd_green` / `tdd_refactor` /
//! `tdd_verify`, each recording a test-run row via a pluggable
//! [`TestRunner`].

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::capability::{FeatureManager, TestRunner};
use sa_domain::models::TddPhase;
use sa_domain::tool::{ToolCallResult, ToolDescriptor};
use sa_domain::{Error, Result};
use sa_store::Store;
use serde_json::{json, Value};

pub const PROVIDER_ID: &str = "internal:tdd";

pub struct TddManager {
    store: Arc<Store>,
    runner: Arc<dyn TestRunner>,
}

impl TddManager {
    pub fn new(store: Arc<Store>, runner: Arc<dyn TestRunner>) -> Self {
        Self { store, runner }
    }

    async fn record(&self, task_id: &str, test_path: &str, phase: TddPhase) -> Result<Value> {
        let outcome = self.runner.run(test_path).await?;
        self.store
            .task_set_tdd(task_id, Some(phase), Some(test_path), None)?;
        let run = self
            .store
            .testrun_record(task_id, test_path, phase, outcome.passed, None)?;
        let mut warning = None;
        if phase == TddPhase::Refactor {
            if let Some(last) = self.store.testrun_latest_for_task(task_id)? {
                if last.phase != TddPhase::Green && last.id != run.id {
                    warning = Some("last recorded phase before refactor was not green".to_string());
                }
            }
        }
        Ok(json!({ "run": run, "output": outcome.output, "warning": warning }))
    }

    /// `tdd_verify` doesn't record a new run; it just reports the most
    /// recent one plus an advisory warning if it wasn't `green`.
    fn verify(&self, task_id: &str) -> Result<Value> {
        let last = self.store.testrun_latest_for_task(task_id)?;
        let warning = match &last {
            Some(run) if run.phase != TddPhase::Green => {
                Some(format!("last recorded phase was {:?}, not green", run.phase))
            }
            None => Some("no test runs recorded for this task yet".to_string()),
            _ => None,
        };
        Ok(json!({ "lastRun": last, "warning": warning }))
    }
}

fn require_task_and_path(args: &Value) -> Result<(&str, &str)> {
    let task_id = args
        .get("taskId")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidInput("requires `taskId`".into()))?;
    let test_path = args
        .get("testPath")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidInput("requires `testPath`".into()))?;
    Ok((task_id, test_path))
}

#[async_trait]
impl FeatureManager for TddManager {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn tool_definitions(&self) -> Vec<ToolDescriptor> {
        let schema = json!({
            "type": "object",
            "properties": {
                "taskId": {"type": "string"},
                "testPath": {"type": "string"}
            },
            "required": ["taskId", "testPath"]
        });
        vec![
            ToolDescriptor {
                name: "tdd_red".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Record a failing-test (red) TDD phase for a task.".into(),
                input_schema: schema.clone(),
                category: Some("tdd".into()),
                keywords: vec!["tdd".into(), "test".into(), "red".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "tdd_green".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Record a passing-test (green) TDD phase for a task.".into(),
                input_schema: schema.clone(),
                category: Some("tdd".into()),
                keywords: vec!["tdd".into(), "test".into(), "green".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "tdd_refactor".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Record a refactor TDD phase for a task.".into(),
                input_schema: schema.clone(),
                category: Some("tdd".into()),
                keywords: vec!["tdd".into(), "refactor".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "tdd_verify".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Report the last recorded test run for a task, warning if it wasn't green.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"taskId": {"type": "string"}},
                    "required": ["taskId"]
                }),
                category: Some("tdd".into()),
                keywords: vec!["tdd".into(), "verify".into()],
                usage_count: 0,
            },
        ]
    }

    async fn handle(&self, tool_name: &str, args: Value) -> Result<ToolCallResult> {
        match tool_name {
            "tdd_red" => {
                let (task_id, test_path) = require_task_and_path(&args)?;
                let out = self.record(task_id, test_path, TddPhase::Red).await?;
                Ok(ToolCallResult::ok_json(&out))
            }
            "tdd_green" => {
                let (task_id, test_path) = require_task_and_path(&args)?;
                let out = self.record(task_id, test_path, TddPhase::Green).await?;
                Ok(ToolCallResult::ok_json(&out))
            }
            "tdd_refactor" => {
                let (task_id, test_path) = require_task_and_path(&args)?;
                let out = self.record(task_id, test_path, TddPhase::Refactor).await?;
                Ok(ToolCallResult::ok_json(&out))
            }
            "tdd_verify" => {
                let task_id = args
                    .get("taskId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::InvalidInput("tdd_verify requires `taskId`".into()))?;
                let out = self.verify(task_id)?;
                Ok(ToolCallResult::ok_json(&out))
            }
            other => Err(Error::ToolNotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::capability::TestOutcome;

    struct ScriptedRunner {
        passed: bool,
    }

    #[async_trait]
    impl TestRunner for ScriptedRunner {
        async fn run(&self, _test_path: &str) -> Result<TestOutcome> {
            Ok(TestOutcome {
                passed: self.passed,
                output: "ran".to_string(),
                duration_ms: 1,
            })
        }
    }

    fn manager(passed: bool) -> (Arc<Store>, TddManager) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let runner: Arc<dyn TestRunner> = Arc::new(ScriptedRunner { passed });
        (store.clone(), TddManager::new(store, runner))
    }

    #[tokio::test]
    async fn red_then_green_records_both_phases() {
        let (store, m) = manager(true);
        let task = store.task_create("implement feature", None, &[], None).unwrap();
        m.record(&task.id, "tests/feature.rs", TddPhase::Red).await.unwrap();
        m.record(&task.id, "tests/feature.rs", TddPhase::Green).await.unwrap();
        let latest = store.testrun_latest_for_task(&task.id).unwrap().unwrap();
        assert_eq!(latest.phase, TddPhase::Green);
        assert!(latest.passed);
    }

    #[tokio::test]
    async fn refactor_after_non_green_phase_carries_a_warning() {
        let (store, m) = manager(false);
        let task = store.task_create("implement feature", None, &[], None).unwrap();
        m.record(&task.id, "tests/feature.rs", TddPhase::Red).await.unwrap();
        let out = m.record(&task.id, "tests/feature.rs", TddPhase::Refactor).await.unwrap();
        assert!(out["warning"].is_string());
    }

    #[test]
    fn verify_with_no_runs_warns_explicitly() {
        let (store, m) = manager(true);
        let task = store.task_create("implement feature", None, &[], None).unwrap();
        let out = m.verify(&task.id).unwrap();
        assert!(out["lastRun"].is_null());
        assert!(out["warning"].as_str().unwrap().contains("no test runs"));
    }

    #[test]
    fn verify_after_green_has_no_warning() {
        let (store, m) = manager(true);
        let task = store.task_create("implement feature", None, &[], None).unwrap();
        store.testrun_record(&task.id, "tests/feature.rs", TddPhase::Green, true, None).unwrap();
        let out = m.verify(&task.id).unwrap();
        assert!(out["warning"].is_null());
    }
}
