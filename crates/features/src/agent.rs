//! **[SUPPLEMENT]** Agent Manager: a thin owner for the Agent record
//! entity named in §3 and referenced by `AgentCompleted` in §4.9's
//! built-in subscriptions, but not otherwise detailed as a manager in
//! §4.5. Depends on memory and planning per §4.6's construction order
//! (it reports completion via the hook bus, which the memory/planning
//! built-ins react to — it does not call them directly).

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::capability::FeatureManager;
use sa_domain::models::AgentStatus;
use sa_domain::tool::{ToolCallResult, ToolDescriptor};
use sa_domain::{Error, Result};
use sa_store::Store;
use serde_json::{json, Value};

pub const PROVIDER_ID: &str = "internal:agent";

pub struct AgentManager {
    store: Arc<Store>,
}

impl AgentManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn spawn(&self, agent_type: &str, task: &str, parent_task_id: Option<&str>) -> Result<Value> {
        let record = self.store.agent_spawn(agent_type, task, parent_task_id)?;
        Ok(json!({ "agent": record }))
    }

    pub fn complete(&self, id: &str, status: AgentStatus, result: Option<&Value>) -> Result<Value> {
        let record = self.store.agent_set_status(id, status, result)?;
        Ok(json!({ "agent": record }))
    }

    pub fn get(&self, id: &str) -> Result<Value> {
        let record = self
            .store
            .agent_get(id)?
            .ok_or_else(|| Error::NotFound(format!("agent {id} not found")))?;
        Ok(json!({ "agent": record }))
    }
}

#[async_trait]
impl FeatureManager for AgentManager {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn tool_definitions(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "agent_spawn".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Spawn a sub-agent record tracking a delegated task.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "agentType": {"type": "string"},
                        "task": {"type": "string"},
                        "parentTaskId": {"type": "string"}
                    },
                    "required": ["agentType", "task"]
                }),
                category: Some("agent".into()),
                keywords: vec!["agent".into(), "spawn".into(), "delegate".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "agent_complete".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Mark an agent record completed/failed/timed-out with an optional result.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "status": {"type": "string"},
                        "result": {}
                    },
                    "required": ["id", "status"]
                }),
                category: Some("agent".into()),
                keywords: vec!["agent".into(), "complete".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "agent_get".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Fetch an agent record by id.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }),
                category: Some("agent".into()),
                keywords: vec!["agent".into(), "get".into(), "status".into()],
                usage_count: 0,
            },
        ]
    }

    async fn handle(&self, tool_name: &str, args: Value) -> Result<ToolCallResult> {
        match tool_name {
            "agent_spawn" => {
                let agent_type = args.get("agentType").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("agent_spawn requires `agentType`".into())
                })?;
                let task = args.get("task").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("agent_spawn requires `task`".into())
                })?;
                let parent_task_id = args.get("parentTaskId").and_then(Value::as_str);
                Ok(ToolCallResult::ok_json(&self.spawn(agent_type, task, parent_task_id)?))
            }
            "agent_complete" => {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("agent_complete requires `id`".into())
                })?;
                let status = args
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(AgentStatus::parse)
                    .ok_or_else(|| Error::InvalidInput("agent_complete requires a valid `status`".into()))?;
                let result = args.get("result");
                Ok(ToolCallResult::ok_json(&self.complete(id, status, result)?))
            }
            "agent_get" => {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("agent_get requires `id`".into())
                })?;
                Ok(ToolCallResult::ok_json(&self.get(id)?))
            }
            other => Err(Error::ToolNotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AgentManager {
        AgentManager::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn spawn_then_get_round_trips() {
        let m = manager();
        let spawned = m.spawn("researcher", "summarize docs", None).unwrap();
        let id = spawned["agent"]["id"].as_str().unwrap();
        let fetched = m.get(id).unwrap();
        assert_eq!(fetched["agent"]["task"], json!("summarize docs"));
    }

    #[test]
    fn complete_sets_status_and_result() {
        let m = manager();
        let spawned = m.spawn("researcher", "summarize docs", None).unwrap();
        let id = spawned["agent"]["id"].as_str().unwrap().to_string();
        let result = json!({"todoIds": ["t1"]});
        let completed = m.complete(&id, AgentStatus::Completed, Some(&result)).unwrap();
        assert_eq!(completed["agent"]["status"], json!("completed"));
    }

    #[test]
    fn get_missing_agent_errors() {
        let m = manager();
        let err = m.get("nonexistent").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn handle_agent_complete_requires_a_valid_status() {
        let m = manager();
        let spawned = m.spawn("researcher", "task", None).unwrap();
        let id = spawned["agent"]["id"].as_str().unwrap().to_string();
        let err = m
            .handle("agent_complete", json!({"id": id, "status": "bogus"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
