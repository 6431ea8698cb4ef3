//! §4.6 Feature Coordinator: constructs every manager in dependency
//! order, exposes the union of their tool definitions, and routes
//! `internal:*` calls to the owning manager.

use std::collections::HashMap;
use std::sync::Arc;

use sa_domain::capability::{ComputeBackend, FeatureManager, NullComputeBackend, NullTestRunner, TestRunner};
use sa_domain::event::HookKind;
use sa_domain::tool::{ToolCallResult, ToolDescriptor, INTERNAL_PROVIDER_PREFIX};
use sa_domain::Result;
use sa_hooks::HookBus;
use sa_store::Store;
use serde_json::Value;

use crate::agent::AgentManager;
use crate::built_ins::{AnnounceSnapshotAvailability, LogExecutionToMemory, MarkTasksOnAgentCompletion, SnapshotOnContextFull};
use crate::guide::GuideManager;
use crate::memory::MemoryManager;
use crate::planning::PlanningManager;
use crate::science::ScienceManager;
use crate::tdd::TddManager;

const PRIORITY_MEDIUM: i32 = 50;

pub struct FeatureCoordinator {
    managers: HashMap<String, Arc<dyn FeatureManager>>,
    hooks: Arc<HookBus>,
    pub memory: Arc<MemoryManager>,
    pub planning: Arc<PlanningManager>,
    pub tdd: Arc<TddManager>,
    pub agent: Arc<AgentManager>,
    pub guide: Arc<GuideManager>,
    pub science: Arc<ScienceManager>,
}

impl FeatureCoordinator {
    /// Construction order per §4.6.i: memory → planning → tdd →
    /// agent{deps: memory, planning, tdd} → guide{deps: memory,
    /// planning} → science{deps: memory, planning}. The declared
    /// dependencies are honored by construction sequencing and by the
    /// hook bus built-ins below — managers never call each other's
    /// methods directly (§9: lateral coupling flows through hooks).
    pub fn bootstrap(store: Arc<Store>) -> Result<Self> {
        Self::bootstrap_with(store, Arc::new(NullTestRunner), Arc::new(NullComputeBackend))
    }

    pub fn bootstrap_with(
        store: Arc<Store>,
        test_runner: Arc<dyn TestRunner>,
        compute_backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self> {
        let memory = Arc::new(MemoryManager::load(store.clone())?);
        let planning = Arc::new(PlanningManager::new(store.clone()));
        let tdd = Arc::new(TddManager::new(store.clone(), test_runner));
        let agent = Arc::new(AgentManager::new(store.clone()));
        let guide = Arc::new(GuideManager::load(store.clone())?);
        let science = Arc::new(ScienceManager::new(compute_backend));

        let mut managers: HashMap<String, Arc<dyn FeatureManager>> = HashMap::new();
        managers.insert(memory.provider_id().to_string(), memory.clone() as Arc<dyn FeatureManager>);
        managers.insert(planning.provider_id().to_string(), planning.clone() as Arc<dyn FeatureManager>);
        managers.insert(tdd.provider_id().to_string(), tdd.clone() as Arc<dyn FeatureManager>);
        managers.insert(agent.provider_id().to_string(), agent.clone() as Arc<dyn FeatureManager>);
        managers.insert(guide.provider_id().to_string(), guide.clone() as Arc<dyn FeatureManager>);
        managers.insert(science.provider_id().to_string(), science.clone() as Arc<dyn FeatureManager>);

        let hooks = Arc::new(HookBus::new());
        hooks.register(
            HookKind::PostToolUse,
            Arc::new(LogExecutionToMemory { memory: memory.clone() }),
            PRIORITY_MEDIUM,
            Some("log tool_execution into memory".into()),
        );
        hooks.register(
            HookKind::AgentCompleted,
            Arc::new(MarkTasksOnAgentCompletion { planning: planning.clone() }),
            PRIORITY_MEDIUM,
            Some("mark tasks completed from agent result".into()),
        );
        hooks.register(
            HookKind::ContextFull,
            Arc::new(SnapshotOnContextFull { store: store.clone() }),
            PRIORITY_MEDIUM,
            Some("snapshot memory+task state".into()),
        );
        hooks.register(
            HookKind::SessionStart,
            Arc::new(AnnounceSnapshotAvailability { store: store.clone() }),
            PRIORITY_MEDIUM,
            Some("announce prior snapshot availability".into()),
        );

        Ok(Self {
            managers,
            hooks,
            memory,
            planning,
            tdd,
            agent,
            guide,
            science,
        })
    }

    pub fn hooks(&self) -> &Arc<HookBus> {
        &self.hooks
    }

    pub fn tool_definitions(&self) -> Vec<ToolDescriptor> {
        self.managers.values().flat_map(|m| m.tool_definitions()).collect()
    }

    /// `None` when `provider_id` is not `internal:*`; `Some(Err(ToolNotFound))`
    /// when it looks internal but names no known manager.
    pub async fn route(&self, provider_id: &str, tool_name: &str, args: Value) -> Option<Result<ToolCallResult>> {
        if !provider_id.starts_with(INTERNAL_PROVIDER_PREFIX) {
            return None;
        }
        match self.managers.get(provider_id) {
            Some(manager) => Some(manager.handle(tool_name, args).await),
            None => Some(Err(sa_domain::Error::ToolNotFound(tool_name.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_unions_every_managers_tool_definitions() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let coordinator = FeatureCoordinator::bootstrap(store).unwrap();
        let names: Vec<String> = coordinator.tool_definitions().into_iter().map(|t| t.name).collect();
        for expected in [
            "memory_save", "planning_create", "tdd_red", "agent_spawn", "guide_search", "science_run",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected} in {names:?}");
        }
    }

    #[tokio::test]
    async fn route_returns_none_for_non_internal_providers() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let coordinator = FeatureCoordinator::bootstrap(store).unwrap();
        assert!(coordinator.route("ext:slack", "send_slack", Value::Null).await.is_none());
    }

    #[tokio::test]
    async fn route_reports_tool_not_found_for_unknown_internal_provider() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let coordinator = FeatureCoordinator::bootstrap(store).unwrap();
        let result = coordinator.route("internal:bogus", "whatever", Value::Null).await;
        assert!(matches!(result, Some(Err(sa_domain::Error::ToolNotFound(_)))));
    }

    #[tokio::test]
    async fn post_tool_use_fan_out_logs_memory_save_into_memory() {
        // S6: calling a logged tool fires PostToolUse, and the built-in
        // handler writes a `tool_result:<name>` memory entry in category
        // `tool_execution` without the caller doing anything extra.
        let store = Arc::new(Store::open_in_memory().unwrap());
        let coordinator = FeatureCoordinator::bootstrap(store).unwrap();

        let result = coordinator
            .route("internal:memory", "memory_save", serde_json::json!({"key": "pref", "value": "dark mode"}))
            .await
            .unwrap()
            .unwrap();

        let ctx = sa_domain::event::HookContext::new(HookKind::PostToolUse)
            .with_tool("memory_save", serde_json::json!({"key": "pref", "value": "dark mode"}))
            .with_result(serde_json::to_value(&result.content).unwrap());
        coordinator.hooks().fire(ctx).await;

        let logged = coordinator.memory.list(Some("tool_execution"), 10).unwrap();
        assert!(logged.iter().any(|e| e.key == "tool_result:memory_save"));
    }

    #[tokio::test]
    async fn agent_completed_fan_out_marks_listed_tasks_completed() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let coordinator = FeatureCoordinator::bootstrap(store).unwrap();
        let task = coordinator.planning.create("ship it", None, &[], None, None, None, None).unwrap();

        let ctx = sa_domain::event::HookContext::new(HookKind::AgentCompleted)
            .with_data(serde_json::json!({"result": {"todoIds": [task.id]}}));
        coordinator.hooks().fire(ctx).await;

        let updated = coordinator.planning.update(&task.id, None, None, None).unwrap();
        assert_eq!(updated.status, sa_domain::models::TaskStatus::Completed);
    }
}
