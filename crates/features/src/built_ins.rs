//! The built-in hook subscriptions wired once all managers exist
//! (§4.9's closing list).

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::event::HookContext;
use sa_hooks::HookHandler;
use sa_store::Store;
use tracing::{info, warn};

use crate::memory::MemoryManager;
use crate::planning::PlanningManager;

/// `PostToolUse` (medium priority): for a handful of mutating internal
/// tools, save a compact execution record into memory so later recalls
/// can see "what just happened".
pub struct LogExecutionToMemory {
    pub memory: Arc<MemoryManager>,
}

const LOGGED_TOOLS: &[&str] = &["memory_save", "planning_create", "tdd_red", "tdd_green", "tdd_refactor"];

#[async_trait]
impl HookHandler for LogExecutionToMemory {
    async fn handle(&self, ctx: &mut HookContext) {
        let Some(name) = &ctx.tool_name else { return };
        if !LOGGED_TOOLS.contains(&name.as_str()) && !name.starts_with("tdd_") {
            return;
        }
        let value = ctx
            .tool_result
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(no result captured)".to_string());
        if let Err(e) = self.memory.save(
            &format!("tool_result:{name}"),
            &value,
            Some("tool_execution"),
            &[],
        ) {
            warn!(tool = %name, error = %e, "failed to log tool execution to memory");
        }
    }
}

/// `AgentCompleted`: mark every task id in `data.result.todoIds` as
/// completed.
pub struct MarkTasksOnAgentCompletion {
    pub planning: Arc<PlanningManager>,
}

#[async_trait]
impl HookHandler for MarkTasksOnAgentCompletion {
    async fn handle(&self, ctx: &mut HookContext) {
        let Some(data) = &ctx.data else { return };
        let Some(todo_ids) = data.pointer("/result/todoIds").and_then(|v| v.as_array()) else {
            return;
        };
        for id in todo_ids.iter().filter_map(|v| v.as_str()) {
            if let Err(e) = self
                .planning
                .update(id, Some(sa_domain::models::TaskStatus::Completed), None, None)
            {
                warn!(task = id, error = %e, "failed to mark task completed on agent completion");
            }
        }
    }
}

/// `ContextFull`: snapshot current memory+task state for the session.
pub struct SnapshotOnContextFull {
    pub store: Arc<Store>,
}

#[async_trait]
impl HookHandler for SnapshotOnContextFull {
    async fn handle(&self, ctx: &mut HookContext) {
        let Some(session_id) = &ctx.session_id else { return };
        let memories = self.store.memory_search(None, 500).unwrap_or_default();
        let tasks = self.store.task_all().unwrap_or_default();
        let snapshot = serde_json::json!({ "memories": memories, "tasks": tasks });
        if let Err(e) = self.store.snapshot_capture(session_id, &snapshot, None) {
            warn!(session = %session_id, error = %e, "failed to capture context snapshot");
        }
    }
}

/// `SessionStart`: log (but do not restore) the newest snapshot for the
/// session, if one exists.
pub struct AnnounceSnapshotAvailability {
    pub store: Arc<Store>,
}

#[async_trait]
impl HookHandler for AnnounceSnapshotAvailability {
    async fn handle(&self, ctx: &mut HookContext) {
        let Some(session_id) = &ctx.session_id else { return };
        match self.store.snapshot_latest(session_id) {
            Ok(Some(snapshot)) => {
                info!(session = %session_id, captured_at = %snapshot.captured_at, "a prior context snapshot is available for this session");
            }
            Ok(None) => {}
            Err(e) => warn!(session = %session_id, error = %e, "failed to look up latest snapshot"),
        }
    }
}
