//! §4.5.2 Planning Manager: `planning_create` / `planning_update` /
//! `planning_tree` / `planning_delete`, with cycle prevention and
//! cascade delete owned by the store layer.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::capability::FeatureManager;
use sa_domain::models::{TaskItem, TaskStatus, TddPhase};
use sa_domain::tool::{ToolCallResult, ToolDescriptor};
use sa_domain::{Error, Result};
use sa_store::Store;
use serde_json::{json, Value};

pub const PROVIDER_ID: &str = "internal:planning";

pub struct PlanningManager {
    store: Arc<Store>,
}

impl PlanningManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// `status`/`tdd_status`/`test_path` are applied as follow-up updates
    /// after the initial insert, which always starts a task out pending —
    /// the same two-step shape `update()` already uses.
    pub fn create(
        &self,
        content: &str,
        parent_id: Option<&str>,
        tags: &[String],
        item_type: Option<&str>,
        status: Option<TaskStatus>,
        tdd_status: Option<TddPhase>,
        test_path: Option<&str>,
    ) -> Result<TaskItem> {
        let task = self.store.task_create(content, parent_id, tags, item_type)?;
        if let Some(status) = status {
            self.store.task_set_status(&task.id, status)?;
        }
        if tdd_status.is_some() || test_path.is_some() {
            self.store.task_set_tdd(&task.id, tdd_status, test_path, None)?;
        }
        if status.is_some() || tdd_status.is_some() || test_path.is_some() {
            return self
                .store
                .task_get(&task.id)?
                .ok_or_else(|| Error::NotFound(format!("task {} not found", task.id)));
        }
        Ok(task)
    }

    pub fn update(
        &self,
        id: &str,
        status: Option<TaskStatus>,
        content: Option<&str>,
        parent_id: Option<Option<&str>>,
    ) -> Result<TaskItem> {
        if let Some(new_parent) = parent_id {
            self.store.task_set_parent(id, new_parent)?;
        }
        if let Some(status) = status {
            self.store.task_set_status(id, status)?;
        }
        if let Some(content) = content {
            self.store.task_set_content(id, content)?;
        }
        self.store
            .task_get(id)?
            .ok_or_else(|| Error::NotFound(format!("task {id} not found")))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.task_delete(id)
    }

    pub fn tree(&self, root_id: Option<&str>) -> Result<(String, Value)> {
        let all = self.store.task_all()?;
        let mut by_parent: std::collections::HashMap<Option<String>, Vec<&TaskItem>> = std::collections::HashMap::new();
        for t in &all {
            by_parent.entry(t.parent_id.clone()).or_default().push(t);
        }
        for children in by_parent.values_mut() {
            children.sort_by_key(|t| t.created_at);
        }

        let mut ascii = String::new();
        let roots: Vec<&TaskItem> = match root_id {
            Some(rid) => all.iter().filter(|t| t.id == rid).collect(),
            None => by_parent.get(&None).cloned().unwrap_or_default(),
        };
        for root in &roots {
            render(root, &by_parent, 0, &mut ascii);
        }

        let mut pending = 0;
        let mut in_progress = 0;
        let mut completed = 0;
        for t in &all {
            match t.status {
                TaskStatus::Pending => pending += 1,
                TaskStatus::InProgress => in_progress += 1,
                TaskStatus::Completed => completed += 1,
            }
        }
        let summary = json!({
            "pending": pending,
            "in_progress": in_progress,
            "completed": completed,
            "total": all.len(),
        });
        Ok((ascii, summary))
    }
}

fn render(
    node: &TaskItem,
    by_parent: &std::collections::HashMap<Option<String>, Vec<&TaskItem>>,
    depth: usize,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{} {} ({})", node.status.glyph(), node.content, node.id);
    if let Some(children) = by_parent.get(&Some(node.id.clone())) {
        for child in children {
            render(child, by_parent, depth + 1, out);
        }
    }
}

#[async_trait]
impl FeatureManager for PlanningManager {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn tool_definitions(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "planning_create".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Create a task item, optionally under a parent.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string"},
                        "status": {"type": "string"},
                        "parentId": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "type": {"type": "string"},
                        "tddStatus": {"type": "string"},
                        "testPath": {"type": "string"}
                    },
                    "required": ["content"]
                }),
                category: Some("planning".into()),
                keywords: vec!["task".into(), "create".into(), "plan".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "planning_update".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Update a task's status, content, or parent.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "status": {"type": "string"},
                        "content": {"type": "string"},
                        "parentId": {"type": "string"}
                    },
                    "required": ["id"]
                }),
                category: Some("planning".into()),
                keywords: vec!["task".into(), "update".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "planning_tree".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Render the task forest as an ASCII tree with a status summary.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"rootId": {"type": "string"}}
                }),
                category: Some("planning".into()),
                keywords: vec!["task".into(), "tree".into(), "list".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "planning_delete".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Delete a task and its entire subtree.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }),
                category: Some("planning".into()),
                keywords: vec!["task".into(), "delete".into()],
                usage_count: 0,
            },
        ]
    }

    async fn handle(&self, tool_name: &str, args: Value) -> Result<ToolCallResult> {
        match tool_name {
            "planning_create" => {
                let content = args.get("content").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("planning_create requires `content`".into())
                })?;
                let parent_id = args.get("parentId").and_then(Value::as_str);
                let tags: Vec<String> = args
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                let item_type = args.get("type").and_then(Value::as_str);
                let status = args
                    .get("status")
                    .and_then(Value::as_str)
                    .map(|s| TaskStatus::parse(s).ok_or_else(|| Error::InvalidInput(format!("bad status {s}"))))
                    .transpose()?;
                let tdd_status = args
                    .get("tddStatus")
                    .and_then(Value::as_str)
                    .map(|s| TddPhase::parse(s).ok_or_else(|| Error::InvalidInput(format!("bad tddStatus {s}"))))
                    .transpose()?;
                let test_path = args.get("testPath").and_then(Value::as_str);
                let task = self.create(content, parent_id, &tags, item_type, status, tdd_status, test_path)?;
                Ok(ToolCallResult::ok_json(&json!({ "task": task })))
            }
            "planning_update" => {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("planning_update requires `id`".into())
                })?;
                let status = args
                    .get("status")
                    .and_then(Value::as_str)
                    .map(|s| TaskStatus::parse(s).ok_or_else(|| Error::InvalidInput(format!("bad status {s}"))))
                    .transpose()?;
                let content = args.get("content").and_then(Value::as_str);
                let parent_id = args.get("parentId").map(|v| v.as_str());
                let task = self.update(id, status, content, parent_id)?;
                Ok(ToolCallResult::ok_json(&json!({ "task": task })))
            }
            "planning_tree" => {
                let root_id = args.get("rootId").and_then(Value::as_str);
                let (ascii_tree, summary) = self.tree(root_id)?;
                Ok(ToolCallResult::ok_json(&json!({ "asciiTree": ascii_tree, "summary": summary })))
            }
            "planning_delete" => {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("planning_delete requires `id`".into())
                })?;
                self.delete(id)?;
                Ok(ToolCallResult::ok_json(&json!({ "success": true })))
            }
            other => Err(Error::ToolNotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PlanningManager {
        PlanningManager::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn create_then_update_status_round_trips() {
        let m = manager();
        let task = m.create("write the launch blog post", None, &[], None, None, None, None).unwrap();
        let updated = m.update(&task.id, Some(TaskStatus::InProgress), None, None).unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);
    }

    #[test]
    fn reparenting_to_a_descendant_is_rejected_and_surfaces_the_store_error() {
        let m = manager();
        let a = m.create("A", None, &[], None, None, None, None).unwrap();
        let b = m.create("B", Some(&a.id), &[], None, None, None, None).unwrap();
        let err = m.update(&a.id, None, None, Some(Some(&b.id))).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn delete_cascades_to_subtree() {
        let m = manager();
        let a = m.create("A", None, &[], None, None, None, None).unwrap();
        m.create("B", Some(&a.id), &[], None, None, None, None).unwrap();
        m.delete(&a.id).unwrap();
        assert!(m.store.task_all().unwrap().is_empty());
    }

    #[test]
    fn tree_renders_only_the_requested_root_and_its_descendants() {
        let m = manager();
        let a = m.create("A", None, &[], None, None, None, None).unwrap();
        m.create("B", Some(&a.id), &[], None, None, None, None).unwrap();
        m.create("C", None, &[], None, None, None, None).unwrap();
        let (ascii, summary) = m.tree(Some(&a.id)).unwrap();
        assert!(ascii.contains("A "));
        assert!(ascii.contains("B "));
        assert!(!ascii.contains("C "));
        assert_eq!(summary["total"], json!(3));
    }

    #[tokio::test]
    async fn handle_planning_create_requires_content() {
        let m = manager();
        let err = m.handle("planning_create", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn create_applies_initial_status_and_tdd_fields() {
        let m = manager();
        let task = m
            .create("wire up the login form", None, &[], None, Some(TaskStatus::InProgress), Some(TddPhase::Red), Some("tests/login.rs"))
            .unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.tdd_phase, Some(TddPhase::Red));
        assert_eq!(task.test_path.as_deref(), Some("tests/login.rs"));
    }

    #[tokio::test]
    async fn handle_planning_create_threads_status_and_tdd_fields_through() {
        let m = manager();
        let result = m
            .handle(
                "planning_create",
                json!({"content": "add retry logic", "status": "in-progress", "tddStatus": "green", "testPath": "tests/retry.rs"}),
            )
            .await
            .unwrap();
        let body = result.content[0].clone();
        let sa_domain::tool::ContentBlock::Text { text } = body;
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["task"]["status"], json!("in-progress"));
        assert_eq!(parsed["task"]["tdd_phase"], json!("green"));
        assert_eq!(parsed["task"]["test_path"], json!("tests/retry.rs"));
    }
}
