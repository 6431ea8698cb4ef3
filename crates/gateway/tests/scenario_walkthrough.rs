//! End-to-end walkthroughs across the composed gateway — store, registry,
//! feature coordinator, provider manager and the RPC surface together.
//! Each test below exercises one literal scenario with no step skipped,
//! as opposed to the narrower per-crate unit tests living alongside
//! each module's own source.

use std::sync::Arc;
use std::time::Duration;

use sa_domain::event::{HookContext, HookKind};
use sa_domain::tool::{ContentBlock, ToolCallResult};
use sa_domain::Error;
use sa_features::FeatureCoordinator;
use sa_gateway::providers::ProviderManager;
use sa_gateway::rpc::GatewayRpc;
use sa_hooks::HookHandler;
use sa_registry::ToolRegistry;
use sa_store::Store;
use serde_json::{json, Value};

fn gateway() -> (Arc<GatewayRpc>, Arc<FeatureCoordinator>, Arc<ToolRegistry>, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let coordinator = Arc::new(FeatureCoordinator::bootstrap(store.clone()).unwrap());
    let registry = Arc::new(ToolRegistry::load(store.clone(), 15, 0.0).unwrap());
    for tool in coordinator.tool_definitions() {
        registry.register_tool(tool).unwrap();
    }
    let providers = Arc::new(ProviderManager::new(store.clone(), registry.clone()));
    let rpc = Arc::new(GatewayRpc::new(store.clone(), registry.clone(), coordinator.clone(), providers, Duration::from_secs(5)));
    (rpc, coordinator, registry, store)
}

/// `ToolCallResult::ok_json` serializes its payload into the single text
/// content block; unwrap it back into a `Value` for assertions.
fn payload(result: &ToolCallResult) -> Value {
    match &result.content[0] {
        ContentBlock::Text { text } => serde_json::from_str(text).unwrap(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S1 — Memory round-trip
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s1_memory_round_trip() {
    let (rpc, coordinator, _registry, store) = gateway();

    rpc.call_tool(None, "memory_save", json!({"key": "pref", "value": "dark"})).await.unwrap();

    let listed = coordinator.memory.list(None, 10).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "pref");

    let recalled = rpc.call_tool(None, "memory_recall", json!({"query": "dark"})).await.unwrap();
    assert!(recalled.succeeded());
    let body = payload(&recalled);
    let first = body["results"].as_array().and_then(|a| a.first()).expect("one recalled entry");
    assert!(first["score"].as_f64().unwrap() > 0.0);
    let recalled_id = first["memory"]["id"].as_str().unwrap().to_string();
    assert_eq!(store.memory_peek(&recalled_id).unwrap().unwrap().access_count, 1);

    let forgotten = rpc.call_tool(None, "memory_forget", json!({"id": recalled_id})).await.unwrap();
    assert!(forgotten.succeeded());
    assert!(coordinator.memory.list(None, 10).unwrap().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S2 — Task cycle rejection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s2_task_cycle_rejection() {
    let (rpc, coordinator, _registry, _store) = gateway();

    let created_a = rpc.call_tool(None, "planning_create", json!({"content": "A"})).await.unwrap();
    let a_id = payload(&created_a)["task"]["id"].as_str().unwrap().to_string();

    let created_b = rpc
        .call_tool(None, "planning_create", json!({"content": "B", "parentId": a_id}))
        .await
        .unwrap();
    let b_id = payload(&created_b)["task"]["id"].as_str().unwrap().to_string();

    let err = rpc
        .call_tool(None, "planning_update", json!({"id": a_id, "parentId": b_id}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CycleDetected { .. }));

    let (ascii, summary) = coordinator.planning.tree(Some(&a_id)).unwrap();
    assert_eq!(summary["total"], json!(2));
    assert!(ascii.contains("A "));
    assert!(ascii.contains("B "));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S3 — Cascade delete
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s3_cascade_delete() {
    let (rpc, coordinator, _registry, store) = gateway();

    let a = coordinator.planning.create("A", None, &[], None, None, None, None).unwrap();
    let b = coordinator.planning.create("B", Some(&a.id), &[], None, None, None, None).unwrap();
    let _c = coordinator.planning.create("C", Some(&b.id), &[], None, None, None, None).unwrap();

    let result = rpc.call_tool(None, "planning_delete", json!({"id": a.id})).await.unwrap();
    assert!(result.succeeded());

    assert!(store.task_all().unwrap().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S4 — Tool selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn descriptor(name: &str, category: &str, description: &str, keywords: &[&str]) -> sa_domain::tool::ToolDescriptor {
    sa_domain::tool::ToolDescriptor {
        name: name.to_string(),
        provider_id: "ext:fs".to_string(),
        description: description.to_string(),
        input_schema: json!({}),
        category: Some(category.to_string()),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        usage_count: 0,
    }
}

#[tokio::test]
async fn s4_tool_selection_ranks_by_relevance_and_floors_out_the_unrelated() {
    let (rpc, _coordinator, registry, _store) = gateway();
    registry.register_tool(descriptor("read_file", "fs", "read a file from disk", &["read", "file"])).unwrap();
    registry
        .register_tool(descriptor("write_file", "fs", "write a file to disk", &["write", "file"]))
        .unwrap();
    registry
        .register_tool(descriptor("send_slack", "comm", "post a message to a slack channel", &["slack", "message"]))
        .unwrap();

    let result = rpc.list_tools(Some("read a file"));
    let names: Vec<String> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();

    let read_pos = names.iter().position(|n| n == "read_file").expect("read_file present");
    let write_pos = names.iter().position(|n| n == "write_file").expect("write_file present");
    assert!(read_pos < write_pos, "read_file should rank above write_file for this query: {names:?}");
    assert!(!names.contains(&"send_slack".to_string()), "send_slack should fall below the score floor: {names:?}");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S5 — Usage boost
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s5_usage_boost_overtakes_an_equally_relevant_tool() {
    let (rpc, _coordinator, registry, _store) = gateway();
    registry.register_tool(descriptor("read_file", "fs", "read a file from disk", &["read", "file"])).unwrap();
    registry
        .register_tool(descriptor("write_file", "fs", "write a file to disk", &["write", "file"]))
        .unwrap();

    for _ in 0..10 {
        rpc.call_tool(None, "write_file", json!({"path": "/tmp/x"})).await.ok();
    }

    let result = rpc.list_tools(Some("file"));
    let names: Vec<String> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    let read_pos = names.iter().position(|n| n == "read_file").expect("read_file present");
    let write_pos = names.iter().position(|n| n == "write_file").expect("write_file present");
    assert!(write_pos < read_pos, "write_file's usage boost should rank it above read_file: {names:?}");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S6 — Hook fan-out
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RecordPriority {
    priority: i32,
    seen: Arc<parking_lot::Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl HookHandler for RecordPriority {
    async fn handle(&self, _ctx: &mut HookContext) {
        self.seen.lock().push(self.priority.to_string());
    }
}

#[tokio::test]
async fn s6_hook_fan_out_runs_in_priority_order_and_logs_into_memory() {
    let (rpc, coordinator, _registry, _store) = gateway();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    coordinator.hooks().register(
        HookKind::PostToolUse,
        Arc::new(RecordPriority { priority: 10, seen: seen.clone() }),
        10,
        Some("scenario probe, priority 10".into()),
    );
    coordinator.hooks().register(
        HookKind::PostToolUse,
        Arc::new(RecordPriority { priority: 5, seen: seen.clone() }),
        5,
        Some("scenario probe, priority 5".into()),
    );

    let result = rpc.call_tool(None, "memory_save", json!({"key": "x", "value": "y"})).await.unwrap();
    assert!(result.succeeded());

    assert_eq!(*seen.lock(), vec!["10".to_string(), "5".to_string()]);

    let logged = coordinator.memory.list(Some("tool_execution"), 10).unwrap();
    assert!(logged.iter().any(|e| e.key == "tool_result:memory_save"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S7 — Agent completion marks its listed tasks done, end to end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s7_agent_complete_call_marks_its_listed_tasks_completed_through_the_real_rpc_path() {
    let (rpc, coordinator, _registry, _store) = gateway();

    let task = coordinator.planning.create("write the release notes", None, &[], None, None, None, None).unwrap();

    let spawned = rpc
        .call_tool(Some("session-1"), "agent_spawn", json!({"agentType": "writer", "task": "write the release notes"}))
        .await
        .unwrap();
    let agent_id = payload(&spawned)["agent"]["id"].as_str().unwrap().to_string();

    let completed = rpc
        .call_tool(
            Some("session-1"),
            "agent_complete",
            json!({"id": agent_id, "status": "completed", "result": {"todoIds": [task.id]}}),
        )
        .await
        .unwrap();
    assert!(completed.succeeded());

    let (_, summary) = coordinator.planning.tree(None).unwrap();
    assert_eq!(summary["completed"], json!(1));
}
