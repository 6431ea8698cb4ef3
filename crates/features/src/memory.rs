//! §4.5.1 Memory Manager: `memory_save` / `memory_recall` / `memory_list`
//! / `memory_forget`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sa_domain::capability::FeatureManager;
use sa_domain::models::MemoryEntry;
use sa_domain::tool::{ToolCallResult, ToolDescriptor};
use sa_domain::{Error, Result};
use sa_index::Bm25Index;
use sa_store::Store;
use serde_json::{json, Value};

pub const PROVIDER_ID: &str = "internal:memory";

fn memory_document(e: &MemoryEntry) -> String {
    let mut parts = vec![e.key.clone(), e.value.clone()];
    parts.extend(e.tags.iter().cloned());
    parts.join(" ").to_lowercase()
}

pub struct MemoryManager {
    store: Arc<Store>,
    /// Secondary ranking structure over key+value+tags, rebuilt at
    /// construction and kept in sync on every save.
    index: RwLock<Bm25Index>,
}

impl MemoryManager {
    pub fn load(store: Arc<Store>) -> Result<Self> {
        let mut index = Bm25Index::new();
        for entry in store.memory_search(None, 100_000)? {
            index.add_or_replace(&entry.id, &memory_document(&entry));
        }
        Ok(Self {
            store,
            index: RwLock::new(index),
        })
    }

    pub fn save(&self, key: &str, value: &str, category: Option<&str>, tags: &[String]) -> Result<MemoryEntry> {
        let entry = self.store.memory_set(key, value, category, tags)?;
        self.index.write().add_or_replace(&entry.id, &memory_document(&entry));
        Ok(entry)
    }

    /// Empty query returns nothing (Testable Property 1). Otherwise BM25
    /// over the secondary index, bumping access count on every returned
    /// row — candidates excluded by the category filter are left
    /// untouched.
    pub fn recall(&self, query: &str, limit: u32, category: Option<&str>) -> Result<Vec<(MemoryEntry, f64)>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.index.read().search(query, limit as usize * 4, 0.0);
        let mut out = Vec::new();
        for (id, score) in hits {
            let Some(entry) = self.store.memory_peek(&id)? else {
                continue;
            };
            if let Some(cat) = category {
                if entry.category.as_deref() != Some(cat) {
                    continue;
                }
            }
            self.store.memory_bump_access(&id)?;
            let entry = self.store.memory_peek(&id)?.unwrap_or(entry);
            out.push((entry, score));
            if out.len() >= limit as usize {
                break;
            }
        }
        Ok(out)
    }

    pub fn list(&self, category: Option<&str>, limit: u32) -> Result<Vec<MemoryEntry>> {
        self.store.memory_search(category, limit)
    }

    /// Idempotent: a missing id reports `success: false`, not an error.
    pub fn forget(&self, id: &str) -> Result<bool> {
        let deleted = self.store.memory_delete(id)?;
        if deleted {
            self.index.write().remove(id);
        }
        Ok(deleted)
    }
}

#[async_trait]
impl FeatureManager for MemoryManager {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn tool_definitions(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "memory_save".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Save a key/value memory entry with optional category and tags.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "key": {"type": "string"},
                        "value": {"type": "string"},
                        "category": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["key", "value"]
                }),
                category: Some("memory".into()),
                keywords: vec!["save".into(), "remember".into(), "store".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "memory_recall".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Recall memory entries ranked by relevance to a query.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "limit": {"type": "integer"},
                        "category": {"type": "string"}
                    },
                    "required": ["query"]
                }),
                category: Some("memory".into()),
                keywords: vec!["recall".into(), "search".into(), "remember".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "memory_list".into(),
                provider_id: PROVIDER_ID.into(),
                description: "List memory entries, newest first, with optional category filter.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filter": {"type": "string"},
                        "limit": {"type": "integer"}
                    }
                }),
                category: Some("memory".into()),
                keywords: vec!["list".into(), "memory".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "memory_forget".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Delete a memory entry by id.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }),
                category: Some("memory".into()),
                keywords: vec!["forget".into(), "delete".into()],
                usage_count: 0,
            },
        ]
    }

    async fn handle(&self, tool_name: &str, args: Value) -> Result<ToolCallResult> {
        match tool_name {
            "memory_save" => {
                let key = args.get("key").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("memory_save requires `key`".into())
                })?;
                let value = args.get("value").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("memory_save requires `value`".into())
                })?;
                let category = args.get("category").and_then(Value::as_str);
                let tags: Vec<String> = args
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                let entry = self.save(key, value, category, &tags)?;
                Ok(ToolCallResult::ok_json(&json!({ "id": entry.id, "memory": entry })))
            }
            "memory_recall" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as u32;
                let category = args.get("category").and_then(Value::as_str);
                let results = self.recall(query, limit, category)?;
                let results: Vec<Value> = results
                    .into_iter()
                    .map(|(entry, score)| json!({ "memory": entry, "score": score }))
                    .collect();
                Ok(ToolCallResult::ok_json(&json!({ "results": results })))
            }
            "memory_list" => {
                let category = args.get("filter").and_then(Value::as_str);
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as u32;
                let memories = self.list(category, limit)?;
                Ok(ToolCallResult::ok_json(&json!({ "memories": memories })))
            }
            "memory_forget" => {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("memory_forget requires `id`".into())
                })?;
                let success = self.forget(id)?;
                Ok(ToolCallResult::ok_json(&json!({ "success": success })))
            }
            other => Err(Error::ToolNotFound(other.to_string())),
        }
    }
}
