//! The live tool catalog: a flat name→descriptor map plus the BM25
//! index derived from it, and the 3-layer selection policy (Essential /
//! Relevant / On-demand) that decides what `list_tools` surfaces.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use sa_domain::tool::ToolDescriptor;
use sa_domain::{Error, Result};
use sa_index::Bm25Index;
use sa_query::QueryProcessor;
use sa_store::Store;
use serde::Serialize;
use tracing::warn;

pub const DEFAULT_MAX_LAYER2: usize = 15;
pub const DEFAULT_SCORE_FLOOR: f64 = 0.0;

#[derive(Debug, Clone, Serialize)]
pub struct SelectionMeta {
    pub layer: u8,
    pub elapsed_ms: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub essential: Vec<ToolDescriptor>,
    pub relevant: Vec<ToolDescriptor>,
    pub available_total: usize,
    pub meta: SelectionMeta,
}

struct Inner {
    tools: std::collections::HashMap<String, ToolDescriptor>,
    index: Bm25Index,
    essential: HashSet<String>,
}

/// The live catalog plus 3-layer selection. Holds a handle to the
/// persistent store so usage recording and tool registration stay
/// consistent with what's on disk; everything in `Inner` is a rebuildable
/// projection of `Store::list_tools()`.
pub struct ToolRegistry {
    store: Arc<Store>,
    inner: RwLock<Inner>,
    max_layer2: usize,
    score_floor: f64,
}

impl ToolRegistry {
    /// Load the live map and index from whatever is currently in the
    /// store — the startup rebuild path.
    pub fn load(store: Arc<Store>, max_layer2: usize, score_floor: f64) -> Result<Self> {
        let descriptors = store.list_tools()?;
        let mut index = Bm25Index::new();
        let mut tools = std::collections::HashMap::new();
        for d in descriptors {
            index.add_or_replace(&d.name, &d.index_document());
            tools.insert(d.name.clone(), d);
        }
        Ok(Self {
            store,
            inner: RwLock::new(Inner {
                tools,
                index,
                essential: HashSet::new(),
            }),
            max_layer2,
            score_floor,
        })
    }

    pub fn pin(&self, name: &str) {
        self.inner.write().essential.insert(name.to_string());
    }

    pub fn unpin(&self, name: &str) {
        self.inner.write().essential.remove(name);
    }

    /// Register (or re-register) one tool: persists to the store, then
    /// updates the live map and index.
    pub fn register_tool(&self, descriptor: ToolDescriptor) -> Result<()> {
        self.store.upsert_tool(&descriptor)?;
        let mut inner = self.inner.write();
        inner.index.add_or_replace(&descriptor.name, &descriptor.index_document());
        inner.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Remove every tool belonging to `provider_id` from the store, the
    /// live map, and the index.
    pub fn remove_provider_tools(&self, provider_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let doomed: Vec<String> = inner
            .tools
            .values()
            .filter(|t| t.provider_id == provider_id)
            .map(|t| t.name.clone())
            .collect();
        self.store.remove_tools_for_provider(provider_id)?;
        for name in doomed {
            inner.tools.remove(&name);
            inner.index.remove(&name);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.inner.read().tools.get(name).cloned()
    }

    pub fn list_all(&self) -> Vec<ToolDescriptor> {
        self.inner.read().tools.values().cloned().collect()
    }

    pub fn available_total(&self) -> usize {
        self.inner.read().tools.len()
    }

    /// Bump the in-memory usage counter and best-effort persist it. A
    /// persistence failure is logged, not raised — usage counting must
    /// never fail a `call_tool`.
    pub fn record_usage(&self, name: &str, arguments: &serde_json::Value, success: bool, elapsed_ms: u64) {
        {
            let mut inner = self.inner.write();
            if let Some(tool) = inner.tools.get_mut(name) {
                tool.usage_count += 1;
            }
        }
        if let Err(e) = self.store.record_tool_usage(name, arguments, success, elapsed_ms) {
            warn!(tool = name, error = %e, "failed to persist usage count");
        }
    }

    /// Compute the 3-layer selection for an optional query hint. With no
    /// hint, `relevant` is empty and `meta.layer == 1`; with a hint,
    /// `relevant` is the boosted top-`maxLayer2` BM25 matches minus
    /// anything already in Layer 1, and `meta.layer == 2`.
    pub fn select(&self, query_hint: Option<&str>, query_processor: &QueryProcessor) -> Selection {
        let start = Instant::now();
        let inner = self.inner.read();
        let essential: Vec<ToolDescriptor> = inner
            .essential
            .iter()
            .filter_map(|name| inner.tools.get(name).cloned())
            .collect();

        let Some(hint) = query_hint.filter(|h| !h.trim().is_empty()) else {
            return Selection {
                essential,
                relevant: Vec::new(),
                available_total: inner.tools.len(),
                meta: SelectionMeta {
                    layer: 1,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    reason: "no query hint supplied".to_string(),
                },
            };
        };

        let processed = query_processor.process(hint);
        let raw_hits = inner.index.search(&processed.enhanced_query, self.max_layer2, self.score_floor);

        let mut boosted: Vec<(String, f64)> = raw_hits
            .into_iter()
            .map(|(name, score)| {
                let usage = inner.tools.get(&name).map(|t| t.usage_count).unwrap_or(0);
                let boost = ((1.0 + usage as f64).ln()) * 0.1;
                (name, score + boost)
            })
            .collect();
        boosted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        boosted.truncate(self.max_layer2);

        let relevant: Vec<ToolDescriptor> = boosted
            .into_iter()
            .filter(|(name, _)| !inner.essential.contains(name))
            .filter_map(|(name, _)| inner.tools.get(&name).cloned())
            .collect();

        Selection {
            available_total: inner.tools.len(),
            meta: SelectionMeta {
                layer: 2,
                elapsed_ms: start.elapsed().as_millis() as u64,
                reason: format!("bm25 match on enhanced query \"{}\"", processed.enhanced_query),
            },
            essential,
            relevant,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

pub fn tool_not_found(name: &str) -> Error {
    Error::ToolNotFound(name.to_string())
}
