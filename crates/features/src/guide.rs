//! §4.5.4 Guide Manager: `guide_search` (BM25 over title+excerpt+body+
//! tags) and `guide_tutorial` (a stepper over `LearningProgress`).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sa_domain::capability::FeatureManager;
use sa_domain::models::{GuideEntry, ProgressStatus};
use sa_domain::tool::{ToolCallResult, ToolDescriptor};
use sa_domain::{Error, Result};
use sa_index::Bm25Index;
use sa_store::Store;
use serde_json::{json, Value};

use crate::seed_guides;

pub const PROVIDER_ID: &str = "internal:guide";

/// Paragraphs (blank-line-separated blocks) are the stepper's steps —
/// the simplest deterministic split of a guide's markdown body.
fn steps_of(guide: &GuideEntry) -> Vec<&str> {
    let steps: Vec<&str> = guide
        .body
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        vec![guide.body.trim()]
    } else {
        steps
    }
}

pub struct GuideManager {
    store: Arc<Store>,
    index: RwLock<Bm25Index>,
}

impl GuideManager {
    /// Seeds the static corpus iff the table is empty, then builds the
    /// BM25 index over whatever is now in the store.
    pub fn load(store: Arc<Store>) -> Result<Self> {
        if store.guide_all()?.is_empty() {
            for entry in seed_guides::as_entries() {
                store.guide_seed(&entry)?;
            }
        }
        let mut index = Bm25Index::new();
        for guide in store.guide_all()? {
            index.add_or_replace(&guide.id, &guide.index_document());
        }
        Ok(Self {
            store,
            index: RwLock::new(index),
        })
    }

    pub fn search(
        &self,
        query: &str,
        category: Option<&str>,
        difficulty: Option<&str>,
        limit: u32,
    ) -> Result<Vec<(GuideEntry, f64)>> {
        let hits = self.index.read().search(query, limit as usize * 4, 0.0);
        let mut out = Vec::new();
        for (id, score) in hits {
            let Some(guide) = self.store.guide_all()?.into_iter().find(|g| g.id == id) else {
                continue;
            };
            if let Some(cat) = category {
                if guide.category.as_deref() != Some(cat) {
                    continue;
                }
            }
            if let Some(diff) = difficulty {
                if guide.difficulty.as_deref() != Some(diff) {
                    continue;
                }
            }
            out.push((guide, score));
            if out.len() >= limit as usize {
                break;
            }
        }
        Ok(out)
    }

    pub fn tutorial(&self, action: &str, guide_id: &str, session_id: &str) -> Result<Value> {
        let guide = self
            .store
            .guide_all()?
            .into_iter()
            .find(|g| g.id == guide_id || g.slug == guide_id)
            .ok_or_else(|| Error::NotFound(format!("guide {guide_id} not found")))?;
        let steps = steps_of(&guide);
        let total = steps.len() as u32;
        let current = self.store.guide_progress_get(&guide.id, session_id)?;
        let (mut status, mut step_index) = current
            .map(|p| (p.status, p.step_index))
            .unwrap_or((ProgressStatus::Started, 0));

        match action {
            "start" => {
                status = ProgressStatus::Started;
                step_index = 0;
            }
            "next" => {
                step_index = (step_index + 1).min(total.saturating_sub(1));
                status = ProgressStatus::InProgress;
            }
            "previous" => {
                step_index = step_index.saturating_sub(1);
                status = ProgressStatus::InProgress;
            }
            "check" | "hint" => {
                // Read-only: report current position, no state change.
            }
            "complete" => {
                status = ProgressStatus::Completed;
            }
            "reset" => {
                status = ProgressStatus::Started;
                step_index = 0;
            }
            other => return Err(Error::InvalidInput(format!("unknown guide_tutorial action `{other}`"))),
        }

        if action != "check" && action != "hint" {
            self.store
                .guide_progress_upsert(&guide.id, session_id, status, step_index)?;
        }

        let step_text = steps.get(step_index as usize).copied().unwrap_or_default();
        let hint = if action == "hint" {
            Some(format!("this guide has {total} step(s); you are on step {}", step_index + 1))
        } else {
            None
        };

        Ok(json!({
            "guideId": guide.id,
            "status": status.as_str(),
            "stepIndex": step_index,
            "totalSteps": total,
            "step": step_text,
            "hint": hint,
        }))
    }
}

#[async_trait]
impl FeatureManager for GuideManager {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn tool_definitions(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "guide_search".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Search the guide corpus by relevance.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "category": {"type": "string"},
                        "difficulty": {"type": "string"},
                        "limit": {"type": "integer"}
                    },
                    "required": ["query"]
                }),
                category: Some("guide".into()),
                keywords: vec!["guide".into(), "search".into(), "tutorial".into()],
                usage_count: 0,
            },
            ToolDescriptor {
                name: "guide_tutorial".into(),
                provider_id: PROVIDER_ID.into(),
                description: "Step through a guide's tutorial (start/next/previous/check/hint/complete/reset).".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "action": {"type": "string"},
                        "guideId": {"type": "string"},
                        "sessionId": {"type": "string"}
                    },
                    "required": ["action", "guideId"]
                }),
                category: Some("guide".into()),
                keywords: vec!["guide".into(), "tutorial".into(), "learn".into()],
                usage_count: 0,
            },
        ]
    }

    async fn handle(&self, tool_name: &str, args: Value) -> Result<ToolCallResult> {
        match tool_name {
            "guide_search" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                let category = args.get("category").and_then(Value::as_str);
                let difficulty = args.get("difficulty").and_then(Value::as_str);
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as u32;
                let results = self.search(query, category, difficulty, limit)?;
                let results: Vec<Value> = results
                    .into_iter()
                    .map(|(guide, score)| json!({ "guide": guide, "score": score }))
                    .collect();
                Ok(ToolCallResult::ok_json(&json!({ "results": results })))
            }
            "guide_tutorial" => {
                let action = args.get("action").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("guide_tutorial requires `action`".into())
                })?;
                let guide_id = args.get("guideId").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("guide_tutorial requires `guideId`".into())
                })?;
                let session_id = args.get("sessionId").and_then(Value::as_str).unwrap_or("default");
                let result = self.tutorial(action, guide_id, session_id)?;
                Ok(ToolCallResult::ok_json(&result))
            }
            other => Err(Error::ToolNotFound(other.to_string())),
        }
    }
}
