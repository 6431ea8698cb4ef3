use serde::{Deserialize, Serialize};

/// Prefix reserved for in-process feature managers (§3: "values beginning
/// with `internal:` are reserved for in-process features").
pub const INTERNAL_PROVIDER_PREFIX: &str = "internal:";

/// A source of tools: either an in-process feature manager
/// (`id` starts with `internal:`) or an external provider process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub invocation: ProviderInvocation,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

impl ProviderDescriptor {
    pub fn is_internal(&self) -> bool {
        self.id.starts_with(INTERNAL_PROVIDER_PREFIX)
    }
}

/// How to reach an external provider (child process transport).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderInvocation {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

/// One row per `(provider_id, tool_name)`. `name` is globally unique
/// within the live catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub provider_id: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub usage_count: u64,
}

impl ToolDescriptor {
    /// Concatenated, lowercased document text used by the BM25 indexer:
    /// name (duplicated for weight), description, keywords, category.
    pub fn index_document(&self) -> String {
        let mut parts = vec![self.name.clone(), self.name.clone(), self.description.clone()];
        parts.extend(self.keywords.iter().cloned());
        if let Some(cat) = &self.category {
            parts.push(cat.clone());
        }
        parts.join(" ").to_lowercase()
    }
}

/// A single content block of a tool call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Result of invoking a tool, matching the `call_tool` wire shape in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self::ok(serde_json::to_string(value).unwrap_or_default())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// §9 Open Question (b): an `isError=true` structured response counts
    /// as a failed call for usage-log purposes, even though no exception
    /// was thrown.
    pub fn succeeded(&self) -> bool {
        !self.is_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_document_lowercases_and_duplicates_name() {
        let d = ToolDescriptor {
            name: "Read_File".into(),
            provider_id: "internal:fs".into(),
            description: "Reads a FILE".into(),
            input_schema: serde_json::json!({}),
            category: Some("filesystem".into()),
            keywords: vec!["IO".into()],
            usage_count: 0,
        };
        let doc = d.index_document();
        assert_eq!(doc, "read_file read_file reads a file io filesystem");
    }

    #[test]
    fn is_error_response_does_not_succeed() {
        let r = ToolCallResult::error("boom");
        assert!(!r.succeeded());
        let ok = ToolCallResult::ok("fine");
        assert!(ok.succeeded());
    }
}
