use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of hook event kinds (§4.9). Nineteen variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    SessionStart,
    SessionEnd,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    ErrorOccurred,
    ContextFull,
    TestCompleted,
    AgentStarted,
    AgentCompleted,
    PlanningStarted,
    PlanningCompleted,
    MemorySaved,
    MemoryRecalled,
    TddCycleStarted,
    TddCycleCompleted,
    ScienceJobStarted,
    ScienceJobCompleted,
    GuideQueried,
}

impl HookKind {
    pub const ALL: [HookKind; 19] = [
        HookKind::SessionStart,
        HookKind::SessionEnd,
        HookKind::UserPromptSubmit,
        HookKind::PreToolUse,
        HookKind::PostToolUse,
        HookKind::ErrorOccurred,
        HookKind::ContextFull,
        HookKind::TestCompleted,
        HookKind::AgentStarted,
        HookKind::AgentCompleted,
        HookKind::PlanningStarted,
        HookKind::PlanningCompleted,
        HookKind::MemorySaved,
        HookKind::MemoryRecalled,
        HookKind::TddCycleStarted,
        HookKind::TddCycleCompleted,
        HookKind::ScienceJobStarted,
        HookKind::ScienceJobCompleted,
        HookKind::GuideQueried,
    ];
}

/// Mutable state shared between handlers of a single event, in the order
/// they run (descending priority). A handler may write keys that later
/// handlers of the same event read.
pub type SharedState = HashMap<String, Value>;

/// The context passed to every handler of a fired event.
#[derive(Debug, Clone, Serialize)]
pub struct HookContext {
    pub kind: HookKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_args: Option<Value>,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(skip)]
    pub shared_state: SharedState,
}

impl HookContext {
    pub fn new(kind: HookKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            session_id: None,
            tool_name: None,
            tool_args: None,
            tool_result: None,
            error: None,
            data: None,
            shared_state: SharedState::new(),
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, args: Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_args = Some(args);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.tool_result = Some(result);
        self
    }
}
