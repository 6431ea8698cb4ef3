//! Row types for the entities in §3 that are not already covered by
//! [`crate::tool`]. Shared between `sa-store` (which persists them) and
//! `sa-features` (which returns them from tool handlers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Memory ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub access_count: u64,
}

// ── Tasks ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in-progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Status glyph used by `planning_tree`'s ASCII rendering.
    pub fn glyph(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[~]",
            TaskStatus::Completed => "[x]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TddPhase {
    Red,
    Green,
    Refactor,
}

impl TddPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TddPhase::Red => "red",
            TddPhase::Green => "green",
            TddPhase::Refactor => "refactor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "red" => Some(TddPhase::Red),
            "green" => Some(TddPhase::Green),
            "refactor" => Some(TddPhase::Refactor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub content: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub tdd_phase: Option<TddPhase>,
    #[serde(default)]
    pub test_path: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: String,
    pub task_id: String,
    pub test_path: String,
    pub phase: TddPhase,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub coverage: Option<f64>,
}

// ── Guides ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideEntry {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    pub body: String,
    pub excerpt: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl GuideEntry {
    pub fn index_document(&self) -> String {
        let mut parts = vec![self.title.clone(), self.excerpt.clone(), self.body.clone()];
        parts.extend(self.tags.iter().cloned());
        parts.join(" ").to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Started => "started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(ProgressStatus::Started),
            "in_progress" => Some(ProgressStatus::InProgress),
            "completed" => Some(ProgressStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningProgress {
    pub guide_id: String,
    pub session_id: String,
    pub status: ProgressStatus,
    pub step_index: u32,
}

// ── Agents ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AgentStatus::Pending),
            "running" => Some(AgentStatus::Running),
            "completed" => Some(AgentStatus::Completed),
            "failed" => Some(AgentStatus::Failed),
            "timed_out" => Some(AgentStatus::TimedOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub agent_type: String,
    pub task: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub spawned_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

// ── Context snapshots ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: String,
    pub session_id: String,
    pub captured_at: DateTime<Utc>,
    pub snapshot: serde_json::Value,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// ── Sessions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

// ── Usage log ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    pub elapsed_ms: u64,
}
