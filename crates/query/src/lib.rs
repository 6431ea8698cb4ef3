//! Turns a caller-supplied free-text hint into the structured query the
//! Tool Loader ranks against: normalization, stop-word removal, action
//! and domain inference against fixed vocabularies, a confidence score,
//! and an enhanced query string.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "for", "in", "on", "at", "by", "with", "and", "or", "is", "are",
    "be", "this", "that", "it", "as", "from", "me", "my", "please", "can", "you",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Send,
    Read,
    Write,
    Delete,
}

impl Action {
    fn verb(&self) -> &'static str {
        match self {
            Action::Send => "send",
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        }
    }
}

const ACTION_SYNONYMS: &[(Action, &[&str])] = &[
    (Action::Write, &["create", "update", "modify", "add", "insert", "write"]),
    (Action::Read, &["get", "fetch", "query", "list", "find", "search", "read"]),
    (Action::Delete, &["remove", "destroy", "delete"]),
    (Action::Send, &["send", "message", "post", "notify", "deliver", "email"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Communication,
    Database,
    Filesystem,
    Development,
    Web,
    Ai,
    Other,
}

impl Domain {
    fn label(&self) -> &'static str {
        match self {
            Domain::Communication => "communication",
            Domain::Database => "database",
            Domain::Filesystem => "filesystem",
            Domain::Development => "development",
            Domain::Web => "web",
            Domain::Ai => "ai",
            Domain::Other => "other",
        }
    }
}

/// First-declared order matters for the domain tie-break.
const DOMAIN_VOCAB: &[(Domain, &[&str])] = &[
    (
        Domain::Communication,
        &["slack", "email", "message", "chat", "notify", "sms", "discord", "mail"],
    ),
    (
        Domain::Database,
        &["sql", "query", "table", "row", "database", "schema", "record"],
    ),
    (
        Domain::Filesystem,
        &["file", "directory", "folder", "path", "disk", "filesystem"],
    ),
    (
        Domain::Development,
        &["code", "git", "commit", "build", "test", "compile", "debug", "repo"],
    ),
    (
        Domain::Web,
        &["http", "url", "api", "request", "fetch", "browser", "website"],
    ),
    (
        Domain::Ai,
        &["model", "prompt", "llm", "embedding", "inference", "gpt", "agent"],
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedQuery {
    pub normalized: String,
    pub keywords: Vec<String>,
    pub action: Action,
    pub domain: Domain,
    pub confidence: f64,
    pub enhanced_query: String,
}

/// Lowercase, collapse whitespace.
fn normalize(raw: &str) -> String {
    raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokens of length > 2 with stop-words removed.
fn extract_keywords(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn infer_action(keywords: &[String]) -> Option<Action> {
    let set: HashSet<&str> = keywords.iter().map(|s| s.as_str()).collect();
    for (action, synonyms) in ACTION_SYNONYMS {
        if synonyms.iter().any(|s| set.contains(s)) {
            return Some(*action);
        }
    }
    None
}

/// Returns the winning domain plus how many distinct vocabulary terms
/// from that domain matched, used both for inference and for picking
/// the enhanced-query terms.
fn infer_domain(keywords: &[String]) -> (Domain, Vec<&'static str>) {
    let set: HashSet<&str> = keywords.iter().map(|s| s.as_str()).collect();
    let mut best: Option<(Domain, Vec<&'static str>)> = None;
    for (domain, vocab) in DOMAIN_VOCAB {
        let hits: Vec<&'static str> = vocab.iter().copied().filter(|v| set.contains(v)).collect();
        if !hits.is_empty() && best.as_ref().map(|(_, b)| hits.len() > b.len()).unwrap_or(true) {
            best = Some((*domain, hits));
        }
    }
    best.unwrap_or((Domain::Other, Vec::new()))
}

pub struct QueryProcessor;

impl QueryProcessor {
    pub fn process(&self, raw: &str) -> ProcessedQuery {
        let normalized = normalize(raw);
        let keywords = extract_keywords(&normalized);
        let inferred_action = infer_action(&keywords);
        let action_matched = inferred_action.is_some();
        let action = inferred_action.unwrap_or(Action::Read);
        let (domain, domain_hits) = infer_domain(&keywords);

        let action_score = if action_matched { 1.0 } else { 0.0 };
        let domain_score = if domain != Domain::Other { 1.0 } else { 0.0 };
        let entity_score = (keywords.len() as f64 / 5.0).min(1.0);
        let confidence = action_score * 0.3 + domain_score * 0.5 + entity_score * 0.2;

        let mut enhanced_terms: Vec<String> = vec![normalized.clone()];
        for term in domain_hits.into_iter().take(3) {
            enhanced_terms.push(term.to_string());
        }
        enhanced_terms.push(action.verb().to_string());
        let mut seen = HashSet::new();
        let enhanced_query = enhanced_terms
            .into_iter()
            .flat_map(|t| t.split_whitespace().map(|s| s.to_string()).collect::<Vec<_>>())
            .filter(|t| seen.insert(t.clone()))
            .collect::<Vec<_>>()
            .join(" ");

        ProcessedQuery {
            normalized,
            keywords,
            action,
            domain,
            confidence,
            enhanced_query,
        }
    }
}

impl Default for QueryProcessor {
    fn default() -> Self {
        Self
    }
}
