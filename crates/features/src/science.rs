//! **[SUPPLEMENT]** Science Manager: named in §4.6's construction order
//! but its computations are explicitly out of scope (§1: "the core
//! merely routes to a pluggable compute backend"). Exposes one tool,
//! `science_run`, that forwards to a [`ComputeBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::capability::{ComputeBackend, FeatureManager};
use sa_domain::tool::{ToolCallResult, ToolDescriptor};
use sa_domain::{Error, Result};
use serde_json::{json, Value};

pub const PROVIDER_ID: &str = "internal:science";

pub struct ScienceManager {
    backend: Arc<dyn ComputeBackend>,
}

impl ScienceManager {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FeatureManager for ScienceManager {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn tool_definitions(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "science_run".into(),
            provider_id: PROVIDER_ID.into(),
            description: "Run a named job against the configured compute backend.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job": {"type": "string"},
                    "args": {}
                },
                "required": ["job"]
            }),
            category: Some("science".into()),
            keywords: vec!["science".into(), "compute".into(), "run".into()],
            usage_count: 0,
        }]
    }

    async fn handle(&self, tool_name: &str, args: Value) -> Result<ToolCallResult> {
        match tool_name {
            "science_run" => {
                let job = args.get("job").and_then(Value::as_str).ok_or_else(|| {
                    Error::InvalidInput("science_run requires `job`".into())
                })?;
                let job_args = args.get("args").cloned().unwrap_or(Value::Null);
                let result = self.backend.run(job, job_args).await?;
                Ok(ToolCallResult::ok_json(&result))
            }
            other => Err(Error::ToolNotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::capability::NullComputeBackend;

    struct EchoBackend;

    #[async_trait]
    impl ComputeBackend for EchoBackend {
        async fn run(&self, job: &str, args: Value) -> Result<Value> {
            Ok(json!({ "job": job, "echoedArgs": args }))
        }
    }

    #[tokio::test]
    async fn science_run_forwards_to_the_configured_backend() {
        let m = ScienceManager::new(Arc::new(EchoBackend));
        let result = m.handle("science_run", json!({"job": "t-test", "args": {"n": 10}})).await.unwrap();
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn science_run_without_a_backend_reports_unavailable() {
        let m = ScienceManager::new(Arc::new(NullComputeBackend));
        let err = m.handle("science_run", json!({"job": "t-test"})).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn science_run_requires_job() {
        let m = ScienceManager::new(Arc::new(NullComputeBackend));
        let err = m.handle("science_run", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
