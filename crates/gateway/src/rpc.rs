//! Gateway RPC (§4.7): resolves `list_tools` / `call_tool`, the two
//! methods the external JSON-RPC surface exposes, and the line-framed
//! JSON-RPC 2.0 loop that serves them over an `AsyncRead + AsyncWrite`
//! pair (stdio by default).

use std::sync::Arc;
use std::time::{Duration, Instant};

use sa_domain::event::HookKind;
use sa_domain::tool::{ToolCallResult, ToolDescriptor};
use sa_domain::{Error, Result};
use sa_domain::event::HookContext;
use sa_features::FeatureCoordinator;
use sa_hooks::HookBus;
use sa_query::QueryProcessor;
use sa_registry::ToolRegistry;
use sa_store::Store;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use sa_mcp_client::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

use crate::providers::ProviderManager;

pub struct GatewayRpc {
    store: Arc<Store>,
    registry: Arc<ToolRegistry>,
    coordinator: Arc<FeatureCoordinator>,
    providers: Arc<ProviderManager>,
    query_processor: QueryProcessor,
    call_timeout: Duration,
}

impl GatewayRpc {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<ToolRegistry>,
        coordinator: Arc<FeatureCoordinator>,
        providers: Arc<ProviderManager>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            coordinator,
            providers,
            query_processor: QueryProcessor::default(),
            call_timeout,
        }
    }

    fn hooks(&self) -> &Arc<HookBus> {
        self.coordinator.hooks()
    }

    /// With a non-empty query hint, Layer-1 ∪ Layer-2 (still carrying
    /// provider/category/keyword fields, since those stay internal to
    /// this dispatch path). With no hint, every registered descriptor
    /// stripped down to the legacy `{name, description, inputSchema}`
    /// shape — the default that keeps old callers working.
    pub fn list_tools(&self, query_hint: Option<&str>) -> Value {
        match query_hint.filter(|h| !h.trim().is_empty()) {
            Some(hint) => {
                let selection = self.registry.select(Some(hint), &self.query_processor);
                json!({
                    "tools": selection.essential.iter().chain(selection.relevant.iter())
                        .map(full_tool_json).collect::<Vec<_>>(),
                    "availableTotal": selection.available_total,
                    "meta": selection.meta,
                })
            }
            None => {
                let tools = self.registry.list_all();
                json!({ "tools": tools.iter().map(stripped_tool_json).collect::<Vec<_>>() })
            }
        }
    }

    /// Look up the live descriptor, time the call, fan out `PreToolUse`/
    /// `PostToolUse`/`ErrorOccurred`, and record usage regardless of
    /// outcome. Per Open Question (b), `isError: true` counts as a
    /// failed call for usage-log purposes even though nothing was
    /// thrown. The first call seen for a given session also fans out
    /// `SessionStart`, and a successful `agent_complete` additionally
    /// fans out `AgentCompleted`.
    pub async fn call_tool(&self, session_id: Option<&str>, name: &str, args: Value) -> Result<ToolCallResult> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        if let Some(sid) = session_id {
            let is_new_session = self.store.session_get(sid)?.is_none();
            self.store.session_touch(sid)?;
            if is_new_session {
                self.hooks().fire(HookContext::new(HookKind::SessionStart).with_session(sid)).await;
            }
        }

        let start = Instant::now();
        let mut pre_ctx = HookContext::new(HookKind::PreToolUse).with_tool(name, args.clone());
        if let Some(sid) = session_id {
            pre_ctx = pre_ctx.with_session(sid);
        }
        self.hooks().fire(pre_ctx).await;

        let outcome = tokio::time::timeout(self.call_timeout, self.dispatch(&descriptor, name, args.clone())).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(result)) => {
                self.registry.record_usage(name, &args, result.succeeded(), elapsed_ms);
                if name == "agent_complete" && result.succeeded() {
                    self.fire_agent_completed(session_id, &args).await;
                }
                let mut ctx = HookContext::new(HookKind::PostToolUse)
                    .with_tool(name, args)
                    .with_result(serde_json::to_value(&result).unwrap_or(Value::Null));
                if let Some(sid) = session_id {
                    ctx = ctx.with_session(sid);
                }
                self.hooks().fire(ctx).await;
                Ok(result)
            }
            Ok(Err(e)) => {
                self.registry.record_usage(name, &args, false, elapsed_ms);
                self.fire_error(session_id, name, &args, &e).await;
                Err(e)
            }
            Err(_) => {
                let e = Error::Timeout(format!("tool `{name}` did not complete within {:?}", self.call_timeout));
                self.registry.record_usage(name, &args, false, elapsed_ms);
                self.fire_error(session_id, name, &args, &e).await;
                Err(e)
            }
        }
    }

    /// §built-ins: `AgentCompleted` carries the caller's `result` payload
    /// under `data.result` so `MarkTasksOnAgentCompletion` can read
    /// `data.result.todoIds` the same way whether fired here or by hand.
    async fn fire_agent_completed(&self, session_id: Option<&str>, args: &Value) {
        let result = args.get("result").cloned().unwrap_or(Value::Null);
        let mut ctx = HookContext::new(HookKind::AgentCompleted).with_data(json!({ "result": result }));
        if let Some(sid) = session_id {
            ctx = ctx.with_session(sid);
        }
        self.hooks().fire(ctx).await;
    }

    /// Callers notify the gateway when a context window fills up so
    /// `SnapshotOnContextFull` can capture the session's live state.
    pub async fn notify_context_full(&self, session_id: &str) -> Result<()> {
        self.hooks().fire(HookContext::new(HookKind::ContextFull).with_session(session_id)).await;
        Ok(())
    }

    async fn fire_error(&self, session_id: Option<&str>, name: &str, args: &Value, e: &Error) {
        let mut ctx = HookContext::new(HookKind::ErrorOccurred)
            .with_tool(name, args.clone())
            .with_error(e.to_string());
        if let Some(sid) = session_id {
            ctx = ctx.with_session(sid);
        }
        self.hooks().fire(ctx).await;
    }

    /// §4.8: connect a new external provider (spawns an MCP stdio
    /// server), discover its tools, and register them.
    pub async fn connect_provider(&self, descriptor: sa_domain::tool::ProviderDescriptor) -> Result<usize> {
        let server_config = sa_mcp_client::McpServerConfig {
            id: descriptor.id.clone(),
            command: descriptor.invocation.command.clone(),
            args: descriptor.invocation.args.clone(),
            env: descriptor.invocation.env.clone(),
            transport: sa_mcp_client::McpTransportKind::Stdio,
            url: None,
        };
        let server = sa_mcp_client::McpServer::connect(&server_config)
            .await
            .map_err(Error::from)?;
        let client: Arc<dyn sa_domain::capability::ToolProvider> = Arc::new(server);
        let tool_count = client.list().await?.len();
        self.providers.connect(descriptor, client).await?;
        Ok(tool_count)
    }

    pub async fn disconnect_provider(&self, provider_id: &str) -> Result<()> {
        self.providers.disconnect(provider_id).await
    }

    pub fn list_providers(&self) -> Vec<String> {
        self.providers.connected_ids()
    }

    async fn dispatch(&self, descriptor: &ToolDescriptor, name: &str, args: Value) -> Result<ToolCallResult> {
        if let Some(result) = self.coordinator.route(&descriptor.provider_id, name, args.clone()).await {
            return result;
        }
        let client = self
            .providers
            .get_client(&descriptor.provider_id)
            .ok_or_else(|| Error::Unavailable(format!("provider `{}` is not connected", descriptor.provider_id)))?;
        client.call(name, args).await
    }
}

fn full_tool_json(t: &ToolDescriptor) -> Value {
    serde_json::to_value(t).unwrap_or(Value::Null)
}

fn stripped_tool_json(t: &ToolDescriptor) -> Value {
    json!({
        "name": t.name,
        "description": t.description,
        "inputSchema": t.input_schema,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Line-framed JSON-RPC 2.0 loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serve `list_tools`/`call_tool` over stdio: one JSON-RPC message per
/// line, matching the teacher's own MCP client framing convention
/// (reused here rather than invented fresh).
pub async fn serve_stdio(rpc: Arc<GatewayRpc>) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read error, stopping RPC loop");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to parse JSON-RPC request line");
                continue;
            }
        };

        let response = handle_request(&rpc, request).await;
        if let Ok(json) = serde_json::to_string(&response) {
            if stdout.write_all(json.as_bytes()).await.is_err() || stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    }
}

async fn handle_request(rpc: &Arc<GatewayRpc>, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id;
    match request.method.as_str() {
        "list_tools" => {
            let hint = request
                .params
                .as_ref()
                .and_then(|p| p.get("query"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let result = rpc.list_tools(hint.as_deref());
            JsonRpcResponse { jsonrpc: "2.0".into(), id, result: Some(result), error: None }
        }
        "call_tool" => {
            let params = request.params.unwrap_or(Value::Null);
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let args = params.get("arguments").cloned().unwrap_or(Value::Null);
            let session_id = params.get("sessionId").and_then(Value::as_str).map(str::to_string);

            match rpc.call_tool(session_id.as_deref(), &name, args).await {
                Ok(result) => JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id,
                    result: Some(serde_json::to_value(&result).unwrap_or(Value::Null)),
                    error: None,
                },
                Err(e) => rpc_error(id, &e),
            }
        }
        "connect_provider" => {
            let params = request.params.unwrap_or(Value::Null);
            let descriptor: std::result::Result<sa_domain::tool::ProviderDescriptor, _> = serde_json::from_value(params);
            match descriptor {
                Ok(descriptor) => match rpc.connect_provider(descriptor).await {
                    Ok(tool_count) => JsonRpcResponse {
                        jsonrpc: "2.0".into(),
                        id,
                        result: Some(json!({ "connected": true, "toolCount": tool_count })),
                        error: None,
                    },
                    Err(e) => rpc_error(id, &e),
                },
                Err(e) => JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id,
                    result: None,
                    error: Some(JsonRpcError { code: -32602, message: format!("invalid params: {e}"), data: None }),
                },
            }
        }
        "disconnect_provider" => {
            let provider_id = request
                .params
                .as_ref()
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match rpc.disconnect_provider(&provider_id).await {
                Ok(()) => JsonRpcResponse { jsonrpc: "2.0".into(), id, result: Some(json!({ "disconnected": true })), error: None },
                Err(e) => rpc_error(id, &e),
            }
        }
        "list_providers" => JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id,
            result: Some(json!({ "providers": rpc.list_providers() })),
            error: None,
        },
        "context_full" => {
            let session_id = request
                .params
                .as_ref()
                .and_then(|p| p.get("sessionId"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match rpc.notify_context_full(&session_id).await {
                Ok(()) => JsonRpcResponse { jsonrpc: "2.0".into(), id, result: Some(json!({ "acknowledged": true })), error: None },
                Err(e) => rpc_error(id, &e),
            }
        }
        other => JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError { code: -32601, message: format!("method not found: {other}"), data: None }),
        },
    }
}

fn rpc_error(id: u64, e: &Error) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: None,
        error: Some(JsonRpcError { code: -32000, message: e.to_string(), data: Some(json!({ "kind": e.kind() })) }),
    }
}
