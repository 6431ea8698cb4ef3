//! Provider Manager (§4.8): connect, list, disconnect external tool
//! providers. Every registered tool also lives in the [`ToolRegistry`];
//! this module only owns the provider rows and the live client handles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sa_domain::capability::ToolProvider;
use sa_domain::tool::ProviderDescriptor;
use sa_domain::{Error, Result};
use sa_registry::ToolRegistry;
use sa_store::Store;
use tracing::warn;

pub struct ProviderManager {
    store: Arc<Store>,
    registry: Arc<ToolRegistry>,
    clients: RwLock<HashMap<String, Arc<dyn ToolProvider>>>,
}

impl ProviderManager {
    pub fn new(store: Arc<Store>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            store,
            registry,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the manager with clients already connected at startup (e.g.
    /// MCP servers discovered from config), registering their tools as
    /// if each had just been `connect`ed.
    pub async fn adopt(&self, descriptor: ProviderDescriptor, client: Arc<dyn ToolProvider>) -> Result<()> {
        self.insert_provider_and_tools(&descriptor, &client).await?;
        self.clients.write().insert(descriptor.id.clone(), client);
        Ok(())
    }

    /// Connect a new external provider: persist the provider row,
    /// discover its tools, and register them. Any failure rolls back
    /// the provider row and any tools already inserted.
    pub async fn connect(&self, descriptor: ProviderDescriptor, client: Arc<dyn ToolProvider>) -> Result<()> {
        match self.insert_provider_and_tools(&descriptor, &client).await {
            Ok(()) => {
                self.clients.write().insert(descriptor.id.clone(), client);
                Ok(())
            }
            Err(e) => {
                client.close().await;
                let _ = self.registry.remove_provider_tools(&descriptor.id);
                let _ = self.store.remove_provider(&descriptor.id);
                Err(e)
            }
        }
    }

    async fn insert_provider_and_tools(&self, descriptor: &ProviderDescriptor, client: &Arc<dyn ToolProvider>) -> Result<()> {
        self.store.upsert_provider(descriptor)?;
        let tools = client.list().await?;
        for mut tool in tools {
            tool.provider_id = descriptor.id.clone();
            self.registry.register_tool(tool)?;
        }
        Ok(())
    }

    /// Close the client, remove its tools from the live map/index, and
    /// delete the provider row (cascading the persisted tool rows).
    pub async fn disconnect(&self, provider_id: &str) -> Result<()> {
        let client = self
            .clients
            .write()
            .remove(provider_id)
            .ok_or_else(|| Error::NotFound(format!("provider `{provider_id}` not connected")))?;
        client.close().await;
        self.registry.remove_provider_tools(provider_id)?;
        self.store.remove_provider(provider_id)?;
        Ok(())
    }

    /// Best-effort disconnect of every connected provider: one failure
    /// must not prevent cleanup of the others.
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.clients.read().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.disconnect(&id).await {
                warn!(provider_id = %id, error = %e, "failed to disconnect provider");
            }
        }
    }

    pub fn get_client(&self, provider_id: &str) -> Option<Arc<dyn ToolProvider>> {
        self.clients.read().get(provider_id).cloned()
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.clients.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::tool::{ContentBlock, ProviderInvocation, ToolCallResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProvider {
        tools: Vec<sa_domain::tool::ToolDescriptor>,
        closed: AtomicBool,
        fail_list: bool,
    }

    #[async_trait]
    impl ToolProvider for FakeProvider {
        async fn list(&self) -> Result<Vec<sa_domain::tool::ToolDescriptor>> {
            if self.fail_list {
                return Err(Error::Unavailable("provider refused to list tools".into()));
            }
            Ok(self.tools.clone())
        }

        async fn call(&self, _name: &str, _args: serde_json::Value) -> Result<ToolCallResult> {
            Ok(ToolCallResult { content: vec![ContentBlock::Text { text: "ok".into() }], is_error: false })
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
    }

    fn descriptor(id: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_string(),
            display_name: "Slack connector".to_string(),
            invocation: ProviderInvocation { command: "slack-mcp".to_string(), args: vec![], env: Default::default() },
            quality_score: None,
        }
    }

    fn tool(name: &str) -> sa_domain::tool::ToolDescriptor {
        sa_domain::tool::ToolDescriptor {
            name: name.to_string(),
            provider_id: String::new(),
            description: "send a message".to_string(),
            input_schema: serde_json::json!({}),
            category: None,
            keywords: Vec::new(),
            usage_count: 0,
        }
    }

    fn manager() -> ProviderManager {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(ToolRegistry::load(store.clone(), 15, 0.0).unwrap());
        ProviderManager::new(store, registry)
    }

    #[tokio::test]
    async fn connect_registers_tools_and_tracks_the_client() {
        let m = manager();
        let client = Arc::new(FakeProvider {
            tools: vec![tool("send_slack")],
            closed: AtomicBool::new(false),
            fail_list: false,
        });
        m.connect(descriptor("ext:slack"), client).await.unwrap();
        assert!(m.get_client("ext:slack").is_some());
        assert_eq!(m.registry.get("send_slack").unwrap().provider_id, "ext:slack");
    }

    #[tokio::test]
    async fn connect_rolls_back_provider_row_on_list_failure() {
        let m = manager();
        let client = Arc::new(FakeProvider { tools: vec![], closed: AtomicBool::new(false), fail_list: true });
        let err = m.connect(descriptor("ext:slack"), client.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
        assert!(m.store.get_provider("ext:slack").unwrap().is_none());
        assert!(m.get_client("ext:slack").is_none());
        assert!(client.closed.load(Ordering::SeqCst), "the failed client must still be closed");
    }

    #[tokio::test]
    async fn disconnect_closes_client_and_cascades_tools() {
        let m = manager();
        let client = Arc::new(FakeProvider {
            tools: vec![tool("send_slack")],
            closed: AtomicBool::new(false),
            fail_list: false,
        });
        m.connect(descriptor("ext:slack"), client.clone()).await.unwrap();
        m.disconnect("ext:slack").await.unwrap();
        assert!(client.closed.load(Ordering::SeqCst));
        assert!(m.registry.get("send_slack").is_none());
        assert!(m.store.get_provider("ext:slack").unwrap().is_none());
    }

    #[tokio::test]
    async fn disconnect_unknown_provider_errors() {
        let m = manager();
        let err = m.disconnect("ext:nobody").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn disconnect_all_is_best_effort_across_every_connected_provider() {
        let m = manager();
        let a = Arc::new(FakeProvider { tools: vec![], closed: AtomicBool::new(false), fail_list: false });
        let b = Arc::new(FakeProvider { tools: vec![], closed: AtomicBool::new(false), fail_list: false });
        m.connect(descriptor("ext:a"), a.clone()).await.unwrap();
        m.connect(descriptor("ext:b"), b.clone()).await.unwrap();
        m.disconnect_all().await;
        assert!(a.closed.load(Ordering::SeqCst));
        assert!(b.closed.load(Ordering::SeqCst));
        assert!(m.connected_ids().is_empty());
    }
}
