//! Typed, priority-ordered, in-process event fan-out. Every lifecycle
//! moment the gateway cares about — a tool about to run, a task tree
//! changing, a test passing — goes through here rather than through
//! direct manager-to-manager calls (§9: "lateral signalling must flow
//! through hooks").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use sa_domain::event::{HookContext, HookKind};
use tracing::error;

pub type HandlerId = u64;

#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, ctx: &mut HookContext);
}

/// Wraps a plain closure-like handler so call sites don't have to write
/// a struct for the common case of a stateless synchronous reaction.
pub struct FnHandler<F>(pub F)
where
    F: Fn(&mut HookContext) + Send + Sync;

#[async_trait]
impl<F> HookHandler for FnHandler<F>
where
    F: Fn(&mut HookContext) + Send + Sync,
{
    async fn handle(&self, ctx: &mut HookContext) {
        (self.0)(ctx)
    }
}

struct Registration {
    id: HandlerId,
    priority: i32,
    #[allow(dead_code)]
    description: Option<String>,
    handler: Arc<dyn HookHandler>,
}

#[derive(Default)]
struct Bus {
    by_kind: HashMap<HookKind, Vec<Registration>>,
    kind_of: HashMap<HandlerId, HookKind>,
}

pub struct HookBus {
    bus: RwLock<Bus>,
    next_id: AtomicU64,
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self {
            bus: RwLock::new(Bus::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Priority-descending dispatch, registration order as the tie
    /// break — achieved by a stable sort keyed on `(-priority, id)`.
    pub fn register(
        &self,
        kind: HookKind,
        handler: Arc<dyn HookHandler>,
        priority: i32,
        description: Option<String>,
    ) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut bus = self.bus.write();
        bus.by_kind.entry(kind).or_default().push(Registration {
            id,
            priority,
            description,
            handler,
        });
        bus.by_kind
            .get_mut(&kind)
            .unwrap()
            .sort_by_key(|r| (std::cmp::Reverse(r.priority), r.id));
        bus.kind_of.insert(id, kind);
        id
    }

    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut bus = self.bus.write();
        let Some(kind) = bus.kind_of.remove(&id) else {
            return false;
        };
        if let Some(regs) = bus.by_kind.get_mut(&kind) {
            regs.retain(|r| r.id != id);
        }
        true
    }

    /// Run every handler registered for `ctx.kind`, in priority order.
    /// A panicking or erroring handler is logged and isolated: the
    /// remaining handlers for this event still run, and `fire` never
    /// fails.
    pub async fn fire(&self, mut ctx: HookContext) -> HookContext {
        let handlers: Vec<Arc<dyn HookHandler>> = {
            let bus = self.bus.read();
            bus.by_kind
                .get(&ctx.kind)
                .map(|regs| regs.iter().map(|r| r.handler.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            let result = std::panic::AssertUnwindSafe(handler.handle(&mut ctx))
                .catch_unwind()
                .await;
            if let Err(panic) = result {
                let msg = panic_message(&panic);
                error!(kind = ?ctx.kind, error = %msg, "hook handler panicked");
            }
        }
        ctx
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingHandler {
        label: &'static str,
        out: Arc<StdMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl HookHandler for RecordingHandler {
        async fn handle(&self, _ctx: &mut HookContext) {
            self.out.lock().unwrap().push(self.label);
        }
    }

    #[tokio::test]
    async fn fires_in_descending_priority_with_registration_tiebreak() {
        let bus = HookBus::new();
        let out = Arc::new(StdMutex::new(Vec::new()));
        bus.register(
            HookKind::PostToolUse,
            Arc::new(RecordingHandler { label: "10", out: out.clone() }),
            10,
            None,
        );
        bus.register(
            HookKind::PostToolUse,
            Arc::new(RecordingHandler { label: "5", out: out.clone() }),
            5,
            None,
        );
        bus.fire(HookContext::new(HookKind::PostToolUse)).await;
        assert_eq!(*out.lock().unwrap(), vec!["10", "5"]);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_the_chain() {
        struct PanicHandler;
        #[async_trait]
        impl HookHandler for PanicHandler {
            async fn handle(&self, _ctx: &mut HookContext) {
                panic!("boom");
            }
        }
        let bus = HookBus::new();
        let out = Arc::new(StdMutex::new(Vec::new()));
        bus.register(HookKind::ErrorOccurred, Arc::new(PanicHandler), 10, None);
        bus.register(
            HookKind::ErrorOccurred,
            Arc::new(RecordingHandler { label: "ok", out: out.clone() }),
            5,
            None,
        );
        bus.fire(HookContext::new(HookKind::ErrorOccurred)).await;
        assert_eq!(*out.lock().unwrap(), vec!["ok"]);
    }

    #[tokio::test]
    async fn unregister_removes_handler() {
        let bus = HookBus::new();
        let out = Arc::new(StdMutex::new(Vec::new()));
        let id = bus.register(
            HookKind::MemorySaved,
            Arc::new(RecordingHandler { label: "x", out: out.clone() }),
            0,
            None,
        );
        assert!(bus.unregister(id));
        bus.fire(HookContext::new(HookKind::MemorySaved)).await;
        assert!(out.lock().unwrap().is_empty());
    }
}
