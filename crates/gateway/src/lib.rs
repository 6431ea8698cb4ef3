//! The gateway binary's own modules: the Provider Manager, the Gateway
//! RPC surface, and the context-snapshot janitor. `main.rs` wires these
//! together with the store and the feature coordinator.

pub mod janitor;
pub mod providers;
pub mod rpc;
