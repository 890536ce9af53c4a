// crates/ferryrun/src/lib.rs
//! # ferryrun
//!
//! A cross-runtime bridge for shipping partition functions: define a
//! callable in the client runtime, build it onto a host, and drive it
//! through an opaque handle as if it were local.
//!
//! ## Architecture
//!
//! - **Payload**: a shippable callable is explicit data (operation tag +
//!   captured state), serialized once at build time.
//! - **Registry**: the host arena owning materialized objects; handles
//!   are monotonic and never reused.
//! - **Dispatcher**: the host edge; decodes frames, routes the capability
//!   set, and converts every failure into a structured fault reply.
//! - **Proxy**: the client stand-in; pure forwarding over a lifecycle
//!   state machine (`Unbuilt → Building → Live → Released`).
//! - **Transport**: "send bytes, await bytes", pluggable and object-safe.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ferryrun::{Client, Dispatcher, LocalCallable, LoopbackTransport, PartitionProxy, Registry};
//! use ferryrpc::Value;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Host side: a registry and its dispatcher.
//! let registry = Arc::new(Registry::new());
//! let dispatcher = Dispatcher::new(registry);
//!
//! // Client side: a proxy over any transport.
//! let client = Client::new(Arc::new(LoopbackTransport::new(dispatcher)));
//! let proxy = PartitionProxy::new(client, LocalCallable::modulo(4));
//!
//! proxy.build().await?;
//! let destination = proxy.partition(0, &Value::Int(7)).await?;
//! assert_eq!(destination, 3);
//! proxy.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dispatch;
pub mod mock_transport;
pub mod partition;
pub mod payload;
pub mod proxy;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::CallError;
pub use client::Client;
pub use dispatch::Dispatcher;
pub use mock_transport::CountingTransport;
pub use mock_transport::LoopbackTransport;
pub use partition::ExecError;
pub use partition::ExecResult;
pub use partition::PartitionFn;
pub use payload::CallablePayload;
pub use payload::CallableSpec;
pub use payload::LocalCallable;
pub use payload::PayloadError;
pub use proxy::PartitionProxy;
pub use proxy::ProxyState;
pub use registry::HandleId;
pub use registry::Registry;
pub use transport::Transport;
pub use transport::TransportError;
