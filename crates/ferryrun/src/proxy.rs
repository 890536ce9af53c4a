// crates/ferryrun/src/proxy.rs
//! # Partition Proxy
//!
//! The client-side stand-in for an object that physically exists only in
//! the host runtime. A proxy holds a lifecycle state and (once live) a
//! single handle; every capability method is a pure forwarding call.
//!
//! ## Invariants
//!
//! - No business logic lives here. `prepare`, `partition`, and `commit`
//!   round-trip on every call; nothing is cached.
//! - Only the `Live` state accepts calls; everything else fails with
//!   `CallError::InvalidState`.
//! - The one documented exception to pure forwarding: [`PartitionProxy::pre_defined`]
//!   answers `true` locally, because "this is a remote-backed object" is
//!   a static property of being a proxy, not of the object behind it.
//! - A proxy never owns the remote object's lifecycle. Several proxies
//!   may share one handle; the registry tolerates their duplicate
//!   release signals.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use ferryrpc::Value;

use crate::client::CallError;
use crate::client::Client;
use crate::client::Result;
use crate::payload::LocalCallable;
use crate::payload::serialize;
use crate::registry::HandleId;

/// Lifecycle states of a proxied object.
///
/// `Unbuilt → Building → Live → Released`, with `Building` reverting to
/// `Unbuilt` when a build fails so the caller may retry explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// The callable has not been shipped yet.
    Unbuilt,
    /// A build request is in flight.
    Building,
    /// The host registered the object; calls are accepted.
    Live,
    /// The handle was released; the proxy is permanently dead.
    Released,
}

struct Link {
    state: ProxyState,
    handle: Option<HandleId>,
}

/// Client-side proxy enforcing the partition capability contract for a
/// host-resident object.
///
/// The callable sits behind a mutex only so the proxy stays `Sync` while
/// holding a `Send`-only native object; it is read exactly once, at
/// build time.
pub struct PartitionProxy {
    client: Client,
    callable: Mutex<Option<LocalCallable>>,
    link: Mutex<Link>,
}

impl PartitionProxy {
    /// Wraps a callable that still needs to be shipped. The proxy starts
    /// `Unbuilt`; call [`PartitionProxy::build`] before anything else.
    pub fn new(client: Client, callable: LocalCallable) -> Self {
        Self {
            client,
            callable: Mutex::new(Some(callable)),
            link: Mutex::new(Link { state: ProxyState::Unbuilt, handle: None }),
        }
    }

    /// Wraps a handle that is already live on the host, e.g. one shared
    /// by another proxy. The new proxy does not own the handle's
    /// lifecycle any more than the original does.
    pub fn from_handle(client: Client, handle: HandleId) -> Self {
        Self {
            client,
            callable: Mutex::new(None),
            link: Mutex::new(Link { state: ProxyState::Live, handle: Some(handle) }),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ProxyState {
        self.link.lock().state
    }

    /// The raw handle, while live.
    pub fn handle(&self) -> Option<HandleId> {
        let link = self.link.lock();
        match link.state {
            ProxyState::Live => link.handle,
            _ => None,
        }
    }

    /// Serializes the callable, ships it, and goes live with the handle
    /// the host returns.
    ///
    /// Fails with `InvalidState` unless the proxy is `Unbuilt`. A failed
    /// build reverts to `Unbuilt`; nothing retries implicitly, but an
    /// explicit second `build` is allowed.
    pub async fn build(&self) -> Result<HandleId> {
        {
            let mut link = self.link.lock();
            if link.state != ProxyState::Unbuilt {
                return Err(CallError::InvalidState { state: link.state });
            }
            link.state = ProxyState::Building;
        }

        let outcome = self.ship().await;

        let mut link = self.link.lock();
        match outcome {
            Ok(handle) => {
                link.state = ProxyState::Live;
                link.handle = Some(handle);
                Ok(handle)
            }
            Err(e) => {
                link.state = ProxyState::Unbuilt;
                Err(e)
            }
        }
    }

    async fn ship(&self) -> Result<HandleId> {
        let payload = {
            let callable = self.callable.lock();
            let callable = callable.as_ref().ok_or(CallError::InvalidState {
                state: ProxyState::Building,
            })?;
            serialize(callable)?
        };
        self.client.build(&payload).await
    }

    /// Forwards `prepare` to the remote object.
    pub async fn prepare(
        &self,
        sources: &BTreeSet<i64>,
        destinations: &BTreeSet<i64>,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let args = [id_list(sources), id_list(destinations)];
        self.client.call(handle, "prepare", &args).await?;
        Ok(())
    }

    /// Forwards `partition` to the remote object and returns the chosen
    /// destination.
    pub async fn partition(&self, source_index: i64, value: &Value) -> Result<i64> {
        let handle = self.live_handle()?;
        let args = [Value::Int(source_index), value.clone()];
        expect_int(self.client.call(handle, "partition", &args).await?)
    }

    /// Forwards `commit` to the remote object.
    pub async fn commit(&self, source_index: i64, partition: i64) -> Result<i64> {
        let handle = self.live_handle()?;
        let args = [Value::Int(source_index), Value::Int(partition)];
        expect_int(self.client.call(handle, "commit", &args).await?)
    }

    /// Always `true`, answered locally: a proxy is by definition backed
    /// by a remote object, whatever that object would say for itself.
    /// This never touches the transport and works in every lifecycle
    /// state.
    pub fn pre_defined(&self) -> bool {
        true
    }

    /// Releases the handle on the host and kills this proxy.
    ///
    /// Calling release on an already-released proxy is an `Ok` no-op,
    /// mirroring the registry's idempotence. A transport failure leaves
    /// the proxy live so the caller can retry explicitly.
    pub async fn release(&self) -> Result<()> {
        let handle = {
            let link = self.link.lock();
            match link.state {
                ProxyState::Released => return Ok(()),
                ProxyState::Live => link.handle.expect("live proxies hold a handle"),
                state => return Err(CallError::InvalidState { state }),
            }
        };

        self.client.release(handle).await?;

        let mut link = self.link.lock();
        link.state = ProxyState::Released;
        link.handle = None;
        Ok(())
    }

    fn live_handle(&self) -> Result<HandleId> {
        let link = self.link.lock();
        match link.state {
            ProxyState::Live => Ok(link.handle.expect("live proxies hold a handle")),
            state => Err(CallError::InvalidState { state }),
        }
    }
}

fn id_list(ids: &BTreeSet<i64>) -> Value {
    Value::List(ids.iter().copied().map(Value::Int).collect())
}

fn expect_int(value: Value) -> Result<i64> {
    match value {
        Value::Int(v) => Ok(v),
        other => Err(CallError::UnexpectedReply(format!(
            "expected an int, got {}",
            other.type_desc()
        ))),
    }
}
