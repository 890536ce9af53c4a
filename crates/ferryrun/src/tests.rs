//! Tests for the proxy and client with mock transports.

use std::sync::Arc;
use std::time::Duration;

use ferrypack::Encoder;
use ferryrpc::Fault;
use ferryrpc::FaultKind;
use ferryrpc::ReplyErrEncoder;
use ferryrpc::ReplyOkEncoder;
use ferryrpc::Value;
use ferryrpc::peek_seq;

use crate::client::CallError;
use crate::client::Client;
use crate::dispatch::Dispatcher;
use crate::mock_transport::CountingTransport;
use crate::mock_transport::LoopbackTransport;
use crate::payload::LocalCallable;
use crate::proxy::PartitionProxy;
use crate::proxy::ProxyState;
use crate::registry::Registry;
use crate::transport;
use crate::transport::Transport;
use crate::transport::TransportError;

/// Builds a client wired straight into a fresh in-process host.
fn loopback_client() -> (Client, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::new(registry.clone());
    let client = Client::new(Arc::new(LoopbackTransport::new(dispatcher)));
    (client, registry)
}

/// Mock transport that answers every request with a fixed fault.
struct FaultTransport {
    kind: FaultKind,
}

#[async_trait::async_trait]
impl Transport for FaultTransport {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        let seq = peek_seq(payload).unwrap();
        let fault = Fault::new(self.kind, "synthetic failure");
        let mut enc = Encoder::new();
        ReplyErrEncoder::new(seq, &fault).encode(&mut enc).unwrap();
        Ok(enc.into_bytes().unwrap())
    }
}

/// Mock transport that replies with the wrong sequence number.
/// Note: hardcoded `seq = 999`; tests must use a different one.
struct WrongSeqTransport;

#[async_trait::async_trait]
impl Transport for WrongSeqTransport {
    async fn call(&self, _payload: &[u8]) -> transport::Result<Vec<u8>> {
        let mut enc = Encoder::new();
        ReplyOkEncoder::new(999, &Value::Int(1)).encode(&mut enc).unwrap();
        Ok(enc.into_bytes().unwrap())
    }
}

/// Mock transport that returns bytes no decoder will accept.
struct GarbageTransport;

#[async_trait::async_trait]
impl Transport for GarbageTransport {
    async fn call(&self, _payload: &[u8]) -> transport::Result<Vec<u8>> {
        Ok(vec![0xFF, 0xFF, 0xFF])
    }
}

/// Mock transport that fails immediately at the byte-moving layer.
struct DeadTransport;

#[async_trait::async_trait]
impl Transport for DeadTransport {
    async fn call(&self, _payload: &[u8]) -> transport::Result<Vec<u8>> {
        Err(TransportError::ConnectionLost("peer went away".into()))
    }
}

/// Mock transport that never answers.
struct StalledTransport;

#[async_trait::async_trait]
impl Transport for StalledTransport {
    async fn call(&self, _payload: &[u8]) -> transport::Result<Vec<u8>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("test timeout must fire first")
    }
}

// ============================================================================
//  LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_calls_rejected_before_build() {
    let (client, _registry) = loopback_client();
    let proxy = PartitionProxy::new(client, LocalCallable::modulo(4));

    assert_eq!(proxy.state(), ProxyState::Unbuilt);
    match proxy.partition(0, &Value::Int(7)).await {
        Err(CallError::InvalidState { state: ProxyState::Unbuilt }) => {}
        other => panic!("expected InvalidState(Unbuilt), got {:?}", other),
    }
}

#[tokio::test]
async fn test_calls_rejected_after_release() {
    let (client, _registry) = loopback_client();
    let proxy = PartitionProxy::new(client, LocalCallable::modulo(4));
    proxy.build().await.unwrap();
    proxy.release().await.unwrap();

    assert_eq!(proxy.state(), ProxyState::Released);
    match proxy.commit(0, 1).await {
        Err(CallError::InvalidState { state: ProxyState::Released }) => {}
        other => panic!("expected InvalidState(Released), got {:?}", other),
    }
}

#[tokio::test]
async fn test_double_build_rejected() {
    let (client, _registry) = loopback_client();
    let proxy = PartitionProxy::new(client, LocalCallable::modulo(4));
    proxy.build().await.unwrap();

    match proxy.build().await {
        Err(CallError::InvalidState { state: ProxyState::Live }) => {}
        other => panic!("expected InvalidState(Live), got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_build_reverts_to_unbuilt() {
    let client = Client::new(Arc::new(DeadTransport));
    let proxy = PartitionProxy::new(client, LocalCallable::modulo(4));

    match proxy.build().await {
        Err(CallError::Transport(TransportError::ConnectionLost(_))) => {}
        other => panic!("expected Transport error, got {:?}", other),
    }
    assert_eq!(proxy.state(), ProxyState::Unbuilt);
}

#[tokio::test]
async fn test_release_is_idempotent_on_the_proxy() {
    let (client, registry) = loopback_client();
    let proxy = PartitionProxy::new(client, LocalCallable::load_balanced());
    proxy.build().await.unwrap();

    proxy.release().await.unwrap();
    proxy.release().await.unwrap();
    assert!(registry.is_empty());
}

// ============================================================================
//  PRE_DEFINED: THE LOCAL EXCEPTION
// ============================================================================

#[tokio::test]
async fn test_pre_defined_makes_zero_transport_calls() {
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::new(registry);
    let counting = Arc::new(CountingTransport::new(Arc::new(LoopbackTransport::new(
        dispatcher,
    ))));
    let client = Client::new(counting.clone());
    let proxy = PartitionProxy::new(client, LocalCallable::modulo(2));

    // Answered locally in every lifecycle state.
    assert!(proxy.pre_defined());
    assert_eq!(counting.calls(), 0);

    proxy.build().await.unwrap();
    let before = counting.calls();
    assert!(proxy.pre_defined());
    assert!(proxy.pre_defined());
    assert_eq!(counting.calls(), before);

    proxy.release().await.unwrap();
    assert!(proxy.pre_defined());
}

// ============================================================================
//  ERROR TRANSLATION
// ============================================================================

#[tokio::test]
async fn test_remote_fault_re_raised() {
    let client = Client::new(Arc::new(FaultTransport { kind: FaultKind::RemoteExecution }));
    let proxy = PartitionProxy::new(client, LocalCallable::modulo(4));

    match proxy.build().await {
        Err(CallError::Remote(fault)) => {
            assert_eq!(fault.kind, FaultKind::RemoteExecution);
            assert_eq!(fault.message, "synthetic failure");
        }
        other => panic!("expected Remote fault, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sequence_mismatch_detected() {
    let client = Client::new(Arc::new(WrongSeqTransport));

    match client.call(crate::registry::HandleId(1), "commit", &[]).await {
        Err(CallError::SequenceMismatch { received: 999, .. }) => {}
        other => panic!("expected SequenceMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_garbage_reply_is_protocol_error() {
    let client = Client::new(Arc::new(GarbageTransport));

    match client.call(crate::registry::HandleId(1), "commit", &[]).await {
        Err(CallError::Rpc(_)) => {}
        other => panic!("expected Rpc error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_transport_times_out() {
    let client = Client::new(Arc::new(StalledTransport)).with_timeout(Duration::from_millis(50));

    match client.call(crate::registry::HandleId(1), "commit", &[]).await {
        Err(CallError::Transport(TransportError::Timeout)) => {}
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_native_callable_cannot_ship() {
    use crate::partition::LoadBalancedFn;

    let (client, registry) = loopback_client();
    let proxy = PartitionProxy::new(client, LocalCallable::Native(Box::new(LoadBalancedFn::new())));

    match proxy.build().await {
        Err(CallError::Payload(crate::payload::PayloadError::UnsupportedObject(_))) => {}
        other => panic!("expected UnsupportedObject, got {:?}", other),
    }
    assert_eq!(proxy.state(), ProxyState::Unbuilt);
    assert!(registry.is_empty());
}
