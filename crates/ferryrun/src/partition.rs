// crates/ferryrun/src/partition.rs
//! # Partition Capability
//!
//! The fixed method contract a proxied object must satisfy: `prepare`,
//! `partition`, `commit`, and `pre_defined`. Anything implementing
//! [`PartitionFn`] can live in the host registry and be driven through
//! the dispatcher; the built-in partitioners here are the materialized
//! forms of the shippable operation specs.
//!
//! ## Invariants
//!
//! - `partition` must return a destination for every value it accepts, or
//!   fail with an [`ExecError`]; it never panics by contract (panics are
//!   still contained at the dispatch boundary).
//! - Sources and destinations are unordered collections of unique worker
//!   ids. `BTreeSet` keeps iteration deterministic, which the round-robin
//!   partitioner relies on.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use ferrypack::Encoder;
use ferryrpc::Value;
use ferryrpc::encode_value;

/// A failure raised by a partition function during execution.
///
/// Carries the message only. Stack context never crosses the boundary,
/// so none is collected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    pub message: String,
}

impl ExecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExecError {}

pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// The capability set of a proxied partition function.
///
/// Implementations are duck-typed in the source system; here the contract
/// is a trait at the seam, checked at compile time.
pub trait PartitionFn: Send + 'static {
    /// Announces the participating source and destination worker ids.
    fn prepare(&mut self, sources: &BTreeSet<i64>, destinations: &BTreeSet<i64>)
    -> ExecResult<()>;

    /// Picks the destination partition for a value emitted by
    /// `source_index`.
    fn partition(&mut self, source_index: i64, value: &Value) -> ExecResult<i64>;

    /// Acknowledges that `partition` was routed; returns the final
    /// partition.
    fn commit(&mut self, source_index: i64, partition: i64) -> ExecResult<i64>;

    /// Whether this object is one of the pre-defined partitioners, as
    /// opposed to user-defined logic.
    fn pre_defined(&self) -> bool;
}

/// Round-robins values across the destinations announced by `prepare`.
#[derive(Debug, Default)]
pub struct LoadBalancedFn {
    destinations: Vec<i64>,
    cursor: usize,
}

impl LoadBalancedFn {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartitionFn for LoadBalancedFn {
    fn prepare(
        &mut self,
        _sources: &BTreeSet<i64>,
        destinations: &BTreeSet<i64>,
    ) -> ExecResult<()> {
        if destinations.is_empty() {
            return Err(ExecError::new("load-balanced partitioner needs at least one destination"));
        }
        self.destinations = destinations.iter().copied().collect();
        self.cursor = 0;
        Ok(())
    }

    fn partition(&mut self, _source_index: i64, _value: &Value) -> ExecResult<i64> {
        if self.destinations.is_empty() {
            return Err(ExecError::new("load-balanced partitioner used before prepare"));
        }
        let dest = self.destinations[self.cursor % self.destinations.len()];
        self.cursor += 1;
        Ok(dest)
    }

    fn commit(&mut self, _source_index: i64, partition: i64) -> ExecResult<i64> {
        Ok(partition)
    }

    fn pre_defined(&self) -> bool {
        true
    }
}

/// Routes a value to `key(value) mod buckets`.
///
/// Integer values are their own key; everything else is keyed by a stable
/// content hash, so the same value lands in the same bucket on every
/// host.
#[derive(Debug)]
pub struct ModuloFn {
    buckets: u32,
}

impl ModuloFn {
    pub fn new(buckets: u32) -> Self {
        Self { buckets }
    }
}

impl PartitionFn for ModuloFn {
    fn prepare(
        &mut self,
        _sources: &BTreeSet<i64>,
        _destinations: &BTreeSet<i64>,
    ) -> ExecResult<()> {
        // Bucket count is captured state; prepare has nothing to record.
        Ok(())
    }

    fn partition(&mut self, _source_index: i64, value: &Value) -> ExecResult<i64> {
        if self.buckets == 0 {
            return Err(ExecError::new("modulo partitioner has zero buckets"));
        }
        Ok(stable_key(value).rem_euclid(i64::from(self.buckets)))
    }

    fn commit(&mut self, _source_index: i64, partition: i64) -> ExecResult<i64> {
        Ok(partition)
    }

    fn pre_defined(&self) -> bool {
        true
    }
}

/// Routes integer keys through an explicit table, with a fallback
/// partition for unmapped keys.
#[derive(Debug)]
pub struct TableFn {
    routes: BTreeMap<i64, i64>,
    fallback: i64,
}

impl TableFn {
    pub fn new(routes: BTreeMap<i64, i64>, fallback: i64) -> Self {
        Self { routes, fallback }
    }
}

impl PartitionFn for TableFn {
    fn prepare(
        &mut self,
        _sources: &BTreeSet<i64>,
        _destinations: &BTreeSet<i64>,
    ) -> ExecResult<()> {
        Ok(())
    }

    fn partition(&mut self, _source_index: i64, value: &Value) -> ExecResult<i64> {
        match value {
            Value::Int(key) => Ok(self.routes.get(key).copied().unwrap_or(self.fallback)),
            other => Err(ExecError::new(format!(
                "table partitioner requires integer values, got {}",
                other.type_desc()
            ))),
        }
    }

    fn commit(&mut self, _source_index: i64, partition: i64) -> ExecResult<i64> {
        Ok(partition)
    }

    fn pre_defined(&self) -> bool {
        true
    }
}

/// A stable 64-bit key for a wire value.
///
/// Integers map to themselves. Other values are FNV-1a hashed over their
/// canonical ferrypack encoding. The std hashers are seeded per process,
/// which would break the cross-runtime contract; FNV's constants are
/// fixed forever.
pub fn stable_key(value: &Value) -> i64 {
    if let Value::Int(v) = value {
        return *v;
    }

    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut enc = Encoder::new();
    // Values bound for the wire already passed the depth check; a value
    // too deep to encode keys as its shape description instead.
    let bytes = match encode_value(&mut enc, value) {
        Ok(()) => enc.into_bytes().unwrap_or_default(),
        Err(_) => value.type_desc().as_bytes().to_vec(),
    };

    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as i64
}
