pub mod memory;

pub use memory::InMemoryRegistry;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Opaque comparable token identifying a backend within the Registry.
/// `Arc<str>` so clones are an atomic refcount bump, not a heap copy —
/// the same reasoning this codebase family applies to cluster names.
pub type BackendId = Arc<str>;

/// An addressable application instance. Backends are created and destroyed
/// by the Registry; the dispatcher only ever holds short-lived, cloned
/// snapshots of this struct — never a reference into live Registry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub id: BackendId,
    /// Canonical "host:port" dial target.
    pub address: String,
    /// Stable private instance identifier; may be empty.
    pub private_instance_id: String,
}

/// Read-only capability the dispatcher holds onto the backend fleet.
///
/// The real population mechanism (a membership bus feeding `upsert`/`remove`
/// on some concrete implementation) is out of scope for this core; this
/// trait is the seam such a feed would drive. `InMemoryRegistry` is the one
/// concrete implementation shipped here, primarily so the dispatch path has
/// something real to run against in tests.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Eligible backend IDs for a request fingerprint (the `Host` header,
    /// normalized). Returns an empty vec when the host is unknown.
    async fn lookup_ids(&self, fingerprint: &str) -> Vec<BackendId>;

    /// Resolve a single backend ID. `None` means the backend has since been
    /// evicted — callers must treat this as a race, not an error.
    async fn lookup_by_id(&self, id: &BackendId) -> Option<Backend>;

    /// Resolve a batch of IDs in one pass. Must not be equivalent to N
    /// sequential `lookup_by_id` calls with interleaved mutations visible
    /// between them — the Selector's sticky-hit search depends on seeing a
    /// single consistent snapshot.
    async fn lookup_by_ids(&self, ids: &[BackendId]) -> Vec<Backend>;

    /// Fire-and-forget accounting hook: a request was dispatched to `backend`
    /// at `start`. Must not block or fail the caller.
    fn capture_backend_request(&self, backend: &Backend, start: Instant);
}
