use super::{Backend, BackendId, Registry};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

/// In-memory, concurrent Registry — the runtime counterpart of whatever
/// external membership feed (service bus, Consul, etcd, ...) a production
/// deployment would plug in. A `DashMap` keyed by the routing fingerprint,
/// plus a flat by-ID map so that a single eviction only ever touches two
/// entries.
///
/// `upsert`/`remove` are the seam a membership feed would drive; nothing in
/// this crate calls them on a timer — that wiring is explicitly out of
/// scope (§1).
#[derive(Default)]
pub struct InMemoryRegistry {
    by_host: DashMap<String, HashSet<BackendId>>,
    by_id: DashMap<BackendId, Backend>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` as eligible for `host` (case-insensitive, port
    /// suffix ignored — see [`normalize_fingerprint`]).
    pub fn upsert(&self, host: &str, backend: Backend) {
        let host = normalize_fingerprint(host);
        self.by_host
            .entry(host)
            .or_default()
            .insert(backend.id.clone());
        self.by_id.insert(backend.id.clone(), backend);
    }

    /// Evict a backend entirely — from every host it was eligible for and
    /// from the by-ID table. Mirrors a membership bus delivering a "down"
    /// event.
    pub fn remove(&self, id: &BackendId) {
        self.by_id.remove(id);
        self.by_host.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Lower-case `host` and strip a trailing `:<port>` suffix, so
/// `example.com:8080` and `example.com` address the same eligible set.
fn normalize_fingerprint(host: &str) -> String {
    host.split_once(':')
        .map(|(h, _)| h)
        .unwrap_or(host)
        .to_ascii_lowercase()
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn lookup_ids(&self, fingerprint: &str) -> Vec<BackendId> {
        self.by_host
            .get(&normalize_fingerprint(fingerprint))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn lookup_by_id(&self, id: &BackendId) -> Option<Backend> {
        self.by_id.get(id).map(|entry| entry.value().clone())
    }

    async fn lookup_by_ids(&self, ids: &[BackendId]) -> Vec<Backend> {
        // Single pass over the by-ID map — no intervening awaits, so a
        // concurrent upsert/remove cannot produce a partially-visible batch
        // the way two separate round-trips could.
        ids.iter()
            .filter_map(|id| self.by_id.get(id).map(|e| e.value().clone()))
            .collect()
    }

    fn capture_backend_request(&self, backend: &Backend, start: Instant) {
        debug!(
            backend_id = %backend.id,
            backend_addr = %backend.address,
            elapsed_us = start.elapsed().as_micros(),
            "registry: backend request captured"
        );
    }
}
