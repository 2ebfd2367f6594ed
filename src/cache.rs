//! Result cache for discovered module sets and dependency graphs.
//!
//! Keyed by `(package_root, tests_root)` with least-recently-used eviction.
//! Entries are shared as `Arc<DependencyGraph>`; a graph is immutable once
//! built, so readers never see a partially constructed value.
//!
//! The cache never changes results. A miss rebuilds exactly what a hit
//! would have returned for the same filesystem state; callers invalidate
//! when they know the tree changed, or enable fingerprint checks so every
//! lookup re-walks the roots and rebuilds on mismatch.

use crate::config::NamespaceConfig;
use crate::error::Result;
use crate::graph::{BuildOptions, DependencyGraph};
use crate::indexer::{self, DiscoveryOptions, scan};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type CacheKey = (PathBuf, Option<PathBuf>);

pub fn cache_key(namespace: &NamespaceConfig) -> CacheKey {
    (
        namespace.package_root().to_path_buf(),
        namespace.tests_root().map(Path::to_path_buf),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

struct Entry {
    graph: Arc<DependencyGraph>,
    build: BuildOptions,
    discovery: DiscoveryOptions,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<CacheKey, Entry>,
    // front = least recently used
    recency: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
    evictions: u64,
    // bumped by every invalidation; builds started before it are not stored
    generation: u64,
}

impl LruState {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key.clone());
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        self.generation += 1;
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.entries.remove(key).is_some()
    }
}

pub struct ResultCache {
    state: Mutex<LruState>,
    capacity: usize,
    check_fingerprint: bool,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::get().cache_capacity)
    }
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity: capacity.max(1),
            check_fingerprint: false,
        }
    }

    /// Re-walk the roots on every hit and rebuild when the file set changed.
    pub fn with_fingerprint_check(mut self, enabled: bool) -> Self {
        self.check_fingerprint = enabled;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        // state stays consistent across a panic in a caller's build
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached graph for the namespace, building it on a miss.
    ///
    /// The lock is not held while building; two threads missing on the same
    /// key both build and the later insert wins. Both graphs are identical.
    /// A build that overlaps any invalidation is returned to the
    /// caller but not stored.
    pub fn get_or_build(
        &self,
        namespace: &NamespaceConfig,
        build: &BuildOptions,
        discovery: &DiscoveryOptions,
    ) -> Result<Arc<DependencyGraph>> {
        let key = cache_key(namespace);
        let (cached, generation) = self.lookup(&key, build, discovery);

        if let Some(graph) = cached {
            if !self.check_fingerprint || self.is_fresh(&graph, namespace, discovery)? {
                self.lock().hits += 1;
                tracing::debug!(package_root = %key.0.display(), "graph cache hit");
                return Ok(graph);
            }
            tracing::info!(
                package_root = %key.0.display(),
                "module set changed on disk, rebuilding cached graph"
            );
        }

        let modules = indexer::discover_modules(namespace, discovery)?;
        let graph = Arc::new(DependencyGraph::build(namespace, modules, build)?);
        self.store(key, Arc::clone(&graph), build, discovery, generation);
        Ok(graph)
    }

    /// Entry matching the options, plus the generation the lookup saw.
    fn lookup(
        &self,
        key: &CacheKey,
        build: &BuildOptions,
        discovery: &DiscoveryOptions,
    ) -> (Option<Arc<DependencyGraph>>, u64) {
        let mut state = self.lock();
        let found = state
            .entries
            .get(key)
            .filter(|entry| entry.build == *build && entry.discovery == *discovery)
            .map(|entry| Arc::clone(&entry.graph));
        if found.is_some() {
            state.touch(key);
        }
        (found, state.generation)
    }

    /// Insert a freshly built graph unless the cache was invalidated since
    /// `generation` was read. Returns whether the graph was stored.
    fn store(
        &self,
        key: CacheKey,
        graph: Arc<DependencyGraph>,
        build: &BuildOptions,
        discovery: &DiscoveryOptions,
        generation: u64,
    ) -> bool {
        let mut state = self.lock();
        state.misses += 1;
        if state.generation != generation {
            tracing::debug!(
                package_root = %key.0.display(),
                "cache invalidated during build, not storing graph"
            );
            return false;
        }
        state.entries.insert(
            key.clone(),
            Entry {
                graph,
                build: *build,
                discovery: discovery.clone(),
            },
        );
        state.touch(&key);
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.recency.pop_front() else {
                break;
            };
            if state.entries.remove(&oldest).is_some() {
                state.evictions += 1;
                tracing::debug!(package_root = %oldest.0.display(), "evicted cached graph");
            }
        }
        true
    }

    fn is_fresh(
        &self,
        graph: &DependencyGraph,
        namespace: &NamespaceConfig,
        discovery: &DiscoveryOptions,
    ) -> Result<bool> {
        let current = scan::fingerprint_namespace(namespace, discovery.scan)?;
        Ok(current == graph.fingerprint())
    }

    /// Drop the entry for one namespace. Returns whether it was cached.
    pub fn invalidate(&self, namespace: &NamespaceConfig) -> bool {
        self.invalidate_key(&cache_key(namespace))
    }

    pub fn invalidate_key(&self, key: &CacheKey) -> bool {
        self.lock().remove(key)
    }

    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.entries.clear();
        state.recency.clear();
    }

    pub fn contains(&self, namespace: &NamespaceConfig) -> bool {
        self.lock().entries.contains_key(&cache_key(namespace))
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            entries: state.entries.len(),
            capacity: self.capacity,
        }
    }
}
