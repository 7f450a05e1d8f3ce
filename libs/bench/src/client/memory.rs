//! Process-local database stand-in.
//!
//! Keeps row counts and collection lifecycle flags only; it does not store
//! vectors or rank anything. Search returns the first `topk` row ids for
//! every query. Fault knobs let tests drive the runner into each failure
//! path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::DatabaseClient;
use crate::schema::{
    CollectionSpec, CollectionStats, Hit, InsertBatch, LoadState, SearchHits, SearchRequest,
};

/// Client operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    HasCollection,
    DropCollection,
    CreateCollection,
    Insert,
    Flush,
    GetStats,
    CreateIndex,
    LoadCollection,
    LoadState,
    Search,
}

#[derive(Debug, Clone)]
struct MemoryCollection {
    spec: CollectionSpec,
    pending_rows: u64,
    rows: u64,
    indexed: bool,
    load_requested: bool,
    load_polls: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<String, MemoryCollection>,
    calls: Vec<Operation>,

    // Fault injection
    fail_on: Option<(Operation, usize)>,
    lost_rows: u64,
    ignore_create: bool,
    loading_polls: u32,
    search_hit_lists: Option<usize>,
}

/// In-memory [`DatabaseClient`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClient {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` (0-based) call of `op`.
    pub fn with_failure(self, op: Operation, nth: usize) -> Self {
        self.lock().fail_on = Some((op, nth));
        self
    }

    /// Silently drop `n` rows at flush time.
    pub fn with_lost_rows(self, n: u64) -> Self {
        self.lock().lost_rows = n;
        self
    }

    /// Accept `create_collection` without creating anything.
    pub fn with_ignored_create(self) -> Self {
        self.lock().ignore_create = true;
        self
    }

    /// Report `Loading` for the first `polls` load state queries after a load.
    pub fn with_loading_polls(self, polls: u32) -> Self {
        self.lock().loading_polls = polls;
        self
    }

    /// Return this many hit lists from every search regardless of `nq`.
    pub fn with_search_hit_lists(self, n: usize) -> Self {
        self.lock().search_hit_lists = Some(n);
        self
    }

    /// Pre-create a collection, as if left over from an earlier run.
    pub fn with_existing_collection(self, spec: CollectionSpec, rows: u64) -> Self {
        self.lock().collections.insert(
            spec.name.clone(),
            MemoryCollection {
                spec,
                pending_rows: 0,
                rows,
                indexed: false,
                load_requested: false,
                load_polls: 0,
            },
        );
        self
    }

    /// Operations issued so far, in call order.
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    /// Number of times `op` was called.
    pub fn call_count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Flushed row count of a collection, if it exists.
    pub fn row_count(&self, name: &str) -> Option<u64> {
        self.lock().collections.get(name).map(|c| c.rows)
    }

    /// Whether an index was built on the collection.
    pub fn is_indexed(&self, name: &str) -> bool {
        self.lock()
            .collections
            .get(name)
            .map(|c| c.indexed)
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain counters behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the call and apply any injected failure.
    fn enter(&self, op: Operation) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        let nth = state.calls.iter().filter(|c| **c == op).count();
        state.calls.push(op);
        if state.fail_on == Some((op, nth)) {
            bail!("injected failure in {:?} (call #{})", op, nth);
        }
        Ok(state)
    }
}

fn collection<'a>(state: &'a mut MemoryState, name: &str) -> Result<&'a mut MemoryCollection> {
    state
        .collections
        .get_mut(name)
        .ok_or_else(|| anyhow!("collection not found: {}", name))
}

#[async_trait]
impl DatabaseClient for InMemoryClient {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let state = self.enter(Operation::HasCollection)?;
        Ok(state.collections.contains_key(name))
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let mut state = self.enter(Operation::DropCollection)?;
        state
            .collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| anyhow!("collection not found: {}", name))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut state = self.enter(Operation::CreateCollection)?;
        if state.ignore_create {
            return Ok(());
        }
        if state.collections.contains_key(&spec.name) {
            bail!("collection already exists: {}", spec.name);
        }
        state.collections.insert(
            spec.name.clone(),
            MemoryCollection {
                spec: spec.clone(),
                pending_rows: 0,
                rows: 0,
                indexed: false,
                load_requested: false,
                load_polls: 0,
            },
        );
        Ok(())
    }

    async fn insert(&self, spec: &CollectionSpec, batch: &InsertBatch) -> Result<u64> {
        let mut state = self.enter(Operation::Insert)?;
        let coll = collection(&mut state, &spec.name)?;
        if let Some(v) = batch.vectors().iter().find(|v| v.len() != coll.spec.dim) {
            bail!(
                "dimension mismatch: collection {} expects {}, got {}",
                spec.name,
                coll.spec.dim,
                v.len()
            );
        }
        coll.pending_rows += batch.len() as u64;
        Ok(batch.len() as u64)
    }

    async fn flush(&self, names: &[&str]) -> Result<()> {
        let mut state = self.enter(Operation::Flush)?;
        let lost = state.lost_rows;
        for name in names {
            let coll = collection(&mut state, name)?;
            coll.rows += coll.pending_rows.saturating_sub(lost);
            coll.pending_rows = 0;
        }
        Ok(())
    }

    async fn get_stats(&self, name: &str) -> Result<CollectionStats> {
        let mut state = self.enter(Operation::GetStats)?;
        let coll = collection(&mut state, name)?;
        Ok(CollectionStats {
            row_count: coll.rows,
        })
    }

    async fn create_index(&self, spec: &CollectionSpec) -> Result<()> {
        let mut state = self.enter(Operation::CreateIndex)?;
        let coll = collection(&mut state, &spec.name)?;
        if coll.spec.field != spec.field {
            bail!("field not found: {}", spec.field);
        }
        coll.indexed = true;
        Ok(())
    }

    async fn load_collection(&self, name: &str) -> Result<()> {
        let mut state = self.enter(Operation::LoadCollection)?;
        let coll = collection(&mut state, name)?;
        coll.load_requested = true;
        coll.load_polls = 0;
        Ok(())
    }

    async fn load_state(&self, name: &str) -> Result<LoadState> {
        let mut state = self.enter(Operation::LoadState)?;
        let loading_polls = state.loading_polls;
        let coll = collection(&mut state, name)?;
        if !coll.load_requested {
            return Ok(LoadState::NotLoaded);
        }
        if coll.load_polls < loading_polls {
            coll.load_polls += 1;
            let progress = u64::from(coll.load_polls) * 100 / (u64::from(loading_polls) + 1);
            return Ok(LoadState::Loading(Some(progress as u8)));
        }
        Ok(LoadState::Loaded)
    }

    async fn search(
        &self,
        spec: &CollectionSpec,
        request: &SearchRequest,
        queries: &[Vec<f32>],
    ) -> Result<SearchHits> {
        let mut state = self.enter(Operation::Search)?;
        let hit_lists = state.search_hit_lists;
        let coll = collection(&mut state, &spec.name)?;
        if !coll.load_requested {
            bail!("collection not loaded: {}", spec.name);
        }
        if queries.iter().any(|q| q.len() != coll.spec.dim) {
            bail!("query dimension mismatch for {}", spec.name);
        }
        let per_query_hits = (request.topk as u64).min(coll.rows);
        let hits: Vec<Hit> = (0..per_query_hits)
            .map(|id| Hit {
                id: id as i64,
                distance: id as f32,
            })
            .collect();
        let lists = hit_lists.unwrap_or(queries.len());
        Ok(SearchHits {
            per_query: vec![hits; lists],
        })
    }
}
