//! Result & DLQ Store (C6): a `Store` trait mirroring the Redis-backed
//! key layout of `spec.md` §4.6, plus an in-memory reference
//! implementation used by tests and by embedders who have not wired a
//! real KV store.
//!
//! Key names are documented on the trait even though [`InMemoryStore`]
//! does not literally namespace by string key, so a Redis-backed
//! implementation can follow the same layout.

use crate::models::{DlqEntry, TriageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub index_size: usize,
    pub dlq_len: usize,
    pub result_ttl_seconds: u64,
}

/// Key-value store with TTL and sorted-set/index semantics.
///
/// Layout: `result:{uid}`, `task:{jobId}` (mapping to `uid`),
/// `results:index` (sorted set scored by `createdAt`), `dlq` (capped
/// list, newest first).
#[async_trait]
pub trait Store: Send + Sync {
    /// Sets `result:{uid}` (with TTL), adds it to `results:index`, and
    /// when `job_id` is supplied sets `task:{jobId}` with the same TTL.
    /// Best-effort: returns `false` on failure without raising.
    async fn save_result(&self, result: &TriageResult, job_id: Option<&str>) -> bool;

    async fn get_result(&self, uid: &str) -> Option<TriageResult>;

    /// Two-hop lookup: `task:{jobId}` -> uid -> `result:{uid}`.
    async fn get_result_by_job(&self, job_id: &str) -> Option<TriageResult>;

    /// LPUSH onto `dlq`, then LTRIM to the newest `dlq_max_entries`.
    async fn save_dlq(&self, entry: DlqEntry);

    /// LRANGE `dlq`, newest first.
    async fn get_dlq(&self, limit: usize) -> Vec<DlqEntry>;

    /// ZREVRANGE `results:index`, hydrating each member.
    async fn get_recent(&self, limit: usize) -> Vec<TriageResult>;

    async fn get_stats(&self) -> StoreStats;
}

struct Entry {
    result: TriageResult,
    created_at_epoch_ms: i64,
}

/// `tokio::sync::Mutex`-protected maps + a `BTreeMap` time index + a
/// `VecDeque` DLQ capped at `dlq_max_entries`. No real TTL eviction (no
/// background reaper); `result_ttl_seconds` is surfaced via
/// [`StoreStats`] only, matching the "the index is a hint, not a source
/// of truth" concurrency note in `spec.md` §4.6.
pub struct InMemoryStore {
    results: Mutex<HashMap<String, Entry>>,
    jobs: Mutex<HashMap<String, String>>,
    index: Mutex<BTreeMap<i64, Vec<String>>>,
    dlq: Mutex<VecDeque<DlqEntry>>,
    dlq_max_entries: usize,
    result_ttl_seconds: u64,
}

impl InMemoryStore {
    pub fn new(dlq_max_entries: usize, result_ttl_seconds: u64) -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            index: Mutex::new(BTreeMap::new()),
            dlq: Mutex::new(VecDeque::new()),
            dlq_max_entries,
            result_ttl_seconds,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_result(&self, result: &TriageResult, job_id: Option<&str>) -> bool {
        let epoch_ms = result.created_at.timestamp_millis();
        let uid = result.request_uid.clone();

        self.results.lock().await.insert(
            uid.clone(),
            Entry { result: result.clone(), created_at_epoch_ms: epoch_ms },
        );
        self.index.lock().await.entry(epoch_ms).or_default().push(uid.clone());

        if let Some(job_id) = job_id {
            self.jobs.lock().await.insert(job_id.to_string(), uid);
        }
        true
    }

    async fn get_result(&self, uid: &str) -> Option<TriageResult> {
        self.results.lock().await.get(uid).map(|e| e.result.clone())
    }

    async fn get_result_by_job(&self, job_id: &str) -> Option<TriageResult> {
        let uid = self.jobs.lock().await.get(job_id).cloned()?;
        self.get_result(&uid).await
    }

    async fn save_dlq(&self, entry: DlqEntry) {
        let mut dlq = self.dlq.lock().await;
        dlq.push_front(entry);
        while dlq.len() > self.dlq_max_entries {
            dlq.pop_back();
        }
    }

    async fn get_dlq(&self, limit: usize) -> Vec<DlqEntry> {
        self.dlq.lock().await.iter().take(limit).cloned().collect()
    }

    async fn get_recent(&self, limit: usize) -> Vec<TriageResult> {
        let index = self.index.lock().await;
        let results = self.results.lock().await;
        index
            .iter()
            .rev()
            .flat_map(|(_, uids)| uids.iter().rev())
            .filter_map(|uid| results.get(uid).map(|e| e.result.clone()))
            .take(limit)
            .collect()
    }

    async fn get_stats(&self) -> StoreStats {
        StoreStats {
            index_size: self.results.lock().await.len(),
            dlq_len: self.dlq.lock().await.len(),
            result_ttl_seconds: self.result_ttl_seconds,
        }
    }
}
