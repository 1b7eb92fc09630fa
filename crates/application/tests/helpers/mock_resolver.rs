#![allow(dead_code)]

use async_trait::async_trait;
use ferrous_backend_application::ports::Resolver;
use ferrous_backend_domain::{LookupError, Query, Record};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// Mock Resolver
// ============================================================================

#[derive(Clone)]
pub struct MockResolver {
    records: Arc<RwLock<Vec<Record>>>,
    seen: Arc<RwLock<Vec<Query>>>,
    call_count: Arc<AtomicU64>,
    should_fail: Arc<RwLock<bool>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            seen: Arc::new(RwLock::new(Vec::new())),
            call_count: Arc::new(AtomicU64::new(0)),
            should_fail: Arc::new(RwLock::new(false)),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub async fn set_should_fail(&self, fail: bool) {
        *self.should_fail.write().await = fail;
    }

    pub async fn seen_queries(&self) -> Vec<Query> {
        self.seen.read().await.clone()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn lookup(&self, query: &Query) -> Result<Vec<Record>, LookupError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.seen.write().await.push(query.clone());
        if *self.should_fail.read().await {
            return Err("mock resolver failure".into());
        }
        Ok(self.records.read().await.clone())
    }
}

pub fn example_record() -> Record {
    Record::new("example.com", "IN", "A", 300, -1, "93.184.216.34")
}

pub fn example_query() -> Query {
    Query::new("Q", "www.example.com", "IN", "A", -1, "8.8.8.8")
}
