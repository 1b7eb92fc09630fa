use async_trait::async_trait;
use ferrous_backend_application::ports::Resolver;
use ferrous_backend_domain::{LookupError, Query, Record};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Resolver
// ============================================================================

#[derive(Clone)]
pub struct MockResolver {
    records: Arc<Mutex<Vec<Record>>>,
    seen: Arc<Mutex<Vec<Query>>>,
    call_count: Arc<AtomicU64>,
    should_fail: Arc<AtomicBool>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            seen: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicU64::new(0)),
            should_fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing() -> Self {
        let resolver = Self::new();
        resolver.set_should_fail(true);
        resolver
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn seen_queries(&self) -> Vec<Query> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn lookup(&self, query: &Query) -> Result<Vec<Record>, LookupError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(query.clone());
        if self.should_fail.load(Ordering::SeqCst) {
            return Err("mock resolver failure".into());
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

pub fn example_record() -> Record {
    Record::new("example.com", "IN", "A", 300, -1, "93.184.216.34")
}

pub const EXAMPLE_QUERY_V1: &str = "Q\twww.example.com\tIN\tA\t-1\t8.8.8.8";
pub const EXAMPLE_DATA_LINE: &str = "DATA\texample.com\tIN\tA\t300\t-1\t93.184.216.34";
