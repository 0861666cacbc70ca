//! Recording test doubles for the client traits

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use node_engine::{Closeable, NodeEngineError, Result};
use serde_json::{json, Value};

use super::{
    DocumentConnector, DocumentSession, FindOptions, QueryRows, RelationalConnector, RelationalSession,
    UpdateOutcome,
};

/// Counters shared between a fake connector and the test
#[derive(Debug, Default)]
pub struct SessionStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl SessionStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

/// How a fake session answers operations
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Hang,
}

impl Behavior {
    async fn apply(&self) -> Result<()> {
        match self {
            Self::Succeed => Ok(()),
            Self::Fail(message) => Err(NodeEngineError::operation(message.clone())),
            Self::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }
}

pub struct FakeRelational {
    pub stats: Arc<SessionStats>,
    rows: QueryRows,
    behavior: Behavior,
    /// Number of initial connects that fail
    connect_failures: usize,
}

impl FakeRelational {
    pub fn returning(rows: QueryRows) -> Self {
        Self {
            stats: Arc::new(SessionStats::default()),
            rows,
            behavior: Behavior::Succeed,
            connect_failures: 0,
        }
    }

    pub fn behaving(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn failing_connects(mut self, count: usize) -> Self {
        self.connect_failures = count;
        self
    }
}

#[async_trait]
impl RelationalConnector for FakeRelational {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelationalSession>> {
        let attempt = self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if attempt < self.connect_failures {
            return Err(NodeEngineError::connection(format!("{} refused", url)));
        }
        Ok(Box::new(FakeRelationalSession {
            stats: self.stats.clone(),
            rows: self.rows.clone(),
            behavior: self.behavior.clone(),
        }))
    }
}

struct FakeRelationalSession {
    stats: Arc<SessionStats>,
    rows: QueryRows,
    behavior: Behavior,
}

#[async_trait]
impl Closeable for FakeRelationalSession {
    async fn close(&mut self) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RelationalSession for FakeRelationalSession {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryRows> {
        self.stats.record(format!("{} {}", sql, Value::Array(params.to_vec())));
        self.behavior.apply().await?;
        Ok(self.rows.clone())
    }
}

pub struct FakeDocument {
    pub stats: Arc<SessionStats>,
    documents: Vec<Value>,
    behavior: Behavior,
}

impl FakeDocument {
    pub fn with_documents(documents: Vec<Value>) -> Self {
        Self {
            stats: Arc::new(SessionStats::default()),
            documents,
            behavior: Behavior::Succeed,
        }
    }

    pub fn behaving(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }
}

#[async_trait]
impl DocumentConnector for FakeDocument {
    async fn connect(&self, _uri: &str, database: &str) -> Result<Box<dyn DocumentSession>> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        self.stats.record(format!("connect {}", database));
        Ok(Box::new(FakeDocumentSession {
            stats: self.stats.clone(),
            documents: self.documents.clone(),
            behavior: self.behavior.clone(),
        }))
    }
}

struct FakeDocumentSession {
    stats: Arc<SessionStats>,
    documents: Vec<Value>,
    behavior: Behavior,
}

#[async_trait]
impl Closeable for FakeDocumentSession {
    async fn close(&mut self) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DocumentSession for FakeDocumentSession {
    async fn find(&mut self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        self.stats.record(format!("find {} {}", collection, filter));
        self.behavior.apply().await?;
        let limit = options.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(self.documents.iter().take(limit).cloned().collect())
    }

    async fn insert(&mut self, collection: &str, documents: &[Value]) -> Result<Vec<Value>> {
        self.stats.record(format!("insert {} {}", collection, documents.len()));
        self.behavior.apply().await?;
        Ok((0..documents.len()).map(|i| json!(format!("id-{}", i))).collect())
    }

    async fn update(
        &mut self,
        collection: &str,
        filter: &Value,
        _update: &Value,
        many: bool,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        self.stats
            .record(format!("update {} {} many={} upsert={}", collection, filter, many, upsert));
        self.behavior.apply().await?;
        let matched = if many { self.documents.len() as u64 } else { 1 };
        Ok(UpdateOutcome {
            matched_count: matched,
            modified_count: matched,
            upserted_id: None,
        })
    }

    async fn delete(&mut self, collection: &str, filter: &Value, many: bool) -> Result<u64> {
        self.stats.record(format!("delete {} {} many={}", collection, filter, many));
        self.behavior.apply().await?;
        Ok(if many { self.documents.len() as u64 } else { 1 })
    }

    async fn aggregate(&mut self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>> {
        self.stats
            .record(format!("aggregate {} {} stages", collection, pipeline.len()));
        self.behavior.apply().await?;
        Ok(self.documents.clone())
    }

    async fn count(&mut self, collection: &str, filter: &Value) -> Result<u64> {
        self.stats.record(format!("count {} {}", collection, filter));
        self.behavior.apply().await?;
        Ok(self.documents.len() as u64)
    }
}
