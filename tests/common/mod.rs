//! Shared fakes for integration tests
//!
//! [`FakeSource`] serves a canned result set; [`FakeDownstream`] keeps
//! delivered documents in memory keyed by the composite key.

#![allow(dead_code)]

use async_trait::async_trait;
use erp_sync::adapters::downstream::{DownstreamResponse, DownstreamStore};
use erp_sync::adapters::source::{FetchQuery, SourceClient};
use erp_sync::domain::{CompositeKey, DownstreamError, Result, SourceError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// One source row with the fields validation requires
pub fn item(order: &str, line: i64, part: &str, qty: f64) -> Value {
    json!({
        "TXN_TYPE": "BOM",
        "CUST_ORDER_ID": order,
        "CUST_ORDER_LINE_NO": line,
        "BOM_PART_ID": part,
        "BOM_WORKORDER_BASE_ID": format!("WO-{order}"),
        "BOM_WORKORDER_SUB_ID": "0",
        "BOM_QTY": qty,
        "CUST_ORDER_DATE": "2024-01-15T00:00:00"
    })
}

pub fn key(order: &str, line: i64, part: &str) -> CompositeKey {
    CompositeKey {
        order_id: order.to_string(),
        line_no: line,
        part_id: part.to_string(),
    }
}

/// Source returning whatever items were last set
#[derive(Default)]
pub struct FakeSource {
    items: Mutex<Vec<Value>>,
    unavailable: AtomicBool,
    queries: Mutex<Vec<FetchQuery>>,
}

impl FakeSource {
    pub fn with_items(items: Vec<Value>) -> Self {
        let source = Self::default();
        source.set_items(items);
        source
    }

    pub fn set_items(&self, items: Vec<Value>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<FetchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Value>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("connection refused".to_string()).into());
        }
        Ok(self.items.lock().unwrap().clone())
    }

    fn endpoint(&self) -> &str {
        "http://erp.test/api/transactions"
    }
}

/// How the fake downstream rejects writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Status(u16),
    Connection,
}

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub document: Value,
}

/// In-memory downstream collection
#[derive(Default)]
pub struct FakeDownstream {
    records: Mutex<HashMap<CompositeKey, StoredDocument>>,
    failure: Mutex<Option<Failure>>,
    next_id: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    logins: AtomicUsize,
}

impl FakeDownstream {
    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Puts a record in place as if an earlier run had created it
    pub fn seed(&self, key: CompositeKey, document: Value) -> String {
        let id = self.allocate_id();
        self.records
            .lock()
            .unwrap()
            .insert(key, StoredDocument { id: id.clone(), document });
        id
    }

    pub fn get(&self, key: &CompositeKey) -> Option<StoredDocument> {
        self.records.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("rec{:05}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_failure(&self) -> Result<()> {
        match *self.failure.lock().unwrap() {
            Some(Failure::Status(status)) => Err(DownstreamError::HttpStatus {
                status,
                message: "{\"message\":\"rejected\"}".to_string(),
            }
            .into()),
            Some(Failure::Connection) => {
                Err(DownstreamError::ConnectionFailed("connection reset".to_string()).into())
            }
            None => Ok(()),
        }
    }
}

fn document_key(document: &Value) -> CompositeKey {
    key(
        document["CUST_ORDER_ID"].as_str().unwrap_or_default(),
        document["CUST_ORDER_LINE_NO"].as_i64().unwrap_or_default(),
        document["BOM_PART_ID"].as_str().unwrap_or_default(),
    )
}

#[async_trait]
impl DownstreamStore for FakeDownstream {
    async fn authenticate(&self) -> Result<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_key(&self, key: &CompositeKey) -> Result<Option<String>> {
        self.check_failure()?;
        Ok(self.records.lock().unwrap().get(key).map(|r| r.id.clone()))
    }

    async fn create(&self, document: &Value) -> Result<DownstreamResponse> {
        self.check_failure()?;
        let id = self.allocate_id();
        self.records.lock().unwrap().insert(
            document_key(document),
            StoredDocument {
                id: id.clone(),
                document: document.clone(),
            },
        );
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(DownstreamResponse {
            status: 200,
            body: json!({ "id": id }).to_string(),
        })
    }

    async fn update(&self, id: &str, document: &Value) -> Result<DownstreamResponse> {
        self.check_failure()?;
        let mut records = self.records.lock().unwrap();
        let Some(stored) = records.values_mut().find(|r| r.id == id) else {
            return Err(DownstreamError::HttpStatus {
                status: 404,
                message: format!("record {id} not found"),
            }
            .into());
        };
        stored.document = document.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(DownstreamResponse {
            status: 200,
            body: json!({ "id": id }).to_string(),
        })
    }
}
