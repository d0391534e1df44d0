//! Collaborator contracts for persistence.
//!
//! The document store keeps schemaless JSON objects under `(collection, id)`
//! with a monotonically increasing version. All writes go through `commit`,
//! which applies a batch atomically and checks every write's precondition
//! first; this is what lets the lifecycle services replace blind
//! read-modify-write with conditional updates.

pub mod memory;
pub mod record;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::StoreError;

pub use memory::{MemoryBlobStore, MemoryStore};
pub use record::{from_document, load, load_required, to_data, Versioned};

/// A stored document and the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub data: Map<String, Value>,
}

/// Precondition for a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// The document must not exist yet.
    New,
    /// The document must currently be at exactly this version.
    Exactly(u64),
}

impl Revision {
    /// Version the document will carry after the write succeeds.
    pub fn next(self) -> u64 {
        match self {
            Revision::New => 1,
            Revision::Exactly(v) => v + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Put {
        collection: String,
        id: String,
        data: Map<String, Value>,
        revision: Revision,
    },
    Delete {
        collection: String,
        id: String,
        /// `None` deletes unconditionally.
        expected: Option<u64>,
    },
}

impl Write {
    pub fn put(
        collection: &str,
        id: &str,
        data: Map<String, Value>,
        revision: Revision,
    ) -> Self {
        Write::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            revision,
        }
    }

    pub fn delete(collection: &str, id: &str, expected: Option<u64>) -> Self {
        Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
            expected,
        }
    }

    pub fn target(&self) -> (&str, &str) {
        match self {
            Write::Put { collection, id, .. } | Write::Delete { collection, id, .. } => {
                (collection, id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        match self {
            Filter::Eq(field, expected) => data.get(field) == Some(expected),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }

    /// Sort and truncate documents that already passed the filters.
    /// Backends that cannot order server-side finish the query with this.
    pub fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some((field, direction)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(a.data.get(field), b.data.get(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Missing values sort first; strings and numbers compare naturally.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Keyed collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Apply all writes atomically. If any precondition fails nothing is
    /// written and `StoreError::Conflict` is returned.
    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    /// Create a document, generating an id when none is given.
    async fn create(
        &self,
        collection: &str,
        data: Map<String, Value>,
        id: Option<String>,
    ) -> Result<String, StoreError> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.commit(vec![Write::put(collection, &id, data, Revision::New)])
            .await?;
        Ok(id)
    }

    /// Create-or-merge: top-level keys of `partial` overwrite the stored ones.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        partial: Map<String, Value>,
    ) -> Result<(), StoreError> {
        const ATTEMPTS: usize = 5;
        let mut last_err = None;
        for _ in 0..ATTEMPTS {
            let (mut data, revision) = match self.get(collection, id).await? {
                Some(doc) => (doc.data, Revision::Exactly(doc.version)),
                None => (Map::new(), Revision::New),
            };
            for (k, v) in partial.clone() {
                data.insert(k, v);
            }
            match self
                .commit(vec![Write::put(collection, id, data, revision)])
                .await
            {
                Ok(()) => return Ok(()),
                Err(e @ StoreError::Conflict { .. }) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
        }))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.commit(vec![Write::delete(collection, id, None)]).await
    }
}

/// Path-keyed binary storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any previous object, and return its public URL.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}
