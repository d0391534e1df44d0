use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{Document, DocumentStore, Revision};
use crate::error::{KlusError, Result, StoreError};

/// A typed record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn revision(&self) -> Revision {
        Revision::Exactly(self.version)
    }
}

pub fn from_document<T: DeserializeOwned>(collection: &str, doc: Document) -> Result<Versioned<T>> {
    let id = doc.id.clone();
    let value = serde_json::from_value(Value::Object(doc.data)).map_err(|e| {
        KlusError::Store(StoreError::Malformed {
            collection: collection.to_string(),
            id,
            reason: e.to_string(),
        })
    })?;
    Ok(Versioned {
        value,
        version: doc.version,
    })
}

pub fn to_data<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(KlusError::Validation(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<Versioned<T>>> {
    match store.get(collection, id).await? {
        Some(doc) => from_document(collection, doc).map(Some),
        None => Ok(None),
    }
}

pub async fn load_required<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    kind: &'static str,
    id: &str,
) -> Result<Versioned<T>> {
    load(store, collection, id)
        .await?
        .ok_or_else(|| KlusError::not_found(kind, id))
}
