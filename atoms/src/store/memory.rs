use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{BlobStore, Document, DocumentStore, Query, Revision, Write};
use crate::error::StoreError;

type Collections = HashMap<String, HashMap<String, Document>>;

/// In-process document store with the same conditional-write semantics as
/// the DynamoDB adapter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    /// Number of upcoming commits to fail with `Unavailable`.
    fail_commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail as if the backend were unreachable.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    fn check(collections: &Collections, write: &Write) -> Result<(), StoreError> {
        let (collection, id) = write.target();
        let current = collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|d| d.version);
        let ok = match write {
            Write::Put { revision, .. } => match (revision, current) {
                (Revision::New, None) => true,
                (Revision::Exactly(v), Some(cur)) => *v == cur,
                _ => false,
            },
            Write::Delete { expected, .. } => match expected {
                None => true,
                Some(v) => current == Some(*v),
            },
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|d| query.matches(&d.data))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(query.finish(docs))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let injected = self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut collections = self.collections.write().await;
        for write in &writes {
            Self::check(&collections, write)?;
        }
        for write in writes {
            match write {
                Write::Put {
                    collection,
                    id,
                    data,
                    revision,
                } => {
                    let doc = Document {
                        id: id.clone(),
                        version: revision.next(),
                        data,
                    };
                    collections.entry(collection).or_default().insert(id, doc);
                }
                Write::Delete { collection, id, .. } => {
                    if let Some(c) = collections.get_mut(&collection) {
                        c.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-process blob store; URLs use a `memory://` scheme.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.objects.read().await.get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{}", path))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.objects.write().await.remove(path);
        Ok(())
    }
}
