use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::identity::{IdentityProvider, MemoryIdentityProvider};
use crate::notifications::{NotificationSink, StoreNotificationSink};
use crate::retry::RetryPolicy;
use crate::store::{BlobStore, DocumentStore, MemoryBlobStore, MemoryStore};

pub mod collections {
    pub const TASKS: &str = "tasks";
    pub const USERS: &str = "users";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// The collaborators every lifecycle operation runs against.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub notifications: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
}

impl Backend {
    /// Notifications go to the same document store by default.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            notifications: Arc::new(StoreNotificationSink::new(store.clone())),
            store,
            blobs,
            identity,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
        }
    }

    /// Everything in memory; for tests and local runs.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryIdentityProvider::new()),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }
}
