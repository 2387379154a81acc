//! Object-store interface and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::client::BoxFuture;
use crate::error::{ObjectStoreError, ObjectStoreResult};

/// Named artifact storage addressed by bucket and key.
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `bucket/key`, replacing any existing object.
    fn put<'a>(&'a self, bucket: &'a str, key: &'a str, body: Bytes)
    -> BoxFuture<'a, ObjectStoreResult<()>>;

    /// Fetch `bucket/key`. A missing object is [`ObjectStoreError::NotFound`].
    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, ObjectStoreResult<Bytes>>;
}

/// Object store held in memory. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<(String, String), Bytes>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, String), Bytes>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, ObjectStoreResult<()>> {
        Box::pin(async move {
            self.lock().insert((bucket.to_string(), key.to_string()), body);
            Ok(())
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, ObjectStoreResult<Bytes>> {
        Box::pin(async move {
            self.lock()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = InMemoryObjectStore::new();
        store.put("b", "a.ipynb", Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(store.get("b", "a.ipynb").await.unwrap(), Bytes::from_static(b"{}"));
        assert_eq!(store.keys("b"), vec!["a.ipynb".to_string()]);
        assert!(store.keys("other").is_empty());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.get("b", "nope").await.unwrap_err();
        assert_eq!(
            err,
            ObjectStoreError::NotFound {
                bucket: "b".to_string(),
                key: "nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = InMemoryObjectStore::new();
        store.put("b", "k", Bytes::from_static(b"1")).await.unwrap();
        store.put("b", "k", Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), Bytes::from_static(b"2"));
    }
}
