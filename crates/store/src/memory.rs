//! In-memory object store for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use theta_params::Oid;

use crate::{LfsPointer, ObjectStore, StoreError, StoreResult};

/// Content-addressed map with put/push counters for assertions.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<Oid, Vec<u8>>>,
    puts: AtomicUsize,
    new_objects: AtomicUsize,
    pushes: Mutex<Vec<(String, Vec<Oid>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls observed.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of puts that introduced previously-unseen bytes.
    pub fn new_object_count(&self) -> usize {
        self.new_objects.load(Ordering::SeqCst)
    }

    /// Number of stored distinct objects.
    pub fn len(&self) -> usize {
        self.objects.lock().expect("store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The batches handed to `push`.
    pub fn pushed_batches(&self) -> Vec<(String, Vec<Oid>)> {
        self.pushes.lock().expect("push lock").clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bytes: &[u8]) -> StoreResult<Oid> {
        let oid = Oid::new(Sha256::digest(bytes).into());
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().expect("store lock");
        if objects.insert(oid, bytes.to_vec()).is_none() {
            self.new_objects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(oid)
    }

    async fn get(&self, pointer: &LfsPointer) -> StoreResult<Vec<u8>> {
        self.objects
            .lock()
            .expect("store lock")
            .get(&pointer.oid)
            .cloned()
            .ok_or(StoreError::NotFound(pointer.oid))
    }

    async fn push(&self, oids: &[Oid], remote: &str) -> StoreResult<()> {
        self.pushes
            .lock()
            .expect("push lock")
            .push((remote.to_owned(), oids.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_returns_put_bytes() {
        let store = MemoryObjectStore::new();
        let oid = store.put(b"hello").await.unwrap();
        let bytes = store
            .get(&LfsPointer::new(oid, b"hello".len() as u64))
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryObjectStore::new();
        let first = store.put(b"same").await.unwrap();
        let second = store.put(b"same").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.new_object_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = MemoryObjectStore::new();
        let missing = LfsPointer::new(Oid::new([9u8; 32]), 4);
        assert!(matches!(
            store.get(&missing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_push_records_batch() {
        let store = MemoryObjectStore::new();
        let oid = store.put(b"x").await.unwrap();
        store.push(&[oid], "origin").await.unwrap();
        let batches = store.pushed_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, "origin");
        assert_eq!(batches[0].1, vec![oid]);
    }
}
