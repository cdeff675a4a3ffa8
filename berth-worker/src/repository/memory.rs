//! In-memory job store
//!
//! Backs the server when it runs without a database and every test that
//! needs a job store. Data is lost when the process exits.

use async_trait::async_trait;
use berth_core::domain::job::{Job, NewJob};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::jobs::{JobConnection, JobStore, StoreError};

/// In-memory job store
///
/// Cloning yields another handle onto the same jobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: RwLock<Jobs>,
    unavailable: AtomicBool,
    open_connections: AtomicUsize,
}

#[derive(Debug, Default)]
struct Jobs {
    by_id: BTreeMap<i64, Job>,
    last_id: i64,
}

impl MemoryJobStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully formed job, keeping its id
    ///
    /// Later `create` calls continue numbering after the highest id seen.
    pub fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.write()?;
        jobs.last_id = jobs.last_id.max(job.id);
        jobs.by_id.insert(job.id, job);
        Ok(())
    }

    /// Snapshot of a job, bypassing connections
    pub fn get(&self, id: i64) -> Option<Job> {
        self.inner
            .jobs
            .read()
            .ok()
            .and_then(|jobs| jobs.by_id.get(&id).cloned())
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.inner
            .jobs
            .read()
            .map(|jobs| jobs.by_id.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simulates an outage: while unavailable, connecting and every call on
    /// an open connection fail with [`StoreError::Unavailable`]
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Jobs>, StoreError> {
        self.inner
            .jobs
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Jobs>, StoreError> {
        self.inner
            .jobs
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn connect(&self) -> Result<Box<dyn JobConnection>, StoreError> {
        self.check_available()?;
        self.inner.open_connections.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryJobConnection {
            store: self.clone(),
            open: true,
        }))
    }
}

/// Connection handed out by [`MemoryJobStore`]
struct MemoryJobConnection {
    store: MemoryJobStore,
    open: bool,
}

impl MemoryJobConnection {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.store
                .inner
                .open_connections
                .fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn ready(&self) -> Result<&MemoryJobStore, StoreError> {
        if !self.open {
            return Err(StoreError::Closed);
        }
        self.store.check_available()?;
        Ok(&self.store)
    }
}

#[async_trait]
impl JobConnection for MemoryJobConnection {
    async fn create(&mut self, job: NewJob) -> Result<Job, StoreError> {
        let mut jobs = self.ready()?.write()?;

        jobs.last_id += 1;
        let job = job.into_job(jobs.last_id, chrono::Utc::now());
        jobs.by_id.insert(job.id, job.clone());

        Ok(job)
    }

    async fn get_by_id(&mut self, id: i64) -> Result<Option<Job>, StoreError> {
        let jobs = self.ready()?.read()?;
        Ok(jobs.by_id.get(&id).cloned())
    }

    async fn get_by_uuid(&mut self, uuid: Uuid) -> Result<Option<Job>, StoreError> {
        let jobs = self.ready()?.read()?;
        Ok(jobs.by_id.values().find(|job| job.uuid == uuid).cloned())
    }

    async fn update(&mut self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.ready()?.write()?;

        let stored = jobs
            .by_id
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::NotFound(job.id.to_string()))?;

        *stored = job.clone();
        stored.updated_at = chrono::Utc::now();

        Ok(())
    }

    async fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let mut jobs = self.ready()?.write()?;

        if jobs.by_id.remove(&id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for MemoryJobConnection {
    fn drop(&mut self) {
        self.release();
    }
}
