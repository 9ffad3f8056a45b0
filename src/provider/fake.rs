//! In-memory provider and disk for tests and demos

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{Disk, DiskRef, DiskType, Provider, ProviderRef};
use crate::disks::Disks;
use crate::error::{Error, Result};
use crate::meta::Meta;

/// Fake disk with builder-style setters
#[derive(Debug, Clone)]
pub struct FakeDisk {
    id: String,
    name: String,
    provider: ProviderRef,
    size_gb: u64,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    disk_type: DiskType,
    meta: Meta,
}

impl FakeDisk {
    /// New disk owned by `provider`, with `id == name`
    pub fn new(provider: &dyn Provider, name: &str) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            provider: provider.info(),
            size_gb: 1,
            created_at: Utc::now(),
            last_used_at: None,
            disk_type: DiskType::Unknown,
            meta: Meta::new(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn size_gb(mut self, size_gb: u64) -> Self {
        self.size_gb = size_gb;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn last_used_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_used_at = Some(at);
        self
    }

    pub fn disk_type(mut self, disk_type: DiskType) -> Self {
        self.disk_type = disk_type;
        self
    }

    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }
}

impl Disk for FakeDisk {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self) -> &ProviderRef {
        &self.provider
    }

    fn size_gb(&self) -> u64 {
        self.size_gb
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    fn disk_type(&self) -> DiskType {
        self.disk_type
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

/// Fake provider returning a fixed disk list or a fixed error
#[derive(Debug)]
pub struct FakeProvider {
    name: String,
    id: String,
    meta: Meta,
    disks: Vec<DiskRef>,
    list_error: Option<String>,
    list_panic: Option<String>,
    delay: Option<Duration>,
    failing_deletes: HashSet<String>,
    deleted: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
}

impl FakeProvider {
    /// Provider named `name` with identifier `id` and meta `{id: <id>}`
    pub fn named(name: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            meta: Meta::from_iter([("id", id)]),
            disks: Vec::new(),
            list_error: None,
            list_panic: None,
            delay: None,
            failing_deletes: HashSet::new(),
            deleted: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_disks(mut self, disks: Vec<FakeDisk>) -> Self {
        self.disks = disks.into_iter().map(|d| Arc::new(d) as DiskRef).collect();
        self
    }

    /// Every listing fails with `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    /// Every listing panics with `message`
    pub fn panicking(mut self, message: &str) -> Self {
        self.list_panic = Some(message.to_string());
        self
    }

    /// Listing sleeps for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Deleting the disk with this id fails
    pub fn failing_delete(mut self, disk_id: &str) -> Self {
        self.failing_deletes.insert(disk_id.to_string());
        self
    }

    /// IDs of the disks deleted so far, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of listing calls so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    async fn list_unused_disks(&self) -> Result<Disks> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.list_panic {
            panic!("{}", message);
        }
        match &self.list_error {
            Some(message) => Err(Error::Other(message.clone())),
            None => Ok(self.disks.iter().cloned().collect()),
        }
    }

    async fn delete(&self, disk: &dyn Disk) -> Result<()> {
        if self.failing_deletes.contains(disk.id()) {
            return Err(Error::Delete {
                disk: disk.id().to_string(),
                reason: "fake deletion failure".to_string(),
            });
        }
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(disk.id().to_string());
        Ok(())
    }
}
