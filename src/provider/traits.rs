//! Unified traits and types for cloud providers and their disks
//!
//! This module defines the common interface that every provider adapter
//! implements. Disks are handed around as [`DiskRef`] trait objects so the
//! aggregator, the filters and every frontend treat AWS, Azure and GCP disks
//! the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::disks::Disks;
use crate::error::Result;
use crate::meta::Meta;

/// Shared handle to a disk of any provider
pub type DiskRef = Arc<dyn Disk>;

/// Shared handle to a provider
pub type ProviderHandle = Arc<dyn Provider>;

/// Bytes in one GiB, the unit every vendor uses for "GB" sizes
pub const BYTES_PER_GB: u64 = 1 << 30;

/// Storage medium of a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiskType {
    /// Spinning / standard storage
    Hdd,
    /// Solid state storage
    Ssd,
    /// Vendor type not recognised
    Unknown,
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskType::Hdd => write!(f, "hdd"),
            DiskType::Ssd => write!(f, "ssd"),
            DiskType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Non-owning identity of the provider a disk belongs to
///
/// Captured when the disk is constructed. It identifies the owner for
/// display, sorting and error messages; deletion still goes through the
/// provider itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    /// Provider kind name ("AWS", "Azure", "GCP")
    pub name: String,
    /// Account, project or subscription identifier
    pub id: String,
    /// Identifying metadata (e.g. `profile=x`)
    pub meta: Meta,
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.meta)
    }
}

/// Disk trait - common read contract for all unused disks
pub trait Disk: Send + Sync + fmt::Debug {
    /// Provider-unique identifier (volume ID, resource ID, numeric ID)
    fn id(&self) -> &str;

    /// Human label
    fn name(&self) -> &str;

    /// Owning provider
    fn provider(&self) -> &ProviderRef;

    /// Size in GB
    fn size_gb(&self) -> u64;

    /// Size in bytes
    fn size_bytes(&self) -> u64 {
        self.size_gb() * BYTES_PER_GB
    }

    /// Creation time
    fn created_at(&self) -> DateTime<Utc>;

    /// Time the disk was last detached, `None` when the vendor has no signal
    fn last_used_at(&self) -> Option<DateTime<Utc>>;

    /// Storage medium
    fn disk_type(&self) -> DiskType {
        DiskType::Unknown
    }

    /// Provider/disk specific tags, name tags excluded
    fn meta(&self) -> &Meta;
}

/// Provider trait - a cloud account/project/subscription holding disks
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Fixed provider kind name
    fn name(&self) -> &str;

    /// Account, project or subscription identifier
    fn id(&self) -> &str;

    /// Identifying metadata
    fn meta(&self) -> &Meta;

    /// List disks not attached to any instance
    ///
    /// Either the complete list or an error; never a truncated list.
    async fn list_unused_disks(&self) -> Result<Disks>;

    /// Delete a single disk previously returned by [`Provider::list_unused_disks`]
    async fn delete(&self, disk: &dyn Disk) -> Result<()>;

    /// Identity snapshot handed to the disks this provider constructs
    fn info(&self) -> ProviderRef {
        ProviderRef {
            name: self.name().to_string(),
            id: self.id().to_string(),
            meta: self.meta().clone(),
        }
    }
}
