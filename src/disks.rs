//! Disk collection with filtering, sorting and grouping

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::provider::{DiskRef, DiskType};

/// Ordered collection of unused disks
///
/// Insertion order follows provider enumeration and carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct Disks(Vec<DiskRef>);

impl Disks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiskRef> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&DiskRef> {
        self.0.get(index)
    }

    pub fn push(&mut self, disk: DiskRef) {
        self.0.push(disk);
    }

    pub fn as_slice(&self) -> &[DiskRef] {
        &self.0
    }

    /// New collection holding only the disks for which `predicate` holds
    pub fn filter<P>(&self, mut predicate: P) -> Disks
    where
        P: FnMut(&DiskRef) -> bool,
    {
        Disks(self.0.iter().filter(|d| predicate(d)).cloned().collect())
    }

    /// Stable in-place sort by `compare`
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&DiskRef, &DiskRef) -> Ordering,
    {
        self.0.sort_by(compare);
    }

    /// Stable in-place sort by one of the standard keys
    pub fn sort(&mut self, key: SortKey) {
        self.sort_by(key.comparator());
    }

    /// Sum sizes and count disks per (provider, meta value, disk type)
    ///
    /// Disks without `group_by` in their metadata are grouped under `NONE`.
    pub fn group(&self, group_by: &str) -> Vec<DiskGroup> {
        let mut groups: BTreeMap<(String, String, DiskType), (u64, usize)> = BTreeMap::new();
        for disk in &self.0 {
            let value = disk.meta().get(group_by).unwrap_or(NO_GROUP).to_string();
            let entry = groups
                .entry((disk.provider().name.clone(), value, disk.disk_type()))
                .or_default();
            entry.0 += disk.size_gb();
            entry.1 += 1;
        }

        groups
            .into_iter()
            .map(|((provider, value, disk_type), (size_gb, count))| DiskGroup {
                provider,
                value,
                disk_type,
                size_gb,
                count,
            })
            .collect()
    }
}

/// Group value used when a disk lacks the group-by key
pub const NO_GROUP: &str = "NONE";

/// Aggregated size of the disks sharing a group key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGroup {
    pub provider: String,
    pub value: String,
    pub disk_type: DiskType,
    pub size_gb: u64,
    pub count: usize,
}

impl IntoIterator for Disks {
    type Item = DiskRef;
    type IntoIter = std::vec::IntoIter<DiskRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Disks {
    type Item = &'a DiskRef;
    type IntoIter = std::slice::Iter<'a, DiskRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<DiskRef> for Disks {
    fn from_iter<I: IntoIterator<Item = DiskRef>>(iter: I) -> Self {
        Disks(iter.into_iter().collect())
    }
}

impl Extend<DiskRef> for Disks {
    fn extend<I: IntoIterator<Item = DiskRef>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl From<Vec<DiskRef>> for Disks {
    fn from(disks: Vec<DiskRef>) -> Self {
        Disks(disks)
    }
}

/// Order by provider name
pub fn by_provider(a: &DiskRef, b: &DiskRef) -> Ordering {
    a.provider().name.cmp(&b.provider().name)
}

/// Order by disk name
pub fn by_name(a: &DiskRef, b: &DiskRef) -> Ordering {
    a.name().cmp(b.name())
}

/// Order by creation time, oldest first
pub fn by_created_at(a: &DiskRef, b: &DiskRef) -> Ordering {
    a.created_at().cmp(&b.created_at())
}

/// Standard sort keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Provider,
    Name,
    Created,
}

impl SortKey {
    pub fn comparator(self) -> fn(&DiskRef, &DiskRef) -> Ordering {
        match self {
            SortKey::Provider => by_provider,
            SortKey::Name => by_name,
            SortKey::Created => by_created_at,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Provider => write!(f, "provider"),
            SortKey::Name => write!(f, "name"),
            SortKey::Created => write!(f, "created"),
        }
    }
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "provider" => Ok(SortKey::Provider),
            "name" => Ok(SortKey::Name),
            "created" | "created_at" | "age" => Ok(SortKey::Created),
            other => Err(Error::Parse(format!("unknown sort key: {}", other))),
        }
    }
}
