// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2024 NervoSys

//! AWS EBS volumes
//!
//! Unused volumes are those in the `available` state. Listing and deletion go
//! through the `aws` CLI under the configured profile, so whatever credential
//! chain that profile resolves to applies. Pages are requested with
//! `--starting-token` until no `NextToken` is returned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::traits::{Disk, DiskRef, DiskType, Provider, ProviderRef};
use super::run_command;
use crate::disks::Disks;
use crate::error::{Error, Result};
use crate::meta::Meta;

/// Provider name
pub const PROVIDER_NAME: &str = "AWS";

/// Tag keys holding the disk name, checked in tag order
pub const NAME_TAGS: [&str; 2] = ["Name", "CSIVolumeName"];

/// Items requested per CLI page
const PAGE_SIZE: u32 = 500;

/// EC2 volume tag
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// EC2 volume as returned by `describe-volumes`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub volume_id: String,
    /// Size in GiB
    pub size: u64,
    #[serde(default)]
    pub volume_type: Option<String>,
    pub create_time: DateTime<Utc>,
    pub availability_zone: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// One page of `describe-volumes` output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumePage {
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// EC2 operations the provider needs
#[async_trait]
pub trait Ec2Api: Send + Sync + fmt::Debug {
    /// One page of volumes in the `available` state
    async fn describe_available_volumes(&self, next_token: Option<&str>) -> Result<VolumePage>;

    /// Delete a volume by ID
    async fn delete_volume(&self, volume_id: &str) -> Result<()>;
}

/// [`Ec2Api`] backed by the `aws` CLI
#[derive(Debug, Clone)]
pub struct AwsCli {
    binary: PathBuf,
    profile: String,
}

impl AwsCli {
    /// Locate the `aws` binary for `profile`
    pub fn new(profile: &str) -> Result<Self> {
        let binary = which::which("aws")
            .map_err(|e| Error::Config(format!("aws CLI not found on PATH: {}", e)))?;
        Ok(Self {
            binary,
            profile: profile.to_string(),
        })
    }
}

#[async_trait]
impl Ec2Api for AwsCli {
    async fn describe_available_volumes(&self, next_token: Option<&str>) -> Result<VolumePage> {
        let page_size = PAGE_SIZE.to_string();
        let mut args = vec![
            "ec2",
            "describe-volumes",
            "--profile",
            self.profile.as_str(),
            "--filters",
            "Name=status,Values=available",
            "--max-items",
            page_size.as_str(),
            "--output",
            "json",
        ];
        if let Some(token) = next_token {
            args.push("--starting-token");
            args.push(token);
        }

        let stdout = run_command(self.binary.as_os_str(), &args).await?;
        let page: VolumePage = serde_json::from_str(&stdout)
            .map_err(|e| Error::Parse(format!("describe-volumes output: {}", e)))?;
        Ok(page)
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        let args = [
            "ec2",
            "delete-volume",
            "--profile",
            self.profile.as_str(),
            "--volume-id",
            volume_id,
        ];
        run_command(self.binary.as_os_str(), &args).await?;
        Ok(())
    }
}

/// Map an EBS volume type to a disk type
pub fn volume_disk_type(volume_type: Option<&str>) -> DiskType {
    match volume_type {
        Some("gp2" | "gp3" | "io1" | "io2") => DiskType::Ssd,
        Some("st1" | "sc1" | "standard") => DiskType::Hdd,
        _ => DiskType::Unknown,
    }
}

/// Unattached EBS volume
#[derive(Debug, Clone)]
pub struct AwsDisk {
    volume: Volume,
    name: String,
    provider: ProviderRef,
    meta: Meta,
}

impl AwsDisk {
    /// Normalize a native volume
    ///
    /// The first `Name` or `CSIVolumeName` tag becomes the name; every other
    /// tag plus `zone` becomes metadata.
    pub fn new(volume: Volume, provider: ProviderRef) -> Self {
        let mut name = None;
        let mut meta = Meta::new();
        meta.insert("zone", volume.availability_zone.clone());

        for tag in &volume.tags {
            if NAME_TAGS.contains(&tag.key.as_str()) {
                if name.is_none() {
                    name = Some(tag.value.clone());
                }
                continue;
            }
            meta.insert(tag.key.clone(), tag.value.clone());
        }

        Self {
            name: name.unwrap_or_default(),
            volume,
            provider,
            meta,
        }
    }

    /// Native volume
    pub fn volume(&self) -> &Volume {
        &self.volume
    }
}

impl Disk for AwsDisk {
    fn id(&self) -> &str {
        &self.volume.volume_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self) -> &ProviderRef {
        &self.provider
    }

    fn size_gb(&self) -> u64 {
        self.volume.size
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.volume.create_time
    }

    // EC2 does not record when a volume was detached.
    fn last_used_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn disk_type(&self) -> DiskType {
        volume_disk_type(self.volume.volume_type.as_deref())
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

/// AWS account reached through one CLI profile
#[derive(Debug)]
pub struct AwsProvider {
    profile: String,
    meta: Meta,
    client: Box<dyn Ec2Api>,
}

impl AwsProvider {
    /// Provider for `profile` using the `aws` CLI
    pub fn new(profile: &str) -> Result<Self> {
        if profile.trim().is_empty() {
            return Err(Error::Config("AWS profile must not be empty".to_string()));
        }
        let client = AwsCli::new(profile)?;
        Ok(Self::with_client(profile, Box::new(client)))
    }

    /// Provider for `profile` using an arbitrary EC2 client
    pub fn with_client(profile: &str, client: Box<dyn Ec2Api>) -> Self {
        Self {
            profile: profile.to_string(),
            meta: Meta::from_iter([("profile", profile)]),
            client,
        }
    }

    fn list_error(&self, err: Error) -> Error {
        Error::List {
            provider: PROVIDER_NAME,
            account: self.profile.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Provider for AwsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn id(&self) -> &str {
        &self.profile
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    async fn list_unused_disks(&self) -> Result<Disks> {
        let info = self.info();
        let mut disks = Disks::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .describe_available_volumes(next_token.as_deref())
                .await
                .map_err(|e| self.list_error(e))?;
            pages += 1;

            for volume in page.volumes {
                disks.push(Arc::new(AwsDisk::new(volume, info.clone())) as DiskRef);
            }

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        log::debug!(
            "AWS profile {}: {} unused volumes in {} pages",
            self.profile,
            disks.len(),
            pages
        );
        Ok(disks)
    }

    async fn delete(&self, disk: &dyn Disk) -> Result<()> {
        self.client
            .delete_volume(disk.id())
            .await
            .map_err(|e| Error::Delete {
                disk: disk.id().to_string(),
                reason: e.to_string(),
            })
    }
}
