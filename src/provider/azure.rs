// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2024 NervoSys

//! Azure managed disks
//!
//! Disks are listed per subscription through the ARM REST API, following
//! `nextLink` until exhausted. A disk is unused when nothing manages it
//! (`managedBy` is absent). The API does not return the resource group as a
//! field, so it is parsed out of the resource ID and kept in the disk's
//! metadata for deletion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{Disk, DiskRef, DiskType, Provider, ProviderRef, BYTES_PER_GB};
use super::token::{CliToken, TokenCache, TOKEN_TTL};
use crate::disks::Disks;
use crate::error::{Error, Result};
use crate::meta::Meta;

/// Provider name
pub const PROVIDER_NAME: &str = "Azure";

/// Metadata key holding the disk's resource group
pub const RESOURCE_GROUP_META_KEY: &str = "resource-group";

/// Metadata key holding the disk's region
pub const LOCATION_META_KEY: &str = "location";

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
const API_VERSION: &str = "2023-04-02";

/// Managed disk SKU
#[derive(Debug, Clone, Deserialize)]
pub struct DiskSku {
    pub name: Option<String>,
}

/// Managed disk properties
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskProperties {
    pub time_created: DateTime<Utc>,
    #[serde(rename = "diskSizeGB", default)]
    pub disk_size_gb: Option<u64>,
    #[serde(default)]
    pub disk_size_bytes: Option<u64>,
    /// Last time the disk was attached or detached
    #[serde(rename = "LastOwnershipUpdateTime", default)]
    pub last_ownership_update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disk_state: Option<String>,
}

/// Managed disk resource as returned by ARM
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDisk {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub managed_by: Option<String>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub sku: Option<DiskSku>,
    pub properties: DiskProperties,
}

/// One page of the disk list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskListPage {
    #[serde(default)]
    pub value: Vec<ManagedDisk>,
    #[serde(default)]
    pub next_link: Option<String>,
}

/// Managed disk operations the provider needs
#[async_trait]
pub trait ManagedDisksApi: Send + Sync + fmt::Debug {
    /// First page when `next_link` is `None`, otherwise the page it points at
    async fn list_page(&self, next_link: Option<&str>) -> Result<DiskListPage>;

    /// Delete a disk by resource group and name
    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()>;
}

/// [`ManagedDisksApi`] over the ARM REST API
#[derive(Debug)]
pub struct AzureRest {
    subscription: String,
    tokens: TokenCache,
    http: reqwest::Client,
}

impl AzureRest {
    /// Client for `subscription`, authenticated with `AZURE_ACCESS_TOKEN`
    /// or `az account get-access-token`
    pub async fn new(subscription: &str) -> Result<Self> {
        let source = CliToken::new(
            "AZURE_ACCESS_TOKEN",
            "az",
            &[
                "account",
                "get-access-token",
                "--subscription",
                subscription,
                "--query",
                "accessToken",
                "--output",
                "tsv",
            ],
        );
        let tokens = TokenCache::new(Box::new(source), TOKEN_TTL);
        // Credential problems surface when the provider is configured
        tokens.get().await?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            subscription: subscription.to_string(),
            tokens,
            http,
        })
    }
}

#[async_trait]
impl ManagedDisksApi for AzureRest {
    async fn list_page(&self, next_link: Option<&str>) -> Result<DiskListPage> {
        let url = match next_link {
            Some(link) => link.to_string(),
            None => format!(
                "{}/subscriptions/{}/providers/Microsoft.Compute/disks?api-version={}",
                MANAGEMENT_ENDPOINT, self.subscription, API_VERSION
            ),
        };

        let response = self
            .tokens
            .send(|token| self.http.get(&url).bearer_auth(token))
            .await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "ARM disk list returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/disks/{}?api-version={}",
            MANAGEMENT_ENDPOINT, self.subscription, resource_group, name, API_VERSION
        );

        let response = self
            .tokens
            .send(|token| self.http.delete(&url).bearer_auth(token))
            .await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "ARM disk delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Resource group segment of an ARM resource ID
///
/// `/subscriptions/s/resourceGroups/<rg>/providers/...` yields `<rg>`.
pub fn resource_group(id: &str) -> Option<&str> {
    const MARKER: &str = "resourceGroups/";
    let start = id.find(MARKER)? + MARKER.len();
    let rest = &id[start..];
    let group = match rest.find('/') {
        Some(end) => &rest[..end],
        None => rest,
    };
    (!group.is_empty()).then_some(group)
}

/// Map a managed disk SKU name to a disk type
pub fn sku_disk_type(sku: Option<&str>) -> DiskType {
    match sku {
        Some("Standard_LRS") => DiskType::Hdd,
        Some("Premium_LRS" | "StandardSSD_LRS" | "UltraSSD_LRS") => DiskType::Ssd,
        _ => DiskType::Unknown,
    }
}

/// Unattached Azure managed disk
#[derive(Debug, Clone)]
pub struct AzureDisk {
    disk: ManagedDisk,
    provider: ProviderRef,
    meta: Meta,
}

impl AzureDisk {
    /// Normalize a native managed disk; metadata is tags + location + resource group
    pub fn new(disk: ManagedDisk, provider: ProviderRef) -> Self {
        let mut meta = Meta::new();
        if let Some(tags) = &disk.tags {
            meta.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        meta.insert(LOCATION_META_KEY, disk.location.clone());
        if let Some(group) = resource_group(&disk.id) {
            meta.insert(RESOURCE_GROUP_META_KEY, group);
        }

        Self {
            disk,
            provider,
            meta,
        }
    }

    /// Native disk
    pub fn managed_disk(&self) -> &ManagedDisk {
        &self.disk
    }
}

impl Disk for AzureDisk {
    fn id(&self) -> &str {
        &self.disk.id
    }

    fn name(&self) -> &str {
        &self.disk.name
    }

    fn provider(&self) -> &ProviderRef {
        &self.provider
    }

    fn size_gb(&self) -> u64 {
        let props = &self.disk.properties;
        props
            .disk_size_gb
            .or_else(|| props.disk_size_bytes.map(|b| b / BYTES_PER_GB))
            .unwrap_or(0)
    }

    fn size_bytes(&self) -> u64 {
        self.disk
            .properties
            .disk_size_bytes
            .unwrap_or_else(|| self.size_gb() * BYTES_PER_GB)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.disk.properties.time_created
    }

    // A disk created but never attached has no ownership update.
    fn last_used_at(&self) -> Option<DateTime<Utc>> {
        Some(
            self.disk
                .properties
                .last_ownership_update_time
                .unwrap_or(self.disk.properties.time_created),
        )
    }

    fn disk_type(&self) -> DiskType {
        sku_disk_type(self.disk.sku.as_ref().and_then(|s| s.name.as_deref()))
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

/// Azure subscription
#[derive(Debug)]
pub struct AzureProvider {
    subscription: String,
    meta: Meta,
    client: Box<dyn ManagedDisksApi>,
}

impl AzureProvider {
    /// Provider for `subscription` using the ARM REST API
    pub async fn new(subscription: &str) -> Result<Self> {
        if subscription.trim().is_empty() {
            return Err(Error::Config(
                "Azure subscription must not be empty".to_string(),
            ));
        }
        let client = AzureRest::new(subscription).await?;
        Ok(Self::with_client(subscription, Box::new(client)))
    }

    /// Provider for `subscription` using an arbitrary client
    pub fn with_client(subscription: &str, client: Box<dyn ManagedDisksApi>) -> Self {
        Self {
            subscription: subscription.to_string(),
            meta: Meta::from_iter([("subscription", subscription)]),
            client,
        }
    }
}

#[async_trait]
impl Provider for AzureProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn id(&self) -> &str {
        &self.subscription
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    async fn list_unused_disks(&self) -> Result<Disks> {
        let info = self.info();
        let mut disks = Disks::new();
        let mut next_link: Option<String> = None;

        loop {
            let page = self
                .client
                .list_page(next_link.as_deref())
                .await
                .map_err(|e| Error::List {
                    provider: PROVIDER_NAME,
                    account: self.subscription.clone(),
                    reason: e.to_string(),
                })?;

            for disk in page.value {
                if disk.managed_by.as_deref().is_some_and(|m| !m.is_empty()) {
                    continue;
                }
                disks.push(Arc::new(AzureDisk::new(disk, info.clone())) as DiskRef);
            }

            match page.next_link {
                Some(link) if !link.is_empty() => next_link = Some(link),
                _ => break,
            }
        }

        log::debug!(
            "Azure subscription {}: {} unused disks",
            self.subscription,
            disks.len()
        );
        Ok(disks)
    }

    async fn delete(&self, disk: &dyn Disk) -> Result<()> {
        let group = disk
            .meta()
            .get(RESOURCE_GROUP_META_KEY)
            .ok_or_else(|| Error::Delete {
                disk: disk.id().to_string(),
                reason: "resource group not found in disk metadata".to_string(),
            })?;

        self.client
            .delete_disk(group, disk.name())
            .await
            .map_err(|e| Error::Delete {
                disk: disk.id().to_string(),
                reason: e.to_string(),
            })
    }
}
