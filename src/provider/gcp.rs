// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2024 NervoSys

//! GCP persistent disks
//!
//! Disks are listed per project with the Compute Engine aggregated list,
//! following `nextPageToken` until exhausted. A disk is unused when it has no
//! `users`. GKE stores the Kubernetes PV/PVC names as a JSON object in the
//! disk description; that object becomes the disk metadata.
//!
//! Zonal disks carry a `zone`, regional disks a `region` instead. Whichever
//! is present is kept in the metadata and selects the delete endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{Disk, DiskRef, DiskType, Provider, ProviderRef};
use super::token::{CliToken, TokenCache, TOKEN_TTL};
use crate::disks::Disks;
use crate::error::{Error, Result};
use crate::meta::Meta;

/// Provider name
pub const PROVIDER_NAME: &str = "GCP";

/// Metadata key holding the disk's zone
pub const ZONE_META_KEY: &str = "zone";

/// Metadata key holding a regional disk's region
pub const REGION_META_KEY: &str = "region";

const COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

/// Compute Engine disk resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeDisk {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "u64_from_str_or_int")]
    pub size_gb: u64,
    /// Full zone URL, absent for regional disks
    #[serde(default)]
    pub zone: Option<String>,
    /// Full region URL, present only for regional disks
    #[serde(default)]
    pub region: Option<String>,
    /// Full disk type URL
    #[serde(rename = "type", default)]
    pub disk_type: String,
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub last_detach_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub users: Vec<String>,
}

/// Disks of one zone or region inside an aggregated page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisksScopedList {
    #[serde(default)]
    pub disks: Vec<ComputeDisk>,
}

/// One page of the aggregated disk list, keyed by `zones/<zone>` or `regions/<region>`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedDiskPage {
    #[serde(default)]
    pub items: BTreeMap<String, DisksScopedList>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// int64 fields are JSON strings in Google APIs
fn u64_from_str_or_int<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Where a disk lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskLocation {
    Zone(String),
    Region(String),
}

impl DiskLocation {
    /// Location of a native disk, zone first
    pub fn of(disk: &ComputeDisk) -> Option<Self> {
        match (&disk.zone, &disk.region) {
            (Some(zone), _) => Some(DiskLocation::Zone(last_segment(zone).to_string())),
            (None, Some(region)) => Some(DiskLocation::Region(last_segment(region).to_string())),
            (None, None) => None,
        }
    }

    /// Location recorded in disk metadata
    pub fn from_meta(meta: &Meta) -> Option<Self> {
        if let Some(zone) = meta.get(ZONE_META_KEY) {
            return Some(DiskLocation::Zone(zone.to_string()));
        }
        meta.get(REGION_META_KEY)
            .map(|region| DiskLocation::Region(region.to_string()))
    }

    fn meta_entry(&self) -> (&'static str, &str) {
        match self {
            DiskLocation::Zone(zone) => (ZONE_META_KEY, zone),
            DiskLocation::Region(region) => (REGION_META_KEY, region),
        }
    }
}

/// Path segment of the collection holding the disk, e.g. `zones/us-central1-a`
impl fmt::Display for DiskLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskLocation::Zone(zone) => write!(f, "zones/{}", zone),
            DiskLocation::Region(region) => write!(f, "regions/{}", region),
        }
    }
}

/// Compute Engine operations the provider needs
#[async_trait]
pub trait ComputeDisksApi: Send + Sync + fmt::Debug {
    /// One page of the aggregated disk list
    async fn aggregated_list(&self, page_token: Option<&str>) -> Result<AggregatedDiskPage>;

    /// Delete a disk by location and name
    async fn delete_disk(&self, location: &DiskLocation, name: &str) -> Result<()>;
}

/// [`ComputeDisksApi`] over the Compute Engine REST API
#[derive(Debug)]
pub struct GcpRest {
    project: String,
    tokens: TokenCache,
    http: reqwest::Client,
}

impl GcpRest {
    /// Client for `project`, authenticated with `GOOGLE_OAUTH_ACCESS_TOKEN`
    /// or `gcloud auth print-access-token`
    pub async fn new(project: &str) -> Result<Self> {
        let source = CliToken::new(
            "GOOGLE_OAUTH_ACCESS_TOKEN",
            "gcloud",
            &["auth", "print-access-token"],
        );
        let tokens = TokenCache::new(Box::new(source), TOKEN_TTL);
        // Credential problems surface when the provider is configured
        tokens.get().await?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            project: project.to_string(),
            tokens,
            http,
        })
    }
}

#[async_trait]
impl ComputeDisksApi for GcpRest {
    async fn aggregated_list(&self, page_token: Option<&str>) -> Result<AggregatedDiskPage> {
        let url = format!(
            "{}/projects/{}/aggregated/disks",
            COMPUTE_ENDPOINT, self.project
        );
        let response = self
            .tokens
            .send(|token| {
                let request = self.http.get(&url).bearer_auth(token);
                match page_token {
                    Some(page_token) => request.query(&[("pageToken", page_token)]),
                    None => request,
                }
            })
            .await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "disks aggregated list returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn delete_disk(&self, location: &DiskLocation, name: &str) -> Result<()> {
        let url = format!(
            "{}/projects/{}/{}/disks/{}",
            COMPUTE_ENDPOINT, self.project, location, name
        );

        let response = self
            .tokens
            .send(|token| self.http.delete(&url).bearer_auth(token))
            .await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "disk delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Last path segment of a resource URL
fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Map a disk type URL to a disk type
pub fn type_disk_type(type_url: &str) -> DiskType {
    match last_segment(type_url) {
        "pd-ssd" | "pd-balanced" | "pd-extreme" => DiskType::Ssd,
        "pd-standard" => DiskType::Hdd,
        _ => DiskType::Unknown,
    }
}

/// Decode the JSON object GKE writes into disk descriptions
///
/// An empty description carries no metadata.
pub fn description_meta(disk_name: &str, description: &str) -> Result<Meta> {
    if description.trim().is_empty() {
        return Ok(Meta::new());
    }
    let decoded: BTreeMap<String, String> =
        serde_json::from_str(description).map_err(|source| Error::Metadata {
            disk: disk_name.to_string(),
            source,
        })?;
    Ok(Meta::from(decoded))
}

/// Unattached GCP persistent disk
#[derive(Debug, Clone)]
pub struct GcpDisk {
    disk: ComputeDisk,
    provider: ProviderRef,
    meta: Meta,
}

impl GcpDisk {
    /// Normalize a native disk; fails when its description is not a JSON object of strings
    pub fn new(disk: ComputeDisk, provider: ProviderRef) -> Result<Self> {
        let mut meta = description_meta(&disk.name, &disk.description)?;
        if let Some(location) = DiskLocation::of(&disk) {
            let (key, value) = location.meta_entry();
            meta.insert(key, value);
        }

        Ok(Self {
            disk,
            provider,
            meta,
        })
    }

    /// Native disk
    pub fn compute_disk(&self) -> &ComputeDisk {
        &self.disk
    }
}

impl Disk for GcpDisk {
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
        self.disk.size_gb
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.disk.creation_timestamp
    }

    fn last_used_at(&self) -> Option<DateTime<Utc>> {
        Some(
            self.disk
                .last_detach_timestamp
                .unwrap_or(self.disk.creation_timestamp),
        )
    }

    fn disk_type(&self) -> DiskType {
        type_disk_type(&self.disk.disk_type)
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

/// GCP project
#[derive(Debug)]
pub struct GcpProvider {
    project: String,
    meta: Meta,
    client: Box<dyn ComputeDisksApi>,
}

impl GcpProvider {
    /// Provider for `project` using the Compute Engine REST API
    pub async fn new(project: &str) -> Result<Self> {
        if project.trim().is_empty() {
            return Err(Error::Config("GCP project must not be empty".to_string()));
        }
        let client = GcpRest::new(project).await?;
        Ok(Self::with_client(project, Box::new(client)))
    }

    /// Provider for `project` using an arbitrary client
    pub fn with_client(project: &str, client: Box<dyn ComputeDisksApi>) -> Self {
        Self {
            project: project.to_string(),
            meta: Meta::from_iter([("project", project)]),
            client,
        }
    }
}

#[async_trait]
impl Provider for GcpProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn id(&self) -> &str {
        &self.project
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    async fn list_unused_disks(&self) -> Result<Disks> {
        let info = self.info();
        let mut disks = Disks::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .client
                .aggregated_list(page_token.as_deref())
                .await
                .map_err(|e| Error::List {
                    provider: PROVIDER_NAME,
                    account: self.project.clone(),
                    reason: e.to_string(),
                })?;

            for scoped in page.items.into_values() {
                for disk in scoped.disks {
                    if !disk.users.is_empty() {
                        continue;
                    }
                    disks.push(Arc::new(GcpDisk::new(disk, info.clone())?) as DiskRef);
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        log::debug!("GCP project {}: {} unused disks", self.project, disks.len());
        Ok(disks)
    }

    async fn delete(&self, disk: &dyn Disk) -> Result<()> {
        let location = DiskLocation::from_meta(disk.meta()).ok_or_else(|| Error::Delete {
            disk: disk.name().to_string(),
            reason: "zone or region not found in disk metadata".to_string(),
        })?;

        self.client
            .delete_disk(&location, disk.name())
            .await
            .map_err(|e| Error::Delete {
                disk: disk.name().to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const ZONE_URL: &str =
        "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a";

    #[derive(Debug, Default)]
    struct MockCompute {
        pages: Vec<AggregatedDiskPage>,
        fail: bool,
        deleted: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl ComputeDisksApi for MockCompute {
        async fn aggregated_list(&self, page_token: Option<&str>) -> Result<AggregatedDiskPage> {
            if self.fail {
                return Err(Error::Network("403 Forbidden".to_string()));
            }
            let index = page_token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
            Ok(self.pages[index].clone())
        }

        async fn delete_disk(&self, location: &DiskLocation, name: &str) -> Result<()> {
            self.deleted
                .lock()
                .unwrap()
                .push((location.to_string(), name.to_string()));
            Ok(())
        }
    }

    fn compute_disk(name: &str, description: &str, users: &[&str]) -> ComputeDisk {
        ComputeDisk {
            id: format!("{}-id", name),
            name: name.to_string(),
            description: description.to_string(),
            size_gb: 50,
            zone: Some(ZONE_URL.to_string()),
            region: None,
            disk_type: format!("{}/diskTypes/pd-ssd", ZONE_URL),
            creation_timestamp: "2024-01-15T10:00:00Z".parse().unwrap(),
            last_detach_timestamp: None,
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }

    fn page(disks: Vec<ComputeDisk>, next: Option<&str>) -> AggregatedDiskPage {
        AggregatedDiskPage {
            items: BTreeMap::from([(
                "zones/us-central1-a".to_string(),
                DisksScopedList { disks },
            )]),
            next_page_token: next.map(str::to_string),
        }
    }

    fn provider_ref() -> ProviderRef {
        ProviderRef {
            name: PROVIDER_NAME.to_string(),
            id: "my-project".to_string(),
            meta: Meta::from_iter([("project", "my-project")]),
        }
    }

    #[test]
    fn test_description_meta_and_zone() {
        let description = r#"{"kubernetes.io/created-for/pvc/name":"data-0","kubernetes.io/created-for/pvc/namespace":"db"}"#;
        let disk = GcpDisk::new(compute_disk("pvc-1", description, &[]), provider_ref()).unwrap();
        assert_eq!(
            disk.meta(),
            &Meta::from_iter([
                ("kubernetes.io/created-for/pvc/name", "data-0"),
                ("kubernetes.io/created-for/pvc/namespace", "db"),
                ("zone", "us-central1-a"),
            ])
        );
        assert_eq!(disk.disk_type(), DiskType::Ssd);
    }

    #[test]
    fn test_empty_description() {
        let disk = GcpDisk::new(compute_disk("plain", "", &[]), provider_ref()).unwrap();
        assert_eq!(disk.meta(), &Meta::from_iter([("zone", "us-central1-a")]));
    }

    #[test]
    fn test_malformed_description_names_disk() {
        let err = GcpDisk::new(compute_disk("broken", "not json", &[]), provider_ref()).unwrap_err();
        assert!(matches!(err, Error::Metadata { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_last_used_falls_back_to_created() {
        let disk = GcpDisk::new(compute_disk("d", "", &[]), provider_ref()).unwrap();
        assert_eq!(disk.last_used_at(), Some(disk.created_at()));

        let mut native = compute_disk("d", "", &[]);
        let detached: DateTime<Utc> = "2024-04-01T00:00:00Z".parse().unwrap();
        native.last_detach_timestamp = Some(detached);
        let disk = GcpDisk::new(native, provider_ref()).unwrap();
        assert_eq!(disk.last_used_at(), Some(detached));
    }

    #[test]
    fn test_type_disk_type() {
        assert_eq!(type_disk_type("projects/p/zones/z/diskTypes/pd-standard"), DiskType::Hdd);
        assert_eq!(type_disk_type("projects/p/zones/z/diskTypes/pd-balanced"), DiskType::Ssd);
        assert_eq!(type_disk_type("hyperdisk-throughput"), DiskType::Unknown);
    }

    #[test]
    fn test_page_deserialize_string_sizes() {
        let json = r#"{
            "items": {
                "zones/europe-west1-b": {
                    "disks": [{
                        "id": "1234567890",
                        "name": "pvc-abc",
                        "sizeGb": "200",
                        "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/europe-west1-b",
                        "type": "https://www.googleapis.com/compute/v1/projects/p/zones/europe-west1-b/diskTypes/pd-standard",
                        "creationTimestamp": "2023-06-30T04:12:45.123-07:00",
                        "lastDetachTimestamp": "2023-07-02T01:00:00.000-07:00"
                    }]
                },
                "zones/us-east1-c": {
                    "warning": {"code": "NO_RESULTS_ON_PAGE"}
                }
            },
            "nextPageToken": "abc"
        }"#;
        let page: AggregatedDiskPage = serde_json::from_str(json).unwrap();
        let disks = &page.items["zones/europe-west1-b"].disks;
        assert_eq!(disks[0].size_gb, 200);
        assert!(page.items["zones/us-east1-c"].disks.is_empty());
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_list_skips_attached_and_paginates() {
        let mock = MockCompute {
            pages: vec![
                page(
                    vec![
                        compute_disk("free-1", "", &[]),
                        compute_disk("attached", "", &["instances/vm-1"]),
                    ],
                    Some("1"),
                ),
                page(vec![compute_disk("free-2", "", &[])], None),
            ],
            ..Default::default()
        };
        let provider = GcpProvider::with_client("my-project", Box::new(mock));

        let disks = provider.list_unused_disks().await.unwrap();
        let names: Vec<&str> = disks.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["free-1", "free-2"]);
    }

    #[tokio::test]
    async fn test_list_error_names_project() {
        let mock = MockCompute {
            fail: true,
            ..Default::default()
        };
        let provider = GcpProvider::with_client("my-project", Box::new(mock));

        let err = provider.list_unused_disks().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "listing unused disks for GCP my-project: Network error: 403 Forbidden"
        );
    }

    #[tokio::test]
    async fn test_list_metadata_error_is_fatal() {
        let mock = MockCompute {
            pages: vec![page(vec![compute_disk("bad", "{oops", &[])], None)],
            ..Default::default()
        };
        let provider = GcpProvider::with_client("my-project", Box::new(mock));
        assert!(matches!(
            provider.list_unused_disks().await,
            Err(Error::Metadata { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_uses_zone_from_meta() {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let mock = MockCompute {
            deleted: deleted.clone(),
            ..Default::default()
        };
        let provider = GcpProvider::with_client("my-project", Box::new(mock));
        let disk = GcpDisk::new(compute_disk("pvc-9", "", &[]), provider.info()).unwrap();

        provider.delete(&disk).await.unwrap();
        assert_eq!(
            deleted.lock().unwrap().as_slice(),
            &[("zones/us-central1-a".to_string(), "pvc-9".to_string())]
        );
    }

    #[tokio::test]
    async fn test_regional_disk_listed_and_deleted_by_region() {
        let json = r#"{
            "items": {
                "zones/us-central1-a": {
                    "disks": [{
                        "id": "1",
                        "name": "zonal",
                        "sizeGb": "10",
                        "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
                        "type": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/diskTypes/pd-standard",
                        "creationTimestamp": "2024-01-01T00:00:00.000-07:00"
                    }]
                },
                "regions/us-central1": {
                    "disks": [{
                        "id": "2",
                        "name": "regional",
                        "sizeGb": "20",
                        "region": "https://www.googleapis.com/compute/v1/projects/p/regions/us-central1",
                        "replicaZones": [
                            "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
                            "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-b"
                        ],
                        "type": "https://www.googleapis.com/compute/v1/projects/p/regions/us-central1/diskTypes/pd-balanced",
                        "creationTimestamp": "2024-01-02T00:00:00.000-07:00"
                    }]
                }
            }
        }"#;
        let page: AggregatedDiskPage = serde_json::from_str(json).unwrap();
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let mock = MockCompute {
            pages: vec![page],
            deleted: deleted.clone(),
            ..Default::default()
        };
        let provider = GcpProvider::with_client("p", Box::new(mock));

        let disks = provider.list_unused_disks().await.unwrap();
        assert_eq!(disks.len(), 2);
        let regional = disks.iter().find(|d| d.name() == "regional").unwrap();
        assert_eq!(regional.meta(), &Meta::from_iter([("region", "us-central1")]));
        assert_eq!(regional.disk_type(), DiskType::Ssd);
        let zonal = disks.iter().find(|d| d.name() == "zonal").unwrap();
        assert_eq!(zonal.meta(), &Meta::from_iter([("zone", "us-central1-a")]));

        provider.delete(regional.as_ref()).await.unwrap();
        provider.delete(zonal.as_ref()).await.unwrap();
        assert_eq!(
            deleted.lock().unwrap().as_slice(),
            &[
                ("regions/us-central1".to_string(), "regional".to_string()),
                ("zones/us-central1-a".to_string(), "zonal".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_without_location_fails() {
        let provider = GcpProvider::with_client("p", Box::new(MockCompute::default()));
        let mut native = compute_disk("nowhere", "", &[]);
        native.zone = None;
        let disk = GcpDisk::new(native, provider.info()).unwrap();
        assert!(disk.meta().is_empty());

        let err = provider.delete(&disk).await.unwrap_err();
        assert!(matches!(err, Error::Delete { .. }));
        assert!(err.to_string().contains("nowhere"));
    }
}
