// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2024 NervoSys

//! Cloud provider abstraction layer
//!
//! This module provides a vendor-agnostic interface for finding unattached
//! disks across AWS, Azure and GCP through a common trait-based system. The
//! [`Provider`] trait defines what every adapter implements and the [`Disk`]
//! trait is the read contract shared by their disks.
//!
//! Providers are built from typed configuration by [`create_providers`]:
//!
//! ```no_run
//! use unused::provider::{create_providers, ProvidersConfig};
//!
//! # async fn example() -> unused::error::Result<()> {
//! let config = ProvidersConfig {
//!     gcp_projects: vec!["my-project".to_string()],
//!     aws_profiles: vec!["production".to_string()],
//!     ..Default::default()
//! };
//! let providers = create_providers(&config).await?;
//! let disks = unused::aggregate::list_all(&providers).await?;
//! println!("{} unused disks", disks.len());
//! # Ok(())
//! # }
//! ```
//!
//! | Provider | Listing | Deletion key | Credentials |
//! |----------|---------|--------------|-------------|
//! | AWS      | `aws ec2 describe-volumes` | volume ID | AWS CLI profile chain |
//! | Azure    | ARM REST `Microsoft.Compute/disks` | resource group + name | `AZURE_ACCESS_TOKEN` / `az` |
//! | GCP      | Compute REST `aggregated/disks` | project + zone + name | `GOOGLE_OAUTH_ACCESS_TOKEN` / `gcloud` |

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

pub mod traits;

pub mod aws;
pub mod azure;
pub mod fake;
pub mod gcp;
pub mod token;

pub use traits::{Disk, DiskRef, DiskType, Provider, ProviderHandle, ProviderRef, BYTES_PER_GB};

/// Provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    Aws,
    Azure,
    Gcp,
}

impl ProviderKind {
    /// Fixed display name, also the `provider` label in metrics
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Aws => aws::PROVIDER_NAME,
            ProviderKind::Azure => azure::PROVIDER_NAME,
            ProviderKind::Gcp => gcp::PROVIDER_NAME,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accounts to inventory, per provider kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// GCP project IDs
    #[serde(default)]
    pub gcp_projects: Vec<String>,
    /// AWS CLI profile names
    #[serde(default)]
    pub aws_profiles: Vec<String>,
    /// Azure subscription IDs
    #[serde(default)]
    pub azure_subscriptions: Vec<String>,
}

impl ProvidersConfig {
    /// Whether no account is configured at all
    pub fn is_empty(&self) -> bool {
        self.gcp_projects.is_empty()
            && self.aws_profiles.is_empty()
            && self.azure_subscriptions.is_empty()
    }

    /// Append the accounts of `other`
    pub fn merge(&mut self, other: ProvidersConfig) {
        self.gcp_projects.extend(other.gcp_projects);
        self.aws_profiles.extend(other.aws_profiles);
        self.azure_subscriptions.extend(other.azure_subscriptions);
    }

    /// (kind, account) pairs with duplicates removed, in configuration order
    pub fn accounts(&self) -> Vec<(ProviderKind, String)> {
        let mut seen = HashSet::new();
        let lists = [
            (ProviderKind::Gcp, &self.gcp_projects),
            (ProviderKind::Aws, &self.aws_profiles),
            (ProviderKind::Azure, &self.azure_subscriptions),
        ];

        let mut accounts = Vec::new();
        for (kind, ids) in lists {
            for id in ids {
                if seen.insert((kind, id.clone())) {
                    accounts.push((kind, id.clone()));
                }
            }
        }
        accounts
    }
}

/// Construct one provider per configured account
///
/// Fails on the first account whose client cannot be configured.
pub async fn create_providers(config: &ProvidersConfig) -> Result<Vec<ProviderHandle>> {
    let accounts = config.accounts();
    if accounts.is_empty() {
        return Err(Error::Config("no providers configured".to_string()));
    }

    let mut providers: Vec<ProviderHandle> = Vec::with_capacity(accounts.len());
    for (kind, id) in accounts {
        let provider: ProviderHandle = match kind {
            ProviderKind::Aws => Arc::new(aws::AwsProvider::new(&id)?),
            ProviderKind::Azure => Arc::new(azure::AzureProvider::new(&id).await?),
            ProviderKind::Gcp => Arc::new(gcp::GcpProvider::new(&id).await?),
        };
        log::debug!("configured provider {} {}", provider.name(), provider.meta());
        providers.push(provider);
    }

    Ok(providers)
}

/// Run an external command and return its stdout
///
/// The child is killed if the returned future is dropped, so an aborted
/// listing does not leave vendor CLIs running.
pub(crate) async fn run_command<I, S>(program: &OsStr, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::CommandFailed(format!("{}: {}", program.to_string_lossy(), e)))?;

    if !output.status.success() {
        return Err(Error::CommandFailed(format!(
            "{} exited with {}: {}",
            program.to_string_lossy(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
