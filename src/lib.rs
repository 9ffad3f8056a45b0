//! # unused
//!
//! Find block-storage disks that are not attached to anything across AWS,
//! Azure and GCP. Every provider's disks are normalized into one [`Disk`]
//! model with a sorted string [`Meta`] map, listed concurrently with
//! all-or-nothing semantics, then filtered, sorted and presented as a table,
//! CSV, grouped totals, an interactive deletion UI or Prometheus gauges.
//!
//! ## Features
//!
//! - **Multi-Cloud**: AWS EBS volumes, Azure managed disks, GCP persistent disks
//! - **One Model**: size, type, creation and last-use time plus vendor tags as metadata
//! - **Safe Aggregation**: one failing account fails the whole listing
//! - **Terminal UI**: browse per provider, mark and delete with confirmation
//! - **Exporter**: Prometheus gauges refreshed on an interval
//!
//! ## Quick Start
//!
//! ```no_run
//! use unused::{Config, Filter, SortKey};
//!
//! # async fn example() -> unused::Result<()> {
//! let mut config = Config::load()?;
//! config.providers.aws_profiles.push("production".to_string());
//!
//! let providers = unused::create_providers(&config.providers).await?;
//! let mut disks = unused::list_all(&providers).await?;
//!
//! let filter: Filter = "zone=us-east-1a".parse()?;
//! disks = disks.filter(|d| filter.matches(d.as_ref()));
//! disks.sort(SortKey::Created);
//!
//! for disk in &disks {
//!     println!("{} {} {} GB", disk.provider().name, disk.name(), disk.size_gb());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Flag | Enables |
//! |------|---------|
//! | `cli` | `unused` binary, [`output`] and [`tui`] |
//! | `exporter` | `unused-exporter` binary and [`exporter`] |

pub mod aggregate;
pub mod config;
pub mod disks;
pub mod error;
pub mod filter;
pub mod meta;
pub mod provider;

#[cfg(feature = "cli")]
pub mod output;
#[cfg(feature = "cli")]
pub mod tui;

#[cfg(feature = "exporter")]
pub mod exporter;

pub use aggregate::list_all;
pub use config::{Config, ExporterConfig, OutputConfig};
pub use disks::{DiskGroup, Disks, SortKey};
pub use error::{Error, Result};
pub use filter::Filter;
pub use meta::Meta;
pub use provider::{
    create_providers, Disk, DiskRef, DiskType, Provider, ProviderHandle, ProviderKind,
    ProviderRef, ProvidersConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
