//! Static presentation of disk inventories
//!
//! [`table`] prints one row per disk with relative ages, [`csv`] prints the
//! same columns with absolute timestamps and [`group`] prints totals per
//! metadata value.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::disks::Disks;
use crate::provider::{Disk, DiskRef};

pub mod csv;
pub mod group;
pub mod table;

/// Output format of the non-interactive CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
}

/// What to print and how
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub format: OutputFormat,
    /// Append a META column with all metadata
    pub verbose: bool,
    /// Metadata keys shown as their own columns
    pub extra_columns: Vec<String>,
    /// Print totals grouped by this metadata key instead of one row per disk
    pub group_by: Option<String>,
}

const BASE_COLUMNS: [&str; 6] = ["PROVIDER", "DISK", "AGE", "UNUSED", "TYPE", "SIZE_GB"];

/// Human duration between `since` and `now`: `45s`, `12m`, `3h`, `20d`, `2y`
pub fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s if s < 365 * 86_400 => format!("{}d", s / 86_400),
        s => format!("{}y", s / (365 * 86_400)),
    }
}

/// Column headers for `options`
pub fn headers(options: &OutputOptions) -> Vec<String> {
    let mut headers: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    headers.extend(options.extra_columns.iter().map(|c| c.to_uppercase()));
    if options.verbose {
        headers.push("META".to_string());
    }
    headers
}

/// How AGE and UNUSED cells are written
#[derive(Debug, Clone, Copy)]
pub(crate) enum TimeStyle {
    Relative(DateTime<Utc>),
    Absolute,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Cells of one disk row, matching [`headers`]
pub(crate) fn cells(disk: &dyn Disk, options: &OutputOptions, style: TimeStyle) -> Vec<String> {
    let (created, unused) = match style {
        TimeStyle::Relative(now) => (
            age(disk.created_at(), now),
            disk.last_used_at()
                .map(|t| age(t, now))
                .unwrap_or_else(|| "n/a".to_string()),
        ),
        TimeStyle::Absolute => (
            timestamp(disk.created_at()),
            disk.last_used_at().map(timestamp).unwrap_or_default(),
        ),
    };

    let mut row = vec![
        disk.provider().name.clone(),
        disk.name().to_string(),
        created,
        unused,
        disk.disk_type().to_string(),
        disk.size_gb().to_string(),
    ];
    row.extend(
        options
            .extra_columns
            .iter()
            .map(|key| disk.meta().get(key).unwrap_or_default().to_string()),
    );
    if options.verbose {
        row.push(disk.meta().to_string());
    }
    row
}

/// Render `disks` according to `options`, ages relative to `now`
pub fn render(disks: &Disks, options: &OutputOptions, now: DateTime<Utc>) -> String {
    match (&options.group_by, options.format) {
        (Some(key), OutputFormat::Table) => group::render(&disks.group(key), key),
        (Some(key), OutputFormat::Csv) => group::render_csv(&disks.group(key), key),
        (None, OutputFormat::Table) => table::render(disks, options, now),
        (None, OutputFormat::Csv) => csv::render(disks, options),
    }
}

/// Total size of `disks` in GB
pub fn total_size_gb<'a>(disks: impl IntoIterator<Item = &'a DiskRef>) -> u64 {
    disks.into_iter().map(|d| d.size_gb()).sum()
}
