//! Plain-text table, one row per disk

use chrono::{DateTime, Utc};
use comfy_table::{presets, Table};

use super::{cells, headers, OutputOptions, TimeStyle};
use crate::disks::Disks;

/// Borderless table with left-aligned columns
pub(crate) fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table
}

/// One row per disk, ages relative to `now`
pub fn render(disks: &Disks, options: &OutputOptions, now: DateTime<Utc>) -> String {
    let mut table = new_table();
    table.set_header(headers(options));
    for disk in disks {
        table.add_row(cells(disk.as_ref(), options, TimeStyle::Relative(now)));
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::{now, sample};

    #[test]
    fn test_table_contains_row() {
        let options = OutputOptions {
            extra_columns: vec!["zone".to_string(), "missing".to_string()],
            ..Default::default()
        };
        let out = render(&sample(), &options, now());
        let header = out.lines().next().unwrap();
        assert!(header.contains("PROVIDER"));
        assert!(header.contains("MISSING"));
        assert!(out.contains("pvc-data"));
        assert!(out.contains("30d"));
        assert!(out.contains("5h"));
        assert!(out.contains("europe-west1-b"));
    }

    #[test]
    fn test_empty_inventory_prints_header() {
        let out = render(&Disks::new(), &OutputOptions::default(), now());
        assert!(out.contains("SIZE_GB"));
        assert!(!out.contains("META"));
    }
}
