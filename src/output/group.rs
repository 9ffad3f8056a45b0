//! Totals grouped by a metadata key

use super::csv::record;
use super::table::new_table;
use crate::disks::DiskGroup;

fn group_headers(group_by: &str) -> Vec<String> {
    vec![
        "PROVIDER".to_string(),
        group_by.to_uppercase(),
        "TYPE".to_string(),
        "DISKS".to_string(),
        "SIZE_GB".to_string(),
    ]
}

fn group_cells(group: &DiskGroup) -> Vec<String> {
    vec![
        group.provider.clone(),
        group.value.clone(),
        group.disk_type.to_string(),
        group.count.to_string(),
        group.size_gb.to_string(),
    ]
}

/// Table of (provider, value, type) totals
pub fn render(groups: &[DiskGroup], group_by: &str) -> String {
    let mut table = new_table();
    table.set_header(group_headers(group_by));
    for group in groups {
        table.add_row(group_cells(group));
    }
    table.to_string()
}

/// Same totals as CSV
pub fn render_csv(groups: &[DiskGroup], group_by: &str) -> String {
    let mut out = record(&group_headers(group_by));
    for group in groups {
        out.push_str(&record(&group_cells(group)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disks::Disks;
    use crate::meta::Meta;
    use crate::provider::fake::{FakeDisk, FakeProvider};
    use crate::provider::{DiskRef, DiskType};
    use std::sync::Arc;

    fn disks() -> Disks {
        let provider = FakeProvider::named("AWS", "prod");
        [
            ("a", 10, Some("team-a"), DiskType::Ssd),
            ("b", 20, Some("team-a"), DiskType::Ssd),
            ("c", 5, None, DiskType::Hdd),
        ]
        .into_iter()
        .map(|(name, size, team, disk_type)| {
            let mut meta = Meta::new();
            if let Some(team) = team {
                meta.insert("team", team);
            }
            Arc::new(
                FakeDisk::new(&provider, name)
                    .size_gb(size)
                    .disk_type(disk_type)
                    .meta(meta),
            ) as DiskRef
        })
        .collect()
    }

    #[test]
    fn test_grouped_table() {
        let out = render(&disks().group("team"), "team");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("TEAM"));
        assert!(lines[1].contains("NONE") && lines[1].contains("hdd"));
        assert!(lines[2].contains("team-a") && lines[2].contains("30"));
    }

    #[test]
    fn test_grouped_csv() {
        let out = render_csv(&disks().group("team"), "team");
        assert_eq!(
            out,
            "PROVIDER,TEAM,TYPE,DISKS,SIZE_GB\r\nAWS,NONE,hdd,1,5\r\nAWS,team-a,ssd,2,30\r\n"
        );
    }
}
