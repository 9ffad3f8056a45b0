//! RFC 4180 CSV output

use super::{cells, headers, OutputOptions, TimeStyle};
use crate::disks::Disks;

fn field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One CSV record terminated by CRLF
pub(crate) fn record(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|f| field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// Header row followed by one record per disk, timestamps in RFC3339
pub fn render(disks: &Disks, options: &OutputOptions) -> String {
    let mut out = record(&headers(options));
    for disk in disks {
        out.push_str(&record(&cells(disk.as_ref(), options, TimeStyle::Absolute)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample;
    use crate::output::OutputFormat;

    #[test]
    fn test_quoting() {
        assert_eq!(field("plain"), "plain");
        assert_eq!(field("a,b"), "\"a,b\"");
        assert_eq!(field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_disk_records() {
        let options = OutputOptions {
            format: OutputFormat::Csv,
            verbose: true,
            ..Default::default()
        };
        let out = render(&sample(), &options);
        let lines: Vec<&str> = out.split("\r\n").collect();
        assert_eq!(lines[0], "PROVIDER,DISK,AGE,UNUSED,TYPE,SIZE_GB,META");
        assert_eq!(
            lines[1],
            "GCP,pvc-data,2024-05-02T12:00:00Z,2024-06-01T07:00:00Z,ssd,100,\"ns=db,prod,zone=europe-west1-b\""
        );
        assert_eq!(lines[2], "");
    }
}
