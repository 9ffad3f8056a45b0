//! `KEY=VALUE` metadata filter

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::provider::Disk;

/// Keep disks whose metadata has `key` set to exactly `value`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub value: String,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether `disk` passes the filter
    pub fn matches(&self, disk: &dyn Disk) -> bool {
        disk.meta().matches(&self.key, &self.value)
    }
}

impl FromStr for Filter {
    type Err = Error;

    /// `KEY=VALUE`, or `KEY` alone for an empty value
    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s.split_once('=').unwrap_or((s, ""));
        if key.is_empty() {
            return Err(Error::MissingKey);
        }
        Ok(Filter::new(key, value))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disks::Disks;
    use crate::meta::Meta;
    use crate::provider::fake::{FakeDisk, FakeProvider};
    use crate::provider::DiskRef;
    use std::sync::Arc;

    #[test]
    fn test_parse() {
        let cases: &[(&str, Option<(&str, &str)>)] = &[
            ("zone=us-east-1a", Some(("zone", "us-east-1a"))),
            ("zone", Some(("zone", ""))),
            ("zone=", Some(("zone", ""))),
            ("k=a=b", Some(("k", "a=b"))),
            ("", None),
            ("=", None),
            ("=value", None),
        ];

        for (input, expected) in cases {
            let parsed = input.parse::<Filter>();
            match expected {
                Some((key, value)) => {
                    let filter = parsed.unwrap();
                    assert_eq!(filter, Filter::new(*key, *value), "input {:?}", input);
                }
                None => {
                    let err = parsed.unwrap_err();
                    assert_eq!(err.to_string(), "missing key", "input {:?}", input);
                }
            }
        }
    }

    #[test]
    fn test_zone_filter_keeps_matching_disk() {
        let provider = FakeProvider::named("AWS", "prod");
        let disks: Disks = [("east", "us-east-1a"), ("west", "us-west-2b")]
            .into_iter()
            .map(|(name, zone)| {
                Arc::new(FakeDisk::new(&provider, name).meta(Meta::from_iter([("zone", zone)])))
                    as DiskRef
            })
            .collect();

        let filter: Filter = "zone=us-east-1a".parse().unwrap();
        let kept = disks.filter(|d| filter.matches(d.as_ref()));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get(0).unwrap().name(), "east");
    }

    #[test]
    fn test_empty_value_requires_key_present() {
        let provider = FakeProvider::named("GCP", "p");
        let with_empty = FakeDisk::new(&provider, "a").meta(Meta::from_iter([("team", "")]));
        let without = FakeDisk::new(&provider, "b");

        let filter: Filter = "team".parse().unwrap();
        assert!(filter.matches(&with_empty));
        assert!(!filter.matches(&without));
    }
}
