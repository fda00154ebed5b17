//! Canonical DNS record model
//!
//! Records are identified by `(type, name)`; value and TTL are attributes.
//! A record may carry several values (an AAAA rrset with two addresses, the
//! apex NS set). They are stored sorted, de-duplicated and joined by a single
//! space, so two records compare equal exactly when their value sets do.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Record kinds managed by this tool
///
/// Declaration order is the lexicographic order of the type names, which the
/// derived `Ord` relies on for plan ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address
    A,
    /// IPv6 address
    #[serde(rename = "AAAA")]
    Aaaa,
    /// Alias to another name
    #[serde(rename = "CNAME")]
    Cname,
    /// Name servers anchoring the zone apex
    #[serde(rename = "ORIGIN")]
    Origin,
}

impl RecordType {
    /// All managed types, in sort order
    pub const ALL: [RecordType; 4] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Origin,
    ];

    /// Textual name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Origin => "ORIGIN",
        }
    }

    /// Whether two types may not share a name
    pub fn conflicts_with(&self, other: RecordType) -> bool {
        self != &other && (*self == RecordType::Cname || other == RecordType::Cname)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a record within a zone
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Record type
    pub record_type: RecordType,
    /// Name relative to the zone (`@` for the apex)
    pub name: String,
}

impl RecordKey {
    /// Create a new key
    pub fn new(record_type: RecordType, name: impl Into<String>) -> Self {
        Self {
            record_type,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.record_type, self.name)
    }
}

/// A DNS record, independent of any provider wire format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Name relative to the zone (`@` for the apex)
    pub name: String,
    /// Canonical value (space-separated when multi-valued)
    pub value: String,
    /// Time-to-live in seconds; `None` leaves it to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl Record {
    /// Create a single-valued record with the provider's default TTL
    pub fn new(record_type: RecordType, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            record_type,
            name: name.into(),
            value: value.into(),
            ttl: None,
        }
    }

    /// Create a record from several values, canonicalising their order
    pub fn from_values<I, S>(record_type: RecordType, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values: Vec<String> = values
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        values.sort();
        values.dedup();

        Self::new(record_type, name, values.join(" "))
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set or clear the TTL
    pub fn with_optional_ttl(mut self, ttl: Option<u32>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Identity of this record
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.record_type, self.name.clone())
    }

    /// Individual values of the record
    pub fn values(&self) -> Vec<&str> {
        self.value.split_whitespace().collect()
    }

    /// Whether `actual` already satisfies this record
    ///
    /// A record without a TTL accepts whatever TTL the provider reports.
    pub fn matches(&self, actual: &Record) -> bool {
        self.record_type == actual.record_type
            && self.name == actual.name
            && self.value == actual.value
            && (self.ttl.is_none() || self.ttl == actual.ttl)
    }

    /// Reject records that must never reach the reconciler
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::precondition(format!(
                "{} record has an empty name",
                self.record_type
            )));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(Error::precondition(format!(
                "{} record name contains whitespace: '{}'",
                self.record_type, self.name
            )));
        }
        if self.value.trim().is_empty() {
            return Err(Error::precondition(format!(
                "Record {} has an empty value",
                self.key()
            )));
        }
        if self.ttl == Some(0) {
            return Err(Error::precondition(format!(
                "Record {} has a zero TTL",
                self.key()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.record_type, self.name, self.value)?;
        if let Some(ttl) = self.ttl {
            write!(f, " (ttl {})", ttl)?;
        }
        Ok(())
    }
}

/// Records of one zone keyed by identity, iterated in `(type, name)` order
pub type RecordSet = BTreeMap<RecordKey, Record>;

/// Build a record set, validating every record and rejecting duplicate keys
pub fn record_set<I>(records: I) -> Result<RecordSet>
where
    I: IntoIterator<Item = Record>,
{
    let mut set = RecordSet::new();
    for record in records {
        record.validate()?;
        let key = record.key();
        if set.contains_key(&key) {
            return Err(Error::precondition(format!("Duplicate record {}", key)));
        }
        set.insert(key, record);
    }
    Ok(set)
}
