//! Re2o DNS zone payloads and their mapping to records
//!
//! | Re2o field                        | Record          |
//! |-----------------------------------|-----------------|
//! | `originv4.ipv4`                   | `A @`           |
//! | `originv6`                        | `AAAA @`        |
//! | `a_records[].{hostname, ipv4}`    | `A hostname`    |
//! | `aaaa_records[].{hostname, ipv6}` | `AAAA hostname` |
//! | `cname_records[].{hostname, alias}` | `CNAME hostname`, alias made absolute |
//! | `ns_records[].target`             | `ORIGIN @`      |

use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use zonesync_core::{Error, Record, RecordSet, RecordType, Result, record_set};

/// One entry of `/api/dns/zones/`
#[derive(Debug, Clone, Deserialize)]
pub struct ZonePayload {
    /// Zone name as Re2o stores it, with a leading dot
    pub name: String,
    #[serde(default)]
    pub originv4: Option<OriginV4>,
    #[serde(default)]
    pub originv6: Option<OriginV6>,
    #[serde(default)]
    pub a_records: Vec<ARecord>,
    #[serde(default)]
    pub aaaa_records: Vec<AaaaRecord>,
    #[serde(default)]
    pub cname_records: Vec<CnameRecord>,
    #[serde(default)]
    pub ns_records: Vec<NsRecord>,
}

impl ZonePayload {
    /// Zone name without the leading dot
    pub fn zone_name(&self) -> &str {
        self.name.strip_prefix('.').unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginV4 {
    pub ipv4: String,
}

/// IPv6 origin, serialised either as a bare address or as `{"ipv6": ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OriginV6 {
    Address(String),
    Object { ipv6: String },
}

impl OriginV6 {
    fn address(&self) -> &str {
        match self {
            OriginV6::Address(address) | OriginV6::Object { ipv6: address } => address,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ARecord {
    pub hostname: String,
    pub ipv4: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AaaaRecord {
    pub hostname: String,
    #[serde(default)]
    pub ipv6: Vec<Ipv6Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ipv6Entry {
    pub ipv6: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CnameRecord {
    pub hostname: String,
    pub alias: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NsRecord {
    pub target: String,
}

/// Build the desired record set of a zone
///
/// `ttl` is given to every record; `None` leaves the TTL to the provider.
pub fn zone_records(zone: &ZonePayload, ttl: Option<u32>) -> Result<RecordSet> {
    let name = zone.zone_name();
    let mut records = Vec::new();

    if let Some(origin) = &zone.originv4 {
        records.push(Record::new(RecordType::A, "@", ipv4(name, "@", &origin.ipv4)?));
    }

    if let Some(origin) = zone.originv6.as_ref().filter(|o| !o.address().is_empty()) {
        records.push(Record::new(
            RecordType::Aaaa,
            "@",
            ipv6(name, "@", origin.address())?,
        ));
    }

    for entry in &zone.a_records {
        let hostname = hostname(name, &entry.hostname)?;
        records.push(Record::new(RecordType::A, hostname, ipv4(name, hostname, &entry.ipv4)?));
    }

    for entry in &zone.aaaa_records {
        let hostname = hostname(name, &entry.hostname)?;
        if entry.ipv6.is_empty() {
            return Err(Error::source_format(format!(
                "Zone {}: AAAA record {} has no address",
                name, hostname
            )));
        }
        let addresses = entry
            .ipv6
            .iter()
            .map(|e| ipv6(name, hostname, &e.ipv6))
            .collect::<Result<Vec<_>>>()?;
        records.push(Record::from_values(RecordType::Aaaa, hostname, addresses));
    }

    for entry in &zone.cname_records {
        let hostname = hostname(name, &entry.hostname)?;
        if entry.alias.trim().is_empty() {
            return Err(Error::source_format(format!(
                "Zone {}: CNAME record {} has an empty alias",
                name, hostname
            )));
        }
        records.push(Record::new(RecordType::Cname, hostname, absolute(&entry.alias)));
    }

    let name_servers: Vec<String> = zone
        .ns_records
        .iter()
        .map(|ns| ns.target.trim())
        .filter(|target| !target.is_empty())
        .map(absolute)
        .collect();
    if !name_servers.is_empty() {
        records.push(Record::from_values(RecordType::Origin, "@", name_servers));
    }

    let records = records.into_iter().map(|r| r.with_optional_ttl(ttl));
    record_set(records).map_err(|e| Error::source_format(format!("Zone {}: {}", name, e)))
}

fn hostname<'a>(zone: &str, hostname: &'a str) -> Result<&'a str> {
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return Err(Error::source_format(format!(
            "Zone {}: record with an empty hostname",
            zone
        )));
    }
    Ok(hostname)
}

fn ipv4(zone: &str, hostname: &str, value: &str) -> Result<String> {
    value
        .trim()
        .parse::<Ipv4Addr>()
        .map(|ip| ip.to_string())
        .map_err(|_| {
            Error::source_format(format!(
                "Zone {}: A record {} has invalid address '{}'",
                zone, hostname, value
            ))
        })
}

fn ipv6(zone: &str, hostname: &str, value: &str) -> Result<String> {
    value
        .trim()
        .parse::<Ipv6Addr>()
        .map(|ip| ip.to_string())
        .map_err(|_| {
            Error::source_format(format!(
                "Zone {}: AAAA record {} has invalid address '{}'",
                zone, hostname, value
            ))
        })
}

/// Terminate a host name with the root dot
fn absolute(target: &str) -> String {
    let target = target.trim();
    if target.ends_with('.') {
        target.to_string()
    } else {
        format!("{}.", target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonesync_core::RecordKey;

    const ZONE: &str = r#"{
        "name": ".example.org",
        "originv4": {"ipv4": "192.0.2.10"},
        "originv6": "2001:db8::10",
        "a_records": [
            {"hostname": "www", "ipv4": "192.0.2.1"},
            {"hostname": "mail", "ipv4": "192.0.2.2"}
        ],
        "aaaa_records": [
            {"hostname": "www", "ipv6": [{"ipv6": "2001:db8::2"}, {"ipv6": "2001:db8::1"}]}
        ],
        "cname_records": [
            {"hostname": "ftp", "alias": "www.example.org"}
        ],
        "ns_records": [
            {"target": "ns2.example.org"},
            {"target": "ns1.example.org."}
        ],
        "mx_records": [{"priority": 10, "target": "mail.example.org"}]
    }"#;

    fn payload(raw: &str) -> ZonePayload {
        serde_json::from_str(raw).unwrap()
    }

    fn key(record_type: RecordType, name: &str) -> RecordKey {
        RecordKey::new(record_type, name)
    }

    #[test]
    fn maps_every_managed_field() {
        let records = zone_records(&payload(ZONE), None).unwrap();

        assert_eq!(records.len(), 7);
        assert_eq!(records[&key(RecordType::A, "@")].value, "192.0.2.10");
        assert_eq!(records[&key(RecordType::Aaaa, "@")].value, "2001:db8::10");
        assert_eq!(records[&key(RecordType::A, "mail")].value, "192.0.2.2");
        assert_eq!(
            records[&key(RecordType::Aaaa, "www")].value,
            "2001:db8::1 2001:db8::2"
        );
        assert_eq!(
            records[&key(RecordType::Cname, "ftp")].value,
            "www.example.org."
        );
        assert_eq!(
            records[&key(RecordType::Origin, "@")].value,
            "ns1.example.org. ns2.example.org."
        );
    }

    #[test]
    fn zone_name_drops_leading_dot() {
        assert_eq!(payload(ZONE).zone_name(), "example.org");
    }

    #[test]
    fn ttl_applies_to_every_record() {
        let records = zone_records(&payload(ZONE), Some(300)).unwrap();
        assert!(records.values().all(|r| r.ttl == Some(300)));
    }

    #[test]
    fn missing_sections_yield_empty_set() {
        let records = zone_records(&payload(r#"{"name": ".empty.org", "originv4": null}"#), None)
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn origin_v6_object_form_is_accepted() {
        let zone = payload(r#"{"name": ".example.org", "originv6": {"ipv6": "2001:db8::10"}}"#);
        let records = zone_records(&zone, None).unwrap();
        assert_eq!(records[&key(RecordType::Aaaa, "@")].value, "2001:db8::10");
    }

    #[test]
    fn invalid_address_is_a_format_error() {
        let zone = payload(
            r#"{"name": ".example.org", "a_records": [{"hostname": "www", "ipv4": "2001:db8::1"}]}"#,
        );
        assert!(matches!(zone_records(&zone, None), Err(Error::SourceFormat(_))));
    }

    #[test]
    fn duplicate_hostnames_are_a_format_error() {
        let zone = payload(
            r#"{"name": ".example.org", "a_records": [
                {"hostname": "www", "ipv4": "192.0.2.1"},
                {"hostname": "www", "ipv4": "192.0.2.2"}
            ]}"#,
        );
        assert!(matches!(zone_records(&zone, None), Err(Error::SourceFormat(_))));
    }

    #[test]
    fn empty_hostname_is_a_format_error() {
        let zone = payload(
            r#"{"name": ".example.org", "cname_records": [{"hostname": " ", "alias": "x.org"}]}"#,
        );
        assert!(matches!(zone_records(&zone, None), Err(Error::SourceFormat(_))));
    }
}
