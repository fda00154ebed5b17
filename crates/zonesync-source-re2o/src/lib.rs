// # Re2o Record Source
//
// `RecordSource` and `StatusNotifier` implementations over the Re2o REST API.
//
// ## Purpose
//
// Re2o is authoritative for the records of every zone it serves. This crate
// reads the zone payloads, maps them to canonical records and, once a run has
// converged, clears the regeneration flag of the DNS service.
//
// ## API Usage
//
// - Authentication: POST `/api/token-auth/` with username and password, then
//   `Authorization: Token <token>` on every request
// - Zones: GET `/api/dns/zones/`, following DRF pagination (`next`)
// - Service status: GET `/api/services/regen/`, PATCH `need_regen=false`
//
// ## Caching
//
// The token and the zone list are fetched once per `Re2oSource`. The binary
// builds one source per run.

pub mod zone;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::OnceCell;

use zonesync_core::traits::{RecordSource, StatusNotifier};
use zonesync_core::{Error, HttpConfig, Re2oConfig, RecordSet, Result};

pub use zone::{ZonePayload, zone_records};

/// A DRF list response, paginated or not
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Page<T> {
    Paginated {
        next: Option<String>,
        results: Vec<T>,
    },
    Plain(Vec<T>),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// One entry of `/api/services/regen/`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRegen {
    /// Server hosting the service
    #[serde(default)]
    pub hostname: Option<String>,
    /// Service name (`dns`, `dhcp`, ...)
    pub service_name: String,
    /// Whether the service waits for regeneration
    pub need_regen: bool,
    /// Detail URL of the entry, target of the PATCH
    #[serde(default)]
    pub api_url: Option<String>,
}

/// Entries of `service` still flagged for regeneration
pub fn pending_regen<'a>(entries: &'a [ServiceRegen], service: &str) -> Vec<&'a ServiceRegen> {
    entries
        .iter()
        .filter(|entry| entry.service_name == service && entry.need_regen)
        .collect()
}

/// Re2o REST API client
///
/// # Security
///
/// The Debug implementation does NOT expose the password or the token.
pub struct Re2oSource {
    /// API base URL, e.g. `https://re2o.example.org/api`
    base_url: String,

    username: String,

    /// ⚠️ NEVER log this value
    password: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Retries of idempotent reads
    max_retries: u32,

    /// Delay between read retries
    retry_delay: Duration,

    /// TTL per zone name
    zone_ttls: BTreeMap<String, u32>,

    /// Authentication token, obtained on first use
    token: OnceCell<String>,

    /// Zone payloads, fetched on first use
    zones: OnceCell<Vec<ZonePayload>>,
}

impl std::fmt::Debug for Re2oSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Re2oSource")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("max_retries", &self.max_retries)
            .field("zone_ttls", &self.zone_ttls)
            .finish()
    }
}

impl Re2oSource {
    /// Create a new Re2o source
    ///
    /// # Errors
    ///
    /// `Error::Config` if the section is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: &Re2oConfig, http: &HttpConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(http.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api_base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
            max_retries: http.max_retries,
            retry_delay: http.retry_delay(),
            zone_ttls: BTreeMap::new(),
            token: OnceCell::new(),
            zones: OnceCell::new(),
        })
    }

    /// Give every record of `zone` this TTL
    pub fn with_zone_ttl(mut self, zone: impl Into<String>, ttl: u32) -> Self {
        self.zone_ttls.insert(zone.into(), ttl);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Authentication token, requested on first use
    async fn token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| async {
                tracing::debug!("Requesting Re2o token for {}", self.username);
                let response = self
                    .client
                    .post(self.endpoint("token-auth/"))
                    .json(&serde_json::json!({
                        "username": self.username,
                        "password": self.password,
                    }))
                    .send()
                    .await
                    .map_err(|e| {
                        Error::source_unavailable(format!("Re2o authentication failed: {}", e))
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Error::source_unavailable(format!(
                        "Re2o authentication failed: invalid credentials or permissions. Status: {}",
                        status
                    )));
                }

                let body: TokenResponse = response.json().await.map_err(|e| {
                    Error::source_format(format!("Invalid token response: {}", e))
                })?;
                Ok(body.token)
            })
            .await?;
        Ok(token)
    }

    /// GET a URL once
    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.token().await?;
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token {}", token))
            .send()
            .await
            .map_err(|e| Error::source_unavailable(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::source_unavailable(format!(
                "GET {} failed. Status: {}",
                url, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::source_format(format!("Invalid response from {}: {}", url, e)))
    }

    /// GET a URL, retrying unavailability
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Err(e @ Error::SourceUnavailable(_)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Re2o request failed (attempt {}/{}): {}",
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => return other,
            }
        }
    }

    /// Fetch every item of a list endpoint
    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(self.endpoint(path));

        while let Some(url) = next {
            match self.get_json::<Page<T>>(&url).await? {
                Page::Paginated {
                    next: following,
                    results,
                } => {
                    items.extend(results);
                    next = following;
                }
                Page::Plain(results) => {
                    items.extend(results);
                    next = None;
                }
            }
        }

        tracing::debug!("Fetched {} items from {}", items.len(), path);
        Ok(items)
    }

    /// Zone payloads, fetched on first use
    async fn zones(&self) -> Result<&[ZonePayload]> {
        let zones = self
            .zones
            .get_or_try_init(|| self.list::<ZonePayload>("dns/zones/"))
            .await?;
        Ok(zones)
    }
}

#[async_trait]
impl RecordSource for Re2oSource {
    async fn list_zones(&self) -> Result<Vec<String>> {
        let zones = self.zones().await?;
        Ok(zones.iter().map(|z| z.zone_name().to_string()).collect())
    }

    async fn fetch_desired(&self, zone: &str) -> Result<RecordSet> {
        let payload = self
            .zones()
            .await?
            .iter()
            .find(|z| z.zone_name() == zone)
            .ok_or_else(|| {
                Error::source_unavailable(format!("Zone {} is not served by Re2o", zone))
            })?;

        let records = zone_records(payload, self.zone_ttls.get(zone).copied())?;
        tracing::debug!("Re2o declares {} records for zone {}", records.len(), zone);
        Ok(records)
    }

    fn source_name(&self) -> &'static str {
        "re2o"
    }
}

#[async_trait]
impl StatusNotifier for Re2oSource {
    async fn notify_success(&self, service: &str) -> Result<()> {
        let entries = self.list::<ServiceRegen>("services/regen/").await?;
        let pending = pending_regen(&entries, service);
        if pending.is_empty() {
            tracing::debug!("No {} service waits for regeneration", service);
            return Ok(());
        }

        let token = self.token().await?;
        for entry in pending {
            let host = entry.hostname.as_deref().unwrap_or("<unknown>");
            let Some(url) = &entry.api_url else {
                tracing::warn!("Service {} on {} has no api_url, skipping", service, host);
                continue;
            };

            let response = self
                .client
                .patch(url)
                .header("Authorization", format!("Token {}", token))
                .json(&serde_json::json!({ "need_regen": false }))
                .send()
                .await
                .map_err(|e| Error::source_unavailable(format!("PATCH {} failed: {}", url, e)))?;

            if !response.status().is_success() {
                return Err(Error::source_unavailable(format!(
                    "Failed to clear regeneration flag of {} on {}. Status: {}",
                    service,
                    host,
                    response.status()
                )));
            }
            tracing::info!("Marked service {} on {} as regenerated", service, host);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Re2oConfig {
        Re2oConfig {
            hostname: "re2o.example.org".to_string(),
            username: "dns-bot".to_string(),
            password: "hunter2".to_string(),
            use_tls: true,
            service_name: "dns".to_string(),
        }
    }

    #[test]
    fn test_endpoints() {
        let source = Re2oSource::new(&config(), &HttpConfig::default()).unwrap();
        assert_eq!(
            source.endpoint("dns/zones/"),
            "https://re2o.example.org/api/dns/zones/"
        );
        assert_eq!(
            source.endpoint("/token-auth/"),
            "https://re2o.example.org/api/token-auth/"
        );
    }

    #[test]
    fn test_password_not_exposed_in_debug() {
        let source = Re2oSource::new(&config(), &HttpConfig::default()).unwrap();
        let debug_str = format!("{:?}", source);
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("Re2oSource"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.hostname = "https://re2o.example.org".to_string();
        assert!(matches!(
            Re2oSource::new(&config, &HttpConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_page_parsing() {
        let paginated: Page<u32> =
            serde_json::from_str(r#"{"count": 3, "next": "https://x/?page=2", "previous": null, "results": [1, 2]}"#)
                .unwrap();
        assert!(matches!(
            paginated,
            Page::Paginated { next: Some(_), ref results } if results == &vec![1, 2]
        ));

        let plain: Page<u32> = serde_json::from_str("[1, 2, 3]").unwrap();
        assert!(matches!(plain, Page::Plain(ref items) if items.len() == 3));
    }

    #[test]
    fn test_pending_regen_filters_service_and_flag() {
        let entries: Vec<ServiceRegen> = serde_json::from_str(
            r#"[
                {"hostname": "ns1", "service_name": "dns", "need_regen": true, "api_url": "https://re2o/api/services/regen/1/"},
                {"hostname": "ns2", "service_name": "dns", "need_regen": false, "api_url": "https://re2o/api/services/regen/2/"},
                {"hostname": "dhcp1", "service_name": "dhcp", "need_regen": true, "api_url": "https://re2o/api/services/regen/3/"}
            ]"#,
        )
        .unwrap();

        let pending = pending_regen(&entries, "dns");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].hostname.as_deref(), Some("ns1"));
    }

    #[test]
    fn test_zone_ttls() {
        let source = Re2oSource::new(&config(), &HttpConfig::default())
            .unwrap()
            .with_zone_ttl("example.org", 300);
        assert_eq!(source.zone_ttls.get("example.org"), Some(&300));
    }

    #[tokio::test]
    async fn test_unreachable_source_is_unavailable() {
        let mut config = config();
        config.hostname = "127.0.0.1:9".to_string();
        config.use_tls = false;
        let http = HttpConfig {
            timeout_secs: 2,
            max_retries: 0,
            retry_delay_secs: 0,
        };
        let source = Re2oSource::new(&config, &http).unwrap();

        let result = source.list_zones().await;
        assert!(matches!(result, Err(Error::SourceUnavailable(_))));
    }
}
