// # Gandi LiveDNS Provider
//
// `DnsProvider` implementation for the Gandi LiveDNS v5 API.
//
// ## Record Mapping
//
// | zonesync | Gandi rrset             |
// |----------|-------------------------|
// | A        | A                       |
// | AAAA     | AAAA                    |
// | CNAME    | CNAME                   |
// | ORIGIN   | NS at `@` only          |
//
// Every other rrset (MX, TXT, NS delegations, ...) is invisible to the
// reconciler and therefore never touched.
//
// ## Request Policy
//
// - One HTTP request per `apply` call, never retried
// - Zone listings are retried on transient failures (`max_retries`)
// - HTTP timeout from `[http] timeout_secs` (30 seconds by default)
//
// ## Security Requirements
//
// - API key NEVER appears in logs or `Debug` output
// - Provider construction fails if the key is empty
//
// ## API Reference
//
// - List records: GET `/livedns/domains/{fqdn}/records`
// - Create rrset: POST `/livedns/domains/{fqdn}/records/{name}/{type}`
// - Replace rrset: PUT `/livedns/domains/{fqdn}/records/{name}/{type}`
// - Delete rrset: DELETE `/livedns/domains/{fqdn}/records/{name}/{type}`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zonesync_core::traits::DnsProvider;
use zonesync_core::{
    Error, HttpConfig, Operation, Record, RecordSet, RecordType, RemoteState, Result, record_set,
};

/// Provider name used in logs and errors
const PROVIDER_NAME: &str = "gandi";

/// Gandi rrset as returned by the listing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Rrset {
    /// Name relative to the domain (`@` for the apex)
    pub rrset_name: String,
    /// Wire type (`A`, `NS`, `MX`, ...)
    pub rrset_type: String,
    /// Record values
    pub rrset_values: Vec<String>,
    /// TTL in seconds
    #[serde(default)]
    pub rrset_ttl: Option<u32>,
}

/// Body of a create or replace request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RrsetBody {
    /// Record values
    pub rrset_values: Vec<String>,
    /// TTL in seconds; Gandi applies its default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrset_ttl: Option<u32>,
}

impl From<&Record> for RrsetBody {
    fn from(record: &Record) -> Self {
        Self {
            rrset_values: record.values().into_iter().map(str::to_string).collect(),
            rrset_ttl: record.ttl,
        }
    }
}

/// Gandi wire type of a managed record type
pub fn wire_type(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::A => "A",
        RecordType::Aaaa => "AAAA",
        RecordType::Cname => "CNAME",
        RecordType::Origin => "NS",
    }
}

/// Managed record type of a Gandi rrset, if any
fn managed_type(rrset: &Rrset) -> Option<RecordType> {
    match rrset.rrset_type.as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::Aaaa),
        "CNAME" => Some(RecordType::Cname),
        "NS" if rrset.rrset_name == "@" => Some(RecordType::Origin),
        _ => None,
    }
}

/// Convert a zone listing into the managed-type record set
pub fn parse_rrsets(zone: &str, rrsets: Vec<Rrset>) -> Result<RecordSet> {
    let total = rrsets.len();
    let records: Vec<Record> = rrsets
        .into_iter()
        .filter_map(|rrset| {
            let record_type = managed_type(&rrset)?;
            Some(
                Record::from_values(record_type, rrset.rrset_name, &rrset.rrset_values)
                    .with_optional_ttl(rrset.rrset_ttl),
            )
        })
        .collect();

    tracing::debug!(
        "Zone {}: {} rrsets listed, {} of a managed type",
        zone,
        total,
        records.len()
    );

    record_set(records).map_err(|e| {
        Error::provider(
            PROVIDER_NAME,
            format!("Invalid listing for zone {}: {}", zone, e),
            RemoteState::Rejected,
        )
    })
}

/// Remote state implied by an HTTP error status
///
/// A 4xx means Gandi refused the request; anything else leaves the outcome
/// open.
pub fn remote_state_for_status(status: StatusCode) -> RemoteState {
    if status.is_client_error() {
        RemoteState::Rejected
    } else {
        RemoteState::Unknown
    }
}

/// Remote state implied by a transport error
fn remote_state_for_send_error(error: &reqwest::Error) -> RemoteState {
    if error.is_connect() || error.is_builder() {
        RemoteState::Rejected
    } else {
        RemoteState::Unknown
    }
}

/// Build a provider error from a failed HTTP response
fn status_error(status: StatusCode, action: &str, body: &str) -> Error {
    let state = remote_state_for_status(status);
    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: Invalid API key or insufficient permissions. Status: {}",
            status
        ),
        404 => format!("{}: zone or record not found. Status: {}", action, status),
        409 => format!("{}: record already exists. Status: {}", action, status),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!("Gandi server error (transient): {} - {}", status, body),
        _ => format!("{} failed: {} - {}", action, status, body),
    };
    Error::provider(PROVIDER_NAME, message, state)
}

/// A failed listing attempt
struct ReadFailure {
    error: Error,
    retryable: bool,
}

/// Gandi LiveDNS provider
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot for mutations. The engine decides what to
/// apply; the provider only translates operations into requests.
///
/// # Security
///
/// The Debug implementation does NOT expose the API key.
pub struct GandiProvider {
    /// Gandi API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// API base URL, without trailing slash
    api_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Retries of zone listings
    max_retries: u32,

    /// Delay between listing retries
    retry_delay: Duration,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for GandiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GandiProvider")
            .field("api_key", &"<REDACTED>")
            .field("api_url", &self.api_url)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl GandiProvider {
    /// Create a new Gandi provider
    ///
    /// # Parameters
    ///
    /// - `api_key`: Gandi API key with LiveDNS permissions on the zone
    /// - `api_url`: API base URL, usually `https://api.gandi.net/v5`
    /// - `http`: timeout and retry settings
    ///
    /// # Errors
    ///
    /// `Error::Config` if the key is empty or the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        http: &HttpConfig,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("Gandi API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(http.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
            max_retries: http.max_retries,
            retry_delay: http.retry_delay(),
        })
    }

    /// URL of the record listing of `zone`
    fn records_url(&self, zone: &str) -> String {
        format!("{}/livedns/domains/{}/records", self.api_url, zone)
    }

    /// URL of a single rrset
    fn rrset_url(&self, zone: &str, record: &Record) -> String {
        format!(
            "{}/{}/{}",
            self.records_url(zone),
            record.name,
            wire_type(record.record_type)
        )
    }

    fn authorization(&self) -> String {
        format!("Apikey {}", self.api_key)
    }

    /// List the zone once
    async fn list_once(&self, zone: &str) -> std::result::Result<Vec<Rrset>, ReadFailure> {
        let response = self
            .client
            .get(self.records_url(zone))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| ReadFailure {
                retryable: e.is_connect() || e.is_timeout(),
                error: Error::provider(
                    PROVIDER_NAME,
                    format!("HTTP request failed: {}", e),
                    RemoteState::Rejected,
                ),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ReadFailure {
                retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
                error: status_error(status, &format!("Listing zone {}", zone), &body),
            });
        }

        response.json().await.map_err(|e| ReadFailure {
            retryable: false,
            error: Error::provider(
                PROVIDER_NAME,
                format!("Failed to parse response: {}", e),
                RemoteState::Rejected,
            ),
        })
    }

    /// Send one mutating request
    ///
    /// With `missing_ok`, a 404 counts as success.
    async fn send_mutation(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
        missing_ok: bool,
    ) -> Result<StatusCode> {
        let response = request
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| {
                Error::provider(
                    PROVIDER_NAME,
                    format!("{}: HTTP request failed: {}", action, e),
                    remote_state_for_send_error(&e),
                )
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }
        if status == StatusCode::NOT_FOUND && missing_ok {
            return Ok(status);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(status_error(status, action, &body))
    }
}

#[async_trait]
impl DnsProvider for GandiProvider {
    /// List the managed-type records of `zone`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /livedns/domains/example.org/records
    /// Authorization: Apikey <key>
    /// ```
    async fn fetch_actual(&self, zone: &str) -> Result<RecordSet> {
        let mut attempt = 0;
        let rrsets = loop {
            match self.list_once(zone).await {
                Ok(rrsets) => break rrsets,
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Listing zone {} failed (attempt {}/{}): {}",
                        zone,
                        attempt,
                        self.max_retries + 1,
                        failure.error
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(failure) => return Err(failure.error),
            }
        };

        parse_rrsets(zone, rrsets)
    }

    /// Apply one operation with a single request
    ///
    /// # API Calls
    ///
    /// ```http
    /// POST   /livedns/domains/example.org/records/www/A   {"rrset_values": [...], "rrset_ttl": 300}
    /// PUT    /livedns/domains/example.org/records/www/A   {"rrset_values": [...]}
    /// DELETE /livedns/domains/example.org/records/www/A
    /// ```
    async fn apply(&self, zone: &str, operation: &Operation) -> Result<()> {
        let record = operation.record();
        let url = self.rrset_url(zone, record);
        let action = format!("{} {}", operation.kind(), record.key());

        let request = match operation {
            Operation::Delete { .. } => self.client.delete(&url),
            Operation::Create { .. } => self.client.post(&url).json(&RrsetBody::from(record)),
            Operation::Update { .. } => self.client.put(&url).json(&RrsetBody::from(record)),
        };

        let missing_ok = matches!(operation, Operation::Delete { .. });
        let status = self.send_mutation(request, &action, missing_ok).await?;
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("[{}] {} was already gone", zone, record.key());
        } else {
            tracing::debug!("[{}] {} -> {}", zone, action, status);
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}
