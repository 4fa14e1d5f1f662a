use super::{LogSource, SourceError, parse_timestamp};
use crate::domain::{NormalizedRecord, Severity};
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const JIRA_SOURCE_ID: &str = "jira";

/// Jira Cloud hard limit per request.
const PAGE_LIMIT: usize = 1000;
const AUDIT_PATH: &str = "rest/api/3/auditing/record";
/// Guards against a server that keeps handing out pages.
const MAX_PAGES: usize = 1000;

#[derive(Clone)]
pub struct JiraConfig {
    pub api_url: String,
    pub username: String,
    pub api_token: String,
    /// How far back the first poll reaches.
    pub initial_lookback: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Rate-limit wait when the server sends no `Retry-After`; doubled per retry.
    pub retry_base_delay: Duration,
    /// Upper bound on any single rate-limit wait, including `Retry-After`.
    pub max_retry_wait: Duration,
}

impl JiraConfig {
    pub fn new(api_url: impl Into<String>, username: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            username: username.into(),
            api_token: api_token.into(),
            initial_lookback: Duration::from_secs(5 * 3600),
            request_timeout: Duration::from_secs(30),
            max_retries: 5,
            retry_base_delay: Duration::from_secs(2),
            max_retry_wait: Duration::from_secs(300),
        }
    }
}

impl fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraConfig")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .field("initial_lookback", &self.initial_lookback)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct AuditPage {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    records: Vec<AuditRecord>,
    #[serde(default, rename = "nextPage")]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditRecord {
    id: Option<Value>,
    summary: Option<String>,
    created: Option<String>,
    category: Option<String>,
    remote_address: Option<String>,
    author_account_id: Option<String>,
    author: Option<Author>,
    object_item: Option<ObjectItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: Option<String>,
}

/// Polls the Jira Cloud audit log. Each poll covers the window from the end
/// of the last productive poll (or `initial_lookback` ago) up to now.
pub struct JiraSource {
    config: JiraConfig,
    client: Client,
    endpoint: Url,
    last_fetch: Option<DateTime<Utc>>,
}

impl JiraSource {
    pub fn new(config: JiraConfig) -> Result<Self, SourceError> {
        let mut endpoint = Url::parse(&config.api_url).map_err(|e| {
            SourceError::Config(format!("invalid Jira api_url {}: {}", config.api_url, e))
        })?;
        if endpoint.path().ends_with('/') {
            endpoint.set_path(&format!("{}{}", endpoint.path(), AUDIT_PATH));
        } else {
            endpoint.set_path(&format!("{}/{}", endpoint.path(), AUDIT_PATH));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SourceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            endpoint,
            last_fetch: None,
        })
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }

    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NormalizedRecord>, SourceError> {
        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut next: Option<Url> = None;

        for _ in 0..MAX_PAGES {
            let url = match next.take() {
                Some(url) => url,
                None => {
                    let mut url = self.endpoint.clone();
                    url.query_pairs_mut()
                        .append_pair("from", &from.to_rfc3339())
                        .append_pair("to", &to.to_rfc3339())
                        .append_pair("offset", &offset.to_string())
                        .append_pair("limit", &PAGE_LIMIT.to_string());
                    url
                }
            };

            let page = self.get_page(url).await?;
            let count = page.records.len();
            records.extend(page.records.into_iter().filter_map(to_record));

            if let Some(next_page) = page.next_page.filter(|p| !p.is_empty()) {
                next = Some(Url::parse(&next_page).map_err(|e| {
                    SourceError::InvalidResponse(format!("bad nextPage {}: {}", next_page, e))
                })?);
                continue;
            }

            offset += count;
            match page.total {
                Some(total) if count > 0 && (offset as u64) < total => continue,
                _ => return Ok(records),
            }
        }

        warn!("Stopped Jira pagination after {} pages", MAX_PAGES);
        Ok(records)
    }

    async fn get_page(&self, url: Url) -> Result<AuditPage, SourceError> {
        let mut retry = 0u32;
        loop {
            let response = self
                .client
                .get(url.clone())
                .basic_auth(&self.config.username, Some(&self.config.api_token))
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<AuditPage>().await?);
            }

            let exhausted = response
                .headers()
                .get("X-RateLimit-Remaining")
                .is_some_and(|v| v.as_bytes() == b"0");
            if status != StatusCode::TOO_MANY_REQUESTS && !exhausted {
                let body = response.text().await.unwrap_or_default();
                return Err(SourceError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            if retry >= self.config.max_retries {
                return Err(SourceError::RateLimited(retry));
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
            let wait = retry_after
                .unwrap_or_else(|| {
                    self.config
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(retry))
                })
                .min(self.config.max_retry_wait)
                + Duration::from_secs_f64(rand::rng().random_range(0.0..0.5));

            warn!(
                "Jira rate limited, sleeping {:.1}s (retry {}/{})",
                wait.as_secs_f64(),
                retry + 1,
                self.config.max_retries
            );
            tokio::time::sleep(wait).await;
            retry += 1;
        }
    }
}

impl LogSource for JiraSource {
    fn name(&self) -> &str {
        JIRA_SOURCE_ID
    }

    async fn poll(&mut self) -> Result<Vec<NormalizedRecord>, SourceError> {
        let end = Utc::now();
        let start = match self.last_fetch {
            Some(last) => last,
            None => {
                let lookback = chrono::Duration::from_std(self.config.initial_lookback)
                    .unwrap_or_else(|_| chrono::Duration::hours(5));
                info!("Initial Jira fetch from {} to {}", end - lookback, end);
                end - lookback
            }
        };

        let records = self.fetch_window(start, end).await?;
        if !records.is_empty() {
            self.last_fetch = Some(end);
        }
        debug!("Fetched {} Jira audit records", records.len());
        Ok(records)
    }
}

fn severity_for(category: &str) -> Severity {
    match category.to_ascii_uppercase().as_str() {
        "SECURITY" => Severity::Critical,
        "ADMIN" => Severity::Warning,
        _ => Severity::Info,
    }
}

fn to_record(record: AuditRecord) -> Option<NormalizedRecord> {
    let Some(timestamp) = record.created.as_deref().and_then(parse_timestamp) else {
        warn!("Skipping Jira audit record without a usable created time: {:?}", record.id);
        return None;
    };

    let category = record.category.unwrap_or_else(|| "unknown".to_string());
    let event_id = record.id.and_then(|id| match id {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let user = record
        .author
        .and_then(|a| a.display_name)
        .or(record.author_account_id);

    Some(
        NormalizedRecord::builder(JIRA_SOURCE_ID, record.summary.unwrap_or_default())
            .timestamp(timestamp)
            .severity(severity_for(&category))
            .category(category)
            .maybe_event_id(event_id)
            .maybe_field("user", user)
            .maybe_field("ip_address", record.remote_address)
            .maybe_field("object", record.object_item.and_then(|o| o.name))
            .build(),
    )
}
