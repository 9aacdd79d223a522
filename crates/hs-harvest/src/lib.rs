//! Harvest v2 API integration for harvest-sync.
//!
//! Implements [`hs_core::LedgerClient`] on top of the time entries and company
//! endpoints:
//! - `GET /company` to check the account books durations
//! - `GET /time_entries`, following `links.next` until exhausted
//! - `POST /time_entries` and `PATCH /time_entries/{id}`

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use hs_core::{EntryPayload, LedgerClient, LedgerEntry};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const HARVEST_API_URL: &str = "https://api.harvestapp.com/v2";
const USER_AGENT: &str = concat!("harvest-sync/", env!("CARGO_PKG_VERSION"));
/// Largest page size Harvest accepts.
const PAGE_SIZE: u32 = 2000;

/// Harvest client errors.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The provided access token was invalid.
    #[error("invalid access token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The account tracks time with start/stop timers.
    #[error("Harvest account is configured for start/end timers; duration mode is required")]
    TimerMode,
}

/// Harvest API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct HarvestClient {
    http: reqwest::Client,
    token: String,
    account_id: u64,
    base_url: String,
}

impl fmt::Debug for HarvestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestClient")
            .field("token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HarvestClient {
    /// Creates a new client for the given account.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if the
    /// HTTP client fails to build.
    pub fn new(token: impl Into<String>, account_id: u64) -> Result<Self, HarvestError> {
        let token = token.into();

        if token.is_empty() {
            return Err(HarvestError::InvalidToken {
                reason: "token cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(HarvestError::InvalidToken {
                reason: "token cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(HarvestError::ClientBuild)?;

        Ok(Self {
            http,
            token,
            account_id,
            base_url: HARVEST_API_URL.to_string(),
        })
    }

    /// Points the client at a different API root (e.g. a proxy).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Harvest-Account-Id", self.account_id.to_string())
    }

    /// Sends a request and returns the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, HarvestError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(status, &body).unwrap_or_else(|| HarvestError::Api {
                status,
                message: body,
            }));
        }
        Ok(body)
    }

    /// Fetches the account's company settings.
    pub async fn company(&self) -> Result<CompanySettings, HarvestError> {
        let body = self.send(self.http.get(self.url("/company"))).await?;
        serde_json::from_str(&body).map_err(|err| HarvestError::InvalidResponse(err.to_string()))
    }

    /// Fetches one page of time entries.
    async fn entries_page(&self, request: RequestBuilder) -> Result<EntriesPage, HarvestError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|err| HarvestError::InvalidResponse(err.to_string()))
    }
}

impl LedgerClient for HarvestClient {
    type Error = HarvestError;

    async fn verify_mode(&self) -> Result<(), HarvestError> {
        let company = self.company().await?;
        ensure_duration_mode(&company)?;
        tracing::debug!(
            company = company.name.as_deref().unwrap_or("unknown"),
            "Harvest account uses duration mode"
        );
        Ok(())
    }

    async fn list_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, HarvestError> {
        let first = self.http.get(self.url("/time_entries")).query(&[
            ("from", start.to_string()),
            ("to", end.to_string()),
            ("per_page", PAGE_SIZE.to_string()),
        ]);

        let page = self.entries_page(first).await?;
        // The next link already carries from/to/per_page.
        collect_pages(page, |next| self.entries_page(self.http.get(next))).await
    }

    async fn create_entry(&self, payload: &EntryPayload) -> Result<(), HarvestError> {
        self.send(self.http.post(self.url("/time_entries")).json(payload))
            .await?;
        Ok(())
    }

    async fn patch_hours(&self, entry_id: u64, hours: f64) -> Result<(), HarvestError> {
        let body = serde_json::json!({ "hours": hours });
        self.send(
            self.http
                .patch(self.url(&format!("/time_entries/{entry_id}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

/// The subset of `GET /company` the sync cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanySettings {
    #[serde(default)]
    pub name: Option<String>,
    /// `true` when the account tracks start/end timestamps instead of
    /// durations. Treated as `true` when absent.
    #[serde(default)]
    pub wants_timestamp_timers: Option<bool>,
}

fn ensure_duration_mode(company: &CompanySettings) -> Result<(), HarvestError> {
    if company.wants_timestamp_timers.unwrap_or(true) {
        return Err(HarvestError::TimerMode);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct EntriesPage {
    time_entries: Vec<LedgerEntry>,
    links: PageLinks,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

/// Drains a paginated listing, requesting each `links.next` URL until a page
/// has none.
async fn collect_pages<F, Fut>(
    mut page: EntriesPage,
    mut fetch: F,
) -> Result<Vec<LedgerEntry>, HarvestError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<EntriesPage, HarvestError>>,
{
    let mut entries = std::mem::take(&mut page.time_entries);
    let mut pages = 1;
    while let Some(next) = page.links.next.take() {
        page = fetch(next).await?;
        entries.append(&mut page.time_entries);
        pages += 1;
    }

    tracing::debug!(pages, entries = entries.len(), "listed Harvest time entries");
    Ok(entries)
}

/// Extracts a readable message from Harvest's error bodies.
///
/// Validation failures use `{"message": ...}`; auth failures use the OAuth
/// `{"error": ..., "error_description": ...}` shape.
fn parse_api_error(status: StatusCode, body: &str) -> Option<HarvestError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: Option<String>,
        error: Option<String>,
        error_description: Option<String>,
    }

    let payload: ErrorPayload = serde_json::from_str(body).ok()?;
    let message = payload
        .message
        .or(payload.error_description)
        .or(payload.error)?;
    Some(HarvestError::Api { status, message })
}
