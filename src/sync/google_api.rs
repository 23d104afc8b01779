use crate::calendar::{AccessRole, CalendarListEntry, Event, EventStatus};
use crate::sync::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const EVENT_FIELDS: &str =
    "items(id,status,summary,description,location,start,end,htmlLink),nextPageToken";
pub const CALENDAR_LIST_FIELDS: &str = "items(id,summary,accessRole),nextPageToken";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Calendar API error: {0}")]
    Status(u16),
    #[error("Rate limit exceeded after {retries} retries")]
    RateLimited { retries: u32 },
    #[error("Access token rejected; sign in again")]
    Unauthorized,
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Request cancelled")]
    Cancelled,
}

/// Half-open `[start, end)` window covering one calendar year in UTC.
pub struct YearRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl YearRange {
    pub fn new(year: i32) -> Result<Self, ApiError> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| ApiError::ParseError(format!("Invalid year: {}", year)))?
            .and_utc();
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| ApiError::ParseError(format!("Invalid year: {}", year)))?
            .and_utc();
        Ok(Self { start, end })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    items: Option<Vec<T>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCalendarListEntry {
    id: String,
    summary: Option<String>,
    access_role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<GoogleDateTime>,
    end: Option<GoogleDateTime>,
    status: Option<String>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl GoogleDateTime {
    /// Returns the instant and whether it came from an all-day `date`.
    fn to_utc(&self) -> Result<(DateTime<Utc>, bool), ApiError> {
        if let Some(date_time) = &self.date_time {
            let parsed = DateTime::parse_from_rfc3339(date_time)
                .map_err(|e| ApiError::ParseError(format!("Invalid dateTime: {}", e)))?;
            return Ok((parsed.with_timezone(&Utc), false));
        }
        if let Some(date) = &self.date {
            let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| ApiError::ParseError(format!("Invalid date: {}", e)))?;
            let midnight = parsed
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| ApiError::ParseError("Invalid date".to_string()))?;
            return Ok((midnight.and_utc(), true));
        }
        Err(ApiError::ParseError("Missing date and dateTime".to_string()))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn fetch_calendar_list(&self) -> Result<Vec<CalendarListEntry>, ApiError>;

    async fn fetch_events_for_year(
        &self,
        calendar_id: &str,
        year: i32,
    ) -> Result<Vec<Event>, ApiError>;
}

pub struct GoogleCalendarClient {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl GoogleCalendarClient {
    pub fn new(access_token: String) -> Self {
        Self {
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            access_token,
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pagination stops with [`ApiError::Cancelled`] once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, ApiError> {
        let mut retries = 0;

        loop {
            let response = self.client
                .get(url)
                .bearer_auth(&self.access_token)
                .query(query)
                .send()
                .await?;

            let status = response.status();
            tracing::debug!("GET {} response status: {}", url, status);

            if status == StatusCode::UNAUTHORIZED {
                tracing::error!("Authentication failed for {}", url);
                return Err(ApiError::Unauthorized);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if !self.retry.allows_retry(retries) {
                    tracing::error!("Giving up on {} after {} rate-limited retries", url, retries);
                    return Err(ApiError::RateLimited { retries });
                }

                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok());
                let delay = self.retry.delay_for(retry_after, Utc::now());
                retries += 1;
                tracing::warn!(
                    "Rate limited on {}; retry {} in {:?} (Retry-After: {:?})",
                    url, retries, delay, retry_after
                );

                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            if !status.is_success() {
                tracing::error!("Request to {} failed with status {}", url, status);
                return Err(ApiError::Status(status.as_u16()));
            }

            return Ok(response);
        }
    }

    /// Follows `nextPageToken` until a page omits it. Pages are requested
    /// strictly one after another and items keep page-arrival order.
    async fn paginate<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Pagination of {} cancelled after {} pages", url, pages);
                return Err(ApiError::Cancelled);
            }

            let mut params = query.to_vec();
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self.get_with_retry(url, &params).await?;
            let page: Page<T> = response
                .json()
                .await
                .map_err(|e| ApiError::ParseError(format!("Invalid page body: {}", e)))?;

            pages += 1;
            items.extend(page.items.unwrap_or_default());

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!("Fetched {} items from {} in {} pages", items.len(), url, pages);
        Ok(items)
    }

    fn convert_from_google_event(&self, ge: GoogleEvent, calendar_id: &str) -> Result<Event, ApiError> {
        let (start, all_day) = ge.start
            .ok_or_else(|| ApiError::ParseError("Missing start".to_string()))?
            .to_utc()?;
        let (end, _) = ge.end
            .ok_or_else(|| ApiError::ParseError("Missing end".to_string()))?
            .to_utc()?;

        Ok(Event {
            id: ge.id.ok_or_else(|| ApiError::ParseError("Missing event id".to_string()))?,
            calendar_id: calendar_id.to_string(),
            title: ge.summary.unwrap_or_default(),
            description: ge.description,
            location: ge.location,
            start,
            end,
            all_day,
            status: EventStatus::from_google(ge.status.as_deref()),
            html_link: ge.html_link,
        })
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn fetch_calendar_list(&self) -> Result<Vec<CalendarListEntry>, ApiError> {
        let url = format!("{}/users/me/calendarList", self.base_url);

        tracing::info!("Fetching calendar list");

        let entries: Vec<GoogleCalendarListEntry> = self
            .paginate(&url, &[("fields", CALENDAR_LIST_FIELDS.to_string())])
            .await?;

        let calendars: Vec<CalendarListEntry> = entries
            .into_iter()
            .map(|entry| CalendarListEntry {
                summary: entry.summary.unwrap_or_else(|| entry.id.clone()),
                access_role: AccessRole::from_google(entry.access_role.as_deref()),
                id: entry.id,
            })
            .collect();

        tracing::info!("Fetched {} calendars", calendars.len());
        Ok(calendars)
    }

    async fn fetch_events_for_year(
        &self,
        calendar_id: &str,
        year: i32,
    ) -> Result<Vec<Event>, ApiError> {
        let range = YearRange::new(year)?;
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        tracing::info!("Fetching {} events for {}", calendar_id, year);

        let raw: Vec<GoogleEvent> = self
            .paginate(
                &url,
                &[
                    ("timeMin", range.start.to_rfc3339()),
                    ("timeMax", range.end.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                    ("maxResults", "2500".to_string()),
                    ("fields", EVENT_FIELDS.to_string()),
                ],
            )
            .await?;

        let events: Vec<Event> = raw
            .into_iter()
            .filter_map(|ge| match self.convert_from_google_event(ge, calendar_id) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Skipping malformed event in {}: {}", calendar_id, e);
                    None
                }
            })
            .collect();

        tracing::info!("Fetched {} events for {} in {}", events.len(), calendar_id, year);
        Ok(events)
    }
}
