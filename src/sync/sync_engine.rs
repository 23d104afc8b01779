use std::collections::BTreeSet;

use crate::calendar::{CalendarListEntry, Event};
use crate::storage::config::Config;
use crate::sync::google_api::{ApiError, CalendarApi, GoogleCalendarClient};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("API error: {0}")]
    ApiError(#[from] ApiError),
}

/// Loads a year of events across every enabled calendar.
pub struct SyncEngine<A> {
    api: A,
}

impl SyncEngine<GoogleCalendarClient> {
    pub fn from_config(config: &Config, access_token: String, cancel: CancellationToken) -> Self {
        let client = GoogleCalendarClient::new(access_token)
            .with_base_url(config.api.base_url.clone())
            .with_retry_policy(config.api.retry_policy())
            .with_cancellation(cancel);
        Self::new(client)
    }
}

impl<A: CalendarApi> SyncEngine<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub async fn calendars(&self) -> Result<Vec<CalendarListEntry>, SyncError> {
        Ok(self.api.fetch_calendar_list().await?)
    }

    /// Calendars are fetched one after another in calendar-list order and
    /// their events concatenated in that order.
    pub async fn fetch_year(
        &self,
        year: i32,
        disabled: &BTreeSet<String>,
    ) -> Result<Vec<Event>, SyncError> {
        let (enabled, skipped): (Vec<_>, Vec<_>) = self
            .api
            .fetch_calendar_list()
            .await?
            .into_iter()
            .partition(|c| !disabled.contains(&c.id));

        if !skipped.is_empty() {
            tracing::info!("Skipping {} disabled calendars", skipped.len());
        }

        let mut events = Vec::new();
        for calendar in &enabled {
            let mut calendar_events = self.api.fetch_events_for_year(&calendar.id, year).await?;
            tracing::info!("{}: {} events in {}", calendar.summary, calendar_events.len(), year);
            events.append(&mut calendar_events);
        }

        Ok(events)
    }
}
