use super::models::{
    AppointmentType, CalendarEvent, EventDraft, Operation, OperationResult, ResponseBody,
};
use super::strategies::{first_success, DeleteStrategy, DELETE_CHAIN};
use super::wire::{classify_body, event_payload, events_from_value};
use crate::config::{AppointmentEndpoints, Config};
use crate::error::{invalid_event, Error, SyncResult};
use crate::utils::time::{day_window, format_remote_timestamp};
use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use reqwest::{Client, Method, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// Everything one operation needs from the configuration, read once at its start
#[derive(Debug, Clone)]
struct EndpointSnapshot {
    endpoints: AppointmentEndpoints,
    zone: Tz,
    timeout: Duration,
}

/// Stateless client for the per-calendar event webhooks.
///
/// Holds no cache: callers re-fetch after every mutation.
#[derive(Clone)]
pub struct RemoteEventStore {
    config: Arc<RwLock<Config>>,
    client: Client,
}

impl RemoteEventStore {
    pub fn new(config: Arc<RwLock<Config>>) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: Arc<RwLock<Config>>, client: Client) -> Self {
        Self { config, client }
    }

    async fn snapshot(&self, appointment_type: &AppointmentType) -> SyncResult<EndpointSnapshot> {
        let config = self.config.read().await;
        Ok(EndpointSnapshot {
            endpoints: config.endpoints(appointment_type)?,
            zone: config.tz()?,
            timeout: config.request_timeout(),
        })
    }

    /// Events between `start` and `end` (inclusive) on one calendar
    pub async fn fetch(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        appointment_type: &AppointmentType,
    ) -> SyncResult<Vec<CalendarEvent>> {
        if end < start {
            return Err(invalid_event("fetch window ends before it starts"));
        }
        let snapshot = self.snapshot(appointment_type).await?;

        let mut url = snapshot.endpoints.fetch.clone();
        url.query_pairs_mut()
            .append_pair("start", &format_remote_timestamp(&start, snapshot.zone))
            .append_pair("end", &format_remote_timestamp(&end, snapshot.zone));

        debug!("Fetching {} events from {}", appointment_type, url);
        let body = self
            .send(Operation::Fetch, Method::GET, url, None, snapshot.timeout)
            .await?;

        let events = match body {
            ResponseBody::Empty => Vec::new(),
            ResponseBody::Malformed(_) => {
                warn!("Fetch for {} returned a non-JSON body, showing no events", appointment_type);
                Vec::new()
            }
            ResponseBody::Json(value) => events_from_value(value, snapshot.zone),
        };

        debug!("Fetched {} events for {}", events.len(), appointment_type);
        Ok(events)
    }

    /// Events of one whole day in the configured zone
    pub async fn fetch_day(
        &self,
        date: NaiveDate,
        appointment_type: &AppointmentType,
    ) -> SyncResult<Vec<CalendarEvent>> {
        let zone = self.config.read().await.tz()?;
        let (start, end) = day_window(date, zone)?;
        self.fetch(start, end, appointment_type).await
    }

    /// Create a new event
    pub async fn create(
        &self,
        draft: &EventDraft,
        appointment_type: &AppointmentType,
    ) -> SyncResult<OperationResult> {
        draft.validate()?;
        let snapshot = self.snapshot(appointment_type).await?;
        let payload = event_payload(draft, None, snapshot.zone)?;

        let body = self
            .send(
                Operation::Create,
                Method::POST,
                snapshot.endpoints.add.clone(),
                Some(payload),
                snapshot.timeout,
            )
            .await?;

        info!("Created event \"{}\" on {}", draft.summary.trim(), appointment_type);
        Ok(OperationResult::new(Operation::Create, body))
    }

    /// Replace an existing event with the complete state in `draft`
    pub async fn update(
        &self,
        event_id: &str,
        draft: &EventDraft,
        appointment_type: &AppointmentType,
    ) -> SyncResult<OperationResult> {
        if event_id.trim().is_empty() {
            return Err(invalid_event("event id must not be empty"));
        }
        draft.validate()?;
        let snapshot = self.snapshot(appointment_type).await?;
        let payload = event_payload(draft, Some(event_id), snapshot.zone)?;

        let body = self
            .send(
                Operation::Update,
                Method::PUT,
                snapshot.endpoints.update.clone(),
                Some(payload),
                snapshot.timeout,
            )
            .await?;

        info!("Updated event {} on {}", event_id, appointment_type);
        Ok(OperationResult::new(Operation::Update, body))
    }

    /// Delete an event, trying each strategy of the delete chain in turn
    pub async fn delete(
        &self,
        event_id: &str,
        appointment_type: &AppointmentType,
    ) -> SyncResult<OperationResult> {
        if event_id.trim().is_empty() {
            return Err(invalid_event("event id must not be empty"));
        }
        let snapshot = self.snapshot(appointment_type).await?;
        let endpoint = &snapshot.endpoints.delete;
        let timeout = snapshot.timeout;

        let outcome = first_success(&DELETE_CHAIN, move |strategy| {
            self.attempt_delete(strategy, endpoint, event_id, timeout)
        })
        .await;

        match outcome {
            Some((strategy, body)) => {
                info!(
                    "Deleted event {} on {} using {} ({})",
                    event_id,
                    appointment_type,
                    strategy,
                    strategy.method_name()
                );
                Ok(OperationResult {
                    operation: Operation::Delete,
                    response: body,
                    strategy: Some(strategy),
                })
            }
            None => {
                error!(
                    "Every delete strategy failed for event {} on {}",
                    event_id, appointment_type
                );
                Err(Error::DeleteExhausted {
                    event_id: event_id.to_string(),
                    attempts: DELETE_CHAIN.len(),
                })
            }
        }
    }

    async fn attempt_delete(
        &self,
        strategy: DeleteStrategy,
        endpoint: &Url,
        event_id: &str,
        timeout: Duration,
    ) -> SyncResult<ResponseBody> {
        let result = strategy
            .request(&self.client, endpoint, event_id)
            .timeout(timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                debug!("Delete strategy {} could not be sent: {}", strategy, e);
                return Err(network_error(Operation::Delete, &e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!("Delete strategy {} rejected with HTTP {}", strategy, status);
            return Err(Error::RemoteRequest {
                operation: Operation::Delete,
                status: status.as_u16(),
            });
        }

        // The body carries nothing the caller needs, so a failed read is not a failure
        let body = response.text().await.unwrap_or_default();
        Ok(classify_body(&body))
    }

    async fn send(
        &self,
        operation: Operation,
        method: Method,
        url: Url,
        payload: Option<serde_json::Value>,
        timeout: Duration,
    ) -> SyncResult<ResponseBody> {
        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(payload) = &payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| network_error(operation, &e))?;

        let response = check_status(operation, response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| network_error(operation, &e))?;

        Ok(classify_body(&body))
    }
}

async fn check_status(operation: Operation, response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read error response".to_string());
    warn!("{} failed: HTTP {} - {}", operation, status, error_body.trim());

    Err(Error::RemoteRequest {
        operation,
        status: status.as_u16(),
    })
}

fn network_error(operation: Operation, err: &reqwest::Error) -> Error {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    Error::Network { operation, message }
}
