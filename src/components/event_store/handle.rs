use super::actor::{EventStoreActor, EventStoreActorHandle};
use super::models::{AppointmentType, CalendarEvent, EventDraft, OperationResult};
use super::store::RemoteEventStore;
use crate::config::Config;
use crate::error::SyncResult;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Handle for interacting with the event store actor
#[derive(Clone)]
pub struct EventStoreHandle {
    actor_handle: EventStoreActorHandle,
    _actor_task: Arc<JoinHandle<()>>,
}

impl EventStoreHandle {
    /// Create a new EventStoreHandle and spawn the actor
    pub fn new(config: Arc<RwLock<Config>>) -> Self {
        Self::spawn(EventStoreActor::new(config))
    }

    /// Spawn the actor around an existing store
    pub fn with_store(store: RemoteEventStore) -> Self {
        Self::spawn(EventStoreActor::with_store(store))
    }

    fn spawn((mut actor, handle): (EventStoreActor, EventStoreActorHandle)) -> Self {
        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            _actor_task: Arc::new(actor_task),
        }
    }

    pub async fn fetch(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        appointment_type: &AppointmentType,
    ) -> SyncResult<Vec<CalendarEvent>> {
        self.actor_handle
            .fetch(start, end, appointment_type.clone())
            .await
    }

    pub async fn fetch_day(
        &self,
        date: NaiveDate,
        appointment_type: &AppointmentType,
    ) -> SyncResult<Vec<CalendarEvent>> {
        self.actor_handle
            .fetch_day(date, appointment_type.clone())
            .await
    }

    pub async fn create(
        &self,
        draft: &EventDraft,
        appointment_type: &AppointmentType,
    ) -> SyncResult<OperationResult> {
        self.actor_handle
            .create(draft.clone(), appointment_type.clone())
            .await
    }

    pub async fn update(
        &self,
        event_id: &str,
        draft: &EventDraft,
        appointment_type: &AppointmentType,
    ) -> SyncResult<OperationResult> {
        self.actor_handle
            .update(event_id.to_string(), draft.clone(), appointment_type.clone())
            .await
    }

    pub async fn delete(
        &self,
        event_id: &str,
        appointment_type: &AppointmentType,
    ) -> SyncResult<OperationResult> {
        self.actor_handle
            .delete(event_id.to_string(), appointment_type.clone())
            .await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.actor_handle.shutdown().await
    }
}
