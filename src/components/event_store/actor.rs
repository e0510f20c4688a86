use super::models::{AppointmentType, CalendarEvent, EventDraft, OperationResult};
use super::store::RemoteEventStore;
use crate::config::Config;
use crate::error::{component_error, SyncResult};
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;

type Reply<T> = oneshot::Sender<SyncResult<T>>;

/// The event store actor that processes messages
pub struct EventStoreActor {
    store: RemoteEventStore,
    command_rx: mpsc::Receiver<EventStoreCommand>,
}

/// Commands that can be sent to the event store actor
pub enum EventStoreCommand {
    Fetch {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        appointment_type: AppointmentType,
        reply: Reply<Vec<CalendarEvent>>,
    },
    FetchDay {
        date: NaiveDate,
        appointment_type: AppointmentType,
        reply: Reply<Vec<CalendarEvent>>,
    },
    Create {
        draft: EventDraft,
        appointment_type: AppointmentType,
        reply: Reply<OperationResult>,
    },
    Update {
        event_id: String,
        draft: EventDraft,
        appointment_type: AppointmentType,
        reply: Reply<OperationResult>,
    },
    Delete {
        event_id: String,
        appointment_type: AppointmentType,
        reply: Reply<OperationResult>,
    },
    Shutdown,
}

/// Handle for communicating with the event store actor
#[derive(Clone)]
pub struct EventStoreActorHandle {
    command_tx: mpsc::Sender<EventStoreCommand>,
}

impl EventStoreActorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EventStoreCommand,
    ) -> SyncResult<T> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response
            .await
            .map_err(|_| component_error("Response channel closed"))?
    }

    pub async fn fetch(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        appointment_type: AppointmentType,
    ) -> SyncResult<Vec<CalendarEvent>> {
        self.request(|reply| EventStoreCommand::Fetch {
            start,
            end,
            appointment_type,
            reply,
        })
        .await
    }

    pub async fn fetch_day(
        &self,
        date: NaiveDate,
        appointment_type: AppointmentType,
    ) -> SyncResult<Vec<CalendarEvent>> {
        self.request(|reply| EventStoreCommand::FetchDay {
            date,
            appointment_type,
            reply,
        })
        .await
    }

    pub async fn create(
        &self,
        draft: EventDraft,
        appointment_type: AppointmentType,
    ) -> SyncResult<OperationResult> {
        self.request(|reply| EventStoreCommand::Create {
            draft,
            appointment_type,
            reply,
        })
        .await
    }

    pub async fn update(
        &self,
        event_id: String,
        draft: EventDraft,
        appointment_type: AppointmentType,
    ) -> SyncResult<OperationResult> {
        self.request(|reply| EventStoreCommand::Update {
            event_id,
            draft,
            appointment_type,
            reply,
        })
        .await
    }

    pub async fn delete(
        &self,
        event_id: String,
        appointment_type: AppointmentType,
    ) -> SyncResult<OperationResult> {
        self.request(|reply| EventStoreCommand::Delete {
            event_id,
            appointment_type,
            reply,
        })
        .await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> SyncResult<()> {
        let _ = self.command_tx.send(EventStoreCommand::Shutdown).await;
        Ok(())
    }
}

impl EventStoreActor {
    /// Create a new actor and return its handle
    pub fn new(config: Arc<RwLock<Config>>) -> (Self, EventStoreActorHandle) {
        Self::with_store(RemoteEventStore::new(config))
    }

    pub fn with_store(store: RemoteEventStore) -> (Self, EventStoreActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let actor = Self { store, command_rx };
        (actor, EventStoreActorHandle { command_tx })
    }

    /// Start the actor's processing loop.
    ///
    /// Each command runs as its own task, so a slow delete chain never holds
    /// up a fetch.
    pub async fn run(&mut self) {
        info!("Event store actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            if let EventStoreCommand::Shutdown = cmd {
                info!("Event store actor shutting down");
                break;
            }
            let store = self.store.clone();
            tokio::spawn(Self::execute(store, cmd));
        }

        info!("Event store actor shut down");
    }

    async fn execute(store: RemoteEventStore, cmd: EventStoreCommand) {
        match cmd {
            EventStoreCommand::Fetch {
                start,
                end,
                appointment_type,
                reply,
            } => {
                let _ = reply.send(store.fetch(start, end, &appointment_type).await);
            }
            EventStoreCommand::FetchDay {
                date,
                appointment_type,
                reply,
            } => {
                let _ = reply.send(store.fetch_day(date, &appointment_type).await);
            }
            EventStoreCommand::Create {
                draft,
                appointment_type,
                reply,
            } => {
                let _ = reply.send(store.create(&draft, &appointment_type).await);
            }
            EventStoreCommand::Update {
                event_id,
                draft,
                appointment_type,
                reply,
            } => {
                let _ = reply.send(store.update(&event_id, &draft, &appointment_type).await);
            }
            EventStoreCommand::Delete {
                event_id,
                appointment_type,
                reply,
            } => {
                let _ = reply.send(store.delete(&event_id, &appointment_type).await);
            }
            EventStoreCommand::Shutdown => {}
        }
    }
}
