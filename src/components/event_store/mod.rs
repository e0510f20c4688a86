mod actor;
mod handle;
pub mod models;
pub mod store;
pub mod strategies;
pub mod wire;

pub use handle::EventStoreHandle;
pub use models::{
    AppointmentType, Attendee, CalendarEvent, EventDraft, EventTime, Operation, OperationResult,
    ResponseBody,
};
pub use store::RemoteEventStore;
pub use strategies::{DeleteStrategy, DELETE_CHAIN};

use super::change_hub::{callback, ChangeHub, ChangeTopic, ViewSubscriptions};
use crate::config::Config;
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Appointment calendars component
#[derive(Default)]
pub struct EventStore {
    handle: RwLock<Option<EventStoreHandle>>,
    views: Mutex<Option<ViewSubscriptions>>,
}

impl EventStore {
    /// Create a new event store component
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle if it exists
    pub async fn get_handle(&self) -> Option<EventStoreHandle> {
        self.handle.read().await.clone()
    }
}

/// Load today's appointments for every configured calendar and log them
pub async fn log_today_agenda(handle: &EventStoreHandle, config: &Arc<RwLock<Config>>) {
    let (types, zone) = {
        let config = config.read().await;
        (config.appointment_types(), config.tz())
    };
    let today = match zone {
        Ok(zone) => Utc::now().with_timezone(&zone).date_naive(),
        Err(e) => {
            warn!("Cannot determine today's date: {}", e);
            return;
        }
    };

    for appointment_type in types {
        match handle.fetch_day(today, &appointment_type).await {
            Ok(events) => {
                info!("{}: {} appointments on {}", appointment_type, events.len(), today);
                for event in &events {
                    info!(
                        "  {} - {} {}",
                        event.start.date_time.format("%H:%M"),
                        event.end.date_time.format("%H:%M"),
                        event.summary
                    );
                }
            }
            Err(e) => warn!("{}: {}", appointment_type, e.user_message()),
        }
    }
}

#[async_trait]
impl super::Component for EventStore {
    fn name(&self) -> &'static str {
        "event_store"
    }

    async fn init(&self, config: Arc<RwLock<Config>>, hub: ChangeHub) -> SyncResult<()> {
        let handle = {
            let mut handle_lock = self.handle.write().await;
            handle_lock
                .get_or_insert_with(|| EventStoreHandle::new(Arc::clone(&config)))
                .clone()
        };

        // Reload the agenda whenever appointments change remotely
        let mut views = ViewSubscriptions::new(hub, "agenda");
        let reload_handle = handle.clone();
        let reload_config = Arc::clone(&config);
        views
            .watch(
                ChangeTopic::Appointments,
                callback(move |event| {
                    info!("Appointments changed ({:?}), reloading agenda", event.kind);
                    let handle = reload_handle.clone();
                    let config = Arc::clone(&reload_config);
                    tokio::spawn(async move {
                        log_today_agenda(&handle, &config).await;
                    });
                }),
            )
            .await?;
        *self.views.lock().await = Some(views);

        log_today_agenda(&handle, &config).await;
        Ok(())
    }

    async fn shutdown(&self) -> SyncResult<()> {
        if let Some(mut views) = self.views.lock().await.take() {
            views.release();
        }
        let handle_lock = self.handle.read().await;
        if let Some(handle) = &*handle_lock {
            handle.shutdown().await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
