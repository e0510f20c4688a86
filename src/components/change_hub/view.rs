use super::hub::{ChangeCallback, ChangeHub, SubscriptionHandle};
use super::models::ChangeTopic;
use crate::error::SyncResult;
use tracing::debug;

/// Subscriptions owned by one view, released together when the view goes away
pub struct ViewSubscriptions {
    hub: ChangeHub,
    view: String,
    handles: Vec<SubscriptionHandle>,
}

impl ViewSubscriptions {
    pub fn new(hub: ChangeHub, view: impl Into<String>) -> Self {
        Self {
            hub,
            view: view.into(),
            handles: Vec::new(),
        }
    }

    /// Register `callback` on one topic for the lifetime of this view
    pub async fn watch(
        &mut self,
        topic: ChangeTopic,
        callback: ChangeCallback,
    ) -> SyncResult<SubscriptionHandle> {
        let handle = self.hub.subscribe(topic, callback).await?;
        if !self.handles.contains(&handle) {
            self.handles.push(handle.clone());
        }
        Ok(handle)
    }

    /// Register the same callback on several topics, e.g. to reload summary
    /// statistics whenever any of them changes
    pub async fn watch_all(
        &mut self,
        topics: &[ChangeTopic],
        callback: ChangeCallback,
    ) -> SyncResult<()> {
        for topic in topics {
            self.watch(*topic, callback.clone()).await?;
        }
        Ok(())
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every subscription; returns how many were still active
    pub fn release(&mut self) -> usize {
        let released = self
            .handles
            .drain(..)
            .filter(|handle| self.hub.unsubscribe(handle))
            .count();
        if released > 0 {
            debug!("Released {} subscriptions of {}", released, self.view);
        }
        released
    }
}

impl Drop for ViewSubscriptions {
    fn drop(&mut self) {
        self.release();
    }
}
