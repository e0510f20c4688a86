mod hub;
pub mod models;
pub mod source;
mod view;

pub use hub::{callback, ChangeCallback, ChangeHub, SubscriptionHandle};
pub use models::{ChangeEvent, ChangeKind, ChangeTopic};
pub use source::{ChangeSource, ChangeStream, LocalChangeSource, RedisChangeSource};
pub use view::ViewSubscriptions;

use crate::config::Config;
use crate::error::SyncResult;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the hub for the configured transport
pub fn hub_from_config(config: &Config) -> SyncResult<ChangeHub> {
    match &config.redis_url {
        Some(url) => {
            let source = RedisChangeSource::new(url, config.change_channel_prefix.clone())?;
            info!("Change notifications via Redis at {}", url);
            Ok(ChangeHub::new(Arc::new(source)))
        }
        None => {
            warn!("REDIS_URL not set, views will only see changes dispatched in-process");
            Ok(ChangeHub::detached())
        }
    }
}
