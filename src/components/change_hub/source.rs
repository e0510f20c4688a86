use super::models::{ChangeEvent, ChangeKind, ChangeTopic};
use crate::error::SyncResult;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::Client as RedisClient;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const BUS_CAPACITY: usize = 1024;
const STREAM_CAPACITY: usize = 64;

/// Upstream stream of changes for a single topic; dropping it ends the subscription
pub type ChangeStream = mpsc::Receiver<ChangeEvent>;

/// Transport able to deliver change notifications from the data store
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Open one upstream subscription for `topic`
    async fn open(&self, topic: ChangeTopic) -> SyncResult<ChangeStream>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// In-process change bus
#[derive(Clone)]
pub struct LocalChangeSource {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for LocalChangeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChangeSource {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event, returning how many upstream subscriptions saw it
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of upstream subscriptions currently reading the bus
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Build and publish an event in one call
    pub fn emit(&self, topic: ChangeTopic, kind: ChangeKind, payload: serde_json::Value) -> usize {
        self.publish(ChangeEvent::new(topic, kind, payload))
    }
}

#[async_trait]
impl ChangeSource for LocalChangeSource {
    async fn open(&self, topic: ChangeTopic) -> SyncResult<ChangeStream> {
        let mut rx = self.tx.subscribe();
        let (out, stream) = mpsc::channel(STREAM_CAPACITY);

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = out.closed() => break,
                    received = rx.recv() => received,
                };
                let event = match received {
                    Ok(event) if event.topic == topic => event,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Listeners only need to know something changed
                        warn!("{} listener lagged by {} events", topic, missed);
                        ChangeEvent::new(topic, ChangeKind::Unknown, json!({ "missed": missed }))
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if out.send(event).await.is_err() {
                    break;
                }
            }
            debug!("Local change stream for {} closed", topic);
        });

        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Change notifications published on Redis channels named `{prefix}{table}`
#[derive(Clone)]
pub struct RedisChangeSource {
    client: RedisClient,
    prefix: String,
}

impl RedisChangeSource {
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> SyncResult<Self> {
        let client = RedisClient::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    pub fn channel(&self, topic: ChangeTopic) -> String {
        format!("{}{}", self.prefix, topic.table())
    }
}

#[async_trait]
impl ChangeSource for RedisChangeSource {
    async fn open(&self, topic: ChangeTopic) -> SyncResult<ChangeStream> {
        let channel = self.channel(topic);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;
        info!("Subscribed to Redis channel {}", channel);

        let (out, stream) = mpsc::channel(STREAM_CAPACITY);
        let payload_channel = channel.clone();
        let events = pubsub.into_on_message().map(move |msg| {
            match msg.get_payload::<String>() {
                Ok(raw) => ChangeEvent::from_notification(topic, &raw),
                Err(e) => {
                    warn!("Unreadable payload on {}: {}", payload_channel, e);
                    ChangeEvent::new(topic, ChangeKind::Unknown, serde_json::Value::Null)
                }
            }
        });

        tokio::spawn(async move {
            // Returning drops the pub/sub connection
            forward(events, out).await;
            debug!("Redis change stream for {} closed", channel);
        });

        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Pump `events` into `out` until either side goes away
async fn forward<S>(events: S, out: mpsc::Sender<ChangeEvent>)
where
    S: Stream<Item = ChangeEvent>,
{
    tokio::pin!(events);
    loop {
        let event = tokio::select! {
            _ = out.closed() => break,
            next = events.next() => match next {
                Some(event) => event,
                None => break,
            },
        };
        if out.send(event).await.is_err() {
            break;
        }
    }
}
