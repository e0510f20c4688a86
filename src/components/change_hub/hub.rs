use super::models::{ChangeEvent, ChangeTopic};
use super::source::{ChangeSource, ChangeStream};
use crate::error::{subscription_error, SyncResult};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Callback run for every change on a topic it is registered for
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Wrap a closure as a [`ChangeCallback`]
pub fn callback<F>(f: F) -> ChangeCallback
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identifies one registered callback; pass it back to `unsubscribe`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    topic: ChangeTopic,
    id: Uuid,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> ChangeTopic {
        self.topic
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

struct Subscriber {
    id: Uuid,
    callback: ChangeCallback,
}

/// Outcome of an upstream open, as seen by subscribers waiting on it
#[derive(Debug, Clone)]
enum OpenState {
    Pending,
    Ready,
    Failed(String),
}

#[derive(Default)]
enum Upstream {
    #[default]
    Idle,
    Opening {
        attempt: Uuid,
        state: watch::Receiver<OpenState>,
    },
    Running(JoinHandle<()>),
}

/// What a subscriber has to do after registering
enum NextStep {
    Done,
    Open {
        attempt: Uuid,
        state: watch::Sender<OpenState>,
    },
    Wait(watch::Receiver<OpenState>),
}

#[derive(Default)]
struct TopicEntry {
    subscribers: Vec<Subscriber>,
    upstream: Upstream,
}

struct HubInner {
    topics: Mutex<HashMap<ChangeTopic, TopicEntry>>,
    source: Option<Arc<dyn ChangeSource>>,
    shutdown: CancellationToken,
}

/// Registry fanning change notifications out to every callback of a topic.
///
/// One upstream subscription is kept per topic while it has at least one
/// callback. Cloning the hub shares the registry.
#[derive(Clone)]
pub struct ChangeHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeHub")
            .field("source", &self.inner.source.as_ref().map(|s| s.name()))
            .field("topics", &self.active_topics())
            .finish()
    }
}

impl ChangeHub {
    /// Hub fed by `source`
    pub fn new(source: Arc<dyn ChangeSource>) -> Self {
        Self::build(Some(source))
    }

    /// Hub without a transport; events only arrive through `dispatch`
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(source: Option<Arc<dyn ChangeSource>>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: Mutex::new(HashMap::new()),
                source,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ChangeTopic, TopicEntry>> {
        self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for every change on `topic`.
    ///
    /// Registering the same callback (same `Arc`) twice on a topic returns the
    /// existing handle instead of adding a second subscription. Subscribers
    /// arriving while the upstream is being opened wait for that open and fail
    /// with it.
    pub async fn subscribe(
        &self,
        topic: ChangeTopic,
        callback: ChangeCallback,
    ) -> SyncResult<SubscriptionHandle> {
        if self.inner.shutdown.is_cancelled() {
            return Err(subscription_error("change hub is shut down"));
        }

        let (handle, next) = {
            let mut topics = self.entries();
            let entry = topics.entry(topic).or_default();

            let existing = entry
                .subscribers
                .iter()
                .find(|s| Arc::ptr_eq(&s.callback, &callback))
                .map(|s| s.id);
            let id = match existing {
                Some(id) => {
                    debug!("Callback already subscribed to {}", topic);
                    id
                }
                None => {
                    let id = Uuid::new_v4();
                    entry.subscribers.push(Subscriber { id, callback });
                    id
                }
            };

            let next = if let Upstream::Opening { state, .. } = &entry.upstream {
                NextStep::Wait(state.clone())
            } else if matches!(entry.upstream, Upstream::Idle) && self.inner.source.is_some() {
                let attempt = Uuid::new_v4();
                let (state, waiting) = watch::channel(OpenState::Pending);
                entry.upstream = Upstream::Opening {
                    attempt,
                    state: waiting,
                };
                NextStep::Open { attempt, state }
            } else {
                NextStep::Done
            };
            (SubscriptionHandle { topic, id }, next)
        };

        match next {
            NextStep::Done => {}
            NextStep::Open { attempt, state } => {
                if let Err(e) = self.open_upstream(topic, attempt, state).await {
                    self.unsubscribe(&handle);
                    return Err(e);
                }
            }
            NextStep::Wait(mut state) => {
                let outcome = state
                    .wait_for(|s| !matches!(s, OpenState::Pending))
                    .await
                    .map(|s| s.clone());
                let reason = match outcome {
                    Ok(OpenState::Ready) => None,
                    Ok(OpenState::Failed(reason)) => Some(reason),
                    Ok(OpenState::Pending) | Err(_) => {
                        Some("upstream open was abandoned".to_string())
                    }
                };
                if let Some(reason) = reason {
                    self.unsubscribe(&handle);
                    return Err(subscription_error(&format!(
                        "could not listen for {} changes: {}",
                        topic, reason
                    )));
                }
            }
        }

        debug!("Subscribed {} to {}", handle.id, topic);
        Ok(handle)
    }

    async fn open_upstream(
        &self,
        topic: ChangeTopic,
        attempt: Uuid,
        state: watch::Sender<OpenState>,
    ) -> SyncResult<()> {
        let Some(source) = self.inner.source.clone() else {
            let _ = state.send(OpenState::Ready);
            return Ok(());
        };

        let result = source.open(topic).await;

        let mut topics = self.entries();
        let current = topics.get_mut(&topic).filter(|entry| {
            matches!(&entry.upstream, Upstream::Opening { attempt: a, .. } if *a == attempt)
        });

        match (result, current) {
            (Ok(stream), Some(entry)) => {
                entry.upstream = Upstream::Running(self.spawn_pump(topic, stream));
                info!("Listening for {} changes via {}", topic, source.name());
                let _ = state.send(OpenState::Ready);
                Ok(())
            }
            (Ok(_), None) => {
                // Everyone left while the upstream was opening; dropping the stream closes it
                debug!("Discarding {} upstream nobody needs", topic);
                let _ = state.send(OpenState::Ready);
                Ok(())
            }
            (Err(e), current) => {
                if let Some(entry) = current {
                    entry.upstream = Upstream::Idle;
                }
                warn!("Could not open {} upstream for {}: {}", source.name(), topic, e);
                let _ = state.send(OpenState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn spawn_pump(&self, topic: ChangeTopic, mut stream: ChangeStream) -> JoinHandle<()> {
        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = stream.recv() => {
                        let Some(event) = next else {
                            warn!("Upstream for {} ended", topic);
                            break;
                        };
                        let Some(inner) = hub.upgrade() else { break };
                        ChangeHub { inner }.dispatch(&event);
                    }
                }
            }
            debug!("Pump for {} stopped", topic);
        })
    }

    /// Invoke every callback currently registered for the event's topic once.
    ///
    /// Returns how many callbacks completed. A panicking callback is logged and
    /// does not prevent the others from running.
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        let callbacks: Vec<(Uuid, ChangeCallback)> = {
            let topics = self.entries();
            topics
                .get(&event.topic)
                .map(|entry| {
                    entry
                        .subscribers
                        .iter()
                        .map(|s| (s.id, Arc::clone(&s.callback)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("Callback {} panicked handling {} change", id, event.topic),
            }
        }
        delivered
    }

    /// Release a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut topics = self.entries();
        let Some(entry) = topics.get_mut(&handle.topic) else {
            return false;
        };

        let before = entry.subscribers.len();
        entry.subscribers.retain(|s| s.id != handle.id);
        let removed = entry.subscribers.len() != before;

        if entry.subscribers.is_empty() {
            if let Some(entry) = topics.remove(&handle.topic) {
                if let Upstream::Running(task) = entry.upstream {
                    task.abort();
                    debug!("Closed upstream for {}", handle.topic);
                }
            }
        }

        if removed {
            debug!("Unsubscribed {} from {}", handle.id, handle.topic);
        }
        removed
    }

    pub fn is_active(&self, handle: &SubscriptionHandle) -> bool {
        self.entries()
            .get(&handle.topic)
            .is_some_and(|entry| entry.subscribers.iter().any(|s| s.id == handle.id))
    }

    pub fn subscriber_count(&self, topic: ChangeTopic) -> usize {
        self.entries()
            .get(&topic)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// Whether an upstream subscription is currently running for `topic`
    pub fn is_listening(&self, topic: ChangeTopic) -> bool {
        self.entries()
            .get(&topic)
            .is_some_and(|entry| matches!(entry.upstream, Upstream::Running(_)))
    }

    /// Topics with at least one callback, in stable order
    pub fn active_topics(&self) -> Vec<ChangeTopic> {
        let mut topics: Vec<ChangeTopic> = self.entries().keys().copied().collect();
        topics.sort();
        topics
    }

    /// Stop every upstream subscription and drop all callbacks
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let drained: Vec<(ChangeTopic, TopicEntry)> = self.entries().drain().collect();
        for (topic, entry) in drained {
            if let Upstream::Running(task) = entry.upstream {
                task.abort();
            }
            debug!("Dropped {} callbacks for {}", entry.subscribers.len(), topic);
        }
        info!("Change hub shut down");
    }
}
