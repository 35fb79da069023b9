use crewline_core::{AgentMessage, CrewlineResult, MessageType};
use crewline_session::{InMemoryMessageStore, MessageStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Buffered live messages per subscriber before it starts lagging.
const FEED_CAPACITY: usize = 1024;

/// Durable, topic-addressed pub/sub bus for inter-agent messages.
///
/// The pool holds no copy of the log: the [`MessageStore`] is the only
/// record, and reads go to it. A message is appended to the store before it
/// becomes visible to any reader, and one lock covers append and fan-out, so
/// live subscribers see messages in append order. Delivery is at-least-once:
/// republishing an id notifies live subscribers again without storing a
/// second copy.
pub struct MessagePool {
    store: Arc<dyn MessageStore>,
    publish_lock: Mutex<()>,
    subscriptions: parking_lot::RwLock<HashMap<String, HashSet<MessageType>>>,
    feed: broadcast::Sender<AgentMessage>,
}

impl MessagePool {
    /// Open a pool over `store`, which may already hold earlier messages.
    pub async fn open(store: Arc<dyn MessageStore>) -> CrewlineResult<Self> {
        debug!(messages = store.count().await, "Message pool opened");
        Ok(Self::with_store(store))
    }

    /// A pool backed by memory only.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryMessageStore::new()))
    }

    fn with_store(store: Arc<dyn MessageStore>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            store,
            publish_lock: Mutex::new(()),
            subscriptions: parking_lot::RwLock::new(HashMap::new()),
            feed,
        }
    }

    /// Persist and deliver `message`. Returns once the message is durable.
    pub async fn publish(&self, message: AgentMessage) -> CrewlineResult<()> {
        let _guard = self.publish_lock.lock().await;
        if self.store.contains(message.id).await {
            debug!(message_id = %message.id, "Redelivering already stored message");
            let _ = self.feed.send(message);
            return Ok(());
        }

        self.store.append(&message).await?;
        debug!(
            message_id = %message.id,
            session_id = %message.session_id,
            kind = %message.kind,
            sender = %message.sender,
            "Message published"
        );
        // No live subscribers is fine: the message is already stored.
        let _ = self.feed.send(message);
        Ok(())
    }

    /// Register interest of `agent` in `types` (added to any earlier
    /// subscription) and return a live stream of matching messages.
    pub fn subscribe(&self, agent: &str, types: &[MessageType]) -> Subscription {
        let mut subs = self.subscriptions.write();
        let entry = subs.entry(agent.to_string()).or_default();
        entry.extend(types.iter().copied());
        Subscription {
            agent: agent.to_string(),
            types: entry.clone(),
            rx: self.feed.subscribe(),
        }
    }

    /// Drop every subscription of `agent`. Live [`Subscription`]s keep their
    /// own type filter until dropped.
    pub fn unsubscribe(&self, agent: &str) {
        self.subscriptions.write().remove(agent);
    }

    /// Types `agent` currently receives broadcasts for.
    pub fn subscribed_types(&self, agent: &str) -> HashSet<MessageType> {
        self.subscriptions
            .read()
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }

    /// Messages addressed to `agent` across all sessions: direct messages,
    /// plus broadcasts of types it subscribes to. `types` narrows the result
    /// further. Grouped by session, each group in append order.
    ///
    /// Returns history too, so a re-subscribing agent sees messages again.
    /// Reads every session from the store; prefer
    /// [`session_messages_for`](Self::session_messages_for) when the session
    /// is known.
    pub async fn get_messages_for(
        &self,
        agent: &str,
        types: Option<&[MessageType]>,
    ) -> CrewlineResult<Vec<AgentMessage>> {
        let mut inbox = Vec::new();
        for session_id in self.store.sessions().await {
            inbox.extend(self.session_messages_for(agent, session_id, types).await?);
        }
        Ok(inbox)
    }

    /// [`get_messages_for`](Self::get_messages_for) limited to one session.
    pub async fn session_messages_for(
        &self,
        agent: &str,
        session_id: Uuid,
        types: Option<&[MessageType]>,
    ) -> CrewlineResult<Vec<AgentMessage>> {
        let subscribed = self.subscribed_types(agent);
        Ok(self
            .store
            .by_session(session_id)
            .await?
            .into_iter()
            .filter(|m| {
                m.recipients.names(agent) || (m.is_broadcast() && subscribed.contains(&m.kind))
            })
            .filter(|m| types.map_or(true, |t| t.contains(&m.kind)))
            .collect())
    }

    /// All messages of a session, in append order, read from the store.
    pub async fn session_messages(&self, session_id: Uuid) -> CrewlineResult<Vec<AgentMessage>> {
        self.store.by_session(session_id).await
    }

    /// Point lookup by message id.
    pub async fn get(&self, id: Uuid) -> CrewlineResult<Option<AgentMessage>> {
        self.store.get(id).await
    }

    /// Number of stored messages.
    pub async fn len(&self) -> usize {
        self.store.count().await
    }

    /// Whether nothing was published yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Unfiltered live stream of every published message.
    pub fn feed(&self) -> broadcast::Receiver<AgentMessage> {
        self.feed.subscribe()
    }
}

/// Live messages for one subscriber.
pub struct Subscription {
    agent: String,
    types: HashSet<MessageType>,
    rx: broadcast::Receiver<AgentMessage>,
}

impl Subscription {
    /// Name of the subscribed agent.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    fn wants(&self, message: &AgentMessage) -> bool {
        self.types.contains(&message.kind)
            && (message.is_broadcast() || message.recipients.names(&self.agent))
    }

    /// Next matching message; `None` once the pool is dropped.
    pub async fn recv(&mut self) -> Option<AgentMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) if self.wants(&message) => return Some(message),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        agent = %self.agent,
                        skipped,
                        "Subscriber lagged; missed messages remain in the store"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Consumer-side filter turning at-least-once delivery into
/// exactly-once processing.
#[derive(Debug, Default)]
pub struct MessageDeduper {
    seen: HashSet<Uuid>,
}

impl MessageDeduper {
    /// Deduper that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time a message id is seen.
    pub fn first_delivery(&mut self, message: &AgentMessage) -> bool {
        self.seen.insert(message.id)
    }
}
