//! Channel and pattern subscriptions over a dedicated connection
//!
//! One background task owns the subscription connection. Callers talk to it
//! through a command channel, so subscribing from many tasks never races on
//! the connection itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use redbridge_core::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::pool::{ConnectionPool, PubSubConnection, PubSubMessage};

/// Called for every message on a subscription
pub type MessageReceiver = Arc<dyn Fn(PubSubMessage) + Send + Sync>;

/// Called with the channel (or pattern) name and the total subscription count
pub type SubscriptionChangeHandler = Arc<dyn Fn(&str, usize) + Send + Sync>;

/// Callbacks attached to a subscription
#[derive(Clone)]
pub struct SubscriptionHandlers {
    pub on_message: MessageReceiver,
    pub on_subscribe: Option<SubscriptionChangeHandler>,
    pub on_unsubscribe: Option<SubscriptionChangeHandler>,
}

impl SubscriptionHandlers {
    pub fn new(on_message: impl Fn(PubSubMessage) + Send + Sync + 'static) -> Self {
        Self {
            on_message: Arc::new(on_message),
            on_subscribe: None,
            on_unsubscribe: None,
        }
    }

    /// Called once the server confirms the subscription
    pub fn on_subscribe(mut self, handler: impl Fn(&str, usize) + Send + Sync + 'static) -> Self {
        self.on_subscribe = Some(Arc::new(handler));
        self
    }

    /// Called when the subscription ends, including on close
    pub fn on_unsubscribe(
        mut self,
        handler: impl Fn(&str, usize) + Send + Sync + 'static,
    ) -> Self {
        self.on_unsubscribe = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for SubscriptionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandlers")
            .field("on_subscribe", &self.on_subscribe.is_some())
            .field("on_unsubscribe", &self.on_unsubscribe.is_some())
            .finish()
    }
}

/// Exact channel names or glob patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Channel,
    Pattern,
}

enum Request {
    Subscribe {
        kind: SubscriptionKind,
        names: Vec<String>,
        handlers: SubscriptionHandlers,
        ack: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        kind: SubscriptionKind,
        names: Vec<String>,
        ack: oneshot::Sender<Result<()>>,
    },
    Close,
}

impl Request {
    fn reject(self) {
        match self {
            Request::Subscribe { ack, .. } | Request::Unsubscribe { ack, .. } => {
                let _ = ack.send(Err(Error::SubscriptionClosed));
            }
            Request::Close => {}
        }
    }
}

/// Subscription client for one backend
///
/// The connection is opened on first use. Clones share it. If the
/// connection is lost, its subscriptions end (each gets its unsubscribe
/// callback) and the next request opens a fresh connection; only
/// [`close`](SubscriptionClient::close) ends the client for good.
#[derive(Clone)]
pub struct SubscriptionClient {
    inner: Arc<Inner>,
}

struct Inner {
    pool: Arc<dyn ConnectionPool>,
    label: String,
    requests: Mutex<Option<mpsc::UnboundedSender<Request>>>,
    opening: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl SubscriptionClient {
    /// Create a client that will open its connection from `pool`
    pub fn new(pool: Arc<dyn ConnectionPool>, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                label: label.into(),
                requests: Mutex::new(None),
                opening: tokio::sync::Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Whether the subscription connection is open
    pub fn is_connected(&self) -> bool {
        self.live_sender().is_some()
    }

    /// Whether two handles share one connection
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Subscribe to channels
    pub async fn subscribe<I, S>(&self, channels: I, handlers: SubscriptionHandlers) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = collect(channels);
        self.request(|ack| Request::Subscribe {
            kind: SubscriptionKind::Channel,
            names,
            handlers,
            ack,
        })
        .await
    }

    /// Unsubscribe from channels; an empty list removes every channel
    pub async fn unsubscribe<I, S>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = collect(channels);
        self.request(|ack| Request::Unsubscribe {
            kind: SubscriptionKind::Channel,
            names,
            ack,
        })
        .await
    }

    /// Subscribe to glob patterns
    pub async fn psubscribe<I, S>(&self, patterns: I, handlers: SubscriptionHandlers) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = collect(patterns);
        self.request(|ack| Request::Subscribe {
            kind: SubscriptionKind::Pattern,
            names,
            handlers,
            ack,
        })
        .await
    }

    /// Unsubscribe from patterns; an empty list removes every pattern
    pub async fn punsubscribe<I, S>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = collect(patterns);
        self.request(|ack| Request::Unsubscribe {
            kind: SubscriptionKind::Pattern,
            names,
            ack,
        })
        .await
    }

    /// Close the subscription connection
    ///
    /// Remaining subscriptions receive their unsubscribe callback. Later
    /// requests fail with [`Error::SubscriptionClosed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Some(sender) = self.inner.requests.lock().take() {
            let _ = sender.send(Request::Close);
        }
    }

    fn live_sender(&self) -> Option<mpsc::UnboundedSender<Request>> {
        self.inner
            .requests
            .lock()
            .as_ref()
            .filter(|sender| !sender.is_closed())
            .cloned()
    }

    async fn sender(&self) -> Result<mpsc::UnboundedSender<Request>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::SubscriptionClosed);
        }
        if let Some(sender) = self.live_sender() {
            return Ok(sender);
        }

        let _opening = self.inner.opening.lock().await;
        if let Some(sender) = self.live_sender() {
            return Ok(sender);
        }

        let reopening = self.inner.requests.lock().is_some();
        let connection = self.inner.pool.pubsub_connection().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut slot = self.inner.requests.lock();
            // close() may have run while the connection was opening
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(Error::SubscriptionClosed);
            }
            *slot = Some(tx.clone());
        }
        debug!(
            target: "redbridge",
            backend = %self.inner.label,
            reopening,
            "Opened subscription connection"
        );
        tokio::spawn(run(connection, rx, self.inner.label.clone()));
        Ok(tx)
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<()>>) -> Request,
    ) -> Result<()> {
        let sender = self.sender().await?;
        let (ack, done) = oneshot::channel();
        sender
            .send(build(ack))
            .map_err(|_| Error::SubscriptionClosed)?;
        done.await.map_err(|_| Error::SubscriptionClosed)?
    }
}

fn collect<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

#[derive(Default)]
struct Registry {
    channels: HashMap<String, SubscriptionHandlers>,
    patterns: HashMap<String, SubscriptionHandlers>,
}

impl Registry {
    fn count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    fn table(&mut self, kind: SubscriptionKind) -> &mut HashMap<String, SubscriptionHandlers> {
        match kind {
            SubscriptionKind::Channel => &mut self.channels,
            SubscriptionKind::Pattern => &mut self.patterns,
        }
    }

    fn dispatch(&self, message: PubSubMessage) {
        let handlers = match &message.pattern {
            Some(pattern) => self.patterns.get(pattern),
            None => self.channels.get(&message.channel),
        };
        match handlers {
            Some(handlers) => (handlers.on_message)(message),
            None => trace!(target: "redbridge", channel = %message.channel, "Dropping message without subscriber"),
        }
    }

    async fn apply(&mut self, connection: &mut dyn PubSubConnection, request: Request) {
        match request {
            Request::Subscribe {
                kind,
                names,
                handlers,
                ack,
            } => {
                let result = self.subscribe(connection, kind, names, handlers).await;
                let _ = ack.send(result);
            }
            Request::Unsubscribe { kind, names, ack } => {
                let result = self.unsubscribe(connection, kind, names).await;
                let _ = ack.send(result);
            }
            Request::Close => {}
        }
    }

    async fn subscribe(
        &mut self,
        connection: &mut dyn PubSubConnection,
        kind: SubscriptionKind,
        names: Vec<String>,
        handlers: SubscriptionHandlers,
    ) -> Result<()> {
        for name in names {
            match kind {
                SubscriptionKind::Channel => connection.subscribe(&name).await?,
                SubscriptionKind::Pattern => connection.psubscribe(&name).await?,
            }
            self.table(kind).insert(name.clone(), handlers.clone());
            if let Some(on_subscribe) = &handlers.on_subscribe {
                on_subscribe(&name, self.count());
            }
        }
        Ok(())
    }

    async fn unsubscribe(
        &mut self,
        connection: &mut dyn PubSubConnection,
        kind: SubscriptionKind,
        names: Vec<String>,
    ) -> Result<()> {
        let names = if names.is_empty() {
            self.table(kind).keys().cloned().collect()
        } else {
            names
        };
        for name in names {
            match kind {
                SubscriptionKind::Channel => connection.unsubscribe(&name).await?,
                SubscriptionKind::Pattern => connection.punsubscribe(&name).await?,
            }
            if let Some(handlers) = self.table(kind).remove(&name) {
                if let Some(on_unsubscribe) = &handlers.on_unsubscribe {
                    on_unsubscribe(&name, self.count());
                }
            }
        }
        Ok(())
    }

    fn drain(&mut self) {
        let ended: Vec<_> = self
            .channels
            .drain()
            .chain(self.patterns.drain())
            .collect();
        for (name, handlers) in ended {
            if let Some(on_unsubscribe) = &handlers.on_unsubscribe {
                on_unsubscribe(&name, 0);
            }
        }
    }
}

async fn run(
    mut connection: Box<dyn PubSubConnection>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    label: String,
) {
    let mut registry = Registry::default();
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(Request::Close) | None => break,
                Some(request) => registry.apply(connection.as_mut(), request).await,
            },
            message = connection.next_message() => match message {
                Some(message) => registry.dispatch(message),
                None => {
                    warn!(target: "redbridge", backend = %label, "Subscription connection lost");
                    break;
                }
            },
        }
    }

    registry.drain();
    requests.close();
    while let Ok(pending) = requests.try_recv() {
        pending.reject();
    }
    debug!(target: "redbridge", backend = %label, "Subscription connection closed");
}
