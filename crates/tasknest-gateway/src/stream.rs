//! Live notification delivery: per-owner connection registry, bounded
//! offline queues, and the SSE stream endpoint.
//!
//! Delivery is best-effort per connection. A notification that finds no
//! active connection is queued (bounded, oldest dropped on overflow); a
//! connection that stops draining its buffer is dropped rather than
//! stalling the publisher.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Extension;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use tasknest_core::{Notification, NotificationSink};

use crate::server::{AppState, OwnerId};

pub struct StreamHub {
    inner: Mutex<HubInner>,
    connection_buffer: usize,
    offline_queue: usize,
}

#[derive(Default)]
struct HubInner {
    /// owner → connection id → sender.
    conns: HashMap<String, HashMap<String, mpsc::Sender<Notification>>>,
    /// owner → notifications waiting for a connection.
    queued: HashMap<String, VecDeque<Notification>>,
}

impl StreamHub {
    pub fn new(connection_buffer: usize, offline_queue: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            connection_buffer: connection_buffer.max(1),
            offline_queue: offline_queue.max(1),
        }
    }

    /// Open a connection for an owner. Any queued backlog is flushed
    /// into the new connection first; whatever exceeds its buffer stays
    /// queued for the next flush.
    pub fn register(&self, owner: &str) -> (String, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(self.connection_buffer);
        let conn_id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut backlog) = inner.queued.remove(owner) {
            while let Some(note) = backlog.pop_front() {
                if let Err(TrySendError::Full(note)) = tx.try_send(note) {
                    backlog.push_front(note);
                    break;
                }
            }
            if !backlog.is_empty() {
                inner.queued.insert(owner.to_string(), backlog);
            }
        }
        inner
            .conns
            .entry(owner.to_string())
            .or_default()
            .insert(conn_id.clone(), tx);
        tracing::info!("🔌 stream connected for {owner} ({conn_id})");
        (conn_id, rx)
    }

    pub fn unregister(&self, owner: &str, conn_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conns) = inner.conns.get_mut(owner) {
            conns.remove(conn_id);
            if conns.is_empty() {
                inner.conns.remove(owner);
            }
        }
        tracing::info!("🔌 stream closed for {owner} ({conn_id})");
    }

    /// Fan a notification out to every live connection for the owner.
    /// Connections with a full or closed buffer are dropped; with zero
    /// live connections the notification is queued.
    pub fn push(&self, owner: &str, note: Notification) {
        let mut inner = self.inner.lock().unwrap();
        let mut delivered = false;
        if let Some(conns) = inner.conns.get_mut(owner) {
            let mut dead = Vec::new();
            for (conn_id, tx) in conns.iter() {
                match tx.try_send(note.clone()) {
                    Ok(()) => delivered = true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            "connection {conn_id} for {owner} not draining — dropping it"
                        );
                        dead.push(conn_id.clone());
                    }
                    Err(TrySendError::Closed(_)) => dead.push(conn_id.clone()),
                }
            }
            for conn_id in dead {
                conns.remove(&conn_id);
            }
            if conns.is_empty() {
                inner.conns.remove(owner);
            }
        }
        if !delivered {
            let queue = inner.queued.entry(owner.to_string()).or_default();
            if queue.len() >= self.offline_queue {
                queue.pop_front();
                tracing::warn!("offline queue full for {owner} — oldest notification dropped");
            }
            queue.push_back(note);
        }
    }

    /// Non-blocking snapshot-and-clear of the offline queue.
    pub fn drain(&self, owner: &str) -> Vec<Notification> {
        self.inner
            .lock()
            .unwrap()
            .queued
            .remove(owner)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn connection_count(&self, owner: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .conns
            .get(owner)
            .map_or(0, HashMap::len)
    }

    pub fn queued_count(&self, owner: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queued
            .get(owner)
            .map_or(0, VecDeque::len)
    }
}

impl NotificationSink for StreamHub {
    fn push(&self, owner: &str, notification: Notification) {
        StreamHub::push(self, owner, notification);
    }
}

/// SSE endpoint — one long-lived connection per authenticated owner,
/// `event:`/`id:`/`data:` frames plus periodic heartbeat comments.
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
) -> Sse<KeepAliveStream<NotificationStream>> {
    let (conn_id, rx) = state.hub.register(&owner.0);
    let stream = NotificationStream {
        rx,
        _guard: StreamGuard {
            hub: state.hub.clone(),
            owner: owner.0,
            conn_id,
        },
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.stream.heartbeat_secs.max(1)))
            .text("heartbeat"),
    )
}

pub struct NotificationStream {
    rx: mpsc::Receiver<Notification>,
    _guard: StreamGuard,
}

impl Stream for NotificationStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(note)) => {
                let event = Event::default()
                    .event(note.kind.to_string())
                    .id(note.event_id.clone())
                    .data(serde_json::to_string(&note).unwrap_or_default());
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Unregisters the connection when the client goes away and the stream
/// is dropped.
struct StreamGuard {
    hub: Arc<StreamHub>,
    owner: String,
    conn_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.hub.unregister(&self.owner, &self.conn_id);
    }
}
