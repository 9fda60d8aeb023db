//! Per-workspace output fan-out.
//!
//! Every workspace has a subscription topic, created implicitly by its first
//! subscriber. Output published to a topic is delivered to every currently
//! subscribed viewer in publish order. Slow viewers never stall the
//! publisher: each viewer gets a bounded channel and chunks are dropped for
//! that viewer alone once it fills. There is no replay; late joiners catch
//! up via the coordinator's scrollback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::RwLock;

use super::pty::WorkspaceId;

/// Unique identifier for a subscribed viewer.
pub type ViewerId = String;

/// Per-viewer channel capacity, in output chunks.
const VIEWER_CHANNEL_CAPACITY: usize = 256;

/// Delivery statistics for a single viewer.
#[derive(Debug, Clone, Default)]
pub struct ViewerStats {
    /// Chunks delivered successfully.
    pub chunks_sent: u64,
    /// Chunks dropped because the viewer's channel was full.
    pub chunks_dropped: u64,
    /// Whether the viewer is currently experiencing backpressure.
    pub is_backpressured: bool,
}

/// A subscribed viewer's sending side.
struct ViewerHandle {
    id: ViewerId,
    tx: mpsc::Sender<Vec<u8>>,
    stats: ViewerStats,
    backpressured: AtomicBool,
}

impl ViewerHandle {
    fn new(id: ViewerId, capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ViewerHandle {
            id,
            tx,
            stats: ViewerStats::default(),
            backpressured: AtomicBool::new(false),
        };
        (handle, rx)
    }

    fn stats(&self) -> ViewerStats {
        let mut stats = self.stats.clone();
        stats.is_backpressured = self.backpressured.load(Ordering::Relaxed);
        stats
    }

    /// Non-blocking send. Returns true if delivered, false if dropped.
    fn try_send(&mut self, data: Vec<u8>) -> bool {
        match self.tx.try_send(data) {
            Ok(()) => {
                self.stats.chunks_sent += 1;
                if self.backpressured.swap(false, Ordering::Relaxed) {
                    tracing::debug!(viewer = %self.id, "Viewer recovered from backpressure");
                }
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.chunks_dropped += 1;
                if !self.backpressured.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        viewer = %self.id,
                        dropped = self.stats.chunks_dropped,
                        "Viewer is backpressured, dropping output"
                    );
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(viewer = %self.id, "Viewer channel closed");
                false
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One workspace's set of subscribed viewers.
#[derive(Default)]
struct Topic {
    viewers: HashMap<ViewerId, ViewerHandle>,
}

/// Registry of per-workspace subscription topics.
///
/// Subscribe/unsubscribe may run concurrently with the coordinator; neither
/// touches session state, they only manage delivery channels.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<WorkspaceId, Topic>>,
}

impl TopicRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a viewer to a workspace's output topic.
    ///
    /// The topic is created if this is its first subscriber. Subscribing the
    /// same viewer id again replaces its previous channel.
    pub async fn subscribe(
        &self,
        workspace_id: &str,
        viewer_id: &str,
    ) -> mpsc::Receiver<Vec<u8>> {
        self.subscribe_with_capacity(workspace_id, viewer_id, VIEWER_CHANNEL_CAPACITY)
            .await
    }

    /// Subscribes with an explicit channel capacity.
    pub async fn subscribe_with_capacity(
        &self,
        workspace_id: &str,
        viewer_id: &str,
        capacity: usize,
    ) -> mpsc::Receiver<Vec<u8>> {
        let (handle, rx) = ViewerHandle::new(viewer_id.to_string(), capacity);
        let mut topics = self.topics.write().await;
        let topic = topics.entry(workspace_id.to_string()).or_default();
        topic.viewers.insert(viewer_id.to_string(), handle);
        tracing::debug!(workspace = %workspace_id, viewer = %viewer_id, "Viewer subscribed");
        rx
    }

    /// Unsubscribes a viewer from a workspace's topic.
    ///
    /// Idempotent: unknown workspace or viewer ids are not errors. Returns
    /// the viewer's delivery stats if it was subscribed.
    pub async fn unsubscribe(&self, workspace_id: &str, viewer_id: &str) -> Option<ViewerStats> {
        let mut topics = self.topics.write().await;
        let topic = topics.get_mut(workspace_id)?;
        let stats = topic.viewers.remove(viewer_id).map(|h| h.stats());
        if stats.is_some() {
            tracing::debug!(workspace = %workspace_id, viewer = %viewer_id, "Viewer unsubscribed");
        }
        stats
    }

    /// Publishes an output chunk to every viewer of a workspace's topic.
    ///
    /// Viewers whose receivers have been dropped are pruned here. Returns
    /// the number of viewers that received the chunk.
    pub async fn publish(&self, workspace_id: &str, data: &[u8]) -> usize {
        let mut topics = self.topics.write().await;
        let Some(topic) = topics.get_mut(workspace_id) else {
            return 0;
        };

        let mut disconnected = Vec::new();
        let mut delivered = 0;

        for (viewer_id, handle) in topic.viewers.iter_mut() {
            if handle.is_closed() {
                disconnected.push(viewer_id.clone());
                continue;
            }
            if handle.try_send(data.to_vec()) {
                delivered += 1;
            }
        }

        for viewer_id in disconnected {
            topic.viewers.remove(&viewer_id);
            tracing::debug!(workspace = %workspace_id, viewer = %viewer_id, "Pruned disconnected viewer");
        }

        delivered
    }

    /// Number of viewers currently subscribed to a workspace.
    pub async fn viewer_count(&self, workspace_id: &str) -> usize {
        self.topics
            .read()
            .await
            .get(workspace_id)
            .map(|t| t.viewers.len())
            .unwrap_or(0)
    }

    /// Delivery stats for a single viewer, if subscribed.
    pub async fn viewer_stats(&self, workspace_id: &str, viewer_id: &str) -> Option<ViewerStats> {
        self.topics
            .read()
            .await
            .get(workspace_id)?
            .viewers
            .get(viewer_id)
            .map(|h| h.stats())
    }
}
