//! Position-slot admission: caps concurrent positions and queues overflow
//! signals in a bounded FIFO with expiry.

use chrono::{DateTime, Duration, Utc};
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use walltrack_core::config::SharedConfig;
use walltrack_core::stores::{EventLog, PositionStore, QueueStore};
use walltrack_core::types::{PositionSlotEvent, QueuedSignal, SlotEventType};
use walltrack_core::Result;

/// Callback invoked with the released signal when a slot frees up.
pub type ReleaseCallback =
    Arc<dyn Fn(QueuedSignal) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome of a slot request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// A slot is free; proceed to sizing and execution.
    Allowed,
    /// All slots taken; queued at the given 1-based position.
    Queued { position: usize },
    /// All slots taken and queuing is disabled.
    BlockedNoQueue,
}

/// Snapshot of one queue entry for the status surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueEntry {
    pub signal_id: Uuid,
    pub position: usize,
    pub enqueued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Serialized admission over the open-position count with a FIFO overflow
/// queue. Queue operations run under a single async mutex.
pub struct PositionSlotManager {
    positions: Arc<dyn PositionStore>,
    queue_store: Arc<dyn QueueStore>,
    events: Arc<dyn EventLog>,
    config: SharedConfig,
    queue: Mutex<VecDeque<QueuedSignal>>,
    callback: RwLock<Option<ReleaseCallback>>,
}

impl PositionSlotManager {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        queue_store: Arc<dyn QueueStore>,
        events: Arc<dyn EventLog>,
        config: SharedConfig,
    ) -> Self {
        Self {
            positions,
            queue_store,
            events,
            config,
            queue: Mutex::new(VecDeque::new()),
            callback: RwLock::new(None),
        }
    }

    /// Register the callback that re-enters released signals into the trade
    /// path. The callback itself may be denied downstream; that outcome does
    /// not requeue.
    pub async fn register_release_callback(&self, callback: ReleaseCallback) {
        *self.callback.write().await = Some(callback);
    }

    /// Rebuild the in-memory queue from the persisted mirror on startup.
    pub async fn restore(&self) -> Result<usize> {
        let now = Utc::now();
        self.queue_store.remove_expired(now).await?;
        let entries = self.queue_store.list_all().await?;
        let count = entries.len();
        *self.queue.lock().await = entries.into();
        if count > 0 {
            info!(count, "restored signal queue from storage");
        }
        Ok(count)
    }

    /// Request a position slot for an eligible signal.
    pub async fn request(
        &self,
        signal_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<AdmissionOutcome> {
        let (max_positions, queue_config) = {
            let config = self.config.read().await;
            (config.sizing.max_concurrent_positions, config.queue.clone())
        };

        let open = self.positions.count_open().await?;
        if (open as usize) < max_positions {
            self.record_event(SlotEventType::Allowed, Some(signal_id), None)
                .await;
            return Ok(AdmissionOutcome::Allowed);
        }

        if !queue_config.enable_queue {
            self.record_event(SlotEventType::BlockedNoQueue, Some(signal_id), None)
                .await;
            return Ok(AdmissionOutcome::BlockedNoQueue);
        }

        let mut queue = self.queue.lock().await;
        self.sweep_expired(&mut queue).await;

        // Drop the oldest entry when the queue is at capacity.
        if queue.len() >= queue_config.max_queue_size {
            if let Some(evicted) = queue.pop_front() {
                warn!(signal_id = %evicted.signal_id, "queue full, dropping oldest signal");
                let _ = self.queue_store.remove(evicted.id).await;
                self.record_event(
                    SlotEventType::QueueOverflow,
                    Some(evicted.signal_id),
                    Some("evicted for newer signal".into()),
                )
                .await;
            }
        }

        let queued = QueuedSignal {
            id: Uuid::new_v4(),
            signal_id,
            payload,
            enqueued_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(queue_config.queue_expiry_minutes),
        };
        self.queue_store.insert(&queued).await?;
        queue.push_back(queued);
        let position = queue.len();

        self.record_event(SlotEventType::Queued, Some(signal_id), None)
            .await;
        debug!(signal_id = %signal_id, position, "signal queued for position slot");

        Ok(AdmissionOutcome::Queued { position })
    }

    /// Release the slot freed by a closed position: pop the queue head
    /// (skipping expired entries) and hand it to the registered callback.
    pub async fn on_position_closed(&self, position_id: Uuid) -> Result<Option<QueuedSignal>> {
        let popped = {
            let mut queue = self.queue.lock().await;
            self.sweep_expired(&mut queue).await;
            queue.pop_front()
        };

        let Some(queued) = popped else {
            return Ok(None);
        };

        self.queue_store.remove(queued.id).await?;
        self.record_event(
            SlotEventType::Released,
            Some(queued.signal_id),
            Some(format!("slot freed by position {position_id}")),
        )
        .await;
        info!(signal_id = %queued.signal_id, "released queued signal into trade path");

        let callback = self.callback.read().await.clone();
        if let Some(callback) = callback {
            callback(queued.clone()).await;
        }

        Ok(Some(queued))
    }

    /// Current queue contents in FIFO order. Sweeps expired entries first.
    pub async fn get_queue_status(&self) -> Vec<QueueEntry> {
        let mut queue = self.queue.lock().await;
        self.sweep_expired(&mut queue).await;
        queue
            .iter()
            .enumerate()
            .map(|(i, q)| QueueEntry {
                signal_id: q.signal_id,
                position: i + 1,
                enqueued_at: q.enqueued_at,
                expires_at: q.expires_at,
            })
            .collect()
    }

    async fn sweep_expired(&self, queue: &mut VecDeque<QueuedSignal>) {
        let now = Utc::now();
        while let Some(head) = queue.front() {
            if !head.is_expired(now) {
                break;
            }
            let expired = queue.pop_front().expect("front checked above");
            let _ = self.queue_store.remove(expired.id).await;
            self.record_event(SlotEventType::Expired, Some(expired.signal_id), None)
                .await;
        }
        // Expiry is FIFO-ordered in practice, but a shortened config TTL can
        // leave expired entries behind the head; clear those too.
        let mut i = 0;
        while i < queue.len() {
            if queue[i].is_expired(now) {
                if let Some(expired) = queue.remove(i) {
                    let _ = self.queue_store.remove(expired.id).await;
                    self.record_event(SlotEventType::Expired, Some(expired.signal_id), None)
                        .await;
                }
            } else {
                i += 1;
            }
        }
    }

    async fn record_event(
        &self,
        event_type: SlotEventType,
        signal_id: Option<Uuid>,
        detail: Option<String>,
    ) {
        let event = PositionSlotEvent::new(event_type, signal_id, detail);
        if let Err(e) = self.events.append_slot_event(&event).await {
            warn!(error = %e, "failed to append position slot event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use walltrack_core::config::TradingConfig;
    use walltrack_core::stores::{MockEventLog, MockPositionStore, MockQueueStore};

    fn manager(open_positions: i64, max_positions: usize, queue_size: usize, enable_queue: bool) -> PositionSlotManager {
        let mut config = TradingConfig::default();
        config.sizing.max_concurrent_positions = max_positions;
        config.queue.max_queue_size = queue_size;
        config.queue.enable_queue = enable_queue;

        let mut positions = MockPositionStore::new();
        positions
            .expect_count_open()
            .returning(move || Ok(open_positions));

        let mut queue_store = MockQueueStore::new();
        queue_store.expect_insert().returning(|_| Ok(()));
        queue_store.expect_remove().returning(|_| Ok(()));
        queue_store.expect_remove_expired().returning(|_| Ok(0));
        queue_store.expect_list_all().returning(|| Ok(vec![]));

        let mut events = MockEventLog::new();
        events.expect_append_slot_event().returning(|_| Ok(()));

        PositionSlotManager::new(
            Arc::new(positions),
            Arc::new(queue_store),
            Arc::new(events),
            config.shared(),
        )
    }

    #[tokio::test]
    async fn test_allowed_below_limit() {
        let manager = manager(1, 2, 10, true);
        let outcome = manager
            .request(Uuid::new_v4(), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, AdmissionOutcome::Allowed);
    }

    #[tokio::test]
    async fn test_queued_at_limit() {
        let manager = manager(2, 2, 10, true);
        let outcome = manager
            .request(Uuid::new_v4(), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, AdmissionOutcome::Queued { position: 1 });
    }

    #[tokio::test]
    async fn test_blocked_when_queue_disabled() {
        let manager = manager(2, 2, 10, false);
        let outcome = manager
            .request(Uuid::new_v4(), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, AdmissionOutcome::BlockedNoQueue);
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let manager = manager(2, 2, 10, true);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        manager.request(first, serde_json::json!({})).await.unwrap();
        manager.request(second, serde_json::json!({})).await.unwrap();

        let status = manager.get_queue_status().await;
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].signal_id, first);
        assert_eq!(status[1].signal_id, second);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let manager = manager(2, 2, 2, true);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();

        manager.request(first, serde_json::json!({})).await.unwrap();
        manager.request(second, serde_json::json!({})).await.unwrap();
        manager.request(third, serde_json::json!({})).await.unwrap();

        let status = manager.get_queue_status().await;
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].signal_id, second);
        assert_eq!(status[1].signal_id, third);
    }

    #[tokio::test]
    async fn test_release_pops_head_and_invokes_callback() {
        let manager = manager(2, 2, 10, true);
        let first = Uuid::new_v4();
        manager.request(first, serde_json::json!({})).await.unwrap();

        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        manager
            .register_release_callback(Arc::new(move |queued: QueuedSignal| {
                let counter = counter.clone();
                Box::pin(async move {
                    assert_eq!(queued.payload, serde_json::json!({}));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }))
            .await;

        let released = manager.on_position_closed(Uuid::new_v4()).await.unwrap();
        assert_eq!(released.unwrap().signal_id, first);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert!(manager.get_queue_status().await.is_empty());
    }

    #[tokio::test]
    async fn test_release_with_empty_queue() {
        let manager = manager(2, 2, 10, true);
        let released = manager.on_position_closed(Uuid::new_v4()).await.unwrap();
        assert!(released.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_never_released() {
        let manager = manager(2, 2, 10, true);
        let stale = QueuedSignal {
            id: Uuid::new_v4(),
            signal_id: Uuid::new_v4(),
            payload: serde_json::json!({}),
            enqueued_at: Utc::now() - Duration::hours(2),
            expires_at: Utc::now() - Duration::hours(1),
        };
        manager.queue.lock().await.push_back(stale);

        let released = manager.on_position_closed(Uuid::new_v4()).await.unwrap();
        assert!(released.is_none());
        assert!(manager.get_queue_status().await.is_empty());
    }
}
