use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::pending_submission::{PendingSubmission, RejectedSubmission};
use crate::models::test_attempt::TestAttempt;
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::storage::{KeyValueStore, PENDING_SUBMISSIONS_KEY, REJECTED_SUBMISSIONS_KEY};
use crate::services::transport::{send_with_timeout, AttemptTransport};
use crate::utils::time::now;
use crate::utils::token::generate_local_id;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: usize,
    /// Transient failures; these stay queued.
    pub failed: usize,
    /// Refused by the record store and moved out of the queue.
    pub rejected: usize,
    pub remaining: usize,
    /// Another drain was already running; it will make one more pass.
    pub skipped: bool,
}

/// Durable staging area for attempts that could not be delivered.
///
/// Every mutation of the stored list is a read-modify-write performed under
/// `write_lock`, so an enqueue from a new session can interleave with a drain
/// without losing or duplicating entries. Drains never hold the lock across a
/// network call; removals re-read the list first.
pub struct OfflineQueue {
    storage: Arc<dyn KeyValueStore>,
    transport: Arc<dyn AttemptTransport>,
    transmit_timeout: Duration,
    write_lock: Mutex<()>,
    drain_lock: Mutex<()>,
    rerun: AtomicBool,
}

impl OfflineQueue {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        transport: Arc<dyn AttemptTransport>,
        transmit_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            transport,
            transmit_timeout,
            write_lock: Mutex::new(()),
            drain_lock: Mutex::new(()),
            rerun: AtomicBool::new(false),
        }
    }

    /// Appends the attempt unless it is already queued, in which case the
    /// existing entry is returned.
    pub async fn enqueue(&self, attempt: TestAttempt, local_id: Option<String>) -> Result<PendingSubmission> {
        let _guard = self.write_lock.lock().await;
        let mut pending = self.load().await?;

        if let Some(existing) = pending.iter().find(|p| {
            p.attempt.id == attempt.id || local_id.as_deref() == Some(p.local_id.as_str())
        }) {
            tracing::debug!(local_id = %existing.local_id, attempt_id = %attempt.id, "Attempt already queued");
            return Ok(existing.clone());
        }

        let item = PendingSubmission {
            local_id: local_id.unwrap_or_else(|| generate_local_id(12)),
            attempt,
            queued_at: now(),
        };
        pending.push(item.clone());
        self.save(&pending).await?;

        tracing::info!(
            local_id = %item.local_id,
            attempt_id = %item.attempt.id,
            queued = pending.len(),
            "Attempt queued for later delivery"
        );
        Ok(item)
    }

    pub async fn pending(&self) -> Result<Vec<PendingSubmission>> {
        let _guard = self.write_lock.lock().await;
        self.load().await
    }

    pub async fn rejected(&self) -> Result<Vec<RejectedSubmission>> {
        let _guard = self.write_lock.lock().await;
        self.load_rejected().await
    }

    /// Replays every queued attempt. Successes are removed, transient
    /// failures stay queued in their original order, rejections are moved to
    /// the rejected list.
    ///
    /// If a drain is already running this call returns `skipped` and the
    /// running drain makes another full pass before it finishes.
    pub async fn drain(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        let mut first = true;
        loop {
            // Raised before trying the lock so a holder that is about to
            // release it always observes the request.
            self.rerun.store(true, Ordering::SeqCst);
            let Ok(guard) = self.drain_lock.try_lock() else {
                if first {
                    tracing::debug!("Drain already in progress, requesting another pass");
                    return Ok(DrainReport {
                        skipped: true,
                        ..DrainReport::default()
                    });
                }
                break;
            };
            first = false;

            while self.rerun.swap(false, Ordering::SeqCst) {
                self.drain_pass(&mut report).await?;
            }
            drop(guard);

            if !self.rerun.load(Ordering::SeqCst) {
                break;
            }
        }

        report.remaining = self.pending().await?.len();
        tracing::info!(
            sent = report.sent,
            failed = report.failed,
            rejected = report.rejected,
            remaining = report.remaining,
            "Offline queue drained"
        );
        Ok(report)
    }

    /// One attempt per queued item. The list is re-read after each batch so
    /// items enqueued mid-pass are delivered in the same pass.
    async fn drain_pass(&self, report: &mut DrainReport) -> Result<()> {
        let mut attempted: HashSet<String> = HashSet::new();
        loop {
            let batch: Vec<PendingSubmission> = self
                .pending()
                .await?
                .into_iter()
                .filter(|p| !attempted.contains(&p.local_id))
                .collect();
            if batch.is_empty() {
                return Ok(());
            }

            for item in batch {
                attempted.insert(item.local_id.clone());
                match send_with_timeout(self.transport.as_ref(), &item.attempt, self.transmit_timeout).await {
                    Ok(()) => {
                        self.remove(&item.local_id).await?;
                        report.sent += 1;
                        tracing::info!(local_id = %item.local_id, attempt_id = %item.attempt.id, "Queued attempt delivered");
                    }
                    Err(e) if e.is_transient() => {
                        report.failed += 1;
                        tracing::warn!(local_id = %item.local_id, error = %e, "Queued attempt still undeliverable");
                    }
                    Err(e) => {
                        report.rejected += 1;
                        tracing::error!(local_id = %item.local_id, error = %e, "Queued attempt rejected by record store");
                        self.set_aside(item, e.to_string()).await?;
                    }
                }
            }
        }
    }

    /// Drains on every offline→online transition, including transitions that
    /// happen while a drain is running, and once immediately if already
    /// online.
    pub fn spawn_reconnect_drain(self: Arc<Self>, connectivity: ConnectivityMonitor) -> JoinHandle<()> {
        let mut rx = connectivity.subscribe();
        tokio::spawn(async move {
            let online = *rx.borrow_and_update();
            let mut seen = connectivity.reconnects();
            if online {
                self.drain_logged().await;
            }
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                let edges = connectivity.reconnects();
                if edges != seen && online {
                    self.drain_logged().await;
                }
                seen = edges;
            }
        })
    }

    async fn drain_logged(&self) {
        if let Err(e) = self.drain().await {
            tracing::error!(error = ?e, "Offline queue drain failed");
        }
    }

    async fn remove(&self, local_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut pending = self.load().await?;
        pending.retain(|p| p.local_id != local_id);
        self.save(&pending).await
    }

    async fn set_aside(&self, item: PendingSubmission, reason: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut rejected = self.load_rejected().await?;
        let local_id = item.local_id.clone();
        rejected.push(RejectedSubmission {
            submission: item,
            reason,
            rejected_at: now(),
        });
        self.storage
            .put(REJECTED_SUBMISSIONS_KEY, serde_json::to_value(&rejected)?)
            .await?;

        let mut pending = self.load().await?;
        pending.retain(|p| p.local_id != local_id);
        self.save(&pending).await
    }

    async fn load(&self) -> Result<Vec<PendingSubmission>> {
        match self.storage.get(PENDING_SUBMISSIONS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn load_rejected(&self) -> Result<Vec<RejectedSubmission>> {
        match self.storage.get(REJECTED_SUBMISSIONS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, pending: &[PendingSubmission]) -> Result<()> {
        self.storage
            .put(PENDING_SUBMISSIONS_KEY, serde_json::to_value(pending)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_attempt::ScoredAnswer;
    use crate::services::storage::MemoryStore;
    use crate::services::transport::{MockAttemptTransport, TransportError};
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    /// Fails its first send after `delay`, succeeds afterwards.
    struct SlowFirstTransport {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl SlowFirstTransport {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait::async_trait]
    impl AttemptTransport for SlowFirstTransport {
        async fn send(&self, _attempt: &TestAttempt) -> std::result::Result<(), TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(self.delay).await;
                return Err(TransportError::Network("link dropped".into()));
            }
            Ok(())
        }
    }

    struct HangingTransport;

    #[async_trait::async_trait]
    impl AttemptTransport for HangingTransport {
        async fn send(&self, _attempt: &TestAttempt) -> std::result::Result<(), TransportError> {
            std::future::pending().await
        }
    }

    fn attempt(participant: &str) -> TestAttempt {
        let end = Utc::now();
        TestAttempt {
            id: Uuid::new_v4(),
            test_id: "t1".into(),
            participant_id: participant.into(),
            participant_name: None,
            start_time: end - chrono::Duration::seconds(60),
            end_time: end,
            answers: vec![ScoredAnswer {
                question_id: "q1".into(),
                raw_answer: None,
                is_correct: false,
                points_awarded: 0,
            }],
            points_awarded: 0,
            max_possible_points: 1,
            score_percentage: 0,
            is_suspicious: false,
            suspicious_reason: None,
            tab_switches: 0,
            activity_log: Vec::new(),
        }
    }

    fn queue(transport: MockAttemptTransport) -> OfflineQueue {
        OfflineQueue::new(
            Arc::new(MemoryStore::new()),
            Arc::new(transport),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn drain_success_removes_item() {
        let mut transport = MockAttemptTransport::new();
        transport.expect_send().times(1).returning(|_| Ok(()));
        let queue = queue(transport);

        queue.enqueue(attempt("alice"), None).await.unwrap();
        let report = queue.drain().await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.remaining, 0);
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_failed_drains_keep_exactly_one_copy() {
        let mut transport = MockAttemptTransport::new();
        transport
            .expect_send()
            .times(3)
            .returning(|_| Err(TransportError::Network("connection refused".into())));
        let queue = queue(transport);

        let queued = queue.enqueue(attempt("alice"), None).await.unwrap();
        for _ in 0..3 {
            let report = queue.drain().await.unwrap();
            assert_eq!(report.failed, 1);
            assert_eq!(report.remaining, 1);
        }
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, queued.local_id);
    }

    #[tokio::test]
    async fn partial_success_preserves_order_of_the_rest() {
        let mut transport = MockAttemptTransport::new();
        transport.expect_send().returning(|a| {
            if a.participant_id == "bob" {
                Ok(())
            } else {
                Err(TransportError::Server {
                    status: 503,
                    message: "busy".into(),
                })
            }
        });
        let queue = queue(transport);

        for who in ["alice", "bob", "carol"] {
            queue.enqueue(attempt(who), None).await.unwrap();
        }
        let report = queue.drain().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 2);

        let left: Vec<_> = queue
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.attempt.participant_id)
            .collect();
        assert_eq!(left, vec!["alice".to_string(), "carol".to_string()]);
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_attempt_and_local_id() {
        let queue = queue(MockAttemptTransport::new());
        let a = attempt("alice");

        let first = queue
            .enqueue(a.clone(), Some("local-session-1".into()))
            .await
            .unwrap();
        let again = queue.enqueue(a.clone(), None).await.unwrap();
        let same_local = queue
            .enqueue(attempt("alice"), Some("local-session-1".into()))
            .await
            .unwrap();

        assert_eq!(first.local_id, "local-session-1");
        assert_eq!(again.local_id, first.local_id);
        assert_eq!(same_local.attempt.id, a.id);
        assert_eq!(queue.pending().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn enqueue_during_drain_is_not_lost() {
        let mut transport = MockAttemptTransport::new();
        transport.expect_send().returning(|_| Ok(()));
        let queue = Arc::new(queue(transport));

        for i in 0..10 {
            queue.enqueue(attempt(&format!("early-{}", i)), None).await.unwrap();
        }

        let drainer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await.unwrap() })
        };
        let mut writers = Vec::new();
        for i in 0..10 {
            let queue = queue.clone();
            writers.push(tokio::spawn(async move {
                queue.enqueue(attempt(&format!("late-{}", i)), None).await.unwrap();
            }));
        }
        for w in writers {
            w.await.unwrap();
        }
        let first = drainer.await.unwrap();

        // Whatever the first drain did not see must still be queued.
        let still_pending = queue.pending().await.unwrap().len();
        assert_eq!(first.sent + still_pending, 20);

        let second = queue.drain().await.unwrap();
        assert_eq!(second.remaining, 0);
        assert_eq!(first.sent + second.sent, 20);
    }

    #[tokio::test]
    async fn reconnect_triggers_drain() {
        let mut transport = MockAttemptTransport::new();
        transport.expect_send().times(1).returning(|_| Ok(()));
        let queue = Arc::new(queue(transport));
        let connectivity = ConnectivityMonitor::new(false);

        queue.enqueue(attempt("alice"), None).await.unwrap();
        let task = queue.clone().spawn_reconnect_drain(connectivity.clone());

        connectivity.set_online(true);
        for _ in 0..50 {
            if queue.pending().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(queue.pending().await.unwrap().is_empty());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_while_draining_triggers_another_drain() {
        let transport = Arc::new(SlowFirstTransport::new(Duration::from_millis(200)));
        let queue = Arc::new(OfflineQueue::new(
            Arc::new(MemoryStore::new()),
            transport.clone(),
            Duration::from_secs(1),
        ));
        let connectivity = ConnectivityMonitor::new(true);

        queue.enqueue(attempt("alice"), None).await.unwrap();
        let task = queue.clone().spawn_reconnect_drain(connectivity.clone());

        // Both transitions land while the first send is still in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        connectivity.set_online(false);
        connectivity.set_online(true);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(queue.pending().await.unwrap().is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_drain_makes_the_running_drain_go_again() {
        let transport = Arc::new(SlowFirstTransport::new(Duration::from_millis(100)));
        let queue = Arc::new(OfflineQueue::new(
            Arc::new(MemoryStore::new()),
            transport.clone(),
            Duration::from_secs(1),
        ));
        queue.enqueue(attempt("alice"), None).await.unwrap();

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let concurrent = queue.drain().await.unwrap();
        assert!(concurrent.skipped);

        let report = running.await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_transport_times_out_and_keeps_item() {
        let queue = OfflineQueue::new(
            Arc::new(MemoryStore::new()),
            Arc::new(HangingTransport),
            Duration::from_secs(5),
        );
        queue.enqueue(attempt("alice"), None).await.unwrap();

        let report = queue.drain().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_item_is_set_aside_and_not_retried() {
        let mut transport = MockAttemptTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Err(TransportError::Rejected {
                status: 422,
                message: "score out of range".into(),
            })
        });
        let queue = queue(transport);
        let queued = queue.enqueue(attempt("alice"), None).await.unwrap();

        let first = queue.drain().await.unwrap();
        assert_eq!(first.rejected, 1);
        assert_eq!(first.failed, 0);
        assert_eq!(first.remaining, 0);

        let second = queue.drain().await.unwrap();
        assert_eq!(second, DrainReport::default());

        let rejected = queue.rejected().await.unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].submission.local_id, queued.local_id);
        assert!(rejected[0].reason.contains("422"));
        assert!(queue.pending().await.unwrap().is_empty());
    }
}
