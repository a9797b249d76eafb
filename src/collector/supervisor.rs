//! Collection supervisor managing per-group fetch task lifecycle.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collector::task::{FetchTask, collect_once};
use crate::collector::{CollectorError, Source};
use crate::storage::{GroupId, Record, RecordWriter};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Groups covered by [`CollectionSupervisor::active_snapshot`].
pub const REPORTING_GROUPS: RangeInclusive<GroupId> = 1..=9;

/// A running fetch task.
struct ActiveTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveTask {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Owner of the per-group fetch tasks.
///
/// A group's presence in the task map is the only record of it collecting;
/// at most one task exists per group.
pub struct CollectionSupervisor {
    source: Arc<dyn Source>,
    writer: RecordWriter,
    interval: Duration,
    tasks: RwLock<HashMap<GroupId, ActiveTask>>,
}

impl CollectionSupervisor {
    /// Create a supervisor that polls `source` every `interval` per group.
    pub fn new(source: Arc<dyn Source>, writer: RecordWriter, interval: Duration) -> Self {
        Self {
            source,
            writer,
            interval,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Pause between two fetches of one group.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for CollectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionSupervisor")
            .field("upstream", &self.source.target())
            .field("interval", &self.interval)
            .field(
                "task_count",
                &self.tasks.try_read().map(|t| t.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

impl CollectionSupervisor {
    /// Begin periodic collection for `group_id`.
    ///
    /// Returns `false` without side effects when the group is already
    /// collecting. A task that exited on its own (panic) counts as stopped and
    /// is replaced.
    pub async fn start(&self, group_id: GroupId) -> bool {
        let mut tasks = self.tasks.write().await;

        if let Some(existing) = tasks.get(&group_id) {
            if existing.is_live() {
                tracing::debug!(group_id, "Collection already running");
                return false;
            }
            tracing::warn!(group_id, "Replacing fetch task that exited unexpectedly");
        }

        let token = CancellationToken::new();
        let task = FetchTask {
            group_id,
            source: Arc::clone(&self.source),
            writer: self.writer.clone(),
            interval: self.interval,
            token: token.clone(),
        };
        let handle = tokio::spawn(task.run());
        tasks.insert(group_id, ActiveTask { token, handle });

        tracing::info!(group_id, interval = ?self.interval, "Collection started");
        true
    }

    /// End periodic collection for `group_id`.
    ///
    /// The group leaves the active set before this returns; the task itself
    /// stops at its next cancellation point. Returns `false` when the group
    /// was not collecting.
    pub async fn stop(&self, group_id: GroupId) -> bool {
        self.detach(group_id).await.is_some()
    }

    /// Like [`stop`](Self::stop), but also waits for the task to finish.
    pub async fn stop_and_wait(&self, group_id: GroupId) -> bool {
        let Some(handle) = self.detach(group_id).await else {
            return false;
        };
        if let Err(e) = handle.await {
            tracing::warn!(group_id, error = %e, "Fetch task ended abnormally");
        }
        true
    }

    /// Whether `group_id` is currently collecting.
    pub async fn is_active(&self, group_id: GroupId) -> bool {
        self.tasks
            .read()
            .await
            .get(&group_id)
            .is_some_and(ActiveTask::is_live)
    }

    /// All collecting groups, ascending.
    pub async fn active_groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self
            .tasks
            .read()
            .await
            .iter()
            .filter(|(_, task)| task.is_live())
            .map(|(group_id, _)| *group_id)
            .collect();
        groups.sort_unstable();
        groups
    }

    /// Collecting flag for every group in [`REPORTING_GROUPS`].
    ///
    /// Groups outside the range are not reported even when active.
    pub async fn active_snapshot(&self) -> BTreeMap<GroupId, bool> {
        let tasks = self.tasks.read().await;
        REPORTING_GROUPS
            .map(|group_id| {
                let active = tasks.get(&group_id).is_some_and(ActiveTask::is_live);
                (group_id, active)
            })
            .collect()
    }

    /// Fetch and store once for `group_id`, independent of any running task.
    pub async fn collect_once(&self, group_id: GroupId) -> Result<Record, CollectorError> {
        collect_once(self.source.as_ref(), &self.writer, group_id)
            .await
            .inspect_err(|e| tracing::warn!(group_id, error = %e, "Manual collection failed"))
    }

    /// Stop every group and wait for the tasks with the default timeout.
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await;
    }

    /// Stop every group and wait up to `timeout` for the tasks to finish.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        let drained: Vec<(GroupId, ActiveTask)> = self.tasks.write().await.drain().collect();
        let task_count = drained.len();

        let handles: Vec<JoinHandle<()>> = drained
            .into_iter()
            .map(|(group_id, task)| {
                task.token.cancel();
                tracing::debug!(group_id, "Collection stop requested");
                task.handle
            })
            .collect();

        let joined = tokio::time::timeout(timeout, async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "Fetch task ended abnormally");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => tracing::info!(task_count, "Collection supervisor shutdown complete"),
            Err(_) => tracing::warn!(task_count, "Collection supervisor shutdown timed out"),
        }
    }

    // --- Private helpers ---

    /// Remove the group's entry and cancel its task, returning the join handle.
    async fn detach(&self, group_id: GroupId) -> Option<JoinHandle<()>> {
        let task = self.tasks.write().await.remove(&group_id)?;
        task.token.cancel();

        if task.is_live() {
            tracing::info!(group_id, "Collection stopped");
            Some(task.handle)
        } else {
            // Exited on its own: already Idle from the caller's point of view.
            tracing::debug!(group_id, "Removed finished fetch task");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RecordReader, StorageBuilder, StorageHandles};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `{"v": n}` with n counting from 1.
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Source for CountingSource {
        fn target(&self) -> &str {
            "counting"
        }

        async fn fetch(&self) -> Result<Value, CollectorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "v": n }))
        }
    }

    /// Always answers with a server error.
    struct FailingSource;

    #[async_trait::async_trait]
    impl Source for FailingSource {
        fn target(&self) -> &str {
            "failing"
        }

        async fn fetch(&self) -> Result<Value, CollectorError> {
            Err(CollectorError::Status(500))
        }
    }

    /// Panics on first use.
    struct PanickingSource;

    #[async_trait::async_trait]
    impl Source for PanickingSource {
        fn target(&self) -> &str {
            "panicking"
        }

        async fn fetch(&self) -> Result<Value, CollectorError> {
            panic!("upstream client bug")
        }
    }

    const TICK: Duration = Duration::from_millis(30);

    async fn setup(source: Arc<dyn Source>) -> (CollectionSupervisor, StorageHandles) {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let supervisor = CollectionSupervisor::new(source, handles.writer.clone(), TICK);
        (supervisor, handles)
    }

    async fn wait_for_records(reader: &RecordReader, group_id: GroupId, n: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while reader.count(Some(group_id)).await.unwrap() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("records should arrive");
    }

    fn counting() -> Arc<dyn Source> {
        Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (supervisor, handles) = setup(counting()).await;

        assert!(supervisor.start(1).await);
        assert!(!supervisor.start(1).await);
        assert!(supervisor.is_active(1).await);
        assert_eq!(supervisor.active_groups().await, vec![1]);

        supervisor.shutdown().await;
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_semantics() {
        let (supervisor, handles) = setup(counting()).await;

        assert!(!supervisor.stop(2).await);

        assert!(supervisor.start(2).await);
        assert!(supervisor.stop(2).await);
        assert!(!supervisor.is_active(2).await);
        assert!(!supervisor.stop(2).await);

        // Restart after stop is allowed.
        assert!(supervisor.start(2).await);
        assert!(supervisor.stop_and_wait(2).await);
        assert!(!supervisor.stop_and_wait(2).await);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_collects_in_order_and_stops() {
        let (supervisor, handles) = setup(counting()).await;

        assert!(supervisor.start(3).await);
        wait_for_records(&handles.reader, 3, 2).await;
        assert!(supervisor.stop_and_wait(3).await);

        let records = handles.reader.list(Some(3)).await.unwrap();
        assert_eq!(records[0].payload, json!({"v": 1}));
        assert_eq!(records[1].payload, json!({"v": 2}));
        assert!(records.windows(2).all(|w| w[0].id < w[1].id));

        let settled = records.len() as u64;
        tokio::time::sleep(TICK * 4).await;
        assert_eq!(handles.reader.count(Some(3)).await.unwrap(), settled);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_upstream_keeps_group_active() {
        let (supervisor, handles) = setup(Arc::new(FailingSource)).await;

        assert!(supervisor.start(5).await);
        for _ in 0..3 {
            tokio::time::sleep(TICK).await;
            assert!(supervisor.is_active(5).await);
        }
        assert!(handles.reader.list(Some(5)).await.unwrap().is_empty());

        supervisor.shutdown().await;
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicked_task_counts_as_stopped() {
        let (supervisor, handles) = setup(Arc::new(PanickingSource)).await;

        assert!(supervisor.start(4).await);
        tokio::time::timeout(Duration::from_secs(5), async {
            while supervisor.is_active(4).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("panicked task should read as inactive");

        assert!(supervisor.active_groups().await.is_empty());
        assert!(!supervisor.stop(4).await);
        assert!(supervisor.start(4).await);

        supervisor.shutdown().await;
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_active_snapshot_covers_reporting_range_only() {
        let (supervisor, handles) = setup(Arc::new(FailingSource)).await;

        supervisor.start(2).await;
        supervisor.start(12).await;

        let snapshot = supervisor.active_snapshot().await;
        assert_eq!(snapshot.len(), 9);
        assert_eq!(
            snapshot.keys().copied().collect::<Vec<_>>(),
            (1..=9).collect::<Vec<GroupId>>()
        );
        assert!(snapshot[&2]);
        assert!(!snapshot[&1]);
        assert!(!snapshot.contains_key(&12));
        assert!(supervisor.is_active(12).await);

        supervisor.shutdown().await;
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_groups() {
        let (supervisor, handles) = setup(counting()).await;

        for group_id in [1, 2, 3] {
            assert!(supervisor.start(group_id).await);
        }
        supervisor.shutdown().await;

        assert!(supervisor.active_groups().await.is_empty());
        let settled = handles.reader.count(None).await.unwrap();
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(handles.reader.count(None).await.unwrap(), settled);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_collect_once_independent_of_tasks() {
        let (supervisor, handles) = setup(counting()).await;

        let record = supervisor.collect_once(1).await.unwrap();
        assert_eq!(record.group_id, 1);
        assert_eq!(record.payload, json!({"v": 1}));
        assert!(!supervisor.is_active(1).await);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_collect_once_failure_appends_nothing() {
        let (supervisor, handles) = setup(Arc::new(FailingSource)).await;

        assert!(supervisor.collect_once(1).await.is_err());
        assert_eq!(handles.reader.count(Some(1)).await.unwrap(), 0);

        handles.shutdown().await.unwrap();
    }
}
