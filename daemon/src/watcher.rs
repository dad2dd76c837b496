//! Turns periodic refreshes into transition events.

use async_trait::async_trait;
use common::notice::NotificationSink;
use common::{
    any_active, ApiClient, ApiError, HealthSnapshot, JobStatus, Refresh, Severity, TrainingJob,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::metrics::MetricsCollector;
use crate::notifier::Notifier;

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    JobFinished(TrainingJob),
    PendingIncreased { previous: usize, current: usize },
    HealthDegraded { status: String, services: Vec<String> },
    HealthRecovered,
}

impl WatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::JobFinished(job) if job.status == JobStatus::Failed => "job_failed",
            WatchEvent::JobFinished(_) => "job_completed",
            WatchEvent::PendingIncreased { .. } => "pending_increased",
            WatchEvent::HealthDegraded { .. } => "health_degraded",
            WatchEvent::HealthRecovered => "health_recovered",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            WatchEvent::JobFinished(job) if job.status == JobStatus::Failed => Severity::Error,
            WatchEvent::HealthDegraded { .. } => Severity::Warning,
            WatchEvent::PendingIncreased { .. } => Severity::Info,
            WatchEvent::JobFinished(_) | WatchEvent::HealthRecovered => Severity::Success,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            WatchEvent::JobFinished(job) => Some(&job.id),
            _ => None,
        }
    }

    pub fn title(&self) -> String {
        match self {
            WatchEvent::JobFinished(job) => {
                format!("Training {} {}", job.display_name(), job.status)
            }
            WatchEvent::PendingIncreased { current, .. } => {
                format!("{} engineer application(s) awaiting review", current)
            }
            WatchEvent::HealthDegraded { .. } => "AI service degraded".to_string(),
            WatchEvent::HealthRecovered => "AI service recovered".to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            WatchEvent::JobFinished(job) => match (&job.error, job.status) {
                (Some(error), JobStatus::Failed) => format!("Job {} failed: {}", job.id, error),
                (None, JobStatus::Failed) => format!("Job {} failed", job.id),
                _ => format!("Job {} completed", job.id),
            },
            WatchEvent::PendingIncreased { previous, current } => {
                format!("Pending applications went from {} to {}", previous, current)
            }
            WatchEvent::HealthDegraded { status, services } if services.is_empty() => {
                format!("Overall status is {}", status)
            }
            WatchEvent::HealthDegraded { status, services } => {
                format!("Overall status is {}; unhealthy: {}", status, services.join(", "))
            }
            WatchEvent::HealthRecovered => "All services report healthy".to_string(),
        }
    }
}

/// Last observed state, compared against each refresh.
#[derive(Debug, Default)]
pub struct TransitionTracker {
    jobs: HashMap<String, JobStatus>,
    jobs_seen: bool,
    pending: Option<usize>,
    healthy: Option<bool>,
}

impl TransitionTracker {
    /// Jobs that reached a terminal state since the previous list.
    ///
    /// The first list is a baseline. After it, a job that shows up already
    /// terminal finished between two refreshes and is reported too.
    pub fn jobs(&mut self, jobs: &[TrainingJob]) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        for job in jobs {
            let previous = self.jobs.insert(job.id.clone(), job.status);
            if !self.jobs_seen || !job.status.is_terminal() {
                continue;
            }
            let was_terminal = previous.map(|s| s.is_terminal()).unwrap_or(false);
            if !was_terminal {
                events.push(WatchEvent::JobFinished(job.clone()));
            }
        }
        self.jobs_seen = true;
        events
    }

    pub fn pending(&mut self, count: usize) -> Option<WatchEvent> {
        let previous = self.pending.replace(count)?;
        (count > previous).then_some(WatchEvent::PendingIncreased { previous, current: count })
    }

    /// Degraded on the first unhealthy snapshot, recovered only after a degraded one.
    pub fn health(&mut self, snapshot: &HealthSnapshot) -> Option<WatchEvent> {
        let healthy = snapshot.is_healthy();
        let previous = self.healthy.replace(healthy);
        match (previous, healthy) {
            (Some(true) | None, false) => Some(WatchEvent::HealthDegraded {
                status: snapshot.status.clone(),
                services: snapshot.unhealthy_services().into_iter().map(String::from).collect(),
            }),
            (Some(false), true) => Some(WatchEvent::HealthRecovered),
            _ => None,
        }
    }
}

pub struct Watcher {
    client: Arc<ApiClient>,
    notifier: Arc<Notifier>,
    metrics: Arc<MetricsCollector>,
    sink: Arc<dyn NotificationSink>,
    tracker: Mutex<TransitionTracker>,
    /// Held for the whole fetch-and-publish of the job list.
    jobs_lock: AsyncMutex<()>,
    jobs_tx: watch::Sender<Vec<TrainingJob>>,
}

impl Watcher {
    pub fn new(
        client: Arc<ApiClient>,
        notifier: Arc<Notifier>,
        metrics: Arc<MetricsCollector>,
        sink: Arc<dyn NotificationSink>,
    ) -> (Arc<Self>, watch::Receiver<Vec<TrainingJob>>) {
        let (jobs_tx, jobs_rx) = watch::channel(Vec::new());
        let watcher = Self {
            client,
            notifier,
            metrics,
            sink,
            tracker: Mutex::new(TransitionTracker::default()),
            jobs_lock: AsyncMutex::new(()),
            jobs_tx,
        };
        (Arc::new(watcher), jobs_rx)
    }

    /// Pending applications and the training job list.
    pub async fn overview_tick(&self) {
        let pending = self.timed("pending_applications", self.refresh_pending()).await;
        self.report("pending_applications", pending);
        let jobs = self.refresh_jobs().await;
        self.report("training_jobs", jobs);
    }

    pub async fn health_tick(&self) {
        let health = self.timed("health", self.refresh_health()).await;
        self.report("health", health);
    }

    async fn timed<F>(&self, resource: &str, refresh: F) -> Result<(), ApiError>
    where
        F: std::future::Future<Output = Result<(), ApiError>>,
    {
        let started = Instant::now();
        self.metrics.record_poll(resource);
        let result = refresh.await;
        self.metrics.record_refresh_duration(resource, started.elapsed().as_millis() as u64);
        if result.is_err() {
            self.metrics.record_refresh_failure(resource);
        }
        result
    }

    fn report(&self, resource: &str, result: Result<(), ApiError>) {
        if let Err(e) = result {
            self.sink.notify(&e.notice(&format!("Refreshing {}", resource.replace('_', " "))));
        }
    }

    async fn refresh_pending(&self) -> Result<(), ApiError> {
        let pending = self.client.pending_engineers().await?;
        let count = pending
            .iter()
            .filter(|a| a.status == common::ApplicationStatus::Pending)
            .count();
        self.metrics.set_pending_applications(count as u64);
        let event = self.tracker().pending(count);
        if let Some(event) = event {
            self.dispatch(event).await;
        }
        Ok(())
    }

    async fn refresh_health(&self) -> Result<(), ApiError> {
        let snapshot = self.client.health().await?;
        self.metrics.set_healthy(snapshot.is_healthy());
        let event = self.tracker().health(&snapshot);
        if let Some(event) = event {
            self.dispatch(event).await;
        }
        Ok(())
    }

    /// Fetch and publish the job list unless another fetch is already running.
    ///
    /// The overview loop and the job poller both land here; at most one
    /// request is in flight, and lists are published in the order fetched.
    async fn refresh_jobs(&self) -> Result<(), ApiError> {
        let Ok(_guard) = self.jobs_lock.try_lock() else {
            log::debug!("Training job refresh already running, skipping");
            return Ok(());
        };
        self.timed("training_jobs", async {
            let jobs = self.client.training_jobs().await?;
            self.publish_jobs(jobs).await;
            Ok::<(), ApiError>(())
        })
        .await
    }

    /// Record a fresh job list, emit its transitions and hand it to subscribers.
    pub async fn publish_jobs(&self, jobs: Vec<TrainingJob>) {
        let active = jobs.iter().filter(|j| !j.status.is_terminal()).count();
        self.metrics.set_active_jobs(active as u64);

        let events = self.tracker().jobs(&jobs);
        for event in events {
            self.dispatch(event).await;
        }

        log::debug!("{} training jobs, active: {}", jobs.len(), any_active(&jobs));
        self.jobs_tx.send_replace(jobs);
    }

    async fn dispatch(&self, event: WatchEvent) {
        log::info!(
            target: crate::EVENTS_TARGET,
            "[{}] {}: {}",
            event.kind(),
            event.title(),
            event.message()
        );
        self.metrics.record_event(event.kind());
        self.notifier.notify(&event).await;
    }

    fn tracker(&self) -> std::sync::MutexGuard<'_, TransitionTracker> {
        self.tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Refresh for Watcher {
    async fn refresh(&self) -> Result<(), ApiError> {
        self.refresh_jobs().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::notice::CollectingSink;
    use common::session::StaticSession;
    use common::ApiConfig;
    use mockito::Server;
    use std::collections::BTreeMap;

    fn job(id: &str, status: JobStatus) -> TrainingJob {
        TrainingJob { status, ..TrainingJob::queued(id, "Pumps v1") }
    }

    fn health(status: &str) -> HealthSnapshot {
        HealthSnapshot { status: status.to_string(), services: BTreeMap::new() }
    }

    #[test]
    fn test_first_job_list_is_baseline() {
        let mut tracker = TransitionTracker::default();
        let baseline = [job("a", JobStatus::Completed), job("b", JobStatus::Running)];
        assert!(tracker.jobs(&baseline).is_empty());

        let events = tracker.jobs(&[job("a", JobStatus::Completed), job("b", JobStatus::Failed)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "job_failed");
        assert_eq!(events[0].job_id(), Some("b"));

        // Already reported
        assert!(tracker.jobs(&[job("b", JobStatus::Failed)]).is_empty());
    }

    #[test]
    fn test_job_finished_between_refreshes() {
        let mut tracker = TransitionTracker::default();
        tracker.jobs(&[]);
        let events = tracker.jobs(&[job("c", JobStatus::Completed)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "job_completed");
        assert_eq!(events[0].severity(), Severity::Success);
    }

    #[test]
    fn test_pending_only_reports_increase() {
        let mut tracker = TransitionTracker::default();
        assert_eq!(tracker.pending(2), None);
        assert_eq!(tracker.pending(1), None);
        assert_eq!(
            tracker.pending(3),
            Some(WatchEvent::PendingIncreased { previous: 1, current: 3 })
        );
        assert_eq!(tracker.pending(3), None);
    }

    #[test]
    fn test_health_transitions() {
        let mut tracker = TransitionTracker::default();
        assert_eq!(tracker.health(&health("healthy")), None);
        let degraded = tracker.health(&health("degraded")).unwrap();
        assert_eq!(degraded.kind(), "health_degraded");
        assert_eq!(degraded.message(), "Overall status is degraded");
        assert_eq!(tracker.health(&health("degraded")), None);
        assert_eq!(tracker.health(&health("ok")), Some(WatchEvent::HealthRecovered));
    }

    #[test]
    fn test_failed_job_message_includes_error() {
        let mut failed = job("j9", JobStatus::Failed);
        failed.error = Some("No text extracted".into());
        let event = WatchEvent::JobFinished(failed);
        assert_eq!(event.title(), "Training Pumps v1 failed");
        assert_eq!(event.message(), "Job j9 failed: No text extracted");
    }

    type Harness = (
        Arc<Watcher>,
        watch::Receiver<Vec<TrainingJob>>,
        Arc<MetricsCollector>,
        Arc<CollectingSink>,
    );

    fn watcher_for(server: &Server) -> Harness {
        let config = ApiConfig {
            base_url: format!("{}/api/v1", server.url()),
            ..ApiConfig::default()
        };
        let session = Arc::new(StaticSession::new(Some("t".into())));
        let client = Arc::new(ApiClient::new(&config, session).unwrap());
        let metrics = Arc::new(MetricsCollector::new());
        let sink = Arc::new(CollectingSink::default());
        let notifier = Arc::new(Notifier::new(Vec::new()));
        let (watcher, rx) = Watcher::new(client, notifier, metrics.clone(), sink.clone());
        (watcher, rx, metrics, sink)
    }

    const RUNNING_JOB: &str = r#"{"jobs": [{"id": "j1", "status": "running", "progress": 10,
        "created_at": "2024-05-01T10:00:00Z"}]}"#;

    #[tokio::test]
    async fn test_overview_tick_publishes_jobs_and_reports_failures() {
        let mut server = Server::new_async().await;
        let _pending = server
            .mock("GET", "/api/v1/admin/engineers/pending")
            .with_status(503)
            .with_body(r#"{"detail": "maintenance"}"#)
            .create_async()
            .await;
        let _jobs = server
            .mock("GET", "/api/v1/ai/training-jobs")
            .with_status(200)
            .with_body(RUNNING_JOB)
            .create_async()
            .await;

        let (watcher, rx, metrics, sink) = watcher_for(&server);
        watcher.overview_tick().await;

        assert_eq!(rx.borrow().len(), 1);
        assert!(any_active(rx.borrow().as_slice()));
        assert_eq!(metrics.refresh_failures("pending_applications"), 1);
        assert_eq!(metrics.refresh_failures("training_jobs"), 0);
        assert_eq!(metrics.active_jobs(), 1);

        let notices = sink.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with("Refreshing pending applications"));
    }

    #[tokio::test]
    async fn test_publish_jobs_counts_transitions() {
        let server = Server::new_async().await;
        let (watcher, rx, metrics, _sink) = watcher_for(&server);

        watcher.publish_jobs(vec![job("j1", JobStatus::Running)]).await;
        watcher.publish_jobs(vec![job("j1", JobStatus::Completed)]).await;

        assert!(!any_active(rx.borrow().as_slice()));
        assert_eq!(metrics.events("job_completed"), 1);
        assert_eq!(metrics.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_job_refreshes_share_one_request() {
        let mut server = Server::new_async().await;
        let jobs = server
            .mock("GET", "/api/v1/ai/training-jobs")
            .with_status(200)
            .with_body(RUNNING_JOB)
            .expect(1)
            .create_async()
            .await;

        let (watcher, rx, metrics, _sink) = watcher_for(&server);
        let (first, second) = tokio::join!(watcher.refresh(), watcher.refresh());
        assert!(first.is_ok());
        assert!(second.is_ok());

        jobs.assert_async().await;
        assert_eq!(metrics.polls("training_jobs"), 1);
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_overview_tick_skips_jobs_while_refresh_runs() {
        let mut server = Server::new_async().await;
        let _pending = server
            .mock("GET", "/api/v1/admin/engineers/pending")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let jobs = server
            .mock("GET", "/api/v1/ai/training-jobs")
            .with_status(200)
            .with_body(RUNNING_JOB)
            .expect(1)
            .create_async()
            .await;

        let (watcher, rx, _metrics, sink) = watcher_for(&server);
        {
            let _busy = watcher.jobs_lock.try_lock().unwrap();
            watcher.overview_tick().await;
            assert!(rx.borrow().is_empty());
        }
        watcher.overview_tick().await;

        jobs.assert_async().await;
        assert_eq!(rx.borrow().len(), 1);
        assert!(sink.notices().is_empty());
    }
}
