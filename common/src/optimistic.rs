//! Local list updates applied before the server confirms them.
//!
//! The locally mutated list is presentation only and is never sent back to
//! the server. Every mutation schedules an authoritative re-fetch after a
//! short delay; if that re-fetch fails the optimistic state stays visible
//! until the next refresh. There is no rollback.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::admin::{AdminAccount, Application, ApplicationStatus};
use crate::error::ApiError;
use crate::job::{JobStatus, TrainingJob, UploadedFile};
use crate::notice::NotificationSink;

pub trait ListRecord: Clone + Send + Sync + 'static {
    type Status: Clone + Send + Sync + 'static;

    fn record_id(&self) -> &str;

    fn set_status(&mut self, status: Self::Status);

    /// Whether the record contributes to the derived count reported to listeners.
    fn counts(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<S> {
    Remove,
    UpdateStatus(S),
}

/// The list as it should look once the server applies `mutation` to `id`.
pub fn apply_optimistic_list_update<T: ListRecord>(
    items: &[T],
    id: &str,
    mutation: &Mutation<T::Status>,
) -> Vec<T> {
    match mutation {
        Mutation::Remove => items.iter().filter(|i| i.record_id() != id).cloned().collect(),
        Mutation::UpdateStatus(status) => items
            .iter()
            .cloned()
            .map(|mut item| {
                if item.record_id() == id {
                    item.set_status(status.clone());
                }
                item
            })
            .collect(),
    }
}

fn derived_count<T: ListRecord>(items: &[T]) -> usize {
    items.iter().filter(|i| i.counts()).count()
}

/// Source of truth for a list.
#[async_trait]
pub trait ListLoader<T>: Send + Sync {
    async fn load(&self) -> Result<Vec<T>, ApiError>;
}

type CountListener = Arc<dyn Fn(usize) + Send + Sync>;

/// Outcome of [`OptimisticList::submit`].
pub struct Submission {
    pub result: Result<(), ApiError>,
    /// Resolves once the delayed re-fetch has landed (or failed).
    pub reconcile: JoinHandle<()>,
}

pub struct OptimisticList<T> {
    items: Arc<Mutex<Vec<T>>>,
    refresh_delay: Duration,
    sink: Arc<dyn NotificationSink>,
    on_count: Option<CountListener>,
}

fn lock<T>(items: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
    items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: ListRecord> OptimisticList<T> {
    pub fn new(items: Vec<T>, refresh_delay: Duration, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            refresh_delay,
            sink,
            on_count: None,
        }
    }

    /// Register the parent interested in the derived count (e.g. a pending badge).
    pub fn on_count(mut self, listener: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_count = Some(Arc::new(listener));
        self
    }

    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    pub fn count(&self) -> usize {
        derived_count(&lock(&self.items))
    }

    pub fn replace(&self, fresh: Vec<T>) {
        let count = {
            let mut items = lock(&self.items);
            *items = fresh;
            derived_count(&items)
        };
        if let Some(listener) = &self.on_count {
            listener(count);
        }
    }

    /// Apply `mutation` locally and schedule the authoritative re-fetch.
    pub fn apply<L>(
        &self,
        id: &str,
        mutation: Mutation<T::Status>,
        loader: Arc<L>,
    ) -> JoinHandle<()>
    where
        L: ListLoader<T> + 'static,
    {
        self.apply_local(id, &mutation);
        self.schedule_refresh(loader)
    }

    /// Apply `mutation` locally, then run the server action it mirrors.
    ///
    /// The local change is visible while `action` is still pending. The
    /// re-fetch is scheduled whatever the action's outcome; a failure is
    /// also reported to the sink.
    pub async fn submit<F, L>(
        &self,
        id: &str,
        mutation: Mutation<T::Status>,
        action: F,
        loader: Arc<L>,
    ) -> Submission
    where
        F: Future<Output = Result<(), ApiError>>,
        L: ListLoader<T> + 'static,
    {
        self.apply_local(id, &mutation);
        let result = action.await;
        if let Err(e) = &result {
            self.sink.notify(&e.notice(&format!("Updating {}", id)));
        }
        Submission { result, reconcile: self.schedule_refresh(loader) }
    }

    /// Like [`submit`](Self::submit) for one server action covering several records.
    ///
    /// `mutation` is applied to every id before `action` runs, and a single
    /// re-fetch follows.
    pub async fn submit_batch<F, L>(
        &self,
        ids: &[String],
        mutation: Mutation<T::Status>,
        action: F,
        loader: Arc<L>,
    ) -> Submission
    where
        F: Future<Output = Result<(), ApiError>>,
        L: ListLoader<T> + 'static,
    {
        for id in ids {
            self.apply_local(id, &mutation);
        }
        let result = action.await;
        if let Err(e) = &result {
            self.sink.notify(&e.notice(&format!("Updating {} records", ids.len())));
        }
        Submission { result, reconcile: self.schedule_refresh(loader) }
    }

    fn apply_local(&self, id: &str, mutation: &Mutation<T::Status>) {
        let count = {
            let mut items = lock(&self.items);
            let updated = apply_optimistic_list_update(&items, id, mutation);
            *items = updated;
            derived_count(&items)
        };
        log::debug!("Optimistic update on {}; derived count now {}", id, count);
        if let Some(listener) = &self.on_count {
            listener(count);
        }
    }

    fn schedule_refresh<L>(&self, loader: Arc<L>) -> JoinHandle<()>
    where
        L: ListLoader<T> + 'static,
    {
        let items = self.items.clone();
        let delay = self.refresh_delay;
        let sink = self.sink.clone();
        let on_count = self.on_count.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match loader.load().await {
                Ok(fresh) => {
                    let count = {
                        let mut guard = lock(&items);
                        *guard = fresh;
                        derived_count(&guard)
                    };
                    if let Some(listener) = on_count {
                        listener(count);
                    }
                }
                Err(e) => {
                    log::warn!("Re-fetch after optimistic update failed: {}", e);
                    sink.notify(&e.notice("Refreshing list"));
                }
            }
        })
    }
}

impl ListRecord for Application {
    type Status = ApplicationStatus;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn set_status(&mut self, status: ApplicationStatus) {
        self.status = status;
    }

    fn counts(&self) -> bool {
        self.status == ApplicationStatus::Pending
    }
}

impl ListRecord for TrainingJob {
    type Status = JobStatus;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }
}

impl ListRecord for UploadedFile {
    type Status = ();

    fn record_id(&self) -> &str {
        &self.id
    }

    fn set_status(&mut self, _status: ()) {}
}

impl ListRecord for AdminAccount {
    /// Whether the account is active.
    type Status = bool;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn set_status(&mut self, active: bool) {
        self.is_active = active;
    }

    fn counts(&self) -> bool {
        self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::UserSummary;
    use crate::notice::CollectingSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn app(id: &str) -> Application {
        Application {
            id: id.to_string(),
            status: ApplicationStatus::Pending,
            user: UserSummary {
                id: format!("u{}", id),
                email: format!("{}@example.com", id),
                full_name: String::new(),
                role: Some("engineer".into()),
                is_active: Some(false),
            },
            submitted_at: None,
        }
    }

    struct FixedLoader {
        items: Mutex<Result<Vec<Application>, u16>>,
        calls: AtomicUsize,
    }

    impl FixedLoader {
        fn ok(items: Vec<Application>) -> Arc<Self> {
            Arc::new(Self { items: Mutex::new(Ok(items)), calls: AtomicUsize::new(0) })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self { items: Mutex::new(Err(status)), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl ListLoader<Application> for FixedLoader {
        async fn load(&self) -> Result<Vec<Application>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.items.lock().unwrap() {
                Ok(items) => Ok(items.clone()),
                Err(status) => Err(ApiError::from_status(*status, "")),
            }
        }
    }

    #[test]
    fn test_remove_and_update() {
        let items = vec![app("1"), app("2"), app("3")];

        let removed = apply_optimistic_list_update(&items, "2", &Mutation::Remove);
        assert_eq!(removed.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["1", "3"]);

        let updated = apply_optimistic_list_update(
            &items,
            "3",
            &Mutation::UpdateStatus(ApplicationStatus::Approved),
        );
        assert_eq!(updated.len(), 3);
        assert_eq!(updated[2].status, ApplicationStatus::Approved);
        assert_eq!(derived_count(&updated), 2);

        let untouched = apply_optimistic_list_update(&items, "missing", &Mutation::Remove);
        assert_eq!(untouched, items);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_before_action_resolves() {
        let sink = Arc::new(CollectingSink::default());
        let reported = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = reported.clone();
        let list = Arc::new(
            OptimisticList::new(vec![app("1"), app("2")], Duration::from_millis(500), sink.clone())
                .on_count(move |n| seen.store(n, Ordering::SeqCst)),
        );
        let loader = FixedLoader::ok(vec![app("1")]);

        let (respond, response) = oneshot::channel::<Result<(), ApiError>>();
        let task_list = list.clone();
        let task_loader = loader.clone();
        let task = tokio::spawn(async move {
            task_list
                .submit(
                    "2",
                    Mutation::Remove,
                    async move { response.await.unwrap_or(Ok(())) },
                    task_loader,
                )
                .await
        });

        tokio::task::yield_now().await;
        // Network call still pending, list already updated
        assert_eq!(list.snapshot().len(), 1);
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);

        respond.send(Ok(())).unwrap();
        let submission = task.await.unwrap();
        assert!(submission.result.is_ok());
        submission.reconcile.await.unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(list.snapshot(), vec![app("1")]);
        assert!(sink.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_waits_for_delay() {
        let sink = Arc::new(CollectingSink::default());
        let list = OptimisticList::new(vec![app("1")], Duration::from_millis(500), sink);
        let loader = FixedLoader::ok(vec![]);

        let rejected = Mutation::UpdateStatus(ApplicationStatus::Rejected);
        let handle = list.apply("1", rejected, loader.clone());
        assert_eq!(list.count(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);

        handle.await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(list.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_optimistic_state() {
        let sink = Arc::new(CollectingSink::default());
        let items = vec![app("1"), app("2")];
        let list = OptimisticList::new(items, Duration::from_millis(500), sink.clone());

        let handle = list.apply("1", Mutation::Remove, FixedLoader::failing(502));
        handle.await.unwrap();

        assert_eq!(list.snapshot(), vec![app("2")]);
        let notices = sink.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with("Refreshing list"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_action_reported_and_reconciled() {
        let sink = Arc::new(CollectingSink::default());
        let items = vec![app("1"), app("2")];
        let list = OptimisticList::new(items.clone(), Duration::from_millis(500), sink.clone());
        let loader = FixedLoader::ok(items);

        let submission = list
            .submit(
                "2",
                Mutation::Remove,
                async { Err(ApiError::from_status(401, "")) },
                loader,
            )
            .await;
        assert!(submission.result.is_err());
        assert_eq!(list.snapshot().len(), 1);
        assert_eq!(
            sink.notices()[0].category,
            Some(crate::error::ErrorCategory::Authentication)
        );

        submission.reconcile.await.unwrap();
        assert_eq!(list.snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_removal_then_single_refetch() {
        let sink = Arc::new(CollectingSink::default());
        let items = vec![app("1"), app("2"), app("3")];
        let list = OptimisticList::new(items, Duration::from_millis(500), sink.clone());
        let loader = FixedLoader::ok(vec![app("3")]);

        let ids = vec!["1".to_string(), "2".to_string()];
        let submission = list
            .submit_batch(
                &ids,
                Mutation::Remove,
                async { Err(ApiError::from_status(500, "")) },
                loader.clone(),
            )
            .await;
        assert!(submission.result.is_err());
        assert_eq!(list.snapshot(), vec![app("3")]);
        assert!(sink.notices()[0].message.starts_with("Updating 2 records"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);

        submission.reconcile.await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(list.snapshot(), vec![app("3")]);
    }
}
