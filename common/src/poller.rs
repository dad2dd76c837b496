//! Interval polling for server-side work that is still in progress.
//!
//! A [`JobPoller`] owns at most one timer. Callers feed it the latest job
//! list (or their own predicate) after every refresh; the timer is armed
//! while something is active and cleared once everything is terminal.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::ApiError;
use crate::job::{any_active, JobLike};
use crate::notice::NotificationSink;

/// Re-fetches some server state. Implementations publish the result themselves.
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self) -> Result<(), ApiError>;
}

struct Timer {
    handle: JoinHandle<()>,
    // Dropping the sender stops the loop after the current refresh.
    _stop: oneshot::Sender<()>,
}

/// Clears the in-flight flag even when the refresh future is dropped mid-way.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag.clone()))
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Counts live timer loops.
struct LiveTimer(Arc<AtomicUsize>);

impl LiveTimer {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count.clone())
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct JobPoller {
    label: String,
    interval: Duration,
    refresh: Arc<dyn Refresh>,
    sink: Arc<dyn NotificationSink>,
    in_flight: Arc<AtomicBool>,
    live_timers: Arc<AtomicUsize>,
    timer: Option<Timer>,
}

impl JobPoller {
    pub fn new(
        label: impl Into<String>,
        interval: Duration,
        refresh: Arc<dyn Refresh>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            label: label.into(),
            interval,
            refresh,
            sink,
            in_flight: Arc::new(AtomicBool::new(false)),
            live_timers: Arc::new(AtomicUsize::new(0)),
            timer: None,
        }
    }

    /// Re-evaluate against the latest job list. Returns whether polling is armed.
    pub fn observe<J: JobLike>(&mut self, jobs: &[J]) -> bool {
        self.set_active(any_active(jobs))
    }

    pub fn set_active(&mut self, active: bool) -> bool {
        match (active, self.timer.is_some()) {
            (true, false) => self.start(),
            (false, true) => self.stop(),
            _ => {}
        }
        self.is_polling()
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_some()
    }

    /// Timer loops that have not exited yet.
    pub fn live_timers(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn start(&mut self) {
        log::debug!("{}: polling every {:?}", self.label, self.interval);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let label = self.label.clone();
        let refresh = self.refresh.clone();
        let sink = self.sink.clone();
        let in_flight = self.in_flight.clone();
        let live = LiveTimer::enter(&self.live_timers);

        let handle = tokio::spawn(async move {
            let _live = live;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                let Some(_guard) = InFlight::acquire(&in_flight) else {
                    log::debug!("{}: previous refresh still running, skipping tick", label);
                    continue;
                };

                if let Err(e) = refresh.refresh().await {
                    log::warn!("{}: refresh failed: {}", label, e);
                    sink.notify(&e.notice(&format!("Refreshing {}", label)));
                }
            }
            log::debug!("{}: polling stopped", label);
        });

        self.timer = Some(Timer { handle, _stop: stop_tx });
    }

    fn stop(&mut self) {
        // Dropping the timer drops the stop sender; an in-flight refresh is allowed to finish.
        self.timer = None;
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

/// Fetch until nothing is active, reporting failures and keeping the cadence.
///
/// `on_update` sees every successful fetch, including the final one, which is returned.
pub async fn poll_until_terminal<J, F, Fut, U>(
    interval: Duration,
    sink: &dyn NotificationSink,
    mut fetch: F,
    mut on_update: U,
) -> Vec<J>
where
    J: JobLike,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<J>, ApiError>>,
    U: FnMut(&[J]),
{
    loop {
        match fetch().await {
            Ok(jobs) => {
                on_update(&jobs);
                if !any_active(&jobs) {
                    return jobs;
                }
            }
            Err(e) => sink.notify(&e.notice("Refreshing jobs")),
        }
        time::sleep(interval).await;
    }
}
