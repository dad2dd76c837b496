use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const DURATION_WINDOW: usize = 100;

/// Watcher counters in Prometheus text format.
pub struct MetricsCollector {
    polls: DashMap<String, AtomicU64>,
    refresh_failures: DashMap<String, AtomicU64>,
    refresh_durations: DashMap<String, Vec<u64>>,
    events: DashMap<String, AtomicU64>,
    pending_applications: AtomicU64,
    active_jobs: AtomicU64,
    healthy: AtomicBool,
}

fn bump(map: &DashMap<String, AtomicU64>, key: &str) {
    map.entry(key.to_string())
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn read(map: &DashMap<String, AtomicU64>, key: &str) -> u64 {
    map.get(key).map(|v| v.load(Ordering::Relaxed)).unwrap_or(0)
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            polls: DashMap::new(),
            refresh_failures: DashMap::new(),
            refresh_durations: DashMap::new(),
            events: DashMap::new(),
            pending_applications: AtomicU64::new(0),
            active_jobs: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn record_poll(&self, resource: &str) {
        bump(&self.polls, resource);
    }

    pub fn record_refresh_failure(&self, resource: &str) {
        bump(&self.refresh_failures, resource);
    }

    pub fn record_refresh_duration(&self, resource: &str, duration_ms: u64) {
        let mut entry = self.refresh_durations.entry(resource.to_string()).or_default();
        entry.push(duration_ms);
        let len = entry.len();
        if len > DURATION_WINDOW {
            entry.drain(0..len - DURATION_WINDOW);
        }
    }

    pub fn record_event(&self, kind: &str) {
        bump(&self.events, kind);
    }

    pub fn set_pending_applications(&self, count: u64) {
        self.pending_applications.store(count, Ordering::Relaxed);
    }

    pub fn set_active_jobs(&self, count: u64) {
        self.active_jobs.store(count, Ordering::Relaxed);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn polls(&self, resource: &str) -> u64 {
        read(&self.polls, resource)
    }

    pub fn refresh_failures(&self, resource: &str) -> u64 {
        read(&self.refresh_failures, resource)
    }

    pub fn events(&self, kind: &str) -> u64 {
        read(&self.events, kind)
    }

    pub fn active_jobs(&self) -> u64 {
        self.active_jobs.load(Ordering::Relaxed)
    }

    pub fn export(&self) -> String {
        let mut output = String::new();

        gauge(
            &mut output,
            "assistdesk_pending_applications",
            "Engineer applications awaiting review",
            self.pending_applications.load(Ordering::Relaxed),
        );
        gauge(
            &mut output,
            "assistdesk_active_training_jobs",
            "Training jobs queued, initializing or running",
            self.active_jobs.load(Ordering::Relaxed),
        );
        gauge(
            &mut output,
            "assistdesk_ai_healthy",
            "1 when every AI service reports healthy",
            self.healthy.load(Ordering::Relaxed) as u64,
        );

        counter_family(
            &mut output,
            "assistdesk_polls_total",
            "Refresh attempts",
            "resource",
            &self.polls,
        );
        counter_family(
            &mut output,
            "assistdesk_refresh_failures_total",
            "Failed refreshes",
            "resource",
            &self.refresh_failures,
        );
        counter_family(
            &mut output,
            "assistdesk_events_total",
            "Transition events",
            "kind",
            &self.events,
        );

        output.push_str("# HELP assistdesk_refresh_duration_ms Refresh duration percentiles\n");
        output.push_str("# TYPE assistdesk_refresh_duration_ms gauge\n");
        let mut resources: Vec<(String, Vec<u64>)> = self
            .refresh_durations
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        resources.sort();
        for (resource, mut durations) in resources {
            if durations.is_empty() {
                continue;
            }
            durations.sort_unstable();
            for (quantile, p) in [("0.5", 50.0), ("0.95", 95.0), ("0.99", 99.0)] {
                output.push_str(&format!(
                    "assistdesk_refresh_duration_ms{{resource=\"{}\",quantile=\"{}\"}} {}\n",
                    resource,
                    quantile,
                    percentile(&durations, p)
                ));
            }
        }

        output
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        // Replaced by rename; scrapers may read at any time
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.export())?;
        std::fs::rename(&tmp, path)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn gauge(output: &mut String, name: &str, help: &str, value: u64) {
    output.push_str(&format!(
        "# HELP {} {}\n# TYPE {} gauge\n{} {}\n\n",
        name, help, name, name, value
    ));
}

fn counter_family(
    output: &mut String,
    name: &str,
    help: &str,
    label: &str,
    map: &DashMap<String, AtomicU64>,
) {
    output.push_str(&format!("# HELP {} {}\n# TYPE {} counter\n", name, help, name));
    let mut rows: Vec<(String, u64)> = map
        .iter()
        .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
        .collect();
    rows.sort();
    for (key, value) in rows {
        output.push_str(&format!("{}{{{}=\"{}\"}} {}\n", name, label, key, value));
    }
    output.push('\n');
}

fn percentile(sorted_data: &[u64], p: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }
    let index = ((p / 100.0) * (sorted_data.len() as f64 - 1.0)).round() as usize;
    sorted_data[index.min(sorted_data.len() - 1)]
}
