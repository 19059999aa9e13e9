use std::sync::Mutex;

/// Counters for the two time-driven consumers.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub ticks_applied: u64,
    pub ticks_skipped: u64,
    pub samples_rendered: u64,
    pub samples_gated: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_tick(&self, applied: bool) {
        if let Ok(mut metrics) = self.inner.lock() {
            if applied {
                metrics.ticks_applied += 1;
            } else {
                metrics.ticks_skipped += 1;
            }
        }
    }

    pub fn record_sample(&self, rendered: bool) {
        if let Ok(mut metrics) = self.inner.lock() {
            if rendered {
                metrics.samples_rendered += 1;
            } else {
                metrics.samples_gated += 1;
            }
        }
    }

    pub fn snapshot(&self) -> Metrics {
        self.inner.lock().map(|metrics| *metrics).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MetricsRecorder").field(&self.snapshot()).finish()
    }
}
