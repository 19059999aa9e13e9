use log::{debug, info, warn};

/// Component-scoped logger so playback and sampling lines can be filtered
/// with `RUST_LOG=dronetrace=debug`.
#[derive(Debug, Clone)]
pub struct LogManager {
    component: &'static str,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.component, message);
    }

    pub fn detail(&self, message: &str) {
        debug!("[{}] {}", self.component, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.component, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("dronetrace")
    }
}
