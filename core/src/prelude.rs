use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback pacing and trail settings shared by the engine and controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub trail_cap: usize,
    pub min_interval_ms: u64,
    pub base_interval_ms: u64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub speed_step: f64,
    pub initial_speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            trail_cap: 500,
            min_interval_ms: 50,
            base_interval_ms: 120,
            min_speed: 0.5,
            max_speed: 5.0,
            speed_step: 0.5,
            initial_speed: 1.0,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.trail_cap == 0 {
            return Err(CoreError::InvalidConfig("trail_cap must be at least 1".into()));
        }
        if !(self.min_speed > 0.0 && self.min_speed <= self.max_speed) {
            return Err(CoreError::InvalidConfig(format!(
                "speed range {}..={} is empty or non-positive",
                self.min_speed, self.max_speed
            )));
        }
        if !self.max_speed.is_finite() {
            return Err(CoreError::InvalidConfig("max_speed must be finite".into()));
        }
        Ok(())
    }

    /// Clamps a requested multiplier into the configured range. NaN falls back
    /// to the slowest speed.
    pub fn clamp_speed(&self, speed: f64) -> f64 {
        if speed.is_nan() {
            return self.min_speed;
        }
        speed.clamp(self.min_speed, self.max_speed)
    }

    /// Wall-clock gap required between two applied ticks at `speed`.
    pub fn tick_interval(&self, speed: f64) -> Duration {
        let scaled = self.base_interval_ms as f64 / speed;
        Duration::from_secs_f64(scaled.max(self.min_interval_ms as f64) / 1000.0)
    }

    /// Waypoints advanced per applied tick at `speed`.
    pub fn step_len(&self, speed: f64) -> usize {
        (speed.floor() as usize).max(1)
    }
}

/// Debounce and down-sampling settings for the exploration sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub debounce_ms: u64,
    pub min_change: usize,
    pub window: usize,
    pub stride: usize,
    pub max_wait_ms: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            min_change: 20,
            window: 600,
            stride: 15,
            max_wait_ms: Some(1000),
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.stride == 0 {
            return Err(CoreError::InvalidConfig("stride must be at least 1".into()));
        }
        if self.window == 0 {
            return Err(CoreError::InvalidConfig("window must be at least 1".into()));
        }
        if let Some(max_wait) = self.max_wait_ms {
            if max_wait < self.debounce_ms {
                return Err(CoreError::InvalidConfig(format!(
                    "max_wait_ms {} is shorter than debounce_ms {}",
                    max_wait, self.debounce_ms
                )));
            }
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

/// Common error type for plan loading and configuration.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("malformed route plan: {0}")]
    MalformedPlan(#[from] serde_json::Error),
    #[error("invalid route plan: {0}")]
    InvalidPlan(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_shrinks_with_speed_down_to_floor() {
        let cfg = PlaybackConfig::default();
        assert_eq!(cfg.tick_interval(0.5), Duration::from_millis(240));
        assert_eq!(cfg.tick_interval(1.0), Duration::from_millis(120));
        assert_eq!(cfg.tick_interval(2.0), Duration::from_millis(60));
        assert_eq!(cfg.tick_interval(5.0), Duration::from_millis(50));
    }

    #[test]
    fn step_len_floors_speed_with_minimum_of_one() {
        let cfg = PlaybackConfig::default();
        assert_eq!(cfg.step_len(0.5), 1);
        assert_eq!(cfg.step_len(1.5), 1);
        assert_eq!(cfg.step_len(2.0), 2);
        assert_eq!(cfg.step_len(4.5), 4);
    }

    #[test]
    fn speed_is_clamped_not_rejected() {
        let cfg = PlaybackConfig::default();
        assert_eq!(cfg.clamp_speed(0.1), 0.5);
        assert_eq!(cfg.clamp_speed(9.0), 5.0);
        assert_eq!(cfg.clamp_speed(f64::NAN), 0.5);
        assert_eq!(cfg.clamp_speed(2.5), 2.5);
    }

    #[test]
    fn sampler_config_rejects_zero_stride() {
        let cfg = SamplerConfig {
            stride: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::InvalidConfig(_))));
        assert!(SamplerConfig::default().validate().is_ok());
    }

    #[test]
    fn configs_fill_missing_fields_from_defaults() {
        let cfg: SamplerConfig = serde_json::from_str(r#"{"stride": 10}"#).unwrap();
        assert_eq!(cfg.stride, 10);
        assert_eq!(cfg.window, 600);
        let cfg: PlaybackConfig = serde_json::from_str(r#"{"trail_cap": 64}"#).unwrap();
        assert_eq!(cfg.trail_cap, 64);
        assert_eq!(cfg.max_speed, 5.0);
    }
}
