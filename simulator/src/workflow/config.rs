use crate::generator::GeneratorConfig;
use anyhow::Context;
use dronetrace::{PlaybackConfig, SamplerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub generator: GeneratorConfig,
    pub playback: PlaybackConfig,
    pub sampler: SamplerConfig,
    /// Playback multiplier used by headless replays.
    pub speed: f64,
    /// Virtual frame cadence for headless replays.
    pub frame_ms: u64,
    /// Gap between streamed exploration events.
    pub event_interval_us: u64,
    /// Events per streamed batch in serve mode.
    pub stream_batch: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            playback: PlaybackConfig::default(),
            sampler: SamplerConfig::default(),
            speed: 1.0,
            frame_ms: 16,
            event_interval_us: 500,
            stream_batch: 50,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(drones: usize, deliveries: usize, seed: u64, speed: f64) -> Self {
        Self {
            generator: GeneratorConfig {
                drones,
                deliveries_per_drone: deliveries,
                seed,
                ..Default::default()
            },
            speed,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.playback.validate()?;
        self.sampler.validate()?;
        anyhow::ensure!(self.frame_ms > 0, "frame_ms must be positive");
        anyhow::ensure!(self.stream_batch > 0, "stream_batch must be positive");
        Ok(())
    }
}
