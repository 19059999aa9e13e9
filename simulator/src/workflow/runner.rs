use crate::generator::{build_exploration, build_map_context, build_plan};
use crate::workflow::config::WorkflowConfig;
use anyhow::{bail, Context};
use dronetrace::telemetry::Metrics;
use dronetrace::{
    DronePlayback, ExplorationEvent, ExplorationLog, ExplorationSampler, FleetRoutePlan,
    FrameScheduler, MapContext, MarkerUpdate, PlaybackController, PlaybackSink, PlaybackStatus,
};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on virtual frames for a single replay.
const MAX_FRAMES: u64 = 5_000_000;

#[derive(Debug, Clone, Serialize)]
pub struct DroneSummary {
    pub drone_id: String,
    pub legs: usize,
    pub trail_len: usize,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    pub frames: u64,
    pub updates: usize,
    pub completions: usize,
    pub elapsed_ms: u128,
    pub drones: Vec<DroneSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub events: usize,
    pub refreshes: usize,
    pub final_markers: usize,
    pub cleared: bool,
}

pub struct WorkflowResult {
    pub plan: FleetRoutePlan,
    pub context: MapContext,
    pub events: Vec<ExplorationEvent>,
    pub sampling: SampleResult,
    pub replay: ReplayResult,
}

#[derive(Default)]
struct ReplayRecorder {
    updates: usize,
    completions: usize,
    last: Vec<DronePlayback>,
}

impl PlaybackSink for ReplayRecorder {
    fn drones_updated(&mut self, drones: &[DronePlayback]) {
        self.updates += 1;
        self.last.clear();
        self.last.extend_from_slice(drones);
    }

    fn fleet_completed(&mut self) {
        self.completions += 1;
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Generates a calculation, samples its event stream and replays its plan.
    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        let plan = build_plan(&self.config.generator).context("generating fleet plan")?;
        let events = build_exploration(&self.config.generator, &plan);
        let context = build_map_context(&self.config.generator);
        let sampling = self.sample(&events).context("sampling exploration stream")?;
        let replay = self.replay(Arc::new(plan.clone())).context("replaying fleet plan")?;
        Ok(WorkflowResult {
            plan,
            context,
            events,
            sampling,
            replay,
        })
    }

    /// Streams `events` through the sampler on a virtual clock.
    pub fn sample(&self, events: &[ExplorationEvent]) -> anyhow::Result<SampleResult> {
        let mut sampler = ExplorationSampler::new(self.config.sampler.clone())?;
        let mut log = ExplorationLog::new();
        let gap = Duration::from_micros(self.config.event_interval_us);
        let mut now = Duration::ZERO;
        let mut refreshes = 0;

        sampler.set_active(true);
        for event in events {
            log.push(event.clone());
            sampler.notify(now);
            if let Some(MarkerUpdate::Replace(_)) = sampler.poll(now, log.events()) {
                refreshes += 1;
            }
            now += gap;
        }
        now += self.config.sampler.debounce();
        if let Some(MarkerUpdate::Replace(_)) = sampler.poll(now, log.events()) {
            refreshes += 1;
        }
        let final_markers = sampler.markers().len();
        let cleared = matches!(sampler.set_active(false), Some(MarkerUpdate::Clear));
        debug!("sampler metrics {:?}", sampler.metrics().snapshot());

        Ok(SampleResult {
            events: log.len(),
            refreshes,
            final_markers,
            cleared,
        })
    }

    /// Plays `plan` to completion with frames every `frame_ms` of virtual time.
    pub fn replay(&self, plan: Arc<FleetRoutePlan>) -> anyhow::Result<ReplayResult> {
        let mut controller =
            PlaybackController::new(FrameScheduler::new(), self.config.playback.clone())?;
        controller.set_speed(self.config.speed);
        controller.start_plan(plan)?;

        let mut recorder = ReplayRecorder::default();
        let frame = Duration::from_millis(self.config.frame_ms);
        let mut now = Duration::ZERO;
        let mut frames = 0u64;
        while let Some(handle) = controller.scheduler_mut().take_due() {
            controller.on_frame(handle, now, &mut recorder);
            frames += 1;
            now += frame;
            if frames > MAX_FRAMES {
                bail!("replay did not finish within {} frames", MAX_FRAMES);
            }
        }
        if controller.status() != PlaybackStatus::Finished {
            bail!("replay stopped in state {:?}", controller.status());
        }

        let metrics: Metrics = controller.metrics().snapshot();
        info!(
            "replay finished: {} updates, {} skipped frames",
            metrics.ticks_applied, metrics.ticks_skipped
        );

        let plan = controller.plan().context("controller lost its plan")?;
        let drones = controller
            .drones()
            .iter()
            .zip(plan.drone_paths.iter())
            .map(|(state, route)| DroneSummary {
                drone_id: state.drone_id.clone(),
                legs: route.deliveries.len(),
                trail_len: state.trail.len(),
                completed: state.completed,
            })
            .collect();

        Ok(ReplayResult {
            frames,
            updates: recorder.updates,
            completions: recorder.completions,
            elapsed_ms: now.as_millis(),
            drones,
        })
    }
}
