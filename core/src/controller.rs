use crate::playback::{DronePlayback, PlaybackEngine, TickOutcome};
use crate::prelude::{CoreResult, PlaybackConfig};
use crate::route::FleetRoutePlan;
use crate::scheduler::{TickHandle, TickScheduler};
use crate::telemetry::{LogManager, MetricsRecorder};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
    Finished,
}

/// Rendering surface fed by the controller. It only ever receives borrowed
/// state and cannot write back.
pub trait PlaybackSink {
    fn drones_updated(&mut self, drones: &[DronePlayback]);

    fn fleet_completed(&mut self) {}
}

/// State machine driven by the start/pause/reset/speed affordances.
#[derive(Debug)]
pub struct PlaybackController<S: TickScheduler> {
    scheduler: S,
    config: PlaybackConfig,
    speed: f64,
    engine: Option<PlaybackEngine>,
    status: PlaybackStatus,
    pending: Option<TickHandle>,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
}

impl<S: TickScheduler> PlaybackController<S> {
    pub fn new(scheduler: S, config: PlaybackConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self::assemble(scheduler, config))
    }

    /// Expects `config` to have passed validation.
    fn assemble(scheduler: S, config: PlaybackConfig) -> Self {
        Self {
            scheduler,
            speed: config.clamp_speed(config.initial_speed),
            config,
            engine: None,
            status: PlaybackStatus::Idle,
            pending: None,
            logger: LogManager::new("controller"),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn has_plan(&self) -> bool {
        self.engine.is_some()
    }

    pub fn plan(&self) -> Option<&Arc<FleetRoutePlan>> {
        self.engine.as_ref().map(PlaybackEngine::plan)
    }

    pub fn drones(&self) -> &[DronePlayback] {
        self.engine.as_ref().map(PlaybackEngine::drones).unwrap_or(&[])
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Replaces the current plan. Any in-flight playback is discarded and the
    /// controller returns to `Idle` with freshly seeded drones. An invalid plan
    /// leaves the previous state untouched.
    pub fn load_plan(&mut self, plan: Arc<FleetRoutePlan>) -> CoreResult<()> {
        let engine =
            PlaybackEngine::with_metrics(plan, self.config.clone(), self.metrics.clone());
        let mut engine = match engine {
            Ok(engine) => engine,
            Err(err) => {
                self.logger.warn(&format!("plan rejected: {}", err));
                return Err(err);
            }
        };
        engine.set_speed(self.speed);
        self.cancel_pending();
        self.engine = Some(engine);
        self.status = PlaybackStatus::Idle;
        self.logger.record(&format!(
            "loaded plan with {} drones",
            self.drones().len()
        ));
        Ok(())
    }

    pub fn clear_plan(&mut self) {
        self.cancel_pending();
        self.engine = None;
        self.status = PlaybackStatus::Idle;
    }

    /// Loads `plan` and plays it, unless that very plan is already playing.
    pub fn start_plan(&mut self, plan: Arc<FleetRoutePlan>) -> CoreResult<()> {
        let same_plan = self
            .plan()
            .map(|current| Arc::ptr_eq(current, &plan))
            .unwrap_or(false);
        if same_plan && self.status == PlaybackStatus::Playing {
            return Ok(());
        }
        if !same_plan {
            self.load_plan(plan)?;
        }
        self.start();
        Ok(())
    }

    /// Begins or resumes playback. Without a plan this does nothing; after
    /// completion it replays from takeoff.
    pub fn start(&mut self) {
        match self.status {
            PlaybackStatus::Playing => {}
            PlaybackStatus::Paused => self.resume(),
            PlaybackStatus::Finished => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.reseed();
                }
                self.play();
            }
            PlaybackStatus::Idle => self.play(),
        }
    }

    pub fn pause(&mut self) {
        if self.status == PlaybackStatus::Playing {
            self.cancel_pending();
            self.status = PlaybackStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == PlaybackStatus::Paused {
            self.play();
        }
    }

    /// Returns to `Idle` with every drone back at takeoff. Does not start.
    pub fn reset(&mut self) {
        self.cancel_pending();
        if let Some(engine) = self.engine.as_mut() {
            engine.reseed();
        }
        self.status = PlaybackStatus::Idle;
    }

    pub fn set_speed(&mut self, speed: f64) -> f64 {
        self.speed = self.config.clamp_speed(speed);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_speed(self.speed);
        }
        self.speed
    }

    /// Handles a scheduling opportunity delivered by the host. Handles other
    /// than the one most recently requested are ignored. Returns whether drone
    /// state changed.
    pub fn on_frame<K: PlaybackSink + ?Sized>(
        &mut self,
        handle: TickHandle,
        now: Duration,
        sink: &mut K,
    ) -> bool {
        if self.pending != Some(handle) {
            self.logger
                .detail(&format!("ignoring stale tick {}", handle.id()));
            return false;
        }
        self.pending = None;
        if self.status != PlaybackStatus::Playing {
            return false;
        }
        let Some(engine) = self.engine.as_mut() else {
            self.status = PlaybackStatus::Idle;
            return false;
        };

        match engine.tick(now) {
            TickOutcome::Skipped => {
                self.request();
                false
            }
            TickOutcome::Advanced => {
                sink.drones_updated(engine.drones());
                self.request();
                true
            }
            TickOutcome::FleetCompleted => {
                sink.drones_updated(engine.drones());
                sink.fleet_completed();
                self.status = PlaybackStatus::Finished;
                self.logger.record("playback finished");
                true
            }
            TickOutcome::Idle => {
                self.status = PlaybackStatus::Finished;
                false
            }
        }
    }

    fn play(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            self.logger.detail("start ignored, no plan loaded");
            return;
        };
        engine.rebase();
        self.status = PlaybackStatus::Playing;
        self.request();
    }

    fn request(&mut self) {
        self.pending = Some(self.scheduler.request_tick());
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel_tick(handle);
        }
    }
}

impl<S: TickScheduler + Default> Default for PlaybackController<S> {
    fn default() -> Self {
        Self::assemble(S::default(), PlaybackConfig::default())
    }
}
