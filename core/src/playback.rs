use crate::prelude::{CoreResult, PlaybackConfig};
use crate::route::{DroneRoute, FleetRoutePlan, Waypoint};
use crate::telemetry::{LogManager, MetricsRecorder};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Engine-owned replay state of one drone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DronePlayback {
    pub drone_id: String,
    /// `None` only for a drone without a single waypoint.
    pub current_position: Option<Waypoint>,
    pub leg_index: usize,
    pub waypoint_index: usize,
    pub trail: VecDeque<Waypoint>,
    pub completed: bool,
}

impl DronePlayback {
    /// Initial state at the takeoff position.
    pub fn seed(route: &DroneRoute) -> Self {
        let mut state = match route.takeoff() {
            Some((leg_index, takeoff)) => Self {
                drone_id: route.drone_id.clone(),
                current_position: Some(takeoff),
                leg_index,
                waypoint_index: 0,
                trail: VecDeque::from([takeoff]),
                completed: false,
            },
            None => Self {
                drone_id: route.drone_id.clone(),
                current_position: None,
                leg_index: route.deliveries.len(),
                waypoint_index: 0,
                trail: VecDeque::new(),
                completed: true,
            },
        };
        state.settle(route);
        state
    }

    pub fn trail_vec(&self) -> Vec<Waypoint> {
        self.trail.iter().copied().collect()
    }

    fn visit(&mut self, waypoint: Waypoint, trail_cap: usize) {
        self.current_position = Some(waypoint);
        self.trail.push_back(waypoint);
        while self.trail.len() > trail_cap {
            self.trail.pop_front();
        }
    }

    /// Marks the drone complete once it stands on the last waypoint of its
    /// last non-empty leg.
    fn settle(&mut self, route: &DroneRoute) {
        if self.completed {
            return;
        }
        let Some(leg) = route.deliveries.get(self.leg_index) else {
            self.completed = true;
            return;
        };
        let at_leg_end = self.waypoint_index + 1 >= leg.flight_path.len();
        if at_leg_end && next_leg(route, self.leg_index).is_none() {
            self.completed = true;
        }
    }
}

/// Index of the next leg after `leg_index` that has at least one waypoint.
fn next_leg(route: &DroneRoute, leg_index: usize) -> Option<usize> {
    route
        .deliveries
        .iter()
        .enumerate()
        .skip(leg_index + 1)
        .find(|(_, leg)| !leg.flight_path.is_empty())
        .map(|(idx, _)| idx)
}

/// Applies one update of `step` waypoints to a single drone.
pub fn advance_drone(state: &mut DronePlayback, route: &DroneRoute, step: usize, trail_cap: usize) {
    if state.completed {
        return;
    }
    let path = route
        .deliveries
        .get(state.leg_index)
        .map(|leg| leg.flight_path.as_slice())
        .unwrap_or(&[]);
    let last_index = path.len().saturating_sub(1);

    if !path.is_empty() && state.waypoint_index < last_index {
        let target = (state.waypoint_index + step).min(last_index);
        state.waypoint_index = target;
        state.visit(path[target], trail_cap);
    } else {
        match next_leg(route, state.leg_index) {
            Some(leg_index) => {
                let first = route.deliveries[leg_index].flight_path[0];
                state.leg_index = leg_index;
                state.waypoint_index = 0;
                state.visit(first, trail_cap);
            }
            None => {
                state.completed = true;
                return;
            }
        }
    }
    state.settle(route);
}

/// Result of offering the engine a scheduling opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not enough wall-clock time elapsed since the last applied update.
    Skipped,
    Advanced,
    /// Every drone finished during this update. Reported once.
    FleetCompleted,
    /// Fleet completion was already reported; nothing left to do.
    Idle,
}

/// Replays a fleet route plan one time-gated update at a time.
#[derive(Debug)]
pub struct PlaybackEngine {
    plan: Arc<FleetRoutePlan>,
    config: PlaybackConfig,
    speed: f64,
    drones: Vec<DronePlayback>,
    last_applied: Option<Duration>,
    completion_reported: bool,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
}

impl PlaybackEngine {
    pub fn new(plan: Arc<FleetRoutePlan>, config: PlaybackConfig) -> CoreResult<Self> {
        Self::with_metrics(plan, config, Arc::new(MetricsRecorder::new()))
    }

    pub fn with_metrics(
        plan: Arc<FleetRoutePlan>,
        config: PlaybackConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> CoreResult<Self> {
        config.validate()?;
        plan.validate()?;
        let speed = config.clamp_speed(config.initial_speed);
        let mut engine = Self {
            plan,
            config,
            speed,
            drones: Vec::new(),
            last_applied: None,
            completion_reported: false,
            logger: LogManager::new("playback"),
            metrics,
        };
        engine.reseed();
        Ok(engine)
    }

    pub fn plan(&self) -> &Arc<FleetRoutePlan> {
        &self.plan
    }

    pub fn drones(&self) -> &[DronePlayback] {
        &self.drones
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_complete(&self) -> bool {
        self.drones.iter().all(|drone| drone.completed)
    }

    /// Clamps and stores the multiplier; used from the next tick on.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        self.speed = self.config.clamp_speed(speed);
        self.speed
    }

    pub fn interval(&self) -> Duration {
        self.config.tick_interval(self.speed)
    }

    pub fn step(&self) -> usize {
        self.config.step_len(self.speed)
    }

    /// Discards all per-drone state and returns every drone to takeoff.
    pub fn reseed(&mut self) {
        self.drones = self.plan.drone_paths.iter().map(DronePlayback::seed).collect();
        self.last_applied = None;
        self.completion_reported = false;
        self.logger.detail(&format!(
            "seeded {} drones ({} waypoints)",
            self.drones.len(),
            self.plan.waypoint_count()
        ));
    }

    /// Forgets the pacing baseline so the next tick only records its time.
    pub fn rebase(&mut self) {
        self.last_applied = None;
    }

    /// Applies an update when the pacing interval has elapsed since the last
    /// applied one.
    pub fn tick(&mut self, now: Duration) -> TickOutcome {
        if self.completion_reported {
            return TickOutcome::Idle;
        }
        let due = match self.last_applied {
            None => {
                self.last_applied = Some(now);
                false
            }
            Some(last) => now.saturating_sub(last) >= self.interval(),
        };
        self.metrics.record_tick(due);
        if !due {
            return TickOutcome::Skipped;
        }
        self.last_applied = Some(now);
        self.advance()
    }

    /// Advances every unfinished drone by one step, ignoring pacing.
    pub fn advance(&mut self) -> TickOutcome {
        if self.completion_reported {
            return TickOutcome::Idle;
        }
        let step = self.step();
        let trail_cap = self.config.trail_cap;
        for (state, route) in self.drones.iter_mut().zip(self.plan.drone_paths.iter()) {
            advance_drone(state, route, step, trail_cap);
        }

        if self.is_complete() {
            self.completion_reported = true;
            self.logger
                .record(&format!("all {} drones completed", self.drones.len()));
            TickOutcome::FleetCompleted
        } else {
            TickOutcome::Advanced
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::route::DeliveryLeg;

    pub(crate) fn leg(id: Option<&str>, points: &[(f64, f64)]) -> DeliveryLeg {
        DeliveryLeg {
            delivery_id: id.map(str::to_string),
            flight_path: points.iter().map(|&(lat, lng)| Waypoint::new(lat, lng)).collect(),
        }
    }

    pub(crate) fn route(id: &str, legs: Vec<DeliveryLeg>) -> DroneRoute {
        DroneRoute {
            drone_id: id.into(),
            deliveries: legs,
        }
    }

    /// Drone A: one leg of three waypoints. Drone B: two legs of two.
    pub(crate) fn two_drone_plan() -> Arc<FleetRoutePlan> {
        Arc::new(FleetRoutePlan {
            total_cost: 10.0,
            total_moves: 7,
            drone_paths: vec![
                route("A", vec![leg(Some("1"), &[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)])]),
                route(
                    "B",
                    vec![
                        leg(Some("2"), &[(1.0, 0.0), (1.0, 1.0)]),
                        leg(None, &[(1.0, 1.0), (1.0, 0.0)]),
                    ],
                ),
            ],
        })
    }

    fn engine(plan: Arc<FleetRoutePlan>) -> PlaybackEngine {
        PlaybackEngine::new(plan, PlaybackConfig::default()).unwrap()
    }

    #[test]
    fn seeding_places_drones_at_takeoff() {
        let engine = engine(two_drone_plan());
        let a = &engine.drones()[0];
        assert_eq!(a.current_position, Some(Waypoint::new(0.0, 0.0)));
        assert_eq!(a.trail_vec(), vec![Waypoint::new(0.0, 0.0)]);
        assert!(!a.completed);
    }

    #[test]
    fn scenario_completion_ticks_match_leg_layout() {
        let mut engine = engine(two_drone_plan());
        assert_eq!(engine.advance(), TickOutcome::Advanced);
        assert_eq!(engine.drones()[0].waypoint_index, 1);
        assert_eq!(engine.drones()[1].waypoint_index, 1);

        assert_eq!(engine.advance(), TickOutcome::Advanced);
        assert!(engine.drones()[0].completed);
        assert_eq!(engine.drones()[1].leg_index, 1);
        assert_eq!(engine.drones()[1].waypoint_index, 0);
        assert!(!engine.drones()[1].completed);

        assert_eq!(engine.advance(), TickOutcome::FleetCompleted);
        assert!(engine.drones()[1].completed);
        assert_eq!(engine.advance(), TickOutcome::Idle);
    }

    #[test]
    fn tick_respects_speed_coupled_interval() {
        let mut engine = engine(two_drone_plan());
        let ms = Duration::from_millis;
        assert_eq!(engine.tick(ms(0)), TickOutcome::Skipped);
        assert_eq!(engine.tick(ms(119)), TickOutcome::Skipped);
        assert_eq!(engine.tick(ms(120)), TickOutcome::Advanced);

        engine.set_speed(2.0);
        assert_eq!(engine.tick(ms(179)), TickOutcome::Skipped);
        assert_eq!(engine.tick(ms(180)), TickOutcome::Advanced);
        assert!(engine.drones()[0].completed);
        assert_eq!(engine.drones()[1].leg_index, 1);
        assert_eq!(engine.tick(ms(240)), TickOutcome::FleetCompleted);
    }

    #[test]
    fn overshooting_step_clamps_to_leg_end() {
        let plan = Arc::new(FleetRoutePlan {
            total_cost: 0.0,
            total_moves: 0,
            drone_paths: vec![route(
                "C",
                vec![
                    leg(Some("9"), &[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (0.0, 3.0)]),
                    leg(None, &[(0.0, 3.0), (0.0, 0.0)]),
                ],
            )],
        });
        let mut engine = engine(plan);
        engine.set_speed(5.0);
        engine.advance();
        let drone = &engine.drones()[0];
        assert_eq!(drone.waypoint_index, 3);
        assert_eq!(drone.current_position, Some(Waypoint::new(0.0, 3.0)));
    }

    #[test]
    fn degenerate_routes_complete_without_fault() {
        let plan = Arc::new(FleetRoutePlan {
            total_cost: 0.0,
            total_moves: 0,
            drone_paths: vec![
                route("empty", vec![]),
                route("hollow", vec![leg(None, &[])]),
                route("single", vec![leg(Some("1"), &[(2.0, 2.0)])]),
                route(
                    "gap",
                    vec![
                        leg(Some("2"), &[(3.0, 3.0), (3.0, 4.0)]),
                        leg(None, &[]),
                        leg(None, &[(3.0, 4.0), (3.0, 3.0)]),
                    ],
                ),
            ],
        });
        let mut engine = engine(plan);
        assert!(engine.drones()[0].completed);
        assert_eq!(engine.drones()[0].current_position, None);
        assert!(engine.drones()[1].completed);
        assert!(engine.drones()[2].completed);
        assert_eq!(engine.drones()[2].trail.len(), 1);

        engine.advance();
        engine.advance();
        assert_eq!(engine.drones()[3].leg_index, 2);
        assert_eq!(engine.advance(), TickOutcome::FleetCompleted);
    }

    #[test]
    fn trail_is_bounded_suffix_of_history() {
        let points: Vec<(f64, f64)> = (0..1200).map(|i| (0.0, i as f64 * 0.0001)).collect();
        let plan = Arc::new(FleetRoutePlan {
            total_cost: 0.0,
            total_moves: 0,
            drone_paths: vec![route("long", vec![leg(Some("1"), &points)])],
        });
        let mut engine = engine(plan);
        let mut history = vec![engine.drones()[0].current_position.unwrap()];
        let mut last_progress = (0, 0);
        while engine.advance() == TickOutcome::Advanced {
            let drone = &engine.drones()[0];
            history.push(drone.current_position.unwrap());
            assert!(drone.trail.len() <= 500);
            let trail = drone.trail_vec();
            assert_eq!(trail.as_slice(), &history[history.len() - trail.len()..]);
            let progress = (drone.leg_index, drone.waypoint_index);
            assert!(progress >= last_progress);
            last_progress = progress;
        }
        assert_eq!(engine.drones()[0].trail.len(), 500);
        assert!(engine.is_complete());
    }

    #[test]
    fn reseed_discards_prior_progress() {
        let mut engine = engine(two_drone_plan());
        let fresh = engine.drones().to_vec();
        engine.advance();
        engine.advance();
        engine.reseed();
        assert_eq!(engine.drones(), fresh.as_slice());
    }
}
