use super::template::{scatter, straight_leg};
use anyhow::{ensure, Context};
use dronetrace::{
    DeliveryLeg, DroneRoute, EventKind, ExplorationEvent, FleetRoutePlan, Position,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating a synthetic calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub drones: usize,
    pub deliveries_per_drone: usize,
    pub waypoints_per_leg: usize,
    pub base: Position,
    pub spread_deg: f64,
    pub jitter_deg: f64,
    pub nodes_per_leg: usize,
    /// Every n-th explored node is emitted without a position.
    pub malformed_every: Option<usize>,
    pub return_to_base: bool,
    pub cost_per_move: f64,
    /// No-fly polygons generated around the base.
    pub restricted_areas: usize,
    pub area_radius_deg: f64,
    pub seed: u64,
    /// Free-text note shown with the calculation.
    pub description: Option<String>,
    pub scenario: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            drones: 3,
            deliveries_per_drone: 2,
            waypoints_per_leg: 40,
            base: Position::new(55.9445, -3.1883),
            spread_deg: 0.02,
            jitter_deg: 0.0002,
            nodes_per_leg: 400,
            malformed_every: Some(97),
            return_to_base: true,
            cost_per_move: 0.01,
            restricted_areas: 2,
            area_radius_deg: 0.002,
            seed: 0,
            description: None,
            scenario: None,
        }
    }
}

impl GeneratorConfig {
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.drones > 0, "generator needs at least one drone");
        ensure!(
            self.spread_deg.is_finite() && self.spread_deg >= 0.0,
            "spread_deg must be a non-negative number"
        );
        ensure!(
            self.jitter_deg.is_finite() && self.jitter_deg >= 0.0,
            "jitter_deg must be a non-negative number"
        );
        ensure!(
            self.area_radius_deg.is_finite() && self.area_radius_deg >= 0.0,
            "area_radius_deg must be a non-negative number"
        );
        Ok(())
    }

    /// Human label for the calculation: scenario and description, when set.
    pub fn label(&self) -> Option<String> {
        let parts: Vec<&str> = [self.scenario.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(": "))
    }
}

/// Builds a fleet plan of straight-ish legs out from and back to the base.
pub fn build_plan(config: &GeneratorConfig) -> anyhow::Result<FleetRoutePlan> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut drone_paths = Vec::with_capacity(config.drones);
    let mut delivery_counter = 0u64;

    for drone_index in 0..config.drones {
        let mut deliveries = Vec::new();
        let mut current = config.base;
        for _ in 0..config.deliveries_per_drone {
            delivery_counter += 1;
            let target = scatter(config.base, config.spread_deg, &mut rng);
            deliveries.push(DeliveryLeg {
                delivery_id: Some(delivery_counter.to_string()),
                flight_path: straight_leg(
                    current,
                    target,
                    config.waypoints_per_leg,
                    config.jitter_deg,
                    &mut rng,
                ),
            });
            current = target;
        }
        if config.return_to_base && !deliveries.is_empty() {
            deliveries.push(DeliveryLeg {
                delivery_id: None,
                flight_path: straight_leg(
                    current,
                    config.base,
                    config.waypoints_per_leg,
                    config.jitter_deg,
                    &mut rng,
                ),
            });
        }
        drone_paths.push(DroneRoute {
            drone_id: format!("drone-{}", drone_index + 1),
            deliveries,
        });
    }

    let mut plan = FleetRoutePlan {
        total_cost: 0.0,
        total_moves: 0,
        drone_paths,
    };
    let moves: usize = plan
        .drone_paths
        .iter()
        .flat_map(|route| route.deliveries.iter())
        .map(|leg| leg.flight_path.len().saturating_sub(1))
        .sum();
    plan.total_moves = moves as u64;
    plan.total_cost = moves as f64 * config.cost_per_move;
    plan.validate().context("generated plan failed validation")?;
    Ok(plan)
}

/// Builds the event stream a search for `plan` would have produced.
pub fn build_exploration(config: &GeneratorConfig, plan: &FleetRoutePlan) -> Vec<ExplorationEvent> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let mut events = vec![ExplorationEvent::new(EventKind::CalculationStart)
        .with_message(format!("Planning {} drones", plan.drone_paths.len()))];
    let mut explored = 0usize;

    for (batch_index, route) in plan.drone_paths.iter().enumerate() {
        for leg in &route.deliveries {
            if leg.flight_path.is_empty() {
                continue;
            }
            for _ in 0..config.nodes_per_leg {
                explored += 1;
                let malformed = config
                    .malformed_every
                    .map(|every| every > 0 && explored % every == 0)
                    .unwrap_or(false);
                if malformed {
                    events.push(ExplorationEvent::new(EventKind::NodeExplored));
                    continue;
                }
                let anchor = leg.flight_path[rng.gen_range(0..leg.flight_path.len())];
                let spread = config.jitter_deg * 20.0;
                events.push(ExplorationEvent::node_explored(scatter(
                    anchor.position(),
                    spread,
                    &mut rng,
                )));
            }
            let cost = leg.flight_path.len().saturating_sub(1) as f64 * config.cost_per_move;
            let mut found = ExplorationEvent::new(EventKind::PathFound).with_message(format!(
                "Path found for {} delivery {}",
                route.drone_id,
                leg.delivery_id.as_deref().unwrap_or("return")
            ));
            found.cost = Some(cost);
            events.push(found);
        }
        events.push(
            ExplorationEvent::new(EventKind::BatchCompleted)
                .with_message(format!("Batch {} completed", batch_index + 1)),
        );
    }

    let mut complete = ExplorationEvent::new(EventKind::CalculationComplete)
        .with_message(format!("Explored {} nodes", explored));
    complete.total_cost = Some(plan.total_cost);
    events.push(complete);
    events
}
