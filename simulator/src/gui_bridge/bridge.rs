use crate::generator::{build_exploration, build_map_context, build_plan, GeneratorConfig};
use crate::gui_bridge::model::{ProgressQuery, VisualizationModel};
use crate::workflow::runner::{Runner, WorkflowResult};
use anyhow::{Context, Result};
use dronetrace::{EventKind, ExplorationEvent, FleetRoutePlan, MapContext};
use log::{info, warn};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread,
    time::Duration,
};
use tokio::runtime::Builder;
use warp::Filter;

pub type SharedModel = Arc<RwLock<VisualizationModel>>;

pub fn gui_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

fn read(state: &SharedModel) -> RwLockReadGuard<'_, VisualizationModel> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(state: &SharedModel) -> RwLockWriteGuard<'_, VisualizationModel> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Starts a new calculation, discarding the previous one. Returns its id.
pub fn begin_calculation(
    state: &SharedModel,
    label: Option<String>,
    context: MapContext,
) -> u64 {
    let mut guard = write(state);
    guard.calculation_id += 1;
    guard.calculating = true;
    guard.cancelled = false;
    guard.log.clear();
    guard.plan = None;
    guard.context = context;
    guard.status = match &label {
        Some(label) => format!("Calculation {} running ({})", guard.calculation_id, label),
        None => format!("Calculation {} running", guard.calculation_id),
    };
    guard.label = label;
    guard.calculation_id
}

/// Appends a batch for calculation `id`. Returns `false` once that calculation
/// has been cancelled or superseded, telling the producer to stop.
pub fn append_events(state: &SharedModel, id: u64, events: &[ExplorationEvent]) -> bool {
    let mut guard = write(state);
    if guard.calculation_id != id || guard.cancelled {
        return false;
    }
    guard.log.extend(events.iter().cloned());
    true
}

/// Publishes the plan of calculation `id` unless it was abandoned.
pub fn finish_calculation(state: &SharedModel, id: u64, plan: FleetRoutePlan) -> bool {
    let mut guard = write(state);
    if guard.calculation_id != id || guard.cancelled {
        return false;
    }
    guard.status = format!(
        "Calculation {} finished: {} drones, cost {:.2}",
        id,
        plan.drone_paths.len(),
        plan.total_cost
    );
    guard.plan = Some(plan);
    guard.calculating = false;
    true
}

fn fail_calculation(state: &SharedModel, id: u64, message: String) {
    let mut guard = write(state);
    if guard.calculation_id != id {
        return;
    }
    guard
        .log
        .push(ExplorationEvent::new(EventKind::Error).with_message(message.clone()));
    guard.calculating = false;
    guard.status = format!("Calculation {} failed: {}", id, message);
}

/// Abandons the running calculation. No plan will be published for it.
pub fn cancel_calculation(state: &SharedModel) -> bool {
    let mut guard = write(state);
    if !guard.calculating {
        return false;
    }
    guard.cancelled = true;
    guard.calculating = false;
    guard.status = format!("Calculation {} cancelled", guard.calculation_id);
    true
}

/// Replays a generated search in batches, as a remote planner would stream it.
async fn stream_calculation(
    state: SharedModel,
    runner: Arc<Runner>,
    config: GeneratorConfig,
    id: u64,
) {
    let plan = match build_plan(&config) {
        Ok(plan) => plan,
        Err(err) => {
            warn!("calculation {} failed: {:#}", id, err);
            fail_calculation(&state, id, err.to_string());
            return;
        }
    };
    let events = build_exploration(&config, &plan);
    let batch = runner.config().stream_batch.max(1);
    let pause = Duration::from_micros(runner.config().event_interval_us * batch as u64);

    for chunk in events.chunks(batch) {
        if !append_events(&state, id, chunk) {
            info!("calculation {} abandoned", id);
            return;
        }
        tokio::time::sleep(pause).await;
    }
    if finish_calculation(&state, id, plan) {
        info!("calculation {} published after {} events", id, events.len());
    }
}

pub fn routes(
    state: SharedModel,
    runner: Arc<Runner>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());
    let runner_filter = warp::any().map(move || runner.clone());

    let plan_route = warp::path("plan")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedModel| warp::reply::json(&read(&state).plan_reply()));

    let airspace_route = warp::path("airspace")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedModel| warp::reply::json(&read(&state).context));

    let progress_route = warp::path("progress")
        .and(warp::get())
        .and(warp::query::<ProgressQuery>())
        .and(state_filter.clone())
        .map(|query: ProgressQuery, state: SharedModel| {
            warp::reply::json(&read(&state).progress_page(query.since))
        });

    let calculate_route = warp::path("calculate")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and(runner_filter)
        .map(|config: GeneratorConfig, state: SharedModel, runner: Arc<Runner>| {
            let label = config.label();
            let id = begin_calculation(&state, label.clone(), build_map_context(&config));
            info!(
                "calculation {} started: {}",
                id,
                label.as_deref().unwrap_or("unlabelled")
            );
            tokio::spawn(stream_calculation(state, runner, config, id));
            warp::reply::json(&json!({ "status": "started", "calculationId": id }))
        });

    let cancel_route = warp::path("cancel")
        .and(warp::post())
        .and(state_filter)
        .map(|state: SharedModel| {
            let cancelled = cancel_calculation(&state);
            warp::reply::json(&json!({ "cancelled": cancelled }))
        });

    plan_route
        .or(airspace_route)
        .or(progress_route)
        .or(calculate_route)
        .or(cancel_route)
}

/// Bridge that hosts the planner HTTP endpoints consumed by the visualizer.
pub struct GuiBridge {
    state: SharedModel,
    runner: Arc<Runner>,
}

impl GuiBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            state: Arc::new(RwLock::new(VisualizationModel::default())),
            runner,
        }
    }

    /// Serves the bridge on a background thread.
    pub fn serve(&self, addr: SocketAddr) -> Result<thread::JoinHandle<()>> {
        let routes = routes(self.state.clone(), self.runner.clone());
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building bridge runtime")?;
        info!("planner bridge listening on http://{}", addr);
        Ok(thread::spawn(move || {
            runtime.block_on(async move {
                warp::serve(routes).run(addr).await;
            });
        }))
    }

    /// Publishes an already finished calculation, as produced offline.
    pub fn publish(&self, result: &WorkflowResult) -> Result<u64> {
        let plan = &result.plan;
        let label = self.runner.config().generator.label();
        let id = begin_calculation(&self.state, label, result.context.clone());
        append_events(&self.state, id, &result.events);
        finish_calculation(&self.state, id, plan.clone());
        let summary = read(&self.state).summary();
        info!(
            "[GUI] plan with {} drones, {} nodes explored, {} paths found",
            plan.drone_paths.len(),
            summary.nodes_explored,
            summary.paths_found
        );
        Ok(id)
    }

    pub fn publish_status(&self, message: &str) {
        write(&self.state).status = message.to_string();
        info!("[GUI] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> VisualizationModel {
        read(&self.state).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gui_bridge::model::{PlanReply, ProgressPage};
    use crate::workflow::config::WorkflowConfig;

    fn runner() -> Arc<Runner> {
        Arc::new(Runner::new(WorkflowConfig::from_args(1, 1, 5, 1.0)))
    }

    fn sample_events(n: usize) -> Vec<ExplorationEvent> {
        (0..n)
            .map(|i| dronetrace::Position::new(55.9, -3.1 + i as f64 * 1e-4))
            .map(ExplorationEvent::node_explored)
            .collect()
    }

    #[test]
    fn gui_bridge_publishes_plan() {
        let runner = runner();
        let gui = GuiBridge::new(runner.clone());
        let result = runner.execute().unwrap();
        let id = gui.publish(&result).unwrap();
        let snapshot = gui.snapshot();
        assert_eq!(snapshot.calculation_id, id);
        assert!(!snapshot.calculating);
        assert_eq!(snapshot.log.len(), result.events.len());
        assert_eq!(snapshot.plan.as_ref(), Some(&result.plan));
        assert!(snapshot.summary().finished);
        assert_eq!(snapshot.context, result.context);
    }

    #[test]
    fn cancelled_calculation_never_publishes() {
        let state: SharedModel = Arc::new(RwLock::new(VisualizationModel::default()));
        let id = begin_calculation(&state, None, MapContext::default());
        assert!(append_events(&state, id, &sample_events(3)));
        assert!(cancel_calculation(&state));
        assert!(!append_events(&state, id, &sample_events(3)));

        let plan = FleetRoutePlan {
            total_cost: 0.0,
            total_moves: 0,
            drone_paths: vec![],
        };
        assert!(!finish_calculation(&state, id, plan));
        let guard = read(&state);
        assert!(guard.plan.is_none());
        assert_eq!(guard.log.len(), 3);
    }

    #[test]
    fn superseded_calculation_stops_streaming() {
        let state: SharedModel = Arc::new(RwLock::new(VisualizationModel::default()));
        let first = begin_calculation(&state, None, MapContext::default());
        let second = begin_calculation(&state, None, MapContext::default());
        assert!(!append_events(&state, first, &sample_events(1)));
        assert!(append_events(&state, second, &sample_events(1)));
    }

    #[tokio::test]
    async fn progress_route_pages_from_offset() {
        let state: SharedModel = Arc::new(RwLock::new(VisualizationModel::default()));
        let id = begin_calculation(&state, None, MapContext::default());
        append_events(&state, id, &sample_events(5));
        let filter = routes(state.clone(), runner());

        let res = warp::test::request()
            .method("GET")
            .path("/progress?since=3")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);
        let page: ProgressPage = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(page.calculation_id, id);
        assert!(page.calculating);
        assert_eq!(page.total, 5);
        assert_eq!(page.events.len(), 2);

        let res = warp::test::request()
            .method("GET")
            .path("/plan")
            .reply(&filter)
            .await;
        let reply: PlanReply = serde_json::from_slice(res.body()).unwrap();
        assert!(reply.plan.is_none());
    }

    #[tokio::test]
    async fn calculation_serves_airspace_and_label() {
        let state: SharedModel = Arc::new(RwLock::new(VisualizationModel::default()));
        let config = GeneratorConfig {
            scenario: Some("old-town".into()),
            description: Some("lunch rush".into()),
            restricted_areas: 3,
            ..Default::default()
        };
        let id = begin_calculation(&state, config.label(), build_map_context(&config));
        let filter = routes(state.clone(), runner());

        let res = warp::test::request()
            .method("GET")
            .path("/airspace")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);
        let context: MapContext = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(context.restricted_areas.len(), 3);
        assert_eq!(context.service_points.len(), 1);

        let res = warp::test::request()
            .method("GET")
            .path("/progress?since=0")
            .reply(&filter)
            .await;
        let page: ProgressPage = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(page.calculation_id, id);
        assert_eq!(page.label.as_deref(), Some("old-town: lunch rush"));
        assert!(read(&state).status.contains("lunch rush"));
    }

    #[tokio::test]
    async fn cancel_route_stops_running_calculation() {
        let state: SharedModel = Arc::new(RwLock::new(VisualizationModel::default()));
        begin_calculation(&state, None, MapContext::default());
        let filter = routes(state.clone(), runner());
        let res = warp::test::request()
            .method("POST")
            .path("/cancel")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);
        assert!(!read(&state).calculating);
        assert!(read(&state).cancelled);
    }
}
