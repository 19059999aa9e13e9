use dronetrace::{ExplorationEvent, ExplorationLog, FleetRoutePlan, MapContext, ProgressSummary};
use serde::{Deserialize, Serialize};

/// Shared state behind the planner bridge. One calculation at a time.
#[derive(Debug, Clone, Default)]
pub struct VisualizationModel {
    pub calculation_id: u64,
    pub calculating: bool,
    pub cancelled: bool,
    /// Scenario and description of the current calculation.
    pub label: Option<String>,
    pub log: ExplorationLog,
    pub plan: Option<FleetRoutePlan>,
    pub context: MapContext,
    pub status: String,
}

impl VisualizationModel {
    pub fn progress_page(&self, since: usize) -> ProgressPage {
        ProgressPage {
            calculation_id: self.calculation_id,
            calculating: self.calculating,
            label: self.label.clone(),
            total: self.log.len(),
            events: self.log.since(since).to_vec(),
        }
    }

    pub fn plan_reply(&self) -> PlanReply {
        PlanReply {
            calculation_id: self.calculation_id,
            plan: self.plan.clone(),
        }
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary::from_events(self.log.events())
    }
}

/// Reply to `GET /progress?since=N`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPage {
    pub calculation_id: u64,
    pub calculating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub total: usize,
    pub events: Vec<ExplorationEvent>,
}

/// Reply to `GET /plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReply {
    pub calculation_id: u64,
    pub plan: Option<FleetRoutePlan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressQuery {
    #[serde(default)]
    pub since: usize,
}
