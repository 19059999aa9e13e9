use dronetrace::{
    DronePlayback, ExplorationEvent, ExplorationLog, ExplorationSampler, FleetRoutePlan,
    FrameScheduler, MapContext, MarkerUpdate, PlaybackController, PlaybackSink, PlaybackStatus,
    ProgressSummary,
};
use iced::{
    time::{self, Instant},
    widget::{
        button, canvas::Canvas, column, row, scrollable, slider, text, text_input, Column,
        Container,
    },
    Alignment, Element, Length, Subscription, Task, Theme,
};
use map::{drone_color, FleetMap};
use serde::{Deserialize, Serialize};
use std::{env, sync::Arc, time::Duration};

mod map;

const BRIDGE_ENV: &str = "DRONETRACE_BRIDGE";
const DEFAULT_BRIDGE: &str = "http://127.0.0.1:9000";
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> iced::Result {
    iced::application(Visualizer::boot, Visualizer::update, Visualizer::view)
        .title(application_title)
        .subscription(application_subscription)
        .theme(application_theme)
        .run()
}

fn application_title(_: &Visualizer) -> String {
    "Drone Delivery Visualizer".into()
}

/// Frames are only requested while playback or the marker sampler has work
/// queued, so an idle window does not wake up every 16ms.
fn application_subscription(state: &Visualizer) -> Subscription<Message> {
    let poll = time::every(POLL_INTERVAL).map(|_| Message::Poll);
    if state.needs_frames() {
        Subscription::batch([poll, time::every(FRAME_INTERVAL).map(Message::Frame)])
    } else {
        poll
    }
}

fn application_theme(_: &Visualizer) -> Theme {
    Theme::Dark
}

#[derive(Debug)]
struct Visualizer {
    config: ConfigForm,
    bridge: Bridge,
    started: Instant,
    controller: PlaybackController<FrameScheduler>,
    sampler: ExplorationSampler,
    log: ExplorationLog,
    summary: ProgressSummary,
    airspace: MapContext,
    calculation_id: Option<u64>,
    label: Option<String>,
    calculating: bool,
    polling: bool,
    status: String,
    history: Vec<String>,
}

#[derive(Debug, Clone)]
enum Message {
    Poll,
    Frame(Instant),
    ProgressFetched(usize, Result<ProgressPage, String>),
    PlanFetched(Result<PlanReply, String>),
    AirspaceFetched(u64, Result<MapContext, String>),
    Start,
    Pause,
    Reset,
    SpeedChanged(f64),
    ConfigFieldChanged(ConfigField, String),
    SubmitConfig,
    ConfigSubmitted(Result<u64, String>),
    CancelCalculation,
    CancelSubmitted(Result<bool, String>),
}

#[derive(Debug, Clone, Copy)]
enum ConfigField {
    Drones,
    Deliveries,
    Waypoints,
    Nodes,
    Seed,
    Scenario,
    Description,
}

/// The canvas reads drone state straight from the controller on each view;
/// the sink only notes fleet completion.
#[derive(Default)]
struct FrameSink {
    completed: bool,
}

impl PlaybackSink for FrameSink {
    fn drones_updated(&mut self, _drones: &[DronePlayback]) {}

    fn fleet_completed(&mut self) {
        self.completed = true;
    }
}

impl Visualizer {
    fn boot() -> (Self, Task<Message>) {
        let bridge = Bridge::from_env();
        let status = format!("Waiting for planner at {}...", bridge.base);
        (
            Visualizer {
                config: ConfigForm::default(),
                bridge: bridge.clone(),
                started: Instant::now(),
                controller: PlaybackController::default(),
                sampler: ExplorationSampler::default(),
                log: ExplorationLog::new(),
                summary: ProgressSummary::default(),
                airspace: MapContext::default(),
                calculation_id: None,
                label: None,
                calculating: false,
                polling: true,
                status,
                history: Vec::new(),
            },
            Task::perform(bridge.progress(0), |result| Message::ProgressFetched(0, result)),
        )
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::Poll => {
                if state.polling {
                    return Task::none();
                }
                state.polling = true;
                let since = state.log.len();
                Task::perform(state.bridge.clone().progress(since), move |result| {
                    Message::ProgressFetched(since, result)
                })
            }
            Message::Frame(instant) => {
                state.on_frame(instant);
                Task::none()
            }
            Message::ProgressFetched(since, Ok(page)) => {
                state.polling = false;
                state.apply_progress(since, page)
            }
            Message::ProgressFetched(_, Err(err)) => {
                state.polling = false;
                state.status = format!("Planner unreachable: {err}");
                Task::none()
            }
            Message::PlanFetched(Ok(reply)) => {
                state.apply_plan(reply);
                Task::none()
            }
            Message::PlanFetched(Err(err)) => {
                state.status = format!("Plan error: {err}");
                Task::none()
            }
            Message::AirspaceFetched(id, Ok(context)) => {
                if state.calculation_id == Some(id) {
                    state.airspace = context;
                }
                Task::none()
            }
            Message::AirspaceFetched(_, Err(err)) => {
                state.status = format!("Airspace error: {err}");
                Task::none()
            }
            Message::Start => {
                state.controller.start();
                Task::none()
            }
            Message::Pause => {
                state.controller.pause();
                Task::none()
            }
            Message::Reset => {
                state.controller.reset();
                Task::none()
            }
            Message::SpeedChanged(speed) => {
                state.controller.set_speed(speed);
                Task::none()
            }
            Message::ConfigFieldChanged(field, value) => {
                state.config.update_field(field, value);
                Task::none()
            }
            Message::SubmitConfig => {
                let request = state.config.to_request();
                Task::perform(state.bridge.clone().calculate(request), Message::ConfigSubmitted)
            }
            Message::ConfigSubmitted(Ok(id)) => {
                state.status = format!("Calculation {id} started");
                state.push_history(format!("Calculation {id} requested"));
                Task::none()
            }
            Message::ConfigSubmitted(Err(err)) => {
                state.status = format!("Config error: {err}");
                Task::none()
            }
            Message::CancelCalculation => {
                Task::perform(state.bridge.clone().cancel(), Message::CancelSubmitted)
            }
            Message::CancelSubmitted(Ok(true)) => {
                state.push_history("Calculation cancelled".into());
                Task::none()
            }
            Message::CancelSubmitted(Ok(false)) => {
                state.status = "Nothing to cancel".into();
                Task::none()
            }
            Message::CancelSubmitted(Err(err)) => {
                state.status = format!("Cancel error: {err}");
                Task::none()
            }
        }
    }

    fn needs_frames(&self) -> bool {
        self.controller.scheduler().is_pending() || self.sampler.is_waiting()
    }

    fn clock(&self, instant: Instant) -> Duration {
        instant.duration_since(self.started)
    }

    fn on_frame(&mut self, instant: Instant) {
        let now = self.clock(instant);
        if let Some(MarkerUpdate::Replace(markers)) = self.sampler.poll(now, self.log.events()) {
            self.status = format!(
                "Exploring: {} nodes, {} markers",
                self.summary.nodes_explored,
                markers.len()
            );
        }
        if let Some(handle) = self.controller.scheduler_mut().take_due() {
            let mut sink = FrameSink::default();
            self.controller.on_frame(handle, now, &mut sink);
            if sink.completed {
                self.push_history("All drones delivered".into());
            }
        }
    }

    fn apply_progress(&mut self, since: usize, page: ProgressPage) -> Task<Message> {
        let now = self.clock(Instant::now());
        let id = page.calculation_id;
        let fresh = self.calculation_id != Some(id);
        let mut tasks = Vec::new();
        if fresh {
            self.begin_calculation(id, page.label.clone());
            tasks.push(Task::perform(self.bridge.clone().airspace(), move |result| {
                Message::AirspaceFetched(id, result)
            }));
            if since != 0 {
                return Task::batch(tasks);
            }
        } else if since != self.log.len() {
            return Task::none();
        }

        let was_calculating = self.calculating;
        self.calculating = page.calculating;
        if let Some(MarkerUpdate::Clear) = self.sampler.set_active(page.calculating) {
            self.push_history("Exploration markers cleared".into());
        }
        if !page.events.is_empty() {
            for event in &page.events {
                self.summary.observe(event);
            }
            self.log.extend(page.events);
            self.sampler.notify(now);
        }

        if !page.calculating && (was_calculating || fresh) {
            tasks.push(Task::perform(self.bridge.clone().plan(), Message::PlanFetched));
        }
        Task::batch(tasks)
    }

    fn begin_calculation(&mut self, id: u64, label: Option<String>) {
        self.calculation_id = Some(id);
        self.calculating = false;
        self.log.clear();
        self.summary = ProgressSummary::default();
        self.airspace = MapContext::default();
        self.sampler.set_active(false);
        self.controller.clear_plan();
        match &label {
            Some(label) => self.push_history(format!("Following calculation {id}: {label}")),
            None => self.push_history(format!("Following calculation {id}")),
        }
        self.label = label;
    }

    fn apply_plan(&mut self, reply: PlanReply) {
        if self.calculation_id != Some(reply.calculation_id) {
            return;
        }
        let Some(plan) = reply.plan else {
            self.status = format!("Calculation {} produced no plan", reply.calculation_id);
            return;
        };
        let drones = plan.drone_paths.len();
        match self.controller.start_plan(Arc::new(plan)) {
            Ok(()) => {
                self.status = format!("Playing {drones} drone routes");
                self.push_history(format!("Plan {} loaded", reply.calculation_id));
            }
            Err(err) => self.status = format!("Plan rejected: {err}"),
        }
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let config_column = column![
            text("Calculation").size(26),
            text_input("Drones", &state.config.drones)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Drones, value))
                .padding(6),
            text_input("Deliveries per drone", &state.config.deliveries)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Deliveries, value))
                .padding(6),
            text_input("Waypoints per leg", &state.config.waypoints)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Waypoints, value))
                .padding(6),
            text_input("Nodes explored per leg", &state.config.nodes)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Nodes, value))
                .padding(6),
            text_input("Seed", &state.config.seed)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Seed, value))
                .padding(6),
            text_input("Scenario", &state.config.scenario)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Scenario, value))
                .padding(6),
            text_input("Description", &state.config.description)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Description, value))
                .padding(6),
            row![
                button("Calculate")
                    .on_press_maybe((!state.calculating).then_some(Message::SubmitConfig))
                    .padding(10),
                button("Cancel")
                    .on_press_maybe(state.calculating.then_some(Message::CancelCalculation))
                    .padding(10),
            ]
            .spacing(8),
            text(&state.status).size(14),
            progress_panel(state),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fixed(340.0));

        let map = Canvas::new(FleetMap::new(
            &state.airspace,
            state.controller.plan().map(|plan| plan.as_ref()),
            state.controller.drones(),
            state.sampler.markers(),
        ))
        .width(Length::Fill)
        .height(Length::Fixed(420.0));

        let status = state.controller.status();
        let has_plan = state.controller.has_plan();
        let controls = row![
            button("Start")
                .on_press_maybe(
                    (has_plan && status != PlaybackStatus::Playing).then_some(Message::Start),
                )
                .padding(8),
            button("Pause")
                .on_press_maybe((status == PlaybackStatus::Playing).then_some(Message::Pause))
                .padding(8),
            button("Reset")
                .on_press_maybe(has_plan.then_some(Message::Reset))
                .padding(8),
            text(format!("Speed {:.1}x", state.controller.speed())).size(14),
            slider(0.5..=5.0, state.controller.speed(), Message::SpeedChanged)
                .step(0.5)
                .width(Length::Fixed(180.0)),
            text(format!("{status:?}")).size(14),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let drone_list = if state.controller.drones().is_empty() {
            Column::new().push(text("No routes loaded").size(12))
        } else {
            state.controller.drones().iter().enumerate().fold(
                Column::new().spacing(4),
                |col, (index, drone)| {
                    col.push(
                        text(format!(
                            "{}: leg {} wp {} | trail {}{}",
                            drone.drone_id,
                            drone.leg_index + 1,
                            drone.waypoint_index,
                            drone.trail.len(),
                            if drone.completed { " | delivered" } else { "" }
                        ))
                        .size(12)
                        .color(drone_color(index)),
                    )
                },
            )
        };

        let history_list = if state.history.is_empty() {
            Column::new().push(text("No activity yet").size(12))
        } else {
            state
                .history
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, entry| {
                    col.push(text(entry.clone()).size(12))
                })
        };

        let map_column = column![
            text("Fleet map").size(26),
            map,
            controls,
            text("Drones").size(16),
            Container::new(scrollable(drone_list).height(Length::Fixed(110.0))).padding(6),
            text("Activity log").size(16),
            Container::new(scrollable(history_list).height(Length::Fixed(90.0))).padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fill);

        let layout = row![config_column, map_column]
            .spacing(20)
            .align_y(Alignment::Start)
            .padding(20);

        Container::new(layout)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    fn push_history(&mut self, entry: String) {
        self.history.push(entry);
        if self.history.len() > 20 {
            self.history.remove(0);
        }
    }
}

fn progress_panel(state: &Visualizer) -> Column<'_, Message> {
    let summary = &state.summary;
    let phase = if state.calculating {
        "running"
    } else if summary.no_solution {
        "no solution"
    } else if summary.finished {
        "complete"
    } else {
        "idle"
    };
    column![
        text("Progress").size(16),
        text(state.label.clone().unwrap_or_default()).size(12),
        text(format!("State: {phase}")).size(12),
        text(format!("Events received: {}", state.log.len())).size(12),
        text(format!("Nodes explored: {}", summary.nodes_explored)).size(12),
        text(format!("Paths found: {}", summary.paths_found)).size(12),
        text(format!(
            "Warnings / errors: {} / {}",
            summary.warnings, summary.errors
        ))
        .size(12),
        text(match summary.total_cost {
            Some(cost) => format!("Total cost: {cost:.2}"),
            None => "Total cost: n/a".into(),
        })
        .size(12),
        text(summary.last_message.clone().unwrap_or_default()).size(12),
    ]
    .spacing(4)
    .padding(6)
}

/// HTTP client for the planner bridge.
#[derive(Debug, Clone)]
struct Bridge {
    client: reqwest::Client,
    base: String,
}

impl Bridge {
    fn from_env() -> Self {
        let base = env::var(BRIDGE_ENV).unwrap_or_else(|_| DEFAULT_BRIDGE.into());
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn progress(self, since: usize) -> Result<ProgressPage, String> {
        let response = self
            .client
            .get(format!("{}/progress", self.base))
            .query(&[("since", since)])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response.json::<ProgressPage>().await.map_err(|e| e.to_string())
    }

    async fn airspace(self) -> Result<MapContext, String> {
        let response = self
            .client
            .get(format!("{}/airspace", self.base))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response.json::<MapContext>().await.map_err(|e| e.to_string())
    }

    async fn plan(self) -> Result<PlanReply, String> {
        let response = self
            .client
            .get(format!("{}/plan", self.base))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response.json::<PlanReply>().await.map_err(|e| e.to_string())
    }

    async fn calculate(self, request: CalculationRequest) -> Result<u64, String> {
        let response = self
            .client
            .post(format!("{}/calculate", self.base))
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_else(|_| "".into());
            return Err(format!("{}: {}", status, text));
        }
        response
            .json::<CalculationStarted>()
            .await
            .map(|started| started.calculation_id)
            .map_err(|e| e.to_string())
    }

    async fn cancel(self) -> Result<bool, String> {
        let response = self
            .client
            .post(format!("{}/cancel", self.base))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response
            .json::<CancelReply>()
            .await
            .map(|reply| reply.cancelled)
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone)]
struct ConfigForm {
    drones: String,
    deliveries: String,
    waypoints: String,
    nodes: String,
    seed: String,
    scenario: String,
    description: String,
}

impl Default for ConfigForm {
    fn default() -> Self {
        Self {
            drones: "3".into(),
            deliveries: "2".into(),
            waypoints: "40".into(),
            nodes: "400".into(),
            seed: "7".into(),
            scenario: "".into(),
            description: "Visualizer calculation".into(),
        }
    }
}

impl ConfigForm {
    fn update_field(&mut self, field: ConfigField, value: String) {
        match field {
            ConfigField::Drones => self.drones = value,
            ConfigField::Deliveries => self.deliveries = value,
            ConfigField::Waypoints => self.waypoints = value,
            ConfigField::Nodes => self.nodes = value,
            ConfigField::Seed => self.seed = value,
            ConfigField::Scenario => self.scenario = value,
            ConfigField::Description => self.description = value,
        }
    }

    fn to_request(&self) -> CalculationRequest {
        CalculationRequest {
            drones: self.drones.trim().parse().ok(),
            deliveries_per_drone: self.deliveries.trim().parse().ok(),
            waypoints_per_leg: self.waypoints.trim().parse().ok(),
            nodes_per_leg: self.nodes.trim().parse().ok(),
            seed: self.seed.trim().parse().ok(),
            scenario: non_empty(&self.scenario),
            description: non_empty(&self.description),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Body of `POST /calculate`. Unset fields fall back to planner defaults.
#[derive(Debug, Serialize)]
struct CalculationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    drones: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deliveries_per_drone: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    waypoints_per_leg: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodes_per_leg: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPage {
    calculation_id: u64,
    calculating: bool,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    events: Vec<ExplorationEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanReply {
    calculation_id: u64,
    #[serde(default)]
    plan: Option<FleetRoutePlan>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalculationStarted {
    calculation_id: u64,
}

#[derive(Debug, Deserialize)]
struct CancelReply {
    cancelled: bool,
}
