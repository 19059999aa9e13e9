//! Live exploration feedback: the append-only event buffer fed by the planner
//! transport, and the sampler that reduces it to a small marker set.
//!
//! The sampler is a two-stage filter. [`Debouncer`] defers work until the
//! event stream has been quiet for the debounce window, then [`change_gate`]
//! drops passes that would not visibly change the map. Only then is
//! [`sample_markers`] run over the tail of the buffer.

use crate::prelude::{CoreResult, SamplerConfig};
use crate::route::Position;
use crate::telemetry::{LogManager, MetricsRecorder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CalculationStart,
    NodeExplored,
    PathFound,
    CalculationComplete,
    Error,
    Warning,
    NoSolution,
    BatchCompleted,
    #[serde(other)]
    Other,
}

/// Progress message streamed by the planner while a calculation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl ExplorationEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: None,
            message: None,
            position: None,
            cost: None,
            total_cost: None,
        }
    }

    pub fn node_explored(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::new(EventKind::NodeExplored)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Position of an explored node, if this event can be drawn at all.
    pub fn explored_position(&self) -> Option<Position> {
        match (self.kind, self.position) {
            (EventKind::NodeExplored, Some(position)) => Some(position),
            _ => None,
        }
    }
}

/// Append-only buffer of one calculation's events. Single writer.
#[derive(Debug, Default, Clone)]
pub struct ExplorationLog {
    events: Vec<ExplorationEvent>,
}

impl ExplorationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ExplorationEvent) {
        self.events.push(event);
    }

    pub fn extend<I: IntoIterator<Item = ExplorationEvent>>(&mut self, events: I) {
        self.events.extend(events);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[ExplorationEvent] {
        &self.events
    }

    /// Events from `start` onwards; empty when `start` is past the end.
    pub fn since(&self, start: usize) -> &[ExplorationEvent] {
        self.events.get(start..).unwrap_or(&[])
    }

    /// Only valid when a new calculation begins.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Rolling view of a calculation for the progress panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub nodes_explored: usize,
    pub paths_found: usize,
    pub warnings: usize,
    pub errors: usize,
    pub finished: bool,
    pub no_solution: bool,
    pub total_cost: Option<f64>,
    pub last_message: Option<String>,
}

impl ProgressSummary {
    pub fn from_events(events: &[ExplorationEvent]) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.observe(event);
        }
        summary
    }

    pub fn observe(&mut self, event: &ExplorationEvent) {
        match event.kind {
            EventKind::CalculationStart => *self = Self::default(),
            EventKind::NodeExplored => self.nodes_explored += 1,
            EventKind::PathFound => self.paths_found += 1,
            EventKind::CalculationComplete => self.finished = true,
            EventKind::Error => self.errors += 1,
            EventKind::Warning => self.warnings += 1,
            EventKind::NoSolution => self.no_solution = true,
            EventKind::BatchCompleted | EventKind::Other => {}
        }
        if let Some(total) = event.total_cost {
            self.total_cost = Some(total);
        }
        if let Some(message) = &event.message {
            self.last_message = Some(message.clone());
        }
    }
}

/// Cancellable delayed action. Every trigger restarts the window; only the
/// latest one can fire.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    max_wait: Option<Duration>,
    deadline: Option<Duration>,
    first_trigger: Option<Duration>,
}

impl Debouncer {
    pub fn new(window: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            window,
            max_wait,
            deadline: None,
            first_trigger: None,
        }
    }

    pub fn trigger(&mut self, now: Duration) {
        self.deadline = Some(now + self.window);
        self.first_trigger.get_or_insert(now);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.first_trigger = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` exactly once per quiet period, or once the starvation
    /// bound has been exceeded under a continuous stream.
    pub fn poll(&mut self, now: Duration) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        let starved = match (self.max_wait, self.first_trigger) {
            (Some(max_wait), Some(first)) => now >= first + max_wait,
            _ => false,
        };
        if now >= deadline || starved {
            self.cancel();
            true
        } else {
            false
        }
    }
}

/// Whether the buffer grew enough since the last sample to be worth a redraw.
pub fn change_gate(current_len: usize, last_len: usize, min_change: usize) -> bool {
    current_len.abs_diff(last_len) >= min_change
}

/// Every `stride`-th explored position among the last `window` drawable
/// events. Events without a position are skipped.
pub fn sample_markers(events: &[ExplorationEvent], window: usize, stride: usize) -> Vec<Position> {
    let mut tail: Vec<Position> = events
        .iter()
        .rev()
        .filter_map(ExplorationEvent::explored_position)
        .take(window)
        .collect();
    tail.reverse();
    tail.into_iter().step_by(stride.max(1)).collect()
}

/// Marker set shown on the map. Replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerLayer {
    markers: Vec<Position>,
    generation: u64,
}

impl MarkerLayer {
    pub fn markers(&self) -> &[Position] {
        &self.markers
    }

    /// Bumped on every replacement or clear.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn replace(&mut self, markers: Vec<Position>) {
        self.markers = markers;
        self.generation += 1;
    }

    fn clear(&mut self) {
        if !self.markers.is_empty() {
            self.markers.clear();
            self.generation += 1;
        }
    }
}

/// Change handed to the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerUpdate {
    Replace(Vec<Position>),
    Clear,
}

/// Throttled, down-sampled renderer input for the exploration stream.
#[derive(Debug)]
pub struct ExplorationSampler {
    config: SamplerConfig,
    debouncer: Debouncer,
    last_len: usize,
    active: bool,
    layer: MarkerLayer,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
}

impl ExplorationSampler {
    pub fn new(config: SamplerConfig) -> CoreResult<Self> {
        Self::with_metrics(config, Arc::new(MetricsRecorder::new()))
    }

    pub fn with_metrics(config: SamplerConfig, metrics: Arc<MetricsRecorder>) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, metrics))
    }

    /// Expects `config` to have passed validation.
    fn assemble(config: SamplerConfig, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            debouncer: Debouncer::new(config.debounce(), config.max_wait()),
            config,
            last_len: 0,
            active: false,
            layer: MarkerLayer::default(),
            logger: LogManager::new("sampler"),
            metrics,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a sample is still scheduled behind the debounce window.
    pub fn is_waiting(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn layer(&self) -> &MarkerLayer {
        &self.layer
    }

    pub fn markers(&self) -> &[Position] {
        self.layer.markers()
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Follows the "calculation active" flag. Going inactive clears the layer
    /// and forgets the pending timer immediately.
    pub fn set_active(&mut self, active: bool) -> Option<MarkerUpdate> {
        if self.active == active {
            return None;
        }
        self.active = active;
        if active {
            return None;
        }
        self.debouncer.cancel();
        self.last_len = 0;
        self.layer.clear();
        self.logger.detail("calculation inactive, markers cleared");
        Some(MarkerUpdate::Clear)
    }

    /// Called on every buffer mutation; restarts the debounce window.
    pub fn notify(&mut self, now: Duration) {
        if self.active {
            self.debouncer.trigger(now);
        }
    }

    /// Called on each host timer opportunity with the current buffer.
    pub fn poll(&mut self, now: Duration, events: &[ExplorationEvent]) -> Option<MarkerUpdate> {
        if !self.active || !self.debouncer.poll(now) {
            return None;
        }
        if !change_gate(events.len(), self.last_len, self.config.min_change) {
            self.metrics.record_sample(false);
            self.logger.detail(&format!(
                "sample skipped, {} new events",
                events.len().abs_diff(self.last_len)
            ));
            return None;
        }

        let markers = sample_markers(events, self.config.window, self.config.stride);
        self.layer.replace(markers.clone());
        self.last_len = events.len();
        self.metrics.record_sample(true);
        self.logger.detail(&format!(
            "sampled {} markers from {} events",
            markers.len(),
            events.len()
        ));
        Some(MarkerUpdate::Replace(markers))
    }
}

impl Default for ExplorationSampler {
    fn default() -> Self {
        Self::assemble(SamplerConfig::default(), Arc::new(MetricsRecorder::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn explored(count: usize, offset: usize) -> Vec<ExplorationEvent> {
        (0..count)
            .map(|i| {
                let n = (offset + i) as f64;
                ExplorationEvent::node_explored(Position::new(55.9 + n * 1e-5, -3.2))
            })
            .collect()
    }

    fn active_sampler() -> ExplorationSampler {
        let mut sampler = ExplorationSampler::new(SamplerConfig::default()).unwrap();
        sampler.set_active(true);
        sampler
    }

    #[test]
    fn event_json_uses_planner_field_names() {
        let raw = r#"{"type":"node_explored","timestamp":"2025-01-01T00:00:00Z","position":{"lat":55.9,"lng":-3.1}}"#;
        let event: ExplorationEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::NodeExplored);
        assert_eq!(event.explored_position(), Some(Position::new(55.9, -3.1)));

        let other: ExplorationEvent =
            serde_json::from_str(r#"{"type":"delivery_started","message":"x"}"#).unwrap();
        assert_eq!(other.kind, EventKind::Other);
    }

    #[test]
    fn debouncer_restarts_on_every_trigger() {
        let mut debounce = Debouncer::new(ms(200), None);
        debounce.trigger(ms(0));
        debounce.trigger(ms(150));
        assert!(!debounce.poll(ms(200)));
        assert!(debounce.poll(ms(350)));
        assert!(!debounce.poll(ms(400)));
    }

    #[test]
    fn debouncer_fires_after_max_wait_under_constant_triggers() {
        let mut debounce = Debouncer::new(ms(200), Some(ms(1000)));
        let mut fired_at = None;
        for t in (0..2000).step_by(50) {
            debounce.trigger(ms(t));
            if debounce.poll(ms(t)) {
                fired_at = Some(t);
                break;
            }
        }
        assert_eq!(fired_at, Some(1000));
    }

    #[test]
    fn change_gate_needs_twenty_events() {
        assert!(!change_gate(19, 0, 20));
        assert!(change_gate(20, 0, 20));
        assert!(change_gate(0, 25, 20));
    }

    #[test]
    fn sampling_takes_every_fifteenth_of_last_six_hundred() {
        let events = explored(650, 0);
        let markers = sample_markers(&events, 600, 15);
        assert_eq!(markers.len(), 40);
        assert_eq!(markers[0], events[50].position.unwrap());
        assert_eq!(markers[1], events[65].position.unwrap());
    }

    #[test]
    fn malformed_events_are_excluded() {
        let mut events = explored(3, 0);
        events.insert(1, ExplorationEvent::new(EventKind::NodeExplored));
        events.push(ExplorationEvent::new(EventKind::PathFound));
        let markers = sample_markers(&events, 600, 1);
        assert_eq!(markers.len(), 3);
    }

    #[test]
    fn default_sampler_samples_like_configured_one() {
        let mut log = ExplorationLog::new();
        log.extend(explored(650, 0));
        let mut built = active_sampler();
        let mut defaulted = ExplorationSampler::default();
        defaulted.set_active(true);
        for sampler in [&mut built, &mut defaulted] {
            sampler.notify(ms(0));
            assert_eq!(sampler.poll(ms(199), log.events()), None);
            assert!(sampler.poll(ms(200), log.events()).is_some());
        }
        assert_eq!(defaulted.markers(), built.markers());
        assert_eq!(defaulted.markers().len(), 40);
    }

    #[test]
    fn nineteen_new_events_leave_markers_untouched() {
        let mut sampler = active_sampler();
        let mut log = ExplorationLog::new();
        log.extend(explored(40, 0));
        sampler.notify(ms(0));
        assert!(sampler.is_waiting());
        assert!(sampler.poll(ms(200), log.events()).is_some());
        assert!(!sampler.is_waiting());
        let generation = sampler.layer().generation();
        let before = sampler.markers().to_vec();

        log.extend(explored(19, 40));
        sampler.notify(ms(300));
        assert_eq!(sampler.poll(ms(500), log.events()), None);
        assert_eq!(sampler.layer().generation(), generation);
        assert_eq!(sampler.markers(), before.as_slice());
    }

    #[test]
    fn twenty_new_events_change_markers_after_debounce() {
        let mut sampler = active_sampler();
        let mut log = ExplorationLog::new();
        log.extend(explored(40, 0));
        sampler.notify(ms(0));
        sampler.poll(ms(200), log.events());
        let before = sampler.markers().to_vec();

        log.extend(explored(20, 40));
        sampler.notify(ms(300));
        assert_eq!(sampler.poll(ms(450), log.events()), None);
        let update = sampler.poll(ms(500), log.events());
        assert!(matches!(update, Some(MarkerUpdate::Replace(_))));
        assert_ne!(sampler.markers(), before.as_slice());
    }

    #[test]
    fn burst_of_650_renders_40_markers() {
        let mut sampler = active_sampler();
        let mut log = ExplorationLog::new();
        for (i, event) in explored(650, 0).into_iter().enumerate() {
            log.push(event);
            sampler.notify(Duration::from_micros(i as u64 * 100));
            assert_eq!(sampler.poll(Duration::from_micros(i as u64 * 100), log.events()), None);
        }
        let update = sampler.poll(ms(300), log.events());
        match update {
            Some(MarkerUpdate::Replace(markers)) => assert_eq!(markers.len(), 40),
            other => panic!("expected replacement, got {:?}", other),
        }
        assert_eq!(sampler.layer().generation(), 1);
    }

    #[test]
    fn going_inactive_clears_and_cancels_pending_sample() {
        let mut sampler = active_sampler();
        let mut log = ExplorationLog::new();
        log.extend(explored(100, 0));
        sampler.notify(ms(0));
        sampler.poll(ms(200), log.events());
        assert!(!sampler.markers().is_empty());

        log.extend(explored(100, 100));
        sampler.notify(ms(250));
        assert_eq!(sampler.set_active(false), Some(MarkerUpdate::Clear));
        assert!(sampler.markers().is_empty());
        assert_eq!(sampler.poll(ms(1000), log.events()), None);

        sampler.set_active(true);
        log.clear();
        log.extend(explored(20, 0));
        sampler.notify(ms(2000));
        assert!(sampler.poll(ms(2200), log.events()).is_some());
    }

    #[test]
    fn summary_tracks_counts_and_last_total() {
        let mut events = vec![ExplorationEvent::new(EventKind::CalculationStart)];
        events.extend(explored(5, 0));
        events.push(ExplorationEvent::new(EventKind::PathFound));
        events.push(ExplorationEvent::new(EventKind::Warning).with_message("cost exceeds limit"));
        let mut done = ExplorationEvent::new(EventKind::CalculationComplete);
        done.total_cost = Some(12.5);
        events.push(done);

        let summary = ProgressSummary::from_events(&events);
        assert_eq!(summary.nodes_explored, 5);
        assert_eq!(summary.paths_found, 1);
        assert_eq!(summary.warnings, 1);
        assert!(summary.finished);
        assert_eq!(summary.total_cost, Some(12.5));
        assert_eq!(summary.last_message.as_deref(), Some("cost exceeds limit"));
    }
}
