//! Incremental visualization core for the drone delivery planner.
//!
//! The modules turn a live stream of exploration events into a bounded marker
//! set, and replay a finished fleet route plan as per-drone motion driven by
//! an explicit tick scheduler. [`airspace`] carries the static service points
//! and no-fly areas drawn underneath both.

pub mod airspace;
pub mod controller;
pub mod exploration;
pub mod playback;
pub mod prelude;
pub mod route;
pub mod scheduler;
pub mod telemetry;

pub use airspace::{AltitudeLimits, MapContext, RestrictedArea, ServicePoint};
pub use controller::{PlaybackController, PlaybackSink, PlaybackStatus};
pub use exploration::{
    EventKind, ExplorationEvent, ExplorationLog, ExplorationSampler, MarkerUpdate, ProgressSummary,
};
pub use playback::{DronePlayback, PlaybackEngine, TickOutcome};
pub use prelude::{CoreError, CoreResult, PlaybackConfig, SamplerConfig};
pub use route::{Bounds, DeliveryLeg, DeliveryPoint, DroneRoute, FleetRoutePlan, Position, Waypoint};
pub use scheduler::{FrameScheduler, TickHandle, TickScheduler};
