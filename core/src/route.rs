use crate::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize};

/// Bare map coordinate carried by exploration events and markers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Single point of a drone flight path as produced by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Waypoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            altitude: None,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng)
    }
}

/// One delivery run. A `None` id marks a non-delivery leg such as the return
/// to base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLeg {
    #[serde(default, deserialize_with = "delivery_id")]
    pub delivery_id: Option<String>,
    #[serde(default)]
    pub flight_path: Vec<Waypoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneRoute {
    pub drone_id: String,
    #[serde(default)]
    pub deliveries: Vec<DeliveryLeg>,
}

impl DroneRoute {
    /// Takeoff position: the first waypoint of the first non-empty leg.
    pub fn takeoff(&self) -> Option<(usize, Waypoint)> {
        self.deliveries
            .iter()
            .enumerate()
            .find_map(|(idx, leg)| leg.flight_path.first().map(|wp| (idx, *wp)))
    }
}

/// Result of a completed calculation. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetRoutePlan {
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_moves: u64,
    pub drone_paths: Vec<DroneRoute>,
}

/// Fixed marker at the end of a delivery leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryPoint {
    pub delivery_id: String,
    pub drone_id: String,
    pub position: Position,
}

/// Lat/lng bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Position,
    pub max: Position,
}

impl Bounds {
    pub fn center(&self) -> Position {
        Position::new(
            (self.min.lat + self.max.lat) / 2.0,
            (self.min.lng + self.max.lng) / 2.0,
        )
    }

    /// Smallest box holding every position; `None` when there are none.
    pub fn enclosing<I: IntoIterator<Item = Position>>(positions: I) -> Option<Self> {
        let mut positions = positions.into_iter();
        let first = positions.next()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for position in positions {
            bounds.include(position);
        }
        Some(bounds)
    }

    fn include(&mut self, position: Position) {
        self.min.lat = self.min.lat.min(position.lat);
        self.min.lng = self.min.lng.min(position.lng);
        self.max.lat = self.max.lat.max(position.lat);
        self.max.lng = self.max.lng.max(position.lng);
    }
}

impl FleetRoutePlan {
    /// Decodes and validates a plan received from the planner transport.
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        let plan: FleetRoutePlan = serde_json::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Rejects coordinates that cannot be projected at all. Values are not
    /// range checked; flight paths are the planner's business.
    pub fn validate(&self) -> CoreResult<()> {
        for route in &self.drone_paths {
            for (leg_idx, leg) in route.deliveries.iter().enumerate() {
                for (wp_idx, wp) in leg.flight_path.iter().enumerate() {
                    if !wp.lat.is_finite() || !wp.lng.is_finite() {
                        return Err(CoreError::InvalidPlan(format!(
                            "drone {} leg {} waypoint {} has unusable coordinates ({}, {})",
                            route.drone_id, leg_idx, wp_idx, wp.lat, wp.lng
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn waypoint_count(&self) -> usize {
        self.drone_paths
            .iter()
            .flat_map(|route| route.deliveries.iter())
            .map(|leg| leg.flight_path.len())
            .sum()
    }

    /// End points of every leg that carries a delivery id.
    pub fn delivery_points(&self) -> Vec<DeliveryPoint> {
        let mut points = Vec::new();
        for route in &self.drone_paths {
            for leg in &route.deliveries {
                if let (Some(id), Some(last)) = (&leg.delivery_id, leg.flight_path.last()) {
                    points.push(DeliveryPoint {
                        delivery_id: id.clone(),
                        drone_id: route.drone_id.clone(),
                        position: last.position(),
                    });
                }
            }
        }
        points
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::enclosing(
            self.drone_paths
                .iter()
                .flat_map(|route| route.deliveries.iter())
                .flat_map(|leg| leg.flight_path.iter())
                .map(Waypoint::position),
        )
    }
}

/// Planner builds disagree on whether delivery ids are numbers or strings.
fn delivery_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}
