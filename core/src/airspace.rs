//! Static map context served next to a plan: the launch sites drones fly
//! from and the no-fly polygons they must keep out of.

use crate::route::{Bounds, Position};
use serde::{Deserialize, Serialize};

/// Launch and return site for the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePoint {
    pub name: String,
    pub id: u64,
    pub location: Position,
}

/// Altitude band, in metres, that a restricted area covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AltitudeLimits {
    pub lower: f64,
    pub upper: f64,
}

/// No-fly polygon. Vertices are in drawing order; the ring is closed
/// implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictedArea {
    pub name: String,
    pub id: u64,
    #[serde(default)]
    pub limits: Option<AltitudeLimits>,
    pub vertices: Vec<Position>,
}

impl RestrictedArea {
    /// Polygons with fewer than three vertices have no area to draw.
    pub fn is_drawable(&self) -> bool {
        self.vertices.len() >= 3
    }

    /// Taller altitude bands are shaded more heavily.
    pub fn fill_opacity(&self) -> f32 {
        match self.limits {
            Some(limits) if limits.upper - limits.lower > 100.0 => 0.3,
            Some(limits) if limits.upper - limits.lower > 50.0 => 0.25,
            _ => 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapContext {
    #[serde(default)]
    pub service_points: Vec<ServicePoint>,
    #[serde(default)]
    pub restricted_areas: Vec<RestrictedArea>,
}

impl MapContext {
    pub fn is_empty(&self) -> bool {
        self.service_points.is_empty() && self.restricted_areas.is_empty()
    }

    /// Box around every service point and polygon vertex.
    pub fn bounds(&self) -> Option<Bounds> {
        let points = self.service_points.iter().map(|point| point.location);
        let vertices = self
            .restricted_areas
            .iter()
            .flat_map(|area| area.vertices.iter().copied());
        Bounds::enclosing(points.chain(vertices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str = r#"{
        "servicePoints": [
            {"name": "Appleton Tower", "id": 1, "location": {"lng": -3.1863, "lat": 55.9444, "alt": 50}}
        ],
        "restrictedAreas": [
            {"name": "George Square", "id": 1, "limits": {"lower": 0, "upper": -1},
             "vertices": [{"lng": -3.1901, "lat": 55.9439}, {"lng": -3.1870, "lat": 55.9439},
                          {"lng": -3.1870, "lat": 55.9424}, {"lng": -3.1901, "lat": 55.9424}]},
            {"name": "Tall", "id": 2, "limits": {"lower": 0, "upper": 120},
             "vertices": [{"lng": -3.20, "lat": 55.95}, {"lng": -3.19, "lat": 55.95}, {"lng": -3.19, "lat": 55.96}]},
            {"name": "Sliver", "id": 3, "vertices": [{"lng": -3.1, "lat": 55.9}, {"lng": -3.0, "lat": 55.9}]}
        ]
    }"#;

    #[test]
    fn decodes_planner_context() {
        let context: MapContext = serde_json::from_str(CONTEXT).unwrap();
        assert_eq!(context.service_points[0].location, Position::new(55.9444, -3.1863));
        assert_eq!(context.restricted_areas.len(), 3);
        assert!(context.restricted_areas[2].limits.is_none());
        assert!(!context.is_empty());
    }

    #[test]
    fn opacity_follows_altitude_band() {
        let context: MapContext = serde_json::from_str(CONTEXT).unwrap();
        let opacities: Vec<f32> = context
            .restricted_areas
            .iter()
            .map(RestrictedArea::fill_opacity)
            .collect();
        assert_eq!(opacities, vec![0.2, 0.3, 0.2]);
        assert!(!context.restricted_areas[2].is_drawable());
    }

    #[test]
    fn bounds_cover_points_and_vertices() {
        let context: MapContext = serde_json::from_str(CONTEXT).unwrap();
        let bounds = context.bounds().unwrap();
        assert_eq!(bounds.min, Position::new(55.9, -3.20));
        assert_eq!(bounds.max, Position::new(55.96, -3.0));
        assert!(MapContext::default().bounds().is_none());
    }
}
