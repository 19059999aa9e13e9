use dronetrace::{Bounds, DronePlayback, FleetRoutePlan, MapContext, Position, Waypoint};
use iced::{
    mouse,
    widget::canvas::{self, Frame, Geometry, Path, Stroke},
    Color, Point, Rectangle, Renderer, Size, Theme,
};

/// Degrees added around the fitted area so single points still get a view.
const MARGIN_DEG: f64 = 0.0005;
const PADDING: f32 = 16.0;

const DRONE_COLORS: [(u8, u8, u8); 5] = [
    (0x21, 0x96, 0xF3),
    (0x4C, 0xAF, 0x50),
    (0xFF, 0x98, 0x00),
    (0xE9, 0x1E, 0x63),
    (0x9C, 0x27, 0xB0),
];

pub fn drone_color(index: usize) -> Color {
    let (r, g, b) = DRONE_COLORS[index % DRONE_COLORS.len()];
    Color::from_rgb8(r, g, b)
}

/// Equirectangular fit of a lat/lng box into the canvas, north up.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    min: Position,
    lng_factor: f64,
    scale: f64,
    offset: (f32, f32),
    height: f32,
}

impl Projection {
    pub fn fit(bounds: Bounds, size: Size, padding: f32) -> Self {
        let min = Position::new(bounds.min.lat - MARGIN_DEG, bounds.min.lng - MARGIN_DEG);
        let max = Position::new(bounds.max.lat + MARGIN_DEG, bounds.max.lng + MARGIN_DEG);
        let lng_factor = bounds.center().lat.to_radians().cos().abs().max(1e-6);
        let span_x = (max.lng - min.lng) * lng_factor;
        let span_y = max.lat - min.lat;
        let avail_w = f64::from((size.width - 2.0 * padding).max(1.0));
        let avail_h = f64::from((size.height - 2.0 * padding).max(1.0));
        let scale = (avail_w / span_x).min(avail_h / span_y);
        let offset = (
            padding + ((avail_w - span_x * scale) / 2.0) as f32,
            padding + ((avail_h - span_y * scale) / 2.0) as f32,
        );
        Self {
            min,
            lng_factor,
            scale,
            offset,
            height: size.height,
        }
    }

    pub fn project(&self, lat: f64, lng: f64) -> Point {
        let x = (lng - self.min.lng) * self.lng_factor * self.scale;
        let y = (lat - self.min.lat) * self.scale;
        Point::new(self.offset.0 + x as f32, self.height - (self.offset.1 + y as f32))
    }
}

#[derive(Debug, Clone)]
struct AreaShape {
    vertices: Vec<Position>,
    opacity: f32,
}

#[derive(Debug, Clone)]
struct DroneSprite {
    color: Color,
    trail: Vec<Waypoint>,
    position: Option<Waypoint>,
    completed: bool,
}

/// One frame's worth of map content, rebuilt on every view.
#[derive(Debug, Clone, Default)]
pub struct FleetMap {
    bounds: Option<Bounds>,
    areas: Vec<AreaShape>,
    service_points: Vec<Position>,
    markers: Vec<Position>,
    deliveries: Vec<Position>,
    drones: Vec<DroneSprite>,
}

impl FleetMap {
    pub fn new(
        airspace: &MapContext,
        plan: Option<&FleetRoutePlan>,
        drones: &[DronePlayback],
        markers: &[Position],
    ) -> Self {
        let corners = plan
            .and_then(FleetRoutePlan::bounds)
            .into_iter()
            .chain(airspace.bounds())
            .flat_map(|area| [area.min, area.max]);
        let bounds =
            Bounds::enclosing(corners).or_else(|| Bounds::enclosing(markers.iter().copied()));
        let areas = airspace
            .restricted_areas
            .iter()
            .filter(|area| area.is_drawable())
            .map(|area| AreaShape {
                vertices: area.vertices.clone(),
                opacity: area.fill_opacity(),
            })
            .collect();
        let service_points = airspace
            .service_points
            .iter()
            .map(|point| point.location)
            .collect();
        let deliveries = plan
            .map(|plan| {
                plan.delivery_points()
                    .into_iter()
                    .map(|point| point.position)
                    .collect()
            })
            .unwrap_or_default();
        let drones = drones
            .iter()
            .enumerate()
            .map(|(index, drone)| DroneSprite {
                color: drone_color(index),
                trail: drone.trail_vec(),
                position: drone.current_position,
                completed: drone.completed,
            })
            .collect();
        Self {
            bounds,
            areas,
            service_points,
            markers: markers.to_vec(),
            deliveries,
            drones,
        }
    }
}

impl<Message> canvas::Program<Message> for FleetMap {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.06, 0.07, 0.09),
        );

        let Some(area) = self.bounds else {
            return vec![frame.into_geometry()];
        };
        let projection = Projection::fit(area, bounds.size(), PADDING);

        for shape in &self.areas {
            let polygon = Path::new(|builder| {
                for (i, vertex) in shape.vertices.iter().enumerate() {
                    let p = projection.project(vertex.lat, vertex.lng);
                    if i == 0 {
                        builder.move_to(p);
                    } else {
                        builder.line_to(p);
                    }
                }
                builder.close();
            });
            frame.fill(&polygon, Color::from_rgba(1.0, 0.0, 0.0, shape.opacity));
            frame.stroke(
                &polygon,
                Stroke::default()
                    .with_width(2.0)
                    .with_color(Color::from_rgba(1.0, 0.0, 0.0, 0.6)),
            );
        }

        for marker in &self.markers {
            let dot = Path::circle(projection.project(marker.lat, marker.lng), 1.5);
            frame.fill(&dot, Color::from_rgba(0.7, 0.7, 0.75, 0.45));
        }

        for drone in &self.drones {
            if drone.trail.len() > 1 {
                let trail = Path::new(|builder| {
                    for (i, point) in drone.trail.iter().enumerate() {
                        let p = projection.project(point.lat, point.lng);
                        if i == 0 {
                            builder.move_to(p);
                        } else {
                            builder.line_to(p);
                        }
                    }
                });
                frame.stroke(
                    &trail,
                    Stroke::default()
                        .with_width(2.0)
                        .with_color(Color { a: 0.6, ..drone.color }),
                );
            }
        }

        for point in &self.service_points {
            let centre = projection.project(point.lat, point.lng);
            let corner = Point::new(centre.x - 5.0, centre.y - 5.0);
            let pin = Path::rectangle(corner, Size::new(10.0, 10.0));
            frame.fill(&pin, Color::from_rgb(0.13, 0.59, 0.95));
            frame.stroke(&pin, Stroke::default().with_width(1.0).with_color(Color::WHITE));
        }

        for delivery in &self.deliveries {
            let pin = Path::circle(projection.project(delivery.lat, delivery.lng), 5.0);
            frame.fill(&pin, Color::from_rgb(0.9, 0.22, 0.2));
        }

        for drone in &self.drones {
            let Some(position) = drone.position else {
                continue;
            };
            let body = Path::circle(projection.project(position.lat, position.lng), 6.0);
            let fill = if drone.completed {
                Color { a: 0.45, ..drone.color }
            } else {
                drone.color
            };
            frame.fill(&body, fill);
            frame.stroke(&body, Stroke::default().with_width(1.5).with_color(Color::WHITE));
        }

        vec![frame.into_geometry()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> Bounds {
        Bounds {
            min: Position::new(55.94, -3.19),
            max: Position::new(55.95, -3.17),
        }
    }

    #[test]
    fn projection_keeps_north_up_and_centred() {
        let size = Size::new(400.0, 300.0);
        let projection = Projection::fit(area(), size, 10.0);
        let centre = area().center();
        let p = projection.project(centre.lat, centre.lng);
        assert!((p.x - 200.0).abs() < 0.5);
        assert!((p.y - 150.0).abs() < 0.5);

        let north = projection.project(55.95, centre.lng);
        let south = projection.project(55.94, centre.lng);
        assert!(north.y < south.y);
    }

    #[test]
    fn projection_stays_inside_padding() {
        let size = Size::new(400.0, 300.0);
        let projection = Projection::fit(area(), size, 10.0);
        for (lat, lng) in [(55.94, -3.19), (55.95, -3.17)] {
            let p = projection.project(lat, lng);
            assert!(p.x >= 10.0 && p.x <= 390.0);
            assert!(p.y >= 10.0 && p.y <= 290.0);
        }
    }

    #[test]
    fn single_point_is_drawable() {
        let point = Position::new(55.9445, -3.1883);
        let bounds = Bounds::enclosing([point]).unwrap();
        let projection = Projection::fit(bounds, Size::new(200.0, 200.0), 0.0);
        let p = projection.project(point.lat, point.lng);
        assert!(p.x.is_finite() && p.y.is_finite());
        assert!((p.x - 100.0).abs() < 0.5);
    }

    #[test]
    fn map_falls_back_to_marker_bounds() {
        let markers = [Position::new(55.9, -3.2), Position::new(56.0, -3.1)];
        let map = FleetMap::new(&MapContext::default(), None, &[], &markers);
        let bounds = map.bounds.unwrap();
        assert_eq!(bounds.min, Position::new(55.9, -3.2));
        assert_eq!(bounds.max, Position::new(56.0, -3.1));
        assert!(map.drones.is_empty());
    }

    #[test]
    fn airspace_is_drawn_and_framed() {
        let airspace: MapContext = serde_json::from_str(
            r#"{
                "servicePoints": [{"name": "Base", "id": 1, "location": {"lat": 55.944, "lng": -3.186}}],
                "restrictedAreas": [
                    {"name": "Square", "id": 1, "limits": {"lower": 0, "upper": 120},
                     "vertices": [{"lat": 55.95, "lng": -3.19}, {"lat": 55.95, "lng": -3.18},
                                  {"lat": 55.96, "lng": -3.18}]},
                    {"name": "Line", "id": 2,
                     "vertices": [{"lat": 55.9, "lng": -3.2}, {"lat": 55.9, "lng": -3.1}]}
                ]
            }"#,
        )
        .unwrap();
        let markers = [Position::new(50.0, 0.0)];
        let map = FleetMap::new(&airspace, None, &[], &markers);
        assert_eq!(map.areas.len(), 1);
        assert_eq!(map.areas[0].opacity, 0.3);
        assert_eq!(map.service_points, vec![Position::new(55.944, -3.186)]);
        let bounds = map.bounds.unwrap();
        assert_eq!(bounds.min, Position::new(55.9, -3.2));
        assert_eq!(bounds.max, Position::new(55.96, -3.1));
    }
}
