use super::plan::GeneratorConfig;
use super::template::scatter;
use dronetrace::{AltitudeLimits, MapContext, Position, RestrictedArea, ServicePoint};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::TAU;

const AREA_SIDES: usize = 6;
const AREA_NAMES: [&str; 4] = ["Hospital helipad", "Castle approach", "Stadium", "Rail yard"];

/// Service point at the base plus a handful of hexagonal no-fly areas around
/// it. Deterministic for a given seed.
pub fn build_map_context(config: &GeneratorConfig) -> MapContext {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(2));
    let service_points = vec![ServicePoint {
        name: "Base".into(),
        id: 1,
        location: config.base,
    }];

    let restricted_areas = (0..config.restricted_areas)
        .map(|index| {
            let centre = scatter(config.base, config.spread_deg, &mut rng);
            let upper = if rng.gen_bool(0.5) { 60.0 } else { 150.0 };
            RestrictedArea {
                name: AREA_NAMES[index % AREA_NAMES.len()].into(),
                id: index as u64 + 1,
                limits: Some(AltitudeLimits { lower: 0.0, upper }),
                vertices: hexagon(centre, config.area_radius_deg),
            }
        })
        .collect();

    MapContext {
        service_points,
        restricted_areas,
    }
}

fn hexagon(centre: Position, radius: f64) -> Vec<Position> {
    (0..AREA_SIDES)
        .map(|i| {
            let angle = TAU * i as f64 / AREA_SIDES as f64;
            Position::new(
                centre.lat + radius * angle.sin(),
                centre.lng + radius * angle.cos(),
            )
        })
        .collect()
}
