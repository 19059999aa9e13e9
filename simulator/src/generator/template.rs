use dronetrace::{Position, Waypoint};
use rand::Rng;

/// Evenly spaced waypoints from `from` to `to` (both included), with lateral
/// jitter on the interior points.
pub fn straight_leg<R: Rng>(
    from: Position,
    to: Position,
    count: usize,
    jitter: f64,
    rng: &mut R,
) -> Vec<Waypoint> {
    let count = count.max(2);
    (0..count)
        .map(|i| {
            let t = i as f64 / (count - 1) as f64;
            let interior = i != 0 && i != count - 1;
            let (dlat, dlng) = if interior && jitter > 0.0 {
                (rng.gen_range(-jitter..jitter), rng.gen_range(-jitter..jitter))
            } else {
                (0.0, 0.0)
            };
            Waypoint::new(
                from.lat + (to.lat - from.lat) * t + dlat,
                from.lng + (to.lng - from.lng) * t + dlng,
            )
        })
        .collect()
}

/// Random point within `radius` degrees of `around`.
pub fn scatter<R: Rng>(around: Position, radius: f64, rng: &mut R) -> Position {
    if radius <= 0.0 {
        return around;
    }
    Position::new(
        around.lat + rng.gen_range(-radius..radius),
        around.lng + rng.gen_range(-radius..radius),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn straight_leg_keeps_endpoints_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        let from = Position::new(55.0, -3.0);
        let to = Position::new(55.1, -3.2);
        let leg = straight_leg(from, to, 6, 0.001, &mut rng);
        assert_eq!(leg.len(), 6);
        assert_eq!(leg[0].position(), from);
        assert_eq!(leg[5].position(), to);
    }
}
