use crate::models::{Activity, Route, ShadedPath};

/// Display colors, assigned by rank and cycled when there are more routes.
pub const PALETTE: [&str; 5] = ["#059669", "#2563eb", "#f97316", "#7c3aed", "#db2777"];

struct Scored {
    path: ShadedPath,
    average_shade: u8,
    distance_km: f64,
}

/// Turn shaded candidates into the ranked, presentable route list.
///
/// Order: `average_shade` descending, then distance ascending, then the order
/// the candidates were generated in.
pub fn aggregate(paths: Vec<ShadedPath>, activity: Activity) -> Vec<Route> {
    let mut scored: Vec<Scored> = paths
        .into_iter()
        .map(|path| Scored {
            average_shade: average_shade_percent(&path),
            distance_km: path.segments.iter().map(|s| s.length_m).sum::<f64>() / 1000.0,
            path,
        })
        .collect();

    // Stable, so equal keys keep generation order.
    scored.sort_by(|a, b| {
        b.average_shade
            .cmp(&a.average_shade)
            .then(a.distance_km.total_cmp(&b.distance_km))
    });

    let names = route_names(&scored);
    scored
        .into_iter()
        .zip(names)
        .enumerate()
        .map(|(rank, (scored, name))| Route {
            id: rank as u32,
            name,
            route_points: scored.path.points,
            average_shade: scored.average_shade,
            total_distance_km: scored.distance_km,
            estimated_duration_min: estimated_duration_min(scored.distance_km, activity),
            color: PALETTE[rank % PALETTE.len()].to_string(),
        })
        .collect()
}

pub fn estimated_duration_min(distance_km: f64, activity: Activity) -> f64 {
    distance_km / activity.speed_kmh() * 60.0
}

/// Length-weighted mean shade as a whole percentage, rounded half-up.
/// Zero-length paths fall back to the plain mean of their segments.
pub fn average_shade_percent(path: &ShadedPath) -> u8 {
    let segments = &path.segments;
    if segments.is_empty() {
        return 0;
    }

    let total_m: f64 = segments.iter().map(|s| s.length_m).sum();
    let mean = if total_m > 0.0 {
        segments
            .iter()
            .map(|s| s.length_m * s.shade_fraction)
            .sum::<f64>()
            / total_m
    } else {
        segments.iter().map(|s| s.shade_fraction).sum::<f64>() / segments.len() as f64
    };

    // Snap off binary noise so decimal halves like 28.5 round up.
    let percent = (mean * 100.0 * 1e9).round() / 1e9;
    (percent + 0.5).floor().clamp(0.0, 100.0) as u8
}

fn route_names(ranked: &[Scored]) -> Vec<String> {
    let shortest = ranked
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.distance_km.total_cmp(&b.distance_km))
        .map(|(rank, _)| rank);

    let mut alternative = 0;
    (0..ranked.len())
        .map(|rank| {
            if rank == 0 {
                "Shadiest Route".to_string()
            } else if Some(rank) == shortest {
                "Shortest Route".to_string()
            } else {
                alternative += 1;
                format!("Alternative Route {alternative}")
            }
        })
        .collect()
}
