use crate::{
    config::EngineConfig,
    engine::{EdgePenalties, GraphPath, PathFinder},
    error::Field,
    models::{Activity, Coordinate, PathCandidate},
    routing::{approximate_distance_km, densify, haversine_m},
};

/// Requested points closer than this to their snapped node reuse the node's slot.
const ENDPOINT_MERGE_M: f64 = 1.0;
const REROUTE_ATTEMPTS_PER_CANDIDATE: usize = 3;

/// An endpoint could not be attached to the network for the activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not within reach of the path network")]
pub struct Unreachable(pub Field);

/// Generate up to `max_candidates` diverse paths from `start` to `end`.
///
/// # Algorithm: Penalize-and-Reroute
///
/// 1. **Shortest**: A* over the activity-filtered graph
/// 2. **Penalize**: every edge of the last path found costs
///    `penalty_factor` times more per use
/// 3. **Reroute**: A* again under the accumulated penalties
///
/// A rerouted path is kept only if it differs from every accepted path and is
/// no longer than `detour_factor` × the shortest one. Search stops after
/// `3 × max_candidates` reroutes or when no path exists at all.
///
/// # Returns
/// - `Ok(vec![])`: both endpoints are on the network but not connected
/// - `Ok(candidates)`: shortest first, then alternatives in discovery order
/// - `Err(Unreachable)`: an endpoint has no usable node within the snap radius
pub fn generate<P: PathFinder + ?Sized>(
    finder: &P,
    start: Coordinate,
    end: Coordinate,
    activity: Activity,
    config: &EngineConfig,
) -> Result<Vec<PathCandidate>, Unreachable> {
    let start_node = finder
        .closest_node(start, activity, config.max_snap_distance_m)
        .ok_or(Unreachable(Field::Start))?;
    let end_node = finder
        .closest_node(end, activity, config.max_snap_distance_m)
        .ok_or(Unreachable(Field::End))?;

    if config.max_candidates == 0 {
        return Ok(Vec::new());
    }

    let mut penalties = EdgePenalties::new(config.penalty_factor);
    let Some(shortest) = finder.find_path_with_penalties(start_node, end_node, activity, &penalties)
    else {
        tracing::info!("no {activity} path between {start:?} and {end:?}");
        return Ok(Vec::new());
    };
    penalties.penalize(&shortest.edges);

    let first = build_candidate(finder, &shortest, start, end, config.max_segment_m);
    let length_limit_km = first.length_km * config.detour_factor;
    tracing::debug!(
        "shortest {activity} path: {:.3}km over {} edges",
        first.length_km,
        first.edges.len()
    );

    let mut accepted = vec![first];
    let attempts = config.max_candidates * REROUTE_ATTEMPTS_PER_CANDIDATE;

    for attempt in 1..=attempts {
        if accepted.len() >= config.max_candidates {
            break;
        }
        let Some(path) = finder.find_path_with_penalties(start_node, end_node, activity, &penalties)
        else {
            break;
        };
        penalties.penalize(&path.edges);

        if accepted.iter().any(|c| c.edges == path.edges) {
            tracing::debug!("reroute #{attempt}: rejected, same edges as an accepted path");
            continue;
        }

        let candidate = build_candidate(finder, &path, start, end, config.max_segment_m);
        if candidate.length_km > length_limit_km {
            tracing::debug!(
                "reroute #{attempt}: rejected, {:.3}km exceeds detour limit {:.3}km",
                candidate.length_km,
                length_limit_km
            );
            continue;
        }

        tracing::debug!(
            "reroute #{attempt}: accepted alternative {} ({:.3}km)",
            accepted.len(),
            candidate.length_km
        );
        accepted.push(candidate);
    }

    Ok(accepted)
}

/// Turn a graph path into route geometry anchored on the requested points.
fn build_candidate<P: PathFinder + ?Sized>(
    finder: &P,
    path: &GraphPath,
    start: Coordinate,
    end: Coordinate,
    max_segment_m: f64,
) -> PathCandidate {
    let mut points = finder.expand_path(path);

    match points.first_mut() {
        Some(first) if haversine_m(start, *first) <= ENDPOINT_MERGE_M => *first = start,
        _ => points.insert(0, start),
    }
    let count = points.len();
    match points.last_mut() {
        Some(last) if count >= 2 && haversine_m(*last, end) <= ENDPOINT_MERGE_M => *last = end,
        _ => points.push(end),
    }

    let points = densify(&points, max_segment_m);
    PathCandidate {
        length_km: approximate_distance_km(&points),
        points,
        edges: path.edges.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::PathKind,
        engine::RouteEngine,
        test_fixtures::{grid_graph, grid_node},
    };

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn grid_engine() -> RouteEngine {
        RouteEngine::from_graph_file(&grid_graph(4, 4, PathKind::Street)).unwrap()
    }

    #[test]
    fn returns_shortest_first_and_diverse_alternatives() {
        let engine = grid_engine();
        let start = grid_node(0, 0);
        let end = grid_node(3, 3);

        let candidates = generate(&engine, start, end, Activity::Walking, &config()).unwrap();
        assert_eq!(candidates.len(), 3);

        let shortest = candidates[0].length_km;
        for (i, candidate) in candidates.iter().enumerate() {
            assert!(candidate.length_km >= shortest - 1e-9);
            assert!(candidate.length_km <= shortest * 1.6);
            for other in &candidates[i + 1..] {
                assert_ne!(candidate.edges, other.edges);
            }
        }
    }

    #[test]
    fn geometry_is_anchored_and_dense() {
        let engine = grid_engine();
        // Slightly off the grid, so both endpoints need a connector.
        let start = Coordinate::new(grid_node(0, 0).lat - 0.0003, grid_node(0, 0).lng);
        let end = grid_node(2, 3);

        let candidates = generate(&engine, start, end, Activity::Walking, &config()).unwrap();
        assert!(!candidates.is_empty());
        for candidate in &candidates {
            assert_eq!(candidate.points[0], start);
            assert_eq!(*candidate.points.last().unwrap(), end);
            for pair in candidate.points.windows(2) {
                assert!(haversine_m(pair[0], pair[1]) <= 25.0 + 1e-3);
            }
        }
    }

    #[test]
    fn off_network_end_gets_a_connector() {
        let engine = grid_engine();
        let node = grid_node(1, 3);
        // About 45 m east of the last grid column.
        let end = Coordinate::new(node.lat, node.lng + 0.0006);

        let candidates = generate(&engine, grid_node(0, 0), end, Activity::Walking, &config());
        let candidates = candidates.unwrap();
        assert!(!candidates.is_empty());
        for candidate in &candidates {
            let points = &candidate.points;
            assert_eq!(*points.last().unwrap(), end);
            assert!(points.contains(&node));
            for pair in points.windows(2) {
                assert!(haversine_m(pair[0], pair[1]) <= 25.0 + 1e-3);
            }
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let engine = grid_engine();
        let run = || {
            generate(&engine, grid_node(0, 0), grid_node(3, 2), Activity::Running, &config())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn detour_bound_discards_long_alternatives() {
        let engine = grid_engine();
        let config = EngineConfig {
            detour_factor: 1.0,
            ..EngineConfig::default()
        };
        // A straight run along one grid row has no equally short alternative.
        let (start, end) = (grid_node(0, 0), grid_node(0, 3));
        let candidates = generate(&engine, start, end, Activity::Walking, &config).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn disconnected_network_yields_no_candidates() {
        // Steps are the only link between the two rows for cyclists.
        let mut graph = grid_graph(2, 3, PathKind::Street);
        for edge in &mut graph.edges {
            let vertical = (edge.from as i64 - edge.to as i64).abs() == 3;
            if vertical {
                edge.kind = PathKind::Steps;
            }
        }
        let engine = RouteEngine::from_graph_file(&graph).unwrap();

        let (start, end) = (grid_node(0, 0), grid_node(1, 2));
        let ride = generate(&engine, start, end, Activity::Cycling, &config());
        assert_eq!(ride, Ok(Vec::new()));

        let walk = generate(&engine, start, end, Activity::Walking, &config());
        assert!(!walk.unwrap().is_empty());
    }

    #[test]
    fn far_endpoint_is_unreachable() {
        let engine = grid_engine();
        let far = Coordinate::new(48.8566, 2.3522);
        assert_eq!(
            generate(&engine, grid_node(0, 0), far, Activity::Walking, &config()),
            Err(Unreachable(Field::End))
        );
        assert_eq!(
            generate(&engine, far, grid_node(0, 0), Activity::Walking, &config()),
            Err(Unreachable(Field::Start))
        );
    }

    #[test]
    fn same_start_and_end_gives_a_two_point_route() {
        let engine = grid_engine();
        let here = grid_node(1, 1);
        let candidates = generate(&engine, here, here, Activity::Walking, &config()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].points, vec![here, here]);
        assert_eq!(candidates[0].length_km, 0.0);
    }
}
