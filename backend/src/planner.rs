//! Request orchestration: resolve, generate, shade in parallel, rank.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use chrono_tz::Tz;
use rayon::prelude::*;

use crate::{
    candidates::{self, Unreachable},
    config::EngineConfig,
    dataset::Dataset,
    engine::{EngineError, RouteEngine},
    error::{Field, PlanError},
    models::{Landmark, Route, RouteRequest, ShadedPath},
    ranking,
    resolver::LocationResolver,
    routing::midpoint,
    shade::ObstructionLayer,
    sun_position::sun_position,
};

/// Everything needed to answer route requests for one dataset.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct RoutePlanner {
    dataset_name: String,
    timezone: Tz,
    resolver: LocationResolver,
    engine: RouteEngine,
    obstructions: ObstructionLayer,
    config: EngineConfig,
}

impl RoutePlanner {
    pub fn new(dataset: Dataset, config: EngineConfig) -> Result<Self, EngineError> {
        let engine = RouteEngine::from_graph_file(&dataset.graph)?;
        let obstructions = ObstructionLayer::new(&dataset.obstructions, config.shade.clone());

        tracing::info!(
            "planner ready for {} v{} ({}): {} nodes, {} footprints, up to {} candidates",
            dataset.name,
            dataset.version,
            dataset.timezone,
            engine.node_count(),
            obstructions.len(),
            config.max_candidates
        );

        Ok(Self {
            dataset_name: dataset.name,
            timezone: dataset.timezone,
            resolver: LocationResolver::new(dataset.landmarks),
            engine,
            obstructions,
            config,
        })
    }

    pub fn landmarks(&self) -> &[Landmark] {
        self.resolver.landmarks()
    }

    pub fn suggest(&self, query: &str) -> Vec<Landmark> {
        self.resolver.suggest(query)
    }

    /// Plan a request to completion on the calling thread.
    pub fn plan(&self, request: &RouteRequest) -> Result<Vec<Route>, PlanError> {
        self.plan_cancellable(request, &AtomicBool::new(false))
    }

    /// Plan a request, abandoning it with `RouteComputationTimeout` once
    /// `cancel` is raised.
    pub fn plan_cancellable(
        &self,
        request: &RouteRequest,
        cancel: &AtomicBool,
    ) -> Result<Vec<Route>, PlanError> {
        let started = Instant::now();
        let activity = request.activity();

        let start = self.resolver.resolve(request.start(), Field::Start)?;
        let end = self.resolver.resolve(request.end(), Field::End)?;

        let sun = sun_position(request.date(), request.time(), self.timezone, midpoint(start, end))
            .ok_or_else(|| {
                PlanError::invalid(
                    Field::Time,
                    format!(
                        "{} {} does not exist in {} (daylight-saving gap)",
                        request.date(),
                        request.time().format("%H:%M"),
                        self.timezone
                    ),
                )
            })?;
        tracing::debug!(
            "sun at {:.1}° altitude, {:.1}° azimuth",
            sun.altitude_deg,
            sun.azimuth_deg
        );

        let candidates = candidates::generate(&self.engine, start, end, activity, &self.config)
            .map_err(|Unreachable(field)| PlanError::NoRouteFound { field })?;

        if cancel.load(Ordering::Relaxed) {
            return Err(PlanError::RouteComputationTimeout);
        }

        let shaded: Option<Vec<ShadedPath>> = candidates
            .into_par_iter()
            .map(|candidate| {
                let segments = self
                    .obstructions
                    .estimate_cancellable(&candidate.points, sun, cancel)?;
                Some(ShadedPath {
                    points: candidate.points,
                    segments,
                })
            })
            .collect();
        let shaded = shaded.ok_or(PlanError::RouteComputationTimeout)?;

        let routes = ranking::aggregate(shaded, activity);
        tracing::info!(
            "planned {} {activity} route(s) in {} {:?} -> {:?} in {:?}",
            routes.len(),
            self.dataset_name,
            request.start(),
            request.end(),
            started.elapsed()
        );
        Ok(routes)
    }

    /// Plan on the blocking pool, giving up after `timeout`.
    ///
    /// Workers are told to stop when the deadline passes or when the returned
    /// future is dropped before completion.
    pub async fn plan_with_timeout(
        self: Arc<Self>,
        request: RouteRequest,
        timeout: Duration,
    ) -> Result<Vec<Route>, PlanError> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.plan_with_flag(request, timeout, cancel).await
    }

    async fn plan_with_flag(
        self: Arc<Self>,
        request: RouteRequest,
        timeout: Duration,
        cancel: Arc<AtomicBool>,
    ) -> Result<Vec<Route>, PlanError> {
        let _guard = CancelOnDrop(Arc::clone(&cancel));

        let flag = Arc::clone(&cancel);
        let task = tokio::task::spawn_blocking(move || self.plan_cancellable(&request, &flag));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Ok(Err(_)) => Err(PlanError::RouteComputationTimeout),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                tracing::warn!("route computation exceeded {timeout:?}, cancelled");
                Err(PlanError::RouteComputationTimeout)
            }
        }
    }
}

/// Raises the flag when dropped, including when a request future is abandoned.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::{ObstructionFile, PathKind},
        models::Coordinate,
        test_fixtures::{grid_graph, grid_node},
    };

    fn sample_planner() -> RoutePlanner {
        let dataset = Dataset::load(concat!(env!("CARGO_MANIFEST_DIR"), "/data/vancouver"))
            .expect("sample dataset");
        RoutePlanner::new(dataset, EngineConfig::default()).expect("planner")
    }

    fn request(start: &str, end: &str, date: &str, time: &str, activity: &str) -> RouteRequest {
        RouteRequest::try_from(shared::RouteRequest {
            start: start.into(),
            end: end.into(),
            date: date.into(),
            time: time.into(),
            activity: activity.into(),
        })
        .unwrap()
    }

    fn midday_walk() -> RouteRequest {
        request("Stanley Park", "Science World", "2024-06-21", "12:00", "walking")
    }

    fn literal(c: Coordinate) -> String {
        format!("{},{}", c.lat, c.lng)
    }

    #[test]
    fn stanley_park_to_science_world_at_midday() {
        let planner = sample_planner();
        let routes = planner.plan(&midday_walk()).unwrap();

        assert!((1..=3).contains(&routes.len()), "{} routes", routes.len());
        let stanley = Coordinate::new(49.3017, -123.1417);
        let science_world = Coordinate::new(49.2734, -123.1038);

        for (rank, route) in routes.iter().enumerate() {
            assert_eq!(route.id, rank as u32);
            assert!(route.route_points.len() >= 2);
            assert_eq!(route.route_points[0], stanley);
            assert_eq!(*route.route_points.last().unwrap(), science_world);
            assert!(route.average_shade <= 100);
            assert!(route.total_distance_km > 0.0);
            let expected = route.total_distance_km / 5.0 * 60.0;
            assert!((route.estimated_duration_min - expected).abs() < 1e-9);
        }

        for pair in routes.windows(2) {
            assert!(
                pair[0].average_shade > pair[1].average_shade
                    || (pair[0].average_shade == pair[1].average_shade
                        && pair[0].total_distance_km <= pair[1].total_distance_km)
            );
        }
        assert_eq!(routes[0].name, "Shadiest Route");
    }

    #[test]
    fn identical_requests_serialize_identically() {
        let planner = sample_planner();
        let first = serde_json::to_string(&planner.plan(&midday_walk()).unwrap()).unwrap();
        let second = serde_json::to_string(&planner.plan(&midday_walk()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn night_routes_are_fully_shaded() {
        let planner = sample_planner();
        let night = request("Canada Place", "BC Place", "2024-06-21", "23:30", "running");
        let routes = planner.plan(&night).unwrap();
        assert!(!routes.is_empty());
        assert!(routes.iter().all(|r| r.average_shade == 100));
    }

    #[test]
    fn unknown_start_is_reported_on_start() {
        let planner = sample_planner();
        let req = request(
            "Nonexistent Place Zzz",
            "Science World",
            "2024-06-21",
            "12:00",
            "walking",
        );
        assert_eq!(
            planner.plan(&req),
            Err(PlanError::LocationNotResolved {
                field: Field::Start,
                query: "Nonexistent Place Zzz".into(),
            })
        );
    }

    #[test]
    fn ambiguous_end_lists_candidates() {
        let planner = sample_planner();
        let req = request("Canada Place", "park", "2024-06-21", "12:00", "walking");
        match planner.plan(&req) {
            Err(PlanError::AmbiguousLocation { field, candidates, .. }) => {
                assert_eq!(field, Field::End);
                assert!(candidates.len() >= 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn skipped_local_time_is_invalid() {
        let planner = sample_planner();
        let req = request("Canada Place", "BC Place", "2024-03-10", "02:30", "walking");
        assert!(matches!(
            planner.plan(&req),
            Err(PlanError::InvalidRequest { field: Field::Time, .. })
        ));
    }

    #[test]
    fn endpoint_off_the_network_has_no_route() {
        let planner = sample_planner();
        let req = request("Canada Place", "48.8566,2.3522", "2024-06-21", "12:00", "walking");
        assert_eq!(
            planner.plan(&req),
            Err(PlanError::NoRouteFound { field: Field::End })
        );
    }

    #[test]
    fn disconnected_for_cyclists_yields_empty_list() {
        // Rows joined only by steps.
        let mut graph = grid_graph(2, 3, PathKind::Street);
        for edge in &mut graph.edges {
            if edge.to - edge.from == 3 {
                edge.kind = PathKind::Steps;
            }
        }
        let dataset = Dataset::new(
            "grid",
            "1",
            chrono_tz::America::Vancouver,
            graph,
            Vec::new(),
            ObstructionFile::default(),
        )
        .unwrap();
        let planner = RoutePlanner::new(dataset, EngineConfig::default()).unwrap();

        let start = literal(grid_node(0, 0));
        let end = literal(grid_node(1, 2));
        let ride = request(&start, &end, "2024-06-21", "12:00", "cycling");
        assert_eq!(planner.plan(&ride), Ok(Vec::new()));

        let walk = request(&start, &end, "2024-06-21", "12:00", "walking");
        assert!(!planner.plan(&walk).unwrap().is_empty());
    }

    #[test]
    fn raised_flag_abandons_the_request() {
        let planner = sample_planner();
        let cancel = AtomicBool::new(true);
        assert_eq!(
            planner.plan_cancellable(&midday_walk(), &cancel),
            Err(PlanError::RouteComputationTimeout)
        );
    }

    #[tokio::test]
    async fn timeout_variant_matches_direct_plan() {
        let planner = Arc::new(sample_planner());
        let direct = planner.plan(&midday_walk()).unwrap();
        let timed = Arc::clone(&planner)
            .plan_with_timeout(midday_walk(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(direct, timed);
    }

    #[tokio::test]
    async fn expired_deadline_is_a_timeout() {
        let planner = Arc::new(sample_planner());
        let result = planner.plan_with_timeout(midday_walk(), Duration::ZERO).await;
        assert_eq!(result, Err(PlanError::RouteComputationTimeout));
    }

    #[tokio::test]
    async fn dropping_the_request_raises_the_flag() {
        let planner = Arc::new(sample_planner());
        let cancel = Arc::new(AtomicBool::new(false));
        let mut pending = Box::pin(planner.plan_with_flag(
            midday_walk(),
            Duration::from_secs(30),
            Arc::clone(&cancel),
        ));

        // One poll starts the blocking work, then the caller goes away.
        tokio::select! {
            biased;
            _ = &mut pending => {}
            _ = std::future::ready(()) => {}
        }
        drop(pending);

        assert!(cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn guard_raises_its_flag_on_drop() {
        let cancel = Arc::new(AtomicBool::new(false));
        let guard = CancelOnDrop(Arc::clone(&cancel));
        assert!(!cancel.load(Ordering::Relaxed));
        drop(guard);
        assert!(cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn suggest_and_landmarks_come_from_the_dataset() {
        let planner = sample_planner();
        assert!(planner.landmarks().len() >= 10);
        let names: Vec<String> = planner.suggest("science").into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Science World"]);
    }
}
