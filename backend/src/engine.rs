use std::collections::HashMap;

use crate::{
    dataset::{GraphFile, PathKind},
    models::{Activity, Coordinate},
    routing::{LocalProjection, approximate_distance_km, haversine_km},
};
use kdtree::KdTree;
use kdtree::distance::squared_euclidean;
use petgraph::{
    algo::astar,
    graph::{EdgeIndex, EdgeReference, NodeIndex, UnGraph},
    visit::{EdgeFiltered, EdgeRef},
};

/// Trait for pathfinding over the routable network.
///
/// The candidate generator only talks to this seam, so it can run against the
/// production graph or a hand-built one in tests.
///
/// # Contract
/// All implementations must:
/// - Return `None` if no path exists between start and end for the activity
/// - Only traverse edges the activity is allowed on
/// - Be deterministic for a fixed graph and penalty set
pub trait PathFinder: Send + Sync {
    /// Nearest node usable by `activity`, within `max_distance_m` of `target`.
    fn closest_node(
        &self,
        target: Coordinate,
        activity: Activity,
        max_distance_m: f64,
    ) -> Option<NodeIndex>;

    /// Cheapest path where every edge in `penalties` costs more per prior use.
    fn find_path_with_penalties(
        &self,
        start: NodeIndex,
        end: NodeIndex,
        activity: Activity,
        penalties: &EdgePenalties,
    ) -> Option<GraphPath>;

    /// Full geometry of a path, including edge shape points.
    fn expand_path(&self, path: &GraphPath) -> Vec<Coordinate>;

    fn node_coordinate(&self, node: NodeIndex) -> Coordinate;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("graph is empty")]
    EmptyGraph,
    #[error("edge references unknown node {0}")]
    MissingNode(u64),
}

/// A path through the graph as found by A*.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPath {
    pub nodes: Vec<NodeIndex>,
    pub edges: Vec<EdgeIndex>,
    pub cost: f64,
}

/// Per-edge use counts for penalize-and-reroute diversification.
#[derive(Debug, Clone)]
pub struct EdgePenalties {
    factor: f64,
    uses: HashMap<EdgeIndex, u32>,
}

impl EdgePenalties {
    pub fn new(factor: f64) -> Self {
        Self {
            factor: factor.max(1.0),
            uses: HashMap::new(),
        }
    }

    pub fn none() -> Self {
        Self::new(1.0)
    }

    pub fn penalize(&mut self, edges: &[EdgeIndex]) {
        for edge in edges {
            *self.uses.entry(*edge).or_insert(0) += 1;
        }
    }

    pub fn multiplier(&self, edge: EdgeIndex) -> f64 {
        match self.uses.get(&edge) {
            Some(&uses) => self.factor.powi(uses as i32),
            None => 1.0,
        }
    }
}

#[derive(Clone)]
pub struct RouteEngine {
    graph: UnGraph<NodeData, EdgeData>,
    nodes: Vec<NodeData>,
    projection: LocalProjection,
    /// Spatial index for O(log N) nearest node lookup, in projected metres
    spatial_index: KdTree<f64, usize, [f64; 2]>,
}

#[derive(Clone, Debug)]
struct NodeData {
    coord: Coordinate,
}

#[derive(Clone, Debug)]
struct EdgeData {
    length_km: f64,
    kind: PathKind,
    /// Intermediate shape points, ordered from the edge source to its target
    waypoints: Vec<Coordinate>,
}

impl PathFinder for RouteEngine {
    fn closest_node(
        &self,
        target: Coordinate,
        activity: Activity,
        max_distance_m: f64,
    ) -> Option<NodeIndex> {
        RouteEngine::closest_node(self, target, activity, max_distance_m)
    }

    fn find_path_with_penalties(
        &self,
        start: NodeIndex,
        end: NodeIndex,
        activity: Activity,
        penalties: &EdgePenalties,
    ) -> Option<GraphPath> {
        RouteEngine::find_path_with_penalties(self, start, end, activity, penalties)
    }

    fn expand_path(&self, path: &GraphPath) -> Vec<Coordinate> {
        expand_path_with_waypoints(path, &self.graph, &self.nodes)
    }

    fn node_coordinate(&self, node: NodeIndex) -> Coordinate {
        self.nodes[node.index()].coord
    }
}

impl RouteEngine {
    pub fn from_graph_file(graph_file: &GraphFile) -> Result<Self, EngineError> {
        if graph_file.nodes.is_empty() {
            return Err(EngineError::EmptyGraph);
        }
        let mut graph = UnGraph::new_undirected();
        let mut id_to_index = HashMap::new();
        let mut nodes = Vec::with_capacity(graph_file.nodes.len());

        for node in &graph_file.nodes {
            let node_data = NodeData {
                coord: Coordinate {
                    lat: node.lat,
                    lng: node.lng,
                },
            };
            let idx = graph.add_node(node_data.clone());
            id_to_index.insert(node.id, idx);
            nodes.push(node_data);
        }

        for edge in &graph_file.edges {
            let from = *id_to_index
                .get(&edge.from)
                .ok_or(EngineError::MissingNode(edge.from))?;
            let to = *id_to_index
                .get(&edge.to)
                .ok_or(EngineError::MissingNode(edge.to))?;

            let waypoints: Vec<Coordinate> = edge
                .waypoints
                .iter()
                .map(|&[lng, lat]| Coordinate { lat, lng })
                .collect();

            let mut shape = Vec::with_capacity(waypoints.len() + 2);
            shape.push(nodes[from.index()].coord);
            shape.extend_from_slice(&waypoints);
            shape.push(nodes[to.index()].coord);
            let geometric_km = approximate_distance_km(&shape);

            // A* needs edge costs no shorter than the straight line.
            let straight_km = haversine_km(nodes[from.index()].coord, nodes[to.index()].coord);
            let length_km = edge
                .length_m
                .map(|m| m / 1000.0)
                .unwrap_or(geometric_km)
                .max(straight_km);

            graph.add_edge(
                from,
                to,
                EdgeData {
                    length_km,
                    kind: edge.kind,
                    waypoints,
                },
            );
        }

        let projection = LocalProjection::centred_on(nodes.iter().map(|n| n.coord));
        let spatial_index = Self::build_spatial_index(&nodes, &projection);

        tracing::debug!(
            "route engine ready: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            nodes,
            projection,
            spatial_index,
        })
    }

    /// Build KD-Tree spatial index for fast nearest neighbor queries
    /// Complexity: O(N log N) to build, O(log N) to query
    fn build_spatial_index(
        nodes: &[NodeData],
        projection: &LocalProjection,
    ) -> KdTree<f64, usize, [f64; 2]> {
        let mut tree = KdTree::new(2);
        for (idx, node) in nodes.iter().enumerate() {
            if let Err(err) = tree.add(projection.project(node.coord), idx) {
                tracing::warn!("node {:?} left out of the spatial index: {err:?}", node.coord);
            }
        }
        tree
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Find the closest node that has at least one edge usable by `activity`.
    ///
    /// Walks the KD-Tree outward from the target and stops at the radius, so a
    /// node reachable only by stairs is skipped for cyclists in favour of the
    /// next nearest one.
    pub fn closest_node(
        &self,
        target: Coordinate,
        activity: Activity,
        max_distance_m: f64,
    ) -> Option<NodeIndex> {
        let point = self.projection.project(target);
        let max_sq = max_distance_m * max_distance_m;

        let nearest = self
            .spatial_index
            .iter_nearest(&point, &squared_euclidean)
            .ok()?;

        for (dist_sq, &idx) in nearest {
            if dist_sq > max_sq {
                break;
            }
            let node = NodeIndex::new(idx);
            if self.is_usable(node, activity) {
                return Some(node);
            }
        }

        None
    }

    fn is_usable(&self, node: NodeIndex, activity: Activity) -> bool {
        self.graph
            .edges(node)
            .any(|edge| edge.weight().kind.allows(activity))
    }

    pub fn find_path(
        &self,
        start: NodeIndex,
        end: NodeIndex,
        activity: Activity,
    ) -> Option<GraphPath> {
        self.find_path_with_penalties(start, end, activity, &EdgePenalties::none())
    }

    /// A* over the activity-filtered graph.
    ///
    /// ## Cost Function
    /// `f(n) = g(n) + h(n)`
    /// - `g(n)`: sum of `length_km × penalty_factor^uses` along the path
    /// - `h(n)`: haversine distance to the goal, admissible since every
    ///   multiplier is at least 1
    ///
    /// # Returns
    /// - `Some(GraphPath)`: node and edge sequence with its cost
    /// - `None`: no path exists on the filtered graph
    pub fn find_path_with_penalties(
        &self,
        start: NodeIndex,
        end: NodeIndex,
        activity: Activity,
        penalties: &EdgePenalties,
    ) -> Option<GraphPath> {
        let goal = self.nodes[end.index()].coord;
        let filtered = EdgeFiltered::from_fn(&self.graph, |edge: EdgeReference<'_, EdgeData>| {
            edge.weight().kind.allows(activity)
        });

        let heuristic = |idx: NodeIndex| {
            if idx == end {
                0.0
            } else {
                haversine_km(self.nodes[idx.index()].coord, goal)
            }
        };

        let edge_cost = |edge: EdgeReference<'_, EdgeData>| {
            edge.weight().length_km * penalties.multiplier(edge.id())
        };

        let (cost, route) = astar(&filtered, start, |finish| finish == end, edge_cost, heuristic)?;

        let edges = route
            .windows(2)
            .map(|pair| self.cheapest_edge_between(pair[0], pair[1], activity, penalties))
            .collect::<Option<Vec<_>>>()?;

        Some(GraphPath {
            nodes: route,
            edges,
            cost,
        })
    }

    /// A* only reports nodes; recover which parallel edge it actually used.
    fn cheapest_edge_between(
        &self,
        a: NodeIndex,
        b: NodeIndex,
        activity: Activity,
        penalties: &EdgePenalties,
    ) -> Option<EdgeIndex> {
        self.graph
            .edges_connecting(a, b)
            .filter(|edge| edge.weight().kind.allows(activity))
            .map(|edge| (edge.weight().length_km * penalties.multiplier(edge.id()), edge.id()))
            .min_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)))
            .map(|(_, id)| id)
    }
}

/// Expand a node path with the edges' shape points, oriented in travel order.
fn expand_path_with_waypoints(
    path: &GraphPath,
    graph: &UnGraph<NodeData, EdgeData>,
    nodes: &[NodeData],
) -> Vec<Coordinate> {
    let Some(first) = path.nodes.first() else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(path.nodes.len() * 3);
    result.push(nodes[first.index()].coord);

    for (window, &edge) in path.nodes.windows(2).zip(&path.edges) {
        let from_idx = window[0];
        let to_idx = window[1];

        let edge_data = &graph[edge];
        let forward = graph
            .edge_endpoints(edge)
            .map(|(source, _)| source == from_idx)
            .unwrap_or(true);

        if forward {
            result.extend(edge_data.waypoints.iter().copied());
        } else {
            result.extend(edge_data.waypoints.iter().rev().copied());
        }

        result.push(nodes[to_idx.index()].coord);
    }

    result
}
