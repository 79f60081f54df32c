//! Hand-built networks shared by unit tests.

use crate::{
    dataset::{EdgeRecord, GraphFile, NodeRecord, PathKind},
    models::Coordinate,
};

const ORIGIN_LAT: f64 = 49.280;
const ORIGIN_LNG: f64 = -123.120;
const LAT_STEP: f64 = 0.001;
const LNG_STEP: f64 = 0.0015;

/// Coordinate of grid cell (`row`, `col`); rows go north, columns east.
pub fn grid_node(row: usize, col: usize) -> Coordinate {
    Coordinate::new(
        ORIGIN_LAT + row as f64 * LAT_STEP,
        ORIGIN_LNG + col as f64 * LNG_STEP,
    )
}

/// `rows` × `cols` lattice, node id `row * cols + col`, every edge of `kind`.
pub fn grid_graph(rows: usize, cols: usize, kind: PathKind) -> GraphFile {
    let id = |row: usize, col: usize| (row * cols + col) as u64;

    let mut nodes = Vec::with_capacity(rows * cols);
    let mut edges = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let coord = grid_node(row, col);
            nodes.push(NodeRecord {
                id: id(row, col),
                lat: coord.lat,
                lng: coord.lng,
            });
            if col + 1 < cols {
                edges.push(edge(id(row, col), id(row, col + 1), kind));
            }
            if row + 1 < rows {
                edges.push(edge(id(row, col), id(row + 1, col), kind));
            }
        }
    }

    GraphFile { nodes, edges }
}

fn edge(from: u64, to: u64, kind: PathKind) -> EdgeRecord {
    EdgeRecord {
        from,
        to,
        kind,
        length_m: None,
        waypoints: Vec::new(),
    }
}
