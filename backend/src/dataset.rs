use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::models::{Activity, Coordinate, Landmark};

pub const MANIFEST_FILE: &str = "dataset.json";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("graph contains no nodes")]
    EmptyGraph,
    #[error("edge references unknown node {0}")]
    MissingNode(u64),
    #[error("duplicate landmark name {0:?}")]
    DuplicateLandmark(String),
    #[error("landmark {0:?} has an out-of-range coordinate")]
    InvalidLandmark(String),
    #[error("node {0} has an out-of-range coordinate")]
    InvalidNode(u64),
    #[error("unknown time zone {0:?}")]
    InvalidTimezone(String),
    #[error("obstruction #{index} has an invalid footprint: {reason}")]
    InvalidFootprint { index: usize, reason: String },
}

/// Kind of way an edge represents; decides which activities may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Street,
    Footway,
    Cycleway,
    Steps,
    Trail,
}

impl PathKind {
    pub fn allows(self, activity: Activity) -> bool {
        match (self, activity) {
            (PathKind::Street | PathKind::Trail, _) => true,
            (PathKind::Steps | PathKind::Footway, Activity::Cycling) => false,
            (PathKind::Steps | PathKind::Footway, _) => true,
            (PathKind::Cycleway, Activity::Cycling) => true,
            (PathKind::Cycleway, _) => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphFile {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: u64,
    pub to: u64,
    pub kind: PathKind,
    /// Measured from geometry when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_m: Option<f64>,
    /// Intermediate shape points, ordered from `from` to `to`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waypoints: Vec<[f64; 2]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LandmarkFile {
    pub landmarks: Vec<Landmark>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstructionKind {
    Building,
    Canopy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObstructionRecord {
    pub kind: ObstructionKind,
    pub height_m: f64,
    /// Closed or open ring of `[lng, lat]` pairs.
    pub footprint: Vec<[f64; 2]>,
    /// Fraction of direct light blocked; defaults by kind when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Coverage {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Coverage {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObstructionFile {
    /// Surveyed area; segments outside it fall back to the baseline shade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
    pub obstructions: Vec<ObstructionRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub timezone: String,
    pub graph: String,
    pub landmarks: String,
    pub obstructions: String,
}

/// The read-only reference data the engine is built from.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub name: String,
    pub version: String,
    pub timezone: Tz,
    pub graph: GraphFile,
    pub landmarks: Vec<Landmark>,
    pub obstructions: ObstructionFile,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        timezone: Tz,
        graph: GraphFile,
        landmarks: Vec<Landmark>,
        obstructions: ObstructionFile,
    ) -> Result<Self, DatasetError> {
        validate_graph(&graph)?;
        validate_landmarks(&landmarks)?;
        validate_obstructions(&obstructions)?;

        Ok(Self {
            name: name.into(),
            version: version.into(),
            timezone,
            graph,
            landmarks,
            obstructions,
        })
    }

    /// Load a dataset directory through its `dataset.json` manifest.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        let manifest: Manifest = read_json(dir.join(MANIFEST_FILE))?;
        let timezone: Tz = manifest
            .timezone
            .parse()
            .map_err(|_| DatasetError::InvalidTimezone(manifest.timezone.clone()))?;

        let graph: GraphFile = read_json(dir.join(&manifest.graph))?;
        let landmarks: LandmarkFile = read_json(dir.join(&manifest.landmarks))?;
        let obstructions: ObstructionFile = read_json(dir.join(&manifest.obstructions))?;

        tracing::info!(
            "loaded dataset {} v{}: {} nodes, {} edges, {} landmarks, {} obstructions",
            manifest.name,
            manifest.version,
            graph.nodes.len(),
            graph.edges.len(),
            landmarks.landmarks.len(),
            obstructions.obstructions.len()
        );

        Self::new(
            manifest.name,
            manifest.version,
            timezone,
            graph,
            landmarks.landmarks,
            obstructions,
        )
    }
}

/// Read a JSON document, preferring a `<path>.zst` sibling when one exists.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, DatasetError> {
    let path = path.as_ref();

    let compressed_path = compressed_path(path);
    if compressed_path.exists() {
        let file = open(&compressed_path)?;
        let decoder = zstd::stream::read::Decoder::new(file).map_err(|source| DatasetError::Io {
            path: compressed_path.clone(),
            source,
        })?;
        return parse(BufReader::new(decoder), &compressed_path);
    }

    let file = open(path)?;
    parse(BufReader::new(file), path)
}

/// Write `value` as zstd-compressed JSON next to `path` (as `<path>.zst`).
pub fn write_compressed<T: Serialize>(
    value: &T,
    path: impl AsRef<Path>,
) -> Result<PathBuf, io::Error> {
    let target = compressed_path(path.as_ref());
    let file = File::create(&target)?;
    // Level 3 = good balance
    let mut encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), 3)?;
    serde_json::to_writer(&mut encoder, value)?;
    encoder.finish()?.flush()?;
    Ok(target)
}

pub fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".zst");
    PathBuf::from(name)
}

fn open(path: &Path) -> Result<File, DatasetError> {
    File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse<T: DeserializeOwned>(reader: impl Read, path: &Path) -> Result<T, DatasetError> {
    serde_json::from_reader(reader).map_err(|source| DatasetError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_graph(graph: &GraphFile) -> Result<(), DatasetError> {
    if graph.nodes.is_empty() {
        return Err(DatasetError::EmptyGraph);
    }
    if let Some(node) = graph
        .nodes
        .iter()
        .find(|n| !Coordinate::new(n.lat, n.lng).is_valid())
    {
        return Err(DatasetError::InvalidNode(node.id));
    }
    let ids: HashSet<u64> = graph.nodes.iter().map(|n| n.id).collect();
    for edge in &graph.edges {
        for id in [edge.from, edge.to] {
            if !ids.contains(&id) {
                return Err(DatasetError::MissingNode(id));
            }
        }
    }
    Ok(())
}

fn validate_landmarks(landmarks: &[Landmark]) -> Result<(), DatasetError> {
    let mut seen = HashSet::new();
    for landmark in landmarks {
        if !landmark.coordinate().is_valid() {
            return Err(DatasetError::InvalidLandmark(landmark.name.clone()));
        }
        if !seen.insert(landmark.name.trim().to_lowercase()) {
            return Err(DatasetError::DuplicateLandmark(landmark.name.clone()));
        }
    }
    Ok(())
}

fn validate_obstructions(file: &ObstructionFile) -> Result<(), DatasetError> {
    for (index, record) in file.obstructions.iter().enumerate() {
        let invalid = |reason: &str| DatasetError::InvalidFootprint {
            index,
            reason: reason.to_string(),
        };
        if record.footprint.len() < 3 {
            return Err(invalid("fewer than 3 vertices"));
        }
        if !(record.height_m.is_finite() && record.height_m >= 0.0) {
            return Err(invalid("height must be finite and non-negative"));
        }
        if record.footprint.iter().flatten().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite vertex"));
        }
        if let Some(opacity) = record.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(invalid("opacity outside [0, 1]"));
            }
        }
    }
    Ok(())
}
