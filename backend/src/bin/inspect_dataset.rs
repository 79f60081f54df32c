use std::path::PathBuf;

use clap::Parser;
use shadepath::{
    dataset::{
        Dataset, GraphFile, LandmarkFile, MANIFEST_FILE, Manifest, ObstructionFile, read_json,
        write_compressed,
    },
    engine::RouteEngine,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Validate a shadepath dataset directory and optionally compress it"
)]
struct Args {
    /// Directory containing dataset.json
    #[arg(long, default_value = "backend/data/vancouver")]
    dir: PathBuf,

    /// Write `<file>.zst` next to every data file the manifest references
    #[arg(long)]
    compress: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let dataset = Dataset::load(&args.dir)?;
    let engine = RouteEngine::from_graph_file(&dataset.graph)?;

    tracing::info!("dataset {} v{} ({})", dataset.name, dataset.version, dataset.timezone);
    tracing::info!(
        "graph nodes={} edges={}",
        engine.node_count(),
        engine.edge_count()
    );
    tracing::info!(
        "landmarks={} obstructions={} coverage={}",
        dataset.landmarks.len(),
        dataset.obstructions.obstructions.len(),
        if dataset.obstructions.coverage.is_some() { "bounded" } else { "unbounded" }
    );

    if args.compress {
        let manifest: Manifest = read_json(args.dir.join(MANIFEST_FILE))?;

        let graph: GraphFile = read_json(args.dir.join(&manifest.graph))?;
        let written = write_compressed(&graph, args.dir.join(&manifest.graph))?;
        tracing::info!("wrote {:?}", written);

        let landmarks: LandmarkFile = read_json(args.dir.join(&manifest.landmarks))?;
        let written = write_compressed(&landmarks, args.dir.join(&manifest.landmarks))?;
        tracing::info!("wrote {:?}", written);

        let obstructions: ObstructionFile = read_json(args.dir.join(&manifest.obstructions))?;
        let written = write_compressed(&obstructions, args.dir.join(&manifest.obstructions))?;
        tracing::info!("wrote {:?}", written);
    }

    Ok(())
}
