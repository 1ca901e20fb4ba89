use anyhow::Result;
use bike_crash_atlas::application::TrafficNetworkLoader;
use bike_crash_atlas::domain::BBox;
use bike_crash_atlas::infrastructure::{save_graph, JsonlNetworkSource};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Build and cache the processed bike network for a bounding box")]
struct Args {
    #[arg(short, long, help = "OSM network export (JSONL)")]
    network: PathBuf,
    #[arg(long)]
    north: f64,
    #[arg(long)]
    south: f64,
    #[arg(long)]
    east: f64,
    #[arg(long)]
    west: f64,
    #[arg(long, default_value = "cache/traffic_network")]
    cache_dir: PathBuf,
    #[arg(long, default_value = "bike")]
    network_type: String,
    #[arg(long, default_value = "", help = r#"Tag filter, e.g. ["highway"="cycleway"]"#)]
    filter: String,
    #[arg(short, long, help = "Also write the processed graph to this file")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let bbox = BBox::new(args.north, args.south, args.east, args.west);
    let mut loader = TrafficNetworkLoader::new(JsonlNetworkSource::new(&args.network), &args.cache_dir)?;
    let graph = loader.load_graph(&bbox, &args.network_type, &args.filter)?;

    if let Some(output) = &args.output {
        save_graph(&graph, output)?;
        info!("Processed graph saved to {:?}", output);
    }
    println!(
        "Network for {}: {} nodes, {} edges",
        bbox,
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}
