use anyhow::Result;
use bike_crash_atlas::application::{enrich_clusters, CrashClusterer};
use bike_crash_atlas::domain::LonLat;
use bike_crash_atlas::infrastructure::{load_routes, load_settings, ClusterSettings};
use clap::Parser;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Cluster crashes and count the precomputed routes through each cluster")]
struct Args {
    #[arg(short, long, help = "Precomputed routes file")]
    routes: PathBuf,
    #[arg(short, long, help = "Filtered crash points as a JSON array of {latitude, longitude}")]
    crashes: PathBuf,
    #[arg(short, long, help = "Cluster settings JSON")]
    settings: Option<PathBuf>,
    #[arg(short, long, default_value = "crash_clusters.json")]
    output: PathBuf,
}

#[derive(Deserialize)]
struct Crash {
    latitude: f64,
    longitude: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let settings: ClusterSettings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => ClusterSettings::default(),
    };

    let precomputed = load_routes(&args.routes)?;
    let crashes: Vec<Crash> = serde_json::from_reader(BufReader::new(File::open(&args.crashes)?))?;
    let bbox = precomputed.bbox;
    let points: Vec<LonLat> = crashes
        .iter()
        .filter(|c| bbox.contains_point(c.longitude, c.latitude, 0.0))
        .map(|c| (c.longitude, c.latitude))
        .collect();
    info!("{} of {} crashes inside {}", points.len(), crashes.len(), bbox);

    let clusters = CrashClusterer::from(&settings).cluster(&points);
    let enriched = enrich_clusters(&clusters, &precomputed.batch.routes);

    serde_json::to_writer_pretty(BufWriter::new(File::create(&args.output)?), &enriched)?;
    let busiest = enriched.iter().map(|c| c.intersection_count).max().unwrap_or(0);
    println!(
        "Saved {} clusters to {:?} (max {} routes through one cluster)",
        enriched.len(),
        args.output,
        busiest
    );
    Ok(())
}
