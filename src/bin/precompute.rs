use anyhow::{anyhow, Result};
use bike_crash_atlas::application::{RouteBuilder, TrafficNetworkLoader};
use bike_crash_atlas::domain::{polyline_length_m, BBox, OdPair, RouteMethod};
use bike_crash_atlas::infrastructure::{
    load_settings, save_routes, JsonlNetworkSource, PrecomputeSettings, PrecomputedRoutes,
};
use clap::Parser;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Precompute bike routes for a sample of rides")]
struct Args {
    #[arg(short, long, help = "Rides as JSONL with start_lat/start_lng/end_lat/end_lng")]
    rides: PathBuf,
    #[arg(short, long, help = "OSM network export (JSONL)")]
    network: PathBuf,
    #[arg(short, long, help = "Settings JSON; defaults apply when omitted")]
    settings: Option<PathBuf>,
}

#[derive(Deserialize)]
struct Ride {
    start_lat: Option<f64>,
    start_lng: Option<f64>,
    end_lat: Option<f64>,
    end_lng: Option<f64>,
}

impl Ride {
    fn pair(&self) -> Option<OdPair> {
        Some((
            (self.start_lat?, self.start_lng?),
            (self.end_lat?, self.end_lng?),
        ))
    }
}

fn read_rides(path: &Path) -> Result<Vec<OdPair>> {
    let reader = BufReader::new(File::open(path)?);
    let mut pairs = Vec::new();
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let ride: Ride = serde_json::from_str(&line)?;
        match ride.pair() {
            Some(pair) => pairs.push(pair),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} rides without coordinates", skipped);
    }
    Ok(pairs)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let settings: PrecomputeSettings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => PrecomputeSettings::default(),
    };

    let mut pairs = read_rides(&args.rides)?;
    if pairs.len() > settings.sample_size {
        let mut rng = SmallRng::seed_from_u64(settings.random_seed);
        pairs = pairs
            .choose_multiple(&mut rng, settings.sample_size)
            .copied()
            .collect();
    }
    info!("Routing {} rides", pairs.len());

    let endpoints = pairs.iter().flat_map(|&(start, end)| [start, end]);
    let bbox = BBox::from_points(endpoints, settings.bbox_pad)
        .ok_or_else(|| anyhow!("no rides with coordinates in {:?}", args.rides))?;

    let mut loader = TrafficNetworkLoader::new(JsonlNetworkSource::new(&args.network), &settings.cache_dir)?;
    let graph = loader.load_bike_network(&bbox)?;
    let builder = RouteBuilder::new(graph);
    let batch = builder.build_routes(&pairs, settings.n_jobs)?;

    let routed: Vec<usize> = (0..batch.len())
        .filter(|&i| batch.methods[i] == RouteMethod::Routed)
        .collect();
    if !routed.is_empty() {
        let network_m: f64 = routed.iter().map(|&i| batch.lengths[i]).sum();
        let geometry_m: f64 = routed.iter().map(|&i| polyline_length_m(&batch.routes[i])).sum();
        println!(
            "Routed {}/{} rides, mean length {:.0} m (geometry {:.0} m)",
            routed.len(),
            batch.len(),
            network_m / routed.len() as f64,
            geometry_m / routed.len() as f64
        );
    }
    println!("Direct fallbacks: {}", batch.count(RouteMethod::DirectFallback));

    let output_path = settings.output_path.clone();
    save_routes(
        &PrecomputedRoutes {
            pairs,
            batch,
            bbox,
            settings,
        },
        &output_path,
    )?;
    println!("Routes saved to {:?}", output_path);
    Ok(())
}
