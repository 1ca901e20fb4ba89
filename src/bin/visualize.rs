use anyhow::Result;
use bike_crash_atlas::domain::{EnrichedCrashCluster, RoadGraph, RouteMethod};
use bike_crash_atlas::infrastructure::{load_graph, load_routes, PrecomputedRoutes};
use clap::Parser;
use plotters::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(version, about = "Render routes, crash clusters and the road network to PNG")]
struct Args {
    #[arg(short, long, help = "Precomputed routes file")]
    routes: PathBuf,
    #[arg(short, long, help = "Enriched clusters JSON written by crash_map")]
    clusters: Option<PathBuf>,
    #[arg(short, long, help = "Processed graph written by preprocess")]
    graph: Option<PathBuf>,
    #[arg(long, default_value_t = 2000, help = "Draw at most this many routes")]
    max_routes: usize,
    #[arg(short, long, default_value = "crash_map.png")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let data = load_routes(&args.routes)?;
    let clusters: Vec<EnrichedCrashCluster> = match &args.clusters {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => Vec::new(),
    };
    let graph = args.graph.as_deref().map(load_graph).transpose()?;

    create_map(&data, &clusters, graph.as_ref(), args.max_routes, &args.output)?;
    println!("Map saved to: {:?}", args.output);
    Ok(())
}

fn create_map(
    data: &PrecomputedRoutes,
    clusters: &[EnrichedCrashCluster],
    graph: Option<&RoadGraph>,
    max_routes: usize,
    output_path: &Path,
) -> Result<()> {
    let root = BitMapBackend::new(output_path, (1200, 1200)).into_drawing_area();
    root.fill(&WHITE)?;

    let bbox = data.bbox;
    let mut chart = ChartBuilder::on(&root)
        .caption("Bike routes and crash clusters", ("sans-serif", 30))
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(bbox.west..bbox.east, bbox.south..bbox.north)?;

    chart.configure_mesh().x_desc("Longitude").y_desc("Latitude").draw()?;

    if let Some(graph) = graph {
        for e in graph.graph.edge_indices() {
            let Some(line) = graph.edge_line(e) else {
                continue;
            };
            chart.draw_series(LineSeries::new(
                line.coords().map(|c| (c.x, c.y)),
                RGBColor(128, 128, 128).mix(0.3),
            ))?;
        }
    }

    let batch = &data.batch;
    for (route, method) in batch.routes.iter().zip(&batch.methods).take(max_routes) {
        let style = match method {
            RouteMethod::Routed => BLUE.mix(0.2),
            RouteMethod::DirectFallback => MAGENTA.mix(0.2),
        };
        chart.draw_series(LineSeries::new(route.iter().copied(), style))?;
    }

    let max_rate = clusters
        .iter()
        .map(|c| c.crash_per_ride)
        .fold(0.0_f64, f64::max);
    for c in clusters {
        let ring: Vec<(f64, f64)> = c.cluster.buffer.exterior().coords().map(|p| (p.x, p.y)).collect();
        let heat = if max_rate > 0.0 { c.crash_per_ride / max_rate } else { 0.0 };
        let color = RGBColor(255, (200.0 * (1.0 - heat)) as u8, 0);
        chart.draw_series(std::iter::once(Polygon::new(ring.clone(), color.mix(0.4))))?;
        chart.draw_series(LineSeries::new(ring, color.stroke_width(1)))?;
    }

    chart
        .draw_series(PointSeries::of_element(
            clusters.iter().map(|c| (c.cluster.centroid.x(), c.cluster.centroid.y())),
            2,
            RED,
            &|c, s, st| EmptyElement::at(c) + Circle::new((0, 0), s, st.filled()),
        ))?
        .label("Crash clusters")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], RED));

    chart.configure_series_labels().border_style(BLACK).draw()?;
    root.present()?;
    Ok(())
}
