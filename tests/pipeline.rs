use std::sync::atomic::{AtomicUsize, Ordering};

use bike_crash_atlas::application::{crop_and_prune_largest, crop_to_bbox, RouteBuilder, TrafficNetworkLoader};
use bike_crash_atlas::domain::{haversine_m, BBox, Crs, EdgeData, NodeData, OdPair, RoadGraph, RouteMethod};
use bike_crash_atlas::infrastructure::NetworkSource;
use bike_crash_atlas::Result;

const SPACING: f64 = 0.002;

/// 5x5 two-way street grid; counts how often the network is fetched.
#[derive(Default)]
struct CountingGrid {
    fetches: AtomicUsize,
}

impl CountingGrid {
    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl NetworkSource for CountingGrid {
    fn fetch_network(&self, bbox: &BBox, _: &str, _: &str) -> Result<RoadGraph> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut g = RoadGraph::new(Crs::Wgs84);
        let node = |r: u64, c: u64| NodeData {
            id: r * 10 + c + 1,
            x: -74.0 + c as f64 * SPACING,
            y: 40.70 + r as f64 * SPACING,
        };
        for r in 0..5 {
            for c in 0..5 {
                let here = node(r, c);
                if !bbox.contains_point(here.x, here.y, 0.0) {
                    continue;
                }
                for (r2, c2) in [(r + 1, c), (r, c + 1)] {
                    if r2 > 4 || c2 > 4 {
                        continue;
                    }
                    let there = node(r2, c2);
                    if !bbox.contains_point(there.x, there.y, 0.0) {
                        continue;
                    }
                    let length = haversine_m(here.y, here.x, there.y, there.x);
                    let a = g.add_node(here.clone());
                    let b = g.add_node(there);
                    g.add_edge(a, b, EdgeData::new(length).with_highway("residential"));
                    g.add_edge(b, a, EdgeData::new(length).with_highway("residential"));
                }
            }
        }
        Ok(g)
    }

    fn fetch_ferries(&self, _: &BBox) -> Result<RoadGraph> {
        Ok(RoadGraph::new(Crs::Wgs84))
    }
}

fn outer() -> BBox {
    BBox::new(40.709, 40.699, -73.991, -74.001)
}

fn inner() -> BBox {
    BBox::new(40.705, 40.699, -73.995, -74.001)
}

#[test]
fn smaller_bbox_is_cropped_from_cache_without_refetching() {
    let dir = tempfile::tempdir().unwrap();
    let mut loader = TrafficNetworkLoader::new(CountingGrid::default(), dir.path()).unwrap();

    let full = loader.load_bike_network(&outer()).unwrap();
    assert_eq!(full.node_count(), 25);
    assert_eq!(loader.source().fetches(), 1);

    let part = loader.load_bike_network(&inner()).unwrap();
    assert_eq!(loader.source().fetches(), 1);
    assert_eq!(part.node_ids(), vec![1, 2, 3, 11, 12, 13, 21, 22, 23]);
    assert_eq!(part.node_ids(), crop_to_bbox(full.clone(), &inner()).node_ids());
    assert_eq!(part.node_ids(), crop_and_prune_largest(full, &inner()).node_ids());
}

#[test]
fn cache_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let first = {
        let mut loader = TrafficNetworkLoader::new(CountingGrid::default(), dir.path()).unwrap();
        loader.load_bike_network(&outer()).unwrap()
    };

    let mut loader = TrafficNetworkLoader::new(CountingGrid::default(), dir.path()).unwrap();
    let again = loader.load_bike_network(&outer()).unwrap();
    assert_eq!(loader.source().fetches(), 0);
    assert_eq!(again.node_ids(), first.node_ids());
    assert_eq!(again.edge_count(), first.edge_count());
}

#[test]
fn processed_grid_has_one_edge_per_street_segment() {
    let dir = tempfile::tempdir().unwrap();
    let mut loader = TrafficNetworkLoader::new(CountingGrid::default(), dir.path()).unwrap();
    let graph = loader.load_bike_network(&outer()).unwrap();
    // 5 rows and 5 columns of 4 segments each, dissolved to one edge apiece.
    assert_eq!(graph.edge_count(), 40);
    assert_eq!(graph.crs, Crs::Wgs84);
}

#[test]
fn routes_over_the_processed_network_keep_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut loader = TrafficNetworkLoader::new(CountingGrid::default(), dir.path()).unwrap();
    let graph = loader.load_bike_network(&outer()).unwrap();
    let builder = RouteBuilder::new(graph);

    let pairs: Vec<OdPair> = (0..20)
        .map(|i| {
            let k = (i % 5) as f64 * SPACING;
            ((40.70, -74.0 + k), (40.708, -73.992 - k))
        })
        .collect();
    let batch = builder.build_routes(&pairs, 3).unwrap();

    assert_eq!(batch.len(), pairs.len());
    assert_eq!(batch.count(RouteMethod::Routed), pairs.len());
    for (i, &((slat, slon), (elat, elon))) in pairs.iter().enumerate() {
        let route = &batch.routes[i];
        let (first, last) = (route[0], route[route.len() - 1]);
        assert!((first.0 - slon).abs() < 1e-6 && (first.1 - slat).abs() < 1e-6);
        assert!((last.0 - elon).abs() < 1e-6 && (last.1 - elat).abs() < 1e-6);
        // Never shorter than the straight line, up to projection error.
        assert!(batch.lengths[i] >= 0.999 * haversine_m(slat, slon, elat, elon));
    }
}
