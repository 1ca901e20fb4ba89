use geo::{Intersects, LineString, Polygon};
use hashbrown::HashMap;
use tracing::info;

use crate::domain::{CrashCluster, EnrichedCrashCluster, LonLat};
use crate::infrastructure::{build_buffer_index, line_envelope};

/// Per-buffer counts of the routes passing through it.
pub struct ClusterEnricher {
    intersection_map: HashMap<usize, usize>,
}

impl ClusterEnricher {
    /// `routes` are `(lon, lat)` polylines; routes with fewer than two
    /// points are ignored.
    pub fn new(buffers: &[Polygon<f64>], routes: &[Vec<LonLat>]) -> Self {
        Self {
            intersection_map: count_intersections(buffers, routes),
        }
    }

    /// Routes touching buffer `idx`.
    pub fn intersection_count(&self, idx: usize) -> usize {
        self.intersection_map.get(&idx).copied().unwrap_or(0)
    }

    /// `clusters[i]` is matched with the buffer at position `i`.
    pub fn enrich(&self, clusters: &[CrashCluster]) -> Vec<EnrichedCrashCluster> {
        clusters
            .iter()
            .enumerate()
            .map(|(i, c)| EnrichedCrashCluster::new(c.clone(), self.intersection_count(i)))
            .collect()
    }
}

/// Enrich clusters against their own buffers.
pub fn enrich_clusters(clusters: &[CrashCluster], routes: &[Vec<LonLat>]) -> Vec<EnrichedCrashCluster> {
    let buffers: Vec<Polygon<f64>> = clusters.iter().map(|c| c.buffer.clone()).collect();
    ClusterEnricher::new(&buffers, routes).enrich(clusters)
}

fn count_intersections(buffers: &[Polygon<f64>], routes: &[Vec<LonLat>]) -> HashMap<usize, usize> {
    let mut counts = HashMap::new();
    if buffers.is_empty() {
        return counts;
    }
    let tree = build_buffer_index(buffers);
    let mut checked = 0usize;
    for route in routes.iter().filter(|r| r.len() >= 2) {
        let line = LineString::from(route.clone());
        let Some(envelope) = line_envelope(&line) else {
            continue;
        };
        for candidate in tree.locate_in_envelope_intersecting(&envelope) {
            checked += 1;
            if buffers[candidate.data].intersects(&line) {
                *counts.entry(candidate.data).or_insert(0) += 1;
            }
        }
    }
    info!(
        "Route/buffer intersections: {} buffers hit, {} candidates checked",
        counts.len(),
        checked
    );
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Point};

    fn square(x0: f64, y0: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + 1.0, y: y0),
            (x: x0 + 1.0, y: y0 + 1.0),
            (x: x0, y: y0 + 1.0),
        ]
    }

    fn cluster(buffer: Polygon<f64>, count: usize) -> CrashCluster {
        CrashCluster {
            centroid: Point::new(0.0, 0.0),
            buffer,
            count,
            max_dist: 0.0,
        }
    }

    #[test]
    fn counts_only_true_intersections() {
        let clusters = vec![cluster(square(0.0, 0.0), 4), cluster(square(10.0, 0.0), 3)];
        let routes = vec![
            vec![(-1.0, 0.5), (2.0, 0.5)],
            vec![(0.5, -1.0), (0.5, 2.0)],
            // Bounding box overlaps the first square, the line does not.
            vec![(-0.5, 0.8), (0.8, 2.0)],
            vec![(0.5, 0.5)],
            vec![(10.5, -1.0), (10.5, 2.0)],
        ];
        let enriched = enrich_clusters(&clusters, &routes);
        assert_eq!(enriched[0].intersection_count, 2);
        assert_eq!(enriched[0].crash_per_ride, 2.0);
        assert_eq!(enriched[1].intersection_count, 1);
        assert_eq!(enriched[1].crash_per_ride, 3.0);
        assert_eq!(enriched[1].cluster.count, 3);
    }

    #[test]
    fn untouched_cluster_has_zero_rate() {
        let clusters = vec![cluster(square(0.0, 0.0), 4), cluster(square(10.0, 0.0), 3)];
        let enriched = enrich_clusters(&clusters, &[vec![(-1.0, 0.5), (2.0, 0.5)]]);
        assert_eq!(enriched[1].intersection_count, 0);
        assert_eq!(enriched[1].crash_per_ride, 0.0);
    }

    #[test]
    fn one_route_counts_once_per_buffer() {
        let clusters = vec![cluster(square(0.0, 0.0), 1), cluster(square(3.0, 0.0), 1)];
        let routes = vec![vec![(-1.0, 0.5), (2.0, 0.5), (5.0, 0.5)]];
        let enricher = ClusterEnricher::new(
            &clusters.iter().map(|c| c.buffer.clone()).collect::<Vec<_>>(),
            &routes,
        );
        assert_eq!(enricher.intersection_count(0), 1);
        assert_eq!(enricher.intersection_count(1), 1);
        assert_eq!(enricher.intersection_count(7), 0);
    }
}
