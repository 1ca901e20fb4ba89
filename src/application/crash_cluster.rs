use geo::{LineString, Point, Polygon};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::info;

use crate::domain::{CrashCluster, LocalMetric, LonLat};
use crate::infrastructure::ClusterSettings;

/// Vertices on a buffer circle.
pub const BUFFER_SEGMENTS: usize = 64;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Greedy fixed-radius clustering of crash points.
///
/// Seeds are the lowest unassigned input index; a seed collects the
/// following unassigned points within `max_dist_m` of it, in input order,
/// until the cluster holds `max_size` points. Results are therefore
/// deterministic for a given input order.
#[derive(Clone, Debug, PartialEq)]
pub struct CrashClusterer {
    pub buffer_m: f64,
    pub max_size: usize,
    pub max_dist_m: f64,
}

impl From<&ClusterSettings> for CrashClusterer {
    fn from(s: &ClusterSettings) -> Self {
        Self {
            buffer_m: s.buffer_m,
            max_size: s.max_size,
            max_dist_m: s.max_dist_m,
        }
    }
}

impl Default for CrashClusterer {
    fn default() -> Self {
        Self::from(&ClusterSettings::default())
    }
}

impl CrashClusterer {
    /// Clusters `(lon, lat)` points; distances are measured in a local metric
    /// projection centred on the points.
    pub fn cluster(&self, points: &[LonLat]) -> Vec<CrashCluster> {
        let Some(metric) = LocalMetric::centered_on(points.iter().copied()) else {
            return Vec::new();
        };
        let projected: Vec<[f64; 2]> = points
            .iter()
            .map(|&(lon, lat)| {
                let (x, y) = metric.forward(lon, lat);
                [x, y]
            })
            .collect();
        let tree: RTree<IndexedPoint> = RTree::bulk_load(
            projected
                .iter()
                .enumerate()
                .map(|(i, &p)| GeomWithData::new(p, i))
                .collect(),
        );

        let radius_2 = self.max_dist_m * self.max_dist_m;
        let mut assigned = vec![false; projected.len()];
        let mut clusters = Vec::new();
        for seed in 0..projected.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            let mut members = vec![seed];

            let mut candidates: Vec<usize> = tree
                .locate_within_distance(projected[seed], radius_2)
                .map(|p| p.data)
                .filter(|&i| !assigned[i])
                .collect();
            candidates.sort_unstable();
            for idx in candidates {
                if members.len() >= self.max_size {
                    break;
                }
                assigned[idx] = true;
                members.push(idx);
            }
            clusters.push(self.summarize(&metric, &projected, &members));
        }

        info!(
            "Crash buffers: {} (r={} m) from {} crashes",
            clusters.len(),
            self.buffer_m,
            points.len()
        );
        clusters
    }

    fn summarize(&self, metric: &LocalMetric, projected: &[[f64; 2]], members: &[usize]) -> CrashCluster {
        let n = members.len() as f64;
        let cx = members.iter().map(|&i| projected[i][0]).sum::<f64>() / n;
        let cy = members.iter().map(|&i| projected[i][1]).sum::<f64>() / n;
        let max_dist = members
            .iter()
            .map(|&i| (projected[i][0] - cx).hypot(projected[i][1] - cy))
            .fold(0.0, f64::max);

        let ring: Vec<LonLat> = (0..BUFFER_SEGMENTS)
            .map(|k| {
                let theta = std::f64::consts::TAU * k as f64 / BUFFER_SEGMENTS as f64;
                metric.inverse(cx + self.buffer_m * theta.cos(), cy + self.buffer_m * theta.sin())
            })
            .collect();
        let (lon, lat) = metric.inverse(cx, cy);

        CrashCluster {
            centroid: Point::new(lon, lat),
            buffer: Polygon::new(LineString::from(ring), vec![]),
            count: members.len(),
            max_dist,
        }
    }
}
