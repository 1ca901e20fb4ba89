use geo::{BoundingRect, LineString, Polygon};
use petgraph::stable_graph::NodeIndex;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::domain::{haversine_m, Crs, LocalMetric, RoadGraph};

/// A graph node in the nearest-node index.
#[derive(Clone, Debug)]
pub struct SpatialNode {
    pub p: [f64; 2],
    pub idx: NodeIndex,
}

impl RTreeObject for SpatialNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.p)
    }
}

impl PointDistance for SpatialNode {
    /// Squared planar distance in the index's own coordinates.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.p[0] - point[0];
        let dy = self.p[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Planar candidates within this relative margin of the closest one are
/// re-ranked by great-circle distance.
const NEAR_TIE_MARGIN: f64 = 0.01;

/// Nearest graph node to a `(lon, lat)` query by ground distance.
///
/// WGS84 graphs are indexed in a [`LocalMetric`] projection centred on their
/// nodes; metric graphs are indexed as they are. Queries are projected the
/// same way.
pub struct NodeLocator {
    tree: RTree<SpatialNode>,
    metric: Option<LocalMetric>,
}

impl NodeLocator {
    pub fn new(graph: &RoadGraph) -> Self {
        let metric = match graph.crs {
            Crs::Wgs84 => LocalMetric::centered_on(graph.graph.node_weights().map(|n| (n.x, n.y))),
            Crs::Local(p) => Some(p),
        };
        let nodes: Vec<SpatialNode> = match (graph.crs, metric) {
            (Crs::Wgs84, Some(m)) => graph
                .graph
                .node_indices()
                .map(|idx| {
                    let (lon, lat) = graph.coord(idx);
                    let (x, y) = m.forward(lon, lat);
                    SpatialNode { p: [x, y], idx }
                })
                .collect(),
            (Crs::Local(_), _) => graph
                .graph
                .node_indices()
                .map(|idx| {
                    let (x, y) = graph.coord(idx);
                    SpatialNode { p: [x, y], idx }
                })
                .collect(),
            (Crs::Wgs84, None) => Vec::new(),
        };
        Self {
            tree: RTree::bulk_load(nodes),
            metric,
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// `None` only when the graph has no nodes.
    pub fn nearest(&self, lon: f64, lat: f64) -> Option<NodeIndex> {
        let metric = self.metric?;
        let (qx, qy) = metric.forward(lon, lat);
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&[qx, qy]);
        let (first, first_d2) = candidates.next()?;
        let reach2 = first_d2 * (1.0 + NEAR_TIE_MARGIN).powi(2);

        let ground = |node: &SpatialNode| {
            let (nlon, nlat) = metric.inverse(node.p[0], node.p[1]);
            haversine_m(lat, lon, nlat, nlon)
        };
        let mut best = (ground(first), first.idx);
        for (node, d2) in candidates {
            if d2 > reach2 {
                break;
            }
            let d = ground(node);
            if d < best.0 {
                best = (d, node.idx);
            }
        }
        Some(best.1)
    }
}

/// Bounding rectangle of a buffer polygon, tagged with the polygon's index.
pub type BufferEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

pub fn build_node_index<F>(graph: &RoadGraph, mut include: F) -> RTree<SpatialNode>
where
    F: FnMut(NodeIndex) -> bool,
{
    let nodes: Vec<SpatialNode> = graph
        .graph
        .node_indices()
        .filter(|&n| include(n))
        .map(|idx| {
            let (x, y) = graph.coord(idx);
            SpatialNode { p: [x, y], idx }
        })
        .collect();
    RTree::bulk_load(nodes)
}

pub fn build_buffer_index(buffers: &[Polygon<f64>]) -> RTree<BufferEnvelope> {
    let items: Vec<BufferEnvelope> = buffers
        .iter()
        .enumerate()
        .filter_map(|(i, poly)| {
            let rect = poly.bounding_rect()?;
            Some(GeomWithData::new(
                Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                i,
            ))
        })
        .collect();
    RTree::bulk_load(items)
}

pub fn line_envelope(line: &LineString<f64>) -> Option<AABB<[f64; 2]>> {
    let rect = line.bounding_rect()?;
    Some(AABB::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    ))
}
