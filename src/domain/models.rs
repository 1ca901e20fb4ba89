use geo::{Euclidean, Length, LineString, Point, Polygon};
use hashbrown::HashMap;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::geodesy::{polyline_length_m, LocalMetric};
use super::tags::Tags;

/// `(lon, lat)` in degrees; the order of every output geometry.
pub type LonLat = (f64, f64);
/// `(lat, lon)` in degrees; the order callers hand ride endpoints in.
pub type LatLon = (f64, f64);
/// Origin and destination of one ride.
pub type OdPair = (LatLon, LatLon);

/// Coordinate reference of a graph's node and geometry coordinates.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum Crs {
    /// `x` = longitude, `y` = latitude.
    Wgs84,
    /// Metres east/north of the projection origin.
    Local(LocalMetric),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeData {
    /// Source (OSM) node id.
    pub id: u64,
    pub x: f64,
    pub y: f64,
}

/// Edge attributes. The fields the pipeline interprets are typed; anything
/// else from the source lands in `extra`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct EdgeData {
    /// Metres.
    pub length: f64,
    pub geometry: Option<LineString<f64>>,
    pub ferry: bool,
    pub highway: Tags,
    pub route: Tags,
    pub service: Tags,
    pub railway: Tags,
    pub bicycle: Tags,
    pub name: Tags,
    pub extra: BTreeMap<String, Tags>,
}

impl EdgeData {
    pub fn new(length: f64) -> Self {
        Self { length, ..Self::default() }
    }

    pub fn with_highway(mut self, value: &str) -> Self {
        self.highway.insert(value.to_string());
        self
    }

    pub fn with_geometry(mut self, coords: Vec<(f64, f64)>) -> Self {
        self.geometry = Some(LineString::from(coords));
        self
    }
}

/// Directed road multigraph. Parallel edges between a node pair are
/// allowed; `node_map` resolves source ids to graph indices.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RoadGraph {
    pub graph: StableGraph<NodeData, EdgeData>,
    pub node_map: HashMap<u64, NodeIndex>,
    pub crs: Crs,
}

impl RoadGraph {
    pub fn new(crs: Crs) -> Self {
        Self {
            graph: StableGraph::new(),
            node_map: HashMap::new(),
            crs,
        }
    }

    /// Inserts the node, or returns the index of an existing node with the
    /// same id.
    pub fn add_node(&mut self, node: NodeData) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&node.id) {
            return idx;
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.node_map.insert(id, idx);
        idx
    }

    pub fn add_edge(&mut self, u: NodeIndex, v: NodeIndex, edge: EdgeData) -> EdgeIndex {
        self.graph.add_edge(u, v, edge)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn coord(&self, idx: NodeIndex) -> (f64, f64) {
        let node = &self.graph[idx];
        (node.x, node.y)
    }

    /// The edge's own geometry, or the straight segment between its
    /// endpoints.
    pub fn edge_line(&self, e: EdgeIndex) -> Option<LineString<f64>> {
        let (u, v) = self.graph.edge_endpoints(e)?;
        Some(match &self.graph[e].geometry {
            Some(line) => line.clone(),
            None => LineString::from(vec![self.coord(u), self.coord(v)]),
        })
    }

    /// Length of `line` in metres, measured in this graph's CRS.
    pub fn line_length(&self, line: &LineString<f64>) -> f64 {
        match self.crs {
            Crs::Local(_) => Euclidean.length(line),
            Crs::Wgs84 => {
                let coords: Vec<(f64, f64)> = line.coords().map(|c| (c.x, c.y)).collect();
                polyline_length_m(&coords)
            }
        }
    }

    /// Drop every node for which `keep` is false, together with its edges.
    pub fn retain_nodes<F>(&mut self, mut keep: F)
    where
        F: FnMut(NodeIndex, &NodeData) -> bool,
    {
        let doomed: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| !keep(n, &self.graph[n]))
            .collect();
        for n in doomed {
            if let Some(node) = self.graph.remove_node(n) {
                self.node_map.remove(&node.id);
            }
        }
    }

    /// Source ids of all nodes, sorted.
    pub fn node_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.graph.node_weights().map(|n| n.id).collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RouteMethod {
    Routed,
    DirectFallback,
}

impl RouteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMethod::Routed => "routed",
            RouteMethod::DirectFallback => "direct_fallback",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteResult {
    /// Position of the pair in the caller's batch.
    pub index: usize,
    pub coords: Vec<LonLat>,
    pub length_m: f64,
    pub method: RouteMethod,
}

/// Batch output as three sequences aligned with the input pairs.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RouteBatch {
    pub routes: Vec<Vec<LonLat>>,
    pub lengths: Vec<f64>,
    pub methods: Vec<RouteMethod>,
}

impl RouteBatch {
    /// Restores input order, whatever order the results arrived in.
    pub fn from_results(mut results: Vec<RouteResult>) -> Self {
        results.sort_unstable_by_key(|r| r.index);
        let mut batch = Self {
            routes: Vec::with_capacity(results.len()),
            lengths: Vec::with_capacity(results.len()),
            methods: Vec::with_capacity(results.len()),
        };
        for r in results {
            batch.routes.push(r.coords);
            batch.lengths.push(r.length_m);
            batch.methods.push(r.method);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn count(&self, method: RouteMethod) -> usize {
        self.methods.iter().filter(|&&m| m == method).count()
    }
}

/// Greedy crash cluster in WGS84: centroid, fixed-radius buffer around it,
/// member count and the largest centroid-to-member distance in metres.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CrashCluster {
    pub centroid: Point<f64>,
    pub buffer: Polygon<f64>,
    pub count: usize,
    pub max_dist: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EnrichedCrashCluster {
    #[serde(flatten)]
    pub cluster: CrashCluster,
    /// Routes whose geometry touches the buffer.
    pub intersection_count: usize,
    pub crash_per_ride: f64,
}

impl EnrichedCrashCluster {
    pub fn new(cluster: CrashCluster, intersection_count: usize) -> Self {
        let crash_per_ride = if intersection_count > 0 {
            cluster.count as f64 / intersection_count as f64
        } else {
            0.0
        };
        Self {
            cluster,
            intersection_count,
            crash_per_ride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    #[test]
    fn add_node_dedups_by_id() {
        let mut g = RoadGraph::new(Crs::Wgs84);
        let a = g.add_node(NodeData { id: 7, x: 0.0, y: 0.0 });
        let b = g.add_node(NodeData { id: 7, x: 5.0, y: 5.0 });
        assert_eq!(a, b);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn retain_nodes_drops_incident_edges_and_ids() {
        let mut g = RoadGraph::new(Crs::Wgs84);
        let a = g.add_node(NodeData { id: 1, x: 0.0, y: 0.0 });
        let b = g.add_node(NodeData { id: 2, x: 1.0, y: 0.0 });
        g.add_edge(a, b, EdgeData::new(10.0));
        g.retain_nodes(|_, n| n.id != 2);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
        assert!(!g.node_map.contains_key(&2));
    }

    #[test]
    fn edge_line_falls_back_to_straight_segment() {
        let mut g = RoadGraph::new(Crs::Wgs84);
        let a = g.add_node(NodeData { id: 1, x: 0.0, y: 0.0 });
        let b = g.add_node(NodeData { id: 2, x: 1.0, y: 2.0 });
        let e = g.add_edge(a, b, EdgeData::new(10.0));
        let line = g.edge_line(e).unwrap();
        assert_eq!(line.0, vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 2.0 }]);
    }

    #[test]
    fn batch_restores_input_order() {
        let results = vec![
            RouteResult { index: 2, coords: vec![], length_m: 3.0, method: RouteMethod::Routed },
            RouteResult { index: 0, coords: vec![], length_m: 1.0, method: RouteMethod::DirectFallback },
            RouteResult { index: 1, coords: vec![], length_m: 2.0, method: RouteMethod::Routed },
        ];
        let batch = RouteBatch::from_results(results);
        assert_eq!(batch.lengths, vec![1.0, 2.0, 3.0]);
        assert_eq!(batch.count(RouteMethod::Routed), 2);
    }

    #[test]
    fn crash_per_ride_guards_zero() {
        let cluster = CrashCluster {
            centroid: Point::new(0.0, 0.0),
            buffer: Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]), vec![]),
            count: 6,
            max_dist: 0.0,
        };
        assert_eq!(EnrichedCrashCluster::new(cluster.clone(), 0).crash_per_ride, 0.0);
        assert_eq!(EnrichedCrashCluster::new(cluster, 4).crash_per_ride, 1.5);
    }
}
