//! Projection of whole graphs and merging of near-duplicate intersections.

use geo::{Coord, MapCoordsInPlace};
use hashbrown::HashMap;
use petgraph::stable_graph::NodeIndex;
use petgraph::unionfind::UnionFind;
use petgraph::visit::NodeIndexable;
use tracing::info;

use crate::domain::{Crs, EdgeData, LocalMetric, RoadGraph};
use crate::infrastructure::build_node_index;

pub const INTERSECTION_TOLERANCE_M: f64 = 3.0;

/// Local metric CRS centred on the mean node position of a WGS84 graph.
pub fn local_crs_for(graph: &RoadGraph) -> Option<Crs> {
    match graph.crs {
        Crs::Wgs84 => LocalMetric::centered_on(graph.graph.node_weights().map(|n| (n.x, n.y))).map(Crs::Local),
        Crs::Local(p) => Some(Crs::Local(p)),
    }
}

/// Re-express node coordinates and edge geometries in `target`.
pub fn project_graph(mut graph: RoadGraph, target: Crs) -> RoadGraph {
    if graph.crs == target {
        return graph;
    }
    let source = graph.crs;
    let convert = |x: f64, y: f64| -> (f64, f64) {
        let (lon, lat) = match source {
            Crs::Wgs84 => (x, y),
            Crs::Local(p) => p.inverse(x, y),
        };
        match target {
            Crs::Wgs84 => (lon, lat),
            Crs::Local(p) => p.forward(lon, lat),
        }
    };
    for node in graph.graph.node_weights_mut() {
        (node.x, node.y) = convert(node.x, node.y);
    }
    for edge in graph.graph.edge_weights_mut() {
        if let Some(line) = edge.geometry.as_mut() {
            line.map_coords_in_place(|c| {
                let (x, y) = convert(c.x, c.y);
                Coord { x, y }
            });
        }
    }
    graph.crs = target;
    graph
}

/// Merge nodes whose `tolerance` disks overlap (transitively) into one node
/// at the cluster centroid, keeping the smallest source id. Edges are
/// rewired with their geometry endpoints snapped; edges that end up inside
/// a merged node are dropped. Expects a metric CRS.
pub fn consolidate_intersections(mut graph: RoadGraph, tolerance: f64) -> RoadGraph {
    let index = build_node_index(&graph, |_| true);
    let reach2 = (2.0 * tolerance).powi(2);
    let mut uf = UnionFind::<usize>::new(graph.graph.node_bound());
    for n in graph.graph.node_indices() {
        let (x, y) = graph.coord(n);
        for near in index.locate_within_distance([x, y], reach2) {
            uf.union(n.index(), near.idx.index());
        }
    }

    let mut clusters: HashMap<usize, Vec<NodeIndex>> = HashMap::new();
    for n in graph.graph.node_indices() {
        clusters.entry(uf.find(n.index())).or_default().push(n);
    }
    let mut representative: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut moved: HashMap<NodeIndex, (f64, f64)> = HashMap::new();
    for members in clusters.values().filter(|m| m.len() > 1) {
        let rep = *members
            .iter()
            .min_by_key(|&&n| graph.graph[n].id)
            .unwrap_or(&members[0]);
        let k = members.len() as f64;
        let cx = members.iter().map(|&n| graph.graph[n].x).sum::<f64>() / k;
        let cy = members.iter().map(|&n| graph.graph[n].y).sum::<f64>() / k;
        for &n in members {
            representative.insert(n, rep);
        }
        moved.insert(rep, (cx, cy));
    }
    if moved.is_empty() {
        return graph;
    }

    let rep_of = |n: NodeIndex| representative.get(&n).copied().unwrap_or(n);
    let edges: Vec<(NodeIndex, NodeIndex, EdgeData)> = graph
        .graph
        .edge_indices()
        .filter_map(|e| {
            let (u, v) = graph.graph.edge_endpoints(e)?;
            Some((u, v, graph.graph[e].clone()))
        })
        .collect();
    graph.graph.clear_edges();
    for (&rep, &(x, y)) in &moved {
        let node = &mut graph.graph[rep];
        node.x = x;
        node.y = y;
    }
    graph.retain_nodes(|n, _| rep_of(n) == n);

    let mut dropped = 0usize;
    for (u, v, mut data) in edges {
        let (nu, nv) = (rep_of(u), rep_of(v));
        if nu == nv && (representative.contains_key(&u) || representative.contains_key(&v)) {
            dropped += 1;
            continue;
        }
        if let Some(line) = data.geometry.as_mut() {
            if let (Some(&(x, y)), Some(first)) = (moved.get(&nu), line.0.first_mut()) {
                *first = Coord { x, y };
            }
            if let (Some(&(x, y)), Some(last)) = (moved.get(&nv), line.0.last_mut()) {
                *last = Coord { x, y };
            }
        }
        graph.add_edge(nu, nv, data);
    }
    info!(
        "Consolidated intersections: merged {} nodes into {} clusters, dropped {} inner edges",
        representative.len(),
        moved.len(),
        dropped
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeData;

    #[test]
    fn projection_roundtrip_restores_coordinates() {
        let mut g = RoadGraph::new(Crs::Wgs84);
        let a = g.add_node(NodeData { id: 1, x: -74.0, y: 40.7 });
        let b = g.add_node(NodeData { id: 2, x: -73.99, y: 40.71 });
        g.add_edge(a, b, EdgeData::new(1.0).with_geometry(vec![(-74.0, 40.7), (-73.99, 40.71)]));
        let local = local_crs_for(&g).unwrap();
        let projected = project_graph(g, local);
        assert!(projected.coord(a).0.abs() < 1_000.0);
        let back = project_graph(projected, Crs::Wgs84);
        let (x, y) = back.coord(b);
        assert!((x + 73.99).abs() < 1e-9 && (y - 40.71).abs() < 1e-9);
        let e = back.graph.edge_indices().next().unwrap();
        let line = back.graph[e].geometry.as_ref().unwrap();
        assert!((line.0[0].x + 74.0).abs() < 1e-9);
    }

    /// A crossing drawn as two nodes 2 m apart, plus two arms.
    fn split_intersection() -> RoadGraph {
        let mut g = RoadGraph::new(Crs::Local(LocalMetric::new(0.0, 0.0)));
        let n = |g: &mut RoadGraph, id, x, y| g.add_node(NodeData { id, x, y });
        let west = n(&mut g, 1, -100.0, 0.0);
        let c1 = n(&mut g, 5, 0.0, 0.0);
        let c2 = n(&mut g, 3, 2.0, 0.0);
        let east = n(&mut g, 4, 100.0, 0.0);
        g.add_edge(west, c1, EdgeData::new(100.0).with_geometry(vec![(-100.0, 0.0), (0.0, 0.0)]));
        g.add_edge(c1, c2, EdgeData::new(2.0));
        g.add_edge(c2, east, EdgeData::new(98.0));
        g
    }

    #[test]
    fn merges_close_nodes_into_centroid() {
        let g = consolidate_intersections(split_intersection(), INTERSECTION_TOLERANCE_M);
        assert_eq!(g.node_ids(), vec![1, 3, 4]);
        assert_eq!(g.edge_count(), 2);
        let merged = g.node_map[&3];
        assert_eq!(g.coord(merged), (1.0, 0.0));
        let west = g.node_map[&1];
        let e = g.graph.find_edge(west, merged).unwrap();
        let line = g.graph[e].geometry.as_ref().unwrap();
        assert_eq!(line.0.last().map(|c| (c.x, c.y)), Some((1.0, 0.0)));
    }

    #[test]
    fn distant_nodes_are_untouched() {
        let g = consolidate_intersections(split_intersection(), 0.5);
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 3);
    }
}
