use geo::LineString;
use hashbrown::HashSet;
use petgraph::stable_graph::NodeIndex;
use tracing::info;

use crate::domain::{haversine_m, Crs, EdgeData, RoadGraph};
use crate::infrastructure::build_node_index;

pub const FERRY_SNAP_DISTANCE_M: f64 = 500.0;

/// Explicit ferry flag, `route=ferry`, a highway/service value mentioning
/// ferries, or a name mentioning one.
pub fn is_ferry_edge(edge: &EdgeData) -> bool {
    if edge.ferry {
        return true;
    }
    if edge.route.iter().any(|t| t.to_lowercase() == "ferry") {
        return true;
    }
    let mentions = |t: &String| t.to_lowercase().contains("ferry");
    edge.highway.iter().any(mentions)
        || edge.service.iter().any(mentions)
        || edge.name.iter().any(mentions)
}

/// Link every node touched by a ferry-flagged edge to the closest street
/// node within `max_distance` metres with a pair of `ferry_link` edges.
/// Terminals with nothing in range stay as they are. Returns the number of
/// terminals linked.
pub fn connect_ferry_terminals(graph: &mut RoadGraph, max_distance: f64) -> usize {
    let ferry_nodes: HashSet<NodeIndex> = graph
        .graph
        .edge_indices()
        .filter(|&e| graph.graph[e].ferry)
        .filter_map(|e| graph.graph.edge_endpoints(e))
        .flat_map(|(u, v)| [u, v])
        .collect();
    if ferry_nodes.is_empty() {
        return 0;
    }
    let street_index = build_node_index(graph, |n| !ferry_nodes.contains(&n));
    if street_index.size() == 0 {
        return 0;
    }

    let mut terminals: Vec<NodeIndex> = ferry_nodes.into_iter().collect();
    terminals.sort_unstable();
    let mut links = Vec::new();
    for ferry in terminals {
        let (fx, fy) = graph.coord(ferry);
        let Some(nearest) = street_index.nearest_neighbor(&[fx, fy]) else {
            continue;
        };
        let (sx, sy) = graph.coord(nearest.idx);
        let dist = match graph.crs {
            Crs::Local(_) => ((fx - sx).powi(2) + (fy - sy).powi(2)).sqrt(),
            Crs::Wgs84 => haversine_m(fy, fx, sy, sx),
        };
        if dist <= max_distance {
            links.push((ferry, nearest.idx, dist));
        }
    }

    for &(ferry, street, dist) in &links {
        let (a, b) = (graph.coord(ferry), graph.coord(street));
        graph.add_edge(ferry, street, ferry_link(dist, vec![a, b]));
        graph.add_edge(street, ferry, ferry_link(dist, vec![b, a]));
    }
    if !links.is_empty() {
        info!("Connected {} ferry terminals to the street network", links.len());
    }
    links.len()
}

fn ferry_link(length: f64, coords: Vec<(f64, f64)>) -> EdgeData {
    EdgeData {
        length,
        geometry: Some(LineString::from(coords)),
        ferry: true,
        ..EdgeData::new(length).with_highway("ferry_link")
    }
}
