use geo::{Coord, Euclidean, Length, LineString};
use hashbrown::{HashMap, HashSet};
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use std::collections::BTreeMap;
use tracing::info;

use crate::application::edge_ferry::is_ferry_edge;
use crate::domain::{EdgeData, RoadGraph};

/// Ways that only carry pedestrians.
pub const FOOT_EXCLUDE: &[&str] = &[
    "footway",
    "path",
    "steps",
    "pedestrian",
    "corridor",
    "escalator",
    "elevator",
    "bridleway",
    "subway",
];
pub const MOTORWAY_EXCLUDE: &[&str] = &["motorway", "motorway_link", "trunk", "trunk_link"];
pub const MISC_EXCLUDE: &[&str] = &["construction"];

/// Whether an edge is a bikeable street (or a ferry, which always passes).
pub fn keep_edge(edge: &EdgeData) -> bool {
    let ferry = is_ferry_edge(edge);
    if !edge.railway.is_empty() && !ferry {
        return false;
    }
    if ferry {
        return true;
    }
    let highway = &edge.highway;
    if highway.is_empty() {
        return false;
    }
    if highway.iter().any(|t| MOTORWAY_EXCLUDE.contains(&t.as_str())) {
        return false;
    }
    if highway.iter().all(|t| FOOT_EXCLUDE.contains(&t.as_str())) {
        return false;
    }
    if highway.iter().any(|t| MISC_EXCLUDE.contains(&t.as_str())) {
        return false;
    }
    !edge.bicycle.contains("no")
}

/// Remove non-bikeable edges in place; nodes are left alone. Returns how
/// many edges were dropped.
pub fn filter_street_edges(graph: &mut RoadGraph) -> usize {
    let before = graph.edge_count();
    graph.graph.retain_edges(|g, e| keep_edge(&g[e]));
    let dropped = before - graph.edge_count();
    if dropped > 0 {
        info!(
            "Filtered non-street/bikeable edges: {} -> {}",
            before,
            graph.edge_count()
        );
    }
    dropped
}

/// Collapse all edges between an unordered node pair into one edge running
/// from the lower to the higher node index. Ferry flags are OR-ed, highway
/// tags united, geometries merged (longest piece kept when the merge is
/// disjoint) and the length is re-measured on the merged line.
pub fn dissolve_bidirectional_edges(mut graph: RoadGraph) -> RoadGraph {
    let mut groups: BTreeMap<(NodeIndex, NodeIndex), Vec<EdgeIndex>> = BTreeMap::new();
    for e in graph.graph.edge_indices() {
        if let Some((u, v)) = graph.graph.edge_endpoints(e) {
            groups.entry((u.min(v), u.max(v))).or_default().push(e);
        }
    }

    let mut dissolved = Vec::with_capacity(groups.len());
    for ((lo, hi), edges) in groups {
        let lines: Vec<LineString<f64>> = edges.iter().filter_map(|&e| graph.edge_line(e)).collect();
        let mut merged = merge_lines(&lines);
        let start = graph.coord(lo);
        if let (Some(first), Some(last)) = (merged.0.first(), merged.0.last()) {
            if dist2(*last, start) < dist2(*first, start) {
                merged.0.reverse();
            }
        }

        let mut data = graph.graph[edges[0]].clone();
        for &e in &edges[1..] {
            let other = &graph.graph[e];
            data.ferry |= other.ferry;
            data.highway.extend(other.highway.iter().cloned());
        }
        data.length = graph.line_length(&merged);
        data.geometry = Some(merged);
        dissolved.push((lo, hi, data));
    }

    let before = graph.edge_count();
    graph.graph.clear_edges();
    for (lo, hi, data) in dissolved {
        graph.add_edge(lo, hi, data);
    }
    info!("Dissolved bidirectional edges: {} -> {}", before, graph.edge_count());
    graph
}

type PointKey = (u64, u64);

fn key(c: Coord<f64>) -> PointKey {
    (c.x.to_bits(), c.y.to_bits())
}

fn dist2(a: Coord<f64>, b: (f64, f64)) -> f64 {
    (a.x - b.0).powi(2) + (a.y - b.1).powi(2)
}

/// Union the lines' segments (shared segments count once), chain them
/// through degree-2 vertices and return the longest chain.
pub fn merge_lines(lines: &[LineString<f64>]) -> LineString<f64> {
    let mut coords: HashMap<PointKey, Coord<f64>> = HashMap::new();
    let mut vertex_order: Vec<PointKey> = Vec::new();
    let mut seen_segments: HashSet<(PointKey, PointKey)> = HashSet::new();
    let mut segments: Vec<(PointKey, PointKey)> = Vec::new();
    let mut adjacency: HashMap<PointKey, Vec<usize>> = HashMap::new();

    for line in lines {
        for w in line.0.windows(2) {
            let (a, b) = (key(w[0]), key(w[1]));
            if a == b {
                continue;
            }
            let undirected = (a.min(b), a.max(b));
            if !seen_segments.insert(undirected) {
                continue;
            }
            for (k, c) in [(a, w[0]), (b, w[1])] {
                if coords.insert(k, c).is_none() {
                    vertex_order.push(k);
                }
            }
            adjacency.entry(a).or_default().push(segments.len());
            adjacency.entry(b).or_default().push(segments.len());
            segments.push((a, b));
        }
    }

    let mut used = vec![false; segments.len()];
    let mut chains: Vec<Vec<PointKey>> = Vec::new();
    // Open chains start at ends and junctions; whatever is left is a ring.
    for pass_rings in [false, true] {
        for &v in &vertex_order {
            if !pass_rings && adjacency[&v].len() == 2 {
                continue;
            }
            while let Some(&seg) = adjacency[&v].iter().find(|&&s| !used[s]) {
                chains.push(walk(v, seg, &segments, &adjacency, &mut used));
            }
        }
    }

    let to_line = |chain: &[PointKey]| LineString::new(chain.iter().map(|k| coords[k]).collect());
    chains
        .iter()
        .map(|c| to_line(c.as_slice()))
        .fold(None, |best: Option<(f64, LineString<f64>)>, line| {
            let len = Euclidean.length(&line);
            match best {
                Some((best_len, _)) if best_len >= len => best,
                _ => Some((len, line)),
            }
        })
        .map(|(_, line)| line)
        .or_else(|| lines.first().cloned())
        .unwrap_or_else(|| LineString::new(Vec::new()))
}

fn walk(
    start: PointKey,
    first: usize,
    segments: &[(PointKey, PointKey)],
    adjacency: &HashMap<PointKey, Vec<usize>>,
    used: &mut [bool],
) -> Vec<PointKey> {
    let mut chain = vec![start];
    let mut current = start;
    let mut seg = first;
    loop {
        used[seg] = true;
        let (a, b) = segments[seg];
        current = if a == current { b } else { a };
        chain.push(current);
        let next = &adjacency[&current];
        if next.len() != 2 {
            break;
        }
        match next.iter().find(|&&s| !used[s]) {
            Some(&s) => seg = s,
            None => break,
        }
    }
    chain
}
