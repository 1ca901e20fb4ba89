//! Batch shortest-path routing over a processed road graph.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use petgraph::algo::astar;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

use crate::application::cropper::component_map;
use crate::domain::{haversine_m, LonLat, OdPair, RoadGraph, RouteBatch, RouteMethod, RouteResult};
use crate::infrastructure::NodeLocator;
use crate::Result;

/// Outcome of a node-to-node search.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSearch {
    Found(Vec<NodeIndex>),
    NoPath,
}

/// Owns a graph together with its weak-component map and nearest-node
/// index. Both are built once here; build a new `RouteBuilder` if the
/// graph changes.
pub struct RouteBuilder {
    graph: RoadGraph,
    components: HashMap<NodeIndex, usize>,
    nodes: NodeLocator,
}

impl RouteBuilder {
    pub fn new(graph: RoadGraph) -> Self {
        let components = component_map(&graph);
        let nodes = NodeLocator::new(&graph);
        Self {
            graph,
            components,
            nodes,
        }
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn into_graph(self) -> RoadGraph {
        self.graph
    }

    /// Route every pair on a pool of `n_jobs` workers (0 = all cores).
    /// Output position `i` always belongs to `pairs[i]`.
    pub fn build_routes(&self, pairs: &[OdPair], n_jobs: usize) -> Result<RouteBatch> {
        let pool = ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
        let total = pairs.len();
        let results: Vec<RouteResult> = pool.install(|| {
            pairs
                .par_iter()
                .enumerate()
                .map(|(index, pair)| {
                    debug!("Building route {}/{}", index + 1, total);
                    self.build_route(index, pair)
                })
                .collect()
        });

        let batch = RouteBatch::from_results(results);
        info!(
            "Built {} routes ({} routed, {} direct fallback)",
            batch.len(),
            batch.count(RouteMethod::Routed),
            batch.count(RouteMethod::DirectFallback)
        );
        Ok(batch)
    }

    pub fn build_route(&self, index: usize, pair: &OdPair) -> RouteResult {
        let &((start_lat, start_lon), (end_lat, end_lon)) = pair;
        let endpoints = (
            self.nearest_node(start_lon, start_lat),
            self.nearest_node(end_lon, end_lat),
        );
        if let (Some(s), Some(e)) = endpoints {
            if self.same_component(s, e) {
                if let PathSearch::Found(path) = self.shortest_path(s, e) {
                    let (coords, length_m) = self.nodes_to_coords(&path);
                    return RouteResult {
                        index,
                        coords,
                        length_m,
                        method: RouteMethod::Routed,
                    };
                }
            }
        }
        RouteResult {
            index,
            coords: vec![(start_lon, start_lat), (end_lon, end_lat)],
            length_m: haversine_m(start_lat, start_lon, end_lat, end_lon),
            method: RouteMethod::DirectFallback,
        }
    }

    pub fn nearest_node(&self, lon: f64, lat: f64) -> Option<NodeIndex> {
        self.nodes.nearest(lon, lat)
    }

    pub fn same_component(&self, a: NodeIndex, b: NodeIndex) -> bool {
        match (self.components.get(&a), self.components.get(&b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => false,
        }
    }

    /// Directed search by edge length, then the same search ignoring edge
    /// direction.
    pub fn shortest_path(&self, from: NodeIndex, to: NodeIndex) -> PathSearch {
        let directed = astar(
            &self.graph.graph,
            from,
            |n| n == to,
            |e| e.weight().length,
            |_| 0.0,
        );
        match directed {
            Some((_, path)) => PathSearch::Found(path),
            None => undirected_search(&self.graph, from, to),
        }
    }

    /// `(lon, lat)` polyline of a node path and its summed edge length.
    /// Steps with no edge between the two nodes contribute nothing.
    pub fn nodes_to_coords(&self, path: &[NodeIndex]) -> (Vec<LonLat>, f64) {
        let Some(&first) = path.first() else {
            return (Vec::new(), 0.0);
        };
        let mut coords = vec![self.graph.coord(first)];
        let mut length = 0.0;
        for step in path.windows(2) {
            let (u, v) = (step[0], step[1]);
            let Some(e) = self.shortest_edge_between(u, v) else {
                continue;
            };
            length += self.graph.graph[e].length;
            match &self.graph.graph[e].geometry {
                Some(line) => {
                    let mut pts: Vec<LonLat> = line.coords().map(|c| (c.x, c.y)).collect();
                    if starts_nearer_end(&pts, self.graph.coord(u)) {
                        pts.reverse();
                    }
                    coords.extend(pts.into_iter().skip(1));
                }
                None => coords.push(self.graph.coord(v)),
            }
        }
        (coords, length)
    }

    /// Shortest edge joining `u` and `v` in either direction.
    fn shortest_edge_between(&self, u: NodeIndex, v: NodeIndex) -> Option<EdgeIndex> {
        let g = &self.graph.graph;
        g.edges_directed(u, Direction::Outgoing)
            .filter(|e| e.target() == v)
            .chain(g.edges_directed(u, Direction::Incoming).filter(|e| e.source() == v))
            .min_by(|a, b| a.weight().length.total_cmp(&b.weight().length))
            .map(|e| e.id())
    }
}

fn starts_nearer_end(pts: &[LonLat], from: LonLat) -> bool {
    let (Some(&head), Some(&tail)) = (pts.first(), pts.last()) else {
        return false;
    };
    let d2 = |p: LonLat| (p.0 - from.0).powi(2) + (p.1 - from.1).powi(2);
    d2(tail) < d2(head)
}

#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: f64,
    node: NodeIndex,
}

impl Eq for State {}

impl Ord for State {
    // Reversed so the max-heap pops the cheapest state.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn undirected_search(graph: &RoadGraph, from: NodeIndex, to: NodeIndex) -> PathSearch {
    let g = &graph.graph;
    let mut dist: HashMap<NodeIndex, f64> = HashMap::new();
    let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(from, 0.0);
    heap.push(State { cost: 0.0, node: from });

    while let Some(State { cost, node }) = heap.pop() {
        if node == to {
            let mut path = vec![to];
            let mut cur = to;
            while let Some(&p) = prev.get(&cur) {
                path.push(p);
                cur = p;
            }
            path.reverse();
            return PathSearch::Found(path);
        }
        if dist.get(&node).is_some_and(|&d| cost > d) {
            continue;
        }
        let incident = g
            .edges_directed(node, Direction::Outgoing)
            .chain(g.edges_directed(node, Direction::Incoming));
        for e in incident {
            let next = if e.source() == node { e.target() } else { e.source() };
            let candidate = cost + e.weight().length;
            if dist.get(&next).map_or(true, |&d| candidate < d) {
                dist.insert(next, candidate);
                prev.insert(next, node);
                heap.push(State {
                    cost: candidate,
                    node: next,
                });
            }
        }
    }
    PathSearch::NoPath
}
