use hashbrown::{HashMap, HashSet};
use petgraph::stable_graph::NodeIndex;
use petgraph::unionfind::UnionFind;
use petgraph::visit::NodeIndexable;

use crate::domain::{BBox, RoadGraph};

/// Weakly connected components, enumerated by their lowest node index.
/// Members of each component are in ascending index order.
pub fn weak_components(graph: &RoadGraph) -> Vec<Vec<NodeIndex>> {
    let g = &graph.graph;
    let mut uf = UnionFind::<usize>::new(g.node_bound());
    for e in g.edge_indices() {
        if let Some((u, v)) = g.edge_endpoints(e) {
            uf.union(u.index(), v.index());
        }
    }
    let mut slot: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<NodeIndex>> = Vec::new();
    for n in g.node_indices() {
        let root = uf.find(n.index());
        let i = *slot.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[i].push(n);
    }
    components
}

/// Node → component id, ids as enumerated by [`weak_components`].
pub fn component_map(graph: &RoadGraph) -> HashMap<NodeIndex, usize> {
    weak_components(graph)
        .into_iter()
        .enumerate()
        .flat_map(|(id, nodes)| nodes.into_iter().map(move |n| (n, id)))
        .collect()
}

/// Nodes of the largest weak component. On ties the component enumerated
/// first (lowest node index) wins.
pub fn largest_component(graph: &RoadGraph) -> HashSet<NodeIndex> {
    let mut best: Vec<NodeIndex> = Vec::new();
    for comp in weak_components(graph) {
        if comp.len() > best.len() {
            best = comp;
        }
    }
    best.into_iter().collect()
}

pub fn keep_largest_component(mut graph: RoadGraph) -> RoadGraph {
    let keep = largest_component(&graph);
    graph.retain_nodes(|n, _| keep.contains(&n));
    graph
}

/// Induced subgraph on nodes inside `bbox` (boundary inclusive). The
/// graph's CRS tag is carried over unchanged.
pub fn crop_to_bbox(mut graph: RoadGraph, bbox: &BBox) -> RoadGraph {
    graph.retain_nodes(|_, node| bbox.contains_point(node.x, node.y, 0.0));
    graph
}

pub fn crop_and_prune_largest(graph: RoadGraph, bbox: &BBox) -> RoadGraph {
    let cropped = crop_to_bbox(graph, bbox);
    if cropped.is_empty() {
        return cropped;
    }
    keep_largest_component(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Crs, EdgeData, NodeData};

    /// Two chains: 1-2-3 near the origin and 10-11 further east.
    fn two_islands() -> RoadGraph {
        let mut g = RoadGraph::new(Crs::Wgs84);
        let pts = [(1, 0.1, 0.1), (2, 0.2, 0.1), (3, 0.3, 0.2), (10, 0.8, 0.8), (11, 0.9, 0.8)];
        for (id, x, y) in pts {
            g.add_node(NodeData { id, x, y });
        }
        let idx = |g: &RoadGraph, id| g.node_map[&id];
        for (u, v) in [(1, 2), (3, 2), (10, 11)] {
            let (a, b) = (idx(&g, u), idx(&g, v));
            g.add_edge(a, b, EdgeData::new(10.0));
        }
        g
    }

    #[test]
    fn components_ignore_direction() {
        let g = two_islands();
        let comps = weak_components(&g);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].len(), 3);
        let map = component_map(&g);
        assert_eq!(map[&g.node_map[&1]], map[&g.node_map[&3]]);
        assert_ne!(map[&g.node_map[&1]], map[&g.node_map[&10]]);
    }

    #[test]
    fn crop_is_inclusive_and_induces_edges() {
        let g = two_islands();
        let cropped = crop_to_bbox(g, &BBox::new(0.2, 0.0, 0.2, 0.0));
        assert_eq!(cropped.node_ids(), vec![1, 2]);
        assert_eq!(cropped.edge_count(), 1);
        assert_eq!(cropped.crs, Crs::Wgs84);
    }

    #[test]
    fn crop_is_idempotent() {
        let b = BBox::new(0.85, 0.0, 0.85, 0.15);
        let once = crop_to_bbox(two_islands(), &b);
        let twice = crop_to_bbox(once.clone(), &b);
        assert_eq!(once.node_ids(), twice.node_ids());
        assert_eq!(once.edge_count(), twice.edge_count());
    }

    #[test]
    fn prune_keeps_largest_component() {
        let pruned = crop_and_prune_largest(two_islands(), &BBox::new(1.0, 0.0, 1.0, 0.0));
        assert_eq!(pruned.node_ids(), vec![1, 2, 3]);
        let empty = crop_and_prune_largest(two_islands(), &BBox::new(-1.0, -2.0, -1.0, -2.0));
        assert!(empty.is_empty());
    }

    #[test]
    fn tie_goes_to_first_enumerated() {
        let g = crop_to_bbox(two_islands(), &BBox::new(1.0, 0.0, 1.0, 0.15));
        // 2-3 and 10-11 are both size two; node 2 was inserted first.
        assert_eq!(keep_largest_component(g).node_ids(), vec![2, 3]);
    }
}
