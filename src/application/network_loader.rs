use std::path::Path;
use tracing::{info, warn};

use crate::application::consolidate::{
    consolidate_intersections, local_crs_for, project_graph, INTERSECTION_TOLERANCE_M,
};
use crate::application::cropper::{crop_and_prune_largest, crop_to_bbox, keep_largest_component};
use crate::application::edge_ferry::{connect_ferry_terminals, FERRY_SNAP_DISTANCE_M};
use crate::application::edge_filter::{dissolve_bidirectional_edges, filter_street_edges};
use crate::domain::{BBox, Crs, RoadGraph};
use crate::infrastructure::{CacheStage, GraphCache, NetworkSource};
use crate::{AtlasError, Result};

/// Bump to invalidate cached raw graphs.
pub const RAW_CACHE_VERSION: &str = "1";
/// Bump whenever postprocessing changes.
pub const PROCESSED_CACHE_VERSION: &str = "2";
pub const BIKE_NETWORK: &str = "bike";

/// Raw and processed graphs for a bbox, each stage served from its own
/// cache with superset reuse.
pub struct TrafficNetworkLoader<S> {
    source: S,
    raw_cache: GraphCache,
    processed_cache: GraphCache,
}

impl<S: NetworkSource> TrafficNetworkLoader<S> {
    pub fn new(source: S, cache_dir: &Path) -> Result<Self> {
        Ok(Self {
            source,
            raw_cache: GraphCache::open(cache_dir.join("raw"), CacheStage::Raw, RAW_CACHE_VERSION)?,
            processed_cache: GraphCache::open(
                cache_dir.join("processed"),
                CacheStage::Processed,
                PROCESSED_CACHE_VERSION,
            )?,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn load_bike_network(&mut self, bbox: &BBox) -> Result<RoadGraph> {
        self.load_graph(bbox, BIKE_NETWORK, "")
    }

    pub fn load_graph(&mut self, bbox: &BBox, network_type: &str, custom_filter: &str) -> Result<RoadGraph> {
        info!("Loading graph for {}", bbox);
        let Self {
            source,
            raw_cache,
            processed_cache,
        } = self;
        let graph = processed_cache.fetch(
            bbox,
            network_type,
            custom_filter,
            || {
                let raw = raw_cache.fetch(
                    bbox,
                    network_type,
                    custom_filter,
                    || fetch_raw(&*source, bbox, network_type, custom_filter),
                    crop_to_bbox,
                )?;
                Ok(graph_postprocessing(raw))
            },
            crop_and_prune_largest,
        )?;
        info!(
            "Loaded graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

fn fetch_raw<S: NetworkSource>(source: &S, bbox: &BBox, network_type: &str, custom_filter: &str) -> Result<RoadGraph> {
    let base = source.fetch_network(bbox, network_type, custom_filter)?;
    if base.edge_count() == 0 {
        return Err(AtlasError::NetworkFetch(format!(
            "no {network_type} network edges inside {bbox}"
        )));
    }
    Ok(add_ferry_edges(source, base, bbox))
}

/// Merge the source's ferry routes into `graph`. Any failure leaves the
/// base graph as it was.
pub fn add_ferry_edges<S: NetworkSource>(source: &S, graph: RoadGraph, bbox: &BBox) -> RoadGraph {
    match source.fetch_ferries(bbox) {
        Ok(ferries) if ferries.edge_count() == 0 => graph,
        Ok(ferries) => {
            let added = ferries.edge_count();
            let merged = compose(graph, ferries);
            info!("Added ferry edges: {}", added);
            merged
        }
        Err(err) => {
            warn!("Failed to add ferry edges: {}", err);
            graph
        }
    }
}

/// Union of two graphs with nodes matched by source id. Overlay edges are
/// marked as ferries.
pub fn compose(mut base: RoadGraph, overlay: RoadGraph) -> RoadGraph {
    for e in overlay.graph.edge_indices() {
        let Some((u, v)) = overlay.graph.edge_endpoints(e) else {
            continue;
        };
        let nu = base.add_node(overlay.graph[u].clone());
        let nv = base.add_node(overlay.graph[v].clone());
        let mut data = overlay.graph[e].clone();
        if data.route.is_empty() {
            data.route.insert("ferry".to_string());
        }
        if data.highway.is_empty() {
            data.highway.insert("ferry".to_string());
        }
        data.ferry = true;
        base.add_edge(nu, nv, data);
    }
    base
}

/// Clean topology in a metric CRS, then return the largest component in
/// WGS84.
pub fn graph_postprocessing(graph: RoadGraph) -> RoadGraph {
    let Some(local) = local_crs_for(&graph) else {
        return graph;
    };
    let projected = project_graph(graph, local);
    let mut projected = consolidate_intersections(projected, INTERSECTION_TOLERANCE_M);
    connect_ferry_terminals(&mut projected, FERRY_SNAP_DISTANCE_M);
    filter_street_edges(&mut projected);
    let dissolved = dissolve_bidirectional_edges(projected);
    let latlon = project_graph(dissolved, Crs::Wgs84);
    keep_largest_component(latlon)
}
