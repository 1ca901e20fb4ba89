pub mod consolidate;
pub mod crash_cluster;
pub mod cropper;
pub mod edge_ferry;
pub mod edge_filter;
pub mod enrichment;
pub mod network_loader;
pub mod route_builder;

pub use consolidate::{consolidate_intersections, local_crs_for, project_graph, INTERSECTION_TOLERANCE_M};
pub use crash_cluster::{CrashClusterer, BUFFER_SEGMENTS};
pub use cropper::{
    component_map, crop_and_prune_largest, crop_to_bbox, keep_largest_component, largest_component,
    weak_components,
};
pub use edge_ferry::{connect_ferry_terminals, is_ferry_edge, FERRY_SNAP_DISTANCE_M};
pub use edge_filter::{dissolve_bidirectional_edges, filter_street_edges, keep_edge, merge_lines};
pub use enrichment::{enrich_clusters, ClusterEnricher};
pub use network_loader::{
    add_ferry_edges, compose, graph_postprocessing, TrafficNetworkLoader, BIKE_NETWORK,
    PROCESSED_CACHE_VERSION, RAW_CACHE_VERSION,
};
pub use route_builder::{PathSearch, RouteBuilder};
