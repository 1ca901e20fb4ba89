mod graph_cache;
mod persistence;
mod settings;
mod source;
mod spatial;

pub use graph_cache::{entry_key, CacheEntry, CacheStage, GraphCache};
pub use persistence::{
    load_bincode, load_graph, load_routes, save_bincode, save_graph, save_routes, PrecomputedRoutes,
};
pub use settings::{load_settings, ClusterSettings, PrecomputeSettings};
pub use source::{edge_from_tags, JsonlNetworkSource, NetworkSource, TagFilter, FERRY_FILTER};
pub use spatial::{build_buffer_index, build_node_index, line_envelope, BufferEnvelope, NodeLocator, SpatialNode};
