mod bbox;
mod geodesy;
mod models;
mod tags;

pub use bbox::{BBox, Side, DEFAULT_CONTAINS_TOL, DEFAULT_EQ_TOL, OSM_ORDER};
pub use geodesy::{haversine_m, polyline_length_m, LocalMetric, EARTH_RADIUS_M};
pub use models::{
    CrashCluster, Crs, EdgeData, EnrichedCrashCluster, LatLon, LonLat, NodeData, OdPair,
    RoadGraph, RouteBatch, RouteMethod, RouteResult,
};
pub use tags::{normalize_tags, TagValue, Tags};
