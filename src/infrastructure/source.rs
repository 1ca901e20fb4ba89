//! Raw road network sources.
//!
//! The loader only sees [`NetworkSource`]; [`JsonlNetworkSource`] reads an
//! OSM-derived line-delimited export:
//!
//! ```text
//! {"type":"meta", ...}
//! {"type":"node","id":42,"x":-73.98,"y":40.75}
//! {"type":"edge","u":42,"v":43,"length_m":81.2,"tags":{"highway":"residential"},"geometry":[[-73.98,40.75],...]}
//! ```

use geo::LineString;
use hashbrown::HashSet;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::{normalize_tags, BBox, Crs, EdgeData, NodeData, RoadGraph, TagValue, Tags};
use crate::{AtlasError, Result};

/// Overpass-style selector for ferry routes.
pub const FERRY_FILTER: &str = r#"["route"="ferry"]"#;

pub trait NetworkSource {
    /// Nodes inside `bbox` and the edges between them whose tags pass
    /// `custom_filter`.
    fn fetch_network(&self, bbox: &BBox, network_type: &str, custom_filter: &str) -> Result<RoadGraph>;

    fn fetch_ferries(&self, bbox: &BBox) -> Result<RoadGraph> {
        self.fetch_network(bbox, "all", FERRY_FILTER)
    }
}

/// AND-ed `["key"="value"]` / `["key"]` clauses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagFilter {
    clauses: Vec<(String, Option<String>)>,
}

impl TagFilter {
    pub fn parse(expr: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        let mut rest = expr.trim();
        while !rest.is_empty() {
            let body = rest
                .strip_prefix('[')
                .and_then(|r| r.find(']').map(|end| (&r[..end], &r[end + 1..])));
            let (body, tail) = body.ok_or_else(|| invalid_filter(expr))?;
            let clause = match body.split_once('=') {
                Some((k, v)) => (unquote(k).ok_or_else(|| invalid_filter(expr))?, Some(unquote(v).ok_or_else(|| invalid_filter(expr))?)),
                None => (unquote(body).ok_or_else(|| invalid_filter(expr))?, None),
            };
            clauses.push(clause);
            rest = tail.trim_start();
        }
        Ok(Self { clauses })
    }

    pub fn matches(&self, tags: &BTreeMap<String, Tags>) -> bool {
        self.clauses.iter().all(|(key, value)| match (tags.get(key), value) {
            (Some(found), Some(value)) => found.contains(value),
            (Some(found), None) => !found.is_empty(),
            (None, _) => false,
        })
    }
}

fn unquote(s: &str) -> Option<String> {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::to_string)
}

fn invalid_filter(expr: &str) -> AtlasError {
    AtlasError::NetworkFetch(format!("invalid filter expression {expr:?}"))
}

/// Split normalized tags into the typed edge record.
pub fn edge_from_tags(length: f64, mut tags: BTreeMap<String, Tags>, geometry: Option<LineString<f64>>) -> EdgeData {
    let mut take = |key: &str| tags.remove(key).unwrap_or_default();
    let ferry = take("ferry").contains("true");
    let highway = take("highway");
    let route = take("route");
    let service = take("service");
    let railway = take("railway");
    let bicycle = take("bicycle");
    let name = take("name");
    EdgeData {
        length,
        geometry,
        ferry,
        highway,
        route,
        service,
        railway,
        bicycle,
        name,
        extra: tags,
    }
}

pub struct JsonlNetworkSource {
    path: PathBuf,
}

impl JsonlNetworkSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NetworkSource for JsonlNetworkSource {
    fn fetch_network(&self, bbox: &BBox, network_type: &str, custom_filter: &str) -> Result<RoadGraph> {
        if !self.path.exists() {
            return Err(AtlasError::MissingSource(self.path.clone()));
        }
        debug!("Reading {} network from {}", network_type, self.path.display());
        let filter = TagFilter::parse(custom_filter)?;
        let reader = BufReader::new(File::open(&self.path)?);
        let mut graph = RoadGraph::new(Crs::Wgs84);
        let mut seen: HashSet<u64> = HashSet::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: serde_json::Value = serde_json::from_str(&line)?;
            let bad = |reason: &str| AtlasError::InvalidRecord {
                line: line_no,
                reason: reason.to_string(),
            };
            match record["type"].as_str() {
                Some("meta") => {}
                Some("node") => {
                    let id = record["id"].as_u64().ok_or_else(|| bad("invalid node id"))?;
                    let x = record["x"].as_f64().ok_or_else(|| bad("invalid x"))?;
                    let y = record["y"].as_f64().ok_or_else(|| bad("invalid y"))?;
                    seen.insert(id);
                    if bbox.contains_point(x, y, 0.0) {
                        graph.add_node(NodeData { id, x, y });
                    }
                }
                Some("edge") => {
                    let u = record["u"].as_u64().ok_or_else(|| bad("invalid u"))?;
                    let v = record["v"].as_u64().ok_or_else(|| bad("invalid v"))?;
                    if !seen.contains(&u) || !seen.contains(&v) {
                        return Err(bad("edge references an unknown node"));
                    }
                    let (Some(&u_idx), Some(&v_idx)) = (graph.node_map.get(&u), graph.node_map.get(&v)) else {
                        continue;
                    };
                    let length = record["length_m"].as_f64().ok_or_else(|| bad("invalid length"))?;
                    let raw_tags: BTreeMap<String, Option<TagValue>> = match record.get("tags") {
                        Some(tags) if !tags.is_null() => serde_json::from_value(tags.clone())?,
                        _ => BTreeMap::new(),
                    };
                    let tags: BTreeMap<String, Tags> = raw_tags
                        .into_iter()
                        .map(|(k, v)| (k, normalize_tags(v.as_ref())))
                        .collect();
                    if !filter.matches(&tags) {
                        continue;
                    }
                    let geometry = match record.get("geometry") {
                        Some(g) if !g.is_null() => {
                            let coords: Vec<(f64, f64)> = serde_json::from_value(g.clone())?;
                            Some(LineString::from(coords))
                        }
                        _ => None,
                    };
                    graph.add_edge(u_idx, v_idx, edge_from_tags(length, tags, geometry));
                }
                _ => return Err(bad("unknown record type")),
            }
        }

        // Only nodes that belong to a selected way are part of the network.
        let touched: HashSet<_> = graph
            .graph
            .edge_indices()
            .filter_map(|e| graph.graph.edge_endpoints(e))
            .flat_map(|(u, v)| [u, v])
            .collect();
        graph.retain_nodes(|n, _| touched.contains(&n));
        info!(
            "Read {} nodes and {} edges for {} from {}",
            graph.node_count(),
            graph.edge_count(),
            bbox,
            self.path.display()
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{"type":"meta","source":"test"}
{"type":"node","id":1,"x":0.1,"y":0.1}
{"type":"node","id":2,"x":0.2,"y":0.1}
{"type":"node","id":3,"x":0.3,"y":0.1}
{"type":"node","id":4,"x":5.0,"y":5.0}
{"type":"edge","u":1,"v":2,"length_m":11.0,"tags":{"highway":"residential","name":["Main St",null]}}
{"type":"edge","u":2,"v":3,"length_m":12.0,"tags":{"route":"ferry","ferry":true},"geometry":[[0.2,0.1],[0.25,0.12],[0.3,0.1]]}
{"type":"edge","u":3,"v":4,"length_m":900.0,"tags":{"highway":"primary","lanes":2}}
"#;

    fn sample_file() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        f
    }

    fn unit() -> BBox {
        BBox::new(1.0, 0.0, 1.0, 0.0)
    }

    #[test]
    fn filter_parsing() {
        let f = TagFilter::parse(r#"["route"="ferry"]["name"]"#).unwrap();
        let mut tags = BTreeMap::new();
        tags.insert("route".to_string(), Tags::from(["ferry".to_string()]));
        assert!(!f.matches(&tags));
        tags.insert("name".to_string(), Tags::from(["X".to_string()]));
        assert!(f.matches(&tags));
        assert!(TagFilter::parse("").unwrap().matches(&BTreeMap::new()));
        assert!(TagFilter::parse("[route=ferry").is_err());
    }

    #[test]
    fn reads_bbox_subset_with_typed_tags() {
        let file = sample_file();
        let src = JsonlNetworkSource::new(file.path());
        let g = src.fetch_network(&unit(), "bike", "").unwrap();
        assert_eq!(g.node_ids(), vec![1, 2, 3]);
        assert_eq!(g.edge_count(), 2);
        let ferry = g.graph.edge_weights().find(|e| e.ferry).unwrap();
        assert_eq!(ferry.geometry.as_ref().map(|l| l.0.len()), Some(3));
        let street = g.graph.edge_weights().find(|e| !e.ferry).unwrap();
        assert!(street.highway.contains("residential"));
        assert_eq!(street.name.len(), 1);
    }

    #[test]
    fn ferry_overlay_uses_filter() {
        let file = sample_file();
        let src = JsonlNetworkSource::new(file.path());
        let g = src.fetch_ferries(&unit()).unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.node_ids(), vec![2, 3]);
    }

    #[test]
    fn missing_file_is_fatal() {
        let src = JsonlNetworkSource::new("/no/such/network.jsonl");
        let err = src.fetch_network(&unit(), "bike", "").unwrap_err();
        assert!(matches!(err, AtlasError::MissingSource(_)));
    }

    #[test]
    fn unknown_record_type_reports_line() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"{\"type\":\"node\",\"id\":1,\"x\":0.1,\"y\":0.1}\n{\"type\":\"way\"}\n").unwrap();
        let err = JsonlNetworkSource::new(f.path()).fetch_network(&unit(), "bike", "").unwrap_err();
        assert!(matches!(err, AtlasError::InvalidRecord { line: 2, .. }));
    }
}
