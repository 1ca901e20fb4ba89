//! Persistent graph cache with superset reuse.
//!
//! Entries are keyed by `(stage, version, network_type, custom_filter)` and
//! indexed by the bbox they cover. A request is served from the smallest
//! cached extent that contains it, cropped to the request when the extents
//! differ; the crop is stored as a new entry. Nothing is ever overwritten
//! or deleted, so concurrent writers at worst duplicate work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::{BBox, RoadGraph, DEFAULT_CONTAINS_TOL, DEFAULT_EQ_TOL};
use crate::infrastructure::persistence::{load_graph, save_graph};
use crate::Result;

const GRAPH_EXT: &str = "graph";
const META_EXT: &str = "cacheinfo";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheStage {
    Raw,
    Processed,
}

impl CacheStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStage::Raw => "raw",
            CacheStage::Processed => "processed",
        }
    }
}

impl fmt::Display for CacheStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of one stored graph. Immutable once written.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub stage: CacheStage,
    pub bbox: BBox,
    pub network_type: String,
    pub custom_filter: String,
    pub version: String,
    pub graph_path: PathBuf,
}

impl CacheEntry {
    pub fn load_graph(&self) -> Result<RoadGraph> {
        load_graph(&self.graph_path)
    }

    pub fn contains(&self, target: &BBox) -> bool {
        self.bbox.contains_bbox(target, DEFAULT_CONTAINS_TOL)
    }

    pub fn area(&self) -> f64 {
        self.bbox.area()
    }
}

/// Content hash naming the files of an entry.
pub fn entry_key(
    stage: CacheStage,
    version: &str,
    bbox: &BBox,
    network_type: &str,
    custom_filter: &str,
) -> String {
    let raw = format!(
        "{}_{}_{}_{}_{}_{}_{}_{}",
        stage, version, bbox.west, bbox.south, bbox.east, bbox.north, network_type, custom_filter
    );
    format!("{:016x}", seahash::hash(raw.as_bytes()))
}

pub struct GraphCache {
    cache_dir: PathBuf,
    stage: CacheStage,
    version: String,
    entries: Vec<CacheEntry>,
}

impl GraphCache {
    /// Open (creating if needed) the cache directory and load every
    /// readable entry of this stage and version.
    pub fn open(cache_dir: impl Into<PathBuf>, stage: CacheStage, version: &str) -> Result<Self> {
        let mut cache = Self {
            cache_dir: cache_dir.into(),
            stage,
            version: version.to_string(),
            entries: Vec::new(),
        };
        cache.load_entries()?;
        Ok(cache)
    }

    pub fn stage(&self) -> CacheStage {
        self.stage
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Return the graph for `bbox`, from cache when a covering entry exists,
    /// otherwise from `build_fn`. Non-exact hits go through `crop_fn` and
    /// are persisted under the requested bbox.
    pub fn fetch<B, C>(
        &mut self,
        bbox: &BBox,
        network_type: &str,
        custom_filter: &str,
        build_fn: B,
        crop_fn: C,
    ) -> Result<RoadGraph>
    where
        B: FnOnce() -> Result<RoadGraph>,
        C: FnOnce(RoadGraph, &BBox) -> RoadGraph,
    {
        if let Some(existing) = self.find_covering_entry(bbox, network_type, custom_filter).cloned() {
            let graph = existing.load_graph()?;
            if existing.bbox.equals(bbox, DEFAULT_EQ_TOL) {
                info!("Using cached {} graph for {}", self.stage, bbox);
                return Ok(graph);
            }
            info!(
                "Using cached {} graph ({}) and cropping to {}",
                self.stage, existing.bbox, bbox
            );
            let cropped = crop_fn(graph, bbox);
            self.store_graph(&cropped, bbox, network_type, custom_filter)?;
            return Ok(cropped);
        }

        let graph = build_fn()?;
        info!("Caching new {} graph for {}", self.stage, bbox);
        self.store_graph(&graph, bbox, network_type, custom_filter)?;
        Ok(graph)
    }

    /// Smallest-area entry of this stage/version/key that contains `bbox`.
    pub fn find_covering_entry(
        &self,
        bbox: &BBox,
        network_type: &str,
        custom_filter: &str,
    ) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .filter(|e| {
                e.stage == self.stage
                    && e.version == self.version
                    && e.network_type == network_type
                    && e.custom_filter == custom_filter
                    && e.contains(bbox)
            })
            .fold(None, |best: Option<&CacheEntry>, e| match best {
                Some(b) if b.area() <= e.area() => Some(b),
                _ => Some(e),
            })
    }

    fn store_graph(
        &mut self,
        graph: &RoadGraph,
        bbox: &BBox,
        network_type: &str,
        custom_filter: &str,
    ) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let key = entry_key(self.stage, &self.version, bbox, network_type, custom_filter);
        let graph_path = self.cache_dir.join(format!("{key}.{GRAPH_EXT}"));
        save_graph(graph, &graph_path)?;
        let entry = CacheEntry {
            stage: self.stage,
            bbox: *bbox,
            network_type: network_type.to_string(),
            custom_filter: custom_filter.to_string(),
            version: self.version.clone(),
            graph_path,
        };
        let meta_path = entry.graph_path.with_extension(META_EXT);
        fs::write(&meta_path, serde_json::to_vec_pretty(&entry)?)?;
        self.entries.push(entry);
        Ok(())
    }

    fn load_entries(&mut self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let mut meta_files: Vec<PathBuf> = fs::read_dir(&self.cache_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == META_EXT))
            .collect();
        meta_files.sort();
        for path in meta_files {
            match read_entry(&path) {
                Ok(entry) => {
                    if entry.version != self.version || entry.stage != self.stage {
                        continue;
                    }
                    if !entry.graph_path.exists() {
                        warn!(
                            "Skipping cache entry {}: graph file {} is missing",
                            path.display(),
                            entry.graph_path.display()
                        );
                        continue;
                    }
                    self.entries.push(entry);
                }
                Err(err) => warn!("Failed to load cache entry {}: {}", path.display(), err),
            }
        }
        info!(
            "Loaded {} {} cache entries from {}",
            self.entries.len(),
            self.stage,
            self.cache_dir.display()
        );
        Ok(())
    }
}

fn read_entry(path: &Path) -> Result<CacheEntry> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
