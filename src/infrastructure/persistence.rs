use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::domain::{BBox, OdPair, RoadGraph, RouteBatch};
use crate::infrastructure::PrecomputeSettings;
use crate::{AtlasError, Result};

/// Routes computed for a sample of rides, with what is needed to reproduce
/// them.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PrecomputedRoutes {
    pub pairs: Vec<OdPair>,
    pub batch: RouteBatch,
    pub bbox: BBox,
    pub settings: PrecomputeSettings,
}

pub fn save_bincode<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, data)?;
    Ok(())
}

pub fn load_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(AtlasError::MissingSource(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let data: T = bincode::deserialize_from(reader)?;
    Ok(data)
}

pub fn save_graph(graph: &RoadGraph, path: &Path) -> Result<()> {
    save_bincode(graph, path)
}

pub fn load_graph(path: &Path) -> Result<RoadGraph> {
    load_bincode(path)
}

pub fn save_routes(data: &PrecomputedRoutes, path: &Path) -> Result<()> {
    save_bincode(data, path)
}

pub fn load_routes(path: &Path) -> Result<PrecomputedRoutes> {
    load_bincode(path)
}
