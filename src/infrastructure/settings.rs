use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{AtlasError, Result};

/// Knobs for the route precomputation run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PrecomputeSettings {
    pub sample_size: usize,
    /// Degrees added on every side of the rides' extent.
    pub bbox_pad: f64,
    pub random_seed: u64,
    /// Worker threads for routing; 0 uses every available core.
    pub n_jobs: usize,
    pub output_path: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for PrecomputeSettings {
    fn default() -> Self {
        Self {
            sample_size: 40_000,
            bbox_pad: 0.02,
            random_seed: 42,
            n_jobs: 0,
            output_path: PathBuf::from("cache/precomputed_routes.bin"),
            cache_dir: PathBuf::from("cache/traffic_network"),
        }
    }
}

/// Greedy crash clustering parameters, all in metres except `max_size`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ClusterSettings {
    pub buffer_m: f64,
    pub max_size: usize,
    pub max_dist_m: f64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            buffer_m: 50.0,
            max_size: 10,
            max_dist_m: 50.0,
        }
    }
}

/// Read a JSON settings file. Keys that are absent keep their defaults.
pub fn load_settings<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    if !path.exists() {
        return Err(AtlasError::MissingSource(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"sample_size": 500, "n_jobs": 4}"#).unwrap();
        let s: PrecomputeSettings = load_settings(&path).unwrap();
        assert_eq!(s.sample_size, 500);
        assert_eq!(s.n_jobs, 4);
        assert_eq!(s.random_seed, 42);
        assert_eq!(s.bbox_pad, 0.02);
    }

    #[test]
    fn cluster_defaults() {
        let s: ClusterSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, ClusterSettings::default());
    }

    #[test]
    fn missing_settings_is_fatal() {
        let err = load_settings::<ClusterSettings>(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, AtlasError::MissingSource(_)));
    }
}
