//! Bicycle route computation over a cached road network, and correlation of
//! those routes with clustered crash locations.
//!
//! - [`domain`]: value types (`BBox`, `RoadGraph`, route and cluster records)
//!   and geodesy helpers.
//! - [`application`]: graph cropping, edge classification, network loading,
//!   batch routing, crash clustering and route/cluster enrichment.
//! - [`infrastructure`]: on-disk graph cache, persistence, spatial index
//!   entries, network sources and settings.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{AtlasError, Result};
