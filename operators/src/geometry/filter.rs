use geo::Polygon;
use orthotile_datatypes::spatial_reference::{SpatialReference, SpatialReferenceOption};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::polygon_set::{PolygonRole, PreparedPolygonSet, ReferencePolygonSet};
use crate::error;
use crate::util::{Result, safe_lock_mutex};

/// Keeps or rejects tile footprints against reference polygon sets.
///
/// A footprint is kept iff it satisfies every inclusion set and intersects no exclusion polygon.
/// Sets are reprojected to the CRS of a raster at most once, the result is cached per CRS.
#[derive(Debug)]
pub struct GeometryFilter {
    sets: Vec<ReferencePolygonSet>,
    cache: Mutex<HashMap<SpatialReference, Arc<PreparedGeometryFilter>>>,
}

impl GeometryFilter {
    pub fn new(sets: Vec<ReferencePolygonSet>) -> Self {
        if !sets.iter().any(|set| set.role().is_inclusion()) {
            warn!("No inclusion polygons are configured, every tile passes the inclusion test");
        }

        Self {
            sets,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Loads one set per file
    pub fn from_geojson_files<'p>(files: impl IntoIterator<Item = (&'p Path, PolygonRole)>) -> Result<Self> {
        let sets = files
            .into_iter()
            .map(|(path, role)| ReferencePolygonSet::from_geojson_file(path, role))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(sets))
    }

    pub fn sets(&self) -> &[ReferencePolygonSet] {
        &self.sets
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// The sets in the CRS of a raster, reprojecting and caching them on first use.
    ///
    /// Fails for rasters without a CRS unless no sets are configured.
    pub fn prepare(
        &self,
        raster_crs: SpatialReferenceOption,
        raster_path: &Path,
    ) -> Result<Arc<PreparedGeometryFilter>> {
        let raster_crs = match raster_crs {
            SpatialReferenceOption::SpatialReference(raster_crs) => raster_crs,
            SpatialReferenceOption::Unreferenced if self.sets.is_empty() => {
                return Ok(Arc::new(PreparedGeometryFilter::default()));
            }
            SpatialReferenceOption::Unreferenced => {
                return error::UnreferencedRaster { path: raster_path }.fail();
            }
        };

        // the lock is held during reprojection so that every CRS is projected once
        let mut cache = safe_lock_mutex(&self.cache);

        if let Some(prepared) = cache.get(&raster_crs) {
            return Ok(prepared.clone());
        }

        debug!("Reprojecting {} reference polygon sets to {raster_crs}", self.sets.len());

        let sets = self
            .sets
            .iter()
            .map(|set| set.reproject(raster_crs).map(|set| set.prepare()))
            .collect::<Result<Vec<_>>>()?;

        let prepared = Arc::new(PreparedGeometryFilter { sets });
        cache.insert(raster_crs, prepared.clone());

        Ok(prepared)
    }

    /// Whether a footprint in `raster_crs` is kept
    pub fn keep(&self, tile_footprint: &Polygon<f64>, raster_crs: SpatialReference) -> Result<bool> {
        let prepared = self.prepare(raster_crs.into(), Path::new(""))?;
        Ok(prepared.keep(tile_footprint))
    }

    /// The number of CRSs the sets have been reprojected to
    pub fn cached_crs_count(&self) -> usize {
        safe_lock_mutex(&self.cache).len()
    }
}

/// The sets of a `GeometryFilter` in the CRS of one raster
#[derive(Debug, Default)]
pub struct PreparedGeometryFilter {
    sets: Vec<PreparedPolygonSet>,
}

impl PreparedGeometryFilter {
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn keep(&self, tile_footprint: &Polygon<f64>) -> bool {
        let included = self
            .sets
            .iter()
            .filter(|set| set.role().is_inclusion())
            .all(|set| set.includes(tile_footprint));

        if !included {
            return false;
        }

        !self
            .sets
            .iter()
            .filter(|set| set.role() == PolygonRole::Exclusion)
            .any(|set| set.intersects_any(tile_footprint))
    }
}
