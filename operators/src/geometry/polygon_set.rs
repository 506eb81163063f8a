use geo::{BooleanOps, BoundingRect, Coord, Intersects, MapCoords, MultiPolygon, Polygon, Rect, Relate};
use geojson::GeoJson;
use orthotile_datatypes::spatial_reference::SpatialReference;
use proj::Proj;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::Path;
use tracing::{debug, warn};

use crate::error;
use crate::util::Result;

/// How a footprint has to relate to an inclusion set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum SpatialPredicate {
    /// The footprint intersects at least one polygon of the set
    Intersects,
    /// The footprint lies inside the union of the set
    Within,
}

/// The part a polygon set plays in the geometry filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PolygonRole {
    Inclusion { predicate: SpatialPredicate },
    Exclusion,
}

impl PolygonRole {
    pub fn intersecting() -> Self {
        Self::Inclusion {
            predicate: SpatialPredicate::Intersects,
        }
    }

    pub fn within() -> Self {
        Self::Inclusion {
            predicate: SpatialPredicate::Within,
        }
    }

    pub fn is_inclusion(&self) -> bool {
        matches!(self, PolygonRole::Inclusion { .. })
    }
}

/// A named set of reference polygons in one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePolygonSet {
    name: String,
    spatial_reference: SpatialReference,
    polygons: MultiPolygon<f64>,
    role: PolygonRole,
}

impl ReferencePolygonSet {
    pub fn new(
        name: impl Into<String>,
        spatial_reference: SpatialReference,
        polygons: MultiPolygon<f64>,
        role: PolygonRole,
    ) -> Self {
        Self {
            name: name.into(),
            spatial_reference,
            polygons,
            role,
        }
    }

    /// Loads the polygons of a GeoJSON file.
    ///
    /// The CRS is taken from a legacy `crs` member if present, otherwise it is WGS 84.
    /// Non-areal geometries are skipped.
    pub fn from_geojson_file(path: &Path, role: PolygonRole) -> Result<Self> {
        let text = std::fs::read_to_string(path).context(error::IoAtPath { path })?;
        let geojson = text.parse::<GeoJson>().context(error::GeoJson { path })?;

        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned());

        Self::from_geojson(&name, &geojson, role).map_err(|e| match e {
            error::Error::GeoJson { source, .. } => error::Error::GeoJson {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Loads the polygons of a parsed GeoJSON document
    pub fn from_geojson(name: &str, geojson: &GeoJson, role: PolygonRole) -> Result<Self> {
        let spatial_reference = geojson_crs(geojson)?;

        let collection =
            geojson::quick_collection::<f64>(geojson).context(error::GeoJson { path: name })?;

        let mut polygons = Vec::new();
        let mut skipped = 0;
        collect_polygons(collection.0, &mut polygons, &mut skipped);

        if skipped > 0 {
            warn!("Skipped {skipped} non-polygon geometries of reference set {name}");
        }

        debug!(
            "Loaded {} polygons of reference set {name} in {spatial_reference}",
            polygons.len()
        );

        Ok(Self::new(
            name,
            spatial_reference,
            MultiPolygon::new(polygons),
            role,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spatial_reference(&self) -> SpatialReference {
        self.spatial_reference
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    pub fn role(&self) -> PolygonRole {
        self.role
    }

    /// Returns a copy of the set with all coordinates projected to `target`
    pub fn reproject(&self, target: SpatialReference) -> Result<Self> {
        if self.spatial_reference == target {
            return Ok(self.clone());
        }

        let from = self.spatial_reference;
        let projector = Proj::new_known_crs(&from.srs_string(), &target.srs_string(), None)
            .context(error::ProjCreate { from, to: target })?;

        let polygons = self
            .polygons
            .try_map_coords(|coord: Coord<f64>| {
                projector
                    .convert((coord.x, coord.y))
                    .map(|(x, y)| Coord { x, y })
            })
            .context(error::Proj { from, to: target })?;

        Ok(Self {
            name: self.name.clone(),
            spatial_reference: target,
            polygons,
            role: self.role,
        })
    }

    /// Precomputes what testing footprints against this set needs
    pub(crate) fn prepare(&self) -> PreparedPolygonSet {
        let union = match self.role {
            PolygonRole::Inclusion {
                predicate: SpatialPredicate::Within,
            } => Some(union_of(&self.polygons)),
            _ => None,
        };

        PreparedPolygonSet {
            role: self.role,
            bounds: self.polygons.bounding_rect(),
            polygons: self.polygons.clone(),
            union,
        }
    }
}

/// A polygon set in the CRS of a raster, ready for testing footprints
#[derive(Debug, Clone)]
pub(crate) struct PreparedPolygonSet {
    role: PolygonRole,
    bounds: Option<Rect<f64>>,
    polygons: MultiPolygon<f64>,
    union: Option<MultiPolygon<f64>>,
}

impl PreparedPolygonSet {
    pub fn role(&self) -> PolygonRole {
        self.role
    }

    pub fn intersects_any(&self, footprint: &Polygon<f64>) -> bool {
        let (Some(bounds), Some(footprint_bounds)) = (self.bounds, footprint.bounding_rect()) else {
            return false;
        };

        if !bounds.intersects(&footprint_bounds) {
            return false;
        }

        self.polygons
            .iter()
            .any(|polygon| polygon.intersects(footprint))
    }

    pub fn contains(&self, footprint: &Polygon<f64>) -> bool {
        let Some(union) = &self.union else {
            return false;
        };

        if union.0.is_empty() {
            return false;
        }

        union.relate(footprint).is_contains()
    }

    /// Whether the footprint satisfies the inclusion predicate of this set
    pub fn includes(&self, footprint: &Polygon<f64>) -> bool {
        match self.role {
            PolygonRole::Inclusion {
                predicate: SpatialPredicate::Intersects,
            } => self.intersects_any(footprint),
            PolygonRole::Inclusion {
                predicate: SpatialPredicate::Within,
            } => self.contains(footprint),
            PolygonRole::Exclusion => true,
        }
    }
}

fn union_of(polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    polygons
        .iter()
        .fold(MultiPolygon::new(Vec::new()), |union, polygon| {
            union.union(&MultiPolygon::new(vec![polygon.clone()]))
        })
}

fn collect_polygons(
    geometries: Vec<geo::Geometry<f64>>,
    polygons: &mut Vec<Polygon<f64>>,
    skipped: &mut usize,
) {
    for geometry in geometries {
        match geometry {
            geo::Geometry::Polygon(polygon) => polygons.push(polygon),
            geo::Geometry::MultiPolygon(multi_polygon) => polygons.extend(multi_polygon),
            geo::Geometry::Rect(rect) => polygons.push(rect.to_polygon()),
            geo::Geometry::Triangle(triangle) => polygons.push(triangle.to_polygon()),
            geo::Geometry::GeometryCollection(collection) => {
                collect_polygons(collection.0, polygons, skipped);
            }
            _ => *skipped += 1,
        }
    }
}

/// Reads the legacy `crs` member of a GeoJSON document, defaulting to WGS 84
fn geojson_crs(geojson: &GeoJson) -> Result<SpatialReference> {
    let foreign_members = match geojson {
        GeoJson::FeatureCollection(collection) => collection.foreign_members.as_ref(),
        GeoJson::Feature(feature) => feature.foreign_members.as_ref(),
        GeoJson::Geometry(geometry) => geometry.foreign_members.as_ref(),
    };

    let crs_name = foreign_members
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|properties| properties.get("name"))
        .and_then(serde_json::Value::as_str);

    match crs_name {
        Some(name) => Ok(SpatialReference::from_geojson_crs_name(name)?),
        None => Ok(SpatialReference::epsg_4326()),
    }
}
