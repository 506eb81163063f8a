use crate::error;
use crate::util::Result;
use gdal::spatial_ref::SpatialRef;
use snafu::ResultExt;
use std::str::FromStr;

/// A spatial reference authority that is part of a spatial reference definition
///
/// Only EPSG codes are understood, they are what orthophotos and reference polygons carry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SpatialReferenceAuthority {
    Epsg,
}

impl std::fmt::Display for SpatialReferenceAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SpatialReferenceAuthority::Epsg => "EPSG",
            }
        )
    }
}

impl FromStr for SpatialReferenceAuthority {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "EPSG" => SpatialReferenceAuthority::Epsg,
            _ => {
                return error::InvalidSpatialReferenceString {
                    spatial_reference_string: s,
                }
                .fail();
            }
        })
    }
}

/// The identity of a coordinate reference system: an authority and a code.
///
/// Two rasters or polygon sets are in the same CRS iff their `SpatialReference`s are equal,
/// which makes this type usable as a cache key for reprojected geometries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SpatialReference {
    authority: SpatialReferenceAuthority,
    code: u32,
}

impl SpatialReference {
    pub fn new(authority: SpatialReferenceAuthority, code: u32) -> Self {
        Self { authority, code }
    }

    pub fn epsg(code: u32) -> Self {
        Self::new(SpatialReferenceAuthority::Epsg, code)
    }

    /// the WGS 84 spatial reference system
    pub fn epsg_4326() -> Self {
        Self::epsg(4326)
    }

    pub fn authority(&self) -> SpatialReferenceAuthority {
        self.authority
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    /// The `AUTHORITY:CODE` definition PROJ and GDAL understand
    pub fn srs_string(&self) -> String {
        format!("{}:{}", self.authority, self.code)
    }

    /// Parses the `name` property of a GeoJSON `crs` member.
    ///
    /// Accepts OGC URNs (`urn:ogc:def:crs:EPSG::2154`, `urn:ogc:def:crs:EPSG:6.6:2154`),
    /// plain `AUTHORITY:CODE` strings and the `CRS84` aliases, which map to EPSG:4326.
    ///
    /// # Examples
    ///
    /// ```
    /// use orthotile_datatypes::spatial_reference::SpatialReference;
    ///
    /// let lambert_93 = SpatialReference::from_geojson_crs_name("urn:ogc:def:crs:EPSG::2154").unwrap();
    /// assert_eq!(lambert_93, SpatialReference::epsg(2154));
    /// ```
    pub fn from_geojson_crs_name(name: &str) -> Result<Self> {
        let name = name.trim();

        if name.eq_ignore_ascii_case("CRS84") || name.to_ascii_uppercase().ends_with(":CRS84") {
            return Ok(Self::epsg_4326());
        }

        if let Some(urn) = name.strip_prefix("urn:ogc:def:crs:") {
            // AUTHORITY:[VERSION]:CODE
            let mut parts = urn.split(':');
            return match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(authority), Some(_version), Some(code), None) => Ok(Self::new(
                    authority.parse()?,
                    code.parse::<u32>().context(error::ParseU32)?,
                )),
                _ => error::InvalidSpatialReferenceString {
                    spatial_reference_string: name,
                }
                .fail(),
            };
        }

        name.parse()
    }
}

impl std::fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

impl FromStr for SpatialReference {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split(':');

        match (split.next(), split.next(), split.next()) {
            (Some(authority), Some(code), None) => Ok(Self::new(
                authority.parse()?,
                code.parse::<u32>().context(error::ParseU32)?,
            )),
            _ => error::InvalidSpatialReferenceString {
                spatial_reference_string: s,
            }
            .fail(),
        }
    }
}

impl TryFrom<&SpatialRef> for SpatialReference {
    type Error = error::Error;

    fn try_from(spatial_ref: &SpatialRef) -> Result<Self, Self::Error> {
        let authority = spatial_ref
            .auth_name()
            .context(error::MissingSpatialReferenceAuthority)?;
        let code = spatial_ref
            .auth_code()
            .context(error::MissingSpatialReferenceAuthority)?;

        let code = u32::try_from(code).map_err(|_| error::Error::InvalidSpatialReferenceString {
            spatial_reference_string: format!("{authority}:{code}"),
        })?;

        Ok(Self::new(authority.parse()?, code))
    }
}

/// The CRS of a raster, which may be missing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SpatialReferenceOption {
    SpatialReference(SpatialReference),
    Unreferenced,
}

impl SpatialReferenceOption {
    pub fn is_unreferenced(&self) -> bool {
        matches!(self, SpatialReferenceOption::Unreferenced)
    }
}

impl std::fmt::Display for SpatialReferenceOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpatialReferenceOption::SpatialReference(p) => write!(f, "{p}"),
            SpatialReferenceOption::Unreferenced => Ok(()),
        }
    }
}

impl From<SpatialReference> for SpatialReferenceOption {
    fn from(spatial_reference: SpatialReference) -> Self {
        Self::SpatialReference(spatial_reference)
    }
}

impl From<Option<SpatialReference>> for SpatialReferenceOption {
    fn from(option: Option<SpatialReference>) -> Self {
        match option {
            Some(p) => SpatialReferenceOption::SpatialReference(p),
            None => SpatialReferenceOption::Unreferenced,
        }
    }
}

impl From<SpatialReferenceOption> for Option<SpatialReference> {
    fn from(option: SpatialReferenceOption) -> Self {
        match option {
            SpatialReferenceOption::SpatialReference(p) => Some(p),
            SpatialReferenceOption::Unreferenced => None,
        }
    }
}
