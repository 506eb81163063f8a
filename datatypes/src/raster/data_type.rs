use crate::error::{self, Error};
use gdal::raster::{GdalDataType, GdalType};
use num_traits::{AsPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// A collection of required traits for a pixel type
pub trait Pixel:
    'static
    + Copy
    + std::fmt::Debug
    + Sync
    + Send
    + Zero
    + PartialOrd
    + AsPrimitive<u8>
    + AsPrimitive<f64>
    + GdalType
    + StaticRasterDataType
{
}

impl Pixel for u8 {}
impl Pixel for u16 {}
impl Pixel for i16 {}
impl Pixel for u32 {}
impl Pixel for i32 {}
impl Pixel for f32 {}
impl Pixel for f64 {}

/// The pixel data types that rasters of this crate may carry.
///
/// The 64 bit integer and signed byte types of newer GDAL versions are not supported.
#[derive(
    Debug,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    Copy,
    Clone,
    strum::Display,
    strum::EnumIter,
)]
pub enum RasterDataType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl TryFrom<GdalDataType> for RasterDataType {
    type Error = Error;

    fn try_from(gdal_data_type: GdalDataType) -> Result<Self, Self::Error> {
        match gdal_data_type {
            GdalDataType::UInt8 => Ok(RasterDataType::U8),
            GdalDataType::UInt16 => Ok(RasterDataType::U16),
            GdalDataType::Int16 => Ok(RasterDataType::I16),
            GdalDataType::UInt32 => Ok(RasterDataType::U32),
            GdalDataType::Int32 => Ok(RasterDataType::I32),
            GdalDataType::Float32 => Ok(RasterDataType::F32),
            GdalDataType::Float64 => Ok(RasterDataType::F64),
            other => error::UnsupportedGdalDataType {
                data_type: format!("{other:?}"),
            }
            .fail(),
        }
    }
}

pub trait StaticRasterDataType: Copy + Default + 'static {
    const TYPE: RasterDataType;
}

impl StaticRasterDataType for u8 {
    const TYPE: RasterDataType = RasterDataType::U8;
}

impl StaticRasterDataType for u16 {
    const TYPE: RasterDataType = RasterDataType::U16;
}

impl StaticRasterDataType for i16 {
    const TYPE: RasterDataType = RasterDataType::I16;
}

impl StaticRasterDataType for u32 {
    const TYPE: RasterDataType = RasterDataType::U32;
}

impl StaticRasterDataType for i32 {
    const TYPE: RasterDataType = RasterDataType::I32;
}

impl StaticRasterDataType for f32 {
    const TYPE: RasterDataType = RasterDataType::F32;
}

impl StaticRasterDataType for f64 {
    const TYPE: RasterDataType = RasterDataType::F64;
}

/// Calls the given generic expression with a type alias `$pixel` bound to the primitive
/// type of the given `RasterDataType`.
///
/// ```
/// use orthotile_datatypes::{call_with_pixel_type, raster::{RasterDataType, StaticRasterDataType}};
///
/// let data_type = RasterDataType::U16;
/// let round_trip = call_with_pixel_type!(data_type, P => P::TYPE);
///
/// assert_eq!(round_trip, RasterDataType::U16);
/// ```
#[macro_export]
macro_rules! call_with_pixel_type {
    ($data_type:expr, $pixel:ident => $body:expr) => {
        match $data_type {
            $crate::raster::RasterDataType::U8 => {
                type $pixel = u8;
                $body
            }
            $crate::raster::RasterDataType::U16 => {
                type $pixel = u16;
                $body
            }
            $crate::raster::RasterDataType::I16 => {
                type $pixel = i16;
                $body
            }
            $crate::raster::RasterDataType::U32 => {
                type $pixel = u32;
                $body
            }
            $crate::raster::RasterDataType::I32 => {
                type $pixel = i32;
                $body
            }
            $crate::raster::RasterDataType::F32 => {
                type $pixel = f32;
                $body
            }
            $crate::raster::RasterDataType::F64 => {
                type $pixel = f64;
                $body
            }
        }
    };
}
