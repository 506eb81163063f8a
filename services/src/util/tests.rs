use gdal::spatial_ref::SpatialRef;
use orthotile_datatypes::primitives::Coordinate2D;
use orthotile_datatypes::raster::{GeoTransform, RasterDataType, TileWindow};
use orthotile_datatypes::spatial_reference::SpatialReference;
use orthotile_operators::util::gdal::{GeoTiffOptions, RasterHandle, RasterMetadata};
use std::path::Path;

/// Writes a Lambert-93 byte raster with 0.5m pixels where every pixel has `value`
#[allow(clippy::missing_panics_doc)]
pub fn write_test_raster(path: &Path, width: usize, height: usize, bands: usize, value: u8) {
    let metadata = RasterMetadata {
        width,
        height,
        band_count: bands,
        data_type: RasterDataType::U8,
        no_data_value: None,
        spatial_reference: SpatialReference::epsg(2154).into(),
        projection_wkt: SpatialRef::from_epsg(2154)
            .and_then(|spatial_ref| spatial_ref.to_wkt())
            .expect("EPSG:2154 should be known to GDAL"),
        geo_transform: GeoTransform::new(Coordinate2D::new(700_000.0, 6_600_000.0), 0.5, -0.5),
    };

    let mut handle = RasterHandle::create_geotiff::<u8>(path, &metadata, &GeoTiffOptions::tile())
        .expect("test raster should be creatable");

    handle
        .write_window(
            &TileWindow::new(0, 0, width, height),
            vec![vec![value; width * height]; bands],
        )
        .expect("test raster should be writable");
}
