use num_traits::AsPrimitive;
use orthotile_datatypes::raster::Pixel;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::outcome::SkipReason;
use crate::error;
use crate::util::Result;

const BLACK_INTENSITY: f64 = 0.0;
const WHITE_INTENSITY: f64 = 255.0;

/// The share of a tile, in percent, that may be black or white before the tile is dropped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentThresholds {
    pub black_threshold_pct: f64,
    pub white_threshold_pct: f64,
}

impl Default for ContentThresholds {
    fn default() -> Self {
        Self {
            black_threshold_pct: 5.0,
            white_threshold_pct: 10.0,
        }
    }
}

/// Black and white shares of a tile in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentStatistics {
    pub black_pct: f64,
    pub white_pct: f64,
}

/// Rejects tiles that are mostly empty (black) or overexposed (white).
///
/// The intensity of a pixel is the mean of its first three bands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContentFilter {
    thresholds: ContentThresholds,
}

impl ContentFilter {
    pub fn new(thresholds: ContentThresholds) -> Result<Self> {
        for (name, value) in [
            ("black", thresholds.black_threshold_pct),
            ("white", thresholds.white_threshold_pct),
        ] {
            ensure!(
                (0.0..=100.0).contains(&value),
                error::InvalidConfiguration {
                    reason: format!("{name} threshold {value} is not a percentage")
                }
            );
        }

        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> ContentThresholds {
        self.thresholds
    }

    /// Computes the black and white shares of a tile given as one buffer per band
    #[allow(clippy::float_cmp)]
    pub fn statistics<T: Pixel>(bands: &[Vec<T>], pixel_count: usize) -> ContentStatistics {
        let bands = &bands[..bands.len().min(3)];

        if bands.is_empty() || pixel_count == 0 {
            return ContentStatistics {
                black_pct: 0.0,
                white_pct: 0.0,
            };
        }

        let band_count = bands.len() as f64;
        let mut black = 0_usize;
        let mut white = 0_usize;

        for pixel in 0..pixel_count {
            let sum: f64 = bands
                .iter()
                .map(|band| AsPrimitive::<f64>::as_(band[pixel]))
                .sum();
            let intensity = sum / band_count;

            if intensity == BLACK_INTENSITY {
                black += 1;
            } else if intensity == WHITE_INTENSITY {
                white += 1;
            }
        }

        ContentStatistics {
            black_pct: percentage(black, pixel_count),
            white_pct: percentage(white, pixel_count),
        }
    }

    /// Returns why the tile is dropped, or `None` if it is kept. Black is checked before white.
    pub fn evaluate<T: Pixel>(&self, bands: &[Vec<T>], pixel_count: usize) -> Option<SkipReason> {
        let statistics = Self::statistics(bands, pixel_count);

        if statistics.black_pct > self.thresholds.black_threshold_pct {
            Some(SkipReason::TooBlack)
        } else if statistics.white_pct > self.thresholds.white_threshold_pct {
            Some(SkipReason::TooWhite)
        } else {
            None
        }
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    count as f64 * 100.0 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    const SIDE: usize = 100;
    const PIXELS: usize = SIDE * SIDE;

    /// A grey RGB tile with `black` black and `white` white pixels at its start
    fn rgb_tile(black: usize, white: usize) -> Vec<Vec<u8>> {
        let band: Vec<u8> = (0..PIXELS)
            .map(|i| {
                if i < black {
                    0
                } else if i < black + white {
                    255
                } else {
                    128
                }
            })
            .collect();

        vec![band.clone(), band.clone(), band]
    }

    #[test]
    fn black_threshold_boundary() {
        let filter = ContentFilter::default();

        // 500 of 10000 pixels are exactly 5%
        assert_eq!(filter.evaluate(&rgb_tile(500, 0), PIXELS), None);
        // 501 of 10000 pixels are 5.01%
        assert_eq!(
            filter.evaluate(&rgb_tile(501, 0), PIXELS),
            Some(SkipReason::TooBlack)
        );
    }

    #[test]
    fn white_threshold_boundary() {
        let filter = ContentFilter::default();

        assert_eq!(filter.evaluate(&rgb_tile(0, 1000), PIXELS), None);
        assert_eq!(
            filter.evaluate(&rgb_tile(0, 1001), PIXELS),
            Some(SkipReason::TooWhite)
        );
    }

    #[test]
    fn black_is_checked_first() {
        let filter = ContentFilter::default();

        assert_eq!(
            filter.evaluate(&rgb_tile(600, 2000), PIXELS),
            Some(SkipReason::TooBlack)
        );
    }

    #[test]
    fn intensity_is_the_mean_of_three_bands() {
        // only one band is black, the mean is not zero
        let mut bands = rgb_tile(0, 0);
        bands[0].iter_mut().for_each(|value| *value = 0);

        let statistics = ContentFilter::statistics(&bands, PIXELS);
        assert!(approx_eq!(f64, statistics.black_pct, 0.0));

        // a fourth band is ignored
        let mut bands = rgb_tile(PIXELS, 0);
        bands.push(vec![255; PIXELS]);

        let statistics = ContentFilter::statistics(&bands, PIXELS);
        assert!(approx_eq!(f64, statistics.black_pct, 100.0));
    }

    #[test]
    fn single_band_intensity() {
        let band: Vec<u16> = (0..PIXELS).map(|i| if i < 2000 { 255 } else { 300 }).collect();

        let statistics = ContentFilter::statistics(&[band], PIXELS);

        assert!(approx_eq!(f64, statistics.white_pct, 20.0));
        assert!(approx_eq!(f64, statistics.black_pct, 0.0));
    }

    #[test]
    fn configured_thresholds() {
        let filter = ContentFilter::new(ContentThresholds {
            black_threshold_pct: 0.0,
            white_threshold_pct: 100.0,
        })
        .unwrap();

        assert_eq!(
            filter.evaluate(&rgb_tile(1, 0), PIXELS),
            Some(SkipReason::TooBlack)
        );
        assert_eq!(filter.evaluate(&rgb_tile(0, PIXELS), PIXELS), None);
    }

    #[test]
    fn invalid_thresholds() {
        assert!(
            ContentFilter::new(ContentThresholds {
                black_threshold_pct: -1.0,
                white_threshold_pct: 10.0,
            })
            .is_err()
        );
        assert!(
            ContentFilter::new(ContentThresholds {
                black_threshold_pct: 5.0,
                white_threshold_pct: f64::NAN,
            })
            .is_err()
        );
    }
}
