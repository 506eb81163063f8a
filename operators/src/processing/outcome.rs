use orthotile_datatypes::raster::TileWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a tile was not written although nothing went wrong
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    NoIntersection,
    TooBlack,
    TooWhite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum TileStatus {
    Written,
    Skipped(SkipReason),
    Failed(String),
}

/// The result of processing one tile window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOutcome {
    pub tile_id: String,
    pub window: TileWindow,
    pub status: TileStatus,
}

impl TileOutcome {
    pub fn new(tile_id: impl Into<String>, window: TileWindow, status: TileStatus) -> Self {
        Self {
            tile_id: tile_id.into(),
            window,
            status,
        }
    }

    /// Skipped tiles count as successes, only failures do not
    pub fn success(&self) -> bool {
        !matches!(self.status, TileStatus::Failed(_))
    }

    /// The skip reason or error message, `None` for written tiles
    pub fn reason(&self) -> Option<String> {
        match &self.status {
            TileStatus::Written => None,
            TileStatus::Skipped(reason) => Some(reason.to_string()),
            TileStatus::Failed(message) => Some(message.clone()),
        }
    }
}

/// Counts of the outcomes of one extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub total: usize,
    pub written: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Identifiers and messages of failed tiles, ordered by identifier
    pub failed: Vec<(String, String)>,
}

impl ExtractionReport {
    pub fn from_outcomes(outcomes: &[TileOutcome]) -> Self {
        let mut report = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            match &outcome.status {
                TileStatus::Written => report.written += 1,
                TileStatus::Skipped(reason) => *report.skipped.entry(*reason).or_default() += 1,
                TileStatus::Failed(message) => {
                    report.failed.push((outcome.tile_id.clone(), message.clone()));
                }
            }
        }

        report.failed.sort();
        report
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or_default()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles: {} written, {} skipped ({} no_intersection, {} too_black, {} too_white), {} failed",
            self.total,
            self.written,
            self.skipped_total(),
            self.skipped_for(SkipReason::NoIntersection),
            self.skipped_for(SkipReason::TooBlack),
            self.skipped_for(SkipReason::TooWhite),
            self.failed.len()
        )?;

        for (tile_id, message) in &self.failed {
            write!(f, "\n\t* {tile_id}: {message}")?;
        }

        Ok(())
    }
}
