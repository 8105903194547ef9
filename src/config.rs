use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Anchor for the identifier stamp. The metadata annotation is always drawn
/// at the diagonally opposite corner so the two never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StampPosition {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl StampPosition {
    pub fn is_top(self) -> bool {
        matches!(
            self,
            StampPosition::TopLeft | StampPosition::TopCenter | StampPosition::TopRight
        )
    }

    pub fn is_right(self) -> bool {
        matches!(self, StampPosition::TopRight | StampPosition::BottomRight)
    }
}

/// How manifest rows are partitioned into output documents.
///
/// A closed set: adding a strategy means adding a variant and a key builder,
/// checked at compile time rather than falling through a string match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GroupStrategy {
    /// `"{date}_{type}"`
    DateAndType,
    /// `"{date}"`
    Date,
    /// `"{type}"`
    Type,
    /// `"Settlement_{settlement_date}"`
    SettlementDate,
    /// `"DOCS_{date-only}"`, time-of-day dropped.
    DayBucket,
    /// `"{asset_class}"`
    AssetClass,
    /// `"{counterparty}"`
    Counterparty,
    /// Everything into one `ALL_DOCUMENTS` composite.
    None,
}

/// RGB fill color for stamp text, each channel in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

pub const BLACK: StampColor = StampColor {
    r: 0.0,
    g: 0.0,
    b: 0.0,
};

/// 40% gray used for the metadata annotation.
pub const ANNOTATION_GRAY: StampColor = StampColor {
    r: 0.4,
    g: 0.4,
    b: 0.4,
};

/// Stamp geometry constants. The horizontal text extent is approximated as
/// `chars * CHAR_WIDTH`, which keeps the stamp's outer edge a fixed margin
/// from the page edge without measuring glyphs.
pub const STAMP_MARGIN_X: f32 = 20.0;
pub const STAMP_MARGIN_Y: f32 = 20.0;
pub const CHAR_WIDTH: f32 = 6.0;
/// Top-anchored stamps sit this far below the top margin.
pub const TOP_DROP: f32 = 10.0;

/// Metadata annotation offsets (opposite-corner placement).
pub const ANNOTATION_OFFSET_X: f32 = 200.0;
pub const ANNOTATION_OFFSET_Y: f32 = 25.0;
pub const ANNOTATION_BOTTOM_Y: f32 = 15.0;

/// Full configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Text prepended to every sequence number, e.g. `"DOC-"`.
    pub prefix: String,
    /// First sequence number of the run.
    pub start_number: u64,
    /// Zero-padding width for sequence numbers.
    pub digits: u32,
    pub position: StampPosition,
    pub group_by: GroupStrategy,
    /// When false, priority is ignored by the row sequencer.
    pub priority_ordering: bool,
    /// When false, no metadata annotation is drawn.
    pub metadata_enabled: bool,
    /// Upper bound on groups assembled in parallel within one batch.
    pub max_concurrent_groups: usize,
    /// Rows handled per chunk inside a group; bounds working set only.
    pub rows_per_chunk: usize,
    pub stamp_font_size: f32,
    pub stamp_color: StampColor,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            prefix: "DOC-".to_string(),
            start_number: 1,
            digits: 6,
            position: StampPosition::BottomRight,
            group_by: GroupStrategy::DateAndType,
            priority_ordering: true,
            metadata_enabled: true,
            max_concurrent_groups: 4,
            rows_per_chunk: 50,
            stamp_font_size: 10.0,
            stamp_color: BLACK,
        }
    }
}

impl RunConfig {
    /// Rejects configurations the scheduler cannot honor. Called once before
    /// any group starts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.digits < 1 {
            return Err(PipelineError::InvalidConfig(
                "digits must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_groups == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_concurrent_groups must be positive".to_string(),
            ));
        }
        if self.rows_per_chunk == 0 {
            return Err(PipelineError::InvalidConfig(
                "rows_per_chunk must be positive".to_string(),
            ));
        }
        if !self.stamp_font_size.is_finite() || self.stamp_font_size <= 0.0 {
            return Err(PipelineError::InvalidConfig(
                "stamp_font_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
