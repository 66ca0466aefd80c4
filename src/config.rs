//! Configuration types for PDF flattening.
//!
//! All flattening behaviour is controlled through [`FlattenConfig`], built via
//! its [`FlattenConfigBuilder`]. Setters never fail; [`FlattenConfigBuilder::build`]
//! validates everything at once and returns the first problem as a
//! [`FlattenError`] from the resolve stage.

use crate::error::{DateField, FlattenError};
use crate::progress::ProgressCallback;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default rendering resolution.
pub const DEFAULT_DPI: u32 = 200;

/// Highest accepted DPI. A Letter page at 2400 DPI is already ~540 MB of RGB.
pub const MAX_DPI: u32 = 2400;

/// Default JPEG quality for embedded page images.
pub const DEFAULT_JPEG_QUALITY: u8 = 50;

/// Configuration for a flattening run.
///
/// Built via [`FlattenConfig::builder()`] or using [`FlattenConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_flattener::FlattenConfig;
///
/// let config = FlattenConfig::builder()
///     .dpi(300)
///     .creation_date("2020-01-01")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 300);
/// ```
#[derive(Clone)]
pub struct FlattenConfig {
    /// Rendering DPI. Must be 1–2400. Default: 200.
    ///
    /// The assembled page size is `pixels × 72 / dpi` points, so changing the
    /// DPI changes image sharpness and file size but not the printed size.
    pub dpi: u32,

    /// JPEG quality (1–100) of the embedded page images. Default: 50.
    pub jpeg_quality: u8,

    /// Dates to write into the output's `/Info` dictionary.
    pub dates: MetadataDates,

    /// Time zone in which a bare calendar date is anchored. Default: UTC.
    pub date_zone: DateZone,

    /// Take the time of day from the source document's own dates instead of
    /// using midnight. Default: false.
    pub keep_source_time: bool,

    /// Also set the output file's filesystem access/modification times to the
    /// patched date. Default: false.
    pub set_file_times: bool,

    /// Optional stage/page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            dates: MetadataDates::default(),
            date_zone: DateZone::default(),
            keep_source_time: false,
            set_file_times: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FlattenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlattenConfig")
            .field("dpi", &self.dpi)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("dates", &self.dates)
            .field("date_zone", &self.date_zone)
            .field("keep_source_time", &self.keep_source_time)
            .field("set_file_times", &self.set_file_times)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn FlattenProgressCallback>"),
            )
            .finish()
    }
}

impl FlattenConfig {
    /// Create a new builder for `FlattenConfig`.
    pub fn builder() -> FlattenConfigBuilder {
        FlattenConfigBuilder {
            config: Self::default(),
            creation_date: None,
            modification_date: None,
        }
    }
}

/// Builder for [`FlattenConfig`].
///
/// Dates are taken as raw strings and parsed in [`build`](Self::build), so
/// the error can name the offending option.
#[derive(Debug)]
pub struct FlattenConfigBuilder {
    config: FlattenConfig,
    creation_date: Option<String>,
    modification_date: Option<String>,
}

impl FlattenConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    /// Creation date as `YYYY-MM-DD`.
    pub fn creation_date(mut self, date: impl Into<String>) -> Self {
        self.creation_date = Some(date.into());
        self
    }

    /// Modification date as `YYYY-MM-DD`.
    pub fn modification_date(mut self, date: impl Into<String>) -> Self {
        self.modification_date = Some(date.into());
        self
    }

    pub fn date_zone(mut self, zone: DateZone) -> Self {
        self.config.date_zone = zone;
        self
    }

    pub fn keep_source_time(mut self, v: bool) -> Self {
        self.config.keep_source_time = v;
        self
    }

    pub fn set_file_times(mut self, v: bool) -> Self {
        self.config.set_file_times = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FlattenConfig, FlattenError> {
        let mut config = self.config;

        if config.dpi == 0 || config.dpi > MAX_DPI {
            return Err(FlattenError::InvalidArgument(format!(
                "DPI must be a positive integer no greater than {MAX_DPI}, got {}",
                config.dpi
            )));
        }
        if !(1..=100).contains(&config.jpeg_quality) {
            return Err(FlattenError::InvalidArgument(format!(
                "JPEG quality must be 1–100, got {}",
                config.jpeg_quality
            )));
        }

        config.dates = MetadataDates {
            creation: self
                .creation_date
                .as_deref()
                .map(|s| parse_date(DateField::Creation, s))
                .transpose()?,
            modification: self
                .modification_date
                .as_deref()
                .map(|s| parse_date(DateField::Modification, s))
                .transpose()?,
        };

        Ok(config)
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date.
///
/// chrono alone accepts unpadded fields such as `2020-1-5`; the shape check
/// rejects those before the calendar check rejects dates like `2021-02-30`.
pub fn parse_date(field: DateField, value: &str) -> Result<NaiveDate, FlattenError> {
    let invalid = || FlattenError::InvalidDateFormat {
        field,
        value: value.to_string(),
    };

    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

// ── Dates ────────────────────────────────────────────────────────────────

/// Calendar dates requested for the output's `/Info` dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDates {
    /// New `/CreationDate`, if any.
    pub creation: Option<NaiveDate>,
    /// New `/ModDate`, if any.
    pub modification: Option<NaiveDate>,
}

impl MetadataDates {
    /// `true` when neither date was supplied and the patch stage is a no-op.
    pub fn is_empty(&self) -> bool {
        self.creation.is_none() && self.modification.is_none()
    }
}

/// Time zone used to turn a calendar date into an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateZone {
    /// Midnight UTC, written as `+00'00'`. (default)
    #[default]
    Utc,
    /// Midnight in the machine's local time zone, with its offset.
    Local,
}
