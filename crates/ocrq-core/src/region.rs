//! Caller-specified regions and their pixel-space counterparts.
//!
//! A [`Region`] is unit-agnostic: the proxy only checks that it is a
//! well-formed rectangle description, while the worker converts it into a
//! [`PixelBox`] against the decoded image.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest slice of the raw input quoted back in validation errors.
const MAX_QUOTED_INPUT: usize = 120;

/// Rectangular sub-area of the source image, `(xtl, ytl)` to `(xbr, ybr)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub xtl: f64,
    pub ytl: f64,
    pub xbr: f64,
    pub ybr: f64,
}

impl Region {
    /// Creates a new region.
    pub const fn new(xtl: f64, ytl: f64, xbr: f64, ybr: f64) -> Self {
        Self { xtl, ytl, xbr, ybr }
    }

    /// Region covering a whole `width` x `height` image.
    pub fn whole(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, f64::from(width), f64::from(height))
    }

    /// Returns `true` if the corners are ordered (`xtl < xbr` and `ytl < ybr`).
    pub fn is_well_ordered(&self) -> bool {
        self.xtl < self.xbr && self.ytl < self.ybr
    }

    /// Checks the schema constraints: every bound finite and non-negative.
    ///
    /// Corner ordering is not checked here; unordered regions are accepted
    /// and later contribute an empty transcription.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.bounds() {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_input().with_message(format!(
                    "region bound {name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Parses a JSON list of regions, rejecting the whole list on the first
    /// element that does not satisfy the schema.
    ///
    /// Empty input, whitespace, `null` and `[]` all mean "whole image" and
    /// yield an empty list.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Vec::new());
        }

        let regions: Vec<Self> = serde_json::from_str(trimmed).map_err(|e| {
            Error::invalid_input()
                .with_message(format!(
                    "invalid regions format: {e} in '{}'",
                    quote_input(trimmed)
                ))
                .with_source(e)
        })?;

        for (index, region) in regions.iter().enumerate() {
            region.validate().map_err(|e| {
                Error::invalid_input().with_message(format!(
                    "invalid region #{index} in '{}': {}",
                    quote_input(trimmed),
                    e.message_or_kind()
                ))
            })?;
        }

        Ok(regions)
    }

    fn bounds(&self) -> [(&'static str, f64); 4] {
        [
            ("xtl", self.xtl),
            ("ytl", self.ytl),
            ("xbr", self.xbr),
            ("ybr", self.ybr),
        ]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) -> ({}, {})",
            self.xtl, self.ytl, self.xbr, self.ybr
        )
    }
}

fn quote_input(raw: &str) -> &str {
    match raw.char_indices().nth(MAX_QUOTED_INPUT) {
        Some((end, _)) => &raw[..end],
        None => raw,
    }
}

/// Integer pixel bounding box, `[xtl, xbr) x [ytl, ybr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelBox {
    pub xtl: u32,
    pub ytl: u32,
    pub xbr: u32,
    pub ybr: u32,
}

impl PixelBox {
    /// Rounds each bound of `region` to the nearest pixel, flooring at zero.
    pub fn from_region(region: &Region) -> Self {
        Self {
            xtl: to_pixel(region.xtl),
            ytl: to_pixel(region.ytl),
            xbr: to_pixel(region.xbr),
            ybr: to_pixel(region.ybr),
        }
    }

    /// Box covering a whole `width` x `height` image.
    pub fn whole(width: u32, height: u32) -> Self {
        Self {
            xtl: 0,
            ytl: 0,
            xbr: width,
            ybr: height,
        }
    }

    /// Limits the box to a `width` x `height` image.
    #[must_use]
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        Self {
            xtl: self.xtl.min(width),
            ytl: self.ytl.min(height),
            xbr: self.xbr.min(width),
            ybr: self.ybr.min(height),
        }
    }

    /// Returns `true` if the box has no area.
    pub fn is_degenerate(&self) -> bool {
        self.xtl >= self.xbr || self.ytl >= self.ybr
    }

    /// Width in pixels (zero when degenerate).
    pub fn width(&self) -> u32 {
        self.xbr.saturating_sub(self.xtl)
    }

    /// Height in pixels (zero when degenerate).
    pub fn height(&self) -> u32 {
        self.ybr.saturating_sub(self.ytl)
    }

    /// Top-left corner as a translation offset.
    pub fn origin(&self) -> (f64, f64) {
        (f64::from(self.xtl), f64::from(self.ytl))
    }
}

fn to_pixel(coord: f64) -> u32 {
    if coord.is_nan() {
        return 0;
    }
    // `as` saturates at the u32 bounds.
    coord.round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn empty_inputs_mean_whole_image() {
        for raw in ["", "   ", "[]", " [ ] ", "null"] {
            assert!(Region::parse_list(raw).unwrap().is_empty(), "{raw:?}");
        }
    }

    #[test]
    fn parses_integers_and_floats() {
        let raw = r#"[{"xtl": 0, "ytl": 0, "xbr": 100, "ybr": 100},
                      {"xtl": 0.5, "ytl": 0.6, "xbr": 0.7, "ybr": 0.8}]"#;
        let regions = Region::parse_list(raw).unwrap();
        assert_eq!(
            regions,
            vec![
                Region::new(0.0, 0.0, 100.0, 100.0),
                Region::new(0.5, 0.6, 0.7, 0.8),
            ]
        );
    }

    #[test]
    fn rejects_malformed_json_and_quotes_input() {
        let error = Region::parse_list("[{\"xtl\": 1,").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert!(error.to_string().contains("[{\"xtl\": 1,"));
    }

    #[test]
    fn rejects_whole_list_on_one_bad_element() {
        let raw = r#"[{"xtl": 0, "ytl": 0, "xbr": 10, "ybr": 10},
                      {"xtl": 0, "ytl": 0, "xbr": 10}]"#;
        let error = Region::parse_list(raw).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert!(error.to_string().contains("ybr"));
    }

    #[test]
    fn rejects_wrong_types_and_negative_bounds() {
        assert!(Region::parse_list(r#"[{"xtl": "a", "ytl": 0, "xbr": 1, "ybr": 1}]"#).is_err());
        assert!(Region::parse_list(r#"{"xtl": 0, "ytl": 0, "xbr": 1, "ybr": 1}"#).is_err());

        let error =
            Region::parse_list(r#"[{"xtl": -1, "ytl": 0, "xbr": 1, "ybr": 1}]"#).unwrap_err();
        assert!(error.to_string().contains("region #0"));
    }

    #[test]
    fn unordered_regions_pass_validation() {
        let regions = Region::parse_list(r#"[{"xtl": 10, "ytl": 0, "xbr": 5, "ybr": 1}]"#).unwrap();
        assert_eq!(regions.len(), 1);
        assert!(!regions[0].is_well_ordered());
    }

    #[test]
    fn pixel_box_rounds_and_clamps() {
        let pixel_box = PixelBox::from_region(&Region::new(0.4, 1.6, 99.5, 250.0));
        assert_eq!(
            pixel_box,
            PixelBox {
                xtl: 0,
                ytl: 2,
                xbr: 100,
                ybr: 250
            }
        );

        let clamped = pixel_box.clamp_to(80, 200);
        assert_eq!(clamped.width(), 80);
        assert_eq!(clamped.height(), 198);
        assert!(!clamped.is_degenerate());
    }

    #[test]
    fn pixel_box_degenerate_after_clamp() {
        let pixel_box = PixelBox::from_region(&Region::new(300.0, 0.0, 400.0, 10.0)).clamp_to(200, 200);
        assert!(pixel_box.is_degenerate());
        assert_eq!(pixel_box.width(), 0);
    }

    #[test]
    fn fractional_coordinates_collapse() {
        let pixel_box = PixelBox::from_region(&Region::new(0.1, 0.1, 0.4, 0.4));
        assert!(pixel_box.is_degenerate());
    }
}
