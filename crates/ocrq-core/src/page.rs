//! Engine-native recognition, layout and table results.
//!
//! These are produced in crop-local coordinates and moved into image space
//! with [`Shift`](crate::mapper::Shift) and [`Merge`](crate::mapper::Merge).

use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, Polygon};

/// A single recognized character with its outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharBox {
    pub text: String,
    pub confidence: f32,
    pub polygon: Polygon,
}

/// A recognized text line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub confidence: f32,
    pub polygon: Polygon,
    #[serde(default)]
    pub chars: Vec<CharBox>,
}

impl TextLine {
    /// Creates a line without character-level detail.
    pub fn new(text: impl Into<String>, confidence: f32, polygon: Polygon) -> Self {
        Self {
            text: text.into(),
            confidence,
            polygon,
            chars: Vec::new(),
        }
    }
}

/// Text recognition output for one image or crop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub text_lines: Vec<TextLine>,
    #[serde(default)]
    pub image_bbox: Option<BBox>,
}

/// A detected layout block (paragraph, title, figure, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub label: String,
    pub position: u32,
    pub confidence: f32,
    pub polygon: Polygon,
}

/// Layout detection output for one image or crop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutPage {
    pub bboxes: Vec<LayoutBox>,
    #[serde(default)]
    pub image_bbox: Option<BBox>,
    #[serde(default)]
    pub sliced: bool,
}

/// A table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub row_id: u32,
    pub col_id: u32,
    #[serde(default)]
    pub text: Option<String>,
    pub polygon: Polygon,
}

/// A table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub row_id: u32,
    pub polygon: Polygon,
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCol {
    pub col_id: u32,
    pub polygon: Polygon,
}

/// Table recognition output for one image or crop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePage {
    pub cells: Vec<TableCell>,
    #[serde(default)]
    pub unmerged_cells: Vec<TableCell>,
    pub rows: Vec<TableRow>,
    pub cols: Vec<TableCol>,
    #[serde(default)]
    pub image_bbox: Option<BBox>,
}
