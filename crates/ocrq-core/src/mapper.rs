//! Remapping of crop-local results into image coordinates.
//!
//! Each region of a request is recognized independently, in the coordinate
//! space of its crop. [`Shift`] moves a result by the region's origin and
//! [`Merge`] folds the shifted results into one image-space result.

use crate::answer::LineTranscription;
use crate::geometry::{BBox, Polygon};
use crate::page::{
    CharBox, LayoutBox, LayoutPage, OcrPage, TableCell, TableCol, TablePage, TableRow, TextLine,
};

/// Translation of every geometric primitive of a value.
pub trait Shift: Clone {
    /// Translates `self` in place by `(dx, dy)`.
    fn translate(&mut self, dx: f64, dy: f64);

    /// Returns a translated copy, leaving `self` untouched.
    #[must_use]
    fn shift(&self, dx: f64, dy: f64) -> Self {
        let mut shifted = self.clone();
        shifted.translate(dx, dy);
        shifted
    }
}

/// Concatenation of independently produced results.
pub trait Merge: Sized {
    /// Merges `results` into one, recomputing the enclosing envelope.
    fn merge(results: impl IntoIterator<Item = Self>) -> Self;
}

impl Shift for Polygon {
    fn translate(&mut self, dx: f64, dy: f64) {
        for [x, y] in &mut self.0 {
            *x += dx;
            *y += dy;
        }
    }
}

impl Shift for BBox {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.x1 += dx;
        self.y1 += dy;
        self.x2 += dx;
        self.y2 += dy;
    }
}

impl<T: Shift> Shift for Vec<T> {
    fn translate(&mut self, dx: f64, dy: f64) {
        for item in self.iter_mut() {
            item.translate(dx, dy);
        }
    }
}

impl<T: Shift> Shift for Option<T> {
    fn translate(&mut self, dx: f64, dy: f64) {
        if let Some(item) = self {
            item.translate(dx, dy);
        }
    }
}

impl Shift for CharBox {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.polygon.translate(dx, dy);
    }
}

impl Shift for TextLine {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.polygon.translate(dx, dy);
        self.chars.translate(dx, dy);
    }
}

impl Shift for LineTranscription {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.polygon.translate(dx, dy);
    }
}

impl Shift for OcrPage {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.text_lines.translate(dx, dy);
        self.image_bbox.translate(dx, dy);
    }
}

impl Shift for LayoutBox {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.polygon.translate(dx, dy);
    }
}

impl Shift for LayoutPage {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.bboxes.translate(dx, dy);
        self.image_bbox.translate(dx, dy);
    }
}

impl Shift for TableCell {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.polygon.translate(dx, dy);
    }
}

impl Shift for TableRow {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.polygon.translate(dx, dy);
    }
}

impl Shift for TableCol {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.polygon.translate(dx, dy);
    }
}

impl Shift for TablePage {
    fn translate(&mut self, dx: f64, dy: f64) {
        self.cells.translate(dx, dy);
        self.unmerged_cells.translate(dx, dy);
        self.rows.translate(dx, dy);
        self.cols.translate(dx, dy);
        self.image_bbox.translate(dx, dy);
    }
}

/// Running min/max over the envelopes of merged results.
#[derive(Debug, Default)]
struct Envelope(Option<BBox>);

impl Envelope {
    fn include(&mut self, bbox: Option<BBox>) {
        if let Some(bbox) = bbox {
            self.0 = Some(match self.0 {
                None => bbox,
                Some(current) => current.union(&bbox),
            });
        }
    }

    fn finish(self) -> BBox {
        self.0.unwrap_or(BBox::ZERO)
    }
}

impl Merge for OcrPage {
    fn merge(results: impl IntoIterator<Item = Self>) -> Self {
        let mut text_lines = Vec::new();
        let mut envelope = Envelope::default();

        for page in results {
            text_lines.extend(page.text_lines);
            envelope.include(page.image_bbox);
        }

        Self {
            text_lines,
            image_bbox: Some(envelope.finish()),
        }
    }
}

impl Merge for LayoutPage {
    fn merge(results: impl IntoIterator<Item = Self>) -> Self {
        let mut bboxes = Vec::new();
        let mut envelope = Envelope::default();
        let mut sliced = false;

        for page in results {
            bboxes.extend(page.bboxes);
            envelope.include(page.image_bbox);
            sliced |= page.sliced;
        }

        Self {
            bboxes,
            image_bbox: Some(envelope.finish()),
            sliced,
        }
    }
}

impl Merge for TablePage {
    fn merge(results: impl IntoIterator<Item = Self>) -> Self {
        let mut merged = Self::default();
        let mut envelope = Envelope::default();

        for page in results {
            merged.cells.extend(page.cells);
            merged.unmerged_cells.extend(page.unmerged_cells);
            merged.rows.extend(page.rows);
            merged.cols.extend(page.cols);
            envelope.include(page.image_bbox);
        }

        merged.image_bbox = Some(envelope.finish());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop_local_line() -> TextLine {
        TextLine {
            text: "line".into(),
            confidence: 0.8,
            polygon: Polygon::rect(0.0, 0.0, 50.0, 10.0),
            chars: vec![CharBox {
                text: "l".into(),
                confidence: 0.9,
                polygon: Polygon::rect(0.0, 0.0, 5.0, 10.0),
            }],
        }
    }

    fn table(offset: f64) -> TablePage {
        TablePage {
            cells: vec![TableCell {
                row_id: 0,
                col_id: 0,
                text: None,
                polygon: Polygon::rect(offset, offset, offset + 10.0, offset + 10.0),
            }],
            unmerged_cells: vec![TableCell {
                row_id: 0,
                col_id: 1,
                text: Some("x".into()),
                polygon: Polygon::rect(offset + 10.0, offset, offset + 20.0, offset + 10.0),
            }],
            rows: vec![TableRow {
                row_id: 0,
                polygon: Polygon::rect(offset, offset, offset + 20.0, offset + 10.0),
            }],
            cols: vec![TableCol {
                col_id: 0,
                polygon: Polygon::rect(offset, offset, offset + 10.0, offset + 10.0),
            }],
            image_bbox: Some(BBox::new(offset, offset, offset + 20.0, offset + 10.0)),
        }
    }

    #[test]
    fn shift_moves_line_and_chars() {
        let shifted = crop_local_line().shift(50.0, 50.0);
        assert_eq!(
            shifted.polygon,
            Polygon::new(vec![[50.0, 50.0], [100.0, 50.0], [100.0, 60.0], [50.0, 60.0]])
        );
        assert_eq!(shifted.chars[0].polygon.points()[2], [55.0, 60.0]);
    }

    #[test]
    fn shift_leaves_original_untouched() {
        let line = crop_local_line();
        let _ = line.shift(3.0, 4.0);
        assert_eq!(line, crop_local_line());
    }

    #[test]
    fn shift_round_trip_restores_every_primitive() {
        let page = OcrPage {
            text_lines: vec![crop_local_line()],
            image_bbox: Some(BBox::new(0.0, 0.0, 100.0, 100.0)),
        };
        assert_eq!(page.shift(12.5, -7.0).shift(-12.5, 7.0), page);

        let tables = table(3.0);
        assert_eq!(tables.shift(40.0, 25.0).shift(-40.0, -25.0), tables);

        let layout = LayoutPage {
            bboxes: vec![LayoutBox {
                label: "Text".into(),
                position: 0,
                confidence: 0.5,
                polygon: Polygon::rect(1.0, 2.0, 3.0, 4.0),
            }],
            image_bbox: None,
            sliced: false,
        };
        assert_eq!(layout.shift(8.0, 9.0).shift(-8.0, -9.0), layout);
    }

    #[test]
    fn shift_moves_all_table_primitives() {
        let shifted = table(0.0).shift(100.0, 200.0);
        assert_eq!(shifted.cells[0].polygon.points()[0], [100.0, 200.0]);
        assert_eq!(shifted.unmerged_cells[0].polygon.points()[0], [110.0, 200.0]);
        assert_eq!(shifted.rows[0].polygon.points()[0], [100.0, 200.0]);
        assert_eq!(shifted.cols[0].polygon.points()[2], [110.0, 210.0]);
        assert_eq!(shifted.image_bbox, Some(BBox::new(100.0, 200.0, 120.0, 210.0)));
    }

    #[test]
    fn merge_concatenates_and_envelopes() {
        let first = OcrPage {
            text_lines: vec![crop_local_line()],
            image_bbox: Some(BBox::new(0.0, 0.0, 100.0, 100.0)),
        };
        let second = first.shift(50.0, 150.0);

        let merged = OcrPage::merge([first, second]);
        assert_eq!(merged.text_lines.len(), 2);
        assert_eq!(merged.image_bbox, Some(BBox::new(0.0, 0.0, 150.0, 250.0)));
    }

    #[test]
    fn merge_without_envelopes_is_zero() {
        let merged = OcrPage::merge([OcrPage::default(), OcrPage::default()]);
        assert_eq!(merged.image_bbox, Some(BBox::ZERO));

        let merged = LayoutPage::merge(Vec::new());
        assert!(merged.bboxes.is_empty());
        assert_eq!(merged.image_bbox, Some(BBox::ZERO));
    }

    #[test]
    fn merge_layout_ors_sliced() {
        let sliced = LayoutPage {
            sliced: true,
            ..Default::default()
        };
        assert!(LayoutPage::merge([LayoutPage::default(), sliced]).sliced);
    }

    #[test]
    fn merge_tables_keeps_every_list() {
        let merged = TablePage::merge([table(0.0), table(30.0)]);
        assert_eq!(merged.cells.len(), 2);
        assert_eq!(merged.unmerged_cells.len(), 2);
        assert_eq!(merged.rows.len(), 2);
        assert_eq!(merged.cols.len(), 2);
        assert_eq!(merged.image_bbox, Some(BBox::new(0.0, 0.0, 50.0, 40.0)));
    }
}
