//! Text span model.
//!
//! A [`SpanRecord`] describes already-extracted text with geometry. Spans
//! normally arrive from an upstream extraction collaborator (OCR or a
//! text/line/block model); [`SpanExtractor`] derives equivalent spans
//! directly from an operator stream for callers that have none.

use crate::content::graphics_state::Matrix;
use crate::content::records::OperatorStream;
use crate::geometry::{Point, Rect};

/// A text span with per-character geometry.
///
/// Characters are ordered along the span's own direction vector, so index
/// arithmetic over `text` and `char_boxes` always walks the baseline in
/// paint order regardless of page rotation.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    /// Page index the span belongs to
    pub page_index: usize,
    /// Block index within the page
    pub block_index: usize,
    /// Line index within the block
    pub line_index: usize,
    /// Span index within the line
    pub span_index: usize,
    /// Rendered text
    pub text: String,
    /// Font resource name
    pub font_name: String,
    /// Font size in points
    pub font_size: f32,
    /// Bounding box of the whole span (user space)
    pub bbox: Rect,
    /// Baseline origin of the first character
    pub origin: Point,
    /// Unit baseline direction vector
    pub direction: Point,
    /// Transform matrix placing the span (text space to user space)
    pub matrix: Matrix,
    /// Per-character bounding boxes, parallel to `text` chars.
    ///
    /// Zero-width glyphs (injected padding) get degenerate boxes and are
    /// excluded from alignment coverage.
    pub char_boxes: Vec<Rect>,
    /// Grapheme-to-raw-index mapping: for each character of `text`, the
    /// absolute byte offset of its code in the source content stream
    pub raw_indices: Vec<usize>,
}

impl SpanRecord {
    /// Number of characters in the span.
    pub fn len(&self) -> usize {
        self.char_boxes.len()
    }

    /// True when the span paints nothing.
    pub fn is_empty(&self) -> bool {
        self.char_boxes.is_empty()
    }
}

/// Derives [`SpanRecord`]s from an operator stream.
///
/// One span per show-text record; line indices advance whenever the
/// baseline jumps, which is what the rest of the engine needs from a span
/// model (it never reorders text, it only aligns it).
#[derive(Debug, Default)]
pub struct SpanExtractor {
    _private: (),
}

impl SpanExtractor {
    /// Create an extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract spans from a derived operator stream.
    pub fn extract(&self, page_index: usize, stream: &OperatorStream) -> Vec<SpanRecord> {
        let mut spans = Vec::new();
        let mut line_index = 0usize;
        let mut last_baseline: Option<f32> = None;

        for record in &stream.records {
            let placement = record.text_matrix.multiply(&record.ctm);
            let baseline = placement.f;
            if let Some(prev) = last_baseline {
                if (prev - baseline).abs() > 0.5 {
                    line_index += 1;
                }
            }
            last_baseline = Some(baseline);

            let mut text = String::new();
            let mut char_boxes = Vec::new();
            let mut raw_indices = Vec::new();

            for fragment in &record.fragments {
                for fc in &fragment.chars {
                    let m = fc.matrix.multiply(&record.ctm);
                    let p0 = m.transform_point(0.0, record.text_rise);
                    let p1 = m.transform_point(fc.advance, record.text_rise + record.font_size);
                    text.push(fc.ch);
                    char_boxes.push(Rect::from_points(p0.x, p0.y, p1.x, p1.y));
                    raw_indices.push(fragment.range.start + fc.byte_range.start);
                }
            }

            if char_boxes.is_empty() {
                continue;
            }

            let bbox = char_boxes
                .iter()
                .copied()
                .reduce(|a, b| a.union(&b))
                .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
            let origin = placement.transform_point(0.0, 0.0);
            let along = placement.transform_point(1.0, 0.0);
            let (dx, dy) = (along.x - origin.x, along.y - origin.y);
            let norm = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);

            spans.push(SpanRecord {
                page_index,
                block_index: 0,
                line_index,
                span_index: spans.len(),
                text,
                font_name: record.font_name.clone().unwrap_or_default(),
                font_size: record.font_size,
                bbox,
                origin,
                direction: Point::new(dx / norm, dy / norm),
                matrix: placement,
                char_boxes,
                raw_indices,
            });
        }

        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::derive_operator_stream;
    use crate::fonts::{FontMetrics, FontResources};

    fn mono_resources() -> FontResources {
        FontResources::new().with_font("F1", FontMetrics::monospaced(500.0))
    }

    fn extract(stream: &[u8]) -> Vec<SpanRecord> {
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        SpanExtractor::new().extract(0, &page)
    }

    #[test]
    fn test_extract_single_span() {
        let spans = extract(b"BT /F1 10 Tf 100 700 Td (Hello) Tj ET");
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.text, "Hello");
        assert_eq!(span.len(), 5);
        assert_eq!(span.origin.x, 100.0);
        assert_eq!(span.origin.y, 700.0);
        assert_eq!(span.direction, Point::new(1.0, 0.0));
        // each glyph advances 5pt
        assert!((span.char_boxes[1].x - 105.0).abs() < 1e-4);
        assert!((span.bbox.width - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_line_index_advances_on_baseline_jump() {
        let spans = extract(b"BT /F1 10 Tf 0 100 Td (a) Tj 0 -20 Td (b) Tj ET");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].line_index, 0);
        assert_eq!(spans[1].line_index, 1);
    }

    #[test]
    fn test_raw_indices_point_into_stream() {
        let stream = b"BT /F1 10 Tf 0 0 Td (abc) Tj ET";
        let spans = extract(stream);
        let span = &spans[0];
        for (i, &raw) in span.raw_indices.iter().enumerate() {
            assert_eq!(stream[raw], span.text.as_bytes()[i]);
        }
    }

    #[test]
    fn test_rotated_span_direction() {
        // 90-degree rotation matrix
        let spans = extract(b"BT /F1 10 Tf 0 1 -1 0 200 100 Tm (up) Tj ET");
        assert_eq!(spans.len(), 1);
        let d = spans[0].direction;
        assert!(d.x.abs() < 1e-4);
        assert!((d.y - 1.0).abs() < 1e-4);
    }
}
