//! Span-to-operator alignment.
//!
//! Connects "what glyph occupies which bytes of which operator": each
//! [`AlignedSlice`] binds a half-open character range of one span to a
//! contiguous byte region inside one operator fragment.
//!
//! Guarantee: every span character that is actually painted by a
//! show-text operator is covered by exactly one slice; characters with no
//! geometry (injected zero-width glyphs) are excluded.

use crate::content::graphics_state::Matrix;
use crate::content::records::OperatorStream;
use crate::geometry::Rect;
use crate::spans::SpanRecord;

/// A half-open character range of one span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanSlice {
    /// Index of the span in the aligned span list
    pub span: usize,
    /// First character index (inclusive)
    pub start: usize,
    /// Past-the-end character index
    pub end: usize,
}

/// A span slice bound to the operator bytes that paint it.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSlice {
    /// Operator index in the page's operator sequence
    pub op_index: usize,
    /// Fragment index within the operator
    pub fragment_index: usize,
    /// First byte of the region, relative to the fragment bytes
    pub byte_start: usize,
    /// Past-the-end byte of the region, relative to the fragment bytes
    pub byte_end: usize,
    /// The span character range this region paints
    pub slice: SpanSlice,
    /// Placement matrix of the owning span
    pub matrix: Matrix,
}

/// Alignment of a span list onto an operator sequence.
#[derive(Debug, Clone, Default)]
pub struct SpanAlignment {
    /// Slices ordered by operator index, then byte offset
    pub slices: Vec<AlignedSlice>,
}

impl SpanAlignment {
    /// The slice covering a byte offset of a fragment, with the span
    /// character index that byte paints.
    pub fn slice_at(
        &self,
        op_index: usize,
        fragment_index: usize,
        byte_offset: usize,
    ) -> Option<(&AlignedSlice, usize)> {
        self.slices.iter().find_map(|s| {
            if s.op_index == op_index
                && s.fragment_index == fragment_index
                && (s.byte_start..s.byte_end).contains(&byte_offset)
            {
                // Bytes inside one slice map 1:1 onto its characters in
                // paint order (slices never split a multi-byte code).
                let region_len = s.byte_end - s.byte_start;
                let chars = s.slice.end - s.slice.start;
                let rel = (byte_offset - s.byte_start) * chars / region_len.max(1);
                Some((s, s.slice.start + rel))
            } else {
                None
            }
        })
    }

    /// All slices belonging to one operator.
    pub fn slices_for_operator(&self, op_index: usize) -> impl Iterator<Item = &AlignedSlice> {
        self.slices.iter().filter(move |s| s.op_index == op_index)
    }
}

/// Align spans onto an operator stream.
///
/// For each operator fragment, the fragment's byte range is intersected
/// against the spans whose bounding boxes geometrically overlap the
/// fragment's painted region. Character identity at the span cursor
/// disambiguates spans whose boxes overlap each other.
pub fn align_spans(spans: &[SpanRecord], stream: &OperatorStream) -> SpanAlignment {
    let mut cursors = vec![0usize; spans.len()];
    let mut slices = Vec::new();

    for record in &stream.records {
        for (fragment_index, fragment) in record.fragments.iter().enumerate() {
            let frag_bbox = fragment_bbox(record, fragment_index);

            // Open run: (span, span_start, byte_start, span_cursor, byte_cursor)
            let mut run: Option<AlignedSlice> = None;

            for fc in &fragment.chars {
                if fc.width_units == 0.0 {
                    // no geometry, excluded from coverage
                    flush(&mut run, &mut slices);
                    continue;
                }

                let assigned = spans.iter().enumerate().find_map(|(si, span)| {
                    if !span.bbox.overlaps(&frag_bbox) {
                        return None;
                    }
                    let mut cursor = cursors[si];
                    // Skip span characters with no geometry; they are
                    // painted by nothing and covered by nothing.
                    while cursor < span.len() && span.char_boxes[cursor].is_degenerate() {
                        cursor += 1;
                    }
                    if cursor < span.len() && span.text.chars().nth(cursor) == Some(fc.ch) {
                        Some((si, cursor))
                    } else {
                        None
                    }
                });

                match assigned {
                    Some((si, cursor)) => {
                        cursors[si] = cursor + 1;
                        let extend = matches!(&run, Some(r)
                            if r.slice.span == si
                                && r.slice.end == cursor
                                && r.byte_end == fc.byte_range.start);
                        if extend {
                            let r = run.as_mut().unwrap();
                            r.slice.end = cursor + 1;
                            r.byte_end = fc.byte_range.end;
                        } else {
                            flush(&mut run, &mut slices);
                            run = Some(AlignedSlice {
                                op_index: record.index,
                                fragment_index,
                                byte_start: fc.byte_range.start,
                                byte_end: fc.byte_range.end,
                                slice: SpanSlice {
                                    span: si,
                                    start: cursor,
                                    end: cursor + 1,
                                },
                                matrix: spans[si].matrix,
                            });
                        }
                    },
                    None => flush(&mut run, &mut slices),
                }
            }
            flush(&mut run, &mut slices);
        }
    }

    SpanAlignment { slices }
}

fn flush(run: &mut Option<AlignedSlice>, slices: &mut Vec<AlignedSlice>) {
    if let Some(r) = run.take() {
        slices.push(r);
    }
}

/// Painted bounding box of one fragment, from its characters' matrices.
fn fragment_bbox(record: &crate::content::records::OperatorRecord, fragment_index: usize) -> Rect {
    let fragment = &record.fragments[fragment_index];
    let mut bbox: Option<Rect> = None;
    for fc in &fragment.chars {
        let m = fc.matrix.multiply(&record.ctm);
        let p0 = m.transform_point(0.0, record.text_rise);
        let p1 = m.transform_point(fc.advance, record.text_rise + record.font_size);
        let r = Rect::from_points(p0.x, p0.y, p1.x, p1.y);
        bbox = Some(match bbox {
            Some(b) => b.union(&r),
            None => r,
        });
    }
    bbox.unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::derive_operator_stream;
    use crate::fonts::{FontMetrics, FontResources};
    use crate::spans::SpanExtractor;

    fn mono_resources() -> FontResources {
        FontResources::new().with_font("F1", FontMetrics::monospaced(500.0))
    }

    fn aligned(stream: &[u8]) -> (Vec<crate::spans::SpanRecord>, OperatorStream, SpanAlignment) {
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        let spans = SpanExtractor::new().extract(0, &page);
        let alignment = align_spans(&spans, &page);
        (spans, page, alignment)
    }

    #[test]
    fn test_full_coverage_single_operator() {
        let (spans, _, alignment) = aligned(b"BT /F1 10 Tf 0 0 Td (Hello) Tj ET");
        assert_eq!(alignment.slices.len(), 1);
        let s = &alignment.slices[0];
        assert_eq!(s.slice, SpanSlice { span: 0, start: 0, end: 5 });
        assert_eq!((s.byte_start, s.byte_end), (0, 5));
        assert_eq!(spans[0].text, "Hello");
    }

    #[test]
    fn test_coverage_is_a_partition() {
        let (spans, _, alignment) =
            aligned(b"BT /F1 10 Tf 0 0 Td [(He) -120 (llo)] TJ ( world) Tj ET");
        // every painted char covered exactly once
        let mut seen = vec![0usize; spans.iter().map(|s| s.len()).sum()];
        let mut base = 0;
        let offsets: Vec<usize> = spans
            .iter()
            .map(|s| {
                let o = base;
                base += s.len();
                o
            })
            .collect();
        for slice in &alignment.slices {
            for c in slice.slice.start..slice.slice.end {
                seen[offsets[slice.slice.span] + c] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1), "coverage {:?}", seen);
    }

    #[test]
    fn test_slices_ordered_by_operator_then_byte() {
        let (_, _, alignment) = aligned(b"BT /F1 10 Tf 0 0 Td (ab) Tj (cd) Tj ET");
        let keys: Vec<(usize, usize)> = alignment
            .slices
            .iter()
            .map(|s| (s.op_index, s.byte_start))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_slice_at_lookup() {
        let (_, page, alignment) = aligned(b"BT /F1 10 Tf 0 0 Td (Hello) Tj ET");
        let op_index = page.records[0].index;
        let (slice, ch) = alignment.slice_at(op_index, 0, 2).unwrap();
        assert_eq!(slice.slice.span, 0);
        assert_eq!(ch, 2);
        assert!(alignment.slice_at(op_index, 0, 99).is_none());
    }

    #[test]
    fn test_disjoint_spans_do_not_cross_match() {
        // Two operators far apart; identical text must still align to the
        // geometrically matching span.
        let (spans, page, alignment) =
            aligned(b"BT /F1 10 Tf 0 0 Td (xy) Tj 0 500 Td (xy) Tj ET");
        assert_eq!(spans.len(), 2);
        let first_op = page.records[0].index;
        let second_op = page.records[1].index;
        let first: Vec<_> = alignment.slices_for_operator(first_op).collect();
        let second: Vec<_> = alignment.slices_for_operator(second_op).collect();
        assert_eq!(first[0].slice.span, 0);
        assert_eq!(second[0].slice.span, 1);
    }
}
