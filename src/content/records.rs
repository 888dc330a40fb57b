//! Operator record derivation.
//!
//! Executes a parsed operator sequence against a graphics state machine so
//! that every show-text operator is annotated with the state active when
//! it painted: matrices, font, spacing, decoded fragments with raw bytes,
//! and the post-execution text matrix.
//!
//! Records are derived once per page per rewrite request and are
//! immutable afterwards; the planner and rewriter only read them.

use crate::content::graphics_state::{GraphicsStateStack, Matrix};
use crate::content::operators::{LiteralKind, Operator, RawOperator, TextElement};
use crate::content::parser::parse_content_stream;
use crate::error::Result;
use crate::fonts::FontResources;
use crate::geometry::Point;
use std::ops::Range;

/// One decoded character inside a fragment.
#[derive(Debug, Clone)]
pub struct FragmentChar {
    /// The decoded character
    pub ch: char,
    /// Byte range of the character's code, relative to the fragment bytes
    pub byte_range: Range<usize>,
    /// Text matrix in effect when this character painted
    pub matrix: Matrix,
    /// Glyph width in thousandths of text space (0 when the font is
    /// unknown to the resource table)
    pub width_units: f32,
    /// Pen advance this character produced, in text space units
    pub advance: f32,
}

/// One shown string inside a show-text operator.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Decoded text
    pub text: String,
    /// Raw encoded bytes as they appear in the operand
    pub raw: Vec<u8>,
    /// Absolute byte range of the string body in the source stream
    pub range: Range<usize>,
    /// Literal kind the string was written as
    pub kind: LiteralKind,
    /// Per-character decoding and placement
    pub chars: Vec<FragmentChar>,
}

/// A show-text operator annotated with its full execution state.
#[derive(Debug, Clone)]
pub struct OperatorRecord {
    /// Index into the page's [`RawOperator`] sequence
    pub index: usize,
    /// Operator keyword (Tj, TJ, ', ")
    pub name: String,
    /// Absolute byte span of the operator in the source stream
    pub span: Range<usize>,
    /// q/Q nesting depth when the operator executed
    pub depth: usize,
    /// BT/ET nesting depth (0 outside a text object, which real streams
    /// produce and viewers tolerate)
    pub text_depth: usize,
    /// Current transformation matrix
    pub ctm: Matrix,
    /// Text matrix before execution
    pub text_matrix: Matrix,
    /// Text line matrix before execution
    pub text_line_matrix: Matrix,
    /// Active font resource name
    pub font_name: Option<String>,
    /// Active font size
    pub font_size: f32,
    /// Character spacing (Tc)
    pub char_space: f32,
    /// Word spacing (Tw)
    pub word_space: f32,
    /// Horizontal scaling percentage (Tz)
    pub horizontal_scaling: f32,
    /// Text leading (TL)
    pub leading: f32,
    /// Text rise (Ts)
    pub text_rise: f32,
    /// Decoded fragments in paint order
    pub fragments: Vec<Fragment>,
    /// Text matrix after execution.
    ///
    /// Invariant: a pure function of the pre-state and the rendered
    /// fragment widths; `compute_post_matrix` reproduces it.
    pub post_text_matrix: Matrix,
    /// Total pen advance in text space
    pub advance: Point,
    // Advance from TJ numeric entries, folded into advance/post matrix but
    // kept separate so the invariant stays a pure function.
    pub(crate) inter_fragment_advance: f32,
}

impl OperatorRecord {
    /// Concatenated decoded text of all fragments.
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    /// Recompute the post-execution text matrix from the pre-state and
    /// fragment widths only (the record invariant).
    pub fn compute_post_matrix(&self) -> Matrix {
        let total: f32 = self
            .fragments
            .iter()
            .flat_map(|f| f.chars.iter())
            .map(|c| c.advance)
            .sum::<f32>()
            + self.inter_fragment_advance;
        Matrix::translation(total, 0.0).multiply(&self.text_matrix)
    }

    /// Advance contributed by TJ numeric entries (text space units).
    pub(crate) fn tj_offset_advance(&self) -> f32 {
        self.inter_fragment_advance
    }
}

/// A parsed page: the raw operator sequence plus the derived records for
/// its show-text operators.
#[derive(Debug, Clone)]
pub struct OperatorStream {
    /// Every operator in the stream with its byte span
    pub operators: Vec<RawOperator>,
    /// Execution records for the show-text operators, in stream order
    pub records: Vec<OperatorRecord>,
}

impl OperatorStream {
    /// The record owning a given operator index, if it is a show-text op.
    pub fn record_for(&self, operator_index: usize) -> Option<&OperatorRecord> {
        self.records.iter().find(|r| r.index == operator_index)
    }
}

/// Parse a content stream and derive execution records for its show-text
/// operators.
pub fn derive_operator_stream(data: &[u8], resources: &FontResources) -> Result<OperatorStream> {
    let operators = parse_content_stream(data)?;
    let mut gs = GraphicsStateStack::new();
    let mut text_depth = 0usize;
    let mut records = Vec::new();

    for (index, raw) in operators.iter().enumerate() {
        match &raw.op {
            Operator::SaveState => gs.save(),
            Operator::RestoreState => gs.restore(),
            Operator::Cm { a, b, c, d, e, f } => {
                let m = Matrix {
                    a: *a,
                    b: *b,
                    c: *c,
                    d: *d,
                    e: *e,
                    f: *f,
                };
                let state = gs.current_mut();
                state.ctm = m.multiply(&state.ctm);
            },
            Operator::BeginText => {
                text_depth += 1;
                let state = gs.current_mut();
                state.text_matrix = Matrix::identity();
                state.text_line_matrix = Matrix::identity();
            },
            Operator::EndText => {
                text_depth = text_depth.saturating_sub(1);
            },
            Operator::Td { tx, ty } => move_text_line(gs.current_mut(), *tx, *ty),
            Operator::TD { tx, ty } => {
                gs.current_mut().leading = -*ty;
                move_text_line(gs.current_mut(), *tx, *ty);
            },
            Operator::Tm { a, b, c, d, e, f } => {
                let m = Matrix {
                    a: *a,
                    b: *b,
                    c: *c,
                    d: *d,
                    e: *e,
                    f: *f,
                };
                let state = gs.current_mut();
                state.text_matrix = m;
                state.text_line_matrix = m;
            },
            Operator::TStar => next_line(gs.current_mut()),
            Operator::Tc { char_space } => gs.current_mut().char_space = *char_space,
            Operator::Tw { word_space } => gs.current_mut().word_space = *word_space,
            Operator::Tz { scale } => gs.current_mut().horizontal_scaling = *scale,
            Operator::TL { leading } => gs.current_mut().leading = *leading,
            Operator::Tf { font, size } => {
                let state = gs.current_mut();
                state.font_name = Some(font.clone());
                state.font_size = *size;
            },
            Operator::Tr { render } => gs.current_mut().render_mode = *render,
            Operator::Ts { rise } => gs.current_mut().text_rise = *rise,
            Operator::Tj { .. }
            | Operator::TJ { .. }
            | Operator::Quote { .. }
            | Operator::DoubleQuote { .. } => {
                // ' and " move to the next line / set spacing before showing
                match &raw.op {
                    Operator::Quote { .. } => next_line(gs.current_mut()),
                    Operator::DoubleQuote {
                        word_space,
                        char_space,
                        ..
                    } => {
                        let state = gs.current_mut();
                        state.word_space = *word_space;
                        state.char_space = *char_space;
                        next_line(state);
                    },
                    _ => {},
                }
                let record =
                    execute_show_text(index, raw, gs.depth(), text_depth, &mut gs, resources);
                records.push(record);
            },
            Operator::Other { .. } => {},
        }
    }

    Ok(OperatorStream { operators, records })
}

/// Td: translate the line matrix and reset the text matrix to it.
fn move_text_line(state: &mut crate::content::graphics_state::GraphicsState, tx: f32, ty: f32) {
    let m = Matrix::translation(tx, ty).multiply(&state.text_line_matrix);
    state.text_matrix = m;
    state.text_line_matrix = m;
}

/// T*: move to the start of the next line using the current leading.
fn next_line(state: &mut crate::content::graphics_state::GraphicsState) {
    let leading = state.leading;
    move_text_line(state, 0.0, -leading);
}

fn operator_name(op: &Operator) -> &'static str {
    match op {
        Operator::Tj { .. } => "Tj",
        Operator::TJ { .. } => "TJ",
        Operator::Quote { .. } => "'",
        Operator::DoubleQuote { .. } => "\"",
        _ => "?",
    }
}

/// Execute one show-text operator, advancing the text matrix and
/// producing its record.
fn execute_show_text(
    index: usize,
    raw: &RawOperator,
    depth: usize,
    text_depth: usize,
    gs: &mut GraphicsStateStack,
    resources: &FontResources,
) -> OperatorRecord {
    let pre = gs.current().clone();
    let metrics = pre.font_name.as_deref().and_then(|n| resources.get(n));
    if metrics.is_none() {
        log::warn!(
            "show-text operator at byte {} uses unknown font {:?}; widths unavailable",
            raw.span.start,
            pre.font_name
        );
    }

    let scale = pre.horizontal_scaling / 100.0;
    let mut fragments = Vec::new();
    let mut inter_fragment_advance = 0.0f32;

    let elements: Vec<TextElement> = match &raw.op {
        Operator::Tj { text } | Operator::Quote { text } => {
            vec![TextElement::String(text.clone())]
        },
        Operator::DoubleQuote { text, .. } => vec![TextElement::String(text.clone())],
        Operator::TJ { array } => array.clone(),
        _ => Vec::new(),
    };

    for element in &elements {
        match element {
            TextElement::String(operand) => {
                let decoded = match metrics {
                    Some(m) => m.decode(&operand.bytes),
                    // Latin-1 fallback keeps byte alignment; widths stay 0
                    None => operand
                        .bytes
                        .iter()
                        .enumerate()
                        .map(|(i, &b)| (b as char, i..i + 1))
                        .collect(),
                };

                let mut chars = Vec::with_capacity(decoded.len());
                let mut text = String::with_capacity(decoded.len());
                for (ch, byte_range) in decoded {
                    let width_units = metrics.and_then(|m| m.width(ch)).unwrap_or(0.0);
                    let word_space = match metrics {
                        Some(m) if m.word_space_applies(ch) => pre.word_space,
                        _ => 0.0,
                    };
                    let advance = (width_units / 1000.0 * pre.font_size
                        + pre.char_space
                        + word_space)
                        * scale;
                    let matrix = gs.current().text_matrix;
                    chars.push(FragmentChar {
                        ch,
                        byte_range,
                        matrix,
                        width_units,
                        advance,
                    });
                    text.push(ch);
                    let state = gs.current_mut();
                    state.text_matrix =
                        Matrix::translation(advance, 0.0).multiply(&state.text_matrix);
                }

                fragments.push(Fragment {
                    text,
                    raw: operand.bytes.clone(),
                    range: operand.range.clone(),
                    kind: operand.kind,
                    chars,
                });
            },
            TextElement::Offset(offset) => {
                let advance = -offset / 1000.0 * pre.font_size * scale;
                inter_fragment_advance += advance;
                let state = gs.current_mut();
                state.text_matrix = Matrix::translation(advance, 0.0).multiply(&state.text_matrix);
            },
        }
    }

    let post = gs.current().text_matrix;
    let total_advance: f32 = fragments
        .iter()
        .flat_map(|f| f.chars.iter())
        .map(|c| c.advance)
        .sum::<f32>()
        + inter_fragment_advance;

    OperatorRecord {
        index,
        name: operator_name(&raw.op).to_string(),
        span: raw.span.clone(),
        depth,
        text_depth,
        ctm: pre.ctm,
        text_matrix: pre.text_matrix,
        text_line_matrix: pre.text_line_matrix,
        font_name: pre.font_name.clone(),
        font_size: pre.font_size,
        char_space: pre.char_space,
        word_space: pre.word_space,
        horizontal_scaling: pre.horizontal_scaling,
        leading: pre.leading,
        text_rise: pre.text_rise,
        fragments,
        post_text_matrix: post,
        advance: Point::new(total_advance, 0.0),
        inter_fragment_advance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontMetrics;

    fn mono_resources() -> FontResources {
        FontResources::new().with_font("F1", FontMetrics::monospaced(500.0))
    }

    #[test]
    fn test_simple_tj_record() {
        let stream = b"BT /F1 10 Tf 100 700 Td (Hello) Tj ET";
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        assert_eq!(page.records.len(), 1);

        let rec = &page.records[0];
        assert_eq!(rec.text(), "Hello");
        assert_eq!(rec.font_name.as_deref(), Some("F1"));
        assert_eq!(rec.font_size, 10.0);
        assert_eq!(rec.text_matrix.e, 100.0);
        assert_eq!(rec.text_matrix.f, 700.0);
        // 5 chars * 500/1000 * 10pt = 25pt
        assert!((rec.advance.x - 25.0).abs() < 1e-4);
        assert!((rec.post_text_matrix.e - 125.0).abs() < 1e-4);
    }

    #[test]
    fn test_post_matrix_invariant() {
        let stream = b"BT /F1 12 Tf 2 Tc 50 50 Td [(ab) -200 (cd)] TJ ET";
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        let rec = &page.records[0];
        let recomputed = rec.compute_post_matrix();
        assert!(rec.post_text_matrix.approx_eq(&recomputed, 1e-4));
    }

    #[test]
    fn test_tj_offset_advances_pen() {
        let stream = b"BT /F1 10 Tf 0 0 Td [(a) -1000 (b)] TJ ET";
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        let rec = &page.records[0];
        // two glyphs at 5pt each plus a -1000 offset worth +10pt
        assert!((rec.advance.x - 20.0).abs() < 1e-4);
        assert!((rec.tj_offset_advance() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_word_spacing_applies_to_spaces() {
        let stream = b"BT /F1 10 Tf 5 Tw 0 0 Td (a b) Tj ET";
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        let rec = &page.records[0];
        // 3 glyphs * 5pt + one word space of 5pt
        assert!((rec.advance.x - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_quote_advances_line_before_show() {
        let stream = b"BT /F1 10 Tf 14 TL 0 100 Td (x) ' ET";
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        let rec = &page.records[0];
        assert!((rec.text_matrix.f - 86.0).abs() < 1e-4);
    }

    #[test]
    fn test_state_saved_and_restored_around_records() {
        let stream = b"BT /F1 10 Tf 0 0 Td q 2 0 0 2 0 0 cm (a) Tj Q (b) Tj ET";
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].ctm.a, 2.0);
        assert_eq!(page.records[1].ctm.a, 1.0);
        assert_eq!(page.records[0].depth, 2);
        assert_eq!(page.records[1].depth, 1);
    }

    #[test]
    fn test_unknown_font_decodes_with_zero_widths() {
        let stream = b"BT /Nope 10 Tf 0 0 Td (ab) Tj ET";
        let page = derive_operator_stream(stream, &FontResources::new()).unwrap();
        let rec = &page.records[0];
        assert_eq!(rec.text(), "ab");
        assert_eq!(rec.advance.x, 0.0);
    }

    #[test]
    fn test_fragment_char_byte_ranges() {
        let stream = b"BT /F1 10 Tf 0 0 Td (abc) Tj ET";
        let page = derive_operator_stream(stream, &mono_resources()).unwrap();
        let frag = &page.records[0].fragments[0];
        assert_eq!(frag.chars[0].byte_range, 0..1);
        assert_eq!(frag.chars[2].byte_range, 2..3);
        assert_eq!(frag.kind, LiteralKind::Text);
    }
}
