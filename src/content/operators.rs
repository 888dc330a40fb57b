//! Content stream operator model.
//!
//! Defines the typed operators the engine interprets. Only the operators
//! that influence text placement are given dedicated variants; everything
//! else passes through as [`Operator::Other`] and is re-emitted verbatim
//! from its raw byte span.

use std::ops::Range;

/// How a shown string was written in the source stream, and how a planned
/// replacement must be re-encoded.
///
/// A closed enum so a segment can never carry an invalid kind. Runs that
/// mix kinds cannot be merged into one show-text call without corrupting
/// the encoding, which is why the planner forces isolation on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    /// Parenthesized literal string, e.g. `(Hello)` in a `Tj`
    Text,
    /// Hex string, e.g. `<48656C6C6F>`, in any container
    Byte,
    /// Literal string element inside an array-show (`TJ`) operand
    Array,
}

/// A string operand with its encoding bookkeeping.
///
/// `range` is the absolute byte range of the string body (excluding the
/// delimiters) in the source stream, so rewriting can splice precisely.
#[derive(Debug, Clone, PartialEq)]
pub struct StringOperand {
    /// Decoded operand bytes (escapes resolved, hex pairs combined)
    pub bytes: Vec<u8>,
    /// Literal kind the string was written as
    pub kind: LiteralKind,
    /// Absolute byte range of the string body in the source stream
    pub range: Range<usize>,
}

/// Element in a TJ array (text showing with positioning).
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    /// Text string to show
    String(StringOperand),
    /// Positioning adjustment (in thousandths of a unit of text space)
    Offset(f32),
}

/// A content stream operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    // Text positioning
    /// Move text position (Td)
    Td {
        /// Horizontal offset
        tx: f32,
        /// Vertical offset
        ty: f32,
    },
    /// Move text position and set leading (TD)
    TD {
        /// Horizontal offset
        tx: f32,
        /// Vertical offset
        ty: f32,
    },
    /// Set text matrix (Tm)
    Tm {
        /// Matrix element a
        a: f32,
        /// Matrix element b
        b: f32,
        /// Matrix element c
        c: f32,
        /// Matrix element d
        d: f32,
        /// Matrix element e (x translation)
        e: f32,
        /// Matrix element f (y translation)
        f: f32,
    },
    /// Move to start of next line (T*)
    TStar,

    // Text showing
    /// Show text string (Tj)
    Tj {
        /// Text to show
        text: StringOperand,
    },
    /// Show text with individual glyph positioning (TJ)
    TJ {
        /// Array of text strings and positioning adjustments
        array: Vec<TextElement>,
    },
    /// Move to next line and show text (')
    Quote {
        /// Text to show
        text: StringOperand,
    },
    /// Set spacing and show text (")
    DoubleQuote {
        /// Word spacing
        word_space: f32,
        /// Character spacing
        char_space: f32,
        /// Text to show
        text: StringOperand,
    },

    // Text state
    /// Set character spacing (Tc)
    Tc {
        /// Character spacing
        char_space: f32,
    },
    /// Set word spacing (Tw)
    Tw {
        /// Word spacing
        word_space: f32,
    },
    /// Set horizontal scaling (Tz)
    Tz {
        /// Horizontal scaling percentage
        scale: f32,
    },
    /// Set text leading (TL)
    TL {
        /// Text leading
        leading: f32,
    },
    /// Set font and size (Tf)
    Tf {
        /// Font resource name
        font: String,
        /// Font size
        size: f32,
    },
    /// Set text rendering mode (Tr)
    Tr {
        /// Rendering mode
        render: u8,
    },
    /// Set text rise (Ts)
    Ts {
        /// Text rise
        rise: f32,
    },

    // Graphics state
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Modify current transformation matrix (cm)
    Cm {
        /// Matrix element a
        a: f32,
        /// Matrix element b
        b: f32,
        /// Matrix element c
        c: f32,
        /// Matrix element d
        d: f32,
        /// Matrix element e (x translation)
        e: f32,
        /// Matrix element f (y translation)
        f: f32,
    },

    // Text object
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,

    /// Any operator the engine does not interpret.
    ///
    /// Kept so the rewriter can re-emit the raw bytes verbatim; the engine
    /// never needs to understand paths, color, or XObjects to relocate a
    /// text run.
    Other {
        /// Operator name
        name: String,
    },
}

impl Operator {
    /// True for operators that paint text (Tj, TJ, ', ").
    pub fn is_show_text(&self) -> bool {
        matches!(
            self,
            Operator::Tj { .. }
                | Operator::TJ { .. }
                | Operator::Quote { .. }
                | Operator::DoubleQuote { .. }
        )
    }

    /// The string operands painted by this operator, in paint order.
    pub fn shown_strings(&self) -> Vec<&StringOperand> {
        match self {
            Operator::Tj { text } | Operator::Quote { text } => vec![text],
            Operator::DoubleQuote { text, .. } => vec![text],
            Operator::TJ { array } => array
                .iter()
                .filter_map(|el| match el {
                    TextElement::String(s) => Some(s),
                    TextElement::Offset(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// An operator paired with the absolute byte span it occupies in the
/// source stream (operands included).
///
/// Untouched operators round-trip byte-identically through the rewriter by
/// copying this span.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOperator {
    /// The parsed operator
    pub op: Operator,
    /// Absolute byte span of operands + operator keyword
    pub span: Range<usize>,
}
