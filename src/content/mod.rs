//! Content stream parsing and operator record derivation.

pub mod graphics_state;
pub mod operators;
pub mod parser;
pub mod records;

pub use graphics_state::{GraphicsState, GraphicsStateStack, Matrix};
pub use operators::{LiteralKind, Operator, RawOperator, StringOperand, TextElement};
pub use parser::parse_content_stream;
pub use records::{derive_operator_stream, Fragment, FragmentChar, OperatorRecord, OperatorStream};
