// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::match_like_matches_macro)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # Palimpsest
//!
//! Dual-layer PDF engine: content-stream text replacement with preserved
//! visual registration, plus glyph-substitution font synthesis.
//!
//! ## Core Features
//!
//! ### Content-Stream Rewriting
//! - **Target Location**: Finds target text across operator and fragment
//!   boundaries, optionally skipping whitespace at operator edges
//! - **Replacement Planning**: Segments matched runs on literal kind,
//!   positioning record, and text-matrix changes
//! - **Registration Preservation**: Width deltas compensated with TJ
//!   spacing adjustments so surrounding text never shifts
//! - **Byte Fidelity**: Untouched operators are copied verbatim from the
//!   source stream
//!
//! ### Font Substitution
//! - **Mapping Analysis**: Source-to-target character maps partitioned
//!   into per-strategy bijections when duplicates conflict
//! - **Glyph Surgery**: TrueType fonts rebuilt with substituted glyph
//!   outlines and metrics, checksums fixed
//! - **Prebuilt Pairs**: Single-pair substitution fonts loaded from disk
//!   with a thread-safe once-build cache
//!
//! ### Assembly
//! - **Complete Documents**: Header, body, xref, trailer, with FlateDecode
//!   compression and FontFile2 embedding
//! - **Snapshot Fallback**: Optional PNG page image composited beneath
//!   the rewritten text
//!
//! ## Quick Start
//!
//! ```ignore
//! use palimpsest::content::derive_operator_stream;
//! use palimpsest::fonts::{FontMetrics, FontResources};
//! use palimpsest::planner::MatchPlanner;
//! use palimpsest::rewriter::ContentStreamRewriter;
//! use palimpsest::spans::SpanExtractor;
//! use palimpsest::align::align_spans;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("page.stream")?;
//! let resources = FontResources::new().with_font("F1", FontMetrics::monospaced(500.0));
//! let stream = derive_operator_stream(&data, &resources)?;
//! let spans = SpanExtractor::new().extract(0, &stream);
//! let alignment = align_spans(&spans, &stream);
//!
//! let plan = MatchPlanner::new(Default::default())
//!     .build_replacement_plan(0, "old text", "new text", &stream, &alignment)?;
//! let outcome = ContentStreamRewriter::new(Default::default())
//!     .apply(&plan, &stream, &data, &resources)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Geometry primitives
pub mod geometry;

// Content stream parsing and operator records
pub mod content;

// Extracted text spans and span/operator alignment
pub mod align;
pub mod spans;

// Replacement planning and rewriting
pub mod planner;
pub mod rewriter;

// Font mapping analysis, glyph substitution, caching
pub mod fonts;

// Final document assembly
pub mod assembler;

// Re-exports
pub use assembler::PdfAssembler;
pub use config::{AssemblerConfig, PlannerConfig, RewriterConfig};
pub use content::{parse_content_stream, LiteralKind, OperatorStream};
pub use error::{Error, Result};
pub use fonts::{analyze_mapping, FontGenerator, FontStrategy, MappingAnalysis};
pub use planner::{MatchPlanner, ReplacementPlan};
pub use rewriter::{ContentStreamRewriter, RewriteOutcome, RewriteStats};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
