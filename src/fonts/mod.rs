//! Glyph substitution subsystem.
//!
//! Everything needed to make a rewritten content stream display glyphs
//! unrelated to its extractable text: mapping analysis
//! ([`analyze_mapping`]) decides how many fonts a substitution needs,
//! [`FontGenerator`] realizes each [`FontStrategy`] by glyph surgery on a
//! base font, [`PairFontLibrary`] serves precomputed single-pair fonts,
//! and [`FontCache`] keeps either mode from building the same font twice
//! in one run.
//!
//! [`FontResources`] is the engine-facing boundary: per-page decode,
//! encode, and width tables handed in by the PDF container reader.

mod cache;
mod generator;
mod mapper;
mod prebuilt;
mod resources;

#[cfg(test)]
pub(crate) mod test_font;

pub use cache::{EntityFontCache, FontCache, PairFontCache};
pub use generator::{FontGenError, FontGenerator};
pub use mapper::{
    analyze_mapping, DuplicateInfo, FontStrategy, MappingAnalysis, StrategyKind, ZERO_WIDTH,
};
pub use prebuilt::{PairFont, PairFontLibrary};
pub use resources::{FontMetrics, FontResources};
