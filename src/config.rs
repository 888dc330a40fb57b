//! Configuration structs for the planner, rewriter, and assembler.
//!
//! Thresholds and directives are passed explicitly into constructors
//! instead of living as module-level constants, so two documents processed
//! in the same process can use different settings.

/// Configuration for the match planner.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Tolerate (and exclude from the match region) stray whitespace that
    /// the PDF producer introduced at operator boundaries.
    ///
    /// When enabled, a target that fails the exact scan is retried with
    /// leading/trailing whitespace inside the enclosing operators relaxed.
    pub relax_boundary_whitespace: bool,

    /// Maximum number of show-text fragments a single match may span.
    ///
    /// Guards against pathological streams where thousands of one-byte
    /// fragments would otherwise be walked per candidate position.
    pub max_fragments_per_match: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            relax_boundary_whitespace: true,
            max_fragments_per_match: 256,
        }
    }
}

impl PlannerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable whitespace-relaxed matching.
    pub fn with_relaxed_whitespace(mut self, relax: bool) -> Self {
        self.relax_boundary_whitespace = relax;
        self
    }
}

/// Configuration for the content stream rewriter.
#[derive(Debug, Clone)]
pub struct RewriterConfig {
    /// Minimum spacing delta, in thousandths of text space, below which no
    /// TJ adjustment entry is synthesized.
    ///
    /// Width differences smaller than this are invisible at any realistic
    /// zoom and would only bloat the stream.
    pub min_adjustment: f32,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            min_adjustment: 0.01,
        }
    }
}

impl RewriterConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum adjustment threshold (thousandths of text space).
    pub fn with_min_adjustment(mut self, min: f32) -> Self {
        self.min_adjustment = min;
        self
    }
}

/// Configuration for the PDF assembler.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// FlateDecode-compress content streams in the output.
    pub compress_streams: bool,
    /// Producer string written into the document info dictionary.
    pub producer: Option<String>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            compress_streams: true,
            producer: Some(concat!("palimpsest ", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl AssemblerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }
}
