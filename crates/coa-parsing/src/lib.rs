use std::path::Path;

use thiserror::Error;

pub mod assemble;
pub mod compounds;
pub mod config;
pub mod detect;
pub mod extractor;
pub mod normalize;
pub mod resolve;
pub mod safety;
pub mod validate;

pub use assemble::{RecordAssembler, UnresolvedReason};
pub use compounds::CompoundResolver;
pub use config::{ConfigError, ListOverride, NameDigitException, ParsingConfig, ParsingConfigBuilder};
pub use detect::{BlockSignature, Layout};
pub use extractor::{BlockState, CoaExtractor};
pub use normalize::{Block, BlockAnchor};
pub use resolve::{
    CHROMELEON_RUN_TABLE, ConcatenatedLayout, FieldResolver, INTEGRATION_PEAK_TABLE, PotencyRow,
    RunRow,
};
pub use safety::detect_safety;
pub use validate::ValueValidator;
// Re-export domain types from core (canonical definitions live there)
pub use coa_core::{
    CannabinoidResult, ExtractionResult, ExtractionStats, Peak, ResultValue, SafetyPanel, SafetyStatus,
    Sentinel,
};

/// Why a single line could not be turned into a record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("malformed line: {detail}")]
    Malformed { detail: String },
    #[error("no height width in {tried:?} gives a relative area in range")]
    AmbiguousBoundary { tried: Vec<usize> },
    #[error("{field} is not a number: {text:?}")]
    UnparseableField { field: &'static str, text: String },
    #[error("{field} {value} outside {min}..={max}")]
    RangeViolation {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("expected at least 2 value tokens, found {found}")]
    InsufficientTokens { found: usize },
    #[error("no compound name before the values")]
    MissingName,
    #[error("{label:?} is not a compound label")]
    NonCompoundLabel { label: String },
}

impl LineError {
    /// Stable reason code used as the `unresolved_lines` prefix.
    pub fn reason(&self) -> &'static str {
        match self {
            LineError::Malformed { .. } => "malformed line",
            LineError::AmbiguousBoundary { .. } => "ambiguous boundary",
            LineError::UnparseableField { .. } => "unparseable field",
            LineError::RangeViolation { .. } => "range violation",
            LineError::InsufficientTokens { .. } => "insufficient tokens",
            LineError::MissingName => "missing compound name",
            LineError::NonCompoundLabel { .. } => "non-compound label",
        }
    }
}

#[derive(Error, Debug)]
pub enum ParsingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract potency results, peaks and injection details from report text.
///
/// Pipeline, per block:
/// 1. Normalize whitespace and split the text into anchored blocks
/// 2. Detect the block layout from its structural signature
/// 3. Resolve each line into fields
/// 4. Validate value ranges
/// 5. Assemble records; everything else lands in `unresolved_lines`
///
/// Never fails: unrecognized input degrades to diagnostics.
pub fn extract(text: &str) -> ExtractionResult {
    CoaExtractor::new().extract(text)
}

/// [`extract`] with a custom configuration.
pub fn extract_with_config(text: &str, config: ParsingConfig) -> ExtractionResult {
    CoaExtractor::with_config(config).extract(text)
}

/// Read a text file (lossily decoded as UTF-8) and extract from it.
pub fn extract_from_path(path: &Path, extractor: &CoaExtractor) -> Result<ExtractionResult, ParsingError> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "read report text");
    Ok(extractor.extract(&text))
}
