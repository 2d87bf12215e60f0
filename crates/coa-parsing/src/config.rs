use regex::Regex;
use thiserror::Error;

use coa_core::compliance::DEFAULT_THC_LIMIT_PERCENT;

/// Controls how a list of patterns/values is overridden from its defaults.
#[derive(Debug, Clone, Default)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }

    fn push(&mut self, value: T) {
        match self {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(value),
            ListOverride::Default => *self = ListOverride::Extend(vec![value]),
        }
    }
}

/// A word whose trailing digit(s) belong to the compound name rather than to
/// the retention time glued onto it: `Delta 98.692` is `Delta 9` at 8.692 min.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameDigitException {
    pub word: String,
    pub digits: usize,
}

impl NameDigitException {
    pub fn new(word: &str, digits: usize) -> Self {
        Self {
            word: word.to_string(),
            digits,
        }
    }
}

/// Height-column decimal widths, tried in order.
pub const DEFAULT_HEIGHT_DECIMALS: [usize; 3] = [2, 3, 4];
/// Widest decimal run accepted for a backtracked column.
pub const MAX_DECIMALS: usize = 6;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("height decimal candidate list is empty")]
    EmptyCandidates,
    #[error("height decimal candidate {0} outside 1..={MAX_DECIMALS}")]
    CandidateOutOfBounds(usize),
    #[error("invalid {field} range: {min}..={max}")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
}

/// Configuration for the report extraction pipeline.
///
/// Regex fields are `Option<Regex>`; `None` means "use the built-in default".
/// Use [`ParsingConfigBuilder`] to construct with string patterns.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    // ── normalize.rs ──
    /// Line that opens an Integration Results / run table block.
    pub(crate) peak_table_anchor_re: Option<Regex>,
    /// Line that opens a potency table block.
    pub(crate) potency_anchor_re: Option<Regex>,
    /// Line that ends a table and starts an unanchored block.
    pub(crate) section_end_re: Option<Regex>,

    // ── compounds.rs ──
    pub(crate) compound_names: ListOverride<String>,
    /// Printed label -> canonical name.
    pub(crate) compound_aliases: ListOverride<(String, String)>,
    pub(crate) name_digit_exceptions: ListOverride<NameDigitException>,
    /// Labels longer than this are report furniture, not compounds (default: 30).
    pub(crate) max_label_len: usize,
    pub(crate) junk_label_re: Option<Regex>,

    // ── resolve.rs ──
    pub(crate) height_decimal_candidates: Vec<usize>,

    // ── validate.rs ──
    pub(crate) percent_range: (f64, f64),
    pub(crate) mg_per_g_range: (f64, f64),

    // ── extractor.rs ──
    /// Report label -> injection detail key.
    pub(crate) injection_key_aliases: ListOverride<(String, String)>,
    pub(crate) thc_limit_percent: f64,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            peak_table_anchor_re: None,
            potency_anchor_re: None,
            section_end_re: None,
            compound_names: ListOverride::Default,
            compound_aliases: ListOverride::Default,
            name_digit_exceptions: ListOverride::Default,
            max_label_len: 30,
            junk_label_re: None,
            height_decimal_candidates: DEFAULT_HEIGHT_DECIMALS.to_vec(),
            percent_range: (0.0, 100.0),
            mg_per_g_range: (0.0, 1000.0),
            injection_key_aliases: ListOverride::Default,
            thc_limit_percent: DEFAULT_THC_LIMIT_PERCENT,
        }
    }
}

impl ParsingConfig {
    pub fn height_decimal_candidates(&self) -> &[usize] {
        &self.height_decimal_candidates
    }

    pub fn thc_limit_percent(&self) -> f64 {
        self.thc_limit_percent
    }
}

/// Builder for [`ParsingConfig`].
///
/// Accepts string patterns that are compiled to `Regex` in [`build()`](Self::build).
/// Fails fast with [`ConfigError`] if any pattern or bound is invalid.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    peak_table_anchor_re: Option<String>,
    potency_anchor_re: Option<String>,
    section_end_re: Option<String>,
    compound_names: ListOverride<String>,
    compound_aliases: ListOverride<(String, String)>,
    name_digit_exceptions: ListOverride<NameDigitException>,
    max_label_len: Option<usize>,
    junk_label_re: Option<String>,
    height_decimal_candidates: Option<Vec<usize>>,
    percent_max: Option<f64>,
    mg_per_g_max: Option<f64>,
    injection_key_aliases: ListOverride<(String, String)>,
    thc_limit_percent: Option<f64>,
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Anchors ──

    pub fn peak_table_anchor_regex(mut self, pattern: &str) -> Self {
        self.peak_table_anchor_re = Some(pattern.to_string());
        self
    }

    pub fn potency_anchor_regex(mut self, pattern: &str) -> Self {
        self.potency_anchor_re = Some(pattern.to_string());
        self
    }

    pub fn section_end_regex(mut self, pattern: &str) -> Self {
        self.section_end_re = Some(pattern.to_string());
        self
    }

    // ── Compounds ──

    pub fn set_compound_names(mut self, names: Vec<String>) -> Self {
        self.compound_names = ListOverride::Replace(names);
        self
    }

    pub fn add_compound_name(mut self, name: String) -> Self {
        self.compound_names.push(name);
        self
    }

    pub fn add_compound_alias(mut self, label: String, canonical: String) -> Self {
        self.compound_aliases.push((label, canonical));
        self
    }

    pub fn add_name_digit_exception(mut self, word: &str, digits: usize) -> Self {
        self.name_digit_exceptions
            .push(NameDigitException::new(word, digits));
        self
    }

    pub fn max_label_len(mut self, n: usize) -> Self {
        self.max_label_len = Some(n);
        self
    }

    pub fn junk_label_regex(mut self, pattern: &str) -> Self {
        self.junk_label_re = Some(pattern.to_string());
        self
    }

    // ── Resolution / validation ──

    /// Decimal widths tried, in order, for the Height column.
    pub fn height_decimal_candidates(mut self, widths: Vec<usize>) -> Self {
        self.height_decimal_candidates = Some(widths);
        self
    }

    pub fn percent_max(mut self, max: f64) -> Self {
        self.percent_max = Some(max);
        self
    }

    pub fn mg_per_g_max(mut self, max: f64) -> Self {
        self.mg_per_g_max = Some(max);
        self
    }

    pub fn add_injection_key_alias(mut self, label: String, key: String) -> Self {
        self.injection_key_aliases.push((label, key));
        self
    }

    pub fn thc_limit_percent(mut self, limit: f64) -> Self {
        self.thc_limit_percent = Some(limit);
        self
    }

    /// Compile all string patterns and check bounds, producing a [`ParsingConfig`].
    pub fn build(self) -> Result<ParsingConfig, ConfigError> {
        let compile = |opt: Option<String>| -> Result<Option<Regex>, regex::Error> {
            opt.map(|p| Regex::new(&p)).transpose()
        };

        let candidates = self
            .height_decimal_candidates
            .unwrap_or_else(|| DEFAULT_HEIGHT_DECIMALS.to_vec());
        if candidates.is_empty() {
            return Err(ConfigError::EmptyCandidates);
        }
        if let Some(&bad) = candidates.iter().find(|&&w| w == 0 || w > MAX_DECIMALS) {
            return Err(ConfigError::CandidateOutOfBounds(bad));
        }

        let percent_range = checked_range("percent", self.percent_max.unwrap_or(100.0))?;
        let mg_per_g_range = checked_range("mg/g", self.mg_per_g_max.unwrap_or(1000.0))?;

        Ok(ParsingConfig {
            peak_table_anchor_re: compile(self.peak_table_anchor_re)?,
            potency_anchor_re: compile(self.potency_anchor_re)?,
            section_end_re: compile(self.section_end_re)?,
            compound_names: self.compound_names,
            compound_aliases: self.compound_aliases,
            name_digit_exceptions: self.name_digit_exceptions,
            max_label_len: self.max_label_len.unwrap_or(30),
            junk_label_re: compile(self.junk_label_re)?,
            height_decimal_candidates: candidates,
            percent_range,
            mg_per_g_range,
            injection_key_aliases: self.injection_key_aliases,
            thc_limit_percent: self.thc_limit_percent.unwrap_or(DEFAULT_THC_LIMIT_PERCENT),
        })
    }
}

fn checked_range(field: &'static str, max: f64) -> Result<(f64, f64), ConfigError> {
    if !max.is_finite() || max <= 0.0 {
        return Err(ConfigError::InvalidRange {
            field,
            min: 0.0,
            max,
        });
    }
    Ok((0.0, max))
}
