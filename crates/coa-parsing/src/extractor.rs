use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use coa_core::{CannabinoidResult, ExtractionResult, PeakAmount};

use crate::LineError;
use crate::assemble::{RecordAssembler, UnresolvedReason, cannabinoid_from_peak};
use crate::compounds::CompoundResolver;
use crate::config::ParsingConfig;
use crate::detect::{self, Layout};
use crate::normalize::{self, Block, KEY_VALUE_RE, TOTAL_ROW_RE};
use crate::resolve::{
    CHROMELEON_RUN_TABLE, ConcatenatedLayout, FieldResolver, INTEGRATION_PEAK_TABLE, PotencyRow,
    RunRow, is_value_token, is_values_only, value_tokens,
};
use crate::safety::detect_safety;
use crate::validate::ValueValidator;

/// Table column headings and legend lines.
static COLUMN_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:No\.\s+Peak|Peak\s+Name|Analyte\b|LOD\b|LOQ\b|Result\b|\(%\)|\(mg/g\)|ND\s*=|NT\s*=|min\s+mAU)|Retention Time",
    )
    .unwrap()
});

/// First calendar date in a document: `4/12/2024` or `2024-04-12`.
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2})\b").unwrap());

/// Injection detail keys that name the batch, in order of preference.
const BATCH_KEYS: &[&str] = &["injection_name", "batch", "batch_id", "batch_number"];

/// A label-only potency line absorbs at most this many name fragments.
const MAX_NAME_FRAGMENTS: usize = 5;

/// Injection labels with a fixed output key.
pub const DEFAULT_INJECTION_KEYS: &[(&str, &str)] = &[
    ("Injection Name", "injection_name"),
    ("Vial Number", "vial_number"),
    ("Injection Type", "injection_type"),
    ("Instrument Method", "instrument_method"),
    ("Processing Method", "processing_method"),
    ("Injection Date/Time", "injection_datetime"),
    ("Run Time (min)", "run_time"),
    ("Injection Volume", "injection_volume"),
    ("Channel", "channel"),
    ("Wavelength", "wavelength"),
    ("Bandwidth", "bandwidth"),
    ("Dilution Factor", "dilution_factor"),
    ("Sample Weight", "sample_weight"),
];

/// How a block ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// At least one line became a record.
    Structured,
    /// Only diagnostics.
    Unresolved,
}

/// A configurable report extraction pipeline.
///
/// Holds a [`ParsingConfig`] plus the compound table built from it, and
/// exposes each pipeline step as a method. Extraction keeps no state between
/// calls, so one extractor can serve any number of documents.
#[derive(Debug, Clone)]
pub struct CoaExtractor {
    config: ParsingConfig,
    compounds: CompoundResolver,
    validator: ValueValidator,
    injection_keys: Vec<(String, String)>,
}

impl Default for CoaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CoaExtractor {
    /// Create an extractor with default configuration.
    pub fn new() -> Self {
        Self::with_config(ParsingConfig::default())
    }

    /// Create an extractor with a custom configuration.
    pub fn with_config(config: ParsingConfig) -> Self {
        let defaults: Vec<(String, String)> = DEFAULT_INJECTION_KEYS
            .iter()
            .map(|(l, k)| (l.to_string(), k.to_string()))
            .collect();
        Self {
            compounds: CompoundResolver::from_config(&config),
            validator: ValueValidator::from_config(&config),
            injection_keys: config.injection_key_aliases.resolve(&defaults),
            config,
        }
    }

    /// Get a reference to the current config.
    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    pub fn compounds(&self) -> &CompoundResolver {
        &self.compounds
    }

    fn fields(&self) -> FieldResolver<'_> {
        FieldResolver::new(&self.compounds, &self.config.height_decimal_candidates)
    }

    /// Normalize text and split it into blocks (step 1).
    pub fn segment(&self, text: &str) -> Vec<Block> {
        normalize::segment_with_config(normalize::normalize_lines(text), &self.config)
    }

    /// Classify a block (step 2).
    pub fn detect(&self, block: &Block) -> Layout {
        detect::detect_layout(block, &self.compounds)
    }

    /// Resolve one delimiter-free chromatogram row (step 3).
    pub fn resolve_run_line(&self, line: &str, layout: &ConcatenatedLayout) -> Result<RunRow, LineError> {
        self.fields().resolve_concatenated(line, layout)
    }

    /// Resolve one potency row (step 3).
    pub fn resolve_potency_line(&self, line: &str) -> Result<PotencyRow, LineError> {
        self.fields().resolve_potency(line)
    }

    /// Run the full pipeline over one document.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        let lines = normalize::normalize_lines(text);
        if lines.is_empty() {
            tracing::info!("empty document, nothing to extract");
            return RecordAssembler::empty_document(self.config.thc_limit_percent);
        }

        let safety = detect_safety(&lines);
        let printed_date = lines
            .iter()
            .find_map(|l| DATE_RE.find(l))
            .map(|m| m.as_str().to_string());

        let blocks = normalize::segment_with_config(lines, &self.config);
        let mut asm = RecordAssembler::new();
        for block in &blocks {
            self.process_block(block, &mut asm);
        }

        let mut result = asm.finish(self.config.thc_limit_percent);
        let details = &result.metadata.injection_details;
        result.batch_id = BATCH_KEYS.iter().find_map(|k| details.get(*k)).cloned();
        result.analysis_date = details.get("injection_datetime").cloned().or(printed_date);
        result.safety = safety;
        tracing::info!(
            batch_id = ?result.batch_id,
            blocks = result.stats.blocks,
            structured_blocks = result.stats.structured_blocks,
            structured_lines = result.stats.structured_lines,
            unresolved_lines = result.stats.unresolved_lines,
            cannabinoids = result.cannabinoids.len(),
            peaks = result.metadata.peaks.len(),
            "extracted document"
        );
        result
    }

    /// Detect, resolve, validate and assemble one block.
    pub fn process_block(&self, block: &Block, asm: &mut RecordAssembler) -> BlockState {
        let layout = self.detect(block);
        tracing::debug!(
            layout = layout.as_str(),
            anchor = ?block.anchor,
            lines = block.lines.len(),
            "classified block"
        );

        asm.begin_block(block.line_count());
        if let Some(header) = &block.header {
            asm.reject(UnresolvedReason::SectionHeader, header);
        }

        let before = asm.stats().structured_lines;
        match layout {
            Layout::ChromeleonRunTable => {
                self.assemble_chromatogram(&block.lines, &CHROMELEON_RUN_TABLE, asm)
            }
            Layout::PeakTable => self.assemble_chromatogram(&block.lines, &INTEGRATION_PEAK_TABLE, asm),
            Layout::PotencyTable => self.assemble_potency(&block.lines, asm),
            Layout::InjectionParameters => self.assemble_injection(&block.lines, asm),
            Layout::Unclassified => {
                for line in &block.lines {
                    asm.reject(UnresolvedReason::UnclassifiedBlock, line);
                }
            }
        }

        let state = if asm.stats().structured_lines > before {
            BlockState::Structured
        } else {
            BlockState::Unresolved
        };
        asm.end_block(state == BlockState::Structured);
        state
    }

    fn assemble_chromatogram(&self, lines: &[String], layout: &ConcatenatedLayout, asm: &mut RecordAssembler) {
        for line in lines {
            if COLUMN_HEADER_RE.is_match(line) {
                asm.reject(UnresolvedReason::ColumnHeader, line);
                continue;
            }

            if let Some(caps) = TOTAL_ROW_RE.captures(line) {
                match caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                    Some(area) => asm.record_total_area(area),
                    None => asm.reject(
                        LineError::Malformed {
                            detail: "total row without an area".to_string(),
                        }
                        .into(),
                        line,
                    ),
                }
                continue;
            }

            let row = match self.resolve_run_line(line, layout) {
                Ok(row) => row,
                Err(e) => {
                    asm.reject(e.into(), line);
                    continue;
                }
            };

            let cannabinoid = match self.peak_potency(&row) {
                Ok(c) => c,
                Err(e) => {
                    asm.reject(e.into(), line);
                    continue;
                }
            };

            if !asm.claim_peak_no(row.peak_no) {
                asm.reject(UnresolvedReason::DuplicatePeakNumber, line);
                continue;
            }
            asm.push_peak(&row, cannabinoid);
        }
    }

    /// Potency implied by a quantified, named peak: `ppm / 10^4` percent and
    /// `ppm / 10^3` mg/g. Unnamed and `n.a.` peaks yield nothing.
    fn peak_potency(&self, row: &RunRow) -> Result<Option<CannabinoidResult>, LineError> {
        let PeakAmount::Ppm(ppm) = row.amount else {
            return Ok(None);
        };
        if row.label.is_empty() {
            return Ok(None);
        }
        let (percent, mg_per_g) = self
            .validator
            .validate_numeric_pair(ppm / 10_000.0, ppm / 1_000.0)?;
        let canonical = self.compounds.canonicalize(&row.label);
        Ok(Some(cannabinoid_from_peak(row, canonical, percent, mg_per_g)))
    }

    fn assemble_potency(&self, lines: &[String], asm: &mut RecordAssembler) {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut i = 0;

        while i < lines.len() {
            let line = &lines[i];
            if COLUMN_HEADER_RE.is_match(line) {
                asm.reject(UnresolvedReason::ColumnHeader, line);
                i += 1;
                continue;
            }

            let (text, span) = potency_row_text(&lines[i..]);
            let physical = &lines[i..i + span];
            i += span;

            match self.potency_record(&text) {
                Ok(c) if seen.insert(c.compound_name.clone()) => asm.push_cannabinoid(c, span),
                Ok(_) => {
                    for l in physical {
                        asm.reject(UnresolvedReason::DuplicateCompound, l);
                    }
                }
                Err(e) => {
                    for l in physical {
                        asm.reject(e.clone().into(), l);
                    }
                }
            }
        }
    }

    fn potency_record(&self, text: &str) -> Result<CannabinoidResult, LineError> {
        let row = self.resolve_potency_line(text)?;
        let (percent, mg_per_g) = self
            .validator
            .validate_pair(&row.percent_token, &row.mg_per_g_token)?;
        Ok(CannabinoidResult {
            identified: row.canonical.is_some(),
            compound_name: row.canonical.unwrap_or(row.label),
            result_percent: Some(percent),
            result_mg_per_g: Some(mg_per_g),
            retention_time: None,
            area: None,
            area_pct: None,
        })
    }

    fn assemble_injection(&self, lines: &[String], asm: &mut RecordAssembler) {
        for line in lines {
            let Some(caps) = KEY_VALUE_RE.captures(line) else {
                asm.reject(UnresolvedReason::NotKeyValue, line);
                continue;
            };
            let (Some(label), Some(value)) = (caps.get(1), caps.get(2)) else {
                asm.reject(UnresolvedReason::NotKeyValue, line);
                continue;
            };
            let key = self.injection_key(label.as_str());
            if !asm.push_injection_detail(key, value.as_str().trim().to_string()) {
                asm.reject(UnresolvedReason::DuplicateKey, line);
            }
        }
    }

    /// Output key for an injection label: the configured key if the label
    /// is known, else the label in snake_case.
    pub fn injection_key(&self, label: &str) -> String {
        let label = label.trim();
        self.injection_keys
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(label))
            .map_or_else(|| snake_case(label), |(_, key)| key.clone())
    }
}

/// Text of the logical potency row starting at `lines[0]`, and how many
/// physical lines it takes. A label wrapped onto its own line takes the
/// values from the next line. PDF extraction can also split a short name
/// (`CB` / `D`), so short letter-only fragments are glued back onto the
/// label first.
fn potency_row_text(lines: &[String]) -> (String, usize) {
    let mut text = lines[0].clone();
    let mut span = 1;
    if value_tokens(&text).next().is_some() {
        return (text, span);
    }

    while span <= MAX_NAME_FRAGMENTS
        && let Some(next) = lines.get(span)
        && is_name_fragment(next)
    {
        text.push_str(next);
        span += 1;
    }
    if let Some(next) = lines.get(span)
        && is_values_only(next)
        && !COLUMN_HEADER_RE.is_match(next)
    {
        text.push(' ');
        text.push_str(next);
        span += 1;
    }
    (text, span)
}

fn is_name_fragment(line: &str) -> bool {
    !line.is_empty()
        && line.chars().count() <= 3
        && line.chars().all(char::is_alphabetic)
        && !is_value_token(line)
}

fn snake_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
