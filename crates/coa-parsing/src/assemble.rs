use std::collections::BTreeSet;

use coa_core::{
    CannabinoidResult, ExtractionMetadata, ExtractionResult, ExtractionStats, InjectionDetails,
    Peak, ResultValue, summarize_compliance,
};

use crate::LineError;
use crate::resolve::RunRow;

/// Why a line ended up in `unresolved_lines` instead of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum UnresolvedReason {
    /// Resolution or validation failed for the line.
    Line(LineError),
    /// The anchor line that opened a block.
    SectionHeader,
    ColumnHeader,
    UnclassifiedBlock,
    DuplicateCompound,
    DuplicatePeakNumber,
    NotKeyValue,
    DuplicateKey,
    EmptyDocument,
}

impl UnresolvedReason {
    /// Stable prefix of the `unresolved_lines` entry.
    pub fn code(&self) -> &'static str {
        match self {
            UnresolvedReason::Line(e) => e.reason(),
            UnresolvedReason::SectionHeader => "section header",
            UnresolvedReason::ColumnHeader => "column header",
            UnresolvedReason::UnclassifiedBlock => "unclassified block",
            UnresolvedReason::DuplicateCompound => "duplicate compound",
            UnresolvedReason::DuplicatePeakNumber => "duplicate peak number",
            UnresolvedReason::NotKeyValue => "not a key/value pair",
            UnresolvedReason::DuplicateKey => "duplicate key",
            UnresolvedReason::EmptyDocument => "empty document",
        }
    }
}

impl From<LineError> for UnresolvedReason {
    fn from(e: LineError) -> Self {
        UnresolvedReason::Line(e)
    }
}

/// Accumulates validated records and diagnostics for one document.
///
/// Every input line is accounted for exactly once: either through one of the
/// `push_*`/`record_*` methods or through [`reject`](Self::reject).
#[derive(Debug, Default)]
pub struct RecordAssembler {
    cannabinoids: Vec<CannabinoidResult>,
    peaks: Vec<Peak>,
    injection_details: InjectionDetails,
    unresolved_lines: Vec<String>,
    total_area: Option<f64>,
    peak_numbers: BTreeSet<u32>,
    /// Indices into `peaks` of rows printed without a number.
    unnumbered: Vec<usize>,
    stats: ExtractionStats,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    pub fn begin_block(&mut self, line_count: usize) {
        self.stats.blocks += 1;
        self.stats.total_lines += line_count;
    }

    pub fn end_block(&mut self, structured: bool) {
        if structured {
            self.stats.structured_blocks += 1;
        }
    }

    /// Route a line to `unresolved_lines` as `"<reason>: <line>"`.
    pub fn reject(&mut self, reason: UnresolvedReason, line: &str) {
        let code = reason.code();
        match &reason {
            UnresolvedReason::Line(e @ LineError::RangeViolation { .. }) => {
                tracing::warn!(reason = code, error = %e, line, "rejected out-of-range result");
            }
            UnresolvedReason::Line(e) => {
                tracing::debug!(reason = code, error = %e, line, "unresolved line");
            }
            _ => tracing::debug!(reason = code, line, "unresolved line"),
        }
        self.unresolved_lines.push(format!("{code}: {line}"));
        self.stats.unresolved_lines += 1;
    }

    /// Reserve a printed peak number. Returns `false` if another row already
    /// printed it. Rows without a number always succeed; they are numbered
    /// in [`finish`](Self::finish).
    pub fn claim_peak_no(&mut self, printed: Option<u32>) -> bool {
        printed.is_none_or(|n| self.peak_numbers.insert(n))
    }

    /// Add one peak row and the potency result derived from it, if any.
    pub fn push_peak(&mut self, row: &RunRow, cannabinoid: Option<CannabinoidResult>) {
        if row.peak_no.is_none() {
            self.unnumbered.push(self.peaks.len());
        }
        self.peaks.push(peak_from_row(row, row.peak_no.unwrap_or(0)));
        self.cannabinoids.extend(cannabinoid);
        self.stats.structured_lines += 1;
    }

    /// Give unnumbered peaks, in document order, the lowest numbers no
    /// printed row uses.
    fn number_peaks(&mut self) {
        let mut free = (1..=u32::MAX).filter(|n| !self.peak_numbers.contains(n));
        for &i in &self.unnumbered {
            if let Some(n) = free.next() {
                self.peaks[i].peak_no = n;
            }
        }
    }

    /// Add a potency result spanning `lines` input lines.
    pub fn push_cannabinoid(&mut self, cannabinoid: CannabinoidResult, lines: usize) {
        self.cannabinoids.push(cannabinoid);
        self.stats.structured_lines += lines;
    }

    /// Returns `false` (and stores nothing) if `key` is already present.
    pub fn push_injection_detail(&mut self, key: String, value: String) -> bool {
        if self.injection_details.contains_key(&key) {
            return false;
        }
        self.injection_details.insert(key, value);
        self.stats.structured_lines += 1;
        true
    }

    /// A printed `Total:` row. The last one in the document wins.
    pub fn record_total_area(&mut self, area: f64) {
        self.total_area = Some(area);
        self.stats.structured_lines += 1;
    }

    pub fn finish(mut self, thc_limit_percent: f64) -> ExtractionResult {
        self.number_peaks();
        let total_area = self.total_area.or_else(|| {
            (!self.peaks.is_empty()).then(|| self.peaks.iter().map(|p| p.area).sum())
        });
        if let Some(total) = total_area.filter(|t| *t > 0.0) {
            for c in &mut self.cannabinoids {
                c.area_pct = c.area.map(|area| area / total * 100.0);
            }
        }
        let compliance = summarize_compliance(&self.cannabinoids, thc_limit_percent);

        ExtractionResult {
            batch_id: None,
            analysis_date: None,
            cannabinoids: self.cannabinoids,
            safety: Default::default(),
            metadata: ExtractionMetadata {
                peaks: self.peaks,
                injection_details: self.injection_details,
                unresolved_lines: self.unresolved_lines,
                total_area,
                compliance,
                averaged_files: None,
            },
            stats: self.stats,
        }
    }

    /// Result for input with no text lines: no records, one diagnostic.
    pub fn empty_document(thc_limit_percent: f64) -> ExtractionResult {
        let mut result = Self::new().finish(thc_limit_percent);
        result.metadata.unresolved_lines.push(format!(
            "{}: no text lines found",
            UnresolvedReason::EmptyDocument.code()
        ));
        result
    }
}

fn peak_from_row(row: &RunRow, peak_no: u32) -> Peak {
    Peak {
        peak_no,
        peak_name: row.label.clone(),
        retention_time: row.retention_time,
        area: row.area,
        height: row.height,
        relative_area: row.relative_area,
        relative_height: row.relative_height,
        amount_ppm: row.amount,
    }
}

/// Potency result for a quantified peak.
pub fn cannabinoid_from_peak(
    row: &RunRow,
    canonical: Option<&str>,
    percent: f64,
    mg_per_g: f64,
) -> CannabinoidResult {
    CannabinoidResult {
        compound_name: canonical.unwrap_or(&row.label).to_string(),
        identified: canonical.is_some(),
        result_percent: Some(ResultValue::Numeric(percent)),
        result_mg_per_g: Some(ResultValue::Numeric(mg_per_g)),
        retention_time: Some(row.retention_time),
        area: Some(row.area),
        area_pct: None,
    }
}
