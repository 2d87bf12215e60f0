//! Field resolution for report rows.
//!
//! Chromatogram rows often arrive from PDF extraction with the columns glued
//! together (`CBD6.075179.3791437.27390.0689.42203209.7311`). Every column is
//! `<digits>.<digits>` with a known decimal width except one, so the decimal
//! points fix the layout: each field ends `width` digits after its dot and the
//! next field starts right there. The single variable-width column is resolved
//! by trying a bounded list of widths and checking the neighbouring column.
//!
//! Potency rows are whitespace-delimited and only need value tokens pulled off
//! the right-hand side.

use once_cell::sync::Lazy;
use regex::Regex;

use coa_core::PeakAmount;

use crate::LineError;
use crate::compounds::CompoundResolver;

/// `ND`, `<LOQ`, `<LOD`, `<0.05` or a plain decimal, as a whole token.
/// Case matters: a lowercase `nd` is text.
static VALUE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:ND|<LO[QD]|<?\d+(?:\.\d+)?)$").unwrap());

/// Leading peak number: `12 THCBV5.937...`.
static PEAK_NO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s+(\S.*)$").unwrap());

/// Semantic role of one numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    RetentionTime,
    Area,
    Height,
    RelativeArea,
    RelativeHeight,
    AmountPpm,
}

impl FieldRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::RetentionTime => "retention time",
            FieldRole::Area => "area",
            FieldRole::Height => "height",
            FieldRole::RelativeArea => "relative area",
            FieldRole::RelativeHeight => "relative height",
            FieldRole::AmountPpm => "amount",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decimals {
    Fixed(usize),
    /// Width unknown; candidates are tried in configured order.
    Backtrack,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub role: FieldRole,
    pub decimals: Decimals,
    /// Inclusive bounds checked when this field neighbours a backtracked one.
    pub guard: Option<(f64, f64)>,
}

const fn fixed(role: FieldRole, decimals: usize) -> FieldSpec {
    FieldSpec {
        role,
        decimals: Decimals::Fixed(decimals),
        guard: None,
    }
}

/// Column layout of a delimiter-free numeric row. The last field is always
/// the amount, which may be printed as `n.a.` instead.
#[derive(Debug, Clone, Copy)]
pub struct ConcatenatedLayout {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl ConcatenatedLayout {
    /// Decimal points a row must contain.
    pub fn expected_dots(&self, amount_missing: bool) -> usize {
        self.fields.len() - usize::from(amount_missing)
    }
}

/// Chromeleon 6-dot run table: RT, Area, Height, RelArea %, RelHeight %, ppm.
pub const CHROMELEON_RUN_TABLE: ConcatenatedLayout = ConcatenatedLayout {
    name: "chromeleon run table",
    fields: &[
        fixed(FieldRole::RetentionTime, 3),
        fixed(FieldRole::Area, 3),
        FieldSpec {
            role: FieldRole::Height,
            decimals: Decimals::Backtrack,
            guard: None,
        },
        FieldSpec {
            role: FieldRole::RelativeArea,
            decimals: Decimals::Fixed(2),
            guard: Some((0.0, 100.0)),
        },
        fixed(FieldRole::RelativeHeight, 2),
        fixed(FieldRole::AmountPpm, 4),
    ],
};

/// Integration Results peak table: RT, Area, ppm.
pub const INTEGRATION_PEAK_TABLE: ConcatenatedLayout = ConcatenatedLayout {
    name: "integration peak table",
    fields: &[
        fixed(FieldRole::RetentionTime, 3),
        fixed(FieldRole::Area, 3),
        fixed(FieldRole::AmountPpm, 4),
    ],
};

/// One resolved chromatogram row.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    /// Peak number printed before the label, if any.
    pub peak_no: Option<u32>,
    pub label: String,
    pub retention_time: f64,
    pub area: f64,
    pub height: Option<f64>,
    pub relative_area: Option<f64>,
    pub relative_height: Option<f64>,
    pub amount: PeakAmount,
}

/// One potency row split into label and its last two value tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PotencyRow {
    /// Canonical name when the label matched the reference list.
    pub canonical: Option<String>,
    pub label: String,
    pub percent_token: String,
    pub mg_per_g_token: String,
}

/// Strip a trailing `n.a.` amount, spaced or glued on.
pub fn split_trailing_na(line: &str) -> (&str, bool) {
    let line = line.trim_end();
    let Some(cut) = line.len().checked_sub(4) else {
        return (line, false);
    };
    match line.get(cut..) {
        Some(tail) if tail.eq_ignore_ascii_case("n.a.") => (line[..cut].trim_end(), true),
        _ => (line, false),
    }
}

/// Split off a leading peak number. `9S-HHC 9.465` has none, and neither does
/// a line whose text before the first dot is all digits.
fn split_peak_no(line: &str) -> (Option<u32>, &str) {
    let Some(caps) = PEAK_NO_RE.captures(line) else {
        return (None, line);
    };
    let (Some(no), Some(rest)) = (caps.get(1), caps.get(2)) else {
        return (None, line);
    };
    let before_dot = rest.as_str().split('.').next().unwrap_or_default();
    if !before_dot
        .chars()
        .any(|c| !c.is_ascii_digit() && !c.is_whitespace())
    {
        return (None, line);
    }
    match no.as_str().parse::<u32>() {
        Ok(n) if n > 0 => (Some(n), rest.as_str()),
        _ => (None, line),
    }
}

/// Whitespace-delimited tokens that are value tokens.
pub fn value_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace().filter(|t| VALUE_TOKEN_RE.is_match(t))
}

pub fn is_value_token(token: &str) -> bool {
    VALUE_TOKEN_RE.is_match(token)
}

/// A line made of two or more value tokens and nothing else.
pub fn is_values_only(line: &str) -> bool {
    let mut count = 0;
    for token in line.split_whitespace() {
        if !is_value_token(token) {
            return false;
        }
        count += 1;
    }
    count >= 2
}

/// Resolves rows against the compound table and the configured height widths.
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    compounds: &'a CompoundResolver,
    height_candidates: &'a [usize],
}

impl<'a> FieldResolver<'a> {
    pub fn new(compounds: &'a CompoundResolver, height_candidates: &'a [usize]) -> Self {
        Self {
            compounds,
            height_candidates,
        }
    }

    /// Partition a delimiter-free row into label and numeric fields.
    pub fn resolve_concatenated(
        &self,
        line: &str,
        layout: &ConcatenatedLayout,
    ) -> Result<RunRow, LineError> {
        let (body, amount_missing) = split_trailing_na(line.trim());
        let (peak_no, body) = split_peak_no(body);

        let expected = layout.expected_dots(amount_missing);
        let found = body.matches('.').count();
        if found != expected || expected == 0 {
            return Err(LineError::Malformed {
                detail: format!("{found} decimal points, expected {expected}"),
            });
        }

        // Whitespace after the first dot is column spacing, not part of a value.
        let first_dot = body.find('.').unwrap_or(body.len());
        let mut compact = body[..first_dot].to_string();
        compact.extend(body[first_dot..].chars().filter(|c| !c.is_whitespace()));

        let dots: Vec<usize> = compact.match_indices('.').map(|(i, _)| i).collect();
        let bytes = compact.as_bytes();

        let mut rt_start = dots[0];
        while rt_start > 0 && bytes[rt_start - 1].is_ascii_digit() {
            rt_start -= 1;
        }
        let mut label = compact[..rt_start].trim_end().to_string();
        let run_len = dots[0] - rt_start;

        let owned = self.compounds.name_owned_digits(&label);
        if owned > 0 && run_len > owned {
            label.push(' ');
            label.push_str(&compact[rt_start..rt_start + owned]);
            rt_start += owned;
        }

        if !label.is_empty() && self.compounds.is_junk_label(&label) {
            return Err(LineError::NonCompoundLabel { label });
        }

        let fields = &layout.fields[..expected];
        let values = self.partition(&compact, &dots, rt_start, fields)?;

        let value_of = |role: FieldRole| {
            fields
                .iter()
                .position(|f| f.role == role)
                .map(|i| values[i])
        };
        let (Some(retention_time), Some(area)) =
            (value_of(FieldRole::RetentionTime), value_of(FieldRole::Area))
        else {
            return Err(LineError::Malformed {
                detail: format!("{} row without retention time and area", layout.name),
            });
        };

        Ok(RunRow {
            peak_no,
            label,
            retention_time,
            area,
            height: value_of(FieldRole::Height),
            relative_area: value_of(FieldRole::RelativeArea),
            relative_height: value_of(FieldRole::RelativeHeight),
            amount: match value_of(FieldRole::AmountPpm) {
                Some(ppm) if !amount_missing => PeakAmount::Ppm(ppm),
                _ => PeakAmount::NotAvailable,
            },
        })
    }

    /// Field values for `compact`, one per spec. The right end and the fixed
    /// left fields are resolved first; the backtracked field and its
    /// right-hand neighbour are then settled together.
    fn partition(
        &self,
        compact: &str,
        dots: &[usize],
        rt_start: usize,
        fields: &[FieldSpec],
    ) -> Result<Vec<f64>, LineError> {
        let last = fields.len() - 1;
        let trailing = compact.len() - dots[last] - 1;
        if let Decimals::Fixed(width) = fields[last].decimals
            && trailing != width
        {
            return Err(LineError::Malformed {
                detail: format!(
                    "{} has {trailing} decimals, expected {width}",
                    fields[last].role.as_str()
                ),
            });
        }

        let backtrack = fields[..last]
            .iter()
            .position(|f| f.decimals == Decimals::Backtrack);
        let varies = |i: usize| backtrack.is_some_and(|v| i == v || i == v + 1);

        let ends_for = |width: usize| -> Vec<usize> {
            fields
                .iter()
                .enumerate()
                .map(|(i, spec)| {
                    if i == last {
                        compact.len()
                    } else {
                        match spec.decimals {
                            Decimals::Fixed(d) => dots[i] + 1 + d,
                            Decimals::Backtrack => dots[i] + 1 + width,
                        }
                    }
                })
                .collect()
        };
        let start_of = |ends: &[usize], i: usize| if i == 0 { rt_start } else { ends[i - 1] };

        let base = ends_for(0);
        let mut values = vec![0.0; fields.len()];
        for i in (0..fields.len()).rev().filter(|&i| !varies(i)) {
            values[i] = parse_span(compact, start_of(&base, i), base[i], fields[i].role)?;
        }

        let Some(v) = backtrack else {
            return Ok(values);
        };

        let neighbour = fields[v + 1];
        for &width in self.height_candidates {
            let ends = ends_for(width);
            let Ok(value) = parse_span(compact, start_of(&ends, v), ends[v], fields[v].role) else {
                continue;
            };
            let Ok(next) = parse_span(compact, ends[v], ends[v + 1], neighbour.role) else {
                continue;
            };
            if let Some((lo, hi)) = neighbour.guard
                && !(lo..=hi).contains(&next)
            {
                continue;
            }
            tracing::trace!(width, value, next, "resolved variable-width field");
            values[v] = value;
            values[v + 1] = next;
            return Ok(values);
        }

        Err(LineError::AmbiguousBoundary {
            tried: self.height_candidates.to_vec(),
        })
    }

    /// Split a potency row into label, `%` token and `mg/g` token.
    ///
    /// The last two value tokens are `%` then `mg/g`. That order is a fixed
    /// convention of the lab format and cannot be checked from the text; the
    /// validator's ranges catch most swaps.
    pub fn resolve_potency(&self, line: &str) -> Result<PotencyRow, LineError> {
        let (canonical, label, rest) = match self.compounds.split_leading(line) {
            Some(m) => (Some(m.canonical), m.label.to_string(), m.rest),
            None => {
                let label = line
                    .split_whitespace()
                    .take_while(|t| !is_value_token(t))
                    .collect::<Vec<_>>()
                    .join(" ");
                (None, label, line)
            }
        };

        if label.is_empty() {
            return Err(LineError::MissingName);
        }
        if canonical.is_none() && self.compounds.is_junk_label(&label) {
            return Err(LineError::NonCompoundLabel { label });
        }

        let tokens: Vec<&str> = value_tokens(rest).collect();
        let [.., percent, mg_per_g] = tokens.as_slice() else {
            return Err(LineError::InsufficientTokens {
                found: tokens.len(),
            });
        };

        Ok(PotencyRow {
            canonical,
            label,
            percent_token: percent.to_string(),
            mg_per_g_token: mg_per_g.to_string(),
        })
    }
}

/// Parse `compact[start..end]` as `<digits>.<digits>`.
fn parse_span(compact: &str, start: usize, end: usize, role: FieldRole) -> Result<f64, LineError> {
    let unparseable = |text: &str| LineError::UnparseableField {
        field: role.as_str(),
        text: text.to_string(),
    };
    let Some(text) = (start < end).then(|| compact.get(start..end)).flatten() else {
        return Err(unparseable(compact.get(start..).unwrap_or_default()));
    };
    let Some((int, frac)) = text.split_once('.') else {
        return Err(unparseable(text));
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(int) || !digits(frac) {
        return Err(unparseable(text));
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(unparseable(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_HEIGHT_DECIMALS;

    fn run(line: &str) -> Result<RunRow, LineError> {
        let compounds = CompoundResolver::default();
        FieldResolver::new(&compounds, &DEFAULT_HEIGHT_DECIMALS)
            .resolve_concatenated(line, &CHROMELEON_RUN_TABLE)
    }

    fn peak(line: &str) -> Result<RunRow, LineError> {
        let compounds = CompoundResolver::default();
        FieldResolver::new(&compounds, &DEFAULT_HEIGHT_DECIMALS)
            .resolve_concatenated(line, &INTEGRATION_PEAK_TABLE)
    }

    fn potency(line: &str) -> Result<PotencyRow, LineError> {
        let compounds = CompoundResolver::default();
        FieldResolver::new(&compounds, &DEFAULT_HEIGHT_DECIMALS).resolve_potency(line)
    }

    #[test]
    fn test_run_row_cbd() {
        let row = run("CBD6.075179.3791437.27390.0689.42203209.7311").unwrap();
        assert_eq!(row.label, "CBD");
        assert_eq!(row.peak_no, None);
        assert_eq!(row.retention_time, 6.075);
        assert_eq!(row.area, 179.379);
        assert_eq!(row.height, Some(1437.273));
        assert_eq!(row.relative_area, Some(90.06));
        assert_eq!(row.relative_height, Some(89.42));
        assert_eq!(row.amount, PeakAmount::Ppm(203209.7311));
    }

    #[test]
    fn test_run_row_delta_digit_belongs_to_name() {
        let row = run("Delta 98.6926.95267.5033.494.208462.9075").unwrap();
        assert_eq!(row.label, "Delta 9");
        assert_eq!(row.retention_time, 8.692);
        assert_eq!(row.area, 6.952);
        assert_eq!(row.height, Some(67.50));
        assert_eq!(row.relative_area, Some(33.49));
        assert_eq!(row.relative_height, Some(4.20));
        assert_eq!(row.amount, PeakAmount::Ppm(8462.9075));

        let row = run("Delta 89.0700.1161.0610.060.07671.8950").unwrap();
        assert_eq!(row.label, "Delta 8");
        assert_eq!(row.retention_time, 9.070);
        assert_eq!(row.height, Some(1.06));
        assert_eq!(row.relative_area, Some(10.06));
    }

    #[test]
    fn test_run_row_two_digit_retention_time() {
        let row = run("CBC10.3845.37144.9672.702.806770.6757").unwrap();
        assert_eq!(row.label, "CBC");
        assert_eq!(row.retention_time, 10.384);
        assert_eq!(row.area, 5.371);
        assert_eq!(row.height, Some(44.96));
        assert_eq!(row.relative_area, Some(72.70));
        assert_eq!(row.relative_height, Some(2.80));
    }

    #[test]
    fn test_run_row_spaced_columns() {
        let row = run("CBN 7.836 1.981 18.04 60.99 1.12 1487.4951").unwrap();
        assert_eq!(row.label, "CBN");
        assert_eq!(row.retention_time, 7.836);
        assert_eq!(row.height, Some(18.04));
        assert_eq!(row.relative_area, Some(60.99));
    }

    #[test]
    fn test_run_row_wrong_dot_count() {
        let err = run("CBD6.075179.3791437.27390.0689.42").unwrap_err();
        assert!(matches!(err, LineError::Malformed { .. }));
        assert_eq!(err.reason(), "malformed line");
    }

    #[test]
    fn test_run_row_ambiguous_boundary() {
        // relative area comes out above 100 for every candidate width
        let err = run("CBD6.075179.3791437.2739999.0689.42203209.7311").unwrap_err();
        assert!(matches!(err, LineError::AmbiguousBoundary { .. }), "{err:?}");
    }

    #[test]
    fn test_run_row_height_width_order_matters() {
        let line = "CBG6.3925.37038.5522.702.406101.7138";
        // both widths satisfy the guard here; the first one listed wins
        let row = run(line).unwrap();
        assert_eq!(row.height, Some(38.55));
        assert_eq!(row.relative_area, Some(22.70));

        let compounds = CompoundResolver::default();
        let row = FieldResolver::new(&compounds, &[3, 2, 4])
            .resolve_concatenated(line, &CHROMELEON_RUN_TABLE)
            .unwrap();
        assert_eq!(row.height, Some(38.552));
        assert_eq!(row.relative_area, Some(2.70));
    }

    #[test]
    fn test_run_row_falls_through_to_wider_height() {
        // two decimals would put 390.06 in the relative area column
        let row = run("CBD6.075179.3791437.27390.0689.42203209.7311").unwrap();
        assert_eq!(row.height, Some(1437.273));
        assert_eq!(row.relative_area, Some(90.06));
    }

    #[test]
    fn test_run_row_bad_trailing_width() {
        let err = run("CBD6.075179.3791437.27390.0689.42203209.73").unwrap_err();
        assert!(matches!(err, LineError::Malformed { .. }));
    }

    #[test]
    fn test_run_row_junk_label() {
        let err = run("Page6.075179.3791437.27390.0689.42203209.7311").unwrap_err();
        assert!(matches!(err, LineError::NonCompoundLabel { .. }));
    }

    #[test]
    fn test_peak_rows() {
        let row = peak("1 THCBV 5.937 0.359 158.6340").unwrap();
        assert_eq!(row.peak_no, Some(1));
        assert_eq!(row.label, "THCBV");
        assert_eq!(row.retention_time, 5.937);
        assert_eq!(row.area, 0.359);
        assert_eq!(row.height, None);
        assert_eq!(row.amount, PeakAmount::Ppm(158.634));

        let squashed = peak("1 THCBV5.9370.359158.6340").unwrap();
        assert_eq!(squashed, row);

        let delta = peak("4 Delta 98.7471.896831.4385").unwrap();
        assert_eq!(delta.peak_no, Some(4));
        assert_eq!(delta.label, "Delta 9");
        assert_eq!(delta.retention_time, 8.747);
        assert_eq!(delta.area, 1.896);
        assert_eq!(delta.amount, PeakAmount::Ppm(831.4385));
    }

    #[test]
    fn test_peak_row_not_available() {
        let row = peak("7 9S-HHC 9.465 3.131 n.a.").unwrap();
        assert_eq!(row.peak_no, Some(7));
        assert_eq!(row.label, "9S-HHC");
        assert_eq!(row.retention_time, 9.465);
        assert_eq!(row.area, 3.131);
        assert_eq!(row.amount, PeakAmount::NotAvailable);
    }

    #[test]
    fn test_split_trailing_na() {
        assert_eq!(split_trailing_na("x 3.131 n.a."), ("x 3.131", true));
        assert_eq!(split_trailing_na("x 3.131N.A."), ("x 3.131", true));
        assert_eq!(split_trailing_na("x 3.131"), ("x 3.131", false));
        assert_eq!(split_trailing_na("na"), ("na", false));
    }

    #[test]
    fn test_potency_stereo_name() {
        let row = potency("(6aR,9R,10aR)-HHC 0.0067 0.02 13.0 130").unwrap();
        assert_eq!(row.canonical.as_deref(), Some("(6aR,9R,10aR)-HHC"));
        assert_eq!(row.percent_token, "13.0");
        assert_eq!(row.mg_per_g_token, "130");
    }

    #[test]
    fn test_potency_sentinels_and_unknown_name() {
        let row = potency("CBDV 0.02 0.05 <LOQ ND").unwrap();
        assert_eq!(row.canonical.as_deref(), Some("CBDV"));
        assert_eq!(row.percent_token, "<LOQ");
        assert_eq!(row.mg_per_g_token, "ND");

        let unknown = potency("Exotic Blend 0.1 0.2 1.5 15").unwrap();
        assert_eq!(unknown.canonical, None);
        assert_eq!(unknown.label, "Exotic Blend");
    }

    #[test]
    fn test_potency_insufficient_tokens() {
        let err = potency("CBG 1.25").unwrap_err();
        assert_eq!(err, LineError::InsufficientTokens { found: 1 });
        assert_eq!(err.reason(), "insufficient tokens");
    }

    #[test]
    fn test_potency_partial_numbers_not_tokens() {
        // "1.2.3" and "12abc" are not value tokens
        let err = potency("CBN 1.2.3 12abc 4.5").unwrap_err();
        assert_eq!(err, LineError::InsufficientTokens { found: 1 });
    }

    #[test]
    fn test_value_tokens_match_case() {
        assert!(is_value_token("ND"));
        assert!(is_value_token("<LOQ"));
        assert!(is_value_token("<0.05"));
        assert!(!is_value_token("nd"));
        assert!(!is_value_token("<loq"));

        let row = potency("CBDV 0.02 0.05 <0.05 ND").unwrap();
        assert_eq!(row.percent_token, "<0.05");
        assert!(is_values_only("0.02 ND"));
        assert!(!is_values_only("0.02 nd"));
    }

    #[test]
    fn test_potency_missing_name() {
        assert_eq!(potency("0.02 0.05 1.0 10").unwrap_err(), LineError::MissingName);
    }
}
