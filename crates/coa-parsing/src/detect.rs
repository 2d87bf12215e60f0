use once_cell::sync::Lazy;
use regex::Regex;

use coa_core::Sentinel;

use crate::compounds::CompoundResolver;
use crate::normalize::{Block, BlockAnchor, KEY_VALUE_RE};
use crate::resolve::{CHROMELEON_RUN_TABLE, split_trailing_na, value_tokens};

/// `1 THCBV 5.937 0.359 158.6340`, spaced or squashed, amount may be `n.a.`.
static PEAK_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\d+\s+\S.*?\d\.\d{3}\s*\d+\.\d{3}\s*(?:\d+\.\d{4}|n\.a\.)$").unwrap()
});

/// Report layouts a block can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Six-field Chromeleon rows with the columns glued together.
    ChromeleonRunTable,
    /// Integration Results rows: number, name, RT, area, amount.
    PeakTable,
    /// Whitespace-delimited potency table.
    PotencyTable,
    /// `Key: value` instrument parameters.
    InjectionParameters,
    Unclassified,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::ChromeleonRunTable => "chromeleon_run_table",
            Layout::PeakTable => "peak_table",
            Layout::PotencyTable => "potency_table",
            Layout::InjectionParameters => "injection_parameters",
            Layout::Unclassified => "unclassified",
        }
    }
}

/// Structural counts over one block's lines (header excluded).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSignature {
    pub anchor: Option<BlockAnchor>,
    pub lines: usize,
    /// Decimal points per line, not counting a trailing `n.a.`.
    pub dot_counts: Vec<usize>,
    /// Whitespace-delimited tokens per line.
    pub token_counts: Vec<usize>,
    /// Lines holding a `ND`/`<LOQ`/`<LOD` token.
    pub sentinel_lines: usize,
    /// Lines with at least two value tokens.
    pub value_lines: usize,
    /// Lines that start with a known compound and carry at least one value,
    /// `Label: value` lines excepted.
    pub compound_value_lines: usize,
    /// Lines with the run table's dot count and a glued multi-dot token.
    pub run_rows: usize,
    pub peak_rows: usize,
    pub key_value_lines: usize,
}

/// Compute the structural signature of a block.
pub fn signature(block: &Block, compounds: &CompoundResolver) -> BlockSignature {
    let mut sig = BlockSignature {
        anchor: block.anchor,
        lines: block.lines.len(),
        ..Default::default()
    };

    for line in &block.lines {
        let (body, amount_missing) = split_trailing_na(line);
        let dots = body.matches('.').count();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let values = value_tokens(line).count();

        if tokens.iter().any(|t| Sentinel::parse(t).is_some()) {
            sig.sentinel_lines += 1;
        }
        let key_value = KEY_VALUE_RE.is_match(line);
        if values >= 2 {
            sig.value_lines += 1;
        }
        if values >= 1 && !key_value && compounds.split_leading(line).is_some() {
            sig.compound_value_lines += 1;
        }
        if dots == CHROMELEON_RUN_TABLE.expected_dots(amount_missing)
            && tokens.iter().any(|t| t.matches('.').count() >= 2)
        {
            sig.run_rows += 1;
        }
        if PEAK_ROW_RE.is_match(line) {
            sig.peak_rows += 1;
        }
        if key_value {
            sig.key_value_lines += 1;
        }

        sig.dot_counts.push(dots);
        sig.token_counts.push(tokens.len());
    }
    sig
}

type Predicate = fn(&BlockSignature) -> bool;

fn is_run_table(sig: &BlockSignature) -> bool {
    sig.run_rows > 0
}

fn is_peak_table(sig: &BlockSignature) -> bool {
    sig.anchor == Some(BlockAnchor::PeakTable) || sig.peak_rows > 0
}

fn is_potency_table(sig: &BlockSignature) -> bool {
    sig.anchor == Some(BlockAnchor::PotencyTable)
        || sig.compound_value_lines > 0
        || (sig.value_lines >= 2 && sig.sentinel_lines > 0)
}

/// Mostly `Key: value` lines, or nothing but them.
fn is_injection_block(sig: &BlockSignature) -> bool {
    (sig.key_value_lines >= 2 && sig.key_value_lines * 3 >= sig.lines)
        || (sig.key_value_lines > 0 && sig.key_value_lines == sig.lines)
}

/// Known layouts in priority order; the first predicate that holds wins.
/// A glued 6-dot row would also satisfy the looser peak and potency checks,
/// so the concatenated layout goes first.
pub static LAYOUT_PRIORITY: &[(Predicate, Layout)] = &[
    (is_run_table, Layout::ChromeleonRunTable),
    (is_peak_table, Layout::PeakTable),
    (is_potency_table, Layout::PotencyTable),
    (is_injection_block, Layout::InjectionParameters),
];

/// Classify a signature against [`LAYOUT_PRIORITY`].
pub fn classify(sig: &BlockSignature) -> Layout {
    LAYOUT_PRIORITY
        .iter()
        .find(|(matches, _)| matches(sig))
        .map_or(Layout::Unclassified, |(_, layout)| *layout)
}

/// Classify a block.
pub fn detect_layout(block: &Block, compounds: &CompoundResolver) -> Layout {
    classify(&signature(block, compounds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(anchor: Option<BlockAnchor>, lines: &[&str]) -> Block {
        Block {
            anchor,
            header: None,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn detect(b: &Block) -> Layout {
        detect_layout(b, &CompoundResolver::default())
    }

    #[test]
    fn test_run_table_detected() {
        let b = block(None, &["CBD6.075179.3791437.27390.0689.42203209.7311"]);
        assert_eq!(detect(&b), Layout::ChromeleonRunTable);
    }

    #[test]
    fn test_run_table_wins_inside_peak_anchor() {
        let b = block(
            Some(BlockAnchor::PeakTable),
            &["No. Peak Name", "Delta 98.6926.95267.5033.494.208462.9075"],
        );
        assert_eq!(detect(&b), Layout::ChromeleonRunTable);
    }

    #[test]
    fn test_peak_table_detected() {
        let b = block(None, &["1 THCBV 5.937 0.359 158.6340", "7 9S-HHC 9.465 3.131 n.a."]);
        let sig = signature(&b, &CompoundResolver::default());
        assert_eq!(sig.peak_rows, 2);
        assert_eq!(sig.run_rows, 0);
        assert_eq!(sig.dot_counts, vec![3, 2]);
        assert_eq!(classify(&sig), Layout::PeakTable);
    }

    #[test]
    fn test_potency_detected_without_anchor() {
        let b = block(None, &["CBD 0.02 0.05 20.1 201", "CBN 0.02 0.05 ND ND"]);
        assert_eq!(detect(&b), Layout::PotencyTable);

        let single = block(None, &["(6aR,9R,10aR)-HHC 0.0067 0.02 13.0 130"]);
        assert_eq!(detect(&single), Layout::PotencyTable);
    }

    #[test]
    fn test_injection_block_detected() {
        let b = block(
            None,
            &[
                "Injection Name: HHC-0412",
                "Vial Number: RA3",
                "Injection Volume: 10.0",
                "Page 1 of 2",
            ],
        );
        assert_eq!(detect(&b), Layout::InjectionParameters);
    }

    #[test]
    fn test_single_value_compound_line_is_potency() {
        let b = block(None, &["CBG 1.25"]);
        let sig = signature(&b, &CompoundResolver::default());
        assert_eq!(sig.compound_value_lines, 1);
        assert_eq!(sig.value_lines, 0);
        assert_eq!(classify(&sig), Layout::PotencyTable);

        let label = block(None, &["CBD Content: 20.1"]);
        assert_eq!(detect(&label), Layout::InjectionParameters);
    }

    #[test]
    fn test_lone_key_value_line_is_injection() {
        let b = block(None, &["Sample: HHC Distillate"]);
        assert_eq!(detect(&b), Layout::InjectionParameters);
    }

    #[test]
    fn test_unclassified() {
        let b = block(None, &["KCA Laboratories", "Nicholasville, KY", "Page 1 of 2"]);
        assert_eq!(detect(&b), Layout::Unclassified);
    }

    #[test]
    fn test_priority_order_is_fixed() {
        let layouts: Vec<Layout> = LAYOUT_PRIORITY.iter().map(|(_, l)| *l).collect();
        assert_eq!(
            layouts,
            vec![
                Layout::ChromeleonRunTable,
                Layout::PeakTable,
                Layout::PotencyTable,
                Layout::InjectionParameters,
            ]
        );
    }
}
