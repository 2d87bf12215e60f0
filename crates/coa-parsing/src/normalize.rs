use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ParsingConfig;
use crate::resolve::is_values_only;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Opens a chromatogram block (Chromeleon "Integration Results"). PDF
/// extraction often glues the title onto the column header, so the title
/// may appear anywhere in the line.
static PEAK_TABLE_ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Integration Results|Resultados de (?:la )?integraci[oó]n").unwrap()
});

/// Opens a potency block.
static POTENCY_ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:Cannabinoids by\b|Cannabinoides por\b|Analyte\b.*\bLOD\b)").unwrap()
});

/// Ends the current table; the matching line starts a fresh unanchored block.
static SECTION_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:Heavy Metals|Pesticides by|Residual Solvents|Microbials|Mycotoxins|Foreign Matter|Summary)\b",
    )
    .unwrap()
});

/// Closes a chromatogram block after the line itself.
pub(crate) static TOTAL_ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Total:\s*(\d+(?:\.\d+)?)?").unwrap());

/// `Label: value`; the label starts with a letter and stays short.
pub(crate) static KEY_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\p{L}[^:]{0,39}):\s*(.*\S)$").unwrap());

/// Which anchor opened a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAnchor {
    PeakTable,
    PotencyTable,
}

/// A run of consecutive normalized lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub anchor: Option<BlockAnchor>,
    /// The anchor line itself, when the block was opened by one.
    pub header: Option<String>,
    pub lines: Vec<String>,
}

impl Block {
    fn opened_by(anchor: BlockAnchor, header: String) -> Self {
        Self {
            anchor: Some(anchor),
            header: Some(header),
            lines: Vec::new(),
        }
    }

    /// Input lines this block accounts for, header included.
    pub fn line_count(&self) -> usize {
        self.lines.len() + usize::from(self.header.is_some())
    }

    fn is_empty(&self) -> bool {
        self.header.is_none() && self.lines.is_empty()
    }
}

/// A `Label: value` instrument or sample parameter. `Total:` rows and
/// labels followed only by result values belong to their table instead.
pub(crate) fn is_key_value_line(line: &str) -> bool {
    let Some(value) = KEY_VALUE_RE.captures(line).and_then(|caps| caps.get(2)) else {
        return false;
    };
    !TOTAL_ROW_RE.is_match(line) && !is_values_only(value.as_str())
}

/// Replace the Greek/math delta variants PDF extraction produces with `Δ`.
pub fn normalize_delta(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'δ' | '∆' => 'Δ',
            other => other,
        })
        .collect()
}

/// Split raw text into trimmed, whitespace-collapsed, non-empty lines.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| normalize_delta(WHITESPACE_RE.replace_all(line, " ").trim()))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Group normalized lines into blocks using the default anchors.
pub fn segment(lines: Vec<String>) -> Vec<Block> {
    segment_with_config(lines, &ParsingConfig::default())
}

/// Group normalized lines into blocks at anchor lines.
///
/// An anchor line opens a new block and becomes its header. A repeat of the
/// same anchor right after the header (a column header that also matches)
/// stays in the block as an ordinary line. Section-end lines start a new
/// unanchored block, and a chromatogram block closes after its `Total:` row.
///
/// A run of consecutive `Label: value` lines always forms a block of its
/// own, wherever it appears. If the run interrupted a table, the lines after
/// it continue under the same anchor.
pub fn segment_with_config(lines: Vec<String>, config: &ParsingConfig) -> Vec<Block> {
    let peak_re = config
        .peak_table_anchor_re
        .as_ref()
        .unwrap_or(&PEAK_TABLE_ANCHOR_RE);
    let potency_re = config
        .potency_anchor_re
        .as_ref()
        .unwrap_or(&POTENCY_ANCHOR_RE);
    let end_re = config.section_end_re.as_ref().unwrap_or(&SECTION_END_RE);

    let mut blocks = Vec::new();
    let mut current = Block::default();
    let mut in_key_values = false;
    let mut resume: Option<BlockAnchor> = None;

    for line in lines {
        let anchor = if peak_re.is_match(&line) {
            Some(BlockAnchor::PeakTable)
        } else if potency_re.is_match(&line) {
            Some(BlockAnchor::PotencyTable)
        } else {
            None
        };

        if let Some(anchor) = anchor {
            if current.anchor == Some(anchor) && current.header.is_some() && current.lines.is_empty() {
                current.lines.push(line);
            } else {
                push_block(&mut blocks, std::mem::take(&mut current));
                current = Block::opened_by(anchor, line);
            }
            in_key_values = false;
            resume = None;
            continue;
        }

        if end_re.is_match(&line) {
            push_block(&mut blocks, std::mem::take(&mut current));
            current.lines.push(line);
            in_key_values = false;
            resume = None;
            continue;
        }

        if is_key_value_line(&line) {
            if !in_key_values {
                resume = current.anchor;
                push_block(&mut blocks, std::mem::take(&mut current));
                in_key_values = true;
            }
            current.lines.push(line);
            continue;
        }

        if in_key_values {
            push_block(&mut blocks, std::mem::take(&mut current));
            current.anchor = resume.take();
            in_key_values = false;
        }

        let closes = current.anchor == Some(BlockAnchor::PeakTable) && TOTAL_ROW_RE.is_match(&line);
        current.lines.push(line);
        if closes {
            push_block(&mut blocks, std::mem::take(&mut current));
        }
    }
    push_block(&mut blocks, current);

    tracing::debug!(blocks = blocks.len(), "segmented document");
    blocks
}

fn push_block(blocks: &mut Vec<Block>, block: Block) {
    if !block.is_empty() {
        blocks.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_collapses_and_drops_empty() {
        let text = "  CBD   6.075\t179.379  \r\n\n   \nδ9-THC  ND\n";
        assert_eq!(normalize_lines(text), vec!["CBD 6.075 179.379", "Δ9-THC ND"]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_lines("").is_empty());
        assert!(normalize_lines(" \n\t\n").is_empty());
    }

    #[test]
    fn test_segment_on_anchors() {
        let blocks = segment(lines(&[
            "Injection Name: HHC-0412",
            "Vial Number: RA3",
            "Integration Results",
            "No. Peak Name Retention Time Area Amount",
            "1 THCBV 5.937 0.359 158.6340",
            "Total: 199.214",
            "Chromeleon (c) Dionex Version 7.2",
        ]));
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].anchor, None);
        assert_eq!(blocks[0].lines.len(), 2);
        assert_eq!(blocks[1].anchor, Some(BlockAnchor::PeakTable));
        assert_eq!(blocks[1].header.as_deref(), Some("Integration Results"));
        assert_eq!(blocks[1].lines.len(), 3);
        assert_eq!(blocks[2].lines, vec!["Chromeleon (c) Dionex Version 7.2"]);
    }

    #[test]
    fn test_potency_column_header_stays_in_block() {
        let blocks = segment(lines(&[
            "Cannabinoids by HPLC-DAD",
            "Analyte LOD LOQ Result Result",
            "CBD 0.02 0.05 20.1 201",
            "Heavy Metals by ICP-MS",
            "Arsenic ND",
        ]));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].anchor, Some(BlockAnchor::PotencyTable));
        assert_eq!(blocks[0].lines.len(), 2);
        assert_eq!(blocks[1].anchor, None);
        assert_eq!(blocks[1].lines[0], "Heavy Metals by ICP-MS");
    }

    #[test]
    fn test_spanish_anchors() {
        let blocks = segment(lines(&[
            "Resultados de integración",
            "1 CBD 6.075 179.379 203209.7311",
            "Cannabinoides por HPLC",
            "CBD 0.02 0.05 20.1 201",
        ]));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].anchor, Some(BlockAnchor::PeakTable));
        assert_eq!(blocks[1].anchor, Some(BlockAnchor::PotencyTable));
    }

    #[test]
    fn test_key_value_run_without_anchor() {
        let blocks = segment(lines(&[
            "Injection Name: HHC-0412",
            "Vial Number: RA3",
            "CBD6.075179.3791437.27390.0689.42203209.7311",
            "CBG6.3925.37038.5522.702.406101.7138",
        ]));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lines, vec!["Injection Name: HHC-0412", "Vial Number: RA3"]);
        assert_eq!(blocks[1].anchor, None);
        assert_eq!(blocks[1].lines.len(), 2);
    }

    #[test]
    fn test_key_value_run_inside_table_resumes_anchor() {
        let blocks = segment(lines(&[
            "Integration Results",
            "1 THCBV 5.937 0.359 158.6340",
            "Channel: UV_VIS_1",
            "Wavelength: 228",
            "2 CBD 6.080 120.512 150230.1245",
            "Total: 120.871",
            "Page 2 of 2",
        ]));
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].lines, vec!["1 THCBV 5.937 0.359 158.6340"]);
        assert_eq!(blocks[1].anchor, None);
        assert_eq!(blocks[1].lines.len(), 2);
        assert_eq!(blocks[2].anchor, Some(BlockAnchor::PeakTable));
        assert_eq!(blocks[2].header, None);
        assert_eq!(blocks[2].lines.len(), 2);
        assert_eq!(blocks[3].lines, vec!["Page 2 of 2"]);
    }

    #[test]
    fn test_glued_peak_anchor() {
        let blocks = segment(lines(&[
            "Channel: UV_VIS_1",
            "Integration ResultsNo. Peak Name Retention Time Area Amount",
            "1 THCBV 5.937 0.359 158.6340",
        ]));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].anchor, Some(BlockAnchor::PeakTable));
        assert_eq!(blocks[1].lines, vec!["1 THCBV 5.937 0.359 158.6340"]);
    }

    #[test]
    fn test_key_value_line_excludes_table_rows() {
        assert!(is_key_value_line("Injection Date/Time: 12/Apr/2024 10:33"));
        assert!(is_key_value_line("Injection Volume: 10.00"));
        assert!(!is_key_value_line("Total: 199.169"));
        assert!(!is_key_value_line("Total THC: 0.21 2.1"));
        assert!(!is_key_value_line("CBD 0.02 0.05 20.1 201"));
    }

    #[test]
    fn test_line_count_includes_header() {
        let blocks = segment(lines(&["Integration Results", "a", "b"]));
        let total: usize = blocks.iter().map(Block::line_count).sum();
        assert_eq!(total, 3);
    }
}
