use std::io::Write;

use coa_core::{ExtractionResult, SafetyStatus, Verification};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the per-document summary after extraction.
pub fn print_extraction_summary(
    w: &mut dyn Write,
    file_name: &str,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    let stats = &result.stats;
    writeln!(w, "Extracted {}", file_name)?;
    writeln!(
        w,
        "  {} cannabinoids, {} peaks, {} injection details",
        result.cannabinoids.len(),
        result.metadata.peaks.len(),
        result.metadata.injection_details.len()
    )?;
    writeln!(
        w,
        "  {}/{} lines structured across {} of {} blocks",
        stats.structured_lines, stats.total_lines, stats.structured_blocks, stats.blocks
    )?;

    let unresolved = result.metadata.unresolved_lines.len();
    if unresolved > 0 {
        let msg = format!("  {} unresolved lines", unresolved);
        if color.enabled() {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }

    print_compliance(w, result, color)?;
    print_failed_panels(w, result, color)
}

fn print_failed_panels(
    w: &mut dyn Write,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    let safety = &result.safety;
    let failed: Vec<&str> = [
        ("heavy metals", safety.heavy_metals),
        ("pesticides", safety.pesticides),
        ("residual solvents", safety.residual_solvents),
        ("foreign matter", safety.foreign_matter),
    ]
    .into_iter()
    .filter(|(_, status)| *status == SafetyStatus::Fail)
    .map(|(name, _)| name)
    .collect();
    if failed.is_empty() {
        return Ok(());
    }

    let msg = format!("  Failed: {}", failed.join(", "));
    if color.enabled() {
        writeln!(w, "{}", msg.red())
    } else {
        writeln!(w, "{}", msg)
    }
}

fn print_compliance(
    w: &mut dyn Write,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    let compliance = &result.metadata.compliance;
    let verification = match compliance.verification {
        Verification::Match => "matches lab total",
        Verification::Mismatch => "differs from lab total",
        Verification::NoOfficialTotal => "no lab total",
    };
    let line = format!(
        "  Total THC {:.4}% ({})",
        compliance.final_total_thc, verification
    );

    if !color.enabled() {
        let flag = if compliance.over_limit {
            "OVER LIMIT"
        } else {
            "within limit"
        };
        return writeln!(w, "{} {}", line, flag);
    }

    if compliance.over_limit {
        writeln!(w, "{} {}", line, "OVER LIMIT".red().bold())
    } else {
        writeln!(w, "{} {}", line, "within limit".green())
    }
}

/// Print every unresolved line, one per row.
pub fn print_unresolved(
    w: &mut dyn Write,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    for line in &result.metadata.unresolved_lines {
        if color.enabled() {
            writeln!(w, "    {}", line.dimmed())?;
        } else {
            writeln!(w, "    {}", line)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_without_color() {
        let mut result = ExtractionResult::default();
        result
            .metadata
            .unresolved_lines
            .push("column header: Analyte LOD LOQ".to_string());
        result.metadata.compliance.final_total_thc = 1.5;
        result.metadata.compliance.over_limit = true;

        let mut buf = Vec::new();
        print_extraction_summary(&mut buf, "coa.txt", &result, ColorMode(false)).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("Extracted coa.txt\n"));
        assert!(text.contains("1 unresolved lines"));
        assert!(text.contains("Total THC 1.5000% (no lab total) OVER LIMIT"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn test_summary_lists_failed_panels() {
        let mut result = ExtractionResult::default();
        result.safety.pesticides = SafetyStatus::Fail;
        result.safety.heavy_metals = SafetyStatus::Pass;

        let mut buf = Vec::new();
        print_extraction_summary(&mut buf, "coa.txt", &result, ColorMode(false)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("  Failed: pesticides\n"));
    }
}
