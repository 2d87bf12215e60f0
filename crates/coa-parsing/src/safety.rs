//! Pass/fail status of the non-potency panels (heavy metals, pesticides and
//! the like). These sections are scanned as free text: labs print them as
//! a one-line verdict, a results table, or only the method title.

use once_cell::sync::Lazy;
use regex::Regex;

use coa_core::{SafetyPanel, SafetyStatus};

struct PanelRule {
    failed: Regex,
    passed: Regex,
    /// The method title, plus a line naming an analyte when the title
    /// alone is also used for untested placeholders.
    method: Option<(Regex, Option<Regex>)>,
}

impl PanelRule {
    fn new(panel: &str, method: Option<(&str, Option<&str>)>) -> Self {
        Self {
            failed: Regex::new(&format!(r"(?i){panel}[^\n]*?\bFail(?:ed|s)?\b")).unwrap(),
            passed: Regex::new(&format!(
                r"(?i){panel}[^\n]*?\b(?:Pass(?:ed|es)?|Tested)\b|{panel}[\s\S]{{0,100}}?\bPassed\b"
            ))
            .unwrap(),
            method: method.map(|(title, analytes)| {
                (
                    Regex::new(&format!("(?i){title}")).unwrap(),
                    analytes.map(|a| Regex::new(&format!(r"(?i)\b(?:{a})\b")).unwrap()),
                )
            }),
        }
    }

    fn status(&self, text: &str) -> SafetyStatus {
        if self.failed.is_match(text) {
            return SafetyStatus::Fail;
        }
        let by_method = self.method.as_ref().is_some_and(|(title, analytes)| {
            title.is_match(text) && analytes.as_ref().is_none_or(|a| a.is_match(text))
        });
        if by_method || self.passed.is_match(text) {
            SafetyStatus::Pass
        } else {
            SafetyStatus::NotTested
        }
    }
}

static HEAVY_METALS: Lazy<PanelRule> = Lazy::new(|| {
    PanelRule::new(
        "Heavy Metals",
        Some(("Heavy Metals by ICP-MS", Some("Arsenic|Cadmium|Lead|Mercury"))),
    )
});

static PESTICIDES: Lazy<PanelRule> =
    Lazy::new(|| PanelRule::new("Pesticides", Some((r"Pesticides by LC-MS/MS", None))));

static RESIDUAL_SOLVENTS: Lazy<PanelRule> = Lazy::new(|| {
    PanelRule::new("Residual Solvents", Some((r"Residual Solvents by HS-GC-MS", None)))
});

static FOREIGN_MATTER: Lazy<PanelRule> = Lazy::new(|| PanelRule::new("Foreign Matter", None));

/// Status of each safety panel in a normalized document. A failure stated
/// anywhere for a panel outranks a pass.
pub fn detect_safety(lines: &[String]) -> SafetyPanel {
    let text = lines.join("\n");
    let panel = SafetyPanel {
        heavy_metals: HEAVY_METALS.status(&text),
        pesticides: PESTICIDES.status(&text),
        residual_solvents: RESIDUAL_SOLVENTS.status(&text),
        foreign_matter: FOREIGN_MATTER.status(&text),
    };
    tracing::debug!(?panel, "safety panels");
    panel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(lines: &[&str]) -> SafetyPanel {
        detect_safety(&lines.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_nothing_reported() {
        assert_eq!(detect(&["CBD 0.02 0.05 20.1 201"]), SafetyPanel::default());
    }

    #[test]
    fn test_method_title_with_analytes() {
        let panel = detect(&["Heavy Metals by ICP-MS", "Arsenic ND 0.2"]);
        assert_eq!(panel.heavy_metals, SafetyStatus::Pass);

        // title without any analyte line is a placeholder
        let placeholder = detect(&["Heavy Metals by ICP-MS", "Not requested"]);
        assert_eq!(placeholder.heavy_metals, SafetyStatus::NotTested);
    }

    #[test]
    fn test_verdict_lines() {
        let panel = detect(&[
            "Pesticides Passed",
            "Residual Solvents by HS-GC-MS",
            "Foreign Matter Tested",
            "Heavy Metals Failed",
        ]);
        assert_eq!(panel.pesticides, SafetyStatus::Pass);
        assert_eq!(panel.residual_solvents, SafetyStatus::Pass);
        assert_eq!(panel.foreign_matter, SafetyStatus::Pass);
        assert_eq!(panel.heavy_metals, SafetyStatus::Fail);
    }

    #[test]
    fn test_fail_outranks_pass() {
        let panel = detect(&["Pesticides by LC-MS/MS", "Pesticides Fail"]);
        assert_eq!(panel.pesticides, SafetyStatus::Fail);
    }

    #[test]
    fn test_passed_on_following_line() {
        let panel = detect(&["Foreign Matter", "Passed"]);
        assert_eq!(panel.foreign_matter, SafetyStatus::Pass);
    }
}
