use serde::{Deserialize, Serialize};

use crate::CannabinoidResult;

/// Mass ratio applied to acid forms (THCA) when summing total THC.
pub const THCA_DECARBOXYLATION_FACTOR: f64 = 0.877;

/// Default regulatory ceiling for total THC, in percent.
pub const DEFAULT_THC_LIMIT_PERCENT: f64 = 1.0;

/// Maximum |official - calculated| difference still reported as a match.
const VERIFICATION_TOLERANCE: f64 = 0.5;

/// How the lab's own total THC compares to the one summed from the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Match,
    Mismatch,
    #[default]
    NoOfficialTotal,
}

/// Total-THC figures for one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub calculated_total_thc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_total_thc: Option<f64>,
    pub final_total_thc: f64,
    pub verification: Verification,
    pub over_limit: bool,
}

/// Sum THC variants (acid forms scaled by [`THCA_DECARBOXYLATION_FACTOR`]) and
/// compare against any `Total … THC` row the lab printed.
///
/// Sentinel results contribute nothing. When several official totals are
/// present the last one wins.
pub fn summarize_compliance(
    cannabinoids: &[CannabinoidResult],
    thc_limit_percent: f64,
) -> ComplianceSummary {
    let mut calculated = 0.0;
    let mut official: Option<f64> = None;

    for c in cannabinoids {
        let value = c.percent().unwrap_or(0.0);
        let upper = c.compound_name.to_uppercase();

        if upper.starts_with("TOTAL") && upper.contains("THC") {
            official = Some(value);
            continue;
        }

        if is_thc_variant(&c.compound_name) {
            let factor = if upper.contains("THCA") {
                THCA_DECARBOXYLATION_FACTOR
            } else {
                1.0
            };
            calculated += value * factor;
            tracing::trace!(compound = %c.compound_name, value, factor, "thc contribution");
        }
    }

    let final_total = match official {
        Some(v) if v > 0.0 => v,
        _ => calculated,
    };

    let verification = match official {
        None => Verification::NoOfficialTotal,
        Some(v) if (v - calculated).abs() < VERIFICATION_TOLERANCE => Verification::Match,
        Some(_) => Verification::Mismatch,
    };

    ComplianceSummary {
        calculated_total_thc: calculated,
        official_total_thc: official,
        final_total_thc: final_total,
        verification,
        over_limit: final_total > thc_limit_percent,
    }
}

/// Δn-/Delta n/anything containing THC, excluding lab totals.
fn is_thc_variant(name: &str) -> bool {
    let upper = name.to_uppercase();
    if upper.starts_with("TOTAL") {
        return false;
    }
    upper.contains("THC") || starts_with_delta_number(name)
}

fn starts_with_delta_number(name: &str) -> bool {
    let rest = if let Some(rest) = name.strip_prefix('Δ') {
        rest
    } else if name.get(..5).is_some_and(|w| w.eq_ignore_ascii_case("delta")) {
        name[5..].trim_start()
    } else {
        return false;
    };
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
}
