use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod average;
pub mod compliance;
pub mod config_file;
pub mod merge;
pub mod safety;

// Re-export for convenience
pub use average::average_results;
pub use compliance::{ComplianceSummary, Verification, summarize_compliance};
pub use merge::{merge_document, merge_metadata};
pub use safety::{SafetyPanel, SafetyStatus};

/// A non-numeric placeholder a lab prints instead of a measured value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Sentinel {
    /// `ND`: not detected.
    NotDetected,
    /// `<LOQ`: below the limit of quantitation.
    BelowLoq,
    /// `<LOD`: below the limit of detection.
    BelowLod,
    /// Any other `<…` token, kept verbatim (e.g. `<0.05`).
    BelowLimit(String),
}

impl Sentinel {
    /// Classify a raw token. `ND` and anything starting with `<` are sentinels.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "ND" => Some(Sentinel::NotDetected),
            "<LOQ" => Some(Sentinel::BelowLoq),
            "<LOD" => Some(Sentinel::BelowLod),
            t if t.starts_with('<') => Some(Sentinel::BelowLimit(t.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Sentinel::NotDetected => "ND",
            Sentinel::BelowLoq => "<LOQ",
            Sentinel::BelowLod => "<LOD",
            Sentinel::BelowLimit(raw) => raw,
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Sentinel> for String {
    fn from(sentinel: Sentinel) -> Self {
        sentinel.as_str().to_string()
    }
}

impl TryFrom<String> for Sentinel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Sentinel::parse(&value).ok_or_else(|| format!("not a sentinel value: {value:?}"))
    }
}

/// A measured result: either a number or a sentinel, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Numeric(f64),
    Sentinel(Sentinel),
}

impl ResultValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResultValue::Numeric(v) => Some(*v),
            ResultValue::Sentinel(_) => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, ResultValue::Sentinel(_))
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Numeric(v) => write!(f, "{v}"),
            ResultValue::Sentinel(s) => write!(f, "{s}"),
        }
    }
}

/// One measured compound from a potency table or a quantified peak.
///
/// At least one of `result_percent` / `result_mg_per_g` is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannabinoidResult {
    /// Canonical name when `identified`, otherwise the label as printed.
    pub compound_name: String,
    /// Whether `compound_name` matched the canonical reference list.
    pub identified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_percent: Option<ResultValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_mg_per_g: Option<ResultValue>,
    /// Retention time in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    /// Share of the chromatogram's total area, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_pct: Option<f64>,
}

impl CannabinoidResult {
    /// Numeric percent, if the percent field holds a number.
    pub fn percent(&self) -> Option<f64> {
        self.result_percent.as_ref().and_then(ResultValue::as_f64)
    }

    /// Numeric mg/g, if the mg/g field holds a number.
    pub fn mg_per_g(&self) -> Option<f64> {
        self.result_mg_per_g.as_ref().and_then(ResultValue::as_f64)
    }

    /// A compound counts as detected when its percent is a positive number.
    pub fn is_detected(&self) -> bool {
        self.percent().is_some_and(|v| v > 0.0)
    }
}

/// Quantified amount column of a peak table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeakAmount {
    Ppm(f64),
    /// Printed as `n.a.`: integrated but not quantified.
    NotAvailable,
}

impl PeakAmount {
    pub fn ppm(&self) -> Option<f64> {
        match self {
            PeakAmount::Ppm(v) => Some(*v),
            PeakAmount::NotAvailable => None,
        }
    }
}

impl Serialize for PeakAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PeakAmount::Ppm(v) => serializer.serialize_f64(*v),
            PeakAmount::NotAvailable => serializer.serialize_str("n.a."),
        }
    }
}

impl<'de> Deserialize<'de> for PeakAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(PeakAmount::Ppm(v)),
            Raw::Text(t) if t.trim().eq_ignore_ascii_case("n.a.") => Ok(PeakAmount::NotAvailable),
            Raw::Text(t) => Err(de::Error::custom(format!("invalid peak amount: {t:?}"))),
        }
    }
}

/// One chromatographic peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Positive, unique within a report.
    pub peak_no: u32,
    /// Label as printed; may be empty for unidentified peaks.
    pub peak_name: String,
    /// Minutes.
    pub retention_time: f64,
    pub area: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_height: Option<f64>,
    pub amount_ppm: PeakAmount,
}

/// Instrument run parameters, values kept verbatim.
pub type InjectionDetails = BTreeMap<String, String>;

/// The `metadata` half of an extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub peaks: Vec<Peak>,
    pub injection_details: InjectionDetails,
    /// `"<reason>: <line>"` for every line that did not become a record.
    pub unresolved_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_area: Option<f64>,
    #[serde(default)]
    pub compliance: ComplianceSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub averaged_files: Option<usize>,
}

/// Line accounting for one extraction run.
///
/// For non-empty input `total_lines == structured_lines + unresolved_lines`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_lines: usize,
    pub structured_lines: usize,
    pub unresolved_lines: usize,
    pub blocks: usize,
    pub structured_blocks: usize,
}

/// Result of extracting one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The injection name, or a printed batch label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Injection date/time as printed, else the first date in the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_date: Option<String>,
    pub cannabinoids: Vec<CannabinoidResult>,
    #[serde(default)]
    pub safety: SafetyPanel,
    pub metadata: ExtractionMetadata,
    #[serde(default)]
    pub stats: ExtractionStats,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is not a JSON object")]
    NotAnObject(&'static str),
    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_parse_variants() {
        assert_eq!(Sentinel::parse("ND"), Some(Sentinel::NotDetected));
        assert_eq!(Sentinel::parse("<LOQ"), Some(Sentinel::BelowLoq));
        assert_eq!(Sentinel::parse(" <LOD "), Some(Sentinel::BelowLod));
        assert_eq!(
            Sentinel::parse("<0.05"),
            Some(Sentinel::BelowLimit("<0.05".to_string()))
        );
        assert_eq!(Sentinel::parse("0.05"), None);
        assert_eq!(Sentinel::parse("NDX"), None);
    }

    #[test]
    fn sentinel_parse_is_case_sensitive() {
        assert_eq!(Sentinel::parse("nd"), None);
        assert_eq!(Sentinel::parse("Nd"), None);
        // any `<` token is still a sentinel, only the named ones are special
        assert_eq!(
            Sentinel::parse("<lod"),
            Some(Sentinel::BelowLimit("<lod".to_string()))
        );
    }

    #[test]
    fn result_value_serializes_as_number_or_text() {
        let numeric = serde_json::to_value(ResultValue::Numeric(13.0)).unwrap();
        assert_eq!(numeric, serde_json::json!(13.0));

        let sentinel = serde_json::to_value(ResultValue::Sentinel(Sentinel::BelowLoq)).unwrap();
        assert_eq!(sentinel, serde_json::json!("<LOQ"));

        let back: ResultValue = serde_json::from_value(serde_json::json!("ND")).unwrap();
        assert_eq!(back, ResultValue::Sentinel(Sentinel::NotDetected));
    }

    #[test]
    fn peak_amount_na_serializes_as_text() {
        let v = serde_json::to_value(PeakAmount::NotAvailable).unwrap();
        assert_eq!(v, serde_json::json!("n.a."));
        let back: PeakAmount = serde_json::from_value(serde_json::json!("N.A.")).unwrap();
        assert_eq!(back, PeakAmount::NotAvailable);
        let ppm: PeakAmount = serde_json::from_value(serde_json::json!(158.634)).unwrap();
        assert_eq!(ppm, PeakAmount::Ppm(158.634));
        assert!(serde_json::from_value::<PeakAmount>(serde_json::json!("lots")).is_err());
    }

    #[test]
    fn detected_requires_positive_numeric_percent() {
        let mut c = CannabinoidResult {
            compound_name: "CBD".to_string(),
            identified: true,
            result_percent: Some(ResultValue::Numeric(0.0)),
            result_mg_per_g: None,
            retention_time: None,
            area: None,
            area_pct: None,
        };
        assert!(!c.is_detected());
        c.result_percent = Some(ResultValue::Numeric(1.2));
        assert!(c.is_detected());
        c.result_percent = Some(ResultValue::Sentinel(Sentinel::NotDetected));
        assert!(!c.is_detected());
    }
}
