use coa_core::{ResultValue, Sentinel};

use crate::LineError;
use crate::config::ParsingConfig;

/// Which half of a result pair a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueField {
    Percent,
    MgPerG,
}

impl ValueField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueField::Percent => "percent",
            ValueField::MgPerG => "mg/g",
        }
    }
}

/// Checks resolved `%` / `mg/g` pairs. A pair is accepted or rejected as a
/// unit: one bad half usually means the columns were swapped or the row is
/// not a result at all.
#[derive(Debug, Clone, Copy)]
pub struct ValueValidator {
    percent_range: (f64, f64),
    mg_per_g_range: (f64, f64),
}

impl Default for ValueValidator {
    fn default() -> Self {
        Self::from_config(&ParsingConfig::default())
    }
}

impl ValueValidator {
    pub fn from_config(config: &ParsingConfig) -> Self {
        Self {
            percent_range: config.percent_range,
            mg_per_g_range: config.mg_per_g_range,
        }
    }

    /// Classify one token. Sentinels are valid whatever the range.
    pub fn classify(&self, token: &str, field: ValueField) -> Result<ResultValue, LineError> {
        if let Some(sentinel) = Sentinel::parse(token) {
            return Ok(ResultValue::Sentinel(sentinel));
        }
        let value = match token.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(LineError::UnparseableField {
                    field: field.as_str(),
                    text: token.to_string(),
                });
            }
        };
        self.check(value, field).map(ResultValue::Numeric)
    }

    fn check(&self, value: f64, field: ValueField) -> Result<f64, LineError> {
        let (min, max) = match field {
            ValueField::Percent => self.percent_range,
            ValueField::MgPerG => self.mg_per_g_range,
        };
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(LineError::RangeViolation {
                field: field.as_str(),
                value,
                min,
                max,
            })
        }
    }

    /// Validate a `(percent, mg/g)` token pair from a potency row.
    pub fn validate_pair(
        &self,
        percent_token: &str,
        mg_per_g_token: &str,
    ) -> Result<(ResultValue, ResultValue), LineError> {
        let percent = self.classify(percent_token, ValueField::Percent)?;
        let mg_per_g = self.classify(mg_per_g_token, ValueField::MgPerG)?;
        Ok((percent, mg_per_g))
    }

    /// Validate a numeric pair derived from a chromatogram amount.
    pub fn validate_numeric_pair(&self, percent: f64, mg_per_g: f64) -> Result<(f64, f64), LineError> {
        Ok((
            self.check(percent, ValueField::Percent)?,
            self.check(mg_per_g, ValueField::MgPerG)?,
        ))
    }
}
