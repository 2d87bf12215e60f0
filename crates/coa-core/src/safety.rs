use serde::{Deserialize, Serialize};

/// Outcome of one safety panel as the report states it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStatus {
    Pass,
    Fail,
    #[default]
    NotTested,
}

impl SafetyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyStatus::Pass => "pass",
            SafetyStatus::Fail => "fail",
            SafetyStatus::NotTested => "not_tested",
        }
    }
}

/// Non-potency panels a report may include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyPanel {
    #[serde(default)]
    pub heavy_metals: SafetyStatus,
    #[serde(default)]
    pub pesticides: SafetyStatus,
    #[serde(default)]
    pub residual_solvents: SafetyStatus,
    #[serde(default)]
    pub foreign_matter: SafetyStatus,
}

impl SafetyPanel {
    /// Combine panels of several injections of one sample: a failure in any
    /// input fails the panel, otherwise the first input's status stands.
    pub fn combine<'a>(panels: impl IntoIterator<Item = &'a SafetyPanel>) -> SafetyPanel {
        let mut panels = panels.into_iter();
        let Some(first) = panels.next() else {
            return SafetyPanel::default();
        };
        panels.fold(*first, |acc, p| SafetyPanel {
            heavy_metals: worst(acc.heavy_metals, p.heavy_metals),
            pesticides: worst(acc.pesticides, p.pesticides),
            residual_solvents: worst(acc.residual_solvents, p.residual_solvents),
            foreign_matter: worst(acc.foreign_matter, p.foreign_matter),
        })
    }
}

fn worst(acc: SafetyStatus, next: SafetyStatus) -> SafetyStatus {
    if next == SafetyStatus::Fail {
        SafetyStatus::Fail
    } else {
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let v = serde_json::to_value(SafetyStatus::NotTested).unwrap();
        assert_eq!(v, serde_json::json!("not_tested"));
        assert_eq!(SafetyStatus::Pass.as_str(), "pass");
    }

    #[test]
    fn combine_fail_wins_else_first() {
        let first = SafetyPanel {
            heavy_metals: SafetyStatus::Pass,
            pesticides: SafetyStatus::NotTested,
            ..Default::default()
        };
        let second = SafetyPanel {
            heavy_metals: SafetyStatus::Fail,
            pesticides: SafetyStatus::Pass,
            ..Default::default()
        };
        let combined = SafetyPanel::combine([&first, &second]);
        assert_eq!(combined.heavy_metals, SafetyStatus::Fail);
        assert_eq!(combined.pesticides, SafetyStatus::NotTested);
        assert_eq!(SafetyPanel::combine([]), SafetyPanel::default());
    }
}
