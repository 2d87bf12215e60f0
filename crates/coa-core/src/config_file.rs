use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub compounds: Option<CompoundsConfig>,
    pub limits: Option<LimitsConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompoundsConfig {
    /// Canonical names appended to the built-in reference list.
    pub extra_names: Option<Vec<String>>,
    /// Printed label -> canonical name, appended to the built-in aliases.
    pub aliases: Option<BTreeMap<String, String>>,
    /// Extra words whose single following digit belongs to the name
    /// (the built-in table holds `Delta`).
    pub name_digit_words: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub percent_max: Option<f64>,
    pub mg_per_g_max: Option<f64>,
    pub thc_limit_percent: Option<f64>,
    /// Decimal widths tried, in order, for the Height column.
    pub height_decimals: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub pretty: Option<bool>,
    pub color: Option<bool>,
}

/// Platform config directory path: `<config_dir>/coa/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("coa").join("config.toml"))
}

/// Load config by cascading CWD `.coa.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".coa.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    match load_strict(path) {
        Ok(config) => Some(config),
        Err(CoreError::Io(_)) => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Load a config the user named explicitly; read and parse errors are returned.
pub fn load_strict(path: &Path) -> Result<ConfigFile, CoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_compounds = base.compounds.unwrap_or_default();
    let overlay_compounds = overlay.compounds.unwrap_or_default();
    let base_limits = base.limits.unwrap_or_default();
    let overlay_limits = overlay.limits.unwrap_or_default();
    let base_output = base.output.unwrap_or_default();
    let overlay_output = overlay.output.unwrap_or_default();

    ConfigFile {
        compounds: Some(CompoundsConfig {
            extra_names: overlay_compounds.extra_names.or(base_compounds.extra_names),
            aliases: overlay_compounds.aliases.or(base_compounds.aliases),
            name_digit_words: overlay_compounds
                .name_digit_words
                .or(base_compounds.name_digit_words),
        }),
        limits: Some(LimitsConfig {
            percent_max: overlay_limits.percent_max.or(base_limits.percent_max),
            mg_per_g_max: overlay_limits.mg_per_g_max.or(base_limits.mg_per_g_max),
            thc_limit_percent: overlay_limits
                .thc_limit_percent
                .or(base_limits.thc_limit_percent),
            height_decimals: overlay_limits.height_decimals.or(base_limits.height_decimals),
        }),
        output: Some(OutputConfig {
            pretty: overlay_output.pretty.or(base_output.pretty),
            color: overlay_output.color.or(base_output.color),
        }),
    }
}
