use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use coa_core::config_file::{self, ConfigFile};
use coa_core::{ExtractionResult, average_results, merge_document};
use coa_parsing::{CoaExtractor, ParsingConfig, ParsingConfigBuilder, extract_from_path};

mod output;

use output::ColorMode;

/// COA extractor - Pull potency, peak and injection data out of lab report text
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log pipeline decisions (block layouts, rejected lines) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one report and print the result as JSON
    Extract {
        /// Path to the text extracted from the report PDF
        text_file: PathBuf,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Re-extract a report and merge it into a stored document
    Merge {
        /// Path to the text extracted from the report PDF
        text_file: PathBuf,

        /// Existing document JSON to merge into
        #[arg(long)]
        into: PathBuf,

        /// Write the merged document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Extract several injections of one sample and average them
    Average {
        /// Paths to the report texts
        #[arg(required = true)]
        text_files: Vec<PathBuf>,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file_config = load_file_config()?;
    let extractor = CoaExtractor::with_config(build_parsing_config(&file_config)?);
    let output_config = file_config.output.unwrap_or_default();
    let pretty = output_config.pretty.unwrap_or(true);
    let color_allowed = output_config.color.unwrap_or(true);

    match cli.command {
        Command::Extract {
            text_file,
            output,
            compact,
            no_color,
        } => {
            let color = ColorMode(color_allowed && !no_color);
            let result = extract_file(&extractor, &text_file, color, cli.verbose)?;
            write_json(&result, output.as_deref(), pretty && !compact)
        }
        Command::Merge {
            text_file,
            into,
            output,
            no_color,
        } => {
            let color = ColorMode(color_allowed && !no_color);
            let result = extract_file(&extractor, &text_file, color, cli.verbose)?;
            let existing = std::fs::read_to_string(&into)
                .with_context(|| format!("failed to read {}", into.display()))?;
            let doc: serde_json::Value = serde_json::from_str(&existing)
                .with_context(|| format!("{} is not valid JSON", into.display()))?;
            let merged = merge_document(&doc, &result)
                .with_context(|| format!("cannot merge into {}", into.display()))?;
            write_json(&merged, output.as_deref(), pretty)
        }
        Command::Average {
            text_files,
            output,
            compact,
            no_color,
        } => {
            let color = ColorMode(color_allowed && !no_color);
            let results = text_files
                .iter()
                .map(|path| extract_file(&extractor, path, color, cli.verbose))
                .collect::<anyhow::Result<Vec<_>>>()?;
            tracing::debug!(files = results.len(), "averaging injections");
            let Some(averaged) =
                average_results(&results, extractor.config().thc_limit_percent())
            else {
                anyhow::bail!("no report texts given");
            };

            let mut stderr = std::io::stderr().lock();
            output::print_extraction_summary(
                &mut stderr,
                &format!("average of {} files", results.len()),
                &averaged,
                color,
            )?;
            write_json(&averaged, output.as_deref(), pretty && !compact)
        }
    }
}

/// Logs go to stderr so stdout stays clean JSON. `RUST_LOG` overrides the
/// default level unless `--verbose` asks for debug.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

/// `COA_CONFIG` names an explicit file (errors are fatal); otherwise the
/// platform and working-directory configs are cascaded.
fn load_file_config() -> anyhow::Result<ConfigFile> {
    match std::env::var_os("COA_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            config_file::load_strict(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Ok(config_file::load_config()),
    }
}

fn build_parsing_config(file: &ConfigFile) -> anyhow::Result<ParsingConfig> {
    let mut builder = ParsingConfigBuilder::new();

    if let Some(compounds) = &file.compounds {
        for name in compounds.extra_names.iter().flatten() {
            builder = builder.add_compound_name(name.clone());
        }
        for (label, canonical) in compounds.aliases.iter().flatten() {
            builder = builder.add_compound_alias(label.clone(), canonical.clone());
        }
        for word in compounds.name_digit_words.iter().flatten() {
            builder = builder.add_name_digit_exception(word, 1);
        }
    }

    if let Some(limits) = &file.limits {
        if let Some(max) = limits.percent_max {
            builder = builder.percent_max(max);
        }
        if let Some(max) = limits.mg_per_g_max {
            builder = builder.mg_per_g_max(max);
        }
        if let Some(limit) = limits.thc_limit_percent {
            builder = builder.thc_limit_percent(limit);
        }
        if let Some(widths) = &limits.height_decimals {
            builder = builder.height_decimal_candidates(widths.clone());
        }
    }

    builder.build().context("invalid extraction settings in config file")
}

fn extract_file(
    extractor: &CoaExtractor,
    path: &Path,
    color: ColorMode,
    verbose: bool,
) -> anyhow::Result<ExtractionResult> {
    let result = extract_from_path(path, extractor)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mut stderr = std::io::stderr().lock();
    output::print_extraction_summary(&mut stderr, &file_name, &result, color)?;
    if verbose {
        output::print_unresolved(&mut stderr, &result, color)?;
    }
    Ok(result)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    match output {
        Some(path) => std::fs::write(path, format!("{json}\n"))
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}
