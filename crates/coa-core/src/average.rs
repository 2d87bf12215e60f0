use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::compliance::summarize_compliance;
use crate::{CannabinoidResult, ExtractionMetadata, ExtractionResult, ResultValue, SafetyPanel};

#[derive(Default)]
struct Accumulator {
    identified: bool,
    sum_percent: f64,
    sum_mg_per_g: f64,
    detected: bool,
}

/// Average several injections of the same sample into one result.
///
/// Percent and mg/g are summed per compound and divided by the number of
/// inputs (not by the number of detections); sentinels count as zero. Only
/// compounds detected in at least one input are kept, ordered by averaged
/// percent descending. Injection details, peaks, batch and date come from the
/// first input; a safety panel failed by any input is failed.
///
/// Returns `None` for an empty slice; a single input is returned unchanged.
pub fn average_results(
    results: &[ExtractionResult],
    thc_limit_percent: f64,
) -> Option<ExtractionResult> {
    let first = results.first()?;
    if results.len() == 1 {
        return Some(first.clone());
    }

    let n = results.len() as f64;
    let mut order: Vec<String> = Vec::new();
    let mut totals: BTreeMap<String, Accumulator> = BTreeMap::new();

    for result in results {
        for c in &result.cannabinoids {
            let acc = totals.entry(c.compound_name.clone()).or_insert_with(|| {
                order.push(c.compound_name.clone());
                Accumulator::default()
            });
            acc.identified |= c.identified;
            acc.sum_percent += c.percent().unwrap_or(0.0);
            acc.sum_mg_per_g += c.mg_per_g().unwrap_or(0.0);
            acc.detected |= c.is_detected();
        }
    }

    let mut cannabinoids: Vec<CannabinoidResult> = order
        .into_iter()
        .filter_map(|name| {
            let acc = totals.get(&name)?;
            acc.detected.then(|| CannabinoidResult {
                compound_name: name.clone(),
                identified: acc.identified,
                result_percent: Some(ResultValue::Numeric(acc.sum_percent / n)),
                result_mg_per_g: Some(ResultValue::Numeric(acc.sum_mg_per_g / n)),
                retention_time: None,
                area: None,
                area_pct: None,
            })
        })
        .collect();

    cannabinoids.sort_by(|a, b| {
        let pa = a.percent().unwrap_or(0.0);
        let pb = b.percent().unwrap_or(0.0);
        pb.partial_cmp(&pa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.compound_name.cmp(&b.compound_name))
    });

    let mut stats = first.stats;
    for r in &results[1..] {
        stats.total_lines += r.stats.total_lines;
        stats.structured_lines += r.stats.structured_lines;
        stats.unresolved_lines += r.stats.unresolved_lines;
        stats.blocks += r.stats.blocks;
        stats.structured_blocks += r.stats.structured_blocks;
    }

    let compliance = summarize_compliance(&cannabinoids, thc_limit_percent);
    tracing::debug!(
        files = results.len(),
        compounds = cannabinoids.len(),
        "averaged extraction results"
    );

    Some(ExtractionResult {
        batch_id: first.batch_id.clone(),
        analysis_date: first.analysis_date.clone(),
        cannabinoids,
        safety: SafetyPanel::combine(results.iter().map(|r| &r.safety)),
        metadata: ExtractionMetadata {
            peaks: first.metadata.peaks.clone(),
            injection_details: first.metadata.injection_details.clone(),
            unresolved_lines: results
                .iter()
                .flat_map(|r| r.metadata.unresolved_lines.iter().cloned())
                .collect(),
            total_area: None,
            compliance,
            averaged_files: Some(results.len()),
        },
        stats,
    })
}
