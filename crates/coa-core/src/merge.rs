use serde_json::{Map, Value};

use crate::{CoreError, ExtractionResult};

/// Merge an extraction into previously stored document metadata.
///
/// Keys this run produced override the stored ones. Every other key keeps
/// its existing value, including extractor keys this run left out (a stored
/// `total_area` survives a run that found no peaks). A `null` existing value
/// is treated as an empty object.
pub fn merge_metadata(existing: &Value, result: &ExtractionResult) -> Result<Value, CoreError> {
    let mut merged = as_object(existing, "document metadata")?;

    let Value::Object(produced) = serde_json::to_value(&result.metadata)? else {
        return Err(CoreError::NotAnObject("extraction metadata"));
    };
    merged.extend(produced);

    Ok(Value::Object(merged))
}

/// Merge an extraction into a whole stored document: `cannabinoids` and
/// `safety` are replaced, `batch_id` and `analysis_date` are set when this
/// run found them, and `metadata` goes through [`merge_metadata`]. Other
/// top-level fields are left alone.
pub fn merge_document(existing: &Value, result: &ExtractionResult) -> Result<Value, CoreError> {
    let mut doc = as_object(existing, "document")?;

    let metadata = merge_metadata(doc.get("metadata").unwrap_or(&Value::Null), result)?;
    doc.insert(
        "cannabinoids".to_string(),
        serde_json::to_value(&result.cannabinoids)?,
    );
    doc.insert("safety".to_string(), serde_json::to_value(result.safety)?);
    if let Some(batch_id) = &result.batch_id {
        doc.insert("batch_id".to_string(), Value::String(batch_id.clone()));
    }
    if let Some(date) = &result.analysis_date {
        doc.insert("analysis_date".to_string(), Value::String(date.clone()));
    }
    doc.insert("metadata".to_string(), metadata);

    Ok(Value::Object(doc))
}

fn as_object(value: &Value, what: &'static str) -> Result<Map<String, Value>, CoreError> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        _ => Err(CoreError::NotAnObject(what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CannabinoidResult, ExtractionMetadata, ResultValue};
    use serde_json::json;

    fn sample_result() -> ExtractionResult {
        let mut metadata = ExtractionMetadata::default();
        metadata
            .injection_details
            .insert("injection_name".to_string(), "HHC-0412".to_string());
        ExtractionResult {
            cannabinoids: vec![CannabinoidResult {
                compound_name: "CBD".to_string(),
                identified: true,
                result_percent: Some(ResultValue::Numeric(20.3)),
                result_mg_per_g: Some(ResultValue::Numeric(203.2)),
                retention_time: None,
                area: None,
                area_pct: None,
            }],
            metadata,
            ..Default::default()
        }
    }

    #[test]
    fn test_unrelated_keys_preserved() {
        let existing = json!({
            "file_urls": ["https://files.example/coa-1.pdf"],
            "original_filenames": ["coa-1.pdf"],
            "peaks": [{"stale": true}],
        });
        let merged = merge_metadata(&existing, &sample_result()).unwrap();

        assert_eq!(merged["file_urls"], existing["file_urls"]);
        assert_eq!(merged["original_filenames"], existing["original_filenames"]);
        assert_eq!(merged["peaks"], json!([]));
        assert_eq!(merged["injection_details"]["injection_name"], "HHC-0412");
    }

    #[test]
    fn test_absent_produced_keys_keep_prior_value() {
        let existing = json!({ "total_area": 12.5, "averaged_files": 3, "notes": "keep" });
        let merged = merge_metadata(&existing, &sample_result()).unwrap();
        assert_eq!(merged["total_area"], 12.5);
        assert_eq!(merged["averaged_files"], 3);
        assert_eq!(merged["notes"], "keep");
    }

    #[test]
    fn test_null_metadata_is_empty_object() {
        let merged = merge_metadata(&Value::Null, &sample_result()).unwrap();
        assert!(merged.is_object());
        assert!(merged.get("compliance").is_some());
    }

    #[test]
    fn test_non_object_metadata_rejected() {
        let err = merge_metadata(&json!([1, 2]), &sample_result()).unwrap_err();
        assert!(matches!(err, CoreError::NotAnObject(_)));
    }

    #[test]
    fn test_merge_document_replaces_cannabinoids() {
        let existing = json!({
            "id": 42,
            "cannabinoids": [{"compound_name": "old"}],
            "metadata": {"file_urls": ["a.pdf"]},
        });
        let merged = merge_document(&existing, &sample_result()).unwrap();
        assert_eq!(merged["id"], 42);
        assert_eq!(merged["cannabinoids"][0]["compound_name"], "CBD");
        assert_eq!(merged["metadata"]["file_urls"], json!(["a.pdf"]));
        assert_eq!(merged["safety"]["heavy_metals"], "not_tested");
        assert!(merged.get("batch_id").is_none());
    }

    #[test]
    fn test_merge_document_sets_batch_and_date() {
        let mut result = sample_result();
        result.batch_id = Some("HHC-0412".to_string());
        result.analysis_date = Some("12/Apr/2024 10:33".to_string());
        let existing = json!({ "batch_id": "old", "lab_name": "KCA Laboratories" });

        let merged = merge_document(&existing, &result).unwrap();
        assert_eq!(merged["batch_id"], "HHC-0412");
        assert_eq!(merged["analysis_date"], "12/Apr/2024 10:33");
        assert_eq!(merged["lab_name"], "KCA Laboratories");
    }
}
