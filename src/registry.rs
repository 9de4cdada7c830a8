use camino::Utf8Path;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::client::ApiClient;
use crate::domain::REGISTRY_PATH;
use crate::error::FetchError;
use crate::provenance::{self, RunParams};
use crate::{fs_util, gzip};

const ID_KEYS: [&str; 3] = ["dataset_id", "datasetId", "id"];
const NAME_KEYS: [&str; 5] = ["dataset_name", "datasetName", "name", "title", "description"];
const WRAPPER_KEYS: [&str; 2] = ["datasets", "results"];

/// The decoded dataset registry, one JSON value per dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Registry {
    records: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub dataset_id: String,
    pub name: String,
}

impl Registry {
    pub fn from_records(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Decodes a registry body: gzip or plain, JSON document or NDJSON.
    pub fn from_bytes(bytes: &[u8], source: &str) -> Result<Self, FetchError> {
        let raw = gzip::decompress(bytes, source)?;
        let text = String::from_utf8(raw).map_err(|err| FetchError::DecodeError {
            url: source.to_string(),
            message: format!("registry is not valid UTF-8: {err}"),
        })?;
        Self::parse_text(&text, source)
    }

    pub fn parse_text(text: &str, source: &str) -> Result<Self, FetchError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(document) = serde_json::from_str::<Value>(text) {
            return match document {
                Value::Array(records) => Ok(Self { records }),
                Value::Object(object) => Ok(Self {
                    records: unwrap_object(object),
                }),
                other => Err(FetchError::DecodeError {
                    url: source.to_string(),
                    message: format!("expected a JSON array or object, got {other}"),
                }),
            };
        }

        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value = serde_json::from_str::<Value>(line).map_err(|err| {
                FetchError::DecodeError {
                    url: source.to_string(),
                    message: format!("invalid JSON on line {}: {err}", idx + 1),
                }
            })?;
            records.push(value);
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn normalized(&self) -> Vec<Value> {
        self.records.iter().map(normalize_dataset_record).collect()
    }

    pub fn summaries(&self) -> Vec<DatasetSummary> {
        self.records
            .iter()
            .filter_map(Value::as_object)
            .map(|record| DatasetSummary {
                dataset_id: first_text(record, &ID_KEYS),
                name: first_text(record, &NAME_KEYS),
            })
            .collect()
    }
}

fn unwrap_object(mut object: Map<String, Value>) -> Vec<Value> {
    for key in WRAPPER_KEYS {
        if matches!(object.get(key), Some(Value::Array(_))) {
            if let Some(Value::Array(records)) = object.remove(key) {
                return records;
            }
        }
    }
    vec![Value::Object(object)]
}

fn first_text(record: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .filter_map(|value| match value {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// Adds canonical `dataset_id` and `dataset_name` keys to a registry record,
/// keeping the original keys. Non-object values are returned unchanged.
pub fn normalize_dataset_record(record: &Value) -> Value {
    let Some(object) = record.as_object() else {
        return record.clone();
    };
    let mut normalized = object.clone();
    normalized.insert(
        "dataset_id".to_string(),
        Value::String(first_text(object, &ID_KEYS)),
    );
    normalized.insert(
        "dataset_name".to_string(),
        Value::String(first_text(object, &NAME_KEYS)),
    );
    Value::Object(normalized)
}

/// Downloads the registry to `output_path` and records a `run_params.json`
/// next to it.
pub fn download_dataset_registry<C: ApiClient + ?Sized>(
    output_path: &Utf8Path,
    overwrite: bool,
    client: &C,
) -> Result<Registry, FetchError> {
    fs_util::ensure_absent(output_path, overwrite)?;

    let url = client.url(REGISTRY_PATH);
    let body = client.get(REGISTRY_PATH, &[])?;
    let registry = Registry::from_bytes(&body, &url)?;

    fs_util::write_bytes_atomic(output_path, &body)?;
    info!(path = %output_path, bytes = body.len(), "saved dataset registry");

    let params = RunParams::new("list-datasets", output_path, client.config())
        .overwrite(overwrite)
        .endpoint(url);
    provenance::write_run_params(&fs_util::parent_dir(output_path), &params)?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_json_array() {
        let registry = Registry::parse_text(
            r#"[{"datasetId": "heart", "datasetName": "Heart tissue"}, {"datasetId": "lung"}]"#,
            "mem",
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.records()[1]["datasetId"], "lung");
    }

    #[test]
    fn parse_single_object_and_wrappers() {
        let single = Registry::parse_text(r#"{"datasetId": "heart"}"#, "mem").unwrap();
        assert_eq!(single.len(), 1);

        let wrapped =
            Registry::parse_text(r#"{"datasets": [{"id": "a"}, {"id": "b"}]}"#, "mem").unwrap();
        assert_eq!(wrapped.len(), 2);

        let results =
            Registry::parse_text(r#"{"results": [{"id": "a"}], "count": 1}"#, "mem").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn parse_ndjson_with_blank_lines_and_bom() {
        let text = "\u{feff}{\"datasetId\": \"heart\"}\n\n{\"datasetId\": \"lung\"}\n\n\n{\"datasetId\": \"brain\"}\n";
        let registry = Registry::parse_text(text, "mem").unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.records()[2]["datasetId"], "brain");
    }

    #[test]
    fn bad_ndjson_line_names_the_line() {
        let text = "{\"datasetId\": \"heart\"}\n{\"datasetId\": \"lung\", invalid json here\n";
        let err = Registry::parse_text(text, "mem").unwrap_err();
        assert_matches!(err, FetchError::DecodeError { ref message, .. } if message.contains("line 2"));
    }

    #[test]
    fn empty_text_is_empty_registry() {
        assert!(Registry::parse_text("  \n", "mem").unwrap().is_empty());
    }

    #[test]
    fn scalar_document_is_decode_error() {
        let err = Registry::parse_text("42", "mem").unwrap_err();
        assert_eq!(err.kind(), "decode-error");
    }

    #[test]
    fn normalize_priority_and_trimming() {
        let record = json!({
            "dataset_id": "correct_id",
            "datasetId": "wrong_id",
            "id": "also_wrong",
            "dataset_name": "correct_name",
            "title": "wrong_title",
        });
        let normalized = normalize_dataset_record(&record);
        assert_eq!(normalized["dataset_id"], "correct_id");
        assert_eq!(normalized["dataset_name"], "correct_name");

        let normalized =
            normalize_dataset_record(&json!({"datasetId": "  heart  ", "datasetName": " Heart tissue\n"}));
        assert_eq!(normalized["dataset_id"], "heart");
        assert_eq!(normalized["dataset_name"], "Heart tissue");
        assert_eq!(normalized["datasetId"], "  heart  ");
    }

    #[test]
    fn normalize_fallbacks_and_missing() {
        let normalized = normalize_dataset_record(&json!({"id": "brain", "title": "Brain tissue study"}));
        assert_eq!(normalized["dataset_id"], "brain");
        assert_eq!(normalized["dataset_name"], "Brain tissue study");

        let normalized = normalize_dataset_record(&json!({"source": "HuBMAP"}));
        assert_eq!(normalized["dataset_id"], "");
        assert_eq!(normalized["dataset_name"], "");

        assert_eq!(normalize_dataset_record(&json!("not a dict")), json!("not a dict"));
        assert_eq!(normalize_dataset_record(&Value::Null), Value::Null);
    }

    #[test]
    fn summaries_skip_non_objects() {
        let registry = Registry::from_records(vec![
            json!({"id": "heart", "name": "Heart"}),
            json!("stray"),
        ]);
        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].dataset_id, "heart");
        assert_eq!(summaries[0].name, "Heart");

        let normalized = registry.normalized();
        assert_eq!(normalized[0]["dataset_id"], "heart");
        assert_eq!(normalized[1], json!("stray"));
    }
}
