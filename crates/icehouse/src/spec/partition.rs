use serde::{Deserialize, Serialize};

/// A single partition transform over a source column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    pub source_id: i32,
    pub field_id: i32,
    pub name: String,
    pub transform: String,
}

/// How a table's rows are split into files, identified by `spec_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    #[serde(default)]
    pub spec_id: i32,
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// Highest `field_id` in this spec, or 0 when the spec is unpartitioned.
    #[must_use]
    pub fn max_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.field_id).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_spec_round_trip() {
        let json = serde_json::json!({
            "spec-id": 1,
            "fields": [
                {"source-id": 4, "field-id": 1000, "name": "ts_day", "transform": "day"}
            ]
        });
        let spec: PartitionSpec = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(spec.spec_id, 1);
        assert_eq!(spec.max_field_id(), 1000);
        assert_eq!(serde_json::to_value(&spec).unwrap(), json);
    }

    #[test]
    fn test_spec_id_defaults_to_zero() {
        let spec: PartitionSpec = serde_json::from_value(serde_json::json!({"fields": []})).unwrap();
        assert_eq!(spec.spec_id, 0);
        assert_eq!(spec.max_field_id(), 0);
    }
}
