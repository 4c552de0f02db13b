//! Coaching summary - the structured record extracted from the transcript.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummaryParseError {
    #[error("invalid summary payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("summary payload is not a JSON object")]
    NotAnObject,
}

/// Partial coaching summary.
///
/// Every field is optional: an extraction pass only fills in what the
/// conversation has covered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    /// What is currently not working (behaviour, habits, environment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_issues: Option<String>,
    /// The concrete state the user wants to reach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_state: Option<String>,
    /// The fact-based difference between now and the ideal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<String>,
    /// One or two high-leverage points to focus on
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<Vec<String>>")]
    pub leverage_points: Option<Vec<String>>,
    /// A small, reversible action flow for today or this week
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_flow: Option<String>,
}

impl SummaryRecord {
    /// Overwrite the fields present in `update`, keeping the rest.
    pub fn merge(&mut self, update: SummaryRecord) {
        if update.current_issues.is_some() {
            self.current_issues = update.current_issues;
        }
        if update.ideal_state.is_some() {
            self.ideal_state = update.ideal_state;
        }
        if update.gap.is_some() {
            self.gap = update.gap;
        }
        if update.leverage_points.is_some() {
            self.leverage_points = update.leverage_points;
        }
        if update.action_flow.is_some() {
            self.action_flow = update.action_flow;
        }
    }

    /// Number of populated fields
    pub fn field_count(&self) -> usize {
        [
            self.current_issues.is_some(),
            self.ideal_state.is_some(),
            self.gap.is_some(),
            self.leverage_points.is_some(),
            self.action_flow.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    /// JSON Schema describing the payload the extraction prompt asks for.
    pub fn json_schema() -> String {
        let schema = schemars::schema_for!(SummaryRecord);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }
}

/// Decode a raw extraction payload into a record.
///
/// Model output is untrusted: the payload must be a JSON object whose known
/// fields have the right types. Unknown keys are ignored and `null` counts as
/// absent. Any type mismatch rejects the whole payload.
pub fn decode_summary(payload: &str) -> Result<SummaryRecord, SummaryParseError> {
    let cleaned = strip_markdown_json(payload);
    let value: serde_json::Value = serde_json::from_str(cleaned)?;
    if !value.is_object() {
        return Err(SummaryParseError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}

/// Strip a markdown code fence from a JSON response
fn strip_markdown_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = fenced.strip_prefix("json").unwrap_or(fenced);
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => trimmed,
    }
}

/// Accept `leveragePoints` as either a list or a single string.
fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(
        Option::<OneOrMany>::deserialize(deserializer)?.map(|points| match points {
            OneOrMany::One(point) => vec![point],
            OneOrMany::Many(points) => points,
        }),
    )
}

/// Accumulating holder for the session's summary.
///
/// Absent until the first merge. Only supports merging and resetting so that
/// fields gathered by earlier extraction passes are never replaced wholesale.
#[derive(Debug, Clone, Default)]
pub struct SummaryStore {
    record: Option<SummaryRecord>,
}

impl SummaryStore {
    pub fn merge(&mut self, update: SummaryRecord) {
        self.record.get_or_insert_with(SummaryRecord::default).merge(update);
    }

    pub fn reset(&mut self) {
        self.record = None;
    }

    pub fn get(&self) -> Option<&SummaryRecord> {
        self.record.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_partial_payload() {
        let record = decode_summary(r#"{"currentIssues": "oversleeping"}"#).unwrap();
        assert_eq!(record.current_issues.as_deref(), Some("oversleeping"));
        assert_eq!(record.field_count(), 1);
    }

    #[test]
    fn decodes_fenced_payload_with_unknown_keys() {
        let payload = "```json\n{\"gap\": \"30 minutes\", \"mood\": \"tired\"}\n```";
        let record = decode_summary(payload).unwrap();
        assert_eq!(record.gap.as_deref(), Some("30 minutes"));
    }

    #[test]
    fn leverage_points_accepts_single_string() {
        let record = decode_summary(r#"{"leveragePoints": "phone out of bedroom"}"#).unwrap();
        assert_eq!(
            record.leverage_points,
            Some(vec!["phone out of bedroom".to_string()])
        );

        let record = decode_summary(r#"{"leveragePoints": ["a", "b"]}"#).unwrap();
        assert_eq!(record.leverage_points.unwrap().len(), 2);
    }

    #[test]
    fn null_fields_are_absent() {
        let record = decode_summary(r#"{"gap": null, "actionFlow": "walk"}"#).unwrap();
        assert!(record.gap.is_none());
        assert_eq!(record.action_flow.as_deref(), Some("walk"));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            decode_summary("not json"),
            Err(SummaryParseError::Json(_))
        ));
        assert!(matches!(
            decode_summary(r#"["currentIssues"]"#),
            Err(SummaryParseError::NotAnObject)
        ));
        assert!(decode_summary(r#"{"gap": 5, "idealState": "rested"}"#).is_err());
    }

    #[test]
    fn empty_object_means_no_new_fields() {
        let record = decode_summary("{}").unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn merge_keeps_omitted_keys() {
        let mut store = SummaryStore::default();
        assert!(store.get().is_none());

        store.merge(SummaryRecord {
            gap: Some("A".into()),
            ..Default::default()
        });
        store.merge(SummaryRecord {
            action_flow: Some("B".into()),
            ..Default::default()
        });

        let record = store.get().unwrap();
        assert_eq!(record.gap.as_deref(), Some("A"));
        assert_eq!(record.action_flow.as_deref(), Some("B"));
    }

    #[test]
    fn merge_overwrites_present_keys() {
        let mut record = SummaryRecord {
            gap: Some("old".into()),
            ideal_state: Some("rested".into()),
            ..Default::default()
        };
        record.merge(SummaryRecord {
            gap: Some("new".into()),
            ..Default::default()
        });
        assert_eq!(record.gap.as_deref(), Some("new"));
        assert_eq!(record.ideal_state.as_deref(), Some("rested"));
    }

    #[test]
    fn reset_clears_to_absent() {
        let mut store = SummaryStore::default();
        store.merge(SummaryRecord::default());
        assert!(store.get().is_some());
        store.reset();
        assert!(store.get().is_none());
    }

    #[test]
    fn schema_uses_camel_case_fields() {
        let schema = SummaryRecord::json_schema();
        for field in [
            "currentIssues",
            "idealState",
            "gap",
            "leveragePoints",
            "actionFlow",
        ] {
            assert!(schema.contains(field), "missing {field}");
        }
    }
}
