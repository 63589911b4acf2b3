// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Data models for analysis results and report history.
//!
//! The analysis service owns the shape of its response; everything here is
//! optional-with-default and unknown keys are carried through untouched in
//! the `extra` maps so newer service fields survive a save/load cycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::parameters::{Assessment, ParameterSet};

type Extra = serde_json::Map<String, serde_json::Value>;

/// `null` reads the same as an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Verdict returned by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "Compost_Quality_Assessment", default, deserialize_with = "null_as_default")]
    pub assessment: QualityAssessment,

    #[serde(rename = "Plant_Usability_Guide", default, deserialize_with = "null_as_default")]
    pub plants: PlantUsabilityGuide,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    #[serde(rename = "Predicted_Score", default, deserialize_with = "null_as_default")]
    pub predicted_score: f64,

    #[serde(rename = "Quality_Status", default, deserialize_with = "null_as_default")]
    pub quality_status: String,

    #[serde(rename = "Maturity_Stage", default, deserialize_with = "null_as_default")]
    pub maturity_stage: String,

    #[serde(rename = "Days_to_Maturity", default, deserialize_with = "null_as_default")]
    pub days_to_maturity: i64,

    #[serde(rename = "Overall_Recommendation", default, deserialize_with = "null_as_default")]
    pub overall_recommendation: String,

    #[serde(
        rename = "Improvement_Summary",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub improvement_summary: Option<String>,

    #[serde(rename = "Parameter_Improvements", default, deserialize_with = "null_as_default")]
    pub improvements: Vec<ImprovementItem>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Urgency attached to an improvement. Labels outside the known three are
/// kept as sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    High,
    Medium,
    Low,
    Other(String),
}

impl From<String> for Priority {
    fn from(label: String) -> Self {
        match label.as_str() {
            "High" => Priority::High,
            "Medium" => Priority::Medium,
            "Low" => Priority::Low,
            _ => Priority::Other(label),
        }
    }
}

impl From<Priority> for String {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::High => "High".to_string(),
            Priority::Medium => "Medium".to_string(),
            Priority::Low => "Low".to_string(),
            Priority::Other(label) => label,
        }
    }
}

/// Current reading as reported by the service: sometimes a number,
/// sometimes a preformatted string like `"72.4"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

/// One remediation suggestion tied to an out-of-range parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImprovementItem {
    #[serde(rename = "Parameter", default, deserialize_with = "null_as_default")]
    pub parameter: String,

    #[serde(rename = "Priority", default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(rename = "Current", default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Reading>,

    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(rename = "Actions", default, deserialize_with = "null_as_default")]
    pub actions: Vec<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantUsabilityGuide {
    #[serde(rename = "Suitable_Plants_For_Use", default, deserialize_with = "null_as_default")]
    pub suitable: Vec<SuitablePlant>,

    #[serde(rename = "Conditionally_Usable_Plants", default, deserialize_with = "null_as_default")]
    pub conditional: Vec<ConditionalPlant>,

    #[serde(rename = "Not_Suitable_Plants", default, deserialize_with = "null_as_default")]
    pub not_suitable: Vec<UnsuitablePlant>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuitablePlant {
    #[serde(rename = "Plant_Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Plant_Type", default, deserialize_with = "null_as_default")]
    pub plant_type: String,
    #[serde(rename = "Usage_Advice", default, deserialize_with = "null_as_default")]
    pub advice: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalPlant {
    #[serde(rename = "Plant_Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Plant_Type", default, deserialize_with = "null_as_default")]
    pub plant_type: String,
    #[serde(rename = "Usage_Advice", default, deserialize_with = "null_as_default")]
    pub advice: String,
    #[serde(rename = "Reason", default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(rename = "When_to_Use", default, deserialize_with = "null_as_default")]
    pub when_to_use: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnsuitablePlant {
    #[serde(rename = "Plant_Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Plant_Type", default, deserialize_with = "null_as_default")]
    pub plant_type: String,
    #[serde(rename = "Reason", default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A persisted record of one completed analysis. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(rename = "date", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub inputs: ParameterSet,
    pub result: AnalysisResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Unknown,
    Online,
    Offline,
}

/// A form field as posted: text from an input box, a bare JSON number, or
/// `null` for a cleared field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Text(String),
    Number(serde_json::Number),
    Blank,
}

impl RawValue {
    pub fn into_text(self) -> String {
        match self {
            RawValue::Text(text) => text,
            RawValue::Number(number) => number.to_string(),
            RawValue::Blank => String::new(),
        }
    }
}

fn into_texts(values: HashMap<String, RawValue>) -> HashMap<String, String> {
    values
        .into_iter()
        .map(|(id, value)| (id, value.into_text()))
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub values: HashMap<String, RawValue>,
}

impl AnalyzeRequest {
    pub fn into_texts(self) -> HashMap<String, String> {
        into_texts(self.values)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub entry: HistoryEntry,
    pub assessments: Vec<Assessment>,
    /// Set when the entry could not be written to durable storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub values: HashMap<String, RawValue>,
}

impl ClassifyRequest {
    pub fn into_texts(self) -> HashMap<String, String> {
        into_texts(self.values)
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub count: usize,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub id: i64,
    pub removed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_response_fills_defaults() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "Compost_Quality_Assessment": {
                "Predicted_Score": 88,
                "Quality_Status": "High",
                "Maturity_Stage": "Mature",
                "Days_to_Maturity": 5,
                "Overall_Recommendation": "Ready",
                "Parameter_Improvements": []
            },
            "Plant_Usability_Guide": {
                "Suitable_Plants_For_Use": [],
                "Conditionally_Usable_Plants": []
            }
        }))
        .unwrap();

        assert_eq!(result.assessment.predicted_score, 88.0);
        assert_eq!(result.assessment.maturity_stage, "Mature");
        assert!(result.plants.not_suitable.is_empty());
        assert!(result.extra.is_empty());

        let empty: AnalysisResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, AnalysisResult::default());
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let raw = json!({
            "Compost_Quality_Assessment": {
                "Predicted_Score": 61.5,
                "Model_Version": "rf-2",
                "Parameter_Improvements": [{
                    "Parameter": "Temperature",
                    "Priority": "Urgent",
                    "Current": "72.4",
                    "Actions": ["Turn pile immediately to dissipate heat"]
                }]
            },
            "Plant_Usability_Guide": {
                "Suitable_Plants_For_Use": [{
                    "Plant_Name": "Tomato",
                    "Plant_Type": "Vegetable",
                    "Usage_Advice": "Safe for immediate use.",
                    "Growth_Rate": "Fast"
                }]
            },
            "Trace_Id": "abc"
        });

        let result: AnalysisResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.extra["Trace_Id"], "abc");
        assert_eq!(result.assessment.extra["Model_Version"], "rf-2");
        let item = &result.assessment.improvements[0];
        assert_eq!(item.priority, Some(Priority::Other("Urgent".into())));
        assert_eq!(item.current, Some(Reading::Text("72.4".into())));
        assert_eq!(result.plants.suitable[0].extra["Growth_Rate"], "Fast");

        let again: AnalysisResult =
            serde_json::from_value(serde_json::to_value(&result).unwrap()).unwrap();
        assert_eq!(again, result);

        let stored = serde_json::to_value(&result).unwrap();
        let improvement = &stored["Compost_Quality_Assessment"]["Parameter_Improvements"][0];
        assert_eq!(improvement["Priority"], "Urgent");
    }

    #[test]
    fn known_priorities_are_typed() {
        let item: ImprovementItem = serde_json::from_value(json!({
            "Parameter": "pH",
            "Priority": "High",
            "Current": 5.5
        }))
        .unwrap();
        assert_eq!(item.priority, Some(Priority::High));
        assert_eq!(item.current, Some(Reading::Number(5.5)));
        assert_eq!(serde_json::to_value(&item).unwrap()["Priority"], "High");

        let bare: ImprovementItem = serde_json::from_value(json!({ "Parameter": "pH" })).unwrap();
        assert_eq!(bare.priority, None);
        assert!(serde_json::to_value(&bare).unwrap().get("Priority").is_none());
    }

    #[test]
    fn null_fields_read_as_defaults() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "Compost_Quality_Assessment": {
                "Predicted_Score": 42.5,
                "Quality_Status": null,
                "Maturity_Stage": null,
                "Days_to_Maturity": null,
                "Overall_Recommendation": null,
                "Improvement_Summary": null,
                "Parameter_Improvements": null
            },
            "Plant_Usability_Guide": null
        }))
        .unwrap();

        let assessment = &result.assessment;
        assert_eq!(assessment.predicted_score, 42.5);
        assert_eq!(assessment.quality_status, "");
        assert_eq!(assessment.maturity_stage, "");
        assert_eq!(assessment.days_to_maturity, 0);
        assert_eq!(assessment.overall_recommendation, "");
        assert_eq!(assessment.improvement_summary, None);
        assert!(assessment.improvements.is_empty());
        assert_eq!(result.plants, PlantUsabilityGuide::default());
        assert!(assessment.extra.is_empty());
    }

    #[test]
    fn form_values_accept_numbers_text_and_null() {
        let request: AnalyzeRequest = serde_json::from_value(json!({
            "values": { "Temperature": 55.0, "pH": "7.2", "GI(%)": null, "TN(%)": 2 }
        }))
        .unwrap();
        let values = request.into_texts();

        assert_eq!(values["Temperature"], "55.0");
        assert_eq!(values["pH"], "7.2");
        assert_eq!(values["GI(%)"], "");
        assert_eq!(values["TN(%)"], "2");
    }

    #[test]
    fn history_entry_accepts_created_at_alias() {
        let inputs = crate::parameters::validate(&crate::parameters::sample(
            crate::parameters::SampleKind::Mature,
        ))
        .unwrap();
        let entry: HistoryEntry = serde_json::from_value(json!({
            "id": 1700000000000_i64,
            "createdAt": "2023-11-14T22:13:20Z",
            "inputs": inputs,
            "result": {}
        }))
        .unwrap();
        assert_eq!(entry.id, 1_700_000_000_000);
        assert_eq!(entry.created_at.timestamp_millis(), 1_700_000_000_000);

        let encoded = serde_json::to_value(&entry).unwrap();
        assert!(encoded.get("date").is_some());
    }
}
