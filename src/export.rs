// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! CSV export of an archived analysis.

use crate::model::HistoryEntry;

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

pub fn file_name(entry: &HistoryEntry) -> String {
    format!("compost_data_{}.csv", entry.id)
}

/// Parameter rows in catalogue order, then score, status and stage.
pub fn to_csv(entry: &HistoryEntry) -> String {
    let assessment = &entry.result.assessment;
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(17);

    rows.push(vec!["Parameter".into(), "Value".into(), "Unit".into()]);
    for (def, value) in entry.inputs.iter() {
        rows.push(vec![def.label.into(), value.to_string(), def.unit.into()]);
    }
    rows.push(vec!["---".into(), "---".into(), "---".into()]);
    rows.push(vec![
        "Predicted Score".into(),
        format!("{:.2}", assessment.predicted_score),
    ]);
    rows.push(vec!["Quality Status".into(), assessment.quality_status.clone()]);
    rows.push(vec!["Maturity Stage".into(), assessment.maturity_stage.clone()]);

    rows.iter()
        .map(|row| row.iter().map(|field| escape(field)).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
