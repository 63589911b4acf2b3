// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! The fixed compost parameter catalogue and form validation.
//!
//! Twelve chemical/physical measurements make up a submission. Raw form text
//! is turned into a [`ParameterSet`] by [`validate`], which walks the
//! catalogue in its fixed order and stops at the first bad field. Range
//! checks are advisory only: [`ParameterDef::classify`] tells the UI whether
//! a value sits in the ideal interval but never rejects it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ValidationError, ValidationReason};

pub const PARAMETER_COUNT: usize = 12;

/// Static description of one measured parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterDef {
    pub id: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    /// Display range used for gauges.
    pub min: f64,
    pub max: f64,
    /// Ideal interval, inclusive on both ends.
    pub ideal: (f64, f64),
}

impl ParameterDef {
    const fn new(
        id: &'static str,
        label: &'static str,
        unit: &'static str,
        min: f64,
        max: f64,
        ideal: (f64, f64),
    ) -> Self {
        Self {
            id,
            label,
            unit,
            min,
            max,
            ideal,
        }
    }
}

pub const PARAMETERS: [ParameterDef; PARAMETER_COUNT] = [
    ParameterDef::new("Temperature", "Temperature", "°C", 0.0, 80.0, (40.0, 65.0)),
    ParameterDef::new("MC(%)", "Moisture", "%", 0.0, 100.0, (40.0, 60.0)),
    ParameterDef::new("pH", "pH Level", "pH", 0.0, 14.0, (6.0, 8.0)),
    ParameterDef::new("C/N Ratio", "C/N Ratio", ":1", 0.0, 100.0, (20.0, 35.0)),
    ParameterDef::new("Ammonia(mg/kg)", "Ammonia", "mg/kg", 0.0, 1000.0, (0.0, 100.0)),
    ParameterDef::new("Nitrate(mg/kg)", "Nitrate", "mg/kg", 0.0, 2000.0, (200.0, 1000.0)),
    ParameterDef::new("TN(%)", "Total Nitrogen", "%", 0.0, 5.0, (1.0, 3.0)),
    ParameterDef::new("TOC(%)", "Total Org. Carbon", "%", 0.0, 60.0, (30.0, 45.0)),
    ParameterDef::new("EC(ms/cm)", "Conductivity", "mS/cm", 0.0, 10.0, (0.0, 4.0)),
    ParameterDef::new("OM(%)", "Organic Matter", "%", 0.0, 100.0, (40.0, 70.0)),
    ParameterDef::new("T Value", "Self-Heating (T)", "", 0.0, 5.0, (0.0, 1.0)),
    ParameterDef::new("GI(%)", "Germination Index", "%", 0.0, 120.0, (80.0, 120.0)),
];

/// Advisory verdict for a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Empty,
    Optimal,
    Attention,
}

impl ParameterDef {
    pub fn classify(&self, value: f64) -> Classification {
        let (lo, hi) = self.ideal;
        if value >= lo && value <= hi {
            Classification::Optimal
        } else {
            Classification::Attention
        }
    }

    /// Position of `value` inside the display range, clamped to `0.0..=1.0`.
    pub fn gauge(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }
}

/// A complete, validated set of twelve finite readings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "HashMap<String, f64>")]
pub struct ParameterSet {
    values: [f64; PARAMETER_COUNT],
}

impl ParameterSet {
    pub fn iter(&self) -> impl Iterator<Item = (&'static ParameterDef, f64)> + '_ {
        PARAMETERS.iter().zip(self.values.iter().copied())
    }
}

impl TryFrom<HashMap<String, f64>> for ParameterSet {
    type Error = String;

    fn try_from(map: HashMap<String, f64>) -> Result<Self, Self::Error> {
        let mut values = [0.0; PARAMETER_COUNT];
        for (slot, def) in values.iter_mut().zip(PARAMETERS.iter()) {
            let value = map
                .get(def.id)
                .copied()
                .ok_or_else(|| format!("missing parameter: {}", def.id))?;
            if !value.is_finite() {
                return Err(format!("parameter {} must be a finite number", def.id));
            }
            *slot = value;
        }
        Ok(Self { values })
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(PARAMETER_COUNT))?;
        for (def, value) in self.iter() {
            map.serialize_entry(def.id, &value)?;
        }
        map.end()
    }
}

/// Validate raw form text into a [`ParameterSet`].
///
/// Fields are checked in catalogue order; the first missing or non-numeric
/// field is reported and the rest are not inspected.
pub fn validate(raw: &HashMap<String, String>) -> Result<ParameterSet, ValidationError> {
    let mut values = [0.0; PARAMETER_COUNT];

    for (slot, def) in values.iter_mut().zip(PARAMETERS.iter()) {
        let text = raw.get(def.id).map(|s| s.trim()).unwrap_or_default();
        if text.is_empty() {
            return Err(reject(def, ValidationReason::Missing));
        }

        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => *slot = value,
            _ => return Err(reject(def, ValidationReason::NotANumber)),
        }
    }

    Ok(ParameterSet { values })
}

fn reject(def: &ParameterDef, reason: ValidationReason) -> ValidationError {
    ValidationError {
        parameter: def.id,
        label: def.label,
        reason,
    }
}

/// Per-field advisory view of a (possibly incomplete) form.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub parameter: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub value: Option<f64>,
    pub status: Classification,
    pub gauge: Option<f64>,
}

pub fn assess(raw: &HashMap<String, String>) -> Vec<Assessment> {
    PARAMETERS
        .iter()
        .map(|def| {
            let value = raw
                .get(def.id)
                .and_then(|text| text.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite());
            Assessment {
                parameter: def.id,
                label: def.label,
                unit: def.unit,
                value,
                status: value.map_or(Classification::Empty, |v| def.classify(v)),
                gauge: value.map(|v| def.gauge(v)),
            }
        })
        .collect()
}

pub fn assess_set(params: &ParameterSet) -> Vec<Assessment> {
    params
        .iter()
        .map(|(def, value)| Assessment {
            parameter: def.id,
            label: def.label,
            unit: def.unit,
            value: Some(value),
            status: def.classify(value),
            gauge: Some(def.gauge(value)),
        })
        .collect()
}

/// Canned form contents for demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Mature,
    Immature,
}

impl FromStr for SampleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mature" => Ok(SampleKind::Mature),
            "immature" => Ok(SampleKind::Immature),
            other => Err(format!("unknown sample kind: {other}")),
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Mature => f.write_str("mature"),
            SampleKind::Immature => f.write_str("immature"),
        }
    }
}

pub fn sample(kind: SampleKind) -> HashMap<String, String> {
    let texts: [&str; PARAMETER_COUNT] = match kind {
        SampleKind::Mature => [
            "55.0", "50.0", "7.2", "25.0", "45.00", "850.00", "1.85", "35.50", "2.10", "55.00",
            "0.50", "95.00",
        ],
        // hot, dry, acidic, nitrogen heavy
        SampleKind::Immature => [
            "75.0", "30.0", "5.5", "15.0", "450.00", "100.00", "0.80", "50.00", "5.50", "40.00",
            "4.00", "45.00",
        ],
    };

    PARAMETERS
        .iter()
        .zip(texts)
        .map(|(def, text)| (def.id.to_string(), text.to_string()))
        .collect()
}

#[cfg(test)]
pub fn find(id: &str) -> Option<&'static ParameterDef> {
    PARAMETERS.iter().find(|def| def.id == id)
}

#[cfg(test)]
impl ParameterSet {
    /// Build from values given in catalogue order. Every value must be finite.
    pub fn from_ordered(values: [f64; PARAMETER_COUNT]) -> Option<Self> {
        values
            .iter()
            .all(|value| value.is_finite())
            .then_some(Self { values })
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.iter()
            .find(|(def, _)| def.id == id)
            .map(|(_, value)| value)
    }
}
