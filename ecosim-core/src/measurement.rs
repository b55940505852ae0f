//! Nitrogen-cycle measurements reported by warming experiments.
//!
//! Measurements refer to their site through the citation id only. There is no foreign-key
//! enforcement: joins are done by key equality when needed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nitrogen-cycle quantities recorded in the meta-analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NitrogenVariable {
    #[serde(rename = "N2O")]
    N2O,
    #[serde(rename = "gross N mineralization")]
    GrossNMineralization,
    #[serde(rename = "net N mineralization")]
    NetNMineralization,
    #[serde(rename = "net nitrification")]
    NetNitrification,
    #[serde(rename = "gross nitrification")]
    GrossNitrification,
    #[serde(rename = "denitrification")]
    Denitrification,
    #[serde(rename = "N_immobilization")]
    NImmobilization,
    #[serde(rename = "N_fixation")]
    NFixation,
    #[serde(rename = "N leaching")]
    NLeaching,
    #[serde(rename = "plant N")]
    PlantN,
    #[serde(rename = "soil inorganic N")]
    SoilInorganicN,
    #[serde(rename = "microbial N")]
    MicrobialN,
    #[serde(rename = "soil N")]
    SoilN,
    #[serde(rename = "soil moisture")]
    SoilMoisture,
}

const VARIABLE_NAMES: [(NitrogenVariable, &str); 14] = [
    (NitrogenVariable::N2O, "N2O"),
    (NitrogenVariable::GrossNMineralization, "gross N mineralization"),
    (NitrogenVariable::NetNMineralization, "net N mineralization"),
    (NitrogenVariable::NetNitrification, "net nitrification"),
    (NitrogenVariable::GrossNitrification, "gross nitrification"),
    (NitrogenVariable::Denitrification, "denitrification"),
    (NitrogenVariable::NImmobilization, "N_immobilization"),
    (NitrogenVariable::NFixation, "N_fixation"),
    (NitrogenVariable::NLeaching, "N leaching"),
    (NitrogenVariable::PlantN, "plant N"),
    (NitrogenVariable::SoilInorganicN, "soil inorganic N"),
    (NitrogenVariable::MicrobialN, "microbial N"),
    (NitrogenVariable::SoilN, "soil N"),
    (NitrogenVariable::SoilMoisture, "soil moisture"),
];

impl NitrogenVariable {
    /// Look up a variable by its exact name in the measurement table.
    ///
    /// Matching is case-sensitive: "n2o" is not a known variable.
    pub fn from_name(name: &str) -> Option<Self> {
        VARIABLE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(variable, _)| *variable)
    }

    pub fn as_str(&self) -> &'static str {
        VARIABLE_NAMES
            .iter()
            .find(|(variable, _)| variable == self)
            .map(|(_, name)| *name)
            .unwrap_or_default()
    }
}

impl fmt::Display for NitrogenVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single treatment/control observation of a nitrogen-cycle variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NitrogenMeasurement {
    /// Citation id of the site this was measured at
    pub source_id: String,
    pub variable: NitrogenVariable,
    pub treatment_mean: f64,
    pub control_mean: f64,
    pub treatment_sd: Option<f64>,
    pub control_sd: Option<f64>,
    pub treatment_n: Option<i64>,
    pub control_n: Option<i64>,
    pub duration_months: Option<i64>,
    /// Unit string as reported, empty when the source gave none
    pub unit: String,
    pub other_conditions: Option<String>,
}

impl NitrogenMeasurement {
    /// Create a measurement with only the required fields set.
    pub fn new(
        source_id: impl Into<String>,
        variable: NitrogenVariable,
        treatment_mean: f64,
        control_mean: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            variable,
            treatment_mean,
            control_mean,
            treatment_sd: None,
            control_sd: None,
            treatment_n: None,
            control_n: None,
            duration_months: None,
            unit: unit.into(),
            other_conditions: None,
        }
    }

    /// Treatment minus control.
    pub fn warming_effect(&self) -> f64 {
        self.treatment_mean - self.control_mean
    }

    /// Warming effect as a percentage of the absolute control mean.
    ///
    /// Undefined when the control mean is exactly zero.
    ///
    /// ```rust
    /// use ecosim_core::measurement::{NitrogenMeasurement, NitrogenVariable};
    ///
    /// let m = NitrogenMeasurement::new("Test", NitrogenVariable::N2O, 6.0, 3.0, "mg N/m2/day");
    /// assert_eq!(m.warming_effect_pct(), Some(100.0));
    ///
    /// let m = NitrogenMeasurement::new("Test", NitrogenVariable::N2O, 6.0, 0.0, "mg N/m2/day");
    /// assert_eq!(m.warming_effect_pct(), None);
    /// ```
    pub fn warming_effect_pct(&self) -> Option<f64> {
        if self.control_mean == 0.0 {
            return None;
        }
        Some(self.warming_effect() / self.control_mean.abs() * 100.0)
    }

    /// Whether the optional statistics are within their physical bounds.
    ///
    /// Standard deviations must be non-negative, sample sizes at least one and the duration
    /// non-negative. Absent values are always in bounds.
    pub fn is_within_bounds(&self) -> bool {
        let sd_ok = |sd: Option<f64>| sd.map_or(true, |v| v >= 0.0);
        let n_ok = |n: Option<i64>| n.map_or(true, |v| v >= 1);

        self.treatment_mean.is_finite()
            && self.control_mean.is_finite()
            && sd_ok(self.treatment_sd)
            && sd_ok(self.control_sd)
            && n_ok(self.treatment_n)
            && n_ok(self.control_n)
            && self.duration_months.map_or(true, |d| d >= 0)
    }
}

/// Measurements recorded for one citation id, in their original order.
pub fn measurements_for<'a>(
    source_id: &str,
    measurements: &'a [NitrogenMeasurement],
) -> Vec<&'a NitrogenMeasurement> {
    measurements
        .iter()
        .filter(|m| m.source_id == source_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_lookup_is_exact() {
        assert_eq!(NitrogenVariable::from_name("N2O"), Some(NitrogenVariable::N2O));
        assert_eq!(
            NitrogenVariable::from_name("N_fixation"),
            Some(NitrogenVariable::NFixation)
        );
        assert_eq!(NitrogenVariable::from_name("n2o"), None);
        assert_eq!(NitrogenVariable::from_name("soil moisture "), None);
    }

    #[test]
    fn test_names_round_trip() {
        for (variable, name) in VARIABLE_NAMES {
            assert_eq!(variable.as_str(), name);
            assert_eq!(NitrogenVariable::from_name(name), Some(variable));
            let json = serde_json::to_string(&variable).unwrap();
            assert_eq!(json, format!("\"{name}\""));
        }
    }

    #[test]
    fn test_warming_effect() {
        let m = NitrogenMeasurement::new("Test", NitrogenVariable::N2O, 5.0, 3.0, "");
        assert_eq!(m.warming_effect(), 2.0);

        let m = NitrogenMeasurement::new("Test", NitrogenVariable::N2O, -1.0, -2.0, "");
        assert_eq!(m.warming_effect_pct(), Some(50.0));
    }

    #[test]
    fn test_bounds() {
        let mut m = NitrogenMeasurement::new("Test", NitrogenVariable::PlantN, 1.0, 1.0, "g");
        assert!(m.is_within_bounds());

        m.treatment_n = Some(0);
        assert!(!m.is_within_bounds());
        m.treatment_n = Some(4);
        m.control_sd = Some(-0.1);
        assert!(!m.is_within_bounds());
        m.control_sd = Some(0.0);
        m.duration_months = Some(-1);
        assert!(!m.is_within_bounds());
    }

    #[test]
    fn test_measurements_for_source() {
        let all = vec![
            NitrogenMeasurement::new("a", NitrogenVariable::N2O, 1.0, 1.0, ""),
            NitrogenMeasurement::new("b", NitrogenVariable::N2O, 1.0, 1.0, ""),
            NitrogenMeasurement::new("a", NitrogenVariable::SoilN, 1.0, 1.0, ""),
        ];
        let found = measurements_for("a", &all);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].variable, NitrogenVariable::SoilN);
    }
}
