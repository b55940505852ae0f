//! Experimental warming sites and their categorical metadata.
//!
//! A site is built once per row of the experiment-metadata table and is read-only
//! afterwards. Every categorical field keeps the text it was classified from alongside the
//! resolved variant (see [`Classified`]), so reporting and re-classification never lose the
//! original wording from the literature.
//!
//! # Examples
//!
//! ```rust
//! use ecosim_core::site::{Coordinates, EcosystemType, ExperimentalSite};
//!
//! let site = ExperimentalSite::new("Smith 2020_a")
//!     .with_coordinates(Coordinates::new(65.0, -150.0))
//!     .with_ecosystem("Arctic tundra")
//!     .with_warming_duration_months(Some(vec![1, 12, 6]));
//!
//! assert_eq!(site.site_id(), "Smith_2020");
//! assert_eq!(site.ecosystem.resolved, Some(EcosystemType::Tundra));
//! assert_eq!(site.max_warming_duration_months(), Some(12));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parsers::{map_ecosystem_type, map_warming_method, map_warming_season, map_warming_timing};

/// Major ecosystem types in the warming meta-analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EcosystemType {
    #[serde(rename = "tundra")]
    Tundra,
    #[serde(rename = "forest")]
    Forest,
    #[serde(rename = "shrub/heathland")]
    ShrubHeathland,
    #[serde(rename = "grassland/meadow/prairie")]
    GrasslandMeadowPrairie,
    #[serde(rename = "cropland")]
    Cropland,
    #[serde(rename = "peat")]
    Peat,
}

impl EcosystemType {
    /// Every variant, in declaration order.
    pub const ALL: [EcosystemType; 6] = [
        EcosystemType::Tundra,
        EcosystemType::Forest,
        EcosystemType::ShrubHeathland,
        EcosystemType::GrasslandMeadowPrairie,
        EcosystemType::Cropland,
        EcosystemType::Peat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EcosystemType::Tundra => "tundra",
            EcosystemType::Forest => "forest",
            EcosystemType::ShrubHeathland => "shrub/heathland",
            EcosystemType::GrasslandMeadowPrairie => "grassland/meadow/prairie",
            EcosystemType::Cropland => "cropland",
            EcosystemType::Peat => "peat",
        }
    }
}

impl fmt::Display for EcosystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Methods used for experimental warming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarmingMethod {
    #[serde(rename = "greenhouse")]
    Greenhouse,
    #[serde(rename = "heating cable")]
    HeatingCable,
    #[serde(rename = "infrared radiator")]
    InfraredRadiator,
    #[serde(rename = "open top chamber")]
    OpenTopChamber,
    #[serde(rename = "curtain")]
    Curtain,
}

impl WarmingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmingMethod::Greenhouse => "greenhouse",
            WarmingMethod::HeatingCable => "heating cable",
            WarmingMethod::InfraredRadiator => "infrared radiator",
            WarmingMethod::OpenTopChamber => "open top chamber",
            WarmingMethod::Curtain => "curtain",
        }
    }
}

impl fmt::Display for WarmingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time of day during which warming was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarmingTiming {
    #[serde(rename = "all day warming")]
    AllDay,
    #[serde(rename = "night time warming")]
    NightTime,
    #[serde(rename = "day time warming")]
    DayTime,
    #[serde(rename = "growing season")]
    GrowingSeason,
}

impl WarmingTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmingTiming::AllDay => "all day warming",
            WarmingTiming::NightTime => "night time warming",
            WarmingTiming::DayTime => "day time warming",
            WarmingTiming::GrowingSeason => "growing season",
        }
    }
}

impl fmt::Display for WarmingTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Season during which warming was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarmingSeason {
    #[serde(rename = "all year")]
    AllYear,
    #[serde(rename = "growing season")]
    GrowingSeason,
    #[serde(rename = "winter")]
    Winter,
}

impl WarmingSeason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmingSeason::AllYear => "all year",
            WarmingSeason::GrowingSeason => "growing season",
            WarmingSeason::Winter => "winter",
        }
    }
}

impl fmt::Display for WarmingSeason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A categorical value resolved from free text, together with that text.
///
/// `resolved` is `None` when no keyword rule matched. `raw` is always kept, even when it is
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classified<T> {
    pub resolved: Option<T>,
    pub raw: String,
}

impl<T> Classified<T> {
    /// Classify `raw` with `mapper`, keeping the text.
    pub fn classify(raw: impl Into<String>, mapper: impl Fn(&str) -> Option<T>) -> Self {
        let raw = raw.into();
        Self {
            resolved: mapper(&raw),
            raw,
        }
    }

    /// A value with nothing resolved and no text.
    pub fn unresolved() -> Self {
        Self {
            resolved: None,
            raw: String::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

impl<T> Default for Classified<T> {
    fn default() -> Self {
        Self::unresolved()
    }
}

/// Geographic coordinates of an experimental site in decimal degrees.
///
/// Latitude and longitude are either both present and in range, or there are no
/// coordinates at all: [`Coordinates::new`] returns `None` rather than a half-valid value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
    altitude: Option<f64>,
}

impl Coordinates {
    /// Validate and build a coordinate pair.
    ///
    /// ```rust
    /// use ecosim_core::site::Coordinates;
    ///
    /// assert!(Coordinates::new(45.5, -122.6).is_some());
    /// assert!(Coordinates::new(91.0, 0.0).is_none());
    /// assert!(Coordinates::new(0.0, f64::NAN).is_none());
    /// ```
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
            altitude: None,
        })
    }

    /// Builder method to add an altitude in metres above sea level.
    pub fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.altitude = altitude.filter(|a| a.is_finite());
        self
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[inline]
    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }
}

/// An experimental warming study site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalSite {
    /// Citation identifier for the study
    pub source_id: String,
    pub coordinates: Option<Coordinates>,
    /// Human-readable location text, kept even when coordinates were parsed
    pub location_text: String,
    pub ecosystem: Classified<EcosystemType>,
    pub warming_method: Classified<WarmingMethod>,
    /// Longer description of the warming setup
    pub warming_method_text: String,
    pub warming_timing: Classified<WarmingTiming>,
    pub warming_season: Classified<WarmingSeason>,
    /// Temperature increase in degrees Celsius, never negative
    pub temperature_increase_c: Option<f64>,
    /// Measurement timepoints in months, in source order
    pub warming_duration_months: Option<Vec<i32>>,
}

impl ExperimentalSite {
    /// Create a site with only its citation identifier set.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            coordinates: None,
            location_text: String::new(),
            ecosystem: Classified::unresolved(),
            warming_method: Classified::unresolved(),
            warming_method_text: String::new(),
            warming_timing: Classified::unresolved(),
            warming_season: Classified::unresolved(),
            temperature_increase_c: None,
            warming_duration_months: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Option<Coordinates>) -> Self {
        self.coordinates = coordinates;
        self
    }

    pub fn with_location_text(mut self, text: impl Into<String>) -> Self {
        self.location_text = text.into();
        self
    }

    /// Builder method classifying an ecosystem description.
    pub fn with_ecosystem(mut self, text: impl Into<String>) -> Self {
        self.ecosystem = Classified::classify(text, map_ecosystem_type);
        self
    }

    /// Builder method classifying the warming method keyword column.
    pub fn with_warming_method(mut self, text: impl Into<String>) -> Self {
        self.warming_method = Classified::classify(text, map_warming_method);
        self
    }

    pub fn with_warming_method_text(mut self, text: impl Into<String>) -> Self {
        self.warming_method_text = text.into();
        self
    }

    pub fn with_warming_timing(mut self, text: impl Into<String>) -> Self {
        self.warming_timing = Classified::classify(text, map_warming_timing);
        self
    }

    pub fn with_warming_season(mut self, text: impl Into<String>) -> Self {
        self.warming_season = Classified::classify(text, map_warming_season);
        self
    }

    /// Builder method for the temperature increase. Negative values are discarded.
    pub fn with_temperature_increase(mut self, increase: Option<f64>) -> Self {
        self.temperature_increase_c = increase.filter(|t| t.is_finite() && *t >= 0.0);
        self
    }

    pub fn with_warming_duration_months(mut self, months: Option<Vec<i32>>) -> Self {
        self.warming_duration_months = months;
        self
    }

    /// Short identifier: the citation id up to the first `_`, with spaces replaced by `_`.
    pub fn site_id(&self) -> String {
        self.source_id
            .split('_')
            .next()
            .unwrap_or_default()
            .replace(' ', "_")
    }

    /// Longest measurement timepoint in months.
    pub fn max_warming_duration_months(&self) -> Option<i32> {
        self.warming_duration_months
            .as_ref()
            .and_then(|months| months.iter().copied().max())
    }

    /// Resolved ecosystem, if any.
    #[inline]
    pub fn ecosystem_type(&self) -> Option<EcosystemType> {
        self.ecosystem.resolved
    }
}

/// Ordered collection of experimental sites.
///
/// Measurements are not owned by the inventory; they are kept in a flat list and joined on
/// the citation id when needed (see [`crate::measurement::measurements_for`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteInventory {
    sites: Vec<ExperimentalSite>,
}

impl SiteInventory {
    pub fn new(sites: Vec<ExperimentalSite>) -> Self {
        Self { sites }
    }

    pub fn sites(&self) -> &[ExperimentalSite] {
        &self.sites
    }

    pub fn n_sites(&self) -> usize {
        self.sites.len()
    }

    /// Sites that have parsed coordinates, in inventory order.
    pub fn sites_with_coordinates(&self) -> Vec<&ExperimentalSite> {
        self.sites
            .iter()
            .filter(|s| s.coordinates.is_some())
            .collect()
    }

    /// Group sites with a resolved ecosystem.
    ///
    /// Groups appear in the order their ecosystem is first seen; sites keep inventory order
    /// within a group. Sites without a resolved ecosystem are left out.
    pub fn by_ecosystem(&self) -> Vec<(EcosystemType, Vec<&ExperimentalSite>)> {
        let mut groups: Vec<(EcosystemType, Vec<&ExperimentalSite>)> = Vec::new();
        for site in &self.sites {
            let Some(ecosystem) = site.ecosystem_type() else {
                continue;
            };
            match groups.iter_mut().find(|(e, _)| *e == ecosystem) {
                Some((_, members)) => members.push(site),
                None => groups.push((ecosystem, vec![site])),
            }
        }
        groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExperimentalSite> {
        self.sites.iter()
    }
}

impl FromIterator<ExperimentalSite> for SiteInventory {
    fn from_iter<I: IntoIterator<Item = ExperimentalSite>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for SiteInventory {
    type Item = ExperimentalSite;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: &str, ecosystem: &str) -> ExperimentalSite {
        ExperimentalSite::new(id).with_ecosystem(ecosystem)
    }

    #[test]
    fn test_site_id_from_source_id() {
        assert_eq!(ExperimentalSite::new("Smith 2020").site_id(), "Smith_2020");
        assert_eq!(
            ExperimentalSite::new("Jones et al. 2011_b").site_id(),
            "Jones_et_al._2011"
        );
        assert_eq!(ExperimentalSite::new("").site_id(), "");
    }

    #[test]
    fn test_max_duration() {
        let s = ExperimentalSite::new("x").with_warming_duration_months(Some(vec![3, 24, 12]));
        assert_eq!(s.max_warming_duration_months(), Some(24));
        assert_eq!(ExperimentalSite::new("x").max_warming_duration_months(), None);
    }

    #[test]
    fn test_negative_temperature_increase_dropped() {
        let s = ExperimentalSite::new("x").with_temperature_increase(Some(-1.0));
        assert_eq!(s.temperature_increase_c, None);
        let s = ExperimentalSite::new("x").with_temperature_increase(Some(0.0));
        assert_eq!(s.temperature_increase_c, Some(0.0));
    }

    #[test]
    fn test_classified_keeps_raw_text() {
        let s = site("x", "salt marsh");
        assert_eq!(s.ecosystem.resolved, None);
        assert_eq!(s.ecosystem.raw, "salt marsh");
    }

    #[test]
    fn test_coordinates_are_all_or_nothing() {
        assert!(Coordinates::new(-90.0, 180.0).is_some());
        assert!(Coordinates::new(-90.1, 0.0).is_none());
        assert!(Coordinates::new(0.0, -180.5).is_none());
        let c = Coordinates::new(10.0, 10.0)
            .unwrap()
            .with_altitude(Some(f64::NAN));
        assert_eq!(c.altitude(), None);
    }

    #[test]
    fn test_inventory_grouping_keeps_first_seen_order() {
        let inventory = SiteInventory::new(vec![
            site("a", "boreal forest"),
            site("b", "alpine tundra"),
            site("c", "mixed forest"),
            site("d", "urban lawn"),
        ]);

        let groups = inventory.by_ecosystem();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, EcosystemType::Forest);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, EcosystemType::Tundra);
    }

    #[test]
    fn test_sites_with_coordinates() {
        let inventory = SiteInventory::new(vec![
            ExperimentalSite::new("a").with_coordinates(Coordinates::new(65.0, -150.0)),
            ExperimentalSite::new("b"),
        ]);
        assert_eq!(inventory.n_sites(), 2);
        let with = inventory.sites_with_coordinates();
        assert_eq!(with.len(), 1);
        assert_eq!(with[0].source_id, "a");
    }

    #[test]
    fn test_enum_serialization_uses_literature_names() {
        let json = serde_json::to_string(&EcosystemType::ShrubHeathland).unwrap();
        assert_eq!(json, "\"shrub/heathland\"");
        let back: EcosystemType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EcosystemType::ShrubHeathland);
        assert_eq!(WarmingMethod::OpenTopChamber.to_string(), "open top chamber");
    }
}
