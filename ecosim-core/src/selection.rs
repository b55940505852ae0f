//! Site scoring and tier-1 selection.
//!
//! A site's score rewards complete metadata and dense nitrogen measurements:
//!
//! $$ score = metadata + 2 \cdot n_{measurements} + 3 \cdot n_{variables} $$
//!
//! where `metadata` counts one point each for coordinates, temperature increase, duration,
//! a resolved ecosystem and a resolved warming method.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::measurement::{NitrogenMeasurement, NitrogenVariable};
use crate::site::{EcosystemType, ExperimentalSite, SiteInventory};

/// Parameters for tier-1 site selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionParameters {
    /// Sites scoring below this are dropped
    ///
    /// Default: 5.0
    pub min_score: f64,
    /// Maximum number of sites kept after ranking
    ///
    /// Default: 12
    pub target_count: usize,
    /// Top sites guaranteed a place for each resolved ecosystem
    ///
    /// Default: 2
    pub min_per_ecosystem: usize,
}

impl Default for SelectionParameters {
    fn default() -> Self {
        Self {
            min_score: 5.0,
            target_count: 12,
            min_per_ecosystem: 2,
        }
    }
}

/// Score of one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteScore<'a> {
    pub site: &'a ExperimentalSite,
    /// Position of the site in the inventory it was scored from
    pub index: usize,
    pub n_measurements: usize,
    pub n_variables: usize,
    pub metadata_score: u8,
    pub total_score: f64,
}

impl fmt::Display for SiteScore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source_id: String = self.site.source_id.chars().take(60).collect();
        write!(
            f,
            "{:60} | Score: {:5.1} | Meas: {:2} ({} vars) | Meta: {}/5",
            source_id, self.total_score, self.n_measurements, self.n_variables, self.metadata_score
        )
    }
}

/// Metadata completeness from 0 to 5.
pub fn score_site_metadata(site: &ExperimentalSite) -> u8 {
    [
        site.coordinates.is_some(),
        site.temperature_increase_c.is_some(),
        site.warming_duration_months.is_some(),
        site.ecosystem.is_resolved(),
        site.warming_method.is_resolved(),
    ]
    .into_iter()
    .map(u8::from)
    .sum()
}

/// Combine the metadata score with measurement counts.
pub fn total_score(metadata_score: u8, n_measurements: usize, n_variables: usize) -> f64 {
    f64::from(metadata_score) + 2.0 * n_measurements as f64 + 3.0 * n_variables as f64
}

/// Score every site, drop those below `min_score` and sort by descending score.
///
/// Sites with equal scores keep their inventory order.
pub fn rank_sites<'a>(
    inventory: &'a SiteInventory,
    measurements: &[NitrogenMeasurement],
    min_score: f64,
) -> Vec<SiteScore<'a>> {
    let mut by_source: HashMap<&str, (usize, BTreeSet<NitrogenVariable>)> = HashMap::new();
    for m in measurements {
        let entry = by_source.entry(m.source_id.as_str()).or_default();
        entry.0 += 1;
        entry.1.insert(m.variable);
    }

    let mut scores: Vec<SiteScore<'a>> = inventory
        .iter()
        .enumerate()
        .map(|(index, site)| {
            let (n_measurements, n_variables) = by_source
                .get(site.source_id.as_str())
                .map_or((0, 0), |(n, vars)| (*n, vars.len()));
            let metadata_score = score_site_metadata(site);
            SiteScore {
                site,
                index,
                n_measurements,
                n_variables,
                metadata_score,
                total_score: total_score(metadata_score, n_measurements, n_variables),
            }
        })
        .filter(|s| s.total_score >= min_score)
        .collect();

    // sort_by is stable
    scores.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    scores
}

/// Rank sites and keep at most `target_count` of them.
pub fn select_tier1_sites<'a>(
    inventory: &'a SiteInventory,
    measurements: &[NitrogenMeasurement],
    parameters: &SelectionParameters,
) -> Vec<SiteScore<'a>> {
    let mut selected = rank_sites(inventory, measurements, parameters.min_score);
    selected.truncate(parameters.target_count);
    info!(
        "Selected {} tier-1 sites with score >= {}",
        selected.len(),
        parameters.min_score
    );
    selected
}

/// Reorder ranked sites so every resolved ecosystem is represented first.
///
/// Ecosystems are visited in the order they first appear in `ranked`. For each, its top
/// `min_per_ecosystem` sites are taken. All remaining sites follow in their ranked order.
/// No site is dropped or duplicated.
pub fn ensure_ecosystem_diversity<'a>(
    ranked: Vec<SiteScore<'a>>,
    min_per_ecosystem: usize,
) -> Vec<SiteScore<'a>> {
    let mut groups: Vec<(EcosystemType, Vec<usize>)> = Vec::new();
    for (position, score) in ranked.iter().enumerate() {
        let Some(ecosystem) = score.site.ecosystem_type() else {
            continue;
        };
        match groups.iter_mut().find(|(e, _)| *e == ecosystem) {
            Some((_, members)) => members.push(position),
            None => groups.push((ecosystem, vec![position])),
        }
    }

    let mut order: Vec<usize> = Vec::with_capacity(ranked.len());
    for (_, mut members) in groups {
        members.sort_by(|a, b| ranked[*b].total_score.total_cmp(&ranked[*a].total_score));
        order.extend(members.into_iter().take(min_per_ecosystem));
    }
    let guaranteed: BTreeSet<usize> = order.iter().copied().collect();
    order.extend((0..ranked.len()).filter(|p| !guaranteed.contains(p)));

    let mut slots: Vec<Option<SiteScore<'a>>> = ranked.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect()
}
