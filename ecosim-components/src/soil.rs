//! Layered soil profiles for the grid file.
//!
//! When no measured soil data is available for a site, a profile is synthesised from a
//! per-ecosystem baseline. The baselines and the depth adjustments are literature-style
//! defaults, not measurements; generated profiles are marked as such.
//!
//! Layer `i` ends at depth:
//!
//! | layers | depth to bottom (m) |
//! |---|---|
//! | 0 | 0.05 |
//! | 1 to 4 | 0.05 + 0.05·i |
//! | 5 to 9 | 0.30 + 0.10·(i − 5) |
//! | 10 and below | 0.80 + 0.20·(i − 10) |
//!
//! Within a layer at depth `d`, organic matter and mineral nitrogen are scaled by
//! $e^{-d/0.3}$, bulk density by $1 + 0.2d$ and pH is raised by $0.5d$.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use ecosim_core::errors::{EcosimError, EcosimResult};
use ecosim_core::site::{EcosystemType, ExperimentalSite};

/// Default number of layers in a synthesised profile.
pub const DEFAULT_N_LAYERS: usize = 20;

/// E-folding depth, in metres, of organic matter and mineral nitrogen.
const DECAY_DEPTH_M: f64 = 0.3;

/// Default mean annual temperature recorded on a profile, in °C.
pub const DEFAULT_MEAN_ANNUAL_TEMP_C: f64 = 10.0;

/// Where a profile's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoilProvenance {
    /// Ecosystem defaults, not measured
    EcosystemDefault,
    /// Returned by a soil database
    Measured,
}

impl SoilProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoilProvenance::EcosystemDefault => "ecosystem default",
            SoilProvenance::Measured => "measured",
        }
    }
}

/// Surface soil properties of one ecosystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilBaseline {
    /// unit: Mg m-3
    pub bulk_density: f64,
    /// unit: kg Mg-1
    pub sand: f64,
    /// unit: kg Mg-1
    pub silt: f64,
    /// unit: kg Mg-1
    pub clay: f64,
    pub ph: f64,
    /// unit: kg C Mg-1
    pub organic_c: f64,
    /// unit: g N Mg-1
    pub organic_n: f64,
    /// unit: g N Mg-1
    pub nh4: f64,
    /// unit: g N Mg-1
    pub no3: f64,
}

impl SoilBaseline {
    const fn new(values: [f64; 9]) -> Self {
        Self {
            bulk_density: values[0],
            sand: values[1],
            silt: values[2],
            clay: values[3],
            ph: values[4],
            organic_c: values[5],
            organic_n: values[6],
            nh4: values[7],
            no3: values[8],
        }
    }

    /// Baseline of an ecosystem, falling back to forest for anything unmapped.
    pub fn for_ecosystem(ecosystem: Option<EcosystemType>) -> &'static SoilBaseline {
        match ecosystem {
            Some(EcosystemType::Tundra) => &TUNDRA_SOIL,
            Some(EcosystemType::Forest) | None => &FOREST_SOIL,
            Some(EcosystemType::ShrubHeathland) => &SHRUB_SOIL,
            Some(EcosystemType::GrasslandMeadowPrairie) => &GRASSLAND_SOIL,
            Some(EcosystemType::Cropland) => &CROPLAND_SOIL,
            Some(EcosystemType::Peat) => &PEAT_SOIL,
        }
    }
}

//                                       bd    sand   silt   clay   pH   org C  org N  NH4  NO3
// Organic-rich, low density
pub static TUNDRA_SOIL: SoilBaseline = SoilBaseline::new([0.8, 400.0, 400.0, 200.0, 5.0, 150.0, 8.0, 2.0, 1.0]);
pub static FOREST_SOIL: SoilBaseline = SoilBaseline::new([1.2, 450.0, 350.0, 200.0, 5.5, 80.0, 4.5, 1.5, 2.0]);
pub static SHRUB_SOIL: SoilBaseline = SoilBaseline::new([1.0, 500.0, 300.0, 200.0, 5.2, 100.0, 5.5, 1.8, 1.5]);
pub static GRASSLAND_SOIL: SoilBaseline = SoilBaseline::new([1.3, 400.0, 400.0, 200.0, 6.5, 60.0, 4.0, 1.2, 2.5]);
// Fertilised
pub static CROPLAND_SOIL: SoilBaseline = SoilBaseline::new([1.4, 450.0, 350.0, 200.0, 6.8, 30.0, 2.5, 3.0, 5.0]);
pub static PEAT_SOIL: SoilBaseline = SoilBaseline::new([0.5, 200.0, 300.0, 500.0, 4.5, 400.0, 20.0, 2.5, 0.5]);

/// One soil layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilLayer {
    /// Depth to the bottom of the layer
    /// unit: m
    pub depth_m: f64,
    /// unit: Mg m-3
    pub bulk_density_mg_m3: f64,
    /// unit: kg Mg-1
    pub sand_kg_mg: f64,
    /// unit: kg Mg-1
    pub silt_kg_mg: f64,
    /// unit: kg Mg-1
    pub clay_kg_mg: f64,
    pub ph: f64,
    /// unit: kg C Mg-1
    pub organic_c_kg_mg: f64,
    /// unit: g N Mg-1
    pub organic_n_g_mg: f64,
    /// unit: g N Mg-1
    pub nh4_g_mg: f64,
    /// unit: g N Mg-1
    pub no3_g_mg: f64,
}

impl SoilLayer {
    /// Apply the depth adjustments to a baseline.
    pub fn from_baseline(baseline: &SoilBaseline, depth_m: f64) -> Self {
        let decay = (-depth_m / DECAY_DEPTH_M).exp();
        Self {
            depth_m,
            bulk_density_mg_m3: baseline.bulk_density * (1.0 + depth_m * 0.2),
            sand_kg_mg: baseline.sand,
            silt_kg_mg: baseline.silt,
            clay_kg_mg: baseline.clay,
            ph: baseline.ph + depth_m * 0.5,
            organic_c_kg_mg: baseline.organic_c * decay,
            organic_n_g_mg: baseline.organic_n * decay,
            nh4_g_mg: baseline.nh4 * decay,
            no3_g_mg: baseline.no3 * decay,
        }
    }
}

/// Depth to the bottom of layer `index`, in metres.
pub fn layer_depth(index: usize) -> f64 {
    // nearest doubles to the decimal depths
    match index {
        0..=4 => (index + 1) as f64 / 20.0,
        5..=9 => (index - 2) as f64 / 10.0,
        _ => (index - 6) as f64 / 5.0,
    }
}

/// Soil layers of one site, shallow to deep.
///
/// The layer list is fixed at construction and depths are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilProfile {
    layers: Vec<SoilLayer>,
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub mean_annual_temp_c: f64,
    pub provenance: SoilProvenance,
}

impl SoilProfile {
    /// Build a profile, checking that there is at least one layer and that depths increase.
    pub fn new(
        site_name: impl Into<String>,
        layers: Vec<SoilLayer>,
        provenance: SoilProvenance,
    ) -> EcosimResult<Self> {
        let site_name = site_name.into();
        if layers.is_empty() {
            return Err(EcosimError::EmptyProfile { site: site_name });
        }
        for (index, pair) in layers.windows(2).enumerate() {
            if pair[1].depth_m <= pair[0].depth_m {
                return Err(EcosimError::NonIncreasingDepth {
                    index: index + 1,
                    depth: pair[1].depth_m,
                });
            }
        }
        Ok(Self {
            layers,
            site_name,
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: 0.0,
            mean_annual_temp_c: DEFAULT_MEAN_ANNUAL_TEMP_C,
            provenance,
        })
    }

    /// Copy location from a site. Missing coordinates or altitude read as zero.
    pub fn located_at(mut self, site: &ExperimentalSite) -> Self {
        if let Some(coordinates) = site.coordinates {
            self.latitude = coordinates.latitude();
            self.longitude = coordinates.longitude();
            self.altitude_m = coordinates.altitude().unwrap_or(0.0);
        }
        self
    }

    pub fn layers(&self) -> &[SoilLayer] {
        &self.layers
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Layer depths in order.
    pub fn depths(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.depth_m).collect()
    }
}

/// Synthesise an `n_layers` profile for a site from its ecosystem's defaults.
///
/// `None` and any unmapped ecosystem use the forest baseline.
///
/// ```rust
/// use ecosim_components::soil::synthesize;
/// use ecosim_core::site::{EcosystemType, ExperimentalSite};
///
/// let site = ExperimentalSite::new("Test");
/// let profile = synthesize(Some(EcosystemType::Forest), &site, 20).unwrap();
/// assert_eq!(profile.n_layers(), 20);
/// assert_eq!(profile.layers()[0].depth_m, 0.05);
/// ```
pub fn synthesize(
    ecosystem: Option<EcosystemType>,
    site: &ExperimentalSite,
    n_layers: usize,
) -> EcosimResult<SoilProfile> {
    let baseline = SoilBaseline::for_ecosystem(ecosystem);
    let layers = (0..n_layers)
        .map(|i| SoilLayer::from_baseline(baseline, layer_depth(i)))
        .collect();
    debug!(
        "Synthesising {n_layers}-layer soil profile for {} from {} defaults",
        site.source_id,
        ecosystem.map_or("forest", |e| e.as_str())
    );
    Ok(SoilProfile::new(&site.source_id, layers, SoilProvenance::EcosystemDefault)?.located_at(site))
}

/// Provider of measured soil profiles, such as a soil database lookup.
pub trait SoilSource {
    /// Profile at the site's location, or `None` when the source has no data there.
    fn profile_for(&self, site: &ExperimentalSite) -> EcosimResult<Option<SoilProfile>>;
}

/// Profile for a site: the source's data when it has any, ecosystem defaults otherwise.
///
/// Sites without a resolved ecosystem fall back to grassland defaults.
pub fn resolve_profile(
    source: Option<&dyn SoilSource>,
    site: &ExperimentalSite,
    n_layers: usize,
) -> EcosimResult<SoilProfile> {
    if let Some(source) = source {
        if let Some(profile) = source.profile_for(site)? {
            info!("Using measured soil profile for {}", site.source_id);
            return Ok(profile);
        }
    }
    let ecosystem = site
        .ecosystem_type()
        .unwrap_or(EcosystemType::GrasslandMeadowPrairie);
    synthesize(Some(ecosystem), site, n_layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_core::site::Coordinates;
    use is_close::is_close;

    #[test]
    fn test_depth_schedule() {
        let depths: Vec<f64> = (0..12).map(layer_depth).collect();
        let expected = [
            0.05, 0.10, 0.15, 0.20, 0.25, 0.30, 0.40, 0.50, 0.60, 0.70, 0.80, 1.00,
        ];
        assert_eq!(depths, expected);
        assert_eq!(layer_depth(19), 2.6);
    }

    #[test]
    fn test_every_ecosystem_profile_is_well_formed() {
        let site = ExperimentalSite::new("Test");
        for ecosystem in EcosystemType::ALL {
            let profile = synthesize(Some(ecosystem), &site, DEFAULT_N_LAYERS).unwrap();
            assert_eq!(profile.n_layers(), DEFAULT_N_LAYERS);
            for pair in profile.layers().windows(2) {
                assert!(pair[1].depth_m > pair[0].depth_m, "{ecosystem}");
                assert!(pair[1].organic_c_kg_mg <= pair[0].organic_c_kg_mg, "{ecosystem}");
            }
        }
    }

    #[test]
    fn test_depth_adjustments() {
        let site = ExperimentalSite::new("Test");
        let profile = synthesize(Some(EcosystemType::Tundra), &site, 20).unwrap();
        let top = &profile.layers()[0];
        assert!(is_close!(top.bulk_density_mg_m3, 0.8 * 1.01));
        assert!(is_close!(top.ph, 5.025));
        assert!(is_close!(top.organic_c_kg_mg, 150.0 * (-0.05_f64 / 0.3).exp()));
        assert_eq!(top.sand_kg_mg, 400.0);
    }

    #[test]
    fn test_unresolved_ecosystem_uses_forest() {
        let site = ExperimentalSite::new("Test");
        let a = synthesize(None, &site, 5).unwrap();
        let b = synthesize(Some(EcosystemType::Forest), &site, 5).unwrap();
        assert_eq!(a.layers(), b.layers());
        assert_eq!(a.provenance, SoilProvenance::EcosystemDefault);
    }

    #[test]
    fn test_location_copied_from_site() {
        let site = ExperimentalSite::new("Test").with_coordinates(
            Coordinates::new(45.0, -120.0).map(|c| c.with_altitude(Some(350.0))),
        );
        let profile = synthesize(Some(EcosystemType::Forest), &site, 3).unwrap();
        assert_eq!(profile.latitude, 45.0);
        assert_eq!(profile.longitude, -120.0);
        assert_eq!(profile.altitude_m, 350.0);
        assert_eq!(profile.mean_annual_temp_c, 10.0);

        let bare = synthesize(None, &ExperimentalSite::new("x"), 3).unwrap();
        assert_eq!((bare.latitude, bare.altitude_m), (0.0, 0.0));
    }

    #[test]
    fn test_invalid_profiles() {
        assert!(matches!(
            synthesize(None, &ExperimentalSite::new("x"), 0),
            Err(EcosimError::EmptyProfile { .. })
        ));

        let baseline = SoilBaseline::for_ecosystem(None);
        let layers = vec![
            SoilLayer::from_baseline(baseline, 0.1),
            SoilLayer::from_baseline(baseline, 0.1),
        ];
        assert!(matches!(
            SoilProfile::new("x", layers, SoilProvenance::Measured),
            Err(EcosimError::NonIncreasingDepth { index: 1, .. })
        ));
    }

    struct FixedSource(Option<SoilProfile>);

    impl SoilSource for FixedSource {
        fn profile_for(&self, _site: &ExperimentalSite) -> EcosimResult<Option<SoilProfile>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_resolve_prefers_source() {
        let site = ExperimentalSite::new("Test");
        let measured = SoilProfile::new(
            "Test",
            vec![SoilLayer::from_baseline(&PEAT_SOIL, 0.2)],
            SoilProvenance::Measured,
        )
        .unwrap();

        let source = FixedSource(Some(measured.clone()));
        assert_eq!(resolve_profile(Some(&source), &site, 20).unwrap(), measured);

        let empty = FixedSource(None);
        let fallback = resolve_profile(Some(&empty), &site, 20).unwrap();
        assert_eq!(fallback.n_layers(), 20);
        // no ecosystem means grassland defaults
        assert_eq!(fallback.layers()[0].sand_kg_mg, GRASSLAND_SOIL.sand);
        assert_eq!(fallback.layers()[0].ph, GRASSLAND_SOIL.ph + 0.025);
    }
}
