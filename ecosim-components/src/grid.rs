//! Grid and soil file builder.
//!
//! One grid cell with one topographic unit. Per-layer soil arrays come straight from the
//! [`SoilProfile`], atmospheric composition and hydraulic properties are constants from
//! [`GridParameters`].

use log::info;
use ndarray::{Array, Array1, ArrayD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::schema::*;
use crate::soil::{SoilLayer, SoilProfile};
use crate::writer::DatasetWriter;
use ecosim_core::dataset::Dataset;
use ecosim_core::errors::{EcosimError, EcosimResult};
use ecosim_core::site::ExperimentalSite;

/// Constants written into the grid file.
///
/// The hydraulic properties are placeholders applied to every layer, not measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParameters {
    /// Atmospheric CO2
    ///
    /// Default: 420.0 ppm
    pub co2_ppm: f64,
    /// Atmospheric N2
    ///
    /// Default: 780840.0 ppm
    pub n2_ppm: f64,
    /// Atmospheric N2O
    ///
    /// Default: 0.33 ppm
    pub n2o_ppm: f64,
    /// Atmospheric O2
    ///
    /// Default: 209460.0 ppm
    pub o2_ppm: f64,
    /// Atmospheric CH4
    ///
    /// Default: 1.9 ppm
    pub ch4_ppm: f64,
    /// Atmospheric NH3
    ///
    /// Default: 0.01 ppm
    pub nh3_ppm: f64,
    /// Field capacity of every layer
    ///
    /// Default: 0.35 m3 m-3
    pub field_capacity: f64,
    /// Wilting point of every layer
    ///
    /// Default: 0.15 m3 m-3
    pub wilting_point: f64,
    /// Saturated vertical hydraulic conductivity of every layer
    ///
    /// Default: 50.0 mm h-1
    pub ksat_mm_h: f64,
    /// Deepest layer roots can reach, capped at the profile length
    ///
    /// Default: 10
    pub max_rooting_layer: usize,
}

impl Default for GridParameters {
    fn default() -> Self {
        Self {
            co2_ppm: 420.0,
            n2_ppm: 780840.0,  // 78.084 %
            n2o_ppm: 0.33,
            o2_ppm: 209460.0,  // 20.946 %
            ch4_ppm: 1.9,
            nh3_ppm: 0.01,
            field_capacity: 0.35,
            wilting_point: 0.15,
            ksat_mm_h: 50.0,
            max_rooting_layer: 10,
        }
    }
}

fn single(value: f64) -> ArrayD<f64> {
    Array1::from_vec(vec![value]).into_dyn()
}

fn per_layer(profile: &SoilProfile, value: impl Fn(&SoilLayer) -> f64) -> ArrayD<f64> {
    let layers = profile.layers();
    Array::from_shape_fn((1, layers.len()), |(_, j)| value(&layers[j])).into_dyn()
}

/// Build the grid dataset of a site.
///
/// Fails with [`EcosimError::EmptyProfile`] if the profile has no layers.
pub fn build_grid_dataset(
    site: &ExperimentalSite,
    profile: &SoilProfile,
    parameters: &GridParameters,
) -> EcosimResult<Dataset> {
    let nlevs = profile.n_layers();
    if nlevs == 0 {
        return Err(EcosimError::EmptyProfile {
            site: site.source_id.clone(),
        });
    }

    let mut ds = Dataset::new();
    ds.add_coordinate("ngrid", index_coordinate(1), &[])?;
    ds.add_coordinate("ntopou", index_coordinate(1), &[])?;
    ds.add_coordinate("nlevs", index_coordinate(nlevs), &[])?;
    ds.add_coordinate("ncol", index_coordinate(1), &[])?;
    ds.add_coordinate("nrow", index_coordinate(1), &[])?;

    ds.add_variable(VAR_ALATG.build(single(profile.latitude)))?;
    ds.add_variable(VAR_ALTIG.build(single(profile.altitude_m)))?;
    ds.add_variable(VAR_ATCAG.build(single(profile.mean_annual_temp_c)))?;
    ds.add_variable(VAR_CO2EIG.build(single(parameters.co2_ppm)))?;
    ds.add_variable(VAR_Z2GEG.build(single(parameters.n2_ppm)))?;
    ds.add_variable(VAR_Z2OEG.build(single(parameters.n2o_ppm)))?;
    ds.add_variable(VAR_OXYEG.build(single(parameters.o2_ppm)))?;
    ds.add_variable(VAR_CH4EG.build(single(parameters.ch4_ppm)))?;
    ds.add_variable(VAR_ZNH3EG.build(single(parameters.nh3_ppm)))?;

    let rooting = i8::try_from(parameters.max_rooting_layer.min(nlevs)).unwrap_or(i8::MAX);
    ds.add_variable(VAR_TOPO_GRID.build(index_coordinate(1)))?;
    ds.add_variable(VAR_NUI.build(Array1::from_vec(vec![1_i8]).into_dyn()))?;
    ds.add_variable(VAR_NJ.build(Array1::from_vec(vec![rooting]).into_dyn()))?;

    ds.add_variable(VAR_CDPTH.build(per_layer(profile, |l| l.depth_m)))?;
    ds.add_variable(VAR_BKDSI.build(per_layer(profile, |l| l.bulk_density_mg_m3)))?;
    ds.add_variable(VAR_CSAND.build(per_layer(profile, |l| l.sand_kg_mg)))?;
    ds.add_variable(VAR_CSILT.build(per_layer(profile, |l| l.silt_kg_mg)))?;
    ds.add_variable(VAR_PH.build(per_layer(profile, |l| l.ph)))?;
    ds.add_variable(VAR_CORGC.build(per_layer(profile, |l| l.organic_c_kg_mg)))?;
    ds.add_variable(VAR_CORGN.build(per_layer(profile, |l| l.organic_n_g_mg)))?;
    ds.add_variable(VAR_CNH4.build(per_layer(profile, |l| l.nh4_g_mg)))?;
    ds.add_variable(VAR_CNO3.build(per_layer(profile, |l| l.no3_g_mg)))?;
    ds.add_variable(VAR_FC.build(per_layer(profile, |_| parameters.field_capacity)))?;
    ds.add_variable(VAR_WP.build(per_layer(profile, |_| parameters.wilting_point)))?;
    ds.add_variable(VAR_SCNV.build(per_layer(profile, |_| parameters.ksat_mm_h)))?;

    ds.set_attribute("title", format!("EcoSIM grid file for {}", site.source_id));
    ds.set_attribute("source", "Generated by ecosim-prep");
    ds.set_attribute("ecosystem", site.ecosystem.raw.as_str());
    ds.set_attribute("soil_properties", profile.provenance.as_str());
    ds.set_attribute(
        "warming_treatment_c",
        site.temperature_increase_c.unwrap_or(0.0),
    );

    validate_grid_schema(&ds)?;
    Ok(ds)
}

/// Build the grid dataset of a site and write it to `output_path`.
///
/// Nothing is written if building fails.
pub fn create_grid_file(
    site: &ExperimentalSite,
    profile: &SoilProfile,
    parameters: &GridParameters,
    writer: &dyn DatasetWriter,
    output_path: &Path,
) -> EcosimResult<PathBuf> {
    let ds = build_grid_dataset(site, profile, parameters)?;
    writer.write(&ds, output_path)?;
    info!(
        "Created grid file {} with {} soil layers",
        output_path.display(),
        profile.n_layers()
    );
    Ok(output_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soil::{synthesize, SoilProvenance};
    use ecosim_core::dataset::VariableData;
    use ecosim_core::site::{Coordinates, EcosystemType};

    fn site() -> ExperimentalSite {
        ExperimentalSite::new("Natali 2011")
            .with_coordinates(Coordinates::new(63.9, -149.2))
            .with_ecosystem("moist acidic tundra")
            .with_temperature_increase(Some(1.5))
    }

    #[test]
    fn test_depths_match_profile() {
        let site = site();
        let profile = synthesize(site.ecosystem_type(), &site, 20).unwrap();
        let ds = build_grid_dataset(&site, &profile, &GridParameters::default()).unwrap();

        assert_eq!(ds.dimension_len("nlevs"), Some(20));
        let cdpth = ds.variable("CDPTH").unwrap().data.as_double().unwrap();
        assert_eq!(cdpth.shape(), &[1, 20]);
        assert_eq!(cdpth.iter().copied().collect::<Vec<f64>>(), profile.depths());
    }

    #[test]
    fn test_scalars_and_attributes() {
        let site = site();
        let profile = synthesize(Some(EcosystemType::Tundra), &site, 5).unwrap();
        let ds = build_grid_dataset(&site, &profile, &GridParameters::default()).unwrap();

        let alatg = ds.variable("ALATG").unwrap();
        assert_eq!(alatg.data.as_double().unwrap()[[0]], 63.9);
        assert_eq!(alatg.units(), Some("degrees north"));
        assert_eq!(
            ds.variable("CO2EIG").unwrap().data.as_double().unwrap()[[0]],
            420.0
        );
        assert_eq!(ds.variable("FC").unwrap().fill_value(), Some(SOIL_FILL_VALUE));
        assert!(ds
            .variable("SCNV")
            .unwrap()
            .data
            .as_double()
            .unwrap()
            .iter()
            .all(|v| *v == 50.0));

        assert_eq!(
            ds.attribute("ecosystem").and_then(|a| a.as_text()),
            Some("moist acidic tundra")
        );
        assert_eq!(
            ds.attribute("soil_properties").and_then(|a| a.as_text()),
            Some("ecosystem default")
        );
        assert_eq!(
            ds.attribute("warming_treatment_c").and_then(|a| a.as_f64()),
            Some(1.5)
        );
    }

    #[test]
    fn test_rooting_layer_capped_by_profile() {
        let site = site();
        let shallow = synthesize(None, &site, 4).unwrap();
        let ds = build_grid_dataset(&site, &shallow, &GridParameters::default()).unwrap();
        let nj = &ds.variable("NJ").unwrap().data;
        assert_eq!(nj.type_name(), "byte");
        assert_eq!(*nj, VariableData::Byte(Array1::from_vec(vec![4_i8]).into_dyn()));

        let deep = synthesize(None, &site, 20).unwrap();
        let ds = build_grid_dataset(&site, &deep, &GridParameters::default()).unwrap();
        assert_eq!(
            ds.variable("NJ").unwrap().data,
            VariableData::Byte(Array1::from_vec(vec![10_i8]).into_dyn())
        );
    }

    #[test]
    fn test_empty_profile_rejected() {
        // profiles can only be empty when deserialized from elsewhere
        let mut json = serde_json::to_value(
            SoilProfile::new(
                "x",
                vec![SoilLayer::from_baseline(&crate::soil::FOREST_SOIL, 0.1)],
                SoilProvenance::Measured,
            )
            .unwrap(),
        )
        .unwrap();
        json["layers"] = serde_json::json!([]);
        let profile: SoilProfile = serde_json::from_value(json).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_grid.cdl");
        let result = create_grid_file(
            &site(),
            &profile,
            &GridParameters::default(),
            &crate::writer::CdlWriter,
            &path,
        );
        assert!(matches!(result, Err(EcosimError::EmptyProfile { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_parameters_from_partial_config() {
        let parameters: GridParameters =
            serde_json::from_str(r#"{"co2_ppm": 280.0}"#).unwrap();
        assert_eq!(parameters.co2_ppm, 280.0);
        assert_eq!(parameters.ksat_mm_h, 50.0);
    }
}
