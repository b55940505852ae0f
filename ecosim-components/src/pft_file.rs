//! Plant functional type file builder.
//!
//! Each site gets a single PFT on a single topographic unit, planted as natural vegetation
//! with no management events. Text fields are fixed-width character arrays.

use log::info;
use ndarray::{arr0, Array, Array1, ArrayD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pft::PftCode;
use crate::schema::*;
use crate::writer::DatasetWriter;
use ecosim_core::dataset::{Dataset, FixedBytes};
use ecosim_core::errors::EcosimResult;
use ecosim_core::site::ExperimentalSite;

/// Meaning of the `pft_dflag` values.
const PFT_DFLAG_FLAGS: &str =
    "-1 no pft data, 0 only plantation information, 1 transient pft data";

/// Layout of the PFT file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PftParameters {
    /// Number of years
    ///
    /// Default: 2
    pub n_years: usize,
    /// Width of the PFT code field
    ///
    /// Default: 50
    pub nchar1: usize,
    /// Width of the planting and management text fields
    ///
    /// Default: 200
    pub ncharmgnt: usize,
}

impl Default for PftParameters {
    fn default() -> Self {
        Self {
            n_years: 2,
            nchar1: 50,
            ncharmgnt: 200,
        }
    }
}

fn one_i32(value: i32) -> ArrayD<i32> {
    Array1::from_vec(vec![value]).into_dyn()
}

/// Build the PFT dataset of a site.
pub fn build_pft_dataset(
    site: &ExperimentalSite,
    pft: &PftCode,
    parameters: &PftParameters,
) -> EcosimResult<Dataset> {
    let n_years = parameters.n_years;
    let (ntopou, maxpfts, maxpmgt) = (1, 1, 1);

    let mut ds = Dataset::new();
    ds.add_coordinate("year", index_coordinate(n_years), &[])?;
    ds.add_coordinate("ntopou", index_coordinate(ntopou), &[])?;
    ds.add_coordinate("maxpfts", index_coordinate(maxpfts), &[])?;
    ds.add_coordinate("maxpmgt", index_coordinate(maxpmgt), &[])?;
    ds.add_coordinate("nchar1", index_coordinate(parameters.nchar1), &[])?;
    ds.add_coordinate("ncharmgnt", index_coordinate(parameters.ncharmgnt), &[])?;

    // the topo unit covers the single grid cell
    for var in [&VAR_NH1, &VAR_NH2, &VAR_NV1, &VAR_NV2, &VAR_NZ] {
        ds.add_variable(var.build(one_i32(1)))?;
    }
    ds.add_variable(
        VAR_PFT_DFLAG
            .build(arr0(0_i32).into_dyn())
            .with_attribute("flags", PFT_DFLAG_FLAGS),
    )?;

    let leading = [n_years, ntopou, maxpfts];
    let pft_type = FixedBytes::new(pft.code, parameters.nchar1);
    ds.add_variable(VAR_PFT_TYPE.build(pft_type.broadcast(&leading)))?;
    let planting = FixedBytes::new(&pft.planting_info(), parameters.ncharmgnt);
    ds.add_variable(VAR_PFT_PLTINFO.build(planting.broadcast(&leading)))?;

    ds.add_variable(VAR_NMGNTS.build(Array::<i16, _>::zeros(leading.as_slice()).into_dyn()))?;
    ds.add_variable(VAR_PFT_MGMT.build(
        Array::<u8, _>::zeros(
            [n_years, ntopou, maxpfts, maxpmgt, parameters.ncharmgnt].as_slice(),
        )
        .into_dyn(),
    ))?;

    ds.set_attribute("title", format!("EcoSIM PFT file for {}", site.source_id));
    ds.set_attribute("source", "Generated by ecosim-prep");
    ds.set_attribute("pft_code", pft.code);
    ds.set_attribute("pft_name", pft.name);
    ds.set_attribute("ecosystem", site.ecosystem.raw.as_str());

    validate_pft_schema(&ds)?;
    Ok(ds)
}

/// Build the PFT dataset of a site and write it to `output_path`.
pub fn create_pft_file(
    site: &ExperimentalSite,
    pft: &PftCode,
    parameters: &PftParameters,
    writer: &dyn DatasetWriter,
    output_path: &Path,
) -> EcosimResult<PathBuf> {
    let ds = build_pft_dataset(site, pft, parameters)?;
    writer.write(&ds, output_path)?;
    info!("Created PFT file {} for {pft}", output_path.display());
    Ok(output_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pft::{map_ecosystem_to_pft, PFT_FOREST};

    #[test]
    fn test_character_fields() {
        let site = ExperimentalSite::new("Rustad 2000").with_ecosystem("spruce-fir forest");
        let pft = map_ecosystem_to_pft(site.ecosystem_type());
        let ds = build_pft_dataset(&site, pft, &PftParameters::default()).unwrap();

        let pft_type = ds.variable("pft_type").unwrap().data.as_char().unwrap();
        assert_eq!(pft_type.shape(), &[2, 1, 1, 50]);
        for year in 0..2 {
            assert_eq!(pft_type[[year, 0, 0, 0]], b'D');
            assert_eq!(pft_type[[year, 0, 0, 2]], b'F');
            assert_eq!(pft_type[[year, 0, 0, 3]], b' ');
        }

        let pltinfo = ds.variable("pft_pltinfo").unwrap().data.as_char().unwrap();
        assert_eq!(pltinfo.shape(), &[2, 1, 1, 200]);
        let row: Vec<u8> = pltinfo.iter().take(200).copied().collect();
        assert_eq!(
            String::from_utf8(row).unwrap().trim_end(),
            "Natural deciduous broadleaf forest vegetation"
        );

        assert_eq!(
            ds.attribute("pft_code").and_then(|a| a.as_text()),
            Some("DBF")
        );
        assert_eq!(
            ds.attribute("ecosystem").and_then(|a| a.as_text()),
            Some("spruce-fir forest")
        );
    }

    #[test]
    fn test_no_management() {
        let site = ExperimentalSite::new("x");
        let ds = build_pft_dataset(&site, &PFT_FOREST, &PftParameters::default()).unwrap();

        let nmgnts = &ds.variable("nmgnts").unwrap().data;
        assert_eq!(nmgnts.type_name(), "short");
        assert_eq!(nmgnts.shape(), &[2, 1, 1]);

        let mgmt = ds.variable("pft_mgmt").unwrap().data.as_char().unwrap();
        assert_eq!(mgmt.shape(), &[2, 1, 1, 1, 200]);
        assert!(mgmt.iter().all(|b| *b == 0));

        let flag = ds.variable("pft_dflag").unwrap();
        assert!(flag.dimensions.is_empty());
        assert_eq!(flag.data.as_int().unwrap().iter().next(), Some(&0));
    }

    #[test]
    fn test_narrow_code_field_truncates() {
        let parameters = PftParameters {
            n_years: 1,
            nchar1: 2,
            ..PftParameters::default()
        };
        let ds = build_pft_dataset(&ExperimentalSite::new("x"), &PFT_FOREST, &parameters).unwrap();
        let pft_type = ds.variable("pft_type").unwrap().data.as_char().unwrap();
        assert_eq!(pft_type.iter().copied().collect::<Vec<u8>>(), b"DB".to_vec());
    }
}
