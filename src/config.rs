//! Run configuration of the `ecosim-prep` pipeline.
//!
//! Configuration is read from a TOML file. Every field has a default so a file only needs
//! to name what differs, for example:
//!
//! ```toml
//! sites_path = "data/experiment-metadata.tsv"
//! measurements_path = "data/nitrogen-measurements.tsv"
//! output_dir = "ecosim_inputs"
//!
//! [climate]
//! start_year = 2015
//! n_years = 3
//!
//! [selection]
//! target_count = 8
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use ecosim_components::climate::ClimateParameters;
use ecosim_components::grid::GridParameters;
use ecosim_components::pft_file::PftParameters;
use ecosim_components::writer::Backend;
use ecosim_core::errors::{EcosimError, EcosimResult};
use ecosim_core::loaders::TableFormat;
use ecosim_core::selection::SelectionParameters;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Table of experimental sites
    ///
    /// Default: "data/experiment-metadata.tsv"
    pub sites_path: PathBuf,
    /// Table of nitrogen measurements
    ///
    /// Default: "data/nitrogen-measurements.tsv"
    pub measurements_path: PathBuf,
    /// Directory receiving one subdirectory of files per site
    ///
    /// Default: "ecosim_inputs"
    pub output_dir: PathBuf,
    /// Number of layers of synthesised soil profiles
    ///
    /// Default: 20
    pub n_soil_layers: usize,
    /// File format of the written datasets
    ///
    /// Default: cdl
    pub backend: Backend,
    /// Layout of both input tables
    pub table: TableFormat,
    pub selection: SelectionParameters,
    pub grid: GridParameters,
    pub climate: ClimateParameters,
    pub pft: PftParameters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sites_path: PathBuf::from("data/experiment-metadata.tsv"),
            measurements_path: PathBuf::from("data/nitrogen-measurements.tsv"),
            output_dir: PathBuf::from("ecosim_inputs"),
            n_soil_layers: 20,
            backend: Backend::default(),
            table: TableFormat::default(),
            selection: SelectionParameters::default(),
            grid: GridParameters::default(),
            climate: ClimateParameters::default(),
            pft: PftParameters::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> EcosimResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EcosimError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Read a configuration file.
    ///
    /// Relative input and output paths are taken relative to the directory holding the
    /// file.
    pub fn from_path(path: impl AsRef<Path>) -> EcosimResult<Self> {
        let path = path.as_ref();
        let mut config = Self::from_toml_str(&fs::read_to_string(path)?)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            for p in [
                &mut config.sites_path,
                &mut config.measurements_path,
                &mut config.output_dir,
            ] {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        }
        Ok(config)
    }

    fn check(&self) -> EcosimResult<()> {
        if self.n_soil_layers == 0 {
            return Err(EcosimError::Config(
                "n_soil_layers must be at least 1".to_string(),
            ));
        }
        if self.climate.n_years == 0 || self.pft.n_years == 0 {
            return Err(EcosimError::Config("n_years must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.n_soil_layers, 20);
        assert_eq!(config.backend, Backend::Cdl);
        assert_eq!(config.table.delimiter, '\t');
        assert_eq!(config.climate, ClimateParameters::default());
    }

    #[test]
    fn test_partial_blocks() {
        let config = PipelineConfig::from_toml_str(
            r#"
output_dir = "out"
backend = "netcdf"

[table]
delimiter = ","

[climate]
start_year = 2015
seed = 7

[grid]
co2_ppm = 400.0
"#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.backend, Backend::Netcdf);
        assert_eq!(config.table.delimiter, ',');
        assert_eq!(config.climate.start_year, 2015);
        assert_eq!(config.climate.seed, Some(7));
        assert_eq!(config.climate.n_years, 2);
        assert_eq!(config.grid.co2_ppm, 400.0);
        assert_eq!(config.grid.ksat_mm_h, 50.0);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            PipelineConfig::from_toml_str("n_soil_layers = 0"),
            Err(EcosimError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("backend = \"hdf4\""),
            Err(EcosimError::Config(_))
        ));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = PipelineConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.sites_path, config.sites_path);
        assert_eq!(parsed.selection, config.selection);
    }

    #[test]
    fn test_paths_relative_to_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "sites_path = \"sites.tsv\"\noutput_dir = \"/tmp/out\"\n").unwrap();

        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.sites_path, dir.path().join("sites.tsv"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }
}
