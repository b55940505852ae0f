//! Assembly of the EcoSIM file set for selected experimental sites.
//!
//! Each site gets its own directory under the configured output directory holding a grid
//! file, a control and a treatment climate file and a PFT file.

use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use ecosim_components::climate::{climate_from_reanalysis, create_climate_file};
use ecosim_components::grid::create_grid_file;
use ecosim_components::pft::map_ecosystem_to_pft;
use ecosim_components::pft_file::create_pft_file;
use ecosim_components::soil::{resolve_profile, SoilSource};
use ecosim_components::warming::{apply_warming_treatment, temperature_offset};
use ecosim_components::writer::{writer_for, DatasetWriter};
use ecosim_core::dataset::Dataset;
use ecosim_core::era5::{ERA5Request, ReanalysisSource};
use ecosim_core::errors::EcosimResult;
use ecosim_core::loaders::{load_measurements_from_path, load_sites_from_path};
use ecosim_core::selection::{ensure_ecosystem_diversity, select_tier1_sites};
use ecosim_core::site::ExperimentalSite;

/// External data used in place of synthetic values when available.
#[derive(Clone, Copy, Default)]
pub struct Providers<'a> {
    pub soil: Option<&'a dyn SoilSource>,
    pub reanalysis: Option<&'a dyn ReanalysisSource>,
}

/// Paths of the files written for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFiles {
    pub source_id: String,
    pub pft_code: &'static str,
    pub grid: PathBuf,
    pub climate_control: PathBuf,
    pub climate_treatment: PathBuf,
    pub pft: PathBuf,
}

impl GeneratedFiles {
    pub fn paths(&self) -> [&PathBuf; 4] {
        [
            &self.grid,
            &self.climate_control,
            &self.climate_treatment,
            &self.pft,
        ]
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub n_sites_loaded: usize,
    pub n_sites_rejected: usize,
    pub n_measurements: usize,
    /// Selected sites in generation order
    pub selected: Vec<String>,
    /// Selected sites without coordinates, for which nothing was written
    pub skipped: Vec<String>,
    pub generated: Vec<GeneratedFiles>,
}

/// Short file-name stem of a site.
///
/// The first word of the citation with any dots removed, so "Natali et al. 2011" becomes
/// "Natali".
pub fn site_file_stem(site: &ExperimentalSite) -> String {
    let stem: String = site
        .source_id
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| *c != '.')
        .collect();
    if stem.is_empty() {
        "site".to_string()
    } else {
        stem
    }
}

fn year_span(climate: &Dataset) -> Option<(i32, i32)> {
    let years = climate.variable("year")?.data.as_int()?;
    Some((*years.iter().next()?, *years.iter().last()?))
}

/// Write control and treatment climate files converted from reanalysis data.
///
/// Returns `None` if the site lacks what a reanalysis request needs.
fn write_reanalysis_climate(
    source: &dyn ReanalysisSource,
    site: &ExperimentalSite,
    stem: &str,
    dir: &Path,
    config: &PipelineConfig,
    writer: &dyn DatasetWriter,
) -> EcosimResult<Option<(PathBuf, PathBuf)>> {
    let Some(request) = ERA5Request::from_site(site, dir, config.climate.start_year) else {
        return Ok(None);
    };
    let reanalysis = source.fetch(&request)?;
    let control = climate_from_reanalysis(&reanalysis, &site.source_id, &config.climate)?;
    let treatment = match temperature_offset(site, true) {
        Some(offset) => climate_from_reanalysis(
            &apply_warming_treatment(&reanalysis, offset)?,
            &site.source_id,
            &config.climate,
        )?,
        None => control.clone(),
    };

    let (y0, y1) = year_span(&control).unwrap_or((
        config.climate.start_year,
        config.climate.end_year(),
    ));
    let control_path = writer.output_path(dir, &format!("{stem}_clim_{y0}-{y1}_control"));
    let treatment_path = writer.output_path(dir, &format!("{stem}_clim_{y0}-{y1}_treatment"));
    writer.write(&control, &control_path)?;
    writer.write(&treatment, &treatment_path)?;
    info!(
        "Created reanalysis climate files {} and {}",
        control_path.display(),
        treatment_path.display()
    );
    Ok(Some((control_path, treatment_path)))
}

/// Write the full file set of one site.
///
/// Soil comes from the soil provider when it has data for the site and is synthesised
/// otherwise. Climate comes from the reanalysis provider when one is given and the site
/// has coordinates and a warming duration, and is synthetic otherwise.
pub fn generate_site_files(
    site: &ExperimentalSite,
    config: &PipelineConfig,
    writer: &dyn DatasetWriter,
    providers: Providers<'_>,
) -> EcosimResult<GeneratedFiles> {
    let stem = site_file_stem(site);
    let dir = config.output_dir.join(&stem);
    info!("Generating EcoSIM inputs for {} in {}", site.source_id, dir.display());

    let profile = resolve_profile(providers.soil, site, config.n_soil_layers)?;
    let grid = create_grid_file(
        site,
        &profile,
        &config.grid,
        writer,
        &writer.output_path(&dir, &format!("{stem}_grid")),
    )?;

    let reanalysis = match providers.reanalysis {
        Some(source) => write_reanalysis_climate(source, site, &stem, &dir, config, writer)?,
        None => None,
    };
    let (climate_control, climate_treatment) = match reanalysis {
        Some(paths) => paths,
        None => {
            let years = format!("{}-{}", config.climate.start_year, config.climate.end_year());
            let control = create_climate_file(
                site,
                &config.climate,
                false,
                writer,
                &writer.output_path(&dir, &format!("{stem}_clim_{years}_control")),
            )?;
            let treatment = create_climate_file(
                site,
                &config.climate,
                true,
                writer,
                &writer.output_path(&dir, &format!("{stem}_clim_{years}_treatment")),
            )?;
            (control, treatment)
        }
    };

    let pft = map_ecosystem_to_pft(site.ecosystem_type());
    let pft_path = create_pft_file(
        site,
        pft,
        &config.pft,
        writer,
        &writer.output_path(&dir, &format!("{stem}_pft.{}", pft.code)),
    )?;

    Ok(GeneratedFiles {
        source_id: site.source_id.clone(),
        pft_code: pft.code,
        grid,
        climate_control,
        climate_treatment,
        pft: pft_path,
    })
}

/// Run the pipeline with synthetic soil and climate.
pub fn run(config: &PipelineConfig) -> EcosimResult<RunSummary> {
    run_with(config, Providers::default())
}

/// Load both tables, select tier-1 sites and write the file set of each selected site
/// that has coordinates.
///
/// The writer is created first, so an unavailable backend fails before anything is read.
pub fn run_with(config: &PipelineConfig, providers: Providers<'_>) -> EcosimResult<RunSummary> {
    let writer = writer_for(config.backend)?;

    let sites = load_sites_from_path(&config.sites_path, &config.table)?;
    let measurements = load_measurements_from_path(&config.measurements_path, &config.table)?;
    let mut summary = RunSummary {
        n_sites_loaded: sites.accepted.len(),
        n_sites_rejected: sites.rejected.len(),
        n_measurements: measurements.accepted.len(),
        ..Default::default()
    };

    let inventory = sites.into_inventory();
    let ranked = select_tier1_sites(&inventory, &measurements.accepted, &config.selection);
    let selected = ensure_ecosystem_diversity(ranked, config.selection.min_per_ecosystem);

    for score in &selected {
        info!("{score}");
        let site = score.site;
        summary.selected.push(site.source_id.clone());
        if site.coordinates.is_none() {
            warn!("Skipping {}: no coordinates", site.source_id);
            summary.skipped.push(site.source_id.clone());
            continue;
        }
        summary
            .generated
            .push(generate_site_files(site, config, writer.as_ref(), providers)?);
    }

    info!(
        "Wrote input files for {} of {} selected sites to {}",
        summary.generated.len(),
        summary.selected.len(),
        config.output_dir.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_components::writer::CdlWriter;
    use ecosim_core::site::Coordinates;

    #[test]
    fn test_site_file_stem() {
        assert_eq!(site_file_stem(&ExperimentalSite::new("Natali 2011")), "Natali");
        assert_eq!(
            site_file_stem(&ExperimentalSite::new("St.Clair et al. 2009")),
            "StClair"
        );
        assert_eq!(site_file_stem(&ExperimentalSite::new("  ")), "site");
    }

    #[test]
    fn test_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            n_soil_layers: 5,
            ..Default::default()
        };
        let site = ExperimentalSite::new("Rustad 2000")
            .with_coordinates(Coordinates::new(44.0, -71.0))
            .with_ecosystem("northern hardwood forest")
            .with_temperature_increase(Some(5.0));

        let files = generate_site_files(&site, &config, &CdlWriter, Providers::default()).unwrap();

        let site_dir = dir.path().join("Rustad");
        assert_eq!(files.grid, site_dir.join("Rustad_grid.cdl"));
        assert_eq!(
            files.climate_control,
            site_dir.join("Rustad_clim_2010-2011_control.cdl")
        );
        assert_eq!(
            files.climate_treatment,
            site_dir.join("Rustad_clim_2010-2011_treatment.cdl")
        );
        assert_eq!(files.pft, site_dir.join("Rustad_pft.DBF.cdl"));
        assert_eq!(files.pft_code, "DBF");
        assert!(files.paths().iter().all(|p| p.exists()));
    }
}
