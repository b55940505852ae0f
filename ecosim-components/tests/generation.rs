//! End-to-end generation of the EcoSIM file set for one site.
//!
//! These build every file kind from a parsed site, write it with the CDL backend and
//! check the schema contract the simulator relies on.

use std::fs;

use ecosim_components::climate::{build_climate_dataset, create_climate_file, ClimateParameters};
use ecosim_components::grid::{build_grid_dataset, create_grid_file, GridParameters};
use ecosim_components::pft::map_ecosystem_to_pft;
use ecosim_components::pft_file::{build_pft_dataset, create_pft_file, PftParameters};
use ecosim_components::schema::{
    validate_climate_schema, validate_grid_schema, validate_pft_schema, CLIMATE_SCHEMA,
    GRID_SCHEMA, PFT_SCHEMA,
};
use ecosim_components::soil::{resolve_profile, synthesize, DEFAULT_N_LAYERS};
use ecosim_components::writer::{CdlWriter, DatasetWriter};
use ecosim_core::parsers::parse_coordinates;
use ecosim_core::site::ExperimentalSite;

fn site() -> ExperimentalSite {
    ExperimentalSite::new("Natali 2011")
        .with_coordinates(parse_coordinates("63°52'N, 149°13'W"))
        .with_location_text("Eight Mile Lake, Alaska")
        .with_ecosystem("moist acidic tundra")
        .with_temperature_increase(Some(1.5))
        .with_warming_duration_months(Some(vec![12, 24]))
}

mod schema_contract {
    use super::*;

    #[test]
    fn test_every_builder_satisfies_its_schema() {
        let site = site();
        let profile = synthesize(site.ecosystem_type(), &site, DEFAULT_N_LAYERS).unwrap();

        let grid = build_grid_dataset(&site, &profile, &GridParameters::default()).unwrap();
        validate_grid_schema(&grid).unwrap();

        let climate = build_climate_dataset(&site, &ClimateParameters::default(), true).unwrap();
        validate_climate_schema(&climate).unwrap();

        let pft = map_ecosystem_to_pft(site.ecosystem_type());
        let pft_ds = build_pft_dataset(&site, pft, &PftParameters::default()).unwrap();
        validate_pft_schema(&pft_ds).unwrap();

        // files only carry the variables the schema declares plus coordinates
        for (ds, schema) in [(&grid, &GRID_SCHEMA), (&climate, &CLIMATE_SCHEMA), (&pft_ds, &PFT_SCHEMA)] {
            for variable in ds.variables() {
                let declared = schema.variables.iter().any(|v| v.name == variable.name)
                    || schema.dimensions.contains(&variable.name.as_str());
                assert!(declared, "{} is not part of the {} schema", variable.name, schema.name);
            }
        }
    }

    #[test]
    fn test_grid_location_from_parsed_coordinates() {
        let site = site();
        let profile = resolve_profile(None, &site, DEFAULT_N_LAYERS).unwrap();
        let grid = build_grid_dataset(&site, &profile, &GridParameters::default()).unwrap();

        let alatg = grid.variable("ALATG").unwrap().data.as_double().unwrap();
        assert!((alatg[[0]] - (63.0 + 52.0 / 60.0)).abs() < 1e-9);
    }
}

mod written_files {
    use super::*;

    #[test]
    fn test_cdl_file_set() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CdlWriter;
        let site = site();
        let profile = synthesize(site.ecosystem_type(), &site, 5).unwrap();
        let pft = map_ecosystem_to_pft(site.ecosystem_type());
        let climate = ClimateParameters {
            n_years: 1,
            ..Default::default()
        };

        let grid_path = writer.output_path(dir.path(), "Natali_grid");
        let control_path = writer.output_path(dir.path(), "Natali_clim_2010-2010_control");
        let pft_path = writer.output_path(dir.path(), &format!("Natali_pft.{}", pft.code));

        create_grid_file(&site, &profile, &GridParameters::default(), &writer, &grid_path).unwrap();
        create_climate_file(&site, &climate, false, &writer, &control_path).unwrap();
        create_pft_file(&site, pft, &PftParameters::default(), &writer, &pft_path).unwrap();

        let grid = fs::read_to_string(&grid_path).unwrap();
        assert!(grid.contains("\tnlevs = 5 ;"));
        assert!(grid.contains("\tdouble CDPTH(ntopou, nlevs) ;"));
        assert!(grid.contains("\t\tCDPTH:_FillValue = -999.9 ;"));
        assert!(grid.contains(" CDPTH = 0.05, 0.1, 0.15, 0.2, 0.25 ;"));
        assert!(grid.contains("\tbyte NJ(ntopou) ;"));

        let control = fs::read_to_string(&control_path).unwrap();
        assert!(control.contains("\tday = 366 ;"));
        assert!(control.contains("\tdouble TMPH(year, day, hour, ngrid) ;"));
        assert!(control.contains("\t\t:warming_treatment = \"no\" ;"));

        assert_eq!(pft_path.file_name().unwrap(), "Natali_pft.DGS.cdl");
        let pft_text = fs::read_to_string(&pft_path).unwrap();
        assert!(pft_text.contains("\tchar pft_type(year, ntopou, maxpfts, nchar1) ;"));
        assert!(pft_text.contains("\t\t:pft_code = \"DGS\" ;"));
    }
}
