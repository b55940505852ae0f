//! Climate forcing file builder.
//!
//! EcoSIM reads hourly forcing on a fixed `(year, day, hour, ngrid)` layout with 366 days
//! per year, so leap and non-leap years share one shape.
//!
//! Two sources are supported:
//!
//! - [`build_climate_dataset`] synthesises a climate from the site's latitude. Air
//!   temperature is
//!   $$ T = T_0 - A_a \cos\left(\frac{2\pi (d - d_0)}{365}\right) - A_d \cos\left(\frac{2\pi (h - h_0)}{24}\right) $$
//!   where $T_0 = 25 - 0.5|\phi|$, $d$ is the zero-based day and $h$ the hour.
//!   Precipitation is a seeded random draw weighted towards the middle of the year, solar
//!   radiation follows a half-sine between 06:00 and 18:00, and vapour pressure comes from
//!   a dewpoint a fixed depression below air temperature.
//! - [`climate_from_reanalysis`] converts hourly ERA5 fields onto the EcoSIM layout.
//!
//! Every hourly variable carries the `1e30` fill value, whether or not any slot is empty.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use log::{debug, info, warn};
use ndarray::{Array, Array1, Array4, ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use crate::schema::*;
use crate::warming::{offset_values, temperature_offset};
use crate::writer::DatasetWriter;
use ecosim_core::dataset::{AttributeValue, Dataset, VariableData};
use ecosim_core::errors::{EcosimError, EcosimResult};
use ecosim_core::site::ExperimentalSite;

/// Days on the day axis of every year.
pub const DAYS_PER_YEAR: usize = 366;
pub const HOURS_PER_DAY: usize = 24;

const ZERO_CELSIUS_K: f64 = 273.15;

/// Settings of the synthetic climate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateParameters {
    /// First calendar year
    ///
    /// Default: 2010
    pub start_year: i32,
    /// Number of years
    ///
    /// Default: 2
    pub n_years: usize,
    /// Seed of the precipitation draw. `None` draws from system entropy and is not
    /// reproducible.
    ///
    /// Default: Some(0)
    pub seed: Option<u64>,
    /// Constant horizontal wind speed
    ///
    /// Default: 3.0 m s^-1
    pub wind_speed: f64,
    /// Peak incident solar radiation
    ///
    /// Default: 800.0 W m^-2
    pub solar_max: f64,
    /// Amplitude of the annual temperature cycle
    ///
    /// Default: 15.0 °C
    pub annual_amplitude: f64,
    /// Amplitude of the diurnal temperature cycle
    ///
    /// Default: 8.0 °C
    pub diurnal_amplitude: f64,
    /// Zero-based day of the coldest point of the annual cycle
    ///
    /// Default: 15.0
    pub trough_day: f64,
    /// Hour of the coldest point of the diurnal cycle
    ///
    /// Default: 6.0
    pub trough_hour: f64,
    /// Base temperature of sites without coordinates
    ///
    /// Default: 10.0 °C
    pub fallback_base_temp: f64,
    /// Dewpoint depression below air temperature
    ///
    /// Default: 5.0 °C
    pub dewpoint_depression: f64,
    /// NH4 concentration in precipitation
    ///
    /// Default: 0.5 gN m^-3
    pub precip_nh4: f64,
    /// NO3 concentration in precipitation
    ///
    /// Default: 0.8 gN m^-3
    pub precip_no3: f64,
    /// pH of precipitation
    ///
    /// Default: 5.6
    pub precip_ph: f64,
}

impl Default for ClimateParameters {
    fn default() -> Self {
        Self {
            start_year: 2010,
            n_years: 2,
            seed: Some(0),
            wind_speed: 3.0,
            solar_max: 800.0,
            annual_amplitude: 15.0,
            diurnal_amplitude: 8.0,
            trough_day: 15.0,
            trough_hour: 6.0,
            fallback_base_temp: 10.0,
            dewpoint_depression: 5.0,
            precip_nh4: 0.5,
            precip_no3: 0.8,
            precip_ph: 5.6,
        }
    }
}

impl ClimateParameters {
    /// Last calendar year covered.
    pub fn end_year(&self) -> i32 {
        self.start_year + self.n_years.max(1) as i32 - 1
    }
}

/// Saturation vapour pressure in kPa at a temperature in °C (Magnus form).
pub fn vapor_pressure_kpa(temperature_c: f64) -> f64 {
    0.611 * (17.27 * temperature_c / (temperature_c + 237.3)).exp()
}

/// Mean temperature of a site, from the absolute latitude.
pub fn base_temperature(site: &ExperimentalSite, parameters: &ClimateParameters) -> f64 {
    site.coordinates
        .map_or(parameters.fallback_base_temp, |c| 25.0 - 0.5 * c.latitude().abs())
}

fn hourly_shape(n_years: usize) -> (usize, usize, usize, usize) {
    (n_years, DAYS_PER_YEAR, HOURS_PER_DAY, 1)
}

/// Synthetic hourly air temperature without any warming.
pub fn synthetic_temperature(site: &ExperimentalSite, parameters: &ClimateParameters) -> Array4<f64> {
    let base = base_temperature(site, parameters);
    Array4::from_shape_fn(hourly_shape(parameters.n_years), |(_, day, hour, _)| {
        let annual = -parameters.annual_amplitude
            * (2.0 * PI * (day as f64 - parameters.trough_day) / 365.0).cos();
        let diurnal = -parameters.diurnal_amplitude
            * (2.0 * PI * (hour as f64 - parameters.trough_hour) / 24.0).cos();
        base + annual + diurnal
    })
}

/// Random hourly precipitation, larger in the first half of the year.
///
/// Draws run over days, then years, then hours, so a seed gives the same series on
/// every platform.
pub fn synthetic_precipitation(parameters: &ClimateParameters) -> Array4<f64> {
    let mut rng = match parameters.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut precip = Array4::zeros(hourly_shape(parameters.n_years));
    for day in 0..DAYS_PER_YEAR {
        let seasonal = 0.1 * (1.0 + 0.5 * (2.0 * PI * day as f64 / 365.0).sin());
        for year in 0..parameters.n_years {
            for hour in 0..HOURS_PER_DAY {
                precip[[year, day, hour, 0]] = seasonal * rng.gen::<f64>();
            }
        }
    }
    precip
}

/// Solar radiation: an annual factor times a half-sine daylight gate.
pub fn synthetic_solar_radiation(parameters: &ClimateParameters) -> Array4<f64> {
    Array4::from_shape_fn(hourly_shape(parameters.n_years), |(_, day, hour, _)| {
        let annual = 0.3 + 0.7 * (1.0 - 0.5 * (2.0 * PI * day as f64 / 365.0).cos());
        let diurnal = (PI * (hour as f64 - 6.0) / 12.0).sin().max(0.0);
        parameters.solar_max * annual * diurnal
    })
}

fn per_year(n_years: usize, value: f64) -> ArrayD<f64> {
    Array::from_elem((n_years, 1), value).into_dyn()
}

fn add_climate_coordinates(ds: &mut Dataset, years: Vec<i32>) -> EcosimResult<()> {
    ds.add_coordinate(
        "year",
        Array1::from_vec(years).into_dyn(),
        &[("long_name", AttributeValue::from("year AD"))],
    )?;
    ds.add_coordinate(
        "day",
        Array1::from_iter(1..=DAYS_PER_YEAR as i32).into_dyn(),
        &[],
    )?;
    ds.add_coordinate("hour", index_coordinate(HOURS_PER_DAY), &[])?;
    ds.add_coordinate("ngrid", index_coordinate(1), &[])
}

fn add_precipitation_chemistry(
    ds: &mut Dataset,
    n_years: usize,
    parameters: &ClimateParameters,
) -> EcosimResult<()> {
    ds.add_variable(VAR_CN4RIG.build(per_year(n_years, parameters.precip_nh4)))?;
    ds.add_variable(VAR_CNORIG.build(per_year(n_years, parameters.precip_no3)))?;
    ds.add_variable(VAR_PHRG.build(per_year(n_years, parameters.precip_ph)))
}

/// Build the synthetic climate dataset of a site.
///
/// With `apply_warming`, the site's temperature increase is added to every hourly
/// temperature. Vapour pressure follows the warmed temperature. Precipitation depends only
/// on the seed, so a control and a treatment built with the same parameters share it.
pub fn build_climate_dataset(
    site: &ExperimentalSite,
    parameters: &ClimateParameters,
    apply_warming: bool,
) -> EcosimResult<Dataset> {
    let n_years = parameters.n_years;
    let offset = temperature_offset(site, apply_warming);

    let mut temperature = synthetic_temperature(site, parameters).into_dyn();
    if let Some(offset) = offset {
        offset_values(&mut temperature, offset, None);
        debug!("Applied +{offset:.2} C warming offset for {}", site.source_id);
    }
    let vapor_pressure =
        temperature.mapv(|t| vapor_pressure_kpa(t - parameters.dewpoint_depression));

    let mut ds = Dataset::new();
    let years = (0..n_years as i32).map(|i| parameters.start_year + i).collect();
    add_climate_coordinates(&mut ds, years)?;

    ds.add_variable(
        VAR_TMPH
            .build(temperature)
            .with_attribute("missing_value", CLIMATE_FILL_VALUE),
    )?;
    ds.add_variable(VAR_WINDH.build(
        Array::from_elem(hourly_shape(n_years), parameters.wind_speed).into_dyn(),
    ))?;
    ds.add_variable(VAR_RAINH.build(synthetic_precipitation(parameters).into_dyn()))?;
    ds.add_variable(VAR_SRADH.build(synthetic_solar_radiation(parameters).into_dyn()))?;
    ds.add_variable(VAR_DWPTH.build(vapor_pressure))?;
    add_precipitation_chemistry(&mut ds, n_years, parameters)?;

    let treatment = if apply_warming { "treatment" } else { "control" };
    ds.set_attribute(
        "title",
        format!("EcoSIM climate file for {} ({treatment})", site.source_id),
    );
    ds.set_attribute("source", "Synthetic climate data");
    ds.set_attribute("warming_treatment", if apply_warming { "yes" } else { "no" });
    if let Some(offset) = offset {
        ds.set_attribute("temperature_offset_c", offset);
    }

    validate_climate_schema(&ds)?;
    Ok(ds)
}

/// Build the synthetic climate dataset of a site and write it to `output_path`.
pub fn create_climate_file(
    site: &ExperimentalSite,
    parameters: &ClimateParameters,
    apply_warming: bool,
    writer: &dyn DatasetWriter,
    output_path: &Path,
) -> EcosimResult<PathBuf> {
    let ds = build_climate_dataset(site, parameters, apply_warming)?;
    writer.write(&ds, output_path)?;
    info!(
        "Created {} climate file {} for {}-{}",
        if apply_warming { "treatment" } else { "control" },
        output_path.display(),
        parameters.start_year,
        parameters.end_year()
    );
    Ok(output_path.to_path_buf())
}

// ============================================================================
// Reanalysis conversion
// ============================================================================

/// Names of the time coordinate in ERA5 files, older and newer.
const TIME_NAMES: [&str; 2] = ["time", "valid_time"];

fn reanalysis_error(details: impl Into<String>) -> EcosimError {
    EcosimError::Reanalysis(details.into())
}

/// Parse a CF time unit such as `hours since 1900-01-01 00:00:00.0`.
///
/// Returns the length of one unit in seconds and the reference instant.
pub fn parse_time_units(units: &str) -> Option<(f64, NaiveDateTime)> {
    let (unit, reference) = units.split_once(" since ")?;
    let seconds = match unit.trim() {
        "seconds" | "second" | "s" => 1.0,
        "minutes" | "minute" => 60.0,
        "hours" | "hour" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        _ => return None,
    };
    let reference = reference.trim().trim_end_matches('Z').replace('T', " ");
    let instant = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&reference, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&reference, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some((seconds, instant))
}

fn as_f64_values(data: &VariableData) -> Option<Vec<f64>> {
    match data {
        VariableData::Double(a) => Some(a.iter().copied().collect()),
        VariableData::Int(a) => Some(a.iter().map(|v| f64::from(*v)).collect()),
        _ => None,
    }
}

fn time_axis(reanalysis: &Dataset) -> EcosimResult<(&'static str, Vec<NaiveDateTime>)> {
    let (name, variable) = TIME_NAMES
        .iter()
        .find_map(|n| reanalysis.variable(n).map(|v| (*n, v)))
        .ok_or_else(|| reanalysis_error("no time coordinate"))?;
    let units = variable
        .units()
        .ok_or_else(|| reanalysis_error(format!("{name} has no units")))?;
    let (unit_seconds, reference) = parse_time_units(units)
        .ok_or_else(|| reanalysis_error(format!("unsupported time units '{units}'")))?;
    let values = as_f64_values(&variable.data)
        .ok_or_else(|| reanalysis_error(format!("{name} is not numeric")))?;

    let times = values
        .iter()
        .map(|v| {
            TimeDelta::try_seconds((v * unit_seconds).round() as i64)
                .and_then(|delta| reference.checked_add_signed(delta))
                .ok_or_else(|| reanalysis_error(format!("time value {v} out of range")))
        })
        .collect::<EcosimResult<Vec<_>>>()?;
    Ok((name, times))
}

/// Values of `name` along the time axis at the first index of every other dimension.
///
/// Fill values come back as `None`.
fn point_series(
    reanalysis: &Dataset,
    name: &str,
    time_name: &str,
) -> EcosimResult<Option<Vec<Option<f64>>>> {
    let Some(variable) = reanalysis.variable(name) else {
        return Ok(None);
    };
    let values = variable
        .data
        .as_double()
        .ok_or_else(|| reanalysis_error(format!("{name} must hold floating point values")))?;
    let axis = variable
        .dimensions
        .iter()
        .position(|d| d == time_name)
        .ok_or_else(|| reanalysis_error(format!("{name} is not laid out along {time_name}")))?;
    let fill_value = variable.fill_value();

    let mut index = vec![0; values.ndim()];
    let series = (0..values.shape()[axis])
        .map(|t| {
            index[axis] = t;
            let v = values[IxDyn(&index)];
            (Some(v) != fill_value && v.is_finite()).then_some(v)
        })
        .collect();
    Ok(Some(series))
}

/// Position of each timestep on the `(year, day, hour)` axes, with the years in ascending
/// order.
fn slots(times: &[NaiveDateTime]) -> (Vec<i32>, Vec<(usize, usize, usize)>) {
    let years: Vec<i32> = times
        .iter()
        .map(|t| t.year())
        .collect::<BTreeSet<i32>>()
        .into_iter()
        .collect();
    let slots = times
        .iter()
        .map(|t| {
            // every year of `times` is in `years`
            let year = years.binary_search(&t.year()).unwrap_or_default();
            (year, t.ordinal0() as usize, t.hour() as usize)
        })
        .collect();
    (years, slots)
}

/// Lay a series out on the hourly axes. A missing series gives an all-fill array.
fn place(
    n_years: usize,
    slots: &[(usize, usize, usize)],
    series: Option<&[Option<f64>]>,
    convert: impl Fn(f64) -> f64,
) -> ArrayD<f64> {
    let mut out = Array4::from_elem(hourly_shape(n_years), CLIMATE_FILL_VALUE);
    for (&(year, day, hour), value) in slots.iter().zip(series.unwrap_or_default()) {
        if let Some(v) = value {
            out[[year, day, hour, 0]] = convert(*v);
        }
    }
    out.into_dyn()
}

/// Convert an hourly ERA5 dataset to the EcoSIM climate layout.
///
/// `t2m` is required. `d2m`, `u10` with `v10`, `tp` and `ssrd` are converted to `DWPTH`,
/// `WINDH`, `RAINH` and `SRADH`; each is written entirely as fill values when its source
/// is absent, so the result always satisfies the climate schema. Gridded inputs are read
/// at their first latitude and longitude. Slots with no data hold the fill value.
pub fn climate_from_reanalysis(
    reanalysis: &Dataset,
    site_name: &str,
    parameters: &ClimateParameters,
) -> EcosimResult<Dataset> {
    let (time_name, times) = time_axis(reanalysis)?;
    let (years, slots) = slots(&times);
    let n_years = years.len();

    let t2m = point_series(reanalysis, "t2m", time_name)?
        .ok_or_else(|| reanalysis_error("missing t2m"))?;

    let mut ds = Dataset::new();
    add_climate_coordinates(&mut ds, years)?;
    ds.add_variable(
        VAR_TMPH
            .build(place(n_years, &slots, Some(t2m.as_slice()), |k| k - ZERO_CELSIUS_K))
            .with_attribute("missing_value", CLIMATE_FILL_VALUE),
    )?;

    let u10 = point_series(reanalysis, "u10", time_name)?;
    let v10 = point_series(reanalysis, "v10", time_name)?;
    let speed: Option<Vec<Option<f64>>> = match (u10, v10) {
        (Some(u), Some(v)) => Some(
            u.iter()
                .zip(&v)
                .map(|(u, v)| Some(u.as_ref()?.hypot(*v.as_ref()?)))
                .collect(),
        ),
        _ => None,
    };
    ds.add_variable(VAR_WINDH.build(place(n_years, &slots, speed.as_deref(), |s| s)))?;
    // hourly accumulations: m of water, J m-2
    let tp = point_series(reanalysis, "tp", time_name)?;
    ds.add_variable(VAR_RAINH.build(place(n_years, &slots, tp.as_deref(), |m| m * 1000.0)))?;
    let ssrd = point_series(reanalysis, "ssrd", time_name)?;
    ds.add_variable(VAR_SRADH.build(place(n_years, &slots, ssrd.as_deref(), |j| j / 3600.0)))?;
    let d2m = point_series(reanalysis, "d2m", time_name)?;
    ds.add_variable(VAR_DWPTH.build(place(n_years, &slots, d2m.as_deref(), |k| {
        vapor_pressure_kpa(k - ZERO_CELSIUS_K)
    })))?;
    for (name, present) in [
        ("WINDH", speed.is_some()),
        ("RAINH", tp.is_some()),
        ("SRADH", ssrd.is_some()),
        ("DWPTH", d2m.is_some()),
    ] {
        if !present {
            warn!("No reanalysis source for {name} at {site_name}, writing fill values");
        }
    }
    add_precipitation_chemistry(&mut ds, n_years, parameters)?;

    ds.set_attribute("title", format!("EcoSIM climate file for {site_name}"));
    ds.set_attribute("source", "ERA5 reanalysis");
    if let Some(warming) = reanalysis.attribute("warming_treatment_c") {
        ds.set_attribute("warming_treatment", "yes");
        ds.set_attribute("temperature_offset_c", warming.clone());
    } else {
        ds.set_attribute("warming_treatment", "no");
    }
    info!(
        "Converted {} reanalysis timesteps over {n_years} years for {site_name}",
        times.len()
    );
    validate_climate_schema(&ds)?;
    Ok(ds)
}
