//! Reanalysis requests and the boundary toward the reanalysis download service.
//!
//! Downloading is not done here. [`ERA5Request`] is a plain value describing what to fetch
//! and [`ReanalysisSource`] is the seam an acquisition client plugs into.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::errors::EcosimResult;
use crate::site::ExperimentalSite;

/// Buffer around the site, in degrees, of the requested area.
pub const BOUNDING_BOX_BUFFER: f64 = 0.5;

/// ERA5 single-level variables needed to build the EcoSIM climate forcing.
pub const DEFAULT_VARIABLES: [&str; 6] = [
    "2m_temperature",
    "10m_u_component_of_wind",
    "10m_v_component_of_wind",
    "total_precipitation",
    "surface_solar_radiation_downwards",
    "2m_dewpoint_temperature",
];

/// Days per month used to turn an experiment duration into an end date.
const DAYS_PER_MONTH: u64 = 30;

/// A request for ERA5 reanalysis data around one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ERA5Request {
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_path: PathBuf,
    pub variables: Vec<String>,
}

impl ERA5Request {
    /// Create a request for the default variable list.
    pub fn new(
        latitude: f64,
        longitude: f64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            start_date,
            end_date,
            output_path: output_path.into(),
            variables: DEFAULT_VARIABLES.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = variables;
        self
    }

    /// Build a request covering a site's experiment.
    ///
    /// The period starts on 1 January of `reference_year` and lasts 30 days for each month
    /// of the longest measurement timepoint. Sites without coordinates or durations give
    /// `None`.
    ///
    /// ```rust
    /// use ecosim_core::era5::ERA5Request;
    /// use ecosim_core::site::{Coordinates, ExperimentalSite};
    ///
    /// let site = ExperimentalSite::new("Test 2020")
    ///     .with_coordinates(Coordinates::new(55.0, 12.0))
    ///     .with_warming_duration_months(Some(vec![12]));
    /// let request = ERA5Request::from_site(&site, "output", 2010).unwrap();
    ///
    /// assert_eq!(request.latitude, 55.0);
    /// assert_eq!(request.output_path.to_str(), Some("output/Test_era5_2010.nc"));
    /// assert_eq!(request.end_date.to_string(), "2010-12-27");
    /// ```
    pub fn from_site(
        site: &ExperimentalSite,
        output_dir: impl AsRef<Path>,
        reference_year: i32,
    ) -> Option<Self> {
        let coordinates = site.coordinates?;
        let months = u64::try_from(site.max_warming_duration_months()?).ok()?;

        let start_date = NaiveDate::from_ymd_opt(reference_year, 1, 1)?;
        let end_date = start_date.checked_add_days(Days::new(months * DAYS_PER_MONTH))?;

        let stem = site.source_id.split_whitespace().next().unwrap_or_default();
        let output_path = output_dir
            .as_ref()
            .join(format!("{stem}_era5_{reference_year}.nc"));

        Some(Self::new(
            coordinates.latitude(),
            coordinates.longitude(),
            start_date,
            end_date,
            output_path,
        ))
    }

    /// Calendar years covered by the request, inclusive.
    pub fn year_range(&self) -> Vec<String> {
        (self.start_date.year()..=self.end_date.year())
            .map(|y| y.to_string())
            .collect()
    }

    /// Requested area as (north, west, south, east).
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        (
            self.latitude + BOUNDING_BOX_BUFFER,
            self.longitude - BOUNDING_BOX_BUFFER,
            self.latitude - BOUNDING_BOX_BUFFER,
            self.longitude + BOUNDING_BOX_BUFFER,
        )
    }
}

/// Provider of gridded reanalysis data.
///
/// The returned dataset holds at least `t2m` (and usually `d2m`) in kelvin on
/// `(time, latitude, longitude)`, with a `time` coordinate in hours since a reference
/// instant as ERA5 files do.
pub trait ReanalysisSource {
    fn fetch(&self, request: &ERA5Request) -> EcosimResult<Dataset>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ERA5Request {
        ERA5Request::new(
            55.0,
            12.0,
            NaiveDate::from_ymd_opt(2005, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2007, 12, 31).unwrap(),
            "output.nc",
        )
    }

    #[test]
    fn test_year_range() {
        assert_eq!(request().year_range(), vec!["2005", "2006", "2007"]);
    }

    #[test]
    fn test_bounding_box() {
        assert_eq!(request().bounding_box(), (55.5, 11.5, 54.5, 12.5));
    }

    #[test]
    fn test_default_variables() {
        let r = request();
        assert_eq!(r.variables.len(), 6);
        assert_eq!(r.variables[0], "2m_temperature");
    }

    #[test]
    fn test_from_site_requires_metadata() {
        let site = ExperimentalSite::new("A 1999");
        assert!(ERA5Request::from_site(&site, "out", 2010).is_none());

        let site = site.with_coordinates(crate::site::Coordinates::new(1.0, 1.0));
        assert!(ERA5Request::from_site(&site, "out", 2010).is_none());

        let site = site.with_warming_duration_months(Some(vec![3, 36]));
        let r = ERA5Request::from_site(&site, "out", 2010).unwrap();
        assert_eq!(r.year_range(), vec!["2010", "2011", "2012"]);
    }
}
