//! Loaders for the delimited experiment-metadata and measurement tables.
//!
//! Every row is parsed independently. Field-level problems only blank that field; a row is
//! rejected when a field required by its entity is missing or unrecognised. Rejected rows
//! are returned next to the accepted entities instead of being discarded, so callers can
//! audit what was lost.
//!
//! Columns are looked up by exact header name. A renamed or missing column reads as empty
//! for every row.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::{EcosimError, EcosimResult};
use crate::measurement::{NitrogenMeasurement, NitrogenVariable};
use crate::parsers::{parse_coordinates, parse_duration_months, parse_temperature_increase};
use crate::site::{ExperimentalSite, SiteInventory};

pub const COL_SOURCE_ID: &str = "source-id";
pub const COL_COORDINATES: &str = "latitude and longitude coordinate";
pub const COL_LOCATION_TEXT: &str = "latitude and longitude text";
pub const COL_TEMPERATURE_INCREASE: &str = "temperature-increase (degree C)";
pub const COL_WARMING_DURATION: &str = "warming-duration (months)";
pub const COL_ECOSYSTEM: &str = "ecosystem-text";
pub const COL_WARMING_METHOD: &str = "warming-method";
pub const COL_WARMING_METHOD_TEXT: &str = "warming-method-text";
pub const COL_WARMING_TIMING: &str = "warming-timing";
pub const COL_WARMING_SEASON: &str = "warming-season";

pub const COL_VARIABLE: &str = "variable";
pub const COL_TREATMENT_MEAN: &str = "treatment mean";
pub const COL_CONTROL_MEAN: &str = "control mean";
pub const COL_TREATMENT_SD: &str = "treatment SD";
pub const COL_CONTROL_SD: &str = "control SD";
pub const COL_TREATMENT_N: &str = "treatment n";
pub const COL_CONTROL_N: &str = "control n";
pub const COL_DURATION_MONTHS: &str = "duration_months";
pub const COL_UNIT: &str = "unit";
pub const COL_OTHER_CONDITIONS: &str = "other_conditions";

/// Layout of a delimited table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFormat {
    /// Field delimiter, must be a single ASCII character
    ///
    /// Default: tab
    pub delimiter: char,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self { delimiter: '\t' }
    }
}

impl TableFormat {
    pub fn comma_separated() -> Self {
        Self { delimiter: ',' }
    }

    fn delimiter_byte(&self) -> EcosimResult<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                EcosimError::Config(format!(
                    "table delimiter {:?} is not a single ASCII character",
                    self.delimiter
                ))
            })
    }
}

/// One data row of a delimited table, keyed by header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Zero-based index of the row among the data rows
    pub index: usize,
    pub fields: BTreeMap<String, String>,
}

impl RawRow {
    /// Trimmed value of a column, empty when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map_or("", |v| v.trim())
    }

    fn optional_text(&self, column: &str) -> Option<String> {
        Some(self.get(column))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn float(&self, column: &str) -> Option<f64> {
        self.get(column)
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// Integer read through a float and truncated, so "12.0" reads as 12.
    fn truncated_int(&self, column: &str) -> Option<i64> {
        self.float(column).map(|v| v.trunc() as i64)
    }
}

/// Entities built from a table together with the rows that could not be used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadResult<T> {
    pub accepted: Vec<T>,
    pub rejected: Vec<RawRow>,
}

impl<T> LoadResult<T> {
    /// Number of data rows read from the source.
    pub fn n_rows(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}

impl LoadResult<ExperimentalSite> {
    pub fn into_inventory(self) -> SiteInventory {
        SiteInventory::new(self.accepted)
    }
}

/// Read every data row of a delimited table.
///
/// Rows may have fewer or more fields than the header; missing trailing fields read as
/// empty and surplus fields are ignored.
pub fn read_rows<R: Read>(reader: R, format: &TableFormat) -> EcosimResult<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter_byte()?)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    reader
        .records()
        .enumerate()
        .map(|(index, record)| -> EcosimResult<RawRow> {
            let record = record?;
            let fields = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect();
            Ok(RawRow { index, fields })
        })
        .collect()
}

/// Build a site from an experiment-metadata row.
///
/// Only the citation id is required. Every other field is parsed leniently and left empty
/// when it cannot be understood.
pub fn site_from_row(row: &RawRow) -> Option<ExperimentalSite> {
    let source_id = row.get(COL_SOURCE_ID);
    if source_id.is_empty() {
        return None;
    }

    Some(
        ExperimentalSite::new(source_id)
            .with_coordinates(parse_coordinates(row.get(COL_COORDINATES)))
            .with_location_text(row.get(COL_LOCATION_TEXT))
            .with_temperature_increase(parse_temperature_increase(
                row.get(COL_TEMPERATURE_INCREASE),
            ))
            .with_warming_duration_months(parse_duration_months(row.get(COL_WARMING_DURATION)))
            .with_ecosystem(row.get(COL_ECOSYSTEM))
            .with_warming_method(row.get(COL_WARMING_METHOD))
            .with_warming_method_text(row.get(COL_WARMING_METHOD_TEXT))
            .with_warming_timing(row.get(COL_WARMING_TIMING))
            .with_warming_season(row.get(COL_WARMING_SEASON)),
    )
}

/// Build a measurement from a measurement-table row.
///
/// The row is rejected when the variable name is not a known [`NitrogenVariable`], when
/// either mean is missing or when a statistic is out of bounds. A missing unit reads as an
/// empty string.
pub fn measurement_from_row(row: &RawRow) -> Option<NitrogenMeasurement> {
    let variable = NitrogenVariable::from_name(row.get(COL_VARIABLE))?;
    let treatment_mean = row.float(COL_TREATMENT_MEAN)?;
    let control_mean = row.float(COL_CONTROL_MEAN)?;

    let measurement = NitrogenMeasurement {
        source_id: row.get(COL_SOURCE_ID).to_string(),
        variable,
        treatment_mean,
        control_mean,
        treatment_sd: row.float(COL_TREATMENT_SD),
        control_sd: row.float(COL_CONTROL_SD),
        treatment_n: row.truncated_int(COL_TREATMENT_N),
        control_n: row.truncated_int(COL_CONTROL_N),
        duration_months: row.truncated_int(COL_DURATION_MONTHS),
        unit: row.get(COL_UNIT).to_string(),
        other_conditions: row.optional_text(COL_OTHER_CONDITIONS),
    };

    measurement.is_within_bounds().then_some(measurement)
}

fn partition_rows<T>(rows: Vec<RawRow>, build: impl Fn(&RawRow) -> Option<T>) -> LoadResult<T> {
    let mut accepted = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        match build(&row) {
            Some(entity) => accepted.push(entity),
            None => rejected.push(row),
        }
    }
    LoadResult { accepted, rejected }
}

pub fn load_sites<R: Read>(
    reader: R,
    format: &TableFormat,
) -> EcosimResult<LoadResult<ExperimentalSite>> {
    let result = partition_rows(read_rows(reader, format)?, site_from_row);
    info!(
        "Loaded {} sites ({} rows rejected)",
        result.accepted.len(),
        result.rejected.len()
    );
    Ok(result)
}

pub fn load_measurements<R: Read>(
    reader: R,
    format: &TableFormat,
) -> EcosimResult<LoadResult<NitrogenMeasurement>> {
    let result = partition_rows(read_rows(reader, format)?, measurement_from_row);
    info!(
        "Loaded {} nitrogen measurements ({} rows rejected)",
        result.accepted.len(),
        result.rejected.len()
    );
    Ok(result)
}

/// Load the experiment-metadata table from a file.
pub fn load_sites_from_path(
    path: impl AsRef<Path>,
    format: &TableFormat,
) -> EcosimResult<LoadResult<ExperimentalSite>> {
    let path = path.as_ref();
    info!("Reading experiment metadata from {}", path.display());
    load_sites(File::open(path)?, format)
}

/// Load the nitrogen measurement table from a file.
pub fn load_measurements_from_path(
    path: impl AsRef<Path>,
    format: &TableFormat,
) -> EcosimResult<LoadResult<NitrogenMeasurement>> {
    let path = path.as_ref();
    info!("Reading nitrogen measurements from {}", path.display());
    load_measurements(File::open(path)?, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::EcosystemType;

    const SITES: &str = "source-id\tlatitude and longitude coordinate\ttemperature-increase (degree C)\twarming-duration (months)\tecosystem-text\twarming-method\n\
        Smith 2020_a\t65.5°N, 150.3°W\t3-5\t1,12\tArctic tundra\tOTC\n\
        Jones 2011\tnear the lake\tinvalid\t6\tboreal forest\tcable\n\
        \t10N 10E\t1\t1\tgrassland\tcable\n";

    #[test]
    fn test_load_sites() {
        let result = load_sites(SITES.as_bytes(), &TableFormat::default()).unwrap();
        assert_eq!(result.n_rows(), 3);
        assert_eq!(result.accepted.len(), 2);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].index, 2);

        let smith = &result.accepted[0];
        assert!(smith.coordinates.is_some());
        assert_eq!(smith.temperature_increase_c, Some(4.0));
        assert_eq!(smith.warming_duration_months, Some(vec![1, 12]));
        assert_eq!(smith.ecosystem.resolved, Some(EcosystemType::Tundra));
        // absent column reads as empty text
        assert_eq!(smith.warming_timing.raw, "");

        let jones = &result.accepted[1];
        assert!(jones.coordinates.is_none());
        assert_eq!(jones.temperature_increase_c, None);
        assert_eq!(jones.ecosystem.resolved, Some(EcosystemType::Forest));
    }

    #[test]
    fn test_short_rows_read_as_empty() {
        let text = "source-id,ecosystem-text,warming-method\nA 1999,forest\n";
        let result = load_sites(text.as_bytes(), &TableFormat::comma_separated()).unwrap();
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].warming_method.resolved, None);
    }

    #[test]
    fn test_measurement_rows() {
        let text = "source-id\tvariable\ttreatment mean\tcontrol mean\ttreatment SD\ttreatment n\tunit\n\
            A\tN2O\t5\t3\t0.5\t4.0\tmg N/m2/day\n\
            A\tunknown thing\t5\t3\t\t\t\n\
            A\tplant N\t\t3\t\t\t\n\
            A\tsoil N\t0\t0\t\t\t\n\
            A\tsoil N\t1\t2\t-1\t\tg\n\
            A\tsoil N\t1\t2\t\t0\tg\n";
        let result = load_measurements(text.as_bytes(), &TableFormat::default()).unwrap();

        assert_eq!(result.accepted.len(), 2);
        let first = &result.accepted[0];
        assert_eq!(first.variable, NitrogenVariable::N2O);
        assert_eq!(first.treatment_n, Some(4));
        assert_eq!(first.treatment_sd, Some(0.5));
        assert_eq!(first.unit, "mg N/m2/day");

        // zero means are real values
        let zero = &result.accepted[1];
        assert_eq!(zero.treatment_mean, 0.0);
        assert_eq!(zero.unit, "");

        let rejected: Vec<usize> = result.rejected.iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_non_ascii_delimiter_is_a_config_error() {
        let format = TableFormat { delimiter: '§' };
        let err = load_sites("a".as_bytes(), &format).unwrap_err();
        assert!(matches!(err, EcosimError::Config(_)));
    }
}
