//! Fixed variable layout of the EcoSIM input files.
//!
//! EcoSIM reads its inputs by exact dimension name, variable name, unit string and fill
//! value, so every variable written by this crate is declared here once with the
//! [`define_schema_variable!`] macro and built from that declaration. The `validate_*`
//! functions check a finished dataset against the same tables.
//!
//! # Usage
//!
//! ```rust
//! use ecosim_components::schema::{VAR_TMPH, CLIMATE_FILL_VALUE};
//!
//! assert_eq!(VAR_TMPH.name, "TMPH");
//! assert_eq!(VAR_TMPH.unit, Some("oC"));
//! assert_eq!(VAR_TMPH.fill_value, Some(CLIMATE_FILL_VALUE));
//! assert_eq!(VAR_TMPH.dimensions, &["year", "day", "hour", "ngrid"]);
//! ```

use ecosim_core::dataset::{Dataset, Variable, VariableData};
use ndarray::{Array1, ArrayD};
use ecosim_core::errors::{EcosimError, EcosimResult};

/// Fill value of every floating-point climate variable.
pub const CLIMATE_FILL_VALUE: f64 = 1.0e30;
/// Fill value of every per-layer soil variable.
pub const SOIL_FILL_VALUE: f64 = -999.9;

/// Declaration of one variable of an EcoSIM input file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchemaVariable {
    pub name: &'static str,
    pub long_name: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub fill_value: Option<f64>,
    pub dimensions: &'static [&'static str],
}

impl SchemaVariable {
    pub const fn new(
        name: &'static str,
        long_name: Option<&'static str>,
        unit: Option<&'static str>,
        fill_value: Option<f64>,
        dimensions: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            long_name,
            unit,
            fill_value,
            dimensions,
        }
    }

    /// Create the variable with its declared dimensions and attributes.
    pub fn build(&self, data: impl Into<VariableData>) -> Variable {
        let mut variable = Variable::new(self.name, self.dimensions, data);
        if let Some(long_name) = self.long_name {
            variable = variable.with_attribute("long_name", long_name);
        }
        if let Some(unit) = self.unit {
            variable = variable.with_attribute("units", unit);
        }
        if let Some(fill_value) = self.fill_value {
            variable = variable.with_attribute("_FillValue", fill_value);
        }
        variable
    }

    fn check(&self, dataset: &Dataset) -> Result<(), String> {
        let variable = dataset
            .variable(self.name)
            .ok_or_else(|| format!("missing variable {}", self.name))?;
        if variable.dimensions != self.dimensions {
            return Err(format!(
                "{} has dimensions {:?}, expected {:?}",
                self.name, variable.dimensions, self.dimensions
            ));
        }
        if variable.units() != self.unit {
            return Err(format!(
                "{} has units {:?}, expected {:?}",
                self.name,
                variable.units(),
                self.unit
            ));
        }
        if variable.fill_value() != self.fill_value {
            return Err(format!(
                "{} has fill value {:?}, expected {:?}",
                self.name,
                variable.fill_value(),
                self.fill_value
            ));
        }
        Ok(())
    }
}

/// Values `0..n` of an index coordinate.
pub(crate) fn index_coordinate(n: usize) -> ArrayD<i32> {
    Array1::from_iter(0..n as i32).into_dyn()
}

/// Declare a [`SchemaVariable`] as a public static.
///
/// # Parameters
///
/// - `$var_name`: Identifier for the static (uppercase by convention)
/// - `name`: Variable name in the file
/// - `long_name`: Optional `long_name` attribute
/// - `unit`: Optional `units` attribute
/// - `fill_value`: Optional `_FillValue` attribute
/// - `dimensions`: Dimension names, slowest varying first
macro_rules! define_schema_variable {
    (
        $var_name:ident,
        name = $name:literal,
        long_name = $long_name:expr,
        unit = $unit:expr,
        fill_value = $fill:expr,
        dimensions = [$($dim:literal),* $(,)?] $(,)?
    ) => {
        #[doc = concat!("Schema entry for `", $name, "`")]
        pub static $var_name: $crate::schema::SchemaVariable =
            $crate::schema::SchemaVariable::new($name, $long_name, $unit, $fill, &[$($dim),*]);
    };
}

// ============================================================================
// Grid / soil file
// ============================================================================

pub const GRID_DIMENSIONS: &[&str] = &["ngrid", "ntopou", "nlevs", "ncol", "nrow"];

define_schema_variable!(
    VAR_ALATG,
    name = "ALATG",
    long_name = Some("Latitude"),
    unit = Some("degrees north"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_ALTIG,
    name = "ALTIG",
    long_name = Some("Altitude above sea-level"),
    unit = Some("m"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_ATCAG,
    name = "ATCAG",
    long_name = Some("Mean annual temperature"),
    unit = Some("oC"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_CO2EIG,
    name = "CO2EIG",
    long_name = Some("Atmospheric CO2"),
    unit = Some("ppm"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_Z2GEG,
    name = "Z2GEG",
    long_name = Some("Atmospheric N2"),
    unit = Some("ppm"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_Z2OEG,
    name = "Z2OEG",
    long_name = Some("Atmospheric N2O"),
    unit = Some("ppm"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_OXYEG,
    name = "OXYEG",
    long_name = Some("Atmospheric O2"),
    unit = Some("ppm"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_CH4EG,
    name = "CH4EG",
    long_name = Some("Atmospheric CH4"),
    unit = Some("ppm"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_ZNH3EG,
    name = "ZNH3EG",
    long_name = Some("Atmospheric NH3"),
    unit = Some("ppm"),
    fill_value = None,
    dimensions = ["ngrid"],
);

define_schema_variable!(
    VAR_TOPO_GRID,
    name = "topo_grid",
    long_name = Some("grid ID of the topo unit"),
    unit = Some("none"),
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_NUI,
    name = "NUI",
    long_name = Some("Initial layer number of soil surface layer"),
    unit = Some("none"),
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_NJ,
    name = "NJ",
    long_name = Some("Layer number of maximum rooting layer"),
    unit = Some("none"),
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_CDPTH,
    name = "CDPTH",
    long_name = Some("Depth to bottom of soil layer"),
    unit = Some("m"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_BKDSI,
    name = "BKDSI",
    long_name = Some("Initial bulk density"),
    unit = Some("Mg m-3"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_CSAND,
    name = "CSAND",
    long_name = Some("Sand content"),
    unit = Some("kg Mg-1"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_CSILT,
    name = "CSILT",
    long_name = Some("Silt content"),
    unit = Some("kg Mg-1"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_PH,
    name = "PH",
    long_name = Some("depth-resolved pH"),
    unit = Some("none"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_CORGC,
    name = "CORGC",
    long_name = Some("Total soil organic carbon"),
    unit = Some("kg C/Mg soil"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_CORGN,
    name = "CORGN",
    long_name = Some("Total soil organic nitrogen"),
    unit = Some("g N/Mg soil"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_CNH4,
    name = "CNH4",
    long_name = Some("Total soil NH4 concentration"),
    unit = Some("gN/Mg soil"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_CNO3,
    name = "CNO3",
    long_name = Some("Total soil NO3 concentration"),
    unit = Some("gN/Mg soil"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_FC,
    name = "FC",
    long_name = Some("Field capacity"),
    unit = Some("m3 m-3"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_WP,
    name = "WP",
    long_name = Some("Wilting point"),
    unit = Some("m3 m-3"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

define_schema_variable!(
    VAR_SCNV,
    name = "SCNV",
    long_name = Some("Vertical hydraulic conductivity Ksat"),
    unit = Some("mm h-1"),
    fill_value = Some(SOIL_FILL_VALUE),
    dimensions = ["ntopou", "nlevs"],
);

pub static GRID_VARIABLES: [&SchemaVariable; 24] = [
    &VAR_ALATG,
    &VAR_ALTIG,
    &VAR_ATCAG,
    &VAR_CO2EIG,
    &VAR_Z2GEG,
    &VAR_Z2OEG,
    &VAR_OXYEG,
    &VAR_CH4EG,
    &VAR_ZNH3EG,
    &VAR_TOPO_GRID,
    &VAR_NUI,
    &VAR_NJ,
    &VAR_CDPTH,
    &VAR_BKDSI,
    &VAR_CSAND,
    &VAR_CSILT,
    &VAR_PH,
    &VAR_CORGC,
    &VAR_CORGN,
    &VAR_CNH4,
    &VAR_CNO3,
    &VAR_FC,
    &VAR_WP,
    &VAR_SCNV,
];

// ============================================================================
// Climate file
// ============================================================================

pub const CLIMATE_DIMENSIONS: &[&str] = &["year", "day", "hour", "ngrid"];

define_schema_variable!(
    VAR_TMPH,
    name = "TMPH",
    long_name = Some("hourly air temperature"),
    unit = Some("oC"),
    fill_value = Some(CLIMATE_FILL_VALUE),
    dimensions = ["year", "day", "hour", "ngrid"],
);

define_schema_variable!(
    VAR_WINDH,
    name = "WINDH",
    long_name = Some("horizontal wind speed"),
    unit = Some("m s^-1"),
    fill_value = Some(CLIMATE_FILL_VALUE),
    dimensions = ["year", "day", "hour", "ngrid"],
);

define_schema_variable!(
    VAR_RAINH,
    name = "RAINH",
    long_name = Some("Total precipitation"),
    unit = Some("mm m^-2 hr^-1"),
    fill_value = Some(CLIMATE_FILL_VALUE),
    dimensions = ["year", "day", "hour", "ngrid"],
);

define_schema_variable!(
    VAR_SRADH,
    name = "SRADH",
    long_name = Some("Incident solar radiation"),
    unit = Some("W m^-2"),
    fill_value = Some(CLIMATE_FILL_VALUE),
    dimensions = ["year", "day", "hour", "ngrid"],
);

define_schema_variable!(
    VAR_DWPTH,
    name = "DWPTH",
    long_name = Some("atmospheric vapor pressure"),
    unit = Some("kPa"),
    fill_value = Some(CLIMATE_FILL_VALUE),
    dimensions = ["year", "day", "hour", "ngrid"],
);

define_schema_variable!(
    VAR_CN4RIG,
    name = "CN4RIG",
    long_name = Some("NH4 conc in precip"),
    unit = Some("gN m^-3"),
    fill_value = None,
    dimensions = ["year", "ngrid"],
);

define_schema_variable!(
    VAR_CNORIG,
    name = "CNORIG",
    long_name = Some("NO3 conc in precip"),
    unit = Some("gN m^-3"),
    fill_value = None,
    dimensions = ["year", "ngrid"],
);

define_schema_variable!(
    VAR_PHRG,
    name = "PHRG",
    long_name = Some("pH in precipitation"),
    unit = None,
    fill_value = None,
    dimensions = ["year", "ngrid"],
);

pub static CLIMATE_VARIABLES: [&SchemaVariable; 8] = [
    &VAR_TMPH,
    &VAR_WINDH,
    &VAR_RAINH,
    &VAR_SRADH,
    &VAR_DWPTH,
    &VAR_CN4RIG,
    &VAR_CNORIG,
    &VAR_PHRG,
];

// ============================================================================
// PFT file
// ============================================================================

pub const PFT_DIMENSIONS: &[&str] = &[
    "year",
    "ntopou",
    "maxpfts",
    "maxpmgt",
    "nchar1",
    "ncharmgnt",
];

define_schema_variable!(
    VAR_NH1,
    name = "NH1",
    long_name = Some("Starting column from the west for a topo unit"),
    unit = None,
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_NH2,
    name = "NH2",
    long_name = Some("Starting row from the north for a topo unit"),
    unit = None,
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_NV1,
    name = "NV1",
    long_name = Some("Ending column at the east for a topo unit"),
    unit = None,
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_NV2,
    name = "NV2",
    long_name = Some("Ending row at the south for a topo unit"),
    unit = None,
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_NZ,
    name = "NZ",
    long_name = Some("Number of pfts on a topo unit"),
    unit = None,
    fill_value = None,
    dimensions = ["ntopou"],
);

define_schema_variable!(
    VAR_PFT_DFLAG,
    name = "pft_dflag",
    long_name = Some("Flag for plant management data"),
    unit = None,
    fill_value = None,
    dimensions = [],
);

define_schema_variable!(
    VAR_PFT_TYPE,
    name = "pft_type",
    long_name = None,
    unit = None,
    fill_value = None,
    dimensions = ["year", "ntopou", "maxpfts", "nchar1"],
);

define_schema_variable!(
    VAR_PFT_PLTINFO,
    name = "pft_pltinfo",
    long_name = Some("string containing planting information"),
    unit = None,
    fill_value = None,
    dimensions = ["year", "ntopou", "maxpfts", "ncharmgnt"],
);

define_schema_variable!(
    VAR_NMGNTS,
    name = "nmgnts",
    long_name = Some("Number of managements for a given pft in given topo unit in a year"),
    unit = None,
    fill_value = None,
    dimensions = ["year", "ntopou", "maxpfts"],
);

define_schema_variable!(
    VAR_PFT_MGMT,
    name = "pft_mgmt",
    long_name = Some("string containing plant management information"),
    unit = None,
    fill_value = None,
    dimensions = ["year", "ntopou", "maxpfts", "maxpmgt", "ncharmgnt"],
);

pub static PFT_VARIABLES: [&SchemaVariable; 10] = [
    &VAR_NH1,
    &VAR_NH2,
    &VAR_NV1,
    &VAR_NV2,
    &VAR_NZ,
    &VAR_PFT_DFLAG,
    &VAR_PFT_TYPE,
    &VAR_PFT_PLTINFO,
    &VAR_NMGNTS,
    &VAR_PFT_MGMT,
];

/// Dimensions and variables a file must contain.
#[derive(Debug, Clone, Copy)]
pub struct FileSchema {
    pub name: &'static str,
    pub dimensions: &'static [&'static str],
    pub variables: &'static [&'static SchemaVariable],
}

pub static GRID_SCHEMA: FileSchema = FileSchema {
    name: "grid",
    dimensions: GRID_DIMENSIONS,
    variables: &GRID_VARIABLES,
};

pub static CLIMATE_SCHEMA: FileSchema = FileSchema {
    name: "climate",
    dimensions: CLIMATE_DIMENSIONS,
    variables: &CLIMATE_VARIABLES,
};

pub static PFT_SCHEMA: FileSchema = FileSchema {
    name: "pft",
    dimensions: PFT_DIMENSIONS,
    variables: &PFT_VARIABLES,
};

impl FileSchema {
    /// Check that `dataset` declares every dimension and variable of this schema with the
    /// expected units and fill values. Extra variables are allowed.
    pub fn validate(&self, dataset: &Dataset) -> EcosimResult<()> {
        let violation = |details: String| EcosimError::SchemaViolation {
            schema: self.name.to_string(),
            details,
        };

        if let Some(missing) = self
            .dimensions
            .iter()
            .find(|d| dataset.dimension_len(d).is_none())
        {
            return Err(violation(format!("missing dimension {missing}")));
        }
        for variable in self.variables {
            variable.check(dataset).map_err(violation)?;
        }
        dataset.validate()
    }
}

pub fn validate_grid_schema(dataset: &Dataset) -> EcosimResult<()> {
    GRID_SCHEMA.validate(dataset)
}

/// Check a climate dataset, including the fixed 366-day and 24-hour axes.
pub fn validate_climate_schema(dataset: &Dataset) -> EcosimResult<()> {
    CLIMATE_SCHEMA.validate(dataset)?;
    for (dimension, len) in [("day", 366), ("hour", 24), ("ngrid", 1)] {
        if dataset.dimension_len(dimension) != Some(len) {
            return Err(EcosimError::SchemaViolation {
                schema: CLIMATE_SCHEMA.name.to_string(),
                details: format!("dimension {dimension} must have length {len}"),
            });
        }
    }
    Ok(())
}

pub fn validate_pft_schema(dataset: &Dataset) -> EcosimResult<()> {
    PFT_SCHEMA.validate(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn test_build_sets_attributes() {
        let v = VAR_CDPTH.build(Array::<f64, _>::zeros((1, 3)).into_dyn());
        assert_eq!(v.dimensions, vec!["ntopou", "nlevs"]);
        assert_eq!(v.long_name(), Some("Depth to bottom of soil layer"));
        assert_eq!(v.units(), Some("m"));
        assert_eq!(v.fill_value(), Some(SOIL_FILL_VALUE));

        let v = VAR_PHRG.build(Array::<f64, _>::zeros((1, 1)).into_dyn());
        assert_eq!(v.units(), None);
        assert_eq!(v.fill_value(), None);
    }

    #[test]
    fn test_variable_names_are_unique() {
        let mut names: Vec<&str> = GRID_VARIABLES
            .iter()
            .chain(CLIMATE_VARIABLES.iter())
            .chain(PFT_VARIABLES.iter())
            .map(|v| v.name)
            .collect();
        let n = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), n);
    }

    #[test]
    fn test_schema_dimensions_cover_variables() {
        for schema in [&GRID_SCHEMA, &CLIMATE_SCHEMA, &PFT_SCHEMA] {
            for variable in schema.variables {
                for d in variable.dimensions {
                    assert!(schema.dimensions.contains(d), "{} uses {}", variable.name, d);
                }
            }
        }
    }

    #[test]
    fn test_empty_dataset_fails_validation() {
        let err = validate_grid_schema(&Dataset::new()).unwrap_err();
        match err {
            EcosimError::SchemaViolation { schema, details } => {
                assert_eq!(schema, "grid");
                assert_eq!(details, "missing dimension ngrid");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
