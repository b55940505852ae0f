//! Warming treatments.
//!
//! A warming treatment is a uniform temperature offset added to every timestep of a
//! temperature series. Treatment files are otherwise identical to their control.

use log::debug;
use ndarray::ArrayD;

use ecosim_core::dataset::Dataset;
use ecosim_core::errors::{EcosimError, EcosimResult};
use ecosim_core::site::ExperimentalSite;

/// Fraction of the air temperature offset applied to the dewpoint.
///
/// Dewpoint rises less than air temperature under warming.
pub const DEWPOINT_WARMING_FACTOR: f64 = 0.7;

/// Temperature offset to apply to a site's climate.
///
/// `None` unless warming was requested and the site reports a non-zero increase.
pub fn temperature_offset(site: &ExperimentalSite, apply_warming: bool) -> Option<f64> {
    if !apply_warming {
        return None;
    }
    site.temperature_increase_c.filter(|t| *t != 0.0)
}

/// Add `offset` to every value that is not the fill value.
pub fn offset_values(values: &mut ArrayD<f64>, offset: f64, fill_value: Option<f64>) {
    match fill_value {
        Some(fill) => values.mapv_inplace(|v| if v == fill { v } else { v + offset }),
        None => values.mapv_inplace(|v| v + offset),
    }
}

fn offset_variable(dataset: &mut Dataset, name: &str, offset: f64) -> EcosimResult<()> {
    let Some(variable) = dataset.variable_mut(name) else {
        return Ok(());
    };
    let fill_value = variable.fill_value();
    let values = variable.data.as_double_mut().ok_or_else(|| {
        EcosimError::Reanalysis(format!("{name} must hold floating point values to be warmed"))
    })?;
    offset_values(values, offset, fill_value);
    Ok(())
}

/// Warm a reanalysis dataset, returning a modified copy.
///
/// `t2m` is raised by `warming_c` and `d2m` by [`DEWPOINT_WARMING_FACTOR`] times that.
/// Either variable may be absent; fill values are left untouched.
///
/// ```rust
/// use ecosim_components::warming::apply_warming_treatment;
/// use ecosim_core::dataset::{Dataset, Variable};
/// use ndarray::Array;
///
/// let mut control = Dataset::new();
/// control.add_dimension("time", 2).unwrap();
/// control
///     .add_variable(Variable::new("d2m", &["time"], Array::from_elem(2, 270.0_f64).into_dyn()))
///     .unwrap();
///
/// let treatment = apply_warming_treatment(&control, 2.0).unwrap();
/// let d2m = treatment.variable("d2m").unwrap().data.as_double().unwrap();
/// assert!((d2m[[0]] - 271.4).abs() < 1e-9);
/// ```
pub fn apply_warming_treatment(reanalysis: &Dataset, warming_c: f64) -> EcosimResult<Dataset> {
    let mut treatment = reanalysis.clone();
    offset_variable(&mut treatment, "t2m", warming_c)?;
    offset_variable(&mut treatment, "d2m", warming_c * DEWPOINT_WARMING_FACTOR)?;
    treatment.set_attribute("warming_treatment_c", warming_c);
    debug!("Applied +{warming_c:.2} C warming to reanalysis data");
    Ok(treatment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_core::dataset::Variable;
    use is_close::is_close;
    use ndarray::{Array, Array1};

    fn reanalysis() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 3).unwrap();
        ds.add_variable(
            Variable::new(
                "t2m",
                &["time"],
                Array1::from_vec(vec![270.0, 1.0e30, 280.0]).into_dyn(),
            )
            .with_attribute("_FillValue", 1.0e30),
        )
        .unwrap();
        ds.add_variable(Variable::new(
            "d2m",
            &["time"],
            Array::from_elem(3, 265.0_f64).into_dyn(),
        ))
        .unwrap();
        ds.add_variable(Variable::new(
            "tp",
            &["time"],
            Array::from_elem(3, 0.001_f64).into_dyn(),
        ))
        .unwrap();
        ds
    }

    #[test]
    fn test_offsets() {
        let control = reanalysis();
        let treatment = apply_warming_treatment(&control, 2.5).unwrap();

        let t2m = treatment.variable("t2m").unwrap().data.as_double().unwrap();
        assert_eq!(t2m.iter().copied().collect::<Vec<f64>>(), vec![272.5, 1.0e30, 282.5]);

        let d2m = treatment.variable("d2m").unwrap().data.as_double().unwrap();
        assert!(d2m.iter().all(|v| is_close!(*v, 265.0 + 1.75)));

        // other variables and the control are unchanged
        assert_eq!(treatment.variable("tp"), control.variable("tp"));
        let original = control.variable("t2m").unwrap().data.as_double().unwrap();
        assert_eq!(original[[0]], 270.0);
        assert_eq!(
            treatment.attribute("warming_treatment_c").and_then(|a| a.as_f64()),
            Some(2.5)
        );
    }

    #[test]
    fn test_missing_variables_are_skipped() {
        let treatment = apply_warming_treatment(&Dataset::new(), 1.0).unwrap();
        assert!(treatment.variables().is_empty());
    }

    #[test]
    fn test_integer_temperature_is_an_error() {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 1).unwrap();
        ds.add_variable(Variable::new(
            "t2m",
            &["time"],
            Array1::from_vec(vec![270_i32]).into_dyn(),
        ))
        .unwrap();
        assert!(matches!(
            apply_warming_treatment(&ds, 1.0),
            Err(EcosimError::Reanalysis(_))
        ));
    }

    #[test]
    fn test_temperature_offset() {
        let site = ExperimentalSite::new("x").with_temperature_increase(Some(2.0));
        assert_eq!(temperature_offset(&site, true), Some(2.0));
        assert_eq!(temperature_offset(&site, false), None);

        let zero = ExperimentalSite::new("x").with_temperature_increase(Some(0.0));
        assert_eq!(temperature_offset(&zero, true), None);
        assert_eq!(temperature_offset(&ExperimentalSite::new("x"), true), None);
    }
}
