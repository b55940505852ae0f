//! Writing finished datasets to disk.
//!
//! Writers only ever see a dataset that has been fully built and checked, and they write
//! to a temporary file in the destination directory that is renamed into place at the end.
//! A failed write therefore leaves no partial output file, and an existing file is replaced
//! rather than appended to.
//!
//! Two backends are available:
//!
//! - [`CdlWriter`] writes the CDL text form read by `ncgen`. Always available.
//! - [`NetcdfWriter`] writes native NetCDF through the netCDF-C library. Only available
//!   when the crate is built with the `netcdf` feature.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Write as _};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use ecosim_core::dataset::{AttributeValue, Attributes, Dataset, Variable, VariableData};
use ecosim_core::errors::{EcosimError, EcosimResult};

/// Backend used to write datasets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cdl,
    Netcdf,
}

impl Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cdl => write!(f, "cdl"),
            Backend::Netcdf => write!(f, "netcdf"),
        }
    }
}

/// Writes a [`Dataset`] to a file, replacing any existing file.
pub trait DatasetWriter {
    /// File extension of the written files, without the dot.
    fn extension(&self) -> &'static str;

    fn write(&self, dataset: &Dataset, path: &Path) -> EcosimResult<()>;

    /// Path of the file called `name` in `dir` with this writer's extension appended.
    ///
    /// The extension is appended rather than substituted, so names that contain a dot
    /// such as `site_pft.DBF` are kept whole.
    fn output_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{}", self.extension()))
    }
}

/// Create the writer for a backend.
///
/// Fails with [`EcosimError::BackendUnavailable`] if the backend was not compiled in.
pub fn writer_for(backend: Backend) -> EcosimResult<Box<dyn DatasetWriter>> {
    match backend {
        Backend::Cdl => Ok(Box::new(CdlWriter)),
        Backend::Netcdf => Ok(Box::new(NetcdfWriter::new()?)),
    }
}

/// Let `fill` write a temporary file next to `path`, then move it into place.
fn persist_with(path: &Path, fill: impl FnOnce(&Path) -> EcosimResult<()>) -> EcosimResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let temp = NamedTempFile::new_in(&parent)?.into_temp_path();
    fill(&temp)?;
    temp.persist(path).map_err(|e| EcosimError::Io(e.error))?;
    Ok(())
}

/// Writes datasets as CDL text.
///
/// The output can be turned into a binary file with `ncgen -o file.nc file.cdl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdlWriter;

impl CdlWriter {
    /// Render a dataset as CDL. `name` is used for the header line.
    pub fn render(&self, dataset: &Dataset, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "netcdf {} {{", cdl_name(name));

        out.push_str("dimensions:\n");
        for d in dataset.dimensions() {
            let _ = writeln!(out, "\t{} = {} ;", d.name, d.len);
        }

        out.push_str("variables:\n");
        for v in dataset.variables() {
            if v.dimensions.is_empty() {
                let _ = writeln!(out, "\t{} {} ;", v.data.type_name(), v.name);
            } else {
                let _ = writeln!(
                    out,
                    "\t{} {}({}) ;",
                    v.data.type_name(),
                    v.name,
                    v.dimensions.join(", ")
                );
            }
            write_attributes(&mut out, &v.name, &v.attributes);
        }

        if !dataset.attributes().is_empty() {
            out.push_str("\n// global attributes:\n");
            write_attributes(&mut out, "", dataset.attributes());
        }

        out.push_str("data:\n");
        for v in dataset.variables() {
            out.push('\n');
            write_data(&mut out, v);
        }
        out.push_str("}\n");
        out
    }
}

impl DatasetWriter for CdlWriter {
    fn extension(&self) -> &'static str {
        "cdl"
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> EcosimResult<()> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        let text = self.render(dataset, name);
        persist_with(path, |temp| {
            let mut file = fs::File::create(temp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
            Ok(())
        })
    }
}

/// CDL identifiers may not contain dots or spaces.
fn cdl_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn format_attribute(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Text(s) => format!("\"{}\"", escape(s)),
        AttributeValue::Int(v) => v.to_string(),
        AttributeValue::Double(v) => format_double(*v),
    }
}

/// Doubles always carry a decimal point or exponent so `ncgen` reads them back as double.
fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:?}")
    }
}

fn write_attributes(out: &mut String, variable: &str, attributes: &Attributes) {
    for (key, value) in attributes {
        let _ = writeln!(out, "\t\t{variable}:{key} = {} ;", format_attribute(value));
    }
}

fn write_data(out: &mut String, variable: &Variable) {
    let values: Vec<String> = match &variable.data {
        VariableData::Double(a) => a.iter().map(|v| format_double(*v)).collect(),
        VariableData::Int(a) => a.iter().map(|v| v.to_string()).collect(),
        VariableData::Short(a) => a.iter().map(|v| v.to_string()).collect(),
        VariableData::Byte(a) => a.iter().map(|v| v.to_string()).collect(),
        VariableData::Char(a) => {
            // one string per row of the trailing character dimension
            let width = a.shape().last().copied().unwrap_or(1).max(1);
            let bytes: Vec<u8> = a.iter().copied().collect();
            bytes
                .chunks(width)
                .map(|row| {
                    let end = row.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                    format!("\"{}\"", escape(&String::from_utf8_lossy(&row[..end])))
                })
                .collect()
        }
    };
    let _ = writeln!(out, " {} = {} ;", variable.name, values.join(", "));
}

/// Writes native NetCDF files.
///
/// Constructing the writer fails with [`EcosimError::BackendUnavailable`] when the crate
/// was built without the `netcdf` feature, before any dataset is built.
#[derive(Debug, Clone, Copy)]
pub struct NetcdfWriter {
    _private: (),
}

impl NetcdfWriter {
    #[cfg(feature = "netcdf")]
    pub fn new() -> EcosimResult<Self> {
        Ok(Self { _private: () })
    }

    #[cfg(not(feature = "netcdf"))]
    pub fn new() -> EcosimResult<Self> {
        Err(EcosimError::BackendUnavailable(
            "built without the `netcdf` feature".to_string(),
        ))
    }
}

#[cfg(feature = "netcdf")]
impl DatasetWriter for NetcdfWriter {
    fn extension(&self) -> &'static str {
        "nc"
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> EcosimResult<()> {
        persist_with(path, |temp| write_netcdf(dataset, temp).map_err(backend_error))
    }
}

#[cfg(not(feature = "netcdf"))]
impl DatasetWriter for NetcdfWriter {
    fn extension(&self) -> &'static str {
        "nc"
    }

    fn write(&self, _dataset: &Dataset, _path: &Path) -> EcosimResult<()> {
        Err(EcosimError::BackendUnavailable(
            "built without the `netcdf` feature".to_string(),
        ))
    }
}

#[cfg(feature = "netcdf")]
fn backend_error(error: netcdf::Error) -> EcosimError {
    EcosimError::Backend(error.to_string())
}

#[cfg(feature = "netcdf")]
fn put_attributes(
    variable: &mut netcdf::VariableMut<'_>,
    attributes: &Attributes,
) -> Result<(), netcdf::Error> {
    for (key, value) in attributes {
        match value {
            AttributeValue::Text(s) => variable.put_attribute(key, s.as_str())?,
            AttributeValue::Int(v) => variable.put_attribute(key, *v)?,
            AttributeValue::Double(v) => variable.put_attribute(key, *v)?,
        };
    }
    Ok(())
}

#[cfg(feature = "netcdf")]
fn write_netcdf(dataset: &Dataset, path: &Path) -> Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;
    for d in dataset.dimensions() {
        file.add_dimension(&d.name, d.len)?;
    }
    for (key, value) in dataset.attributes() {
        match value {
            AttributeValue::Text(s) => file.add_attribute(key, s.as_str())?,
            AttributeValue::Int(v) => file.add_attribute(key, *v)?,
            AttributeValue::Double(v) => file.add_attribute(key, *v)?,
        };
    }
    for v in dataset.variables() {
        let dims: Vec<&str> = v.dimensions.iter().map(String::as_str).collect();
        let mut variable = match &v.data {
            VariableData::Double(_) => file.add_variable::<f64>(&v.name, &dims)?,
            VariableData::Int(_) => file.add_variable::<i32>(&v.name, &dims)?,
            VariableData::Short(_) => file.add_variable::<i16>(&v.name, &dims)?,
            VariableData::Byte(_) => file.add_variable::<i8>(&v.name, &dims)?,
            VariableData::Char(_) => file.add_variable_with_type(
                &v.name,
                &dims,
                &netcdf::types::NcVariableType::Char,
            )?,
        };
        put_attributes(&mut variable, &v.attributes)?;
        match &v.data {
            VariableData::Double(a) => variable.put(a.view(), ..)?,
            VariableData::Int(a) => variable.put(a.view(), ..)?,
            VariableData::Short(a) => variable.put(a.view(), ..)?,
            VariableData::Byte(a) => variable.put(a.view(), ..)?,
            VariableData::Char(a) => {
                let bytes: Vec<u8> = a.iter().copied().collect();
                variable.put_raw_values(&bytes, ..)?
            }
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_core::dataset::FixedBytes;
    use ndarray::{arr0, Array, Array1};

    fn small_dataset() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_coordinate("ngrid", Array1::from_vec(vec![0_i32]).into_dyn(), &[])
            .unwrap();
        ds.add_dimension("nchar1", 5).unwrap();
        ds.add_variable(
            Variable::new(
                "TMPH",
                &["ngrid"],
                Array::from_elem(1, 1.0e30_f64).into_dyn(),
            )
            .with_attribute("units", "oC")
            .with_attribute("_FillValue", 1.0e30),
        )
        .unwrap();
        ds.add_variable(
            Variable::new("pft_type", &["ngrid", "nchar1"], FixedBytes::new("DBF", 5).broadcast(&[1]))
                .with_attribute("long_name", "say \"hi\""),
        )
        .unwrap();
        ds.add_variable(Variable::new("flag", &[], arr0(0_i32).into_dyn()))
            .unwrap();
        ds.set_attribute("title", "test");
        ds
    }

    #[test]
    fn test_render_cdl() {
        let text = CdlWriter.render(&small_dataset(), "site_pft.DBF");
        assert!(text.starts_with("netcdf site_pft_DBF {\n"));
        assert!(text.contains("\tngrid = 1 ;\n"));
        assert!(text.contains("\tdouble TMPH(ngrid) ;\n"));
        assert!(text.contains("\t\tTMPH:_FillValue = 1e30 ;\n"));
        assert!(text.contains("\t\tTMPH:units = \"oC\" ;\n"));
        assert!(text.contains("\t\tpft_type:long_name = \"say \\\"hi\\\"\" ;\n"));
        assert!(text.contains("\tint flag ;\n"));
        assert!(text.contains("\t\t:title = \"test\" ;\n"));
        assert!(text.contains(" TMPH = 1e30 ;\n"));
        assert!(text.contains(" pft_type = \"DBF  \" ;\n"));
        assert!(text.contains(" flag = 0 ;\n"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_null_characters_are_dropped() {
        let mut ds = Dataset::new();
        ds.add_dimension("n", 2).unwrap();
        ds.add_dimension("nchar", 3).unwrap();
        ds.add_variable(Variable::new(
            "mgmt",
            &["n", "nchar"],
            Array::<u8, _>::zeros((2, 3)).into_dyn(),
        ))
        .unwrap();
        let text = CdlWriter.render(&ds, "x");
        assert!(text.contains(" mgmt = \"\", \"\" ;\n"));
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = CdlWriter.output_path(dir.path(), "site_pft.DBF");
        assert_eq!(path.file_name().unwrap(), "site_pft.DBF.cdl");

        std::fs::write(&path, "old contents").unwrap();
        CdlWriter.write(&small_dataset(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("netcdf site_pft_DBF {"));
        // only the output file is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("grid.cdl");
        CdlWriter.write(&small_dataset(), &path).unwrap();
        assert!(path.exists());
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_netcdf_unavailable() {
        assert!(matches!(
            NetcdfWriter::new(),
            Err(EcosimError::BackendUnavailable(_))
        ));
        assert!(matches!(
            writer_for(Backend::Netcdf),
            Err(EcosimError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_backend_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: Backend,
        }
        let w: Wrapper = serde_json::from_str(r#"{"backend": "netcdf"}"#).unwrap();
        assert_eq!(w.backend, Backend::Netcdf);
        assert_eq!(Backend::default(), Backend::Cdl);
        assert_eq!(writer_for(Backend::Cdl).unwrap().extension(), "cdl");
    }
}
