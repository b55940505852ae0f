//! In-memory model of a self-describing multi-dimensional array file.
//!
//! A [`Dataset`] holds named dimensions, typed variables laid out along those dimensions and
//! global attributes, mirroring the NetCDF classic data model. Datasets are always built
//! completely in memory and validated as they grow, so a writer only ever sees a consistent
//! dataset and a failed build never leaves a partial file behind.
//!
//! # Examples
//!
//! ```rust
//! use ecosim_core::dataset::{Dataset, Variable};
//! use ndarray::Array;
//!
//! let mut ds = Dataset::new();
//! ds.add_dimension("ngrid", 1).unwrap();
//! ds.add_dimension("nlevs", 3).unwrap();
//! ds.add_variable(
//!     Variable::new("CDPTH", &["ngrid", "nlevs"], Array::from_elem((1, 3), 0.1_f64).into_dyn())
//!         .with_attribute("units", "m"),
//! )
//! .unwrap();
//!
//! assert_eq!(ds.variable("CDPTH").unwrap().units(), Some("m"));
//! assert!(ds.add_dimension("ngrid", 2).is_err());
//! ```

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use crate::errors::{EcosimError, EcosimResult};

/// Value of a variable or global attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Int(i32),
    Double(f64),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, with integers widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Double(v) => Some(*v),
            AttributeValue::Int(v) => Some(f64::from(*v)),
            AttributeValue::Text(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => write!(f, "{s}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Double(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value)
    }
}

/// Attribute bag attached to a variable or to the dataset itself.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Typed array payload of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableData {
    Double(ArrayD<f64>),
    Int(ArrayD<i32>),
    Short(ArrayD<i16>),
    Byte(ArrayD<i8>),
    /// Single-byte characters along a trailing character dimension
    Char(ArrayD<u8>),
}

impl VariableData {
    pub fn shape(&self) -> &[usize] {
        match self {
            VariableData::Double(a) => a.shape(),
            VariableData::Int(a) => a.shape(),
            VariableData::Short(a) => a.shape(),
            VariableData::Byte(a) => a.shape(),
            VariableData::Char(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// CDL name of the element type.
    pub fn type_name(&self) -> &'static str {
        match self {
            VariableData::Double(_) => "double",
            VariableData::Int(_) => "int",
            VariableData::Short(_) => "short",
            VariableData::Byte(_) => "byte",
            VariableData::Char(_) => "char",
        }
    }

    pub fn as_double(&self) -> Option<&ArrayD<f64>> {
        match self {
            VariableData::Double(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_double_mut(&mut self) -> Option<&mut ArrayD<f64>> {
        match self {
            VariableData::Double(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&ArrayD<i32>> {
        match self {
            VariableData::Int(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<&ArrayD<u8>> {
        match self {
            VariableData::Char(a) => Some(a),
            _ => None,
        }
    }
}

impl From<ArrayD<f64>> for VariableData {
    fn from(value: ArrayD<f64>) -> Self {
        VariableData::Double(value)
    }
}

impl From<ArrayD<i32>> for VariableData {
    fn from(value: ArrayD<i32>) -> Self {
        VariableData::Int(value)
    }
}

impl From<ArrayD<i16>> for VariableData {
    fn from(value: ArrayD<i16>) -> Self {
        VariableData::Short(value)
    }
}

impl From<ArrayD<i8>> for VariableData {
    fn from(value: ArrayD<i8>) -> Self {
        VariableData::Byte(value)
    }
}

impl From<ArrayD<u8>> for VariableData {
    fn from(value: ArrayD<u8>) -> Self {
        VariableData::Char(value)
    }
}

/// A named array laid out along named dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub data: VariableData,
    pub attributes: Attributes,
}

impl Variable {
    /// Create a variable. A variable with no dimensions is a scalar and holds one value.
    pub fn new(name: impl Into<String>, dimensions: &[&str], data: impl Into<VariableData>) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            data: data.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn long_name(&self) -> Option<&str> {
        self.attributes.get("long_name").and_then(AttributeValue::as_text)
    }

    pub fn units(&self) -> Option<&str> {
        self.attributes.get("units").and_then(AttributeValue::as_text)
    }

    pub fn fill_value(&self) -> Option<f64> {
        self.attributes.get("_FillValue").and_then(AttributeValue::as_f64)
    }
}

/// A named dimension with a fixed length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// Dimensions, variables and global attributes of one array file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    dimensions: Vec<Dimension>,
    variables: Vec<Variable>,
    attributes: Attributes,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dimension(&mut self, name: impl Into<String>, len: usize) -> EcosimResult<()> {
        let name = name.into();
        if self.dimension_len(&name).is_some() {
            return Err(EcosimError::DuplicateName {
                kind: "dimension",
                name,
            });
        }
        self.dimensions.push(Dimension { name, len });
        Ok(())
    }

    /// Add a variable after checking that its shape matches its dimensions.
    pub fn add_variable(&mut self, variable: Variable) -> EcosimResult<()> {
        if self.variable(&variable.name).is_some() {
            return Err(EcosimError::DuplicateName {
                kind: "variable",
                name: variable.name,
            });
        }
        self.check_variable(&variable)?;
        self.variables.push(variable);
        Ok(())
    }

    /// Add a dimension together with a coordinate variable of the same name.
    pub fn add_coordinate(
        &mut self,
        name: &str,
        values: impl Into<VariableData>,
        attributes: &[(&str, AttributeValue)],
    ) -> EcosimResult<()> {
        let values = values.into();
        if values.shape().len() != 1 {
            return Err(EcosimError::Shape {
                variable: name.to_string(),
                dimensions: vec![name.to_string()],
                expected: vec![values.len()],
                actual: values.shape().to_vec(),
            });
        }
        self.add_dimension(name, values.len())?;
        let mut variable = Variable::new(name, &[name], values);
        for (key, value) in attributes {
            variable.attributes.insert(key.to_string(), value.clone());
        }
        self.add_variable(variable)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.len)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Mutable access to a variable's data and attributes.
    ///
    /// Changing the shape of the data breaks the dataset; [`Dataset::validate`] catches it.
    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    /// Shape implied by a list of dimension names.
    pub fn shape_of(&self, variable: &str, dimensions: &[String]) -> EcosimResult<Vec<usize>> {
        dimensions
            .iter()
            .map(|d| {
                self.dimension_len(d)
                    .ok_or_else(|| EcosimError::UnknownDimension {
                        variable: variable.to_string(),
                        dimension: d.clone(),
                    })
            })
            .collect()
    }

    fn check_variable(&self, variable: &Variable) -> EcosimResult<()> {
        let expected = self.shape_of(&variable.name, &variable.dimensions)?;
        let actual = variable.data.shape();
        // variables without dimensions must hold a zero-dimensional array
        if expected.as_slice() != actual {
            return Err(EcosimError::Shape {
                variable: variable.name.clone(),
                dimensions: variable.dimensions.clone(),
                expected,
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }

    /// Check every variable against the declared dimensions.
    pub fn validate(&self) -> EcosimResult<()> {
        self.variables.iter().try_for_each(|v| self.check_variable(v))
    }

    /// Human-readable summary of dimensions and variables.
    ///
    /// ```rust
    /// use ecosim_core::dataset::{Dataset, Variable};
    /// use ndarray::{arr0, Array1};
    ///
    /// let mut ds = Dataset::new();
    /// ds.add_coordinate("day", Array1::from_iter(1..=366_i32).into_dyn(), &[]).unwrap();
    /// ds.add_variable(Variable::new("flag", &[], arr0(0_i32).into_dyn())).unwrap();
    ///
    /// let text = ds.describe();
    /// assert!(text.contains("day = 366"));
    /// assert!(text.contains("int flag()"));
    /// ```
    pub fn describe(&self) -> String {
        let mut out = String::from("dimensions:\n");
        for d in &self.dimensions {
            let _ = writeln!(out, "  {} = {}", d.name, d.len);
        }
        out.push_str("variables:\n");
        for v in &self.variables {
            let _ = write!(
                out,
                "  {} {}({}) shape={:?}",
                v.data.type_name(),
                v.name,
                v.dimensions.join(", "),
                v.data.shape()
            );
            if let Some(units) = v.units() {
                let _ = write!(out, " units={units}");
            }
            if let Some(long_name) = v.long_name() {
                let _ = write!(out, " long_name=\"{long_name}\"");
            }
            out.push('\n');
        }
        if !self.attributes.is_empty() {
            out.push_str("global attributes:\n");
            for (key, value) in &self.attributes {
                let _ = writeln!(out, "  {key} = {value}");
            }
        }
        out
    }
}

/// Fixed-capacity byte buffer for character-array fields.
///
/// Text is padded on the right with spaces and then cut to the capacity, so the buffer
/// always holds exactly `capacity` bytes. Cutting happens on bytes, which can split a
/// multi-byte character; the character-array schema only carries single bytes anyway.
///
/// ```rust
/// use ecosim_core::dataset::FixedBytes;
///
/// let code = FixedBytes::new("DBF", 5);
/// assert_eq!(code.as_bytes(), b"DBF  ");
/// assert_eq!(FixedBytes::new("ABCDEFG", 3).as_bytes(), b"ABC");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedBytes {
    bytes: Vec<u8>,
}

impl FixedBytes {
    pub fn new(text: &str, capacity: usize) -> Self {
        let mut bytes: Vec<u8> = text.bytes().take(capacity).collect();
        bytes.resize(capacity, b' ');
        Self { bytes }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The text without its padding.
    pub fn trimmed(&self) -> String {
        String::from_utf8_lossy(&self.bytes).trim_end().to_string()
    }

    /// Repeat the buffer over `leading` dimensions, giving shape `leading + [capacity]`.
    pub fn broadcast(&self, leading: &[usize]) -> ArrayD<u8> {
        let mut shape = leading.to_vec();
        shape.push(self.capacity());
        let last = leading.len();
        ArrayD::from_shape_fn(IxDyn(&shape), |index| self.bytes[index[last]])
    }
}
