//! In-memory labeled observation arrays
//!
//! A [`Dataset`] is the crate's model of one netCDF file's worth of data: an
//! ordered set of named variables sharing the `obs` record dimension, plus
//! global attributes. Row selection and concatenation along `obs` are the
//! only structural operations the pipeline needs, so those are the only ones
//! provided here.

use crate::errors::{ObsPackError, Result};
use ndarray::{concatenate, Array1, ArrayD, ArrayViewD, Axis, IxDyn};
use netcdf::AttributeValue;
use std::collections::BTreeMap;

/// Name of the observation (record) dimension
pub const OBS_DIM: &str = "obs";

/// Attribute map, ordered by name so output files are reproducible
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Values held by a variable
#[derive(Debug, Clone)]
pub enum VarData {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
    /// Seconds since 1970-01-01T00:00:00 UTC
    Time(ArrayD<i64>),
    /// One string per record
    Text(Vec<String>),
}

impl VarData {
    /// Short name of the storage kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            VarData::Float(_) => "float",
            VarData::Int(_) => "int",
            VarData::Time(_) => "time",
            VarData::Text(_) => "text",
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            VarData::Float(a) => a.shape().to_vec(),
            VarData::Int(a) | VarData::Time(a) => a.shape().to_vec(),
            VarData::Text(v) => vec![v.len()],
        }
    }

    fn take(&self, rows: &[usize]) -> VarData {
        match self {
            VarData::Float(a) => VarData::Float(a.select(Axis(0), rows)),
            VarData::Int(a) => VarData::Int(a.select(Axis(0), rows)),
            VarData::Time(a) => VarData::Time(a.select(Axis(0), rows)),
            VarData::Text(v) => VarData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// On-disk encoding carried alongside a variable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoding {
    /// Fixed byte width for text stored as a character array
    pub char_width: Option<usize>,
    /// Value written as `_FillValue`, cast to the variable's storage type
    pub fill_value: Option<f64>,
}

/// A named, dimensioned array with its attributes
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: VarData,
    pub attributes: Attributes,
    pub encoding: Encoding,
}

impl Variable {
    pub fn new(name: &str, dims: &[&str], data: VarData) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            data,
            attributes: Attributes::new(),
            encoding: Encoding::default(),
        }
    }

    /// One-dimensional floating record variable
    pub fn float(name: &str, values: Vec<f64>) -> Self {
        let data = Array1::from(values).into_dyn();
        Self::new(name, &[OBS_DIM], VarData::Float(data))
    }

    /// One-dimensional integer record variable
    pub fn int(name: &str, values: Vec<i64>) -> Self {
        let data = Array1::from(values).into_dyn();
        Self::new(name, &[OBS_DIM], VarData::Int(data))
    }

    /// One-dimensional time record variable (seconds since the epoch)
    pub fn time(name: &str, seconds: Vec<i64>) -> Self {
        let data = Array1::from(seconds).into_dyn();
        Self::new(name, &[OBS_DIM], VarData::Time(data))
    }

    /// Text record variable
    pub fn text(name: &str, values: Vec<String>) -> Self {
        Self::new(name, &[OBS_DIM], VarData::Text(values))
    }

    pub fn with_attribute<V: Into<AttributeValue>>(mut self, name: &str, value: V) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Whether the variable is indexed by `obs` along its first axis
    pub fn is_record(&self) -> bool {
        self.dims.first().map(String::as_str) == Some(OBS_DIM)
    }

    /// Number of records (length of the first axis)
    pub fn len(&self) -> usize {
        self.data.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of a one-dimensional numeric variable as `f64`
    pub fn to_f64(&self) -> Result<Vec<f64>> {
        match &self.data {
            VarData::Float(a) if a.ndim() == 1 => Ok(a.iter().copied().collect()),
            VarData::Int(a) if a.ndim() == 1 => Ok(a.iter().map(|&v| v as f64).collect()),
            other => Err(ObsPackError::shape_mismatch(
                &self.name,
                format!("expected a 1-D numeric variable, found {} {:?}", other.kind(), other.shape()),
            )),
        }
    }

    /// Values of a one-dimensional time variable
    pub fn to_epoch_seconds(&self) -> Result<Vec<i64>> {
        match &self.data {
            VarData::Time(a) if a.ndim() == 1 => Ok(a.iter().copied().collect()),
            other => Err(ObsPackError::shape_mismatch(
                &self.name,
                format!("expected a 1-D time variable, found {} {:?}", other.kind(), other.shape()),
            )),
        }
    }

    pub fn as_text(&self) -> Result<&[String]> {
        match &self.data {
            VarData::Text(v) => Ok(v),
            other => Err(ObsPackError::shape_mismatch(
                &self.name,
                format!("expected a text variable, found {}", other.kind()),
            )),
        }
    }

    /// Keeps only the given records; non-record variables are returned as-is.
    pub fn take(&self, rows: &[usize]) -> Variable {
        if !self.is_record() {
            return self.clone();
        }
        Variable {
            data: self.data.take(rows),
            ..self.clone_without_data()
        }
    }

    fn clone_without_data(&self) -> Variable {
        Variable {
            name: self.name.clone(),
            dims: self.dims.clone(),
            data: VarData::Text(Vec::new()),
            attributes: self.attributes.clone(),
            encoding: self.encoding.clone(),
        }
    }
}

/// An ordered collection of variables sharing the `obs` dimension
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    variables: Vec<Variable>,
    pub attributes: Attributes,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records along `obs`
    pub fn len(&self) -> usize {
        self.variables
            .iter()
            .find(|v| v.is_record())
            .map(Variable::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    /// Looks up a variable, failing with `VariableNotFound` when absent
    pub fn require(&self, name: &str) -> Result<&Variable> {
        self.variable(name)
            .ok_or_else(|| ObsPackError::variable_not_found(name))
    }

    /// Adds a variable, replacing any existing one with the same name.
    ///
    /// Record variables must match the dataset's current record count.
    pub fn insert(&mut self, var: Variable) -> Result<()> {
        if var.is_record() {
            let existing = self
                .variables
                .iter()
                .find(|v| v.is_record() && v.name != var.name);
            if let Some(existing) = existing {
                if existing.len() != var.len() {
                    return Err(ObsPackError::shape_mismatch(
                        &var.name,
                        format!("has {} records, dataset has {}", var.len(), existing.len()),
                    ));
                }
            }
        }
        match self.variables.iter_mut().find(|v| v.name == var.name) {
            Some(slot) => *slot = var,
            None => self.variables.push(var),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        let idx = self.variables.iter().position(|v| v.name == name)?;
        Some(self.variables.remove(idx))
    }

    /// Removes every named variable that is present
    pub fn drop_variables(&mut self, names: &[&str]) {
        self.variables.retain(|v| !names.contains(&v.name.as_str()));
    }

    /// New dataset holding only the given record indices
    pub fn take(&self, rows: &[usize]) -> Dataset {
        Dataset {
            variables: self.variables.iter().map(|v| v.take(rows)).collect(),
            attributes: self.attributes.clone(),
        }
    }

    /// New dataset holding the records where `mask` is true
    pub fn filter(&self, mask: &[bool]) -> Result<Dataset> {
        if mask.len() != self.len() {
            return Err(ObsPackError::shape_mismatch(
                OBS_DIM,
                format!("mask has {} entries for {} records", mask.len(), self.len()),
            ));
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Ok(self.take(&rows))
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Global attribute as text
    pub fn string_attribute(&self, name: &str) -> Result<String> {
        let value = self
            .attribute(name)
            .ok_or_else(|| ObsPackError::attribute_not_found(name))?;
        attribute_to_string(value).ok_or_else(|| ObsPackError::InvalidAttribute {
            attr: name.to_string(),
            message: format!("expected text, found {:?}", value),
        })
    }

    /// Global attribute as a number
    pub fn numeric_attribute(&self, name: &str) -> Result<f64> {
        let value = self
            .attribute(name)
            .ok_or_else(|| ObsPackError::attribute_not_found(name))?;
        attribute_to_f64(value).ok_or_else(|| ObsPackError::InvalidAttribute {
            attr: name.to_string(),
            message: format!("expected a number, found {:?}", value),
        })
    }

    pub fn clear_attributes(&mut self) {
        self.attributes.clear();
    }

    /// Concatenates datasets along `obs`.
    ///
    /// Variables are the union of all inputs in first-seen order. Attributes
    /// and encodings come from the first input holding each variable; global
    /// attributes come from the first input. Inputs lacking a variable
    /// contribute empty strings to text and NaN to numbers, so an integer
    /// variable missing from any input comes out as float.
    pub fn concat(parts: &[Dataset]) -> Result<Dataset> {
        let mut names: Vec<&str> = Vec::new();
        for part in parts {
            for var in &part.variables {
                if !names.contains(&var.name.as_str()) {
                    names.push(&var.name);
                }
            }
        }

        let mut out = Dataset {
            variables: Vec::with_capacity(names.len()),
            attributes: parts.first().map(|p| p.attributes.clone()).unwrap_or_default(),
        };
        let lengths: Vec<usize> = parts.iter().map(Dataset::len).collect();
        for name in names {
            let pieces: Vec<Option<&Variable>> = parts.iter().map(|p| p.variable(name)).collect();
            let template = match pieces.iter().flatten().next() {
                Some(var) => *var,
                None => continue,
            };
            if !template.is_record() {
                out.variables.push(template.clone());
                continue;
            }
            let data = concat_data(template, &pieces, &lengths)?;
            out.variables.push(Variable {
                data,
                ..template.clone_without_data()
            });
        }
        Ok(out)
    }
}

fn concat_data(template: &Variable, pieces: &[Option<&Variable>], lengths: &[usize]) -> Result<VarData> {
    let name = template.name.as_str();
    let present: Vec<&VarData> = pieces.iter().flatten().map(|v| &v.data).collect();
    let tail: Vec<usize> = template.data.shape().into_iter().skip(1).collect();

    if present.iter().any(|d| matches!(d, VarData::Text(_))) {
        let mut values = Vec::new();
        for (piece, &n) in pieces.iter().zip(lengths) {
            match piece.map(|v| &v.data) {
                Some(VarData::Text(v)) => values.extend(v.iter().cloned()),
                Some(other) => {
                    return Err(ObsPackError::shape_mismatch(
                        name,
                        format!("cannot concatenate text with {}", other.kind()),
                    ))
                }
                None => values.extend(std::iter::repeat(String::new()).take(n)),
            }
        }
        return Ok(VarData::Text(values));
    }

    let is_time = present.iter().any(|d| matches!(d, VarData::Time(_)));
    let is_float =
        present.len() < pieces.len() || present.iter().any(|d| matches!(d, VarData::Float(_)));

    if is_time {
        let mut arrays = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match piece.map(|v| &v.data) {
                Some(VarData::Time(a)) => arrays.push(a.view()),
                Some(other) => {
                    return Err(ObsPackError::shape_mismatch(
                        name,
                        format!("cannot concatenate time with {}", other.kind()),
                    ))
                }
                None => return Err(missing_in_some(name, "time")),
            }
        }
        return Ok(VarData::Time(join(name, &arrays)?));
    }

    if is_float {
        let owned: Vec<ArrayD<f64>> = pieces
            .iter()
            .zip(lengths)
            .map(|(piece, &n)| match piece.map(|v| &v.data) {
                Some(VarData::Float(a)) => a.clone(),
                Some(VarData::Int(a)) => a.mapv(|v| v as f64),
                _ => {
                    let mut shape = vec![n];
                    shape.extend_from_slice(&tail);
                    ArrayD::from_elem(IxDyn(&shape), f64::NAN)
                }
            })
            .collect();
        let views: Vec<ArrayViewD<f64>> = owned.iter().map(|a| a.view()).collect();
        return Ok(VarData::Float(join(name, &views)?));
    }

    let mut arrays = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match piece.map(|v| &v.data) {
            Some(VarData::Int(a)) => arrays.push(a.view()),
            _ => return Err(missing_in_some(name, "int")),
        }
    }
    Ok(VarData::Int(join(name, &arrays)?))
}

fn join<T: Clone>(name: &str, arrays: &[ArrayViewD<T>]) -> Result<ArrayD<T>> {
    concatenate(Axis(0), arrays).map_err(|e| ObsPackError::shape_mismatch(name, e))
}

fn missing_in_some(name: &str, kind: &str) -> ObsPackError {
    ObsPackError::shape_mismatch(
        name,
        format!("{} variable is missing from some inputs and has no missing-value form", kind),
    )
}

/// Converts a scalar (or single-element) numeric attribute to `f64`.
/// Text attributes are parsed.
pub fn attribute_to_f64(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Uchar(v) => Some(*v as f64),
        AttributeValue::Ushort(v) => Some(*v as f64),
        AttributeValue::Short(v) => Some(*v as f64),
        AttributeValue::Uint(v) => Some(*v as f64),
        AttributeValue::Int(v) => Some(*v as f64),
        AttributeValue::Ulonglong(v) => Some(*v as f64),
        AttributeValue::Longlong(v) => Some(*v as f64),
        AttributeValue::Float(v) => Some(*v as f64),
        AttributeValue::Double(v) => Some(*v),
        AttributeValue::Shorts(v) if v.len() == 1 => Some(v[0] as f64),
        AttributeValue::Ints(v) if v.len() == 1 => Some(v[0] as f64),
        AttributeValue::Floats(v) if v.len() == 1 => Some(v[0] as f64),
        AttributeValue::Doubles(v) if v.len() == 1 => Some(v[0]),
        AttributeValue::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Converts a text attribute to a `String`
pub fn attribute_to_string(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Str(s) => Some(s.clone()),
        AttributeValue::Strs(v) if v.len() == 1 => Some(v[0].clone()),
        _ => None,
    }
}
