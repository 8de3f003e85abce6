//! NetCDF I/O: reading ObsPack source files and writing daily files
//!
//! Reading is lazy per variable: [`SourceFile`] keeps the netCDF handle open
//! and only loads the variables a caller asks for. Writing goes through
//! [`DailyWriter`], which lays a [`Dataset`] out with an unlimited `obs`
//! dimension, deflate compression on every variable, fixed-width character
//! arrays for text and CF epoch-second time encoding.

use crate::cftime::{TimeUnits, CALENDAR, EPOCH_UNITS};
use crate::data_source::ObsSource;
use crate::dataset::{
    attribute_to_f64, attribute_to_string, Attributes, Dataset, Encoding, OBS_DIM, VarData,
    Variable,
};
use crate::errors::{ObsPackError, Result};
use ndarray::{ArrayD, IxDyn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::NcTypeDescriptor;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Deflate level used for daily files
pub const DEFLATE_LEVEL: i32 = 1;

/// An open ObsPack source file
pub struct SourceFile {
    path: PathBuf,
    file: netcdf::File,
}

impl SourceFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = netcdf::open(&path)?;
        Ok(Self { path, file })
    }
}

impl ObsSource for SourceFile {
    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    fn load_variable(&self, name: &str) -> Result<Variable> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| ObsPackError::variable_not_found(name))?;
        read_variable(&var)
    }

    fn global_attributes(&self) -> Result<Attributes> {
        let mut attrs = Attributes::new();
        for attr in self.file.attributes() {
            attrs.insert(attr.name().to_string(), attr.value()?);
        }
        Ok(attrs)
    }
}

/// Reads a whole netCDF file into memory.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let source = SourceFile::open(path)?;
    let names: Vec<String> = source.file.variables().map(|v| v.name().to_string()).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    source.load(&refs)
}

fn read_variable(var: &netcdf::Variable) -> Result<Variable> {
    let name = var.name().to_string();
    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

    let mut attributes = Attributes::new();
    for attr in var.attributes() {
        attributes.insert(attr.name().to_string(), attr.value()?);
    }
    let mut encoding = Encoding::default();
    if let Some(fill) = attributes.remove("_FillValue") {
        encoding.fill_value = attribute_to_f64(&fill);
    }
    let time_units = match attributes.get("units").and_then(attribute_to_string) {
        Some(units) if units.contains(" since ") => match TimeUnits::parse(&units) {
            Some(parsed) => Some(parsed),
            None => return Err(ObsPackError::InvalidTimeUnits { var: name, units }),
        },
        _ => None,
    };

    let (dims, data) = match var.vartype() {
        NcVariableType::Char => read_char_rows(var, &name, dims, &shape)?,
        NcVariableType::String => {
            if shape.len() != 1 {
                return Err(ObsPackError::shape_mismatch(
                    &name,
                    "only one-dimensional string variables are supported",
                ));
            }
            let values = (0..shape[0])
                .map(|i| var.get_string([i]))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            (dims, VarData::Text(values))
        }
        NcVariableType::Int(int_type) => {
            let values = read_ints(var, int_type, &shape)?;
            match time_units {
                Some(units) => (dims, VarData::Time(values.mapv(|v| units.int_to_epoch(v)))),
                None => (dims, VarData::Int(values)),
            }
        }
        NcVariableType::Float(float_type) => {
            let values = match float_type {
                FloatType::F32 => read_numeric::<f32>(var, &shape)?.mapv(f64::from),
                FloatType::F64 => read_numeric::<f64>(var, &shape)?,
            };
            match time_units {
                Some(units) => (dims, VarData::Time(values.mapv(|v| units.float_to_epoch(v)))),
                None => (dims, VarData::Float(values)),
            }
        }
        _ => {
            return Err(ObsPackError::shape_mismatch(
                &name,
                "unsupported netCDF type (compound, enum, opaque or vlen)",
            ))
        }
    };

    if matches!(data, VarData::Time(_)) {
        // Time is re-encoded on write; source units and fill no longer apply.
        attributes.remove("units");
        attributes.remove("calendar");
        encoding.fill_value = None;
    }

    Ok(Variable {
        name,
        dims,
        data,
        attributes,
        encoding,
    })
}

fn read_numeric<T>(var: &netcdf::Variable, shape: &[usize]) -> Result<ArrayD<T>>
where
    T: NcTypeDescriptor + Copy,
{
    let values = var.get_values::<T, _>(..)?;
    Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
}

fn read_ints(var: &netcdf::Variable, int_type: IntType, shape: &[usize]) -> Result<ArrayD<i64>> {
    let values = match int_type {
        IntType::U8 => read_numeric::<u8>(var, shape)?.mapv(i64::from),
        IntType::I8 => read_numeric::<i8>(var, shape)?.mapv(i64::from),
        IntType::U16 => read_numeric::<u16>(var, shape)?.mapv(i64::from),
        IntType::I16 => read_numeric::<i16>(var, shape)?.mapv(i64::from),
        IntType::U32 => read_numeric::<u32>(var, shape)?.mapv(i64::from),
        IntType::I32 => read_numeric::<i32>(var, shape)?.mapv(i64::from),
        IntType::U64 => read_numeric::<u64>(var, shape)?.mapv(|v| v as i64),
        IntType::I64 => read_numeric::<i64>(var, shape)?,
    };
    Ok(values)
}

/// Character arrays of shape `(obs, nchar)` become one string per record.
fn read_char_rows(
    var: &netcdf::Variable,
    name: &str,
    dims: Vec<String>,
    shape: &[usize],
) -> Result<(Vec<String>, VarData)> {
    let total: usize = shape.iter().product();
    let mut buf = vec![0u8; total];
    if total > 0 {
        var.get_raw_values_into(&mut buf, ..)?;
    }

    match shape {
        [] => Ok((dims, VarData::Text(vec![decode_chars(&buf)]))),
        [n] if dims[0] == OBS_DIM => {
            let values = buf.iter().take(*n).map(|b| decode_chars(&[*b])).collect();
            Ok((dims, VarData::Text(values)))
        }
        [_] => Ok((Vec::new(), VarData::Text(vec![decode_chars(&buf)]))),
        [rows, width] => {
            let values = if *width == 0 {
                vec![String::new(); *rows]
            } else {
                buf.chunks(*width).map(decode_chars).collect()
            };
            Ok((vec![dims[0].clone()], VarData::Text(values)))
        }
        _ => Err(ObsPackError::shape_mismatch(
            name,
            "character arrays with more than two dimensions are not supported",
        )),
    }
}

fn decode_chars(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Longest prefix of `value` that fits in `width` bytes without splitting a
/// character
fn fixed_width_bytes(value: &str, width: usize) -> &[u8] {
    let mut end = value.len().min(width);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value.as_bytes()[..end]
}

/// Writer for daily observation files
pub struct DailyWriter<'a> {
    dataset: &'a Dataset,
    output_path: &'a Path,
}

impl<'a> DailyWriter<'a> {
    pub fn new(dataset: &'a Dataset, output_path: &'a Path) -> Self {
        Self {
            dataset,
            output_path,
        }
    }

    /// Writes the dataset, replacing any existing file at the output path
    pub fn write(&self) -> Result<()> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }

        let mut file = netcdf::create(self.output_path)?;
        file.add_unlimited_dimension(OBS_DIM)?;

        for (name, value) in &self.dataset.attributes {
            file.add_attribute(name, value.clone())?;
        }

        let mut fixed_dims: BTreeMap<String, usize> = BTreeMap::new();
        for var in self.dataset.variables() {
            self.write_variable(&mut file, &mut fixed_dims, var)?;
        }

        debug!(
            "Wrote {} records in {} variables to {}",
            self.dataset.len(),
            self.dataset.variables().len(),
            self.output_path.display()
        );
        Ok(())
    }

    fn write_variable(
        &self,
        file: &mut netcdf::FileMut,
        fixed_dims: &mut BTreeMap<String, usize>,
        var: &Variable,
    ) -> Result<()> {
        let mut dims = var.dims.clone();
        let mut shape = var.data.shape();

        let width = match &var.data {
            VarData::Text(values) => {
                let width = var.encoding.char_width.unwrap_or_else(|| {
                    values.iter().map(String::len).max().unwrap_or(0).max(1)
                });
                dims.push(format!("string{}", width));
                shape.push(width);
                Some(width)
            }
            _ => None,
        };

        if dims.len() != shape.len() {
            return Err(ObsPackError::shape_mismatch(
                &var.name,
                format!("{} dimension names for a {}-D array", dims.len(), shape.len()),
            ));
        }
        for (dim, &len) in dims.iter().zip(&shape) {
            if dim == OBS_DIM {
                continue;
            }
            match fixed_dims.get(dim) {
                Some(&existing) if existing != len => {
                    return Err(ObsPackError::shape_mismatch(
                        &var.name,
                        format!("dimension '{}' has length {} but {} is already defined", dim, len, existing),
                    ))
                }
                Some(_) => {}
                None => {
                    file.add_dimension(dim, len)?;
                    fixed_dims.insert(dim.clone(), len);
                }
            }
        }

        let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
        let mut nc_var = match &var.data {
            VarData::Float(_) => file.add_variable::<f64>(&var.name, &dim_refs)?,
            VarData::Int(_) | VarData::Time(_) => file.add_variable::<i64>(&var.name, &dim_refs)?,
            VarData::Text(_) => {
                file.add_variable_with_type(&var.name, &dim_refs, &NcVariableType::Char)?
            }
        };
        nc_var.set_compression(DEFLATE_LEVEL, true)?;

        if let Some(fill) = var.encoding.fill_value {
            match &var.data {
                VarData::Float(_) => {
                    nc_var.put_attribute("_FillValue", fill)?;
                }
                VarData::Int(_) => {
                    nc_var.put_attribute("_FillValue", fill as i64)?;
                }
                VarData::Time(_) | VarData::Text(_) => {}
            }
        }

        let is_time = matches!(var.data, VarData::Time(_));
        for (name, value) in &var.attributes {
            if name == "_FillValue" || (is_time && (name == "units" || name == "calendar")) {
                continue;
            }
            nc_var.put_attribute(name, value.clone())?;
        }
        if is_time {
            nc_var.put_attribute("units", EPOCH_UNITS)?;
            nc_var.put_attribute("calendar", CALENDAR)?;
        }

        if shape.iter().any(|&len| len == 0) {
            return Ok(());
        }

        match &var.data {
            VarData::Float(a) => {
                let values: Vec<f64> = a.iter().copied().collect();
                put_values(&mut nc_var, &var.name, &values, &shape)?;
            }
            VarData::Int(a) | VarData::Time(a) => {
                let values: Vec<i64> = a.iter().copied().collect();
                put_values(&mut nc_var, &var.name, &values, &shape)?;
            }
            VarData::Text(values) => {
                let width = width.unwrap_or(1);
                let mut bytes = vec![0u8; values.len() * width];
                for (row, value) in bytes.chunks_mut(width).zip(values) {
                    let src = fixed_width_bytes(value, width);
                    row[..src.len()].copy_from_slice(src);
                }
                match shape.as_slice() {
                    [n, w] => nc_var.put_raw_values(&bytes, (0..*n, 0..*w))?,
                    _ => {
                        return Err(ObsPackError::shape_mismatch(
                            &var.name,
                            "text variables must be indexed by a single dimension",
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

fn put_values<T>(var: &mut netcdf::VariableMut, name: &str, values: &[T], shape: &[usize]) -> Result<()>
where
    T: NcTypeDescriptor + Copy,
{
    match shape {
        [] => var.put_values(values, ..)?,
        [a] => var.put_values(values, 0..*a)?,
        [a, b] => var.put_values(values, (0..*a, 0..*b))?,
        [a, b, c] => var.put_values(values, (0..*a, 0..*b, 0..*c))?,
        _ => {
            return Err(ObsPackError::shape_mismatch(
                name,
                "variables with more than three dimensions are not supported",
            ))
        }
    }
    Ok(())
}

/// Writes `dataset` to `path` with the default daily-file encoding.
pub fn write_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    DailyWriter::new(dataset, path).write()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_trailing_nuls() {
        assert_eq!(decode_chars(b"abc\0\0"), "abc");
        assert_eq!(decode_chars(b"\0\0"), "");
        assert_eq!(decode_chars(b"a b "), "a b ");
    }

    #[test]
    fn fixed_width_truncates_on_char_boundary() {
        assert_eq!(fixed_width_bytes("surface", 3), b"sur");
        assert_eq!(fixed_width_bytes("ab", 10), b"ab");
        // 'é' is two bytes; a width of 2 must not split it
        assert_eq!(fixed_width_bytes("aé", 2), b"a");
    }
}
