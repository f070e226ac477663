//! On disk format for cubes.
//!
//! A cube file starts with a magic number and format version, followed by a varint length prefixed
//! JSON header describing every variable in the file, followed by the data for each variable. Data
//! is stored as big endian `f64` in chunks, each chunk prefixed by its length in bytes and
//! optionally compressed with zstd. Missing values are stored as the variable's fill value.
//!
//! Reading a file doesn't read any data. Each cube gets a lazy array that decodes its variable the
//! first time it is needed.
//!
mod chunking;


use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn, Slice};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    attributes::{AttrValue, Attributes},
    cube::{Coord, Cube},
    errors::{Error, Result},
    extio::{ExtendedRead, ExtendedWrite},
    lazy::{CubeData, LazyArray},
};

use chunking::{chunk_shape, ChunkGrid};

const MAGIC_NUMBER: u16 = 0xC0BE;
const FORMAT_VERSION: u32 = 0;

/// Standard names of coordinates whose units get normalized to plain degrees when read
const GEOGRAPHIC: [&str; 2] = ["latitude", "longitude"];

/// A hook called on every cube as it is read, with the raw record the cube was parsed from
pub type Callback<'a> = dyn Fn(&mut Cube, &Field, &Path) + 'a;

/// Per variable write settings
#[derive(Clone, Debug, PartialEq)]
pub struct Encoding {
    /// Chunk size along each dimension. `None` stores the variable as one chunk.
    pub chunksizes: Option<Vec<usize>>,

    /// Value stored in place of missing (NaN) values
    pub fill_value: f64,

    /// Compress chunks with zstd
    pub compress: bool,
}

/// The result of reading a file
pub struct Loaded {
    pub cubes: Vec<Cube>,

    /// Problems noticed while parsing that didn't prevent reading the file
    pub warnings: Vec<String>,
}

/// A variable's raw record, as stored, before any interpretation.
///
pub struct Field {
    pub var_name: String,

    /// Attributes of the variable
    pub attributes: Attributes,

    /// Stored attributes of each coordinate variable, by var name
    cf_group: Vec<(String, Attributes)>,
}

impl Field {
    /// The stored attributes of a coordinate variable
    pub fn cf_attrs(&self, coord_var_name: &str) -> Option<&Attributes> {
        self.cf_group
            .iter()
            .find(|(name, _)| name == coord_var_name)
            .map(|(_, attributes)| attributes)
    }
}

#[derive(Serialize, Deserialize)]
struct FileHeader {
    variables: Vec<VariableHeader>,
}

#[derive(Clone, Serialize, Deserialize)]
struct VariableHeader {
    var_name: String,
    standard_name: Option<String>,
    long_name: Option<String>,
    units: String,
    attributes: Attributes,
    coords: Vec<CoordRecord>,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    fill_value: f64,
    compressed: bool,

    /// Offset of this variable's data from the start of the data section
    offset: u64,
}

impl VariableHeader {
    /// Make sure the chunk layout describes the variable's shape
    fn check(&self) -> Result<()> {
        if self.chunks.len() != self.shape.len() {
            return Err(Error::Format(format!(
                "variable {} has {} dimensions but {} chunk sizes",
                self.var_name,
                self.shape.len(),
                self.chunks.len()
            )));
        }
        if self.chunks.contains(&0) {
            return Err(Error::Format(format!(
                "variable {} has a zero chunk size: {:?}",
                self.var_name, self.chunks
            )));
        }

        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct CoordRecord {
    var_name: String,
    standard_name: Option<String>,
    long_name: Option<String>,
    dim: Option<usize>,
    points: Vec<f64>,
    bounds: Option<Vec<[f64; 2]>>,

    /// Stored attributes, including units and calendar
    attributes: Attributes,
}

impl CoordRecord {
    fn from_coord(coord: &Coord, dim: Option<usize>) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert("units", coord.units.as_str());
        if let Some(calendar) = &coord.calendar {
            attributes.insert("calendar", calendar.as_str());
        }

        Self {
            var_name: coord.var_name.clone(),
            standard_name: coord.standard_name.clone(),
            long_name: coord.long_name.clone(),
            dim,
            points: coord.points.to_vec(),
            bounds: coord
                .bounds
                .as_ref()
                .map(|bounds| bounds.rows().into_iter().map(|row| [row[0], row[1]]).collect()),
            attributes,
        }
    }

    fn to_coord(&self) -> Result<Coord> {
        let text = |key: &str| self.attributes.get(key).and_then(AttrValue::as_str);
        let mut units = text("units").unwrap_or("1").to_string();
        if let Some(standard_name) = &self.standard_name {
            if GEOGRAPHIC.contains(&standard_name.as_str()) && units.starts_with("degree") {
                units = "degrees".to_string();
            }
        }

        let mut coord = Coord::new(self.var_name.clone(), units, self.points.clone().into());
        coord.standard_name = self.standard_name.clone();
        coord.long_name = self.long_name.clone();
        coord.calendar = text("calendar").map(str::to_string);
        if let Some(bounds) = &self.bounds {
            let flat: Vec<f64> = bounds.iter().flatten().copied().collect();
            coord.bounds = Some(ndarray::Array2::from_shape_vec((bounds.len(), 2), flat)?);
        }

        Ok(coord)
    }
}

/// Lazily decodes one variable's data, remembering the result.
struct VariableSource {
    path: PathBuf,

    /// Absolute offset of the variable's data in the file
    offset: u64,

    header: VariableHeader,
    decoded: Mutex<Option<ArrayD<f64>>>,
}

impl VariableSource {
    fn read(&self) -> Result<ArrayD<f64>> {
        let mut decoded = self.decoded.lock();
        if let Some(array) = decoded.as_ref() {
            return Ok(array.clone());
        }

        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut stream = BufReader::new(file);
        stream.seek(SeekFrom::Start(self.offset))?;
        let array = decode(&self.header, &mut stream, file_len)?;
        *decoded = Some(array.clone());

        Ok(array)
    }
}

/// Read the cubes in a file.
///
/// No data is read. `callback`, if given, is called once for every cube with the raw record it was
/// parsed from.
///
pub fn read<P: AsRef<Path>>(path: P, callback: Option<&Callback<'_>>) -> Result<Loaded> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut stream = BufReader::new(file);

    let magic_number = stream.read_u16()?;
    if magic_number != MAGIC_NUMBER {
        return Err(Error::Format(format!("{} is not a cube file", path.display())));
    }
    let version = stream.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(Error::Format(format!(
            "Unrecognized format version {version} in {}",
            path.display()
        )));
    }

    let header_len = stream.read_varint()?;
    if header_len > file_len {
        return Err(Error::Format(format!(
            "Header length {header_len} is longer than {} ({file_len} bytes)",
            path.display()
        )));
    }
    let mut header = vec![0; header_len as usize];
    stream.read_exact(&mut header)?;
    let header: FileHeader = serde_json::from_slice(&header)?;
    let data_start = stream.stream_position()?;

    let mut warnings = vec![];
    let names: Vec<&str> = header.variables.iter().map(|v| v.var_name.as_str()).collect();
    for variable in &header.variables {
        variable.check()?;
        warnings.extend(missing_measures(variable, &names));
    }

    let mut cubes = vec![];
    for variable in &header.variables {
        let mut cube = parse(path, data_start, variable)?;
        if let Some(callback) = callback {
            let field = Field {
                var_name: variable.var_name.clone(),
                attributes: variable.attributes.clone(),
                cf_group: variable
                    .coords
                    .iter()
                    .map(|coord| (coord.var_name.clone(), coord.attributes.clone()))
                    .collect(),
            };
            callback(&mut cube, &field, path);
        }
        cubes.push(cube);
    }

    Ok(Loaded { cubes, warnings })
}

fn parse(path: &Path, data_start: u64, variable: &VariableHeader) -> Result<Cube> {
    let source = Arc::new(VariableSource {
        path: path.to_path_buf(),
        offset: data_start + variable.offset,
        header: variable.clone(),
        decoded: Mutex::new(None),
    });
    let data = LazyArray::new(variable.shape.clone(), move || source.read());

    let mut cube = Cube::new(
        variable.var_name.clone(),
        variable.units.clone(),
        CubeData::Lazy(data),
    );
    cube.standard_name = variable.standard_name.clone();
    cube.long_name = variable.long_name.clone();
    cube.attributes = variable.attributes.clone();
    for record in &variable.coords {
        cube.add_coord(record.to_coord()?, record.dim)?;
    }

    Ok(cube)
}

/// Warnings for cell measure variables referenced by `variable` that aren't in the file
fn missing_measures(variable: &VariableHeader, names: &[&str]) -> Vec<String> {
    let measures = match variable.attributes.get("cell_measures").and_then(AttrValue::as_str) {
        Some(measures) => measures,
        None => return vec![],
    };

    // Format is "measure: name [measure: name ...]"
    measures
        .split_whitespace()
        .filter(|word| !word.ends_with(':'))
        .filter(|name| !names.contains(name))
        .map(|name| {
            format!(
                "Missing CF-netCDF measure variable {name:?}, referenced by netCDF variable {:?}",
                variable.var_name
            )
        })
        .collect()
}

/// Write cubes to a file, one variable per cube.
///
/// All data is computed before the file is opened, so cubes lazily loaded from `path` can be
/// written back to it.
///
pub fn write<P: AsRef<Path>>(path: P, cubes: &[Cube], encodings: &[Encoding]) -> Result<()> {
    if cubes.len() != encodings.len() {
        return Err(Error::Shape(format!(
            "{} cubes but {} encodings",
            cubes.len(),
            encodings.len()
        )));
    }

    let mut variables = vec![];
    let mut sections = vec![];
    let mut offset = 0;
    for (cube, encoding) in cubes.iter().zip(encodings) {
        let data = cube.core_data().compute()?;
        let chunks = chunk_shape(data.shape(), encoding.chunksizes.as_deref());
        let section = encode(&data, &chunks, encoding)?;

        variables.push(VariableHeader {
            var_name: cube.var_name.clone(),
            standard_name: cube.standard_name.clone(),
            long_name: cube.long_name.clone(),
            units: cube.units.clone(),
            attributes: cube.attributes.clone(),
            coords: cube
                .coords()
                .map(|(coord, dim)| CoordRecord::from_coord(coord, dim))
                .collect(),
            shape: data.shape().to_vec(),
            chunks,
            fill_value: encoding.fill_value,
            compressed: encoding.compress,
            offset,
        });
        offset += section.len() as u64;
        sections.push(section);
    }

    let header = serde_json::to_vec(&FileHeader { variables })?;
    let mut stream = BufWriter::new(File::create(path)?);
    stream.write_u16(MAGIC_NUMBER)?;
    stream.write_u32(FORMAT_VERSION)?;
    stream.write_varint(header.len() as u64)?;
    stream.write_all(&header)?;
    for section in sections {
        stream.write_all(&section)?;
    }
    stream.flush()?;

    Ok(())
}

fn encode(data: &ArrayD<f64>, chunks: &[usize], encoding: &Encoding) -> Result<Vec<u8>> {
    let mut section = vec![];
    for ranges in ChunkGrid::new(data.shape(), chunks) {
        let block = data.slice_each_axis(|axis| Slice::from(ranges[axis.axis.index()].clone()));
        let mut raw = Vec::with_capacity(block.len() * 8);
        for value in block.iter() {
            let value = if value.is_nan() { encoding.fill_value } else { *value };
            raw.write_f64(value)?;
        }

        let bytes = if encoding.compress {
            zstd::encode_all(raw.as_slice(), 0)?
        } else {
            raw
        };
        section.write_varint(bytes.len() as u64)?;
        section.write_all(&bytes)?;
    }

    Ok(section)
}

/// Decode a variable's chunks. No chunk can be longer than `limit` bytes.
fn decode(header: &VariableHeader, stream: &mut impl Read, limit: u64) -> Result<ArrayD<f64>> {
    header.check()?;
    let mut array = ArrayD::from_elem(IxDyn(&header.shape), f64::NAN);
    for ranges in ChunkGrid::new(&header.shape, &header.chunks) {
        let len = stream.read_varint()?;
        if len > limit {
            return Err(Error::Format(format!(
                "chunk of variable {} claims {len} bytes, more than the {limit} in the file",
                header.var_name
            )));
        }
        let mut bytes = vec![0; len as usize];
        stream.read_exact(&mut bytes)?;
        if header.compressed {
            bytes = zstd::decode_all(bytes.as_slice())?;
        }

        let block_shape: Vec<usize> = ranges.iter().map(|range| range.len()).collect();
        let count: usize = block_shape.iter().product();
        if bytes.len() != count * 8 {
            return Err(Error::Format(format!(
                "chunk of variable {} has {} bytes, expected {}",
                header.var_name,
                bytes.len(),
                count * 8
            )));
        }

        let mut words = bytes.as_slice();
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = words.read_f64()?;
            values.push(if value == header.fill_value { f64::NAN } else { value });
        }

        let block = ArrayD::from_shape_vec(IxDyn(&block_shape), values)?;
        array
            .slice_each_axis_mut(|axis| Slice::from(ranges[axis.axis.index()].clone()))
            .assign(&block);
    }

    Ok(array)
}
