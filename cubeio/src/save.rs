use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    codec::{self, Encoding},
    cube::Cube,
    errors::{Error, Result},
};

/// Value written in place of missing data
pub const GLOBAL_FILL_VALUE: f64 = 1e20;

/// The access pattern a saved file should be laid out for.
///
/// Parsed from the string used in recipes: empty for the codec's default layout, `map`,
/// `timeseries`, or a space separated list of coordinate names.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OptimizeAccess {
    /// One chunk for the whole variable
    #[default]
    Default,

    /// Whole horizontal fields, one time step (or level) at a time
    Map,

    /// Whole time series, one grid cell at a time
    Timeseries,

    /// Whole along the dimensions of the named coordinates, single elements along the rest
    Coords(Vec<String>),
}

impl FromStr for OptimizeAccess {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "" => OptimizeAccess::Default,
            "map" => OptimizeAccess::Map,
            "timeseries" => OptimizeAccess::Timeseries,
            names => OptimizeAccess::Coords(names.split_whitespace().map(String::from).collect()),
        })
    }
}

impl From<String> for OptimizeAccess {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(access) => access,
            Err(never) => match never {},
        }
    }
}

impl From<OptimizeAccess> for String {
    fn from(access: OptimizeAccess) -> Self {
        access.to_string()
    }
}

impl fmt::Display for OptimizeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizeAccess::Default => Ok(()),
            OptimizeAccess::Map => write!(f, "map"),
            OptimizeAccess::Timeseries => write!(f, "timeseries"),
            OptimizeAccess::Coords(names) => write!(f, "{}", names.join(" ")),
        }
    }
}

/// Settings for `save`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    pub optimize_access: OptimizeAccess,

    /// Compress data on disk
    pub compress: bool,
}

/// Chunk sizes that make reads with the given access pattern touch as few chunks as possible
pub(crate) fn chunksizes(cube: &Cube, access: &OptimizeAccess) -> Result<Option<Vec<usize>>> {
    let names: Vec<&str> = match access {
        OptimizeAccess::Default => return Ok(None),
        OptimizeAccess::Map => vec!["latitude", "longitude"],
        OptimizeAccess::Timeseries => vec!["time"],
        OptimizeAccess::Coords(names) => names.iter().map(String::as_str).collect(),
    };

    let mut dims = BTreeSet::new();
    for name in names {
        dims.extend(cube.coord_dims(name)?);
    }

    let chunks = cube
        .shape()
        .iter()
        .enumerate()
        .map(|(dim, &len)| if dims.contains(&dim) { len } else { 1 })
        .collect();

    Ok(Some(chunks))
}

/// Save cubes to a file.
///
/// Missing parent directories are created. If `filename` already exists and none of the cubes'
/// data has been realized, the cubes are assumed to be unchanged since they were loaded and
/// nothing is written, since rewriting the file they are lazily read from could lose data.
///
/// Returns the path of the saved file.
///
pub fn save<P: AsRef<Path>>(cubes: &[Cube], filename: P, options: &SaveOptions) -> Result<PathBuf> {
    let filename = filename.as_ref();
    if let Some(dirname) = filename.parent() {
        if !dirname.as_os_str().is_empty() {
            fs::create_dir_all(dirname)?;
        }
    }

    let names = cubes.iter().map(Cube::to_string).collect::<Vec<_>>().join(", ");
    if filename.exists() && cubes.iter().all(Cube::has_lazy_data) {
        debug!(
            "Not saving cubes [{names}] to {} to avoid data loss. The cube is probably unchanged.",
            filename.display()
        );
        return Ok(filename.to_path_buf());
    }

    debug!("Saving cubes [{names}] to {}", filename.display());
    let encodings = cubes
        .iter()
        .map(|cube| {
            Ok(Encoding {
                chunksizes: chunksizes(cube, &options.optimize_access)?,
                fill_value: GLOBAL_FILL_VALUE,
                compress: options.compress,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    codec::write(filename, cubes, &encodings)?;

    Ok(filename.to_path_buf())
}

/// Path for saving the intermediate result of a preprocessing step.
///
/// Intermediate files go in a directory named after `filename` without its extension, and are
/// numbered in the order they are written: `00_<step>.nc`, `01_<step>.nc`, ...
///
pub fn debug_filename<P: AsRef<Path>>(filename: P, step: &str) -> Result<PathBuf> {
    let dirname = filename.as_ref().with_extension("");

    let mut num = 0;
    if dirname.is_dir() {
        for entry in fs::read_dir(&dirname)? {
            let name = entry?.file_name();
            let prefix = name.to_string_lossy().chars().take(2).collect::<String>();
            if let Ok(used) = prefix.parse::<usize>() {
                num = num.max(used + 1);
            }
        }
    }

    Ok(dirname.join(format!("{num:02}_{step}.nc")))
}
