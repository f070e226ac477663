use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::{
    attributes::AttrValue,
    codec::{self, Callback, Field},
    cube::Cube,
    errors::{Error, Result},
};

/// Warnings the codec raises that are expected and not worth reporting
static BENIGN_WARNINGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Missing CF-netCDF measure variable .*").expect("warning pattern is valid")
});

/// Attributes that differ between otherwise identical files and would prevent concatenation
const VOLATILE_ATTRIBUTES: [&str; 3] = ["creation_date", "tracking_id", "history"];

/// Fix what the codec breaks while reading, so cubes can later be concatenated.
///
/// Removes volatile attributes and restores the units of latitude and longitude to what is
/// actually stored in the file, since the codec normalizes them to plain degrees.
///
pub fn concatenate_callback(cube: &mut Cube, field: &Field, _source: &Path) {
    for attribute in VOLATILE_ATTRIBUTES {
        cube.attributes.remove(attribute);
    }

    for coord in cube.coords_mut() {
        if matches!(
            coord.standard_name.as_deref(),
            Some("longitude") | Some("latitude")
        ) {
            let units = field
                .cf_attrs(&coord.var_name)
                .and_then(|attributes| attributes.get("units"))
                .and_then(AttrValue::as_str);
            if let Some(units) = units {
                coord.units = units.to_string();
            }
        }
    }
}

/// Load cubes from a file.
///
/// Every cube is tagged with a `source_file` attribute holding `file`. Data is not read.
///
/// # Arguments
///
/// * `file` - The file to load.
/// * `callback` - Called for each cube read, along with the raw record it was read from. See
///   `concatenate_callback`.
///
/// # Errors
///
/// `Error::Load` if the file holds no cubes.
///
pub fn load<P: AsRef<Path>>(file: P, callback: Option<&Callback<'_>>) -> Result<Vec<Cube>> {
    let file = file.as_ref();
    debug!("Loading:\n{}", file.display());

    let loaded = codec::read(file, callback)?;
    for warning in &loaded.warnings {
        if BENIGN_WARNINGS.is_match(warning) {
            debug!("Ignoring warning from {}: {warning}", file.display());
        } else {
            warn!("{}: {warning}", file.display());
        }
    }

    if loaded.cubes.is_empty() {
        return Err(Error::Load(file.to_path_buf()));
    }

    let source_file = file.display().to_string();
    let mut cubes = loaded.cubes;
    for cube in &mut cubes {
        cube.attributes.insert("source_file", source_file.as_str());
    }

    Ok(cubes)
}

/// Load cubes from several files, in order.
///
/// Each cube's `source_file` is the file it came from. Fails with `Error::Load` on the first file
/// that holds no cubes.
///
pub fn load_files<P: AsRef<Path>>(files: &[P], callback: Option<&Callback<'_>>) -> Result<Vec<Cube>> {
    let mut cubes = vec![];
    for file in files {
        cubes.extend(load(file, callback)?);
    }

    Ok(cubes)
}
