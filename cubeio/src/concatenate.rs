//! Fusing the fragments of one dataset into a single cube.
//!
//! Fragments usually come from consecutive files of the same dataset, but their attributes seldom
//! agree exactly and their time ranges sometimes overlap. Attributes are unified first so the
//! structural concatenation can do its job, then a pair of fragments that still overlap in time is
//! spliced together by taking the later fragment in full and only the leading, non-overlapping
//! part of the earlier one.
//!
use tracing::{debug, error};

use crate::{
    attributes::{AttrValue, Attributes},
    cube::Cube,
    errors::{Error, Result},
    extract::extract_time,
    merge::{concatenate_cube, concatenate_cubes},
};

/// Make the attributes of all cubes identical so they can be concatenated.
///
/// Each attribute takes the value from the first cube that has it. Where a later cube has a
/// different value, the values are joined as text with a semicolon, in the order the cubes are
/// given. Every cube ends up with its own copy of the same unified attributes.
///
/// Running this again on the same cubes changes nothing.
///
pub fn unify_attributes(cubes: &mut [Cube]) {
    let mut unified = Attributes::new();
    for cube in cubes.iter() {
        for (key, value) in &cube.attributes {
            let merged = match unified.get(key) {
                None => Some(value.clone()),
                Some(existing) if existing != value => {
                    Some(AttrValue::Str(format!("{existing};{value}")))
                }
                Some(_) => None,
            };
            if let Some(merged) = merged {
                unified.insert(key, merged);
            }
        }
    }

    for cube in cubes.iter_mut() {
        cube.attributes = unified.clone();
    }
}

/// Concatenate the fragments of one dataset into a single cube.
///
/// # Errors
///
/// `Error::Concatenation` if the fragments can't be reduced to a single cube. Every remaining
/// cube, with its time range if it has one, is logged before returning.
///
pub fn concatenate(mut cubes: Vec<Cube>) -> Result<Cube> {
    if cubes.is_empty() {
        return Err(Error::Concatenation("No cubes to concatenate".to_string()));
    }
    unify_attributes(&mut cubes);

    let mut concatenated = concatenate_cubes(cubes)?;
    if concatenated.len() == 2 && concatenated.iter().all(|cube| cube.has_coord("time")) {
        concatenated = concatenate_overlapping(concatenated)?;
    }

    if concatenated.len() == 1 {
        return Ok(concatenated.remove(0));
    }

    error!("Can not concatenate cubes into a single one.");
    error!("Resulting cubes:");
    for cube in &concatenated {
        error!("{cube}");
        if let Ok(time) = cube.coord("time") {
            if let (Ok(start), Ok(end)) = (time.first_date(), time.last_date()) {
                error!("From {start} to {end}");
            }
        }
    }

    Err(Error::Concatenation(format!(
        "{} cubes remain after concatenation",
        concatenated.len()
    )))
}

/// The first and last time points of a cube, in the units of its time coordinate
fn time_extent(cube: &Cube) -> Result<(f64, f64)> {
    let points = &cube.coord("time")?.points;
    match (points.iter().next(), points.iter().next_back()) {
        (Some(first), Some(last)) => Ok((*first, *last)),
        _ => Err(Error::Concatenation(format!(
            "Cube {cube} has an empty time coordinate"
        ))),
    }
}

fn to_concatenation_error(err: Error) -> Error {
    match err {
        Error::Concatenation(_) => err,
        err => Error::Concatenation(err.to_string()),
    }
}

/// Concatenate two cubes that overlap in time.
///
/// With both cubes ordered by start time:
///
/// * If they start together, the one that ends later contains all needed data and is used alone.
/// * If the first ends inside the second, the first is cut short where the overlap starts and the
///   second is appended in full.
/// * If the first ends after the second, the first contains all needed data and is used alone.
///
/// Times are compared as points, so both cubes must share time units and calendar.
///
/// # Errors
///
/// `Error::Concatenation` if the cubes share no time point, if their time units differ, or if the
/// shortened first cube can't be concatenated with the second.
///
pub fn concatenate_overlapping(cubes: Vec<Cube>) -> Result<Vec<Cube>> {
    let [a, b]: [Cube; 2] = cubes.try_into().map_err(|cubes: Vec<Cube>| {
        Error::Concatenation(format!(
            "Overlap resolution needs two cubes, got {}",
            cubes.len()
        ))
    })?;

    let (time_a, time_b) = (a.coord("time")?, b.coord("time")?);
    if time_a.units != time_b.units || time_a.calendar != time_b.calendar {
        return Err(Error::Concatenation(format!(
            "Cubes {a} and {b} have different time units: {} ({:?}) and {} ({:?})",
            time_a.units, time_a.calendar, time_b.units, time_b.calendar
        )));
    }

    let (first, second) = if time_extent(&a)?.0 <= time_extent(&b)?.0 {
        (a, b)
    } else {
        (b, a)
    };
    debug!("Will attempt to concatenate cubes {first} and {second} in this order");

    let (start_1, end_1) = time_extent(&first)?;
    let (start_2, end_2) = time_extent(&second)?;

    if start_1 == start_2 {
        return if end_1 < end_2 {
            debug!("Both cubes start at the same time but cube {first} ends before {second}");
            debug!("Cube {second} contains all needed data so using it fully");
            Ok(vec![second])
        } else {
            debug!("Both cubes start at the same time but cube {second} ends before {first}");
            debug!("Cube {first} contains all needed data so using it fully");
            Ok(vec![first])
        };
    }

    let time_1 = first.coord("time")?;
    let time_2 = second.coord("time")?;
    let overlap = time_1
        .points
        .iter()
        .find(|point| time_2.points.iter().any(|other| other == *point))
        .copied()
        .ok_or_else(|| {
            Error::Concatenation("Attempting to concatenate cubes that are separated in time.".to_string())
        })?;

    if end_1 <= end_2 {
        let units = time_1.time_units().map_err(to_concatenation_error)?;
        let start_date = units.num2date(start_1).map_err(to_concatenation_error)?;
        let overlap_date = units.num2date(overlap).map_err(to_concatenation_error)?;
        debug!(
            "Extracting time slice between {} and {} from cube {first} to use it for \
             concatenation with cube {second}",
            start_date, overlap_date,
        );
        let leading =
            extract_time(&first, start_date.ymd(), overlap_date.ymd()).map_err(|err| {
                error!("Can not shorten cube {first} to concatenate with {second}: {err}");
                to_concatenation_error(err)
            })?;

        debug!("Attempting concatenation of {leading} with {second}");
        let operands = [leading.to_string(), second.to_string()];
        match concatenate_cube(vec![leading, second]) {
            Ok(cube) => Ok(vec![cube]),
            Err(err) => {
                error!("Can not concatenate cubes: {err}");
                error!("Cubes:");
                for operand in &operands {
                    error!("{operand}");
                }
                Err(err)
            }
        }
    } else {
        debug!("Using only data from {first}");
        Ok(vec![first])
    }
}
