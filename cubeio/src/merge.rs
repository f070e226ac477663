//! Structural concatenation of cubes.
//!
//! Cubes can be joined when all of their metadata agrees and they differ only in the values of
//! the coordinate on a single dimension. Joining is only done where the joined coordinate stays
//! strictly increasing, so overlapping or duplicated pieces are never merged; they are returned
//! as separate cubes for the caller to sort out.
//!
use tracing::debug;

use crate::{
    cube::{Coord, Cube},
    errors::{Error, Result},
    lazy::CubeData,
};

/// A set of cubes that can be joined along `dim`
struct Group {
    dim: Option<usize>,
    cubes: Vec<Cube>,
}

/// Join together whatever can be joined.
///
/// Returns one cube per set of contiguous, compatible inputs. Groups are returned in order of
/// first appearance in `cubes`, pieces within a group in order along the joined dimension.
///
pub fn concatenate_cubes(cubes: Vec<Cube>) -> Result<Vec<Cube>> {
    let mut groups: Vec<Group> = vec![];
    'cubes: for cube in cubes {
        for group in groups.iter_mut() {
            let representative = &group.cubes[0];
            if let Some(dim) = join_dim(representative, &cube) {
                if group.dim.is_none() || group.dim == Some(dim) {
                    group.dim = Some(dim);
                    group.cubes.push(cube);
                    continue 'cubes;
                }
            }
        }
        groups.push(Group {
            dim: None,
            cubes: vec![cube],
        });
    }

    let mut concatenated = vec![];
    for group in groups {
        match group.dim {
            Some(dim) => concatenated.extend(join_group(dim, group.cubes)?),
            None => concatenated.extend(group.cubes),
        }
    }

    Ok(concatenated)
}

/// Join `cubes` into exactly one cube or fail
pub fn concatenate_cube(cubes: Vec<Cube>) -> Result<Cube> {
    let count = cubes.len();
    let mut concatenated = concatenate_cubes(cubes)?;
    if concatenated.len() == 1 {
        Ok(concatenated.remove(0))
    } else {
        Err(Error::Concatenation(format!(
            "{count} cubes concatenated into {} cubes rather than one",
            concatenated.len()
        )))
    }
}

/// The dimension `a` and `b` can be joined along, if any
fn join_dim(a: &Cube, b: &Cube) -> Option<usize> {
    if a.var_name != b.var_name
        || a.standard_name != b.standard_name
        || a.long_name != b.long_name
        || a.units != b.units
        || a.ndim() != b.ndim()
        || a.attributes != b.attributes
    {
        return None;
    }

    let a_coords: Vec<(&Coord, Option<usize>)> = a.coords().collect();
    let b_coords: Vec<(&Coord, Option<usize>)> = b.coords().collect();
    if a_coords.len() != b_coords.len() {
        return None;
    }

    let mut candidate = None;
    for ((a_coord, a_dim), (b_coord, b_dim)) in a_coords.iter().zip(b_coords.iter()) {
        if a_dim != b_dim || !a_coord.same_metadata(b_coord) {
            return None;
        }
        if a_coord != b_coord {
            // Only coordinates on a dimension can differ, and all on the same one
            match (a_dim, candidate) {
                (None, _) => return None,
                (Some(dim), None) => candidate = Some(*dim),
                (Some(dim), Some(other)) if *dim != other => return None,
                _ => {}
            }
        }
    }

    let dim = candidate?;
    a.dim_coord(dim)?;
    let same_shape = a
        .shape()
        .iter()
        .zip(b.shape())
        .enumerate()
        .all(|(i, (a_len, b_len))| i == dim || a_len == b_len);

    if same_shape {
        Some(dim)
    } else {
        None
    }
}

fn first_point(cube: &Cube, dim: usize) -> f64 {
    cube.dim_coord(dim)
        .and_then(|coord| coord.points.get(0).copied())
        .unwrap_or(f64::NAN)
}

fn last_point(cube: &Cube, dim: usize) -> f64 {
    cube.dim_coord(dim)
        .and_then(|coord| coord.points.get(coord.len().wrapping_sub(1)).copied())
        .unwrap_or(f64::NAN)
}

fn overlaps((start_a, end_a): (f64, f64), (start_b, end_b): (f64, f64)) -> bool {
    start_a <= end_b && start_b <= end_a
}

/// Join the members of a group into as few cubes as possible along `dim`.
///
/// Members are taken in order of their first point. Each goes into the first run it doesn't
/// overlap, so a piece that duplicates part of the others ends up in a run of its own instead of
/// splitting pieces that fit together.
///
fn join_group(dim: usize, mut cubes: Vec<Cube>) -> Result<Vec<Cube>> {
    cubes.sort_by(|a, b| first_point(a, dim).total_cmp(&first_point(b, dim)));

    let mut runs: Vec<(Vec<(f64, f64)>, Vec<Cube>)> = vec![];
    for cube in cubes {
        let extent = (first_point(&cube, dim), last_point(&cube, dim));
        let free = runs.iter_mut().find(|(extents, _)| {
            extents
                .iter()
                .all(|existing| !overlaps(*existing, extent))
        });
        match free {
            Some((extents, run)) => {
                extents.push(extent);
                run.push(cube);
            }
            None => runs.push((vec![extent], vec![cube])),
        }
    }

    runs.into_iter().map(|(_, run)| join(dim, run)).collect()
}

/// Join a contiguous run of compatible cubes into one
fn join(dim: usize, mut run: Vec<Cube>) -> Result<Cube> {
    if run.len() == 1 {
        return Ok(run.remove(0));
    }
    debug!("Joining {} cubes along dimension {dim}", run.len());

    let parts: Vec<CubeData> = run.iter().map(|cube| cube.core_data().clone()).collect();
    let data = CubeData::concatenate(dim, &parts)?;

    let first = &run[0];
    let mut coords = vec![];
    for (index, (coord, coord_dim)) in first.coords().enumerate() {
        if coord_dim == Some(dim) {
            let pieces: Vec<&Coord> = run
                .iter()
                .filter_map(|cube| cube.coords().nth(index).map(|(coord, _)| coord))
                .collect();
            coords.push((Coord::join(&pieces)?, coord_dim));
        } else {
            coords.push((coord.clone(), coord_dim));
        }
    }

    Ok(first.with_parts(coords, data))
}
