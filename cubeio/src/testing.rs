//! Fixtures shared by the unit tests
//!
use ndarray::{arr1, arr2, Array2, ArrayD, IxDyn};

use crate::{
    cube::{Coord, Cube},
    lazy::{CubeData, LazyArray},
    time::{CfDateTime, TimeRange, TimeUnits},
};

pub(crate) const TIME_UNITS: &str = "days since 2000-01-01 00:00:00";

const ROWS: usize = 2;
const COLS: usize = 3;

/// Midday of day `n`, counting 2000-01-01 as day 1
pub(crate) fn day(n: usize) -> CfDateTime {
    TimeUnits::parse(TIME_UNITS, Some("standard"))
        .unwrap()
        .num2date(n as f64 - 0.5)
        .unwrap()
}

/// Cell value for a given day and grid position, so joined data can be checked by value
pub(crate) fn value(day: usize, row: usize, col: usize) -> f64 {
    (day * 100 + row * 10 + col) as f64
}

/// Daily data for days `first` through `last` inclusive
pub(crate) fn daily_array(first: usize, last: usize) -> ArrayD<f64> {
    let instants = last + 1 - first;
    ArrayD::from_shape_fn(IxDyn(&[instants, ROWS, COLS]), |index| {
        value(first + index[0], index[1], index[2])
    })
}

/// Time coordinate with one point at midday of each day from `first` to `last` inclusive
pub(crate) fn daily_time(first: usize, last: usize) -> Coord {
    let range = TimeRange::new(0.5, 1.0);
    let points = range.slice(first - 1, last);
    let bounds = Array2::from_shape_fn((points.len(), 2), |(i, j)| (first - 1 + i + j) as f64);

    Coord::new("time", TIME_UNITS, points)
        .with_standard_name("time")
        .with_calendar("standard")
        .with_bounds(bounds)
}

fn add_grid(cube: &mut Cube) {
    let lat = Coord::new("lat", "degrees_north", arr1(&[-45.0, 45.0]))
        .with_standard_name("latitude")
        .with_bounds(arr2(&[[-90.0, 0.0], [0.0, 90.0]]));
    let lon = Coord::new("lon", "degrees_east", arr1(&[60.0, 180.0, 300.0]))
        .with_standard_name("longitude")
        .with_bounds(arr2(&[[0.0, 120.0], [120.0, 240.0], [240.0, 360.0]]));
    cube.add_coord(lat, Some(1)).unwrap();
    cube.add_coord(lon, Some(2)).unwrap();
}

/// A lazily loaded air temperature cube covering days `first` through `last` inclusive
pub(crate) fn daily_cube(first: usize, last: usize) -> Cube {
    let array = daily_array(first, last);
    let data = CubeData::Lazy(LazyArray::from_array(array));
    let mut cube = Cube::new("tas", "K", data).with_standard_name("air_temperature");
    cube.add_coord(daily_time(first, last), Some(0)).unwrap();
    add_grid(&mut cube);

    cube
}

/// Same as `daily_cube`, with the data already in memory
pub(crate) fn real_daily_cube(first: usize, last: usize) -> Cube {
    let mut cube = daily_cube(first, last);
    cube.data().unwrap();

    cube
}

/// A cube with no time dimension
pub(crate) fn map_cube() -> Cube {
    let array = ArrayD::from_shape_fn(IxDyn(&[ROWS, COLS]), |index| value(0, index[0], index[1]));
    let mut cube = Cube::new("orog", "m", CubeData::Real(array)).with_standard_name("surface_altitude");
    let lat = Coord::new("lat", "degrees_north", arr1(&[-45.0, 45.0])).with_standard_name("latitude");
    let lon = Coord::new("lon", "degrees_east", arr1(&[60.0, 180.0, 300.0]))
        .with_standard_name("longitude");
    cube.add_coord(lat, Some(0)).unwrap();
    cube.add_coord(lon, Some(1)).unwrap();

    cube
}

/// Days covered by a cube's time coordinate, numbered like `day`
pub(crate) fn days_of(cube: &Cube) -> Vec<usize> {
    cube.coord("time")
        .unwrap()
        .points
        .iter()
        .map(|point| (point - 0.5) as usize + 1)
        .collect()
}
