use crate::{
    cube::Cube,
    errors::{Error, Result},
    time::{Calendar, Ymd},
};

fn check_date(calendar: Calendar, (year, month, day): Ymd) -> Result<Ymd> {
    if calendar.is_valid((year, month, day)) {
        Ok((year, month, day))
    } else {
        Err(Error::Extraction(format!(
            "Invalid date {year}-{month}-{day} in the {calendar:?} calendar"
        )))
    }
}

/// Extract the part of a cube between two calendar days.
///
/// Points are selected by calendar day: a point is kept if its day is on or after `start` and
/// strictly before `end`. The time of day is not considered. Days are interpreted in the calendar
/// of the cube's time coordinate.
///
/// # Arguments
///
/// * `cube` - The cube to extract from. Must have a time coordinate on one of its dimensions.
/// * `start` - First day to include, as (year, month, day)
/// * `end` - First day to exclude, as (year, month, day)
///
pub fn extract_time(cube: &Cube, start: Ymd, end: Ymd) -> Result<Cube> {
    let time = cube.coord("time")?;
    let calendar = time.time_units()?.calendar();
    let start = check_date(calendar, start)?;
    let end = check_date(calendar, end)?;

    let dim = match cube.coord_dims("time")?.as_slice() {
        [dim] => *dim,
        _ => {
            return Err(Error::Extraction(format!(
                "Time coordinate of {cube} is not a dimension coordinate"
            )))
        }
    };

    let selected: Vec<usize> = time
        .dates()?
        .iter()
        .enumerate()
        .filter(|(_, date)| start <= date.ymd() && date.ymd() < end)
        .map(|(index, _)| index)
        .collect();

    match (selected.first(), selected.last()) {
        (Some(&first), Some(&last)) => cube.slice_axis(dim, first..last + 1),
        _ => Err(Error::Extraction(format!(
            "Time slice {start:?} to {end:?} is outside cube time bounds of {cube}"
        ))),
    }
}
