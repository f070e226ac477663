use std::fmt;
use std::ops::Range;

use ndarray::{concatenate, Array1, Array2, ArrayD, Axis, Slice};

use crate::{
    attributes::Attributes,
    errors::{Error, Result},
    lazy::{CubeData, LazyArray},
    time::{CfDateTime, TimeUnits},
};

/// A named, one dimensional coordinate.
///
/// A coordinate either describes one dimension of a cube's data or, if it isn't attached to a
/// dimension, is a scalar coordinate with a single point.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Coord {
    pub standard_name: Option<String>,
    pub long_name: Option<String>,
    pub var_name: String,
    pub units: String,

    /// Calendar for time coordinates
    pub calendar: Option<String>,

    pub points: Array1<f64>,

    /// Cell bounds with shape (points, 2)
    pub bounds: Option<Array2<f64>>,
}

impl Coord {
    pub fn new<S: Into<String>>(var_name: S, units: S, points: Array1<f64>) -> Self {
        Self {
            standard_name: None,
            long_name: None,
            var_name: var_name.into(),
            units: units.into(),
            calendar: None,
            points,
            bounds: None,
        }
    }

    pub fn with_standard_name<S: Into<String>>(mut self, standard_name: S) -> Self {
        self.standard_name = Some(standard_name.into());
        self
    }

    pub fn with_long_name<S: Into<String>>(mut self, long_name: S) -> Self {
        self.long_name = Some(long_name.into());
        self
    }

    pub fn with_calendar<S: Into<String>>(mut self, calendar: S) -> Self {
        self.calendar = Some(calendar.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Array2<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// The most descriptive name available
    pub fn name(&self) -> &str {
        self.standard_name
            .as_deref()
            .or(self.long_name.as_deref())
            .unwrap_or(&self.var_name)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether names, units and calendar agree, ignoring the values
    pub(crate) fn same_metadata(&self, other: &Coord) -> bool {
        self.standard_name == other.standard_name
            && self.long_name == other.long_name
            && self.var_name == other.var_name
            && self.units == other.units
            && self.calendar == other.calendar
            && self.bounds.is_some() == other.bounds.is_some()
    }

    pub fn time_units(&self) -> Result<TimeUnits> {
        TimeUnits::parse(&self.units, self.calendar.as_deref())
    }

    /// The date of the point at `index`
    pub fn cell_date(&self, index: usize) -> Result<CfDateTime> {
        let point = self.points.get(index).ok_or_else(|| {
            Error::Time(format!(
                "No point {index} in coordinate {} with {} points",
                self.name(),
                self.len()
            ))
        })?;

        self.time_units()?.num2date(*point)
    }

    pub fn first_date(&self) -> Result<CfDateTime> {
        self.cell_date(0)
    }

    pub fn last_date(&self) -> Result<CfDateTime> {
        self.cell_date(self.len().saturating_sub(1))
    }

    /// Dates of all points
    pub fn dates(&self) -> Result<Vec<CfDateTime>> {
        let units = self.time_units()?;
        self.points.iter().map(|point| units.num2date(*point)).collect()
    }

    pub(crate) fn slice(&self, range: Range<usize>) -> Coord {
        let mut coord = self.clone();
        coord.points = self
            .points
            .slice_axis(Axis(0), Slice::from(range.clone()))
            .to_owned();
        coord.bounds = self
            .bounds
            .as_ref()
            .map(|bounds| bounds.slice_axis(Axis(0), Slice::from(range)).to_owned());

        coord
    }

    /// Join coordinates end to end. Metadata is taken from the first.
    pub(crate) fn join(coords: &[&Coord]) -> Result<Coord> {
        let first = coords
            .first()
            .ok_or_else(|| Error::Shape("no coordinates to join".to_string()))?;
        let points: Vec<_> = coords.iter().map(|coord| coord.points.view()).collect();
        let bounds = if coords.iter().all(|coord| coord.bounds.is_some()) {
            let bounds: Vec<_> = coords
                .iter()
                .filter_map(|coord| coord.bounds.as_ref().map(|bounds| bounds.view()))
                .collect();
            Some(concatenate(Axis(0), &bounds)?)
        } else {
            None
        };

        let mut coord = (*first).clone();
        coord.points = concatenate(Axis(0), &points)?;
        coord.bounds = bounds;

        Ok(coord)
    }
}

/// A fragment of a gridded dataset: an N dimensional array of values with named coordinates and
/// a map of attributes.
///
#[derive(Clone, Debug)]
pub struct Cube {
    pub var_name: String,
    pub standard_name: Option<String>,
    pub long_name: Option<String>,
    pub units: String,
    pub attributes: Attributes,

    /// Coordinates and the dimension they describe, if any
    coords: Vec<(Coord, Option<usize>)>,

    data: CubeData,
}

impl Cube {
    pub fn new<S: Into<String>>(var_name: S, units: S, data: CubeData) -> Self {
        Self {
            var_name: var_name.into(),
            standard_name: None,
            long_name: None,
            units: units.into(),
            attributes: Attributes::new(),
            coords: vec![],
            data,
        }
    }

    pub fn with_standard_name<S: Into<String>>(mut self, standard_name: S) -> Self {
        self.standard_name = Some(standard_name.into());
        self
    }

    pub fn with_long_name<S: Into<String>>(mut self, long_name: S) -> Self {
        self.long_name = Some(long_name.into());
        self
    }

    /// Attach a coordinate to dimension `dim`, or as a scalar coordinate if `dim` is `None`.
    ///
    pub fn add_coord(&mut self, coord: Coord, dim: Option<usize>) -> Result<()> {
        let expected = match dim {
            Some(dim) => *self.shape().get(dim).ok_or_else(|| {
                Error::Shape(format!(
                    "cube {} has no dimension {dim} for coordinate {}",
                    self.name(),
                    coord.name()
                ))
            })?,
            None => 1,
        };
        if coord.len() != expected {
            return Err(Error::Shape(format!(
                "coordinate {} has {} points, expected {expected}",
                coord.name(),
                coord.len()
            )));
        }
        if let Some(bounds) = &coord.bounds {
            if bounds.shape() != [coord.len(), 2] {
                return Err(Error::Shape(format!(
                    "bounds of coordinate {} have shape {:?}",
                    coord.name(),
                    bounds.shape()
                )));
            }
        }

        self.coords.push((coord, dim));

        Ok(())
    }

    pub fn coords(&self) -> impl Iterator<Item = (&Coord, Option<usize>)> {
        self.coords.iter().map(|(coord, dim)| (coord, *dim))
    }

    pub fn coords_mut(&mut self) -> impl Iterator<Item = &mut Coord> {
        self.coords.iter_mut().map(|(coord, _)| coord)
    }

    fn find_coord(&self, name: &str) -> Option<usize> {
        let by = |get: fn(&Coord) -> Option<&str>| {
            self.coords
                .iter()
                .position(|(coord, _)| get(coord) == Some(name))
        };
        by(|coord| coord.standard_name.as_deref())
            .or_else(|| by(|coord| Some(coord.var_name.as_str())))
            .or_else(|| by(|coord| coord.long_name.as_deref()))
    }

    /// Look up a coordinate by standard name, var name or long name, in that order of preference.
    ///
    pub fn coord(&self, name: &str) -> Result<&Coord> {
        self.find_coord(name)
            .map(|index| &self.coords[index].0)
            .ok_or_else(|| Error::CoordinateNotFound(name.to_string()))
    }

    pub fn coord_mut(&mut self, name: &str) -> Result<&mut Coord> {
        match self.find_coord(name) {
            Some(index) => Ok(&mut self.coords[index].0),
            None => Err(Error::CoordinateNotFound(name.to_string())),
        }
    }

    pub fn has_coord(&self, name: &str) -> bool {
        self.find_coord(name).is_some()
    }

    /// The data dimensions described by the named coordinate. Empty for scalar coordinates.
    ///
    pub fn coord_dims(&self, name: &str) -> Result<Vec<usize>> {
        let index = self
            .find_coord(name)
            .ok_or_else(|| Error::CoordinateNotFound(name.to_string()))?;

        Ok(self.coords[index].1.into_iter().collect())
    }

    /// The first coordinate describing dimension `dim`
    pub fn dim_coord(&self, dim: usize) -> Option<&Coord> {
        self.coords
            .iter()
            .find(|(_, coord_dim)| *coord_dim == Some(dim))
            .map(|(coord, _)| coord)
    }

    /// The most descriptive name available
    pub fn name(&self) -> &str {
        self.standard_name
            .as_deref()
            .or(self.long_name.as_deref())
            .unwrap_or(&self.var_name)
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Whether the data is still deferred
    pub fn has_lazy_data(&self) -> bool {
        self.data.is_lazy()
    }

    pub fn core_data(&self) -> &CubeData {
        &self.data
    }

    /// A lazy view of the data, without realizing it
    pub fn lazy_data(&self) -> LazyArray {
        self.data.to_lazy()
    }

    /// Realize the data, keeping the realized array on the cube
    pub fn data(&mut self) -> Result<&ArrayD<f64>> {
        if let CubeData::Lazy(lazy) = &self.data {
            self.data = CubeData::Real(lazy.compute()?);
        }

        match &self.data {
            CubeData::Real(array) => Ok(array),
            CubeData::Lazy(_) => Err(Error::Shape(format!(
                "data of cube {} could not be realized",
                self.name()
            ))),
        }
    }

    /// Select `range` along dimension `dim`, slicing data and any coordinates on that dimension.
    ///
    pub fn slice_axis(&self, dim: usize, range: Range<usize>) -> Result<Cube> {
        let data = self.data.slice_axis(dim, range.clone())?;
        let coords = self
            .coords
            .iter()
            .map(|(coord, coord_dim)| match coord_dim {
                Some(coord_dim) if *coord_dim == dim => (coord.slice(range.clone()), Some(dim)),
                _ => (coord.clone(), *coord_dim),
            })
            .collect();

        Ok(Cube {
            var_name: self.var_name.clone(),
            standard_name: self.standard_name.clone(),
            long_name: self.long_name.clone(),
            units: self.units.clone(),
            attributes: self.attributes.clone(),
            coords,
            data,
        })
    }

    pub(crate) fn with_parts(&self, coords: Vec<(Coord, Option<usize>)>, data: CubeData) -> Cube {
        Cube {
            var_name: self.var_name.clone(),
            standard_name: self.standard_name.clone(),
            long_name: self.long_name.clone(),
            units: self.units.clone(),
            attributes: self.attributes.clone(),
            coords,
            data,
        }
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / ({}) (", self.name(), self.units)?;
        for (dim, len) in self.shape().iter().enumerate() {
            if dim > 0 {
                write!(f, "; ")?;
            }
            match self.dim_coord(dim) {
                Some(coord) => write!(f, "{}: {len}", coord.name())?,
                None => write!(f, "-- : {len}")?,
            }
        }
        write!(f, ")")
    }
}
