//! Deferred array data.
//!
//! A `LazyArray` knows its shape and how to produce its values, but doesn't produce them until
//! asked. Slicing and concatenating lazy arrays builds up a new deferred computation without
//! touching the underlying storage.
//!
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use ndarray::{concatenate, ArrayD, Axis, Slice};

use crate::errors::{Error, Result};

type Compute = dyn Fn() -> Result<ArrayD<f64>> + Send + Sync;

#[derive(Clone)]
pub struct LazyArray {
    shape: Vec<usize>,
    compute: Arc<Compute>,
}

impl LazyArray {
    /// Make a new lazy array from its shape and a function that computes its values.
    ///
    pub fn new<F>(shape: Vec<usize>, compute: F) -> Self
    where
        F: Fn() -> Result<ArrayD<f64>> + Send + Sync + 'static,
    {
        Self {
            shape,
            compute: Arc::new(compute),
        }
    }

    /// Wrap an already realized array
    pub fn from_array(array: ArrayD<f64>) -> Self {
        let shape = array.shape().to_vec();
        let array = Arc::new(array);
        Self::new(shape, move || Ok((*array).clone()))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Produce the values
    pub fn compute(&self) -> Result<ArrayD<f64>> {
        let array = (self.compute)()?;
        if array.shape() != self.shape.as_slice() {
            return Err(Error::Shape(format!(
                "lazy array promised shape {:?} but produced {:?}",
                self.shape,
                array.shape()
            )));
        }

        Ok(array)
    }

    /// Deferred selection of `range` along `axis`
    pub fn slice_axis(&self, axis: usize, range: Range<usize>) -> Result<Self> {
        check_range(&self.shape, axis, &range)?;
        let mut shape = self.shape.clone();
        shape[axis] = range.len();

        let parent = self.clone();
        Ok(Self::new(shape, move || {
            let array = parent.compute()?;
            Ok(array
                .slice_axis(Axis(axis), Slice::from(range.clone()))
                .to_owned())
        }))
    }

    /// Deferred concatenation of `parts` along `axis`
    pub fn concatenate(axis: usize, parts: &[LazyArray]) -> Result<Self> {
        let shapes: Vec<&[usize]> = parts.iter().map(|part| part.shape()).collect();
        let shape = joined_shape(axis, &shapes)?;

        let parts = parts.to_vec();
        Ok(Self::new(shape, move || {
            let arrays = parts
                .iter()
                .map(|part| part.compute())
                .collect::<Result<Vec<_>>>()?;
            let views: Vec<_> = arrays.iter().map(|array| array.view()).collect();
            Ok(concatenate(Axis(axis), &views)?)
        }))
    }
}

impl fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyArray{:?}", self.shape)
    }
}

/// The data payload of a cube: either still deferred or already in memory.
///
#[derive(Clone, Debug)]
pub enum CubeData {
    Lazy(LazyArray),
    Real(ArrayD<f64>),
}

impl CubeData {
    pub fn shape(&self) -> &[usize] {
        match self {
            CubeData::Lazy(array) => array.shape(),
            CubeData::Real(array) => array.shape(),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, CubeData::Lazy(_))
    }

    /// A lazy view of the data, wrapping real data if necessary
    pub fn to_lazy(&self) -> LazyArray {
        match self {
            CubeData::Lazy(array) => array.clone(),
            CubeData::Real(array) => LazyArray::from_array(array.clone()),
        }
    }

    /// Produce the values, computing them if still deferred
    pub fn compute(&self) -> Result<ArrayD<f64>> {
        match self {
            CubeData::Lazy(array) => array.compute(),
            CubeData::Real(array) => Ok(array.clone()),
        }
    }

    /// Select `range` along `axis`. Lazy data stays lazy.
    pub fn slice_axis(&self, axis: usize, range: Range<usize>) -> Result<Self> {
        match self {
            CubeData::Lazy(array) => Ok(CubeData::Lazy(array.slice_axis(axis, range)?)),
            CubeData::Real(array) => {
                check_range(array.shape(), axis, &range)?;
                Ok(CubeData::Real(
                    array.slice_axis(Axis(axis), Slice::from(range)).to_owned(),
                ))
            }
        }
    }

    /// Join `parts` along `axis`. The result is lazy if any of the parts is.
    pub fn concatenate(axis: usize, parts: &[CubeData]) -> Result<Self> {
        if parts.iter().any(|part| part.is_lazy()) {
            let parts: Vec<LazyArray> = parts.iter().map(|part| part.to_lazy()).collect();
            Ok(CubeData::Lazy(LazyArray::concatenate(axis, &parts)?))
        } else {
            let shapes: Vec<&[usize]> = parts.iter().map(|part| part.shape()).collect();
            joined_shape(axis, &shapes)?;
            let views: Vec<_> = parts
                .iter()
                .filter_map(|part| match part {
                    CubeData::Real(array) => Some(array.view()),
                    CubeData::Lazy(_) => None,
                })
                .collect();
            Ok(CubeData::Real(concatenate(Axis(axis), &views)?))
        }
    }
}

fn check_range(shape: &[usize], axis: usize, range: &Range<usize>) -> Result<()> {
    match shape.get(axis) {
        Some(&len) if range.start <= range.end && range.end <= len => Ok(()),
        Some(&len) => Err(Error::Shape(format!(
            "range {range:?} out of bounds for axis {axis} with length {len}"
        ))),
        None => Err(Error::Shape(format!(
            "axis {axis} out of bounds for array with shape {shape:?}"
        ))),
    }
}

/// Shape of the array obtained by joining arrays of the given shapes along `axis`
fn joined_shape(axis: usize, shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let first = shapes
        .first()
        .ok_or_else(|| Error::Shape("nothing to concatenate".to_string()))?;
    if axis >= first.len() {
        return Err(Error::Shape(format!(
            "axis {axis} out of bounds for array with shape {first:?}"
        )));
    }

    let mut shape = first.to_vec();
    for other in &shapes[1..] {
        let compatible = other.len() == first.len()
            && other
                .iter()
                .zip(first.iter())
                .enumerate()
                .all(|(i, (a, b))| i == axis || a == b);
        if !compatible {
            return Err(Error::Shape(format!(
                "can't join shape {other:?} to shape {first:?} along axis {axis}"
            )));
        }
        shape[axis] += other[axis];
    }

    Ok(shape)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::{arr2, Array2, IxDyn};

    use super::*;

    fn counting(array: Array2<f64>, counter: Arc<AtomicUsize>) -> LazyArray {
        let array = array.into_dyn();
        LazyArray::new(array.shape().to_vec(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(array.clone())
        })
    }

    #[test]
    fn test_slice_is_deferred() -> Result<()> {
        let counter = Arc::new(AtomicUsize::new(0));
        let lazy = counting(arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]), counter.clone());

        let sliced = lazy.slice_axis(0, 1..3)?;
        assert_eq!(sliced.shape(), &[2, 2]);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let array = sliced.compute()?;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(array, arr2(&[[3.0, 4.0], [5.0, 6.0]]).into_dyn());

        Ok(())
    }

    #[test]
    fn test_concatenate_lazy() -> Result<()> {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = counting(arr2(&[[1.0, 2.0]]), counter.clone());
        let b = counting(arr2(&[[3.0, 4.0], [5.0, 6.0]]), counter.clone());

        let joined = LazyArray::concatenate(0, &[a, b])?;
        assert_eq!(joined.shape(), &[3, 2]);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(
            joined.compute()?,
            arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn()
        );

        Ok(())
    }

    #[test]
    fn test_concatenate_shape_mismatch() {
        let a = LazyArray::from_array(ArrayD::zeros(IxDyn(&[1, 2])));
        let b = LazyArray::from_array(ArrayD::zeros(IxDyn(&[1, 3])));
        assert!(matches!(
            LazyArray::concatenate(0, &[a, b]),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let a = LazyArray::from_array(ArrayD::zeros(IxDyn(&[4, 2])));
        assert!(matches!(a.slice_axis(0, 2..5), Err(Error::Shape(_))));
        assert!(matches!(a.slice_axis(2, 0..1), Err(Error::Shape(_))));
    }

    #[test]
    fn test_cube_data_concatenate_real_stays_real() -> Result<()> {
        let a = CubeData::Real(arr2(&[[1.0], [2.0]]).into_dyn());
        let b = CubeData::Real(arr2(&[[3.0]]).into_dyn());
        let joined = CubeData::concatenate(0, &[a.clone(), b])?;
        assert!(!joined.is_lazy());
        assert_eq!(joined.shape(), &[3, 1]);

        let c = CubeData::Lazy(LazyArray::from_array(arr2(&[[4.0]]).into_dyn()));
        let joined = CubeData::concatenate(0, &[a, c])?;
        assert!(joined.is_lazy());
        assert_eq!(
            joined.compute()?,
            arr2(&[[1.0], [2.0], [4.0]]).into_dyn()
        );

        Ok(())
    }
}
