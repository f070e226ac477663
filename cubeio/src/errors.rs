use std::io;
use std::path::PathBuf;
use std::result;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A source yielded no cubes at all
    #[error("Can not load cubes from {}", .0.display())]
    Load(PathBuf),

    /// Cubes could not be reduced to a single cube
    #[error("Can not concatenate cubes: {0}")]
    Concatenation(String),

    #[error("Coordinate not found: {0}")]
    CoordinateNotFound(String),

    #[error("Time coordinate error: {0}")]
    Time(String),

    /// A time extraction selected no points
    #[error("Time extraction error: {0}")]
    Extraction(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Bad cube file: {0}")]
    Format(String),

    /// A value that can't be written in the legacy settings format
    #[error("Can not write NCL settings: {0}")]
    Ncl(String),

    #[error(transparent)]
    IO(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Shape(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;
