mod attributes;
mod cleanup;
pub mod codec;
mod concatenate;
mod cube;
mod errors;
mod extio;
mod extract;
mod lazy;
mod load;
mod merge;
mod metadata;
mod ncl;
mod save;
mod time;

#[cfg(test)]
mod testing;

pub use attributes::AttrValue;
pub use attributes::Attributes;

pub use cleanup::cleanup;

pub use concatenate::concatenate;
pub use concatenate::concatenate_overlapping;
pub use concatenate::unify_attributes;

pub use cube::Coord;
pub use cube::Cube;

pub use errors::Error;
pub use errors::Result;

pub use extract::extract_time;

pub use lazy::CubeData;
pub use lazy::LazyArray;

pub use load::concatenate_callback;
pub use load::load;
pub use load::load_files;

pub use merge::concatenate_cube;
pub use merge::concatenate_cubes;

pub use metadata::read_manifest;
pub use metadata::write_metadata;
pub use metadata::Manifest;
pub use metadata::Product;
pub use metadata::{DATASET_KEYS, METADATA_FILENAME, VARIABLE_KEYS};

pub use ncl::ncl_settings;
pub use ncl::write_ncl_settings;
pub use ncl::Setting;

pub use save::debug_filename;
pub use save::save;
pub use save::OptimizeAccess;
pub use save::SaveOptions;
pub use save::GLOBAL_FILL_VALUE;

pub use time::Calendar;
pub use time::CfDateTime;
pub use time::TimeRange;
pub use time::TimeUnits;
pub use time::Ymd;
