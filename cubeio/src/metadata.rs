//! Metadata manifests for preprocessed files.
//!
//! Diagnostics find their input through a `metadata.yml` next to the preprocessed files, mapping
//! each file to its attributes. NCL diagnostics can't read YAML, so the same information can also
//! be written as an NCL settings file.
//!
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use tracing::debug;

use crate::{
    attributes::{AttrValue, Attributes},
    errors::{Error, Result},
    ncl::{write_ncl_settings, Setting},
};

/// Name of the manifest written to each output directory
pub const METADATA_FILENAME: &str = "metadata.yml";

/// Attributes that always describe a dataset, even when every file shares them
pub const DATASET_KEYS: [&str; 1] = ["mip"];

/// Attributes that always describe the variable, even when files differ in them
pub const VARIABLE_KEYS: [&str; 2] = ["reference_dataset", "alternative_dataset"];

/// Sort position of products without a `recipe_dataset_index`
const UNINDEXED: f64 = 1e6;

/// A preprocessed file and its attributes
#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub filename: PathBuf,
    pub attributes: Attributes,
}

impl Product {
    pub fn new<P: Into<PathBuf>>(filename: P, attributes: Attributes) -> Self {
        Self {
            filename: filename.into(),
            attributes,
        }
    }

    fn dataset_index(&self) -> f64 {
        self.attributes
            .get("recipe_dataset_index")
            .and_then(AttrValue::as_f64)
            .unwrap_or(UNINDEXED)
    }

    fn dataset(&self) -> &str {
        self.attributes
            .get("dataset")
            .and_then(AttrValue::as_str)
            .unwrap_or("")
    }

    fn sort_order(&self, other: &Product) -> Ordering {
        self.dataset_index()
            .total_cmp(&other.dataset_index())
            .then_with(|| self.dataset().cmp(other.dataset()))
    }

    fn output_dir(&self) -> &Path {
        self.filename.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// The contents of a `metadata.yml`: filenames mapped to attributes, in order.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    entries: Vec<(String, Attributes)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, filename: &str) -> Option<&Attributes> {
        self.entries
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, attributes)| attributes)
    }

    /// Add or replace the attributes for `filename`. A replaced entry keeps its position.
    pub fn insert<S: Into<String>>(&mut self, filename: S, attributes: Attributes) {
        let filename = filename.into();
        match self.entries.iter_mut().find(|(name, _)| *name == filename) {
            Some((_, slot)) => *slot = attributes,
            None => self.entries.push((filename, attributes)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attributes)> {
        self.entries
            .iter()
            .map(|(name, attributes)| (name.as_str(), attributes))
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (filename, attributes) in self.iter() {
            map.serialize_entry(filename, attributes)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = Manifest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a mapping of filenames to attributes")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Manifest, A::Error> {
                let mut manifest = Manifest::new();
                while let Some((filename, attributes)) =
                    access.next_entry::<String, Attributes>()?
                {
                    manifest.insert(filename, attributes);
                }
                Ok(manifest)
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// Group products by output directory, keeping directories in the order first seen
fn group_by_dir(products: &[Product]) -> Vec<(&Path, Vec<&Product>)> {
    let mut groups: Vec<(&Path, Vec<&Product>)> = vec![];
    for product in products {
        let dir = product.output_dir();
        match groups.iter_mut().find(|(group, _)| *group == dir) {
            Some((_, members)) => members.push(product),
            None => groups.push((dir, vec![product])),
        }
    }

    groups
}

/// Attributes as written to the manifest, with a list of experiments joined into one name
fn manifest_attributes(product: &Product) -> Attributes {
    let mut attributes = product.attributes.clone();
    if let Some(AttrValue::Seq(exps)) = attributes.get("exp") {
        let joined = exps
            .iter()
            .map(AttrValue::to_string)
            .collect::<Vec<_>>()
            .join("-");
        attributes.insert("exp", joined);
    }

    attributes
}

/// Write a `metadata.yml` to every directory products were saved to.
///
/// Products don't need to be sorted. Within each directory they are listed by
/// `recipe_dataset_index`, then by `dataset`.
///
/// # Arguments
///
/// * `products` - The saved files and their attributes.
/// * `write_ncl` - Also write the metadata of each directory as NCL settings, to
///   `<short_name>_info.ncl`.
///
/// Returns the paths of all files written.
///
pub fn write_metadata(products: &[Product], write_ncl: bool) -> Result<Vec<PathBuf>> {
    let mut output_files = vec![];
    for (output_dir, mut group) in group_by_dir(products) {
        group.sort_by(|a, b| a.sort_order(b));

        let mut manifest = Manifest::new();
        for product in group {
            manifest.insert(
                product.filename.display().to_string(),
                manifest_attributes(product),
            );
        }

        let output_filename = output_dir.join(METADATA_FILENAME);
        debug!("Writing metadata for {} files to {}", manifest.len(), output_filename.display());
        fs::write(&output_filename, serde_yaml::to_string(&manifest)?)?;
        output_files.push(output_filename);

        if write_ncl {
            output_files.push(write_ncl_metadata(output_dir, &manifest)?);
        }
    }

    Ok(output_files)
}

/// Read a manifest written by `write_metadata`.
pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<Manifest> {
    let file = File::open(path)?;
    let manifest = serde_yaml::from_reader(BufReader::new(file))?;

    Ok(manifest)
}

/// Split the attributes of each file into those that describe its dataset and those shared by
/// the variable, as NCL diagnostics expect them.
///
/// An attribute describes the dataset if any file has a different value for it, or lacks it.
///
pub(crate) fn ncl_info(manifest: &Manifest) -> (Attributes, Vec<Attributes>) {
    let variables: Vec<&Attributes> = manifest.iter().map(|(_, attributes)| attributes).collect();

    let mut variable_info = Attributes::new();
    let mut dataset_info = vec![];
    for variable in &variables {
        let mut info = Attributes::new();
        for (key, value) in variable.iter() {
            let dataset_specific = variables
                .iter()
                .any(|other| other.get(key) != Some(value));
            if (dataset_specific || DATASET_KEYS.contains(&key)) && !VARIABLE_KEYS.contains(&key) {
                info.insert(key, value.clone());
            } else {
                variable_info.insert(key, value.clone());
            }
        }
        dataset_info.push(info);
    }

    (variable_info, dataset_info)
}

fn write_ncl_metadata(output_dir: &Path, manifest: &Manifest) -> Result<PathBuf> {
    let (variable_info, dataset_info) = ncl_info(manifest);
    let short_name = variable_info
        .get("short_name")
        .and_then(AttrValue::as_str)
        .ok_or_else(|| {
            Error::Ncl(format!(
                "No short_name shared by all files in {}",
                output_dir.display()
            ))
        })?;
    let filename = output_dir.join(format!("{short_name}_info.ncl"));

    let input_file_info = manifest
        .iter()
        .map(|(_, attributes)| Setting::Map(attributes.clone()))
        .collect();
    let mut settings = BTreeMap::new();
    settings.insert("input_file_info".to_string(), Setting::List(input_file_info));
    settings.insert(
        "dataset_info".to_string(),
        Setting::List(dataset_info.into_iter().map(Setting::Map).collect()),
    );
    settings.insert(
        "variable_info".to_string(),
        Setting::List(vec![Setting::Map(variable_info)]),
    );

    debug!("Writing NCL metadata to {}", filename.display());
    write_ncl_settings(&settings, &filename)?;

    Ok(filename)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn product(dir: &Path, dataset: &str, index: Option<i64>) -> Product {
        let mut attributes = Attributes::new();
        if let Some(index) = index {
            attributes.insert("recipe_dataset_index", index);
        }
        attributes.insert("dataset", dataset);
        attributes.insert("short_name", "tas");
        attributes.insert("mip", "Amon");
        attributes.insert("start_year", 2000);

        Product::new(dir.join(format!("CMIP6_{dataset}_tas.nc")), attributes)
    }

    fn key(product: &Product) -> String {
        product.filename.display().to_string()
    }

    #[test]
    fn test_groups_and_orders() -> Result<()> {
        let dir = tempdir()?;
        let dir_a = dir.path().join("a");
        let dir_b = dir.path().join("b");
        fs::create_dir(&dir_a)?;
        fs::create_dir(&dir_b)?;

        let second = product(&dir_a, "MIROC6", Some(2));
        let other = product(&dir_b, "CanESM5", None);
        let first = product(&dir_a, "UKESM1", Some(1));

        let written = write_metadata(&[second.clone(), other.clone(), first.clone()], false)?;
        assert_eq!(
            written,
            vec![dir_a.join(METADATA_FILENAME), dir_b.join(METADATA_FILENAME)]
        );

        let manifest = read_manifest(dir_a.join(METADATA_FILENAME))?;
        assert_eq!(manifest.filenames().collect::<Vec<_>>(), vec![key(&first), key(&second)]);

        let manifest = read_manifest(dir_b.join(METADATA_FILENAME))?;
        assert_eq!(manifest.filenames().collect::<Vec<_>>(), vec![key(&other)]);

        Ok(())
    }

    #[test]
    fn test_unindexed_sorted_by_dataset() -> Result<()> {
        let dir = tempdir()?;
        let indexed = product(dir.path(), "ZZZ", Some(3));
        let b = product(dir.path(), "B", None);
        let a = product(dir.path(), "A", None);

        write_metadata(&[b.clone(), a.clone(), indexed.clone()], false)?;
        let manifest = read_manifest(dir.path().join(METADATA_FILENAME))?;
        assert_eq!(
            manifest.filenames().collect::<Vec<_>>(),
            vec![key(&indexed), key(&a), key(&b)]
        );

        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let mut with_exp = product(dir.path(), "EC-Earth3", Some(0));
        with_exp.attributes.insert("exp", vec!["historical", "ssp585"]);
        with_exp.attributes.insert("frequency", "mon");
        with_exp.attributes.insert("version", "true");
        let mut with_levels = product(dir.path(), "GFDL-CM4", Some(1));
        with_levels.attributes.insert("levels", vec![1000.0, 850.5]);
        with_levels.attributes.insert("regrid", false);

        write_metadata(&[with_levels.clone(), with_exp.clone()], false)?;

        let mut expected = Manifest::new();
        let mut exp_attributes = with_exp.attributes.clone();
        exp_attributes.insert("exp", "historical-ssp585");
        expected.insert(key(&with_exp), exp_attributes);
        expected.insert(key(&with_levels), with_levels.attributes.clone());

        let manifest = read_manifest(dir.path().join(METADATA_FILENAME))?;
        assert_eq!(manifest, expected);

        // Attribute order is kept too
        let attributes = manifest.get(&key(&with_exp)).unwrap();
        assert_eq!(
            attributes.keys().collect::<Vec<_>>(),
            with_exp.attributes.keys().collect::<Vec<_>>()
        );

        Ok(())
    }

    #[test]
    fn test_ncl_info() {
        let dir = Path::new("/preproc/tas");
        let mut a = product(dir, "MIROC6", Some(0));
        a.attributes.insert("reference_dataset", "ERA5");
        a.attributes.insert("ensemble", "r1i1p1f1");
        let mut b = product(dir, "UKESM1", Some(1));
        b.attributes.insert("reference_dataset", "HadCRUT");

        let mut manifest = Manifest::new();
        manifest.insert(key(&a), a.attributes.clone());
        manifest.insert(key(&b), b.attributes.clone());

        let (variable_info, dataset_info) = ncl_info(&manifest);
        assert_eq!(
            variable_info.keys().collect::<Vec<_>>(),
            vec!["short_name", "start_year", "reference_dataset"]
        );
        assert_eq!(
            variable_info.get("reference_dataset"),
            Some(&AttrValue::from("HadCRUT"))
        );
        assert_eq!(
            dataset_info[0].keys().collect::<Vec<_>>(),
            vec!["recipe_dataset_index", "dataset", "mip", "ensemble"]
        );
        assert_eq!(
            dataset_info[1].keys().collect::<Vec<_>>(),
            vec!["recipe_dataset_index", "dataset", "mip"]
        );
    }

    #[test]
    fn test_write_ncl() -> Result<()> {
        let dir = tempdir()?;
        let a = product(dir.path(), "MIROC6", Some(0));
        let b = product(dir.path(), "UKESM1", Some(1));

        let written = write_metadata(&[a, b], true)?;
        let ncl_path = dir.path().join("tas_info.ncl");
        assert_eq!(written, vec![dir.path().join(METADATA_FILENAME), ncl_path.clone()]);

        let text = fs::read_to_string(&ncl_path)?;
        assert!(text.contains("variable_info[i]@short_name = \"tas\"\n"));
        assert!(text.contains("dataset_info[i]@dataset = \"UKESM1\"\n"));
        assert!(text.contains("dataset_info[i]@mip = \"Amon\"\n"));
        assert!(text.contains("input_file_info[i]@start_year = 2000\n"));
        assert!(!text.contains("variable_info[i]@mip"));

        Ok(())
    }

    #[test]
    fn test_write_ncl_needs_short_name() -> Result<()> {
        let dir = tempdir()?;
        let mut a = product(dir.path(), "MIROC6", Some(0));
        a.attributes.remove("short_name");

        assert!(matches!(write_metadata(&[a], true), Err(Error::Ncl(_))));

        Ok(())
    }
}
