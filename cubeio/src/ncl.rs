//! Settings files for NCL diagnostics.
//!
//! NCL scripts read their settings by loading a generated file of NCL statements. Every top level
//! setting becomes an NCL variable. Lists become NCL lists, which are appended to rather than
//! replaced if the variable already exists, so several settings files can be loaded in a row to
//! build up one list.
//!
use std::collections::BTreeMap;
use std::fs;
use std::mem;
use std::path::Path;

use crate::{
    attributes::{AttrValue, Attributes},
    errors::{Error, Result},
};

/// A value that can be written to an NCL settings file
#[derive(Clone, Debug, PartialEq)]
pub enum Setting {
    Value(AttrValue),

    /// Written as a logical with one NCL attribute per entry
    Map(Attributes),

    List(Vec<Setting>),
}

impl From<AttrValue> for Setting {
    fn from(value: AttrValue) -> Self {
        Setting::Value(value)
    }
}

impl From<Attributes> for Setting {
    fn from(attributes: Attributes) -> Self {
        Setting::Map(attributes)
    }
}

fn ncl_type(setting: &Setting) -> Result<&'static str> {
    match setting {
        Setting::Value(AttrValue::Bool(_)) | Setting::Map(_) => Ok("logical"),
        Setting::Value(AttrValue::Str(_)) => Ok("string"),
        Setting::Value(AttrValue::Float(_)) => Ok("double"),
        Setting::Value(AttrValue::Int(_)) => Ok("int64"),
        Setting::Value(AttrValue::Seq(_)) | Setting::List(_) => Err(Error::Ncl(format!(
            "Unable to map {setting:?} to an NCL type"
        ))),
    }
}

fn format_value(value: &AttrValue) -> Result<String> {
    Ok(match value {
        AttrValue::Bool(true) => "True".to_string(),
        AttrValue::Bool(false) => "False".to_string(),
        AttrValue::Str(s) => format!("\"{s}\""),
        AttrValue::Seq(items) => match items.first() {
            None => "_Missing".to_string(),
            Some(first) => {
                if items.iter().any(|item| mem::discriminant(item) != mem::discriminant(first)) {
                    return Err(Error::Ncl(format!("NCL array cannot be mixed type: {value}")));
                }
                let items = items.iter().map(format_value).collect::<Result<Vec<_>>>()?;
                format!("(/{}/)", items.join(", "))
            }
        },
        AttrValue::Int(_) | AttrValue::Float(_) => value.to_string(),
    })
}

fn assignment(setting: &Setting, var_name: &str) -> Result<String> {
    match setting {
        Setting::Value(value) => Ok(format!("{var_name} = {}", format_value(value)?)),
        Setting::Map(attributes) => {
            let mut text = format!("{var_name} = True\n");
            for (key, value) in attributes {
                text.push_str(&format!("{var_name}@{key} = {}\n", format_value(value)?));
            }
            Ok(text)
        }
        Setting::List(_) => Err(Error::Ncl(format!(
            "NCL does not support nested lists: {var_name}"
        ))),
    }
}

/// Render settings as NCL statements, one variable per setting, in key order.
///
pub fn ncl_settings(settings: &BTreeMap<String, Setting>) -> Result<String> {
    let mut lines = vec![];
    for (var_name, setting) in settings {
        let items = match setting {
            Setting::List(items) => Some(items.clone()),
            Setting::Value(AttrValue::Seq(items)) => {
                Some(items.iter().cloned().map(Setting::Value).collect())
            }
            _ => None,
        };

        match items {
            Some(items) => {
                lines.push(format!(
                    "if (.not. isdefined(\"{var_name}\")) then\n  {var_name} = NewList(\"fifo\")\nend if\n"
                ));
                for item in &items {
                    lines.push(format!(
                        "ListAppend({var_name}, new(1, {}))\ni = ListCount({var_name}) - 1",
                        ncl_type(item)?
                    ));
                    lines.push(assignment(item, &format!("{var_name}[i]"))?);
                }
            }
            None => {
                lines.push(format!(
                    "if (isvar(\"{var_name}\")) then\n  delete({var_name})\nend if\n"
                ));
                lines.push(assignment(setting, var_name)?);
            }
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');

    Ok(text)
}

/// Write settings to a file NCL scripts can `load`, replacing the file if it exists.
///
pub fn write_ncl_settings<P: AsRef<Path>>(settings: &BTreeMap<String, Setting>, path: P) -> Result<()> {
    let text = ncl_settings(settings)?;
    fs::write(path, text)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn settings(entries: Vec<(&str, Setting)>) -> BTreeMap<String, Setting> {
        entries
            .into_iter()
            .map(|(key, setting)| (key.to_string(), setting))
            .collect()
    }

    #[test]
    fn test_scalars() -> Result<()> {
        let text = ncl_settings(&settings(vec![
            ("title", AttrValue::from("Near-surface air temperature").into()),
            ("anomaly", AttrValue::from(false).into()),
            ("threshold", AttrValue::from(2.5).into()),
        ]))?;

        assert_eq!(
            text,
            "if (isvar(\"anomaly\")) then\n  delete(anomaly)\nend if\n\n\
             anomaly = False\n\
             if (isvar(\"threshold\")) then\n  delete(threshold)\nend if\n\n\
             threshold = 2.5\n\
             if (isvar(\"title\")) then\n  delete(title)\nend if\n\n\
             title = \"Near-surface air temperature\"\n"
        );

        Ok(())
    }

    #[test]
    fn test_top_level_sequence_is_a_list() -> Result<()> {
        let text = ncl_settings(&settings(vec![(
            "years",
            AttrValue::from(vec![2000, 2001]).into(),
        )]))?;

        assert_eq!(
            text,
            "if (.not. isdefined(\"years\")) then\n  years = NewList(\"fifo\")\nend if\n\n\
             ListAppend(years, new(1, int64))\ni = ListCount(years) - 1\n\
             years[i] = 2000\n\
             ListAppend(years, new(1, int64))\ni = ListCount(years) - 1\n\
             years[i] = 2001\n"
        );

        Ok(())
    }

    #[test]
    fn test_list_of_maps() -> Result<()> {
        let mut info = Attributes::new();
        info.insert("dataset", "MPI-ESM-LR");
        info.insert("start_year", 2000);

        let text = ncl_settings(&settings(vec![(
            "input_file_info",
            Setting::List(vec![info.into(), Attributes::new().into()]),
        )]))?;

        assert_eq!(
            text,
            "if (.not. isdefined(\"input_file_info\")) then\n  \
             input_file_info = NewList(\"fifo\")\nend if\n\n\
             ListAppend(input_file_info, new(1, logical))\n\
             i = ListCount(input_file_info) - 1\n\
             input_file_info[i] = True\n\
             input_file_info[i]@dataset = \"MPI-ESM-LR\"\n\
             input_file_info[i]@start_year = 2000\n\n\
             ListAppend(input_file_info, new(1, logical))\n\
             i = ListCount(input_file_info) - 1\n\
             input_file_info[i] = True\n\n"
        );

        Ok(())
    }

    #[test]
    fn test_empty_sequence_is_missing() -> Result<()> {
        let mut info = Attributes::new();
        info.insert("exclude", AttrValue::Seq(vec![]));

        let text = ncl_settings(&settings(vec![("info", info.into())]))?;
        assert!(text.contains("info@exclude = _Missing\n"));

        Ok(())
    }

    #[test]
    fn test_mixed_types() {
        let mut info = Attributes::new();
        info.insert(
            "mixed",
            AttrValue::Seq(vec![AttrValue::from(1), AttrValue::from("one")]),
        );

        let result = ncl_settings(&settings(vec![("info", info.into())]));
        assert!(matches!(result, Err(Error::Ncl(_))));
    }

    #[test]
    fn test_nested_lists() {
        let result = ncl_settings(&settings(vec![(
            "nested",
            Setting::List(vec![Setting::List(vec![])]),
        )]));
        assert!(matches!(result, Err(Error::Ncl(_))));
    }

    #[test]
    fn test_write() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("tas_info.ncl");
        fs::write(&path, "stale")?;

        let settings = settings(vec![("diag_script", AttrValue::from("ts").into())]);
        write_ncl_settings(&settings, &path)?;
        assert_eq!(fs::read_to_string(&path)?, ncl_settings(&settings)?);

        Ok(())
    }
}
