//! Shared CLI helpers and the config command.

use std::path::{Path, PathBuf};

use crate::{DriftConfig, FeatureSchema, Frame};

/// Load a config file, or the defaults when none is given.
pub(crate) fn load_config(path: Option<&PathBuf>) -> crate::Result<DriftConfig> {
    match path {
        Some(path) => DriftConfig::from_json_file(path),
        None => Ok(DriftConfig::default()),
    }
}

/// Infer the feature schema of a dataset, leaving out `exclude`.
pub(crate) fn infer_schema(frame: &Frame, exclude: &[String]) -> crate::Result<FeatureSchema> {
    let exclude: Vec<&str> = exclude.iter().map(String::as_str).collect();
    let schema = FeatureSchema::infer(&frame.schema(), &exclude);
    if schema.is_empty() {
        return Err(crate::Error::schema_mismatch(
            "no numeric or categorical columns to monitor",
        ));
    }
    Ok(schema)
}

/// Write text to a file.
pub(crate) fn write_file(path: &Path, contents: &str) -> crate::Result<()> {
    std::fs::write(path, contents).map_err(|e| crate::Error::io(e, path))
}

/// Print or write the default drift config.
pub(crate) fn cmd_config(output: Option<&PathBuf>) -> crate::Result<()> {
    let json = DriftConfig::default().to_json_pretty()?;

    match output {
        Some(path) => {
            write_file(path, &json)?;
            println!("Config written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
