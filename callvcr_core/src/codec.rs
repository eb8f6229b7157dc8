//! # Codec Module
//!
//! Text encodings for persisted cassettes.
//!
//! Both encodings are deterministic for a given cassette (keys are kept in a
//! sorted map), so restoring a dump and encoding it again reproduces the
//! same bytes.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk format of a fixture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl Format {
    /// Picks the format named by a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }

    /// File extension used when writing this format.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
        }
    }
}

pub fn encode<T: Serialize + ?Sized>(value: &T, format: Format) -> Result<String> {
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value)?,
    })
}

pub fn decode<T: DeserializeOwned>(text: &str, format: Format) -> Result<T> {
    Ok(match format {
        Format::Json => serde_json::from_str(text)?,
        Format::Yaml => serde_yaml::from_str(text)?,
    })
}

pub fn write_file<T: Serialize + ?Sized>(value: &T, path: &Path, format: Format) -> Result<()> {
    let text = encode(value, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

pub fn read_file<T: DeserializeOwned>(path: &Path, format: Format) -> Result<T> {
    let text = fs::read_to_string(path)?;
    decode(&text, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(&PathBuf::from("a/b.json")), Some(Format::Json));
        assert_eq!(Format::from_path(&PathBuf::from("b.YML")), Some(Format::Yaml));
        assert_eq!(Format::from_path(&PathBuf::from("b.yaml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(&PathBuf::from("b.toml")), None);
        assert_eq!(Format::from_path(&PathBuf::from("b")), None);
    }

    #[test]
    fn test_file_round_trip_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("value.yaml");

        write_file(&vec![1, 2, 3], &path, Format::Yaml).unwrap();
        let back: Vec<i32> = read_file(&path, Format::Yaml).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_error_kind() {
        let err = decode::<Vec<i32>>("{", Format::Json).unwrap_err();
        assert!(matches!(err, crate::VcrError::Serialization(_)));
    }
}
