//! Fixture configuration.

use crate::codec::Format;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When a fixture is recorded afresh and when it is replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Replay an existing fixture, record a new one otherwise.
    #[default]
    Once,
    /// Always record, overwriting any existing fixture.
    All,
    /// Only replay; a missing fixture is an error.
    Never,
}

/// Where fixtures live and how they're written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Directory holding fixture files.
    pub dir: PathBuf,

    /// Encoding for newly written fixtures.
    pub format: Format,

    /// Whether fixtures are replayed, recorded or both.
    pub record_mode: RecordMode,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("fixtures"),
            format: Format::Json,
            record_mode: RecordMode::Once,
        }
    }
}

impl FixtureConfig {
    /// Default settings with fixtures under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Sets the encoding for newly written fixtures.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Sets the record mode.
    pub fn with_record_mode(mut self, record_mode: RecordMode) -> Self {
        self.record_mode = record_mode;
        self
    }

    /// Path of the fixture called `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", self.format.extension()))
    }
}
