//! Submission Model
//!
//! A submission is a snapshot: every input change produces a new one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::constraints::ConstraintTable;

/// A file the user picked, before validation.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    pub media_type: String,
    bytes: Arc<[u8]>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, inferring its media type from the extension.
    pub fn from_path(path: &Path) -> Result<Self, io::Error> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(name, media_type_for_path(path), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Raw numeric form values. NaN stands for an unparseable field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormValues {
    pub num_colors: f64,
    pub max_width: f64,
    pub min_region_size: f64,
}

impl FormValues {
    pub fn defaults(table: &ConstraintTable) -> Self {
        Self {
            num_colors: f64::from(table.num_colors.default),
            max_width: f64::from(table.max_width.default),
            min_region_size: f64::from(table.min_region_size.default),
        }
    }

    /// Parse text inputs the way a numeric form field would.
    pub fn parse(num_colors: &str, max_width: &str, min_region_size: &str) -> Self {
        Self {
            num_colors: parse_field(num_colors),
            max_width: parse_field(max_width),
            min_region_size: parse_field(min_region_size),
        }
    }
}

impl Default for FormValues {
    fn default() -> Self {
        Self::defaults(&ConstraintTable::standard())
    }
}

fn parse_field(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Validated generation parameters as sent to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub num_colors: u32,
    pub max_width: u32,
    pub min_region_size: u32,
}

impl Parameters {
    /// Only meaningful after `validate_form` accepted `values`.
    ///
    /// Fractional values round to the nearest integer.
    pub(crate) fn from_validated(values: &FormValues) -> Self {
        Self {
            num_colors: values.num_colors.round() as u32,
            max_width: values.max_width.round() as u32,
            min_region_size: values.min_region_size.round() as u32,
        }
    }
}

/// Immutable request payload handed to the generation client.
#[derive(Debug, Clone)]
pub struct Submission {
    pub file: CandidateFile,
    pub parameters: Parameters,
}
