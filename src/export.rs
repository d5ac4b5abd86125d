//! Export - Download the Current Kit to Disk
//!
//! Writes the three decoded assets plus a `manifest.json` recording what
//! was written and the digest of every file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::client::PaletteEntry;
use crate::codec::ResourceStore;
use crate::hashing::{compute_manifest_hash, sha256_hex};
use crate::session::{AssetKind, GenerationResult, InstalledAsset};
use crate::submission::Parameters;

pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Resource for {0:?} asset has already been released")]
    ResourceReleased(AssetKind),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedAsset {
    pub kind: AssetKind,
    pub filename: String,
    pub media_type: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub id: String,
    pub exported_at: DateTime<Utc>,
    pub source_name: String,
    pub parameters: Parameters,
    pub assets: Vec<ExportedAsset>,
    pub palette: Vec<PaletteEntry>,
    pub manifest_hash: String,
}

/// Reduce an engine-supplied filename to a bare file name inside `dir`.
pub fn safe_filename(asset: &InstalledAsset) -> String {
    Path::new(&asset.filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| asset.kind.fallback_filename().to_string())
}

pub fn export_result(
    result: &GenerationResult,
    store: &ResourceStore,
    dir: &Path,
) -> Result<ExportManifest, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut assets = Vec::with_capacity(3);
    for asset in result.assets() {
        let resource = store
            .resolve(&asset.handle)
            .ok_or(ExportError::ResourceReleased(asset.kind))?;
        let filename = safe_filename(asset);
        let path = dir.join(&filename);
        fs::write(&path, &resource.bytes).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), bytes = resource.len(), "asset exported");
        assets.push(ExportedAsset {
            kind: asset.kind,
            filename,
            media_type: resource.media_type.clone(),
            bytes: resource.len() as u64,
            sha256: sha256_hex(&resource.bytes),
        });
    }

    let mut manifest = ExportManifest {
        id: Uuid::new_v4().to_string(),
        exported_at: Utc::now(),
        source_name: result.source_name.clone(),
        parameters: result.parameters,
        assets,
        palette: result.palette.clone(),
        manifest_hash: String::new(),
    };
    manifest.manifest_hash = compute_manifest_hash(&manifest)?;

    let path = dir.join(MANIFEST_FILENAME);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .map_err(|source| ExportError::Write { path, source })?;

    Ok(manifest)
}
