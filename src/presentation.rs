//! Presentation Adapter - Read-Only Session Projection

use serde::Serialize;

use crate::client::{GenerationEngine, PaletteEntry};
use crate::constraints::MIB;
use crate::notification::Notification;
use crate::session::{AssetKind, InstalledAsset, Outcome, Phase, ResultTab, Session};
use crate::submission::Parameters;

pub const DIMENSION_PLACEHOLDER: &str = "—";

/// "1.5 MB" from one MiB up, "512 KB" below.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.0} KB", bytes as f64 / 1024.0)
    }
}

pub fn format_dimensions(width: Option<u32>, height: Option<u32>) -> String {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => format!("{} × {}px", w, h),
        _ => DIMENSION_PLACEHOLDER.to_string(),
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PaletteSummary {
    pub total: usize,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PaletteSummary {
    pub fn of(palette: &[PaletteEntry]) -> Self {
        Self {
            total: palette.len(),
            first: palette.first().map(|e| e.hex.clone()),
            last: palette.last().map(|e| e.hex.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub media_type: String,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetCard {
    pub kind: AssetKind,
    pub filename: String,
    pub media_type: String,
    pub dimensions: String,
    pub size: String,
    pub locator: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub active_tab: ResultTab,
    pub parameters: Parameters,
    pub outline: AssetCard,
    pub preview: AssetCard,
    pub legend: AssetCard,
    pub palette: Vec<PaletteEntry>,
    pub palette_summary: PaletteSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub phase: Phase,
    pub submitting: bool,
    pub last_outcome: Option<Outcome>,
    pub notification: Option<Notification>,
    pub file: Option<FileSummary>,
    pub result: Option<ResultView>,
}

impl SessionView {
    pub fn project<E: GenerationEngine>(session: &Session<E>) -> Self {
        let file = session.file().map(|f| FileSummary {
            name: f.name.clone(),
            media_type: f.media_type.clone(),
            size: format_bytes(f.size()),
        });
        let result = session.result().map(|r| {
            let card = |asset: &InstalledAsset| {
                let size = session
                    .resources()
                    .resolve(&asset.handle)
                    .map(|res| res.len() as u64)
                    .unwrap_or(0);
                AssetCard {
                    kind: asset.kind,
                    filename: asset.filename.clone(),
                    media_type: asset.media_type.clone(),
                    dimensions: format_dimensions(asset.width, asset.height),
                    size: format_bytes(size),
                    locator: asset.handle.locator(),
                }
            };
            ResultView {
                active_tab: session.active_tab(),
                parameters: r.parameters,
                outline: card(&r.outline),
                preview: card(&r.preview),
                legend: card(&r.legend),
                palette: r.palette.clone(),
                palette_summary: PaletteSummary::of(&r.palette),
            }
        });
        Self {
            phase: session.phase(),
            submitting: session.indicator_visible(),
            last_outcome: session.last_outcome(),
            notification: session.notification().cloned(),
            file,
            result,
        }
    }
}
