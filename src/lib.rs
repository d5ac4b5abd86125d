//! PaintKit Core - Paint-by-Number Generation Sessions
//!
//! # Guarantees
//! 1. Validation Before Network
//! 2. At Most One Request In Flight
//! 3. At Most One Result's Resources Alive
//! 4. Superseded Responses Change Nothing
//! 5. Teardown Leaves Nothing Behind

pub mod constraints;
pub mod submission;
pub mod validation;
pub mod codec;
pub mod client;
pub mod config;
pub mod notification;
pub mod session;
pub mod presentation;
pub mod hashing;
pub mod export;

pub use constraints::{Bound, ConstraintTable};
pub use submission::{CandidateFile, FormValues, Parameters, Submission};
pub use validation::{validate_file, validate_form, IssueField, IssueScope, ValidationIssue};
pub use codec::{CodecError, Resource, ResourceHandle, ResourceStore};
pub use client::{ApiAsset, ClientError, GenerateResponse, GenerationEngine, HttpEngine, PaletteEntry};
pub use config::{AppConfig, ConfigError, EngineConfig, SessionConfig};
pub use notification::{Notification, NotificationKind};
pub use session::{AssetKind, GenerationResult, Outcome, Phase, RequestId, ResultTab, Session};
pub use presentation::{format_bytes, format_dimensions, PaletteSummary, SessionView};
pub use export::{export_result, ExportError, ExportManifest};

pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
