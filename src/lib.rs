//! ruleweave - one canonical rule set, many assistant formats
//!
//! This crate resolves rule sources (local files or git repositories),
//! merges them into one canonical document, applies configured overlays,
//! and exports the result into tool-specific files while preserving
//! sections users wrote by hand.

pub mod bundle;
pub mod config;
pub mod error;
pub mod export;
pub mod lockfile;
pub mod markdown;
pub mod matcher;
pub mod overlay;
pub mod policy;
pub mod source;
pub mod sync;

pub use bundle::{merge_all, Conflict, MergeOutcome, MergeWarning};
pub use config::{EffectiveConfig, Mode, SyncConfig};
pub use error::SyncError;
pub use export::{ExportPipeline, ExportResult, FidelityNote, Transformer};
pub use matcher::{match_sections, MatchAction, MatchOutcome, MatchResult, MatchStats};
pub use overlay::{apply_overlays, overlay_status, Overlay, OverlayHealth, OverlayStatus};
pub use source::{GitCache, ResolvedSource, SourceResolver, SourceSpec, StalenessPolicy};
pub use sync::{SyncEngine, SyncOptions, SyncReport};
