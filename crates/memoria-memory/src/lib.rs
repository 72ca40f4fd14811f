//! Tiered experiential memory: Buffer (L1) → Fractal (L2) → Archive (L3),
//! unified behind `PureMemoryCore`.

pub mod archive;
pub mod buffer;
pub mod consolidation;
pub mod core;
pub mod fractal;
pub mod promoter;

pub use archive::{Archive, ArchiveIndexEntry, ArchiveStats};
pub use buffer::{Buffer, EvictionSink};
pub use consolidation::{ConsolidationEngine, PatternRecord};
pub use core::{DreamPattern, PureMemoryCore};
pub use fractal::Fractal;
pub use promoter::{promotion_score, promotion_threshold, should_promote, ResonanceCache};
