//! Derived artifact cache
//!
//! Maps `(source, stamp, derivation kind)` to a file on disk. Artifacts are
//! produced at most once at a time per key and published by renaming a
//! completed temporary file into place, so readers never see partial output.
//!
//! # Entry States
//!
//! | State | Meaning | Next request |
//! |-------|---------|--------------|
//! | Pending | Derivation in flight | Waits for its outcome |
//! | Ready | Output published | Served if the source stamp still matches |
//! | Failed | Last derivation failed | Retries |

pub mod key;
pub mod layout;
pub mod manifest;
mod store;

pub use key::{CacheKey, CacheState};
pub use layout::Layout;
pub use manifest::{Manifest, ManifestRecord, PruneReport};
pub use store::{Artifact, ArtifactCache, CacheStats, SweepReport};
