//! The clean and smudge pipelines for git-theta.
//!
//! Clean decomposes a checkpoint into per-tensor objects and the manifest
//! that stands in for it; smudge reassembles the checkpoint from a manifest
//! and the object store. Both sides share the update-envelope object layout
//! and the chain materialization that walks a parameter's history back to
//! its dense anchor.

mod clean;
mod envelope;
mod errors;
mod git;
mod gitattributes;
mod materialize;
mod smudge;
mod source;

pub use clean::{CleanOutcome, CleanPipeline};
pub use envelope::{get_record, put_record, record_oids};
pub use errors::{FilterError, FilterResult};
pub use git::GitRepo;
pub use gitattributes::{
    add_theta_to_gitattributes, pattern_matches, read_gitattributes, theta_tracked_patterns,
    write_gitattributes, THETA_ATTRIBUTES,
};
pub use materialize::{materialize_entry, ParamCache};
pub use smudge::SmudgePipeline;
pub use source::{GitManifestSource, ManifestSource, StaticManifestSource};

/// Remote that clean-time pushes target.
pub const DEFAULT_REMOTE: &str = "origin";
