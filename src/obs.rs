//! Optional observability helpers for reconciler runs.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oidc_role_reconciler.stage` with the
//!   `stage` field set to the pipeline stage label.
//! - Enable `metrics` to increment the `oidc_role_reconciler_operation_total` counter for every
//!   applied/skipped/failed operation, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by the reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
	/// Pre-flight configuration validation.
	Validate,
	/// Identity-provider resolution.
	ResolveProvider,
	/// Remote snapshot load.
	Snapshot,
	/// Operation-plan computation.
	Plan,
	/// Sequential plan application.
	Apply,
}
impl StageKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageKind::Validate => "validate",
			StageKind::ResolveProvider => "resolve_provider",
			StageKind::Snapshot => "snapshot",
			StageKind::Plan => "plan",
			StageKind::Apply => "apply",
		}
	}
}
impl Display for StageKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each applied operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApplyOutcome {
	/// Operation was applied against the remote store.
	Applied,
	/// Operation was skipped because a prerequisite failed.
	Skipped,
	/// Remote store rejected the operation.
	Failed,
}
impl ApplyOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ApplyOutcome::Applied => "applied",
			ApplyOutcome::Skipped => "skipped",
			ApplyOutcome::Failed => "failed",
		}
	}
}
impl Display for ApplyOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
