//! Run orchestration facade.
//!
//! [`Reconciler`] owns the two external-collaborator seams (remote store, certificate fetcher)
//! and drives one run through the fixed stage pipeline: validate, resolve provider, snapshot,
//! build trust policy, plan, apply, collect outputs. Each stage consumes the prior stage's
//! output; no stage re-reads remote state an earlier stage already fetched.

// self
use crate::{
	_prelude::*,
	apply::{self, RunReport},
	config::DesiredConfig,
	obs::{StageKind, StageSpan},
	plan,
	provider::{self, CertificateFetcher},
	store::{IamStore, RemoteSnapshot},
	trust::TrustPolicyDocument,
};
#[cfg(feature = "reqwest")] use crate::provider::ReqwestCertificateFetcher;

/// Coordinates reconciler runs against a single remote store.
#[derive(Clone)]
pub struct Reconciler {
	/// Remote store the run mutates.
	pub store: Arc<dyn IamStore>,
	/// Certificate fetcher consulted when a fresh provider is registered.
	pub certificates: Arc<dyn CertificateFetcher>,
	run_guard: Arc<AsyncMutex<()>>,
}
impl Reconciler {
	/// Creates a reconciler over the provided store and certificate fetcher.
	pub fn new(store: Arc<dyn IamStore>, certificates: Arc<dyn CertificateFetcher>) -> Self {
		Self { store, certificates, run_guard: Default::default() }
	}

	/// Creates a reconciler with the default reqwest-backed certificate fetcher.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(store: Arc<dyn IamStore>) -> Result<Self> {
		Ok(Self::new(store, Arc::new(ReqwestCertificateFetcher::new()?)))
	}

	/// Executes one reconciliation run for the desired configuration.
	///
	/// Validation and provider-resolution failures abort before any mutation. Apply-phase
	/// failures are aggregated into the returned [`RunReport`] with `failed` set; partial
	/// application is preserved and a re-run with the same configuration converges. Concurrent
	/// `run` calls on one reconciler are serialized so trust-policy and session-duration writes
	/// to a single role never race.
	pub async fn run(&self, config: &DesiredConfig) -> Result<RunReport> {
		{
			let _guard = StageSpan::new(StageKind::Validate).entered();

			config.validate()?;
		}

		let _run = self.run_guard.lock().await;
		let started_at = OffsetDateTime::now_utc();
		let provider = {
			let span = StageSpan::new(StageKind::ResolveProvider);

			span.instrument(provider::resolve(
				self.store.as_ref(),
				self.certificates.as_ref(),
				config,
			))
			.await?
		};
		let snapshot = {
			let span = StageSpan::new(StageKind::Snapshot);

			span.instrument(RemoteSnapshot::load(self.store.as_ref(), config)).await?
		};
		let operations = {
			let _guard = StageSpan::new(StageKind::Plan).entered();
			let trust =
				TrustPolicyDocument::for_repositories(&provider, &config.github_repositories);

			plan::build(config, &trust, &snapshot)?
		};
		let outcomes = {
			let span = StageSpan::new(StageKind::Apply);

			span.instrument(apply::apply(self.store.as_ref(), &snapshot, operations)).await?
		};
		let outputs = apply::collect_outputs(self.store.as_ref(), config, &provider).await?;
		let failed = outcomes.iter().any(|outcome| outcome.status.is_failed());
		let finished_at = OffsetDateTime::now_utc();

		Ok(RunReport { failed, outcomes, outputs, started_at, finished_at })
	}
}
impl Debug for Reconciler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Reconciler").finish_non_exhaustive()
	}
}
