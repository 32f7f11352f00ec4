//! Desired-state configuration consumed by the reconciler.
//!
//! [`DesiredConfig`] is a plain immutable value describing the whole federated-role topology:
//! one OIDC provider, one role, and the policies attached to it. It is validated wholesale via
//! [`DesiredConfig::validate`] before any remote call; there is no partially-constructed state.

pub mod validate;

pub use validate::*;

// self
use crate::_prelude::*;

/// Well-known GitHub Actions OIDC issuer URL.
pub const GITHUB_OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";
/// Fixed STS audience bound to the provider and asserted by the trust policy.
pub const STS_AUDIENCE: &str = "sts.amazonaws.com";
/// Inclusive bounds accepted by IAM for a role's maximum session duration, in seconds.
pub const SESSION_DURATION_BOUNDS: (u32, u32) = (900, 43_200);

/// Desired federated-role topology applied by one reconciler run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfig {
	/// IAM role name; immutable once created (renaming requires recreation).
	pub role_name: String,
	/// Human-readable role description.
	pub role_description: String,
	/// Maximum session duration in seconds, within [`SESSION_DURATION_BOUNDS`].
	pub max_session_duration: u32,
	/// Repositories (`owner/repo`) whose workflows may assume the role. Order is preserved in
	/// the generated trust policy for deterministic diffing.
	pub github_repositories: Vec<String>,
	/// Reconciler-owned policies: name mapped to its JSON document text.
	pub custom_policies: BTreeMap<String, String>,
	/// Externally owned policies referenced by ARN only.
	pub managed_policy_arns: BTreeSet<String>,
	/// When true a fresh provider is registered for the issuer; when false an existing one is
	/// resolved by URL and its absence is a fatal error.
	pub create_oidc_provider: bool,
	/// Tags stamped onto every resource the reconciler creates.
	pub tags: BTreeMap<String, String>,
}
impl DesiredConfig {
	/// Creates a configuration with library defaults for the remaining fields.
	pub fn new(
		role_name: impl Into<String>,
		github_repositories: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		Self {
			role_name: role_name.into(),
			role_description: "Role assumed by GitHub Actions workflows via OIDC federation."
				.into(),
			max_session_duration: 3_600,
			github_repositories: github_repositories.into_iter().map(Into::into).collect(),
			custom_policies: BTreeMap::new(),
			managed_policy_arns: BTreeSet::new(),
			create_oidc_provider: true,
			tags: BTreeMap::new(),
		}
	}

	/// Adds or replaces a reconciler-owned policy document.
	pub fn with_custom_policy(
		mut self,
		name: impl Into<String>,
		document: impl Into<String>,
	) -> Self {
		self.custom_policies.insert(name.into(), document.into());

		self
	}

	/// References an externally owned policy by ARN.
	pub fn with_managed_policy(mut self, arn: impl Into<String>) -> Self {
		self.managed_policy_arns.insert(arn.into());

		self
	}

	/// Sets the maximum session duration in seconds.
	pub fn with_session_duration(mut self, seconds: u32) -> Self {
		self.max_session_duration = seconds;

		self
	}

	/// Resolves an existing provider by issuer URL instead of creating one.
	pub fn reuse_existing_provider(mut self) -> Self {
		self.create_oidc_provider = false;

		self
	}

	/// IAM path under which reconciler-owned policies are created.
	///
	/// The path is derived from the role name so ownership of an attached policy is decidable
	/// from its ARN alone; anything outside this path is treated as externally owned.
	pub fn policy_path(&self) -> String {
		format!("/{}/", self.role_name)
	}
}
