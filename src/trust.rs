//! IAM trust-policy document model and builder.
//!
//! The document grants `sts:AssumeRoleWithWebIdentity` to the resolved OIDC provider, bound to
//! the fixed STS audience and to a subject pattern per desired repository. The `:*` suffix on
//! each subject pattern intentionally matches any branch, tag, PR, or environment reference for
//! that repository; the builder performs no suffix parsing or narrowing.

// self
use crate::{_prelude::*, config::STS_AUDIENCE, provider::ProviderReference};

/// IAM policy language version used by every generated document.
pub const POLICY_VERSION: &str = "2012-10-17";
/// Action granted to the federated principal.
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRoleWithWebIdentity";

/// Structured trust-policy document serialized into the IAM JSON policy wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPolicyDocument {
	/// Policy language version, always [`POLICY_VERSION`].
	pub version: String,
	/// Statement list; the builder emits exactly one.
	pub statement: Vec<TrustStatement>,
}
impl TrustPolicyDocument {
	/// Builds the single-statement trust policy for the provider and repository set.
	///
	/// The subject-pattern list follows the input repository ordering so generated documents
	/// diff deterministically; semantically the patterns are OR'd, so order is irrelevant to
	/// IAM.
	pub fn for_repositories(provider: &ProviderReference, repositories: &[String]) -> Self {
		let audience_claim = provider.condition_claim("aud");
		let subject_claim = provider.condition_claim("sub");
		let subjects = repositories.iter().map(|repository| format!("repo:{repository}:*"));

		Self {
			version: POLICY_VERSION.into(),
			statement: vec![TrustStatement {
				effect: "Allow".into(),
				principal: FederatedPrincipal { federated: provider.arn.clone() },
				action: ASSUME_ROLE_ACTION.into(),
				condition: TrustCondition {
					string_equals: BTreeMap::from_iter([(audience_claim, STS_AUDIENCE.into())]),
					string_like: BTreeMap::from_iter([(subject_claim, subjects.collect())]),
				},
			}],
		}
	}

	/// Serializes the document into IAM's JSON wire format.
	pub fn to_json(&self) -> Result<String> {
		serde_json::to_string(self).map_err(|e| Error::TrustPolicyEncode { source: e })
	}
}

/// One trust-policy statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustStatement {
	/// Statement effect; always `Allow` for generated documents.
	pub effect: String,
	/// Federated principal granted the action.
	pub principal: FederatedPrincipal,
	/// Granted action; always [`ASSUME_ROLE_ACTION`] for generated documents.
	pub action: String,
	/// Audience and subject predicates constraining the grant.
	pub condition: TrustCondition,
}

/// Federated principal clause referencing the provider ARN.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedPrincipal {
	/// ARN of the resolved OIDC provider.
	#[serde(rename = "Federated")]
	pub federated: String,
}

/// Condition block with the audience equality and subject pattern predicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustCondition {
	/// Exact-match predicates; carries the `<issuer-host>:aud` claim.
	#[serde(rename = "StringEquals")]
	pub string_equals: BTreeMap<String, String>,
	/// Wildcard-match predicates; carries the `<issuer-host>:sub` patterns, OR'd by IAM.
	#[serde(rename = "StringLike")]
	pub string_like: BTreeMap<String, Vec<String>>,
}
