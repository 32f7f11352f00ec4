//! Reconciler-level error types shared across validation, provider resolution, and apply.

// self
use crate::_prelude::*;

/// Reconciler-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical reconciler error exposed by public APIs.
///
/// Per-operation remote failures during the apply phase are *not* represented here; they ride
/// inside [`OperationOutcome`](crate::apply::OperationOutcome) so independent siblings keep
/// applying. Only pre-apply failures and internal invariant violations abort a run.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Desired configuration failed pre-flight validation; no remote call was made.
	#[error("{0}")]
	Validation(
		#[from]
		#[source]
		crate::config::ValidationReport,
	),
	/// Identity-provider resolution failure.
	#[error(transparent)]
	Provider(#[from] ProviderError),
	/// Remote store failure outside the apply phase (snapshot load, output collection).
	#[error("{0}")]
	Remote(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Trust-policy document failed to serialize; a defect in the document model.
	#[error("Trust-policy document could not be serialized to JSON.")]
	TrustPolicyEncode {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
	/// An attach or create reached the executor before its same-name detach; a defect in the
	/// planner, never a user-facing condition.
	#[error("Operation ordering invariant violated: {detail}.")]
	DependencyOrder {
		/// Description of the offending operation pair.
		detail: String,
	},
}

/// Identity-provider resolution failures raised before any mutation.
#[derive(Debug, ThisError)]
pub enum ProviderError {
	/// Reuse was requested but no provider is registered for the issuer.
	#[error("No OIDC provider is registered for issuer `{url}`.")]
	NotFound {
		/// Issuer URL used for the lookup.
		url: Url,
	},
	/// The well-known issuer URL constant failed to parse.
	#[error("Issuer URL is invalid.")]
	InvalidIssuer {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The issuer's TLS certificate could not be fetched.
	#[error("Issuer certificate could not be fetched.")]
	Certificate {
		/// Transport-specific fetch failure.
		#[source]
		source: BoxError,
	},
	/// The issuer handshake completed without exposing a peer certificate.
	#[error("Issuer `{url}` returned no peer certificate.")]
	MissingCertificate {
		/// Issuer URL the handshake targeted.
		url: Url,
	},
}
impl ProviderError {
	/// Wraps a transport-specific fetch failure inside [`ProviderError`].
	pub fn certificate(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Certificate { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ProviderError {
	fn from(e: ReqwestError) -> Self {
		Self::certificate(e)
	}
}
