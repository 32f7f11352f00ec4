//! OIDC identity-provider resolution.
//!
//! A run resolves exactly one [`ProviderReference`], either by registering a fresh provider for
//! the well-known issuer (leaf-certificate thumbprint included) or by looking up an existing one
//! by URL. The reference is immutable once resolved and is consumed only by the trust-policy
//! builder.

pub mod fetcher;

pub use fetcher::*;

// std
use std::fmt::Write;
// crates.io
use sha1::{Digest, Sha1};
// self
use crate::{
	_prelude::*,
	config::{DesiredConfig, GITHUB_OIDC_ISSUER, STS_AUDIENCE},
	error::ProviderError,
	store::IamStore,
};

/// Resolved identity-provider reference shared by the trust-policy builder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReference {
	/// Provider ARN, newly created or looked up.
	pub arn: String,
	/// Issuer URL the provider is registered for.
	pub url: Url,
}
impl ProviderReference {
	/// Namespaced condition claim key, e.g. `token.actions.githubusercontent.com:sub`.
	pub fn condition_claim(&self, claim: &str) -> String {
		match self.url.host_str() {
			Some(host) => format!("{host}:{claim}"),
			None => format!("{}:{claim}", self.url),
		}
	}
}

/// Hex-encoded SHA-1 thumbprint of a DER certificate, the format IAM expects on provider
/// registration.
pub fn thumbprint(der: &[u8]) -> String {
	Sha1::digest(der).iter().fold(String::with_capacity(40), |mut hex, byte| {
		let _ = write!(hex, "{byte:02x}");

		hex
	})
}

/// Resolves the provider reference for one run.
///
/// With `create_oidc_provider` set, an existing registration for the issuer is reused when
/// present (re-runs converge instead of tripping over a duplicate); otherwise the issuer's leaf
/// certificate is fetched, thumbprinted, and a fresh provider is registered with the STS
/// audience as its sole client id. Without the flag, a missing provider is
/// [`ProviderError::NotFound`]: the caller asserted it exists, so creation never happens.
pub async fn resolve(
	store: &dyn IamStore,
	certificates: &dyn CertificateFetcher,
	config: &DesiredConfig,
) -> Result<ProviderReference> {
	let url = Url::parse(GITHUB_OIDC_ISSUER)
		.map_err(|e| ProviderError::InvalidIssuer { source: e })?;
	let existing = store.find_openid_provider(&url).await?;

	match (config.create_oidc_provider, existing) {
		(_, Some(record)) => Ok(ProviderReference { arn: record.arn, url }),
		(true, None) => {
			let der = certificates.fetch_leaf_certificate(&url).await?;
			let thumbprint = thumbprint(&der);
			let record = store
				.create_openid_provider(&url, STS_AUDIENCE, &thumbprint, &config.tags)
				.await?;

			Ok(ProviderReference { arn: record.arn, url })
		},
		(false, None) => Err(ProviderError::NotFound { url }.into()),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn thumbprint_is_forty_hex_chars() {
		let thumbprint = thumbprint(b"certificate-der-bytes");

		assert_eq!(thumbprint.len(), 40);
		assert!(thumbprint.bytes().all(|b| b.is_ascii_hexdigit()));
		assert_eq!(thumbprint, thumbprint.to_lowercase());
	}

	#[test]
	fn thumbprint_is_deterministic() {
		assert_eq!(thumbprint(b"same input"), thumbprint(b"same input"));
		assert_ne!(thumbprint(b"one"), thumbprint(b"another"));
	}

	#[test]
	fn condition_claim_is_host_scoped() {
		let reference = ProviderReference {
			arn: "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com"
				.into(),
			url: Url::parse(GITHUB_OIDC_ISSUER).expect("Issuer constant should parse."),
		};

		assert_eq!(
			reference.condition_claim("sub"),
			"token.actions.githubusercontent.com:sub"
		);
	}
}
