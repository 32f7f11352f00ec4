//! Certificate-fetch seam plus the default reqwest-backed implementation.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::tls::TlsInfo;
// self
use crate::{_prelude::*, error::ProviderError};

/// Boxed future alias returned by certificate fetch operations.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = FetchResult> + 'a + Send>>;
/// Result of one certificate fetch: the leaf certificate in DER form.
pub type FetchResult = Result<Vec<u8>, ProviderError>;

/// Transport seam that retrieves the issuer's leaf TLS certificate.
///
/// The reconciler calls this exactly once per run, and only when it is about to register a new
/// provider. Implementations return the peer (leaf) certificate of the issuer's HTTPS endpoint
/// in DER form; thumbprinting happens in the resolver.
pub trait CertificateFetcher
where
	Self: Send + Sync,
{
	/// Fetches the leaf certificate presented by `url` during the TLS handshake.
	fn fetch_leaf_certificate<'a>(&'a self, url: &'a Url) -> FetchFuture<'a>;
}

/// Default [`CertificateFetcher`] backed by reqwest.
///
/// Thin wrapper around [`ReqwestClient`] so shared TLS behavior lives in one place. The peer
/// certificate is captured off the handshake of a `HEAD` request; the response body is never
/// read.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestCertificateFetcher(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestCertificateFetcher {
	/// Builds the strict default client: HTTPS only, TLS info captured off the handshake.
	pub fn new() -> Result<Self, ProviderError> {
		let client = ReqwestClient::builder()
			.tls_info(true)
			.https_only(true)
			.build()
			.map_err(ProviderError::certificate)?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	///
	/// The client must be built with `tls_info(true)`; without it the handshake exposes no peer
	/// certificate and every fetch reports [`ProviderError::MissingCertificate`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl CertificateFetcher for ReqwestCertificateFetcher {
	fn fetch_leaf_certificate<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
		Box::pin(async move {
			let response =
				self.0.head(url.clone()).send().await.map_err(ProviderError::certificate)?;
			let der = response
				.extensions()
				.get::<TlsInfo>()
				.and_then(|info| info.peer_certificate())
				.ok_or_else(|| ProviderError::MissingCertificate { url: url.clone() })?;

			Ok(der.to_vec())
		})
	}
}
