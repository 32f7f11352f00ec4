//! Reconciler for GitHub Actions OIDC federation into AWS IAM: provision the identity provider, a
//! scoped trust-policy role, and its policy attachments from one desired-state value, idempotently.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod apply;
pub mod config;
pub mod error;
pub mod obs;
pub mod plan;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod trust;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		provider::{CertificateFetcher, FetchFuture},
		reconcile::Reconciler,
		store::{IamStore, MemoryStore},
	};

	/// Certificate fetcher that serves a fixed DER blob without touching the network.
	#[derive(Clone, Debug)]
	pub struct StaticCertificateFetcher(pub Vec<u8>);
	impl CertificateFetcher for StaticCertificateFetcher {
		fn fetch_leaf_certificate<'a>(&'a self, _url: &'a Url) -> FetchFuture<'a> {
			let der = self.0.clone();

			Box::pin(async move { Ok(der) })
		}
	}

	/// Constructs a [`Reconciler`] backed by an in-memory store and a canned issuer certificate,
	/// returning the store handle for direct state assertions.
	pub fn build_test_reconciler() -> (Reconciler, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn IamStore> = store_backend.clone();
		let certificates: Arc<dyn CertificateFetcher> =
			Arc::new(StaticCertificateFetcher(b"issuer-leaf-certificate".to_vec()));
		let reconciler = Reconciler::new(store, certificates);

		(reconciler, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::RwLock;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as JsonValue;
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;

#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
