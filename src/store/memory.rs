//! Thread-safe in-memory [`IamStore`] implementation for local development and tests.
//!
//! ARNs and role ids are fabricated deterministically under a fixed test account so assertions
//! stay stable across runs. Remote invariants the reconciler depends on are enforced: creates
//! collide on existing identifiers and a policy cannot be deleted while attached.

// self
use crate::{
	_prelude::*,
	store::{
		AttachedPolicy, IamStore, PolicyRecord, ProviderRecord, RoleRecord, RoleSpec, StoreError,
		StoreFuture, Tags,
	},
};

const ACCOUNT_ID: &str = "123456789012";

#[derive(Debug, Default)]
struct MemoryState {
	providers: BTreeMap<String, ProviderRecord>,
	roles: BTreeMap<String, RoleRecord>,
	policies: BTreeMap<String, StoredPolicy>,
	attachments: BTreeMap<String, BTreeSet<String>>,
	next_id: u64,
}

#[derive(Clone, Debug)]
struct StoredPolicy {
	record: PolicyRecord,
	path: String,
}

type SharedState = Arc<RwLock<MemoryState>>;

/// Thread-safe store backend that keeps IAM state in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SharedState);
impl MemoryStore {
	fn role_arn(name: &str) -> String {
		format!("arn:aws:iam::{ACCOUNT_ID}:role/{name}")
	}

	fn policy_arn(path: &str, name: &str) -> String {
		format!("arn:aws:iam::{ACCOUNT_ID}:policy{path}{name}")
	}

	fn provider_arn(url: &Url) -> String {
		let host = url.host_str().unwrap_or("unknown-issuer");

		format!("arn:aws:iam::{ACCOUNT_ID}:oidc-provider/{host}")
	}

	fn create_provider_now(
		state: SharedState,
		url: Url,
		_audience: String,
		_thumbprint: String,
	) -> Result<ProviderRecord, StoreError> {
		let mut guard = state.write();
		let key = url.to_string();

		if guard.providers.contains_key(&key) {
			return Err(StoreError::AlreadyExists { identifier: key });
		}

		let record = ProviderRecord { arn: Self::provider_arn(&url), url };

		guard.providers.insert(key, record.clone());

		Ok(record)
	}

	fn create_role_now(state: SharedState, spec: RoleSpec) -> Result<RoleRecord, StoreError> {
		let mut guard = state.write();

		if guard.roles.contains_key(&spec.name) {
			return Err(StoreError::AlreadyExists { identifier: spec.name });
		}

		guard.next_id += 1;

		let record = RoleRecord {
			arn: Self::role_arn(&spec.name),
			role_id: format!("AROA{:016}", guard.next_id),
			name: spec.name.clone(),
			trust_policy: spec.trust_policy,
			max_session_duration: spec.max_session_duration,
		};

		guard.roles.insert(spec.name, record.clone());

		Ok(record)
	}

	fn create_policy_now(
		state: SharedState,
		name: String,
		path: String,
		document: String,
	) -> Result<PolicyRecord, StoreError> {
		let mut guard = state.write();
		let arn = Self::policy_arn(&path, &name);

		if guard.policies.contains_key(&arn) {
			return Err(StoreError::AlreadyExists { identifier: arn });
		}

		let record = PolicyRecord { name, arn: arn.clone(), document };

		guard.policies.insert(arn, StoredPolicy { record: record.clone(), path });

		Ok(record)
	}

	fn delete_policy_now(state: SharedState, arn: String) -> Result<(), StoreError> {
		let mut guard = state.write();

		if guard.attachments.values().any(|attached| attached.contains(&arn)) {
			return Err(StoreError::Remote {
				message: format!("policy `{arn}` is still attached"),
			});
		}
		if guard.policies.remove(&arn).is_none() {
			return Err(StoreError::NotFound { identifier: arn });
		}

		Ok(())
	}

	fn attach_now(state: SharedState, role_name: String, arn: String) -> Result<(), StoreError> {
		let mut guard = state.write();

		if !guard.roles.contains_key(&role_name) {
			return Err(StoreError::NotFound { identifier: role_name });
		}

		guard.attachments.entry(role_name).or_default().insert(arn);

		Ok(())
	}

	fn detach_now(state: SharedState, role_name: String, arn: String) -> Result<(), StoreError> {
		let mut guard = state.write();
		let attached = guard
			.attachments
			.get_mut(&role_name)
			.ok_or_else(|| StoreError::NotFound { identifier: role_name.clone() })?;

		if !attached.remove(&arn) {
			return Err(StoreError::NotFound { identifier: arn });
		}

		Ok(())
	}

	fn list_attached_now(state: SharedState, role_name: String) -> Vec<AttachedPolicy> {
		let guard = state.read();

		guard
			.attachments
			.get(&role_name)
			.into_iter()
			.flatten()
			.map(|arn| AttachedPolicy {
				name: guard.policies.get(arn).map_or_else(
					// Externally owned policies were never created here; derive the name from
					// the ARN's last segment.
					|| arn.rsplit('/').next().unwrap_or(arn).to_owned(),
					|policy| policy.record.name.clone(),
				),
				arn: arn.clone(),
			})
			.collect()
	}
}
impl IamStore for MemoryStore {
	fn find_openid_provider<'a>(
		&'a self,
		url: &'a Url,
	) -> StoreFuture<'a, Option<ProviderRecord>> {
		let state = self.0.clone();
		let key = url.to_string();

		Box::pin(async move { Ok(state.read().providers.get(&key).cloned()) })
	}

	fn create_openid_provider<'a>(
		&'a self,
		url: &'a Url,
		audience: &'a str,
		thumbprint: &'a str,
		_tags: &'a Tags,
	) -> StoreFuture<'a, ProviderRecord> {
		let state = self.0.clone();
		let url = url.to_owned();
		let audience = audience.to_owned();
		let thumbprint = thumbprint.to_owned();

		Box::pin(async move { Self::create_provider_now(state, url, audience, thumbprint) })
	}

	fn get_role<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<RoleRecord>> {
		let state = self.0.clone();
		let name = name.to_owned();

		Box::pin(async move { Ok(state.read().roles.get(&name).cloned()) })
	}

	fn create_role<'a>(&'a self, spec: &'a RoleSpec) -> StoreFuture<'a, RoleRecord> {
		let state = self.0.clone();
		let spec = spec.to_owned();

		Box::pin(async move { Self::create_role_now(state, spec) })
	}

	fn update_trust_policy<'a>(
		&'a self,
		role_name: &'a str,
		document: &'a str,
	) -> StoreFuture<'a, ()> {
		let state = self.0.clone();
		let role_name = role_name.to_owned();
		let document = document.to_owned();

		Box::pin(async move {
			match state.write().roles.get_mut(&role_name) {
				Some(role) => {
					role.trust_policy = document;

					Ok(())
				},
				None => Err(StoreError::NotFound { identifier: role_name }),
			}
		})
	}

	fn update_session_duration<'a>(
		&'a self,
		role_name: &'a str,
		seconds: u32,
	) -> StoreFuture<'a, ()> {
		let state = self.0.clone();
		let role_name = role_name.to_owned();

		Box::pin(async move {
			match state.write().roles.get_mut(&role_name) {
				Some(role) => {
					role.max_session_duration = seconds;

					Ok(())
				},
				None => Err(StoreError::NotFound { identifier: role_name }),
			}
		})
	}

	fn list_attached_policies<'a>(
		&'a self,
		role_name: &'a str,
	) -> StoreFuture<'a, Vec<AttachedPolicy>> {
		let state = self.0.clone();
		let role_name = role_name.to_owned();

		Box::pin(async move { Ok(Self::list_attached_now(state, role_name)) })
	}

	fn list_policies_by_path<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<PolicyRecord>> {
		let state = self.0.clone();
		let path = path.to_owned();

		Box::pin(async move {
			Ok(state
				.read()
				.policies
				.values()
				.filter(|policy| policy.path == path)
				.map(|policy| policy.record.clone())
				.collect())
		})
	}

	fn create_policy<'a>(
		&'a self,
		name: &'a str,
		path: &'a str,
		document: &'a str,
		_tags: &'a Tags,
	) -> StoreFuture<'a, PolicyRecord> {
		let state = self.0.clone();
		let name = name.to_owned();
		let path = path.to_owned();
		let document = document.to_owned();

		Box::pin(async move { Self::create_policy_now(state, name, path, document) })
	}

	fn update_policy_document<'a>(
		&'a self,
		arn: &'a str,
		document: &'a str,
	) -> StoreFuture<'a, ()> {
		let state = self.0.clone();
		let arn = arn.to_owned();
		let document = document.to_owned();

		Box::pin(async move {
			match state.write().policies.get_mut(&arn) {
				Some(policy) => {
					policy.record.document = document;

					Ok(())
				},
				None => Err(StoreError::NotFound { identifier: arn }),
			}
		})
	}

	fn delete_policy<'a>(&'a self, arn: &'a str) -> StoreFuture<'a, ()> {
		let state = self.0.clone();
		let arn = arn.to_owned();

		Box::pin(async move { Self::delete_policy_now(state, arn) })
	}

	fn attach_policy<'a>(&'a self, role_name: &'a str, arn: &'a str) -> StoreFuture<'a, ()> {
		let state = self.0.clone();
		let role_name = role_name.to_owned();
		let arn = arn.to_owned();

		Box::pin(async move { Self::attach_now(state, role_name, arn) })
	}

	fn detach_policy<'a>(&'a self, role_name: &'a str, arn: &'a str) -> StoreFuture<'a, ()> {
		let state = self.0.clone();
		let role_name = role_name.to_owned();
		let arn = arn.to_owned();

		Box::pin(async move { Self::detach_now(state, role_name, arn) })
	}
}
