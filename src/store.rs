//! Remote IAM store contract, resource records, and the per-run snapshot.
//!
//! The reconciler treats the cloud as an opaque remote store behind [`IamStore`]: get, create,
//! update, and delete per resource kind, each keyed by a stable identifier (ARN or name), with
//! per-call consistency and no cross-call transactionality. One [`RemoteSnapshot`] is loaded at
//! run start and never re-read mid-run; a concurrent external edit of the same role is an
//! accepted lost-update risk.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{_prelude::*, config::DesiredConfig};

/// Boxed future alias returned by every [`IamStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Tag mapping stamped onto created resources.
pub type Tags = BTreeMap<String, String>;

/// Remote-store contract for the IAM resources the reconciler manages.
pub trait IamStore
where
	Self: Send + Sync,
{
	/// Looks up an OIDC provider registration by issuer URL.
	fn find_openid_provider<'a>(&'a self, url: &'a Url) -> StoreFuture<'a, Option<ProviderRecord>>;

	/// Registers a new OIDC provider for the issuer with one audience and one thumbprint.
	fn create_openid_provider<'a>(
		&'a self,
		url: &'a Url,
		audience: &'a str,
		thumbprint: &'a str,
		tags: &'a Tags,
	) -> StoreFuture<'a, ProviderRecord>;

	/// Fetches a role by name.
	fn get_role<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<RoleRecord>>;

	/// Creates a role from the provided spec.
	fn create_role<'a>(&'a self, spec: &'a RoleSpec) -> StoreFuture<'a, RoleRecord>;

	/// Replaces the trust-policy document on an existing role.
	fn update_trust_policy<'a>(
		&'a self,
		role_name: &'a str,
		document: &'a str,
	) -> StoreFuture<'a, ()>;

	/// Replaces the maximum session duration on an existing role.
	fn update_session_duration<'a>(
		&'a self,
		role_name: &'a str,
		seconds: u32,
	) -> StoreFuture<'a, ()>;

	/// Lists the policies currently attached to a role.
	fn list_attached_policies<'a>(
		&'a self,
		role_name: &'a str,
	) -> StoreFuture<'a, Vec<AttachedPolicy>>;

	/// Lists the policies living under an IAM path, with their current documents.
	fn list_policies_by_path<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<PolicyRecord>>;

	/// Creates a policy under the given path.
	fn create_policy<'a>(
		&'a self,
		name: &'a str,
		path: &'a str,
		document: &'a str,
		tags: &'a Tags,
	) -> StoreFuture<'a, PolicyRecord>;

	/// Replaces the document of an existing policy (new default version).
	fn update_policy_document<'a>(
		&'a self,
		arn: &'a str,
		document: &'a str,
	) -> StoreFuture<'a, ()>;

	/// Deletes a policy; fails while the policy is still attached anywhere.
	fn delete_policy<'a>(&'a self, arn: &'a str) -> StoreFuture<'a, ()>;

	/// Attaches a policy to a role.
	fn attach_policy<'a>(&'a self, role_name: &'a str, arn: &'a str) -> StoreFuture<'a, ()>;

	/// Detaches a policy from a role.
	fn detach_policy<'a>(&'a self, role_name: &'a str, arn: &'a str) -> StoreFuture<'a, ()>;
}

/// OIDC provider registration as the remote store reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
	/// Provider ARN.
	pub arn: String,
	/// Issuer URL the registration is keyed by.
	pub url: Url,
}

/// Role as the remote store reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
	/// Role name; immutable.
	pub name: String,
	/// Role ARN.
	pub arn: String,
	/// Stable unique id assigned at creation.
	pub role_id: String,
	/// Current trust-policy document, JSON text.
	pub trust_policy: String,
	/// Current maximum session duration in seconds.
	pub max_session_duration: u32,
}

/// Creation payload for a role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
	/// Role name.
	pub name: String,
	/// Human-readable description.
	pub description: String,
	/// Initial trust-policy document, JSON text.
	pub trust_policy: String,
	/// Maximum session duration in seconds.
	pub max_session_duration: u32,
	/// Tags stamped at creation.
	pub tags: Tags,
}

/// Attachment entry as reported by the remote store: a (role, policy) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedPolicy {
	/// Policy name.
	pub name: String,
	/// Policy ARN.
	pub arn: String,
}

/// Policy as the remote store reports it, document included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
	/// Policy name.
	pub name: String,
	/// Policy ARN.
	pub arn: String,
	/// Current default-version document, JSON text.
	pub document: String,
}

/// Error type produced by [`IamStore`] implementations.
///
/// Kept `Clone + Serialize` so apply-phase failures can ride inside per-operation outcome
/// reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The addressed entity does not exist.
	#[error("Remote entity `{identifier}` was not found.")]
	NotFound {
		/// ARN or name used to address the entity.
		identifier: String,
	},
	/// An entity with the same identifier already exists.
	#[error("Remote entity `{identifier}` already exists.")]
	AlreadyExists {
		/// ARN or name used to address the entity.
		identifier: String,
	},
	/// Any other remote failure.
	#[error("Remote store failure: {message}.")]
	Remote {
		/// Human-readable error payload.
		message: String,
	},
}

/// Read-once view of the remote state taken at run start.
///
/// Attached policies under the configuration's [`policy path`](DesiredConfig::policy_path) are
/// reconciler-owned; `custom_policies` lists every policy under that path (attached or not, so
/// a half-applied previous run still converges) keyed by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSnapshot {
	/// Role record, when the role already exists.
	pub role: Option<RoleRecord>,
	/// Policies currently attached to the role.
	pub attached: Vec<AttachedPolicy>,
	/// Reconciler-owned policies under the configuration's path, keyed by name.
	pub custom_policies: BTreeMap<String, PolicyRecord>,
}
impl RemoteSnapshot {
	/// Loads the snapshot for one run.
	pub async fn load(store: &dyn IamStore, config: &DesiredConfig) -> Result<Self, StoreError> {
		let role = store.get_role(&config.role_name).await?;
		let attached = match &role {
			Some(role) => store.list_attached_policies(&role.name).await?,
			None => Vec::new(),
		};
		let custom_policies = store
			.list_policies_by_path(&config.policy_path())
			.await?
			.into_iter()
			.map(|policy| (policy.name.clone(), policy))
			.collect();

		Ok(Self { role, attached, custom_policies })
	}

	/// Whether the given ARN is currently attached to the role.
	pub fn is_attached(&self, arn: &str) -> bool {
		self.attached.iter().any(|policy| policy.arn == arn)
	}
}
