//! Sequential apply executor and run reporting.
//!
//! Operations are applied in plan order against the remote store. A remote failure is recorded
//! on that operation's outcome and never aborts independent siblings; operations whose
//! prerequisite failed earlier in the run (attaching a policy whose create failed, deleting a
//! policy whose detach failed, any role-bound operation after a failed role create) are skipped
//! with the reason recorded instead of being fired into a guaranteed remote rejection. There is
//! no rollback: re-running the reconciler with the same desired configuration converges.

// self
use crate::{
	_prelude::*,
	config::DesiredConfig,
	obs::{self, ApplyOutcome},
	plan::{Operation, PolicyTarget},
	provider::ProviderReference,
	store::{IamStore, RemoteSnapshot, RoleSpec, StoreError},
};

/// Terminal status of one applied operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum OperationStatus {
	/// Operation was applied against the remote store.
	Applied,
	/// Operation was not attempted because a prerequisite failed earlier in the run.
	Skipped {
		/// Prerequisite that failed.
		reason: String,
	},
	/// Remote store rejected the operation.
	Failed {
		/// Error reported by the remote store.
		error: StoreError,
	},
}
impl OperationStatus {
	/// Whether the operation failed remotely.
	pub const fn is_failed(&self) -> bool {
		matches!(self, OperationStatus::Failed { .. })
	}

	const fn as_label(&self) -> ApplyOutcome {
		match self {
			OperationStatus::Applied => ApplyOutcome::Applied,
			OperationStatus::Skipped { .. } => ApplyOutcome::Skipped,
			OperationStatus::Failed { .. } => ApplyOutcome::Failed,
		}
	}
}

/// Per-operation outcome entry in the run report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
	/// Operation as planned.
	pub operation: Operation,
	/// Terminal status.
	pub status: OperationStatus,
}

/// Post-apply outputs reflecting remote truth, not the desired input.
///
/// Role fields are `None` when the role never materialized, so consumers observe the actual
/// partial state after a failed run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunOutputs {
	/// Resolved provider ARN.
	pub oidc_provider_arn: String,
	/// Resolved provider issuer URL.
	pub oidc_provider_url: Url,
	/// Configured role name.
	pub role_name: String,
	/// Role ARN as the store reports it after apply.
	pub role_arn: Option<String>,
	/// Role unique id as the store reports it after apply.
	pub role_id: Option<String>,
	/// Names of reconciler-owned policies attached after apply.
	pub policy_names: Vec<String>,
	/// ARNs of reconciler-owned policies attached after apply.
	pub policy_arns: Vec<String>,
	/// Echo of the configured repository list.
	pub github_repositories: Vec<String>,
}

/// Aggregate result of one reconciler run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
	/// True when any operation failed; partial application is preserved either way.
	pub failed: bool,
	/// Per-operation outcomes in apply order.
	pub outcomes: Vec<OperationOutcome>,
	/// Post-apply remote truth.
	pub outputs: RunOutputs,
	/// Instant the apply phase started.
	pub started_at: OffsetDateTime,
	/// Instant the apply phase finished.
	pub finished_at: OffsetDateTime,
}

/// Applies the plan sequentially, returning per-operation outcomes.
///
/// Returns `Err` only for [`Error::DependencyOrder`], the planner-defect guard; every remote
/// failure is recorded in the outcomes instead.
pub async fn apply(
	store: &dyn IamStore,
	snapshot: &RemoteSnapshot,
	plan: Vec<Operation>,
) -> Result<Vec<OperationOutcome>> {
	check_ordering(&plan)?;

	let mut executor = Executor {
		store,
		snapshot,
		created_arns: BTreeMap::new(),
		failed_creates: BTreeSet::new(),
		failed_detaches: BTreeSet::new(),
		role_create_failed: false,
	};
	let mut outcomes = Vec::with_capacity(plan.len());

	for operation in plan {
		let status = executor.execute(&operation).await;

		obs::record_apply_outcome(operation.kind(), status.as_label());
		outcomes.push(OperationOutcome { operation, status });
	}

	Ok(outcomes)
}

/// Re-reads the role and its attachments so outputs reflect post-apply remote truth.
pub async fn collect_outputs(
	store: &dyn IamStore,
	config: &DesiredConfig,
	provider: &ProviderReference,
) -> Result<RunOutputs, StoreError> {
	let role = store.get_role(&config.role_name).await?;
	let attached = match &role {
		Some(role) => store.list_attached_policies(&role.name).await?,
		None => Vec::new(),
	};
	let path_marker = format!(":policy{}", config.policy_path());
	let (policy_names, policy_arns) = attached
		.into_iter()
		.filter(|policy| policy.arn.contains(&path_marker))
		.map(|policy| (policy.name, policy.arn))
		.unzip();

	Ok(RunOutputs {
		oidc_provider_arn: provider.arn.clone(),
		oidc_provider_url: provider.url.clone(),
		role_name: config.role_name.clone(),
		role_arn: role.as_ref().map(|role| role.arn.clone()),
		role_id: role.as_ref().map(|role| role.role_id.clone()),
		policy_names,
		policy_arns,
		github_repositories: config.github_repositories.clone(),
	})
}

// Every detach/delete for a policy name must sit before any create/attach reusing it. The
// planner's bucket ordering guarantees this; a violation here is a defect, not a user error.
fn check_ordering(plan: &[Operation]) -> Result<()> {
	let mut introduced = BTreeSet::new();

	for operation in plan {
		if let Some(name) = operation.introduces_policy() {
			introduced.insert(name.to_owned());
		}
		if let Some(name) = operation.removes_policy()
			&& introduced.contains(name)
		{
			return Err(Error::DependencyOrder {
				detail: format!(
					"`{}` for policy `{name}` is planned after the policy was reintroduced",
					operation.kind()
				),
			});
		}
	}

	Ok(())
}

struct Executor<'a> {
	store: &'a dyn IamStore,
	snapshot: &'a RemoteSnapshot,
	created_arns: BTreeMap<String, String>,
	failed_creates: BTreeSet<String>,
	failed_detaches: BTreeSet<String>,
	role_create_failed: bool,
}
impl Executor<'_> {
	async fn execute(&mut self, operation: &Operation) -> OperationStatus {
		match operation {
			Operation::CreateRole {
				name,
				description,
				trust_policy,
				max_session_duration,
				tags,
			} => {
				let spec = RoleSpec {
					name: name.clone(),
					description: description.clone(),
					trust_policy: trust_policy.clone(),
					max_session_duration: *max_session_duration,
					tags: tags.clone(),
				};

				match self.store.create_role(&spec).await {
					Ok(_) => OperationStatus::Applied,
					Err(error) => {
						self.role_create_failed = true;

						OperationStatus::Failed { error }
					},
				}
			},
			Operation::UpdateTrustPolicy { role_name, document } =>
				Self::settle(self.store.update_trust_policy(role_name, document).await),
			Operation::UpdateSessionDuration { role_name, seconds } =>
				Self::settle(self.store.update_session_duration(role_name, *seconds).await),
			Operation::DetachPolicy { role_name, name, arn } =>
				match self.store.detach_policy(role_name, arn).await {
					Ok(()) => OperationStatus::Applied,
					Err(error) => {
						self.failed_detaches.insert(name.clone());

						OperationStatus::Failed { error }
					},
				},
			Operation::DeletePolicy { name, arn } => {
				if self.failed_detaches.contains(name) {
					return OperationStatus::Skipped {
						reason: format!("detach of policy `{name}` failed"),
					};
				}

				Self::settle(self.store.delete_policy(arn).await)
			},
			Operation::CreatePolicy { name, path, document, tags } =>
				match self.store.create_policy(name, path, document, tags).await {
					Ok(record) => {
						self.created_arns.insert(name.clone(), record.arn);

						OperationStatus::Applied
					},
					Err(error) => {
						self.failed_creates.insert(name.clone());

						OperationStatus::Failed { error }
					},
				},
			Operation::UpdatePolicyDocument { arn, document, .. } =>
				Self::settle(self.store.update_policy_document(arn, document).await),
			Operation::AttachPolicy { role_name, target } => {
				if self.role_create_failed {
					return OperationStatus::Skipped {
						reason: format!("create of role `{role_name}` failed"),
					};
				}

				let arn = match target {
					PolicyTarget::Managed { arn } => arn.clone(),
					PolicyTarget::Custom { name } => {
						if self.failed_creates.contains(name) {
							return OperationStatus::Skipped {
								reason: format!("create of policy `{name}` failed"),
							};
						}

						match self.custom_arn(name) {
							Some(arn) => arn,
							None =>
								return OperationStatus::Skipped {
									reason: format!("no ARN is known for policy `{name}`"),
								},
						}
					},
				};

				Self::settle(self.store.attach_policy(role_name, &arn).await)
			},
		}
	}

	fn settle(result: Result<(), StoreError>) -> OperationStatus {
		match result {
			Ok(()) => OperationStatus::Applied,
			Err(error) => OperationStatus::Failed { error },
		}
	}

	// Created this run, or already present in the snapshot's path listing.
	fn custom_arn(&self, name: &str) -> Option<String> {
		self.created_arns
			.get(name)
			.cloned()
			.or_else(|| self.snapshot.custom_policies.get(name).map(|policy| policy.arn.clone()))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::{MemoryStore, Tags};

	fn empty_snapshot() -> RemoteSnapshot {
		RemoteSnapshot { role: None, attached: Vec::new(), custom_policies: BTreeMap::new() }
	}

	#[tokio::test]
	async fn out_of_order_plan_is_rejected_before_any_mutation() {
		let store = MemoryStore::default();
		let snapshot = empty_snapshot();
		let plan = vec![
			Operation::CreatePolicy {
				name: "p1".into(),
				path: "/deploy/".into(),
				document: "{}".into(),
				tags: Tags::new(),
			},
			Operation::DeletePolicy {
				name: "p1".into(),
				arn: "arn:aws:iam::123456789012:policy/deploy/p1".into(),
			},
		];
		let error = apply(&store, &snapshot, plan)
			.await
			.expect_err("Delete after create of the same policy must be rejected.");

		assert!(matches!(error, Error::DependencyOrder { .. }));
		assert!(
			store
				.list_policies_by_path("/deploy/")
				.await
				.expect("Path listing should succeed.")
				.is_empty(),
			"no operation may be applied once ordering is rejected"
		);
	}

	#[tokio::test]
	async fn attach_is_skipped_when_role_create_failed() {
		let store = MemoryStore::default();
		// Occupy the role name so the planned create collides.
		store
			.create_role(&RoleSpec {
				name: "deploy".into(),
				description: String::new(),
				trust_policy: "{}".into(),
				max_session_duration: 3_600,
				tags: Tags::new(),
			})
			.await
			.expect("Seeding the colliding role should succeed.");

		let snapshot = empty_snapshot();
		let plan = vec![
			Operation::CreateRole {
				name: "deploy".into(),
				description: String::new(),
				trust_policy: "{}".into(),
				max_session_duration: 3_600,
				tags: Tags::new(),
			},
			Operation::AttachPolicy {
				role_name: "deploy".into(),
				target: PolicyTarget::Managed {
					arn: "arn:aws:iam::aws:policy/ReadOnlyAccess".into(),
				},
			},
		];
		let outcomes =
			apply(&store, &snapshot, plan).await.expect("Apply itself should not abort.");

		assert!(outcomes[0].status.is_failed());
		assert!(matches!(outcomes[1].status, OperationStatus::Skipped { .. }));
	}

	#[tokio::test]
	async fn failure_does_not_abort_independent_siblings() {
		let store = MemoryStore::default();

		store
			.create_role(&RoleSpec {
				name: "deploy".into(),
				description: String::new(),
				trust_policy: "{}".into(),
				max_session_duration: 3_600,
				tags: Tags::new(),
			})
			.await
			.expect("Seeding the role should succeed.");

		let snapshot = RemoteSnapshot {
			role: store
				.get_role("deploy")
				.await
				.expect("Fetching the seeded role should succeed."),
			attached: Vec::new(),
			custom_policies: BTreeMap::new(),
		};
		// The detach targets a policy that was never attached and fails; the managed attach
		// after it is independent and must still run.
		let plan = vec![
			Operation::DetachPolicy {
				role_name: "deploy".into(),
				name: "ghost".into(),
				arn: "arn:aws:iam::123456789012:policy/deploy/ghost".into(),
			},
			Operation::AttachPolicy {
				role_name: "deploy".into(),
				target: PolicyTarget::Managed {
					arn: "arn:aws:iam::aws:policy/ReadOnlyAccess".into(),
				},
			},
		];
		let outcomes =
			apply(&store, &snapshot, plan).await.expect("Apply itself should not abort.");

		assert!(outcomes[0].status.is_failed());
		assert_eq!(outcomes[1].status, OperationStatus::Applied);

		let attached = store
			.list_attached_policies("deploy")
			.await
			.expect("Listing attachments should succeed.");

		assert_eq!(attached.len(), 1);
	}

	#[tokio::test]
	async fn delete_is_skipped_after_failed_detach() {
		let store = MemoryStore::default();
		let snapshot = empty_snapshot();
		let arn = "arn:aws:iam::123456789012:policy/deploy/p1".to_owned();
		let plan = vec![
			Operation::DetachPolicy {
				role_name: "deploy".into(),
				name: "p1".into(),
				arn: arn.clone(),
			},
			Operation::DeletePolicy { name: "p1".into(), arn },
		];
		let outcomes =
			apply(&store, &snapshot, plan).await.expect("Apply itself should not abort.");

		assert!(outcomes[0].status.is_failed());
		assert!(matches!(outcomes[1].status, OperationStatus::Skipped { .. }));
	}
}
