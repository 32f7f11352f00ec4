//! Diffing of desired state against the remote snapshot into an ordered operation plan.
//!
//! The diff is pure and computed once per run against the snapshot taken at run start. The
//! emitted plan is bucket-ordered (role create/update, detaches, policy deletes, policy
//! creates/updates, attaches) so every detach/delete strictly precedes any create/attach reusing
//! the same policy name and no transient duplicate-name conflict can reach the remote store.

// self
use crate::{
	_prelude::*,
	config::DesiredConfig,
	store::{RemoteSnapshot, Tags},
	trust::TrustPolicyDocument,
};

/// Reference to the policy targeted by an attach operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyTarget {
	/// Reconciler-owned policy addressed by name; its ARN may only exist after the create
	/// earlier in the same plan has been applied.
	Custom {
		/// Policy name from the desired configuration.
		name: String,
	},
	/// Externally owned policy addressed by ARN.
	Managed {
		/// Policy ARN from the desired configuration.
		arn: String,
	},
}

/// One remote mutation emitted by the planner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
	/// Create the role with its initial trust policy.
	CreateRole {
		/// Role name.
		name: String,
		/// Role description.
		description: String,
		/// Initial trust-policy document, JSON text.
		trust_policy: String,
		/// Maximum session duration in seconds.
		max_session_duration: u32,
		/// Tags stamped at creation.
		tags: Tags,
	},
	/// Replace the trust-policy document on the existing role.
	UpdateTrustPolicy {
		/// Role name.
		role_name: String,
		/// Regenerated trust-policy document, JSON text.
		document: String,
	},
	/// Replace the maximum session duration on the existing role.
	UpdateSessionDuration {
		/// Role name.
		role_name: String,
		/// New duration in seconds.
		seconds: u32,
	},
	/// Detach a policy from the role.
	DetachPolicy {
		/// Role name.
		role_name: String,
		/// Policy name.
		name: String,
		/// Policy ARN.
		arn: String,
	},
	/// Delete a reconciler-owned policy; its detach precedes it in the plan when attached.
	DeletePolicy {
		/// Policy name.
		name: String,
		/// Policy ARN.
		arn: String,
	},
	/// Create a reconciler-owned policy under the configuration's path.
	CreatePolicy {
		/// Policy name.
		name: String,
		/// IAM path for ownership classification.
		path: String,
		/// Policy document, JSON text.
		document: String,
		/// Tags stamped at creation.
		tags: Tags,
	},
	/// Replace the document of an existing reconciler-owned policy in place.
	UpdatePolicyDocument {
		/// Policy name.
		name: String,
		/// Policy ARN.
		arn: String,
		/// New policy document, JSON text.
		document: String,
	},
	/// Attach a policy to the role.
	AttachPolicy {
		/// Role name.
		role_name: String,
		/// Policy being attached.
		target: PolicyTarget,
	},
}
impl Operation {
	/// Stable label for spans and metrics.
	pub const fn kind(&self) -> &'static str {
		match self {
			Operation::CreateRole { .. } => "create_role",
			Operation::UpdateTrustPolicy { .. } => "update_trust_policy",
			Operation::UpdateSessionDuration { .. } => "update_session_duration",
			Operation::DetachPolicy { .. } => "detach_policy",
			Operation::DeletePolicy { .. } => "delete_policy",
			Operation::CreatePolicy { .. } => "create_policy",
			Operation::UpdatePolicyDocument { .. } => "update_policy_document",
			Operation::AttachPolicy { .. } => "attach_policy",
		}
	}

	/// Policy name the operation removes (detach/delete side of the ordering constraint).
	pub fn removes_policy(&self) -> Option<&str> {
		match self {
			Operation::DetachPolicy { name, .. } | Operation::DeletePolicy { name, .. } =>
				Some(name),
			_ => None,
		}
	}

	/// Policy name the operation introduces (create/attach side of the ordering constraint).
	pub fn introduces_policy(&self) -> Option<&str> {
		match self {
			Operation::CreatePolicy { name, .. } => Some(name),
			Operation::AttachPolicy { target: PolicyTarget::Custom { name }, .. } => Some(name),
			_ => None,
		}
	}
}

/// Builds the ordered operation plan for one run.
pub fn build(
	config: &DesiredConfig,
	trust: &TrustPolicyDocument,
	snapshot: &RemoteSnapshot,
) -> Result<Vec<Operation>> {
	let desired_trust = trust.to_json()?;
	let role_name = config.role_name.clone();
	let mut operations = Vec::new();

	match &snapshot.role {
		None => operations.push(Operation::CreateRole {
			name: role_name.clone(),
			description: config.role_description.clone(),
			trust_policy: desired_trust,
			max_session_duration: config.max_session_duration,
			tags: config.tags.clone(),
		}),
		Some(role) => {
			if !documents_match(&role.trust_policy, &desired_trust) {
				operations.push(Operation::UpdateTrustPolicy {
					role_name: role_name.clone(),
					document: desired_trust,
				});
			}
			if role.max_session_duration != config.max_session_duration {
				operations.push(Operation::UpdateSessionDuration {
					role_name: role_name.clone(),
					seconds: config.max_session_duration,
				});
			}
		},
	}

	let mut detaches = Vec::new();
	let mut deletes = Vec::new();
	let mut creates = Vec::new();
	let mut updates = Vec::new();
	let mut attaches = Vec::new();
	let custom_arns: BTreeSet<&str> =
		snapshot.custom_policies.values().map(|policy| policy.arn.as_str()).collect();

	for attached in &snapshot.attached {
		if custom_arns.contains(attached.arn.as_str()) {
			// Reconciler-owned; removal is handled by the path-listing walk below.
			if !config.custom_policies.contains_key(&attached.name) {
				detaches.push(Operation::DetachPolicy {
					role_name: role_name.clone(),
					name: attached.name.clone(),
					arn: attached.arn.clone(),
				});
			}
		} else if !config.managed_policy_arns.contains(&attached.arn) {
			detaches.push(Operation::DetachPolicy {
				role_name: role_name.clone(),
				name: attached.name.clone(),
				arn: attached.arn.clone(),
			});
		}
	}
	for (name, policy) in &snapshot.custom_policies {
		match config.custom_policies.get(name) {
			Some(desired_document) => {
				if !documents_match(&policy.document, desired_document) {
					updates.push(Operation::UpdatePolicyDocument {
						name: name.clone(),
						arn: policy.arn.clone(),
						document: desired_document.clone(),
					});
				}
				if !snapshot.is_attached(&policy.arn) {
					attaches.push(Operation::AttachPolicy {
						role_name: role_name.clone(),
						target: PolicyTarget::Custom { name: name.clone() },
					});
				}
			},
			// Orphans from half-applied runs are deleted even when nothing has them attached.
			None => deletes.push(Operation::DeletePolicy {
				name: name.clone(),
				arn: policy.arn.clone(),
			}),
		}
	}
	for (name, document) in &config.custom_policies {
		if !snapshot.custom_policies.contains_key(name) {
			creates.push(Operation::CreatePolicy {
				name: name.clone(),
				path: config.policy_path(),
				document: document.clone(),
				tags: config.tags.clone(),
			});
			attaches.push(Operation::AttachPolicy {
				role_name: role_name.clone(),
				target: PolicyTarget::Custom { name: name.clone() },
			});
		}
	}
	for arn in &config.managed_policy_arns {
		if !snapshot.is_attached(arn) {
			attaches.push(Operation::AttachPolicy {
				role_name: role_name.clone(),
				target: PolicyTarget::Managed { arn: arn.clone() },
			});
		}
	}

	operations.extend(detaches);
	operations.extend(deletes);
	operations.extend(creates);
	operations.extend(updates);
	operations.extend(attaches);

	Ok(operations)
}

/// Compares two policy documents by parsed JSON value, so formatting differences introduced by
/// the remote store never register as drift.
pub fn documents_match(current: &str, desired: &str) -> bool {
	match (
		serde_json::from_str::<JsonValue>(current),
		serde_json::from_str::<JsonValue>(desired),
	) {
		(Ok(current), Ok(desired)) => current == desired,
		_ => current == desired,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		provider::ProviderReference,
		store::{AttachedPolicy, PolicyRecord, RoleRecord},
	};

	fn provider_fixture() -> ProviderReference {
		ProviderReference {
			arn: "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com"
				.into(),
			url: Url::parse("https://token.actions.githubusercontent.com")
				.expect("Issuer fixture should parse."),
		}
	}

	fn trust_for(config: &DesiredConfig) -> TrustPolicyDocument {
		TrustPolicyDocument::for_repositories(&provider_fixture(), &config.github_repositories)
	}

	fn converged_snapshot(config: &DesiredConfig) -> RemoteSnapshot {
		let trust = trust_for(config)
			.to_json()
			.expect("Trust document fixture should serialize.");

		RemoteSnapshot {
			role: Some(RoleRecord {
				name: config.role_name.clone(),
				arn: format!("arn:aws:iam::123456789012:role/{}", config.role_name),
				role_id: "AROA0000000000000001".into(),
				trust_policy: trust,
				max_session_duration: config.max_session_duration,
			}),
			attached: Vec::new(),
			custom_policies: BTreeMap::new(),
		}
	}

	#[test]
	fn fresh_state_plans_role_create_and_custom_policy() {
		let config = DesiredConfig::new("deploy", ["org/a"])
			.with_custom_policy("p1", r#"{"Version":"2012-10-17","Statement":[]}"#);
		let snapshot =
			RemoteSnapshot { role: None, attached: Vec::new(), custom_policies: BTreeMap::new() };
		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning against an empty snapshot should succeed.");
		let kinds: Vec<_> = plan.iter().map(Operation::kind).collect();

		assert_eq!(kinds, ["create_role", "create_policy", "attach_policy"]);
	}

	#[test]
	fn converged_state_plans_nothing() {
		let config = DesiredConfig::new("deploy", ["org/a"]);
		let snapshot = converged_snapshot(&config);
		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning against a converged snapshot should succeed.");

		assert!(plan.is_empty(), "converged state must produce an empty plan: {plan:?}");
	}

	#[test]
	fn reformatted_remote_trust_document_is_not_drift() {
		let config = DesiredConfig::new("deploy", ["org/a"]);
		let mut snapshot = converged_snapshot(&config);
		let reformatted: JsonValue = serde_json::from_str(
			&snapshot.role.as_ref().expect("Fixture role should be present.").trust_policy,
		)
		.expect("Trust fixture should parse.");

		snapshot.role.as_mut().expect("Fixture role should be present.").trust_policy =
			serde_json::to_string_pretty(&reformatted)
				.expect("Pretty-printing the trust fixture should succeed.");

		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning against a reformatted snapshot should succeed.");

		assert!(plan.is_empty());
	}

	#[test]
	fn session_duration_drift_plans_exactly_one_update() {
		let config = DesiredConfig::new("deploy", ["org/a"]).with_session_duration(7_200);
		let mut snapshot = converged_snapshot(&config);

		snapshot.role.as_mut().expect("Fixture role should be present.").max_session_duration =
			3_600;

		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning duration drift should succeed.");

		assert_eq!(
			plan,
			[Operation::UpdateSessionDuration { role_name: "deploy".into(), seconds: 7_200 }]
		);
	}

	#[test]
	fn removed_custom_policy_detaches_before_delete() {
		let config = DesiredConfig::new("deploy", ["org/a"]);
		let arn = "arn:aws:iam::123456789012:policy/deploy/p1".to_owned();
		let mut snapshot = converged_snapshot(&config);

		snapshot.attached.push(AttachedPolicy { name: "p1".into(), arn: arn.clone() });
		snapshot.custom_policies.insert(
			"p1".into(),
			PolicyRecord { name: "p1".into(), arn: arn.clone(), document: "{}".into() },
		);

		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning a policy removal should succeed.");

		assert_eq!(plan.len(), 2);
		assert!(matches!(&plan[0], Operation::DetachPolicy { name, .. } if name == "p1"));
		assert!(matches!(&plan[1], Operation::DeletePolicy { name, .. } if name == "p1"));
	}

	#[test]
	fn changed_custom_document_updates_in_place() {
		let config = DesiredConfig::new("deploy", ["org/a"])
			.with_custom_policy("p1", r#"{"Version":"2012-10-17","Statement":[]}"#);
		let arn = "arn:aws:iam::123456789012:policy/deploy/p1".to_owned();
		let mut snapshot = converged_snapshot(&config);

		snapshot.attached.push(AttachedPolicy { name: "p1".into(), arn: arn.clone() });
		snapshot.custom_policies.insert(
			"p1".into(),
			PolicyRecord { name: "p1".into(), arn, document: r#"{"Version":"old"}"#.into() },
		);

		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning a document change should succeed.");

		assert_eq!(plan.len(), 1);
		assert!(matches!(&plan[0], Operation::UpdatePolicyDocument { name, .. } if name == "p1"));
	}

	#[test]
	fn unattached_orphan_policy_is_deleted_without_detach() {
		let config = DesiredConfig::new("deploy", ["org/a"]);
		let mut snapshot = converged_snapshot(&config);

		snapshot.custom_policies.insert(
			"orphan".into(),
			PolicyRecord {
				name: "orphan".into(),
				arn: "arn:aws:iam::123456789012:policy/deploy/orphan".into(),
				document: "{}".into(),
			},
		);

		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning orphan cleanup should succeed.");

		assert_eq!(plan.len(), 1);
		assert!(matches!(&plan[0], Operation::DeletePolicy { name, .. } if name == "orphan"));
	}

	#[test]
	fn undesired_managed_attachment_is_detached_but_not_deleted() {
		let config = DesiredConfig::new("deploy", ["org/a"])
			.with_managed_policy("arn:aws:iam::aws:policy/ReadOnlyAccess");
		let mut snapshot = converged_snapshot(&config);

		snapshot.attached.push(AttachedPolicy {
			name: "AdministratorAccess".into(),
			arn: "arn:aws:iam::aws:policy/AdministratorAccess".into(),
		});

		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning managed-policy drift should succeed.");
		let kinds: Vec<_> = plan.iter().map(Operation::kind).collect();

		assert_eq!(kinds, ["detach_policy", "attach_policy"]);
		assert!(matches!(
			&plan[0],
			Operation::DetachPolicy { name, .. } if name == "AdministratorAccess"
		));
	}

	#[test]
	fn removals_always_precede_introductions() {
		let config = DesiredConfig::new("deploy", ["org/a"])
			.with_custom_policy("p2", "{}")
			.with_managed_policy("arn:aws:iam::aws:policy/ReadOnlyAccess");
		let p1_arn = "arn:aws:iam::123456789012:policy/deploy/p1".to_owned();
		let mut snapshot = converged_snapshot(&config);

		snapshot.attached.push(AttachedPolicy { name: "p1".into(), arn: p1_arn.clone() });
		snapshot.custom_policies.insert(
			"p1".into(),
			PolicyRecord { name: "p1".into(), arn: p1_arn, document: "{}".into() },
		);

		let plan = build(&config, &trust_for(&config), &snapshot)
			.expect("Planning mixed drift should succeed.");
		let last_removal = plan
			.iter()
			.rposition(|operation| operation.removes_policy().is_some())
			.expect("Plan should contain removals.");
		let first_introduction = plan
			.iter()
			.position(|operation| operation.introduces_policy().is_some())
			.expect("Plan should contain introductions.");

		assert!(last_removal < first_introduction);
	}
}
