// std
use std::{collections::BTreeSet, sync::Arc};
// self
use oidc_role_reconciler::{
	config::DesiredConfig,
	provider::{CertificateFetcher, FetchFuture},
	reconcile::Reconciler,
	store::{IamStore, MemoryStore},
	url::Url,
};

#[derive(Clone, Debug)]
struct StaticFetcher;
impl CertificateFetcher for StaticFetcher {
	fn fetch_leaf_certificate<'a>(&'a self, _url: &'a Url) -> FetchFuture<'a> {
		Box::pin(async move { Ok(b"issuer-leaf-certificate".to_vec()) })
	}
}

fn build_reconciler() -> (Reconciler, Arc<MemoryStore>) {
	let backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn IamStore> = backend.clone();
	let reconciler = Reconciler::new(store, Arc::new(StaticFetcher));

	(reconciler, backend)
}

const DOC_A: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"s3:GetObject","Resource":"*"}]}"#;
const DOC_B: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"s3:ListBucket","Resource":"*"}]}"#;
const MANAGED_RO: &str = "arn:aws:iam::aws:policy/ReadOnlyAccess";
const MANAGED_VIEW: &str = "arn:aws:iam::aws:policy/job-function/ViewOnlyAccess";

async fn attached_set(store: &MemoryStore, role: &str) -> BTreeSet<String> {
	store
		.list_attached_policies(role)
		.await
		.expect("Listing attachments should succeed.")
		.into_iter()
		.map(|policy| policy.arn)
		.collect()
}

#[tokio::test]
async fn applied_plan_yields_exactly_the_desired_attachment_set() {
	let (reconciler, store) = build_reconciler();
	let first = DesiredConfig::new("gha-deploy", ["org/a"])
		.with_custom_policy("p1", DOC_A)
		.with_custom_policy("p2", DOC_A)
		.with_managed_policy(MANAGED_RO);

	reconciler.run(&first).await.expect("First run should succeed.");

	let attached = attached_set(&store, "gha-deploy").await;
	let expected: BTreeSet<String> = BTreeSet::from_iter([
		"arn:aws:iam::123456789012:policy/gha-deploy/p1".to_owned(),
		"arn:aws:iam::123456789012:policy/gha-deploy/p2".to_owned(),
		MANAGED_RO.to_owned(),
	]);

	assert_eq!(attached, expected);

	// Drop p1 and the managed policy, change p2's document, add p3 and another managed
	// policy. The post-apply attachment set must equal the new desired set exactly.
	let second = DesiredConfig::new("gha-deploy", ["org/a"])
		.with_custom_policy("p2", DOC_B)
		.with_custom_policy("p3", DOC_A)
		.with_managed_policy(MANAGED_VIEW);
	let report = reconciler.run(&second).await.expect("Second run should succeed.");

	assert!(!report.failed);

	let attached = attached_set(&store, "gha-deploy").await;
	let expected: BTreeSet<String> = BTreeSet::from_iter([
		"arn:aws:iam::123456789012:policy/gha-deploy/p2".to_owned(),
		"arn:aws:iam::123456789012:policy/gha-deploy/p3".to_owned(),
		MANAGED_VIEW.to_owned(),
	]);

	assert_eq!(attached, expected);

	// p1 is gone entirely, and p2's document was updated in place.
	let under_path = store
		.list_policies_by_path("/gha-deploy/")
		.await
		.expect("Path listing should succeed.");

	assert_eq!(under_path.len(), 2);
	assert!(under_path.iter().all(|policy| policy.name != "p1"));

	let p2 = under_path
		.iter()
		.find(|policy| policy.name == "p2")
		.expect("p2 should survive the second run.");

	assert_eq!(p2.document, DOC_B);
}

#[tokio::test]
async fn every_removal_precedes_every_introduction_in_the_outcome_order() {
	let (reconciler, _store) = build_reconciler();
	let first = DesiredConfig::new("gha-deploy", ["org/a"])
		.with_custom_policy("p1", DOC_A)
		.with_managed_policy(MANAGED_RO);

	reconciler.run(&first).await.expect("First run should succeed.");

	let second = DesiredConfig::new("gha-deploy", ["org/a"])
		.with_custom_policy("p3", DOC_A)
		.with_managed_policy(MANAGED_VIEW);
	let report = reconciler.run(&second).await.expect("Second run should succeed.");
	let last_removal = report
		.outcomes
		.iter()
		.rposition(|outcome| outcome.operation.removes_policy().is_some())
		.expect("The run should remove policies.");
	let first_introduction = report
		.outcomes
		.iter()
		.position(|outcome| outcome.operation.introduces_policy().is_some())
		.expect("The run should introduce policies.");

	assert!(
		last_removal < first_introduction,
		"removals must be applied strictly before introductions: {:?}",
		report.outcomes
	);
}

#[tokio::test]
async fn third_run_after_reshuffle_is_a_no_op() {
	let (reconciler, _store) = build_reconciler();
	let first = DesiredConfig::new("gha-deploy", ["org/a"]).with_custom_policy("p1", DOC_A);

	reconciler.run(&first).await.expect("First run should succeed.");

	let second = DesiredConfig::new("gha-deploy", ["org/a", "org/b"])
		.with_custom_policy("p1", DOC_B)
		.with_managed_policy(MANAGED_RO);

	reconciler.run(&second).await.expect("Second run should succeed.");

	let report = reconciler.run(&second).await.expect("Third run should succeed.");

	assert!(report.outcomes.is_empty(), "converged state must plan nothing: {:?}", report.outcomes);
}
