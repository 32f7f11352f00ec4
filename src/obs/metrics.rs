// self
use crate::obs::ApplyOutcome;

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_apply_outcome(operation: &'static str, outcome: ApplyOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oidc_role_reconciler_operation_total",
			"operation" => operation,
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, outcome);
	}
}
