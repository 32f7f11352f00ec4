//! Pre-flight validation for [`DesiredConfig`].
//!
//! Validation is pure: it never mutates and never calls the remote store. Failures accumulate
//! into one ordered report so a caller sees every problem at once instead of fixing them one
//! re-run at a time.

// self
use crate::{
	_prelude::*,
	config::{DesiredConfig, SESSION_DURATION_BOUNDS},
};

/// Single validation failure raised against a [`DesiredConfig`] field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum ValidationFailure {
	/// The repository list was empty.
	#[error("At least one GitHub repository must be configured.")]
	NoRepositories,
	/// A repository identifier does not match the `owner/repo` grammar.
	#[error("Repository `{repository}` does not match the `owner/repo` grammar.")]
	MalformedRepository {
		/// Offending repository identifier.
		repository: String,
	},
	/// A custom-policy document is not well-formed JSON.
	#[error("Custom policy `{name}` is not valid JSON at `{path}`: {message}.")]
	MalformedPolicyDocument {
		/// Custom-policy name from the desired configuration.
		name: String,
		/// JSON path at which parsing failed.
		path: String,
		/// Parser message describing the failure.
		message: String,
	},
	/// A managed-policy ARN does not match the IAM policy ARN grammar.
	#[error("`{arn}` is not an IAM policy ARN.")]
	MalformedPolicyArn {
		/// Offending ARN string.
		arn: String,
	},
	/// The maximum session duration is outside the IAM-accepted range.
	#[error("Session duration of {seconds} s is outside the {min}-{max} s range.")]
	SessionDurationOutOfRange {
		/// Configured duration in seconds.
		seconds: u32,
		/// Inclusive lower bound.
		min: u32,
		/// Inclusive upper bound.
		max: u32,
	},
}

/// Non-empty ordered list of validation failures for one configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
#[error("Desired configuration is invalid: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "))]
pub struct ValidationReport(pub Vec<ValidationFailure>);
impl ValidationReport {
	/// Returns the accumulated failures in evaluation order.
	pub fn failures(&self) -> &[ValidationFailure] {
		&self.0
	}
}

impl DesiredConfig {
	/// Validates the whole configuration, accumulating every failure into one report.
	pub fn validate(&self) -> Result<(), ValidationReport> {
		let mut failures = Vec::new();

		if self.github_repositories.is_empty() {
			failures.push(ValidationFailure::NoRepositories);
		}

		for repository in &self.github_repositories {
			if !is_repository(repository) {
				failures.push(ValidationFailure::MalformedRepository {
					repository: repository.clone(),
				});
			}
		}
		for (name, document) in &self.custom_policies {
			if let Err((path, message)) = parse_document(document) {
				failures.push(ValidationFailure::MalformedPolicyDocument {
					name: name.clone(),
					path,
					message,
				});
			}
		}
		for arn in &self.managed_policy_arns {
			if !is_policy_arn(arn) {
				failures.push(ValidationFailure::MalformedPolicyArn { arn: arn.clone() });
			}
		}

		let (min, max) = SESSION_DURATION_BOUNDS;

		if !(min..=max).contains(&self.max_session_duration) {
			failures.push(ValidationFailure::SessionDurationOutOfRange {
				seconds: self.max_session_duration,
				min,
				max,
			});
		}
		if failures.is_empty() { Ok(()) } else { Err(ValidationReport(failures)) }
	}
}

// `^[A-Za-z0-9][A-Za-z0-9._-]*/[A-Za-z0-9][A-Za-z0-9._-]*$`, hand-rolled.
fn is_repository(view: &str) -> bool {
	let Some((owner, name)) = view.split_once('/') else {
		return false;
	};

	is_repository_segment(owner) && is_repository_segment(name)
}

fn is_repository_segment(segment: &str) -> bool {
	let mut chars = segment.chars();
	let Some(first) = chars.next() else {
		return false;
	};

	first.is_ascii_alphanumeric()
		&& chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

// `^arn:aws:iam::(aws|\d{12}):policy/`, hand-rolled.
fn is_policy_arn(view: &str) -> bool {
	let Some(rest) = view.strip_prefix("arn:aws:iam::") else {
		return false;
	};
	let Some((account, resource)) = rest.split_once(':') else {
		return false;
	};
	let account_ok =
		account == "aws" || (account.len() == 12 && account.bytes().all(|b| b.is_ascii_digit()));

	account_ok && resource.starts_with("policy/")
}

fn parse_document(document: &str) -> Result<(), (String, String)> {
	let mut deserializer = serde_json::Deserializer::from_str(document);

	match serde_path_to_error::deserialize::<_, JsonValue>(&mut deserializer) {
		Ok(_) => deserializer.end().map_err(|e| (".".to_owned(), e.to_string())),
		Err(e) => {
			let path = e.path().to_string();

			Err((path, e.into_inner().to_string()))
		},
	}
}
