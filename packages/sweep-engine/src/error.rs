use sweep_query::ScopeId;

use crate::retry::FailureKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Validation(#[from] sweep_query::Error),
	/// First scope failure of a multi-scope run. Partial results are discarded.
	#[error("Aggregation failed: {source}")]
	Aggregation { source: FetchError },
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("Fetch failed for scope {scope}: {cause}")]
pub struct FetchError {
	pub scope: ScopeId,
	pub cause: FetchCause,
	/// Retries spent in this scope before it failed.
	pub retries: u32,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum FetchCause {
	/// Malformed upstream response or a non-retryable status. Never retried.
	#[error("{message}")]
	Fatal { message: String },
	#[error("gave up after {attempts} retries on {kind}: {message}")]
	RetriesExhausted { kind: FailureKind, attempts: u32, message: String },
	#[error("fetch task ended abnormally: {message}")]
	Task { message: String },
}
