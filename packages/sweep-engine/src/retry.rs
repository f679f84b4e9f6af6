use std::{
	fmt::{Display, Formatter},
	time::Duration,
};

use sweep_config::RetryBudget;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
	/// HTTP 429.
	RateLimited,
	/// Network failure or HTTP 5xx.
	Transient,
	/// Anything else, including a success body that breaks the response contract.
	Fatal,
}
impl FailureKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RateLimited => "rate_limited",
			Self::Transient => "transient",
			Self::Fatal => "fatal",
		}
	}

	pub fn classify(err: &sweep_upstream::Error) -> Self {
		match err {
			sweep_upstream::Error::Status { status: 429, .. } => Self::RateLimited,
			sweep_upstream::Error::Status { status, .. } if (500..600).contains(status) => {
				Self::Transient
			},
			sweep_upstream::Error::Network { .. } => Self::Transient,
			sweep_upstream::Error::Reqwest(inner) if inner.is_timeout() || inner.is_connect() => {
				Self::Transient
			},
			_ => Self::Fatal,
		}
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	Retry(Duration),
	GiveUp,
}

/// The pending retry of one failed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
	/// Retries consumed once this one runs.
	pub attempt: u32,
	pub max_attempts: u32,
	pub next_delay: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub budget: RetryBudget,
}
impl RetryPolicy {
	pub fn from_config(cfg: &sweep_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			base_delay: Duration::from_millis(cfg.base_delay_ms),
			max_delay: Duration::from_millis(cfg.max_delay_ms),
			budget: cfg.budget,
		}
	}

	/// `attempt` counts the retries already spent on the failing request.
	pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
		if kind == FailureKind::Fatal || attempt >= self.max_attempts {
			return RetryDecision::GiveUp;
		}

		RetryDecision::Retry(self.delay_for(attempt))
	}

	/// `base_delay * 2^attempt`, capped at `max_delay`.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		self.base_delay.saturating_mul(2_u32.saturating_pow(attempt)).min(self.max_delay)
	}

	/// Stretches a rate-limit delay to honor the upstream's `Retry-After`, within the cap.
	pub fn with_hint(&self, delay: Duration, hint: Option<Duration>) -> Duration {
		match hint {
			Some(hint) => delay.max(hint).min(self.max_delay),
			None => delay,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
			max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
			budget: RetryBudget::PerRequest,
		}
	}
}
