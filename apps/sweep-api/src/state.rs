use std::sync::Arc;

use axum::http::HeaderValue;
use color_eyre::eyre;
use time::{Date, OffsetDateTime};

use sweep_engine::{Aggregator, HttpUpstream, SearchUpstream};
use sweep_query::ScopeId;

#[derive(Clone, Debug)]
pub struct ScopeSets {
	pub issues: Vec<ScopeId>,
	pub assignees: Vec<ScopeId>,
	pub operation_assignees: Vec<ScopeId>,
}
impl ScopeSets {
	fn from_config(cfg: &sweep_config::Scopes) -> color_eyre::Result<Self> {
		Ok(Self {
			issues: parse_scopes(&cfg.issues)?,
			assignees: parse_scopes(&cfg.assignees)?,
			operation_assignees: parse_scopes(&cfg.operation_assignees)?,
		})
	}
}

#[derive(Clone, Copy, Debug)]
enum Clock {
	System,
	Fixed(Date),
}

#[derive(Clone)]
pub struct AppState {
	pub aggregator: Arc<Aggregator>,
	pub scopes: Arc<ScopeSets>,
	pub cors_allow_origin: HeaderValue,
	clock: Clock,
}
impl AppState {
	pub fn new(config: sweep_config::Config) -> color_eyre::Result<Self> {
		let upstream = HttpUpstream::new(config.upstream.clone())?;

		Self::with_upstream(config, Arc::new(upstream))
	}

	pub fn with_upstream(
		config: sweep_config::Config,
		upstream: Arc<dyn SearchUpstream>,
	) -> color_eyre::Result<Self> {
		let cors_allow_origin = HeaderValue::from_str(config.service.cors_allow_origin.trim())
			.map_err(|err| eyre::eyre!("service.cors_allow_origin is not a valid header: {err}."))?;

		Ok(Self {
			aggregator: Arc::new(Aggregator::from_config(&config, upstream)),
			scopes: Arc::new(ScopeSets::from_config(&config.scopes)?),
			cors_allow_origin,
			clock: Clock::System,
		})
	}

	/// Pins the date relative windows resolve against.
	pub fn with_today(mut self, today: Date) -> Self {
		self.clock = Clock::Fixed(today);

		self
	}

	pub fn today(&self) -> Date {
		match self.clock {
			Clock::System => OffsetDateTime::now_utc().date(),
			Clock::Fixed(today) => today,
		}
	}
}

fn parse_scopes(raw: &[String]) -> color_eyre::Result<Vec<ScopeId>> {
	raw.iter().map(|scope| ScopeId::new(scope).map_err(Into::into)).collect()
}
