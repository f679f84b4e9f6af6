mod error;

pub mod aggregate;
pub mod fetcher;
pub mod record;
pub mod retry;

pub use aggregate::{AggregationResult, Aggregator, OrderedBy};
pub use error::{Error, FetchCause, FetchError, Result};
pub use fetcher::{FetchOptions, Page, PageStream, PaginatedFetcher, ScopeHarvest, ScopeStats};
pub use record::{AssigneeRecord, IssueRecord, Record};
pub use retry::{FailureKind, RetryDecision, RetryPolicy, RetryState};

use std::{future::Future, pin::Pin};

use reqwest::Client;

use sweep_query::ScopeId;
use sweep_upstream::{SearchRequest, SearchResponse};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One search round trip against the tracker.
pub trait SearchUpstream
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		scope: &'a ScopeId,
		request: &'a SearchRequest,
	) -> BoxFuture<'a, sweep_upstream::Result<SearchResponse>>;
}

/// The tracker reached over HTTP. Credentials are encoded once, when this value is built.
pub struct HttpUpstream {
	client: Client,
	cfg: sweep_config::Upstream,
}
impl HttpUpstream {
	pub fn new(cfg: sweep_config::Upstream) -> sweep_upstream::Result<Self> {
		let client = sweep_upstream::client(&cfg)?;

		Ok(Self { client, cfg })
	}
}
impl SearchUpstream for HttpUpstream {
	fn search<'a>(
		&'a self,
		_scope: &'a ScopeId,
		request: &'a SearchRequest,
	) -> BoxFuture<'a, sweep_upstream::Result<SearchResponse>> {
		Box::pin(sweep_upstream::search::search(&self.client, &self.cfg, request))
	}
}
