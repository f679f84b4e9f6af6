use std::sync::Arc;

use tokio::time;

use sweep_config::{PaginationMode, RetryBudget};
use sweep_query::{Query, RecordKind, ScopeId};
use sweep_upstream::{PageCursor, RequestCursor, SearchRequest};

use crate::{
	FetchCause, FetchError, SearchUpstream,
	record::{self, Record},
	retry::{FailureKind, RetryDecision, RetryPolicy, RetryState},
};

#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
	pub mode: PaginationMode,
	pub page_size: u32,
	pub policy: RetryPolicy,
}
impl FetchOptions {
	pub fn from_config(cfg: &sweep_config::Config) -> Self {
		Self {
			mode: cfg.upstream.pagination.mode,
			page_size: cfg.upstream.pagination.page_size.max(1),
			policy: RetryPolicy::from_config(&cfg.retry),
		}
	}
}

#[derive(Clone, Debug)]
pub struct Page {
	pub records: Vec<Record>,
	pub cursor: PageCursor,
	/// Raw hits the upstream returned, before normalization dropped any.
	pub returned: usize,
	/// Retries spent producing this page.
	pub retries: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScopeStats {
	pub scope: String,
	pub pages: u32,
	pub records: usize,
	pub retries: u32,
}

/// Everything one scope produced.
#[derive(Clone, Debug)]
pub struct ScopeHarvest {
	pub records: Vec<Record>,
	pub stats: ScopeStats,
}

#[derive(Clone)]
pub struct PaginatedFetcher {
	upstream: Arc<dyn SearchUpstream>,
	options: FetchOptions,
}
impl PaginatedFetcher {
	pub fn new(upstream: Arc<dyn SearchUpstream>, options: FetchOptions) -> Self {
		Self { upstream, options }
	}

	pub fn options(&self) -> &FetchOptions {
		&self.options
	}

	/// Starts a lazy page sequence for one scope. Nothing is requested until the first
	/// [`PageStream::next_page`] call.
	pub fn fetch(&self, query: Query, scope: ScopeId, kind: RecordKind) -> PageStream {
		let stats = ScopeStats { scope: scope.to_string(), ..ScopeStats::default() };

		PageStream {
			upstream: self.upstream.clone(),
			options: self.options,
			scope,
			jql: query.into_string(),
			kind,
			state: FetchState::Idle,
			stats,
		}
	}
}

#[derive(Clone, Debug)]
enum FetchState {
	Idle,
	Requesting { cursor: RequestCursor, attempt: u32 },
	RetryWait { cursor: RequestCursor, retry: RetryState },
	Done,
	Failed(FetchError),
}

enum Advance {
	Next(RequestCursor),
	Done,
}

/// Sequential pages of one scope. Page N+1 is requested only after page N's cursor is known.
///
/// Each `next_page` call is cancel-safe: dropping it mid-request leaves the stream positioned
/// to re-issue the same request.
pub struct PageStream {
	upstream: Arc<dyn SearchUpstream>,
	options: FetchOptions,
	scope: ScopeId,
	jql: String,
	kind: RecordKind,
	state: FetchState,
	stats: ScopeStats,
}
impl PageStream {
	pub fn scope(&self) -> &ScopeId {
		&self.scope
	}

	pub fn stats(&self) -> &ScopeStats {
		&self.stats
	}

	pub async fn next_page(&mut self) -> Result<Option<Page>, FetchError> {
		let mut page_retries = 0;

		loop {
			match self.state.clone() {
				FetchState::Idle => {
					self.state =
						FetchState::Requesting { cursor: self.initial_cursor(), attempt: 0 };
				},
				FetchState::Requesting { cursor, attempt } => {
					let request = SearchRequest {
						jql: self.jql.clone(),
						page_size: self.options.page_size,
						cursor: cursor.clone(),
					};

					match self.upstream.search(&self.scope, &request).await {
						Ok(response) => {
							let returned = response.records.len();
							let mut records = Vec::with_capacity(returned);

							for raw in &response.records {
								match record::normalize(self.kind, raw) {
									Ok(Some(record)) => records.push(record),
									Ok(None) => {},
									Err(err) => {
										return Err(self.fail(FetchCause::Fatal {
											message: err.message,
										}));
									},
								}
							}

							let next_attempt = match self.options.policy.budget {
								RetryBudget::PerRequest => 0,
								RetryBudget::PerScope => attempt,
							};

							self.state = match self.advance(&cursor, &response.cursor, returned) {
								Ok(Advance::Next(cursor)) => {
									FetchState::Requesting { cursor, attempt: next_attempt }
								},
								Ok(Advance::Done) => FetchState::Done,
								Err(cause) => return Err(self.fail(cause)),
							};

							// An empty terminal response means the scope had nothing to page.
							if returned == 0 && matches!(self.state, FetchState::Done) {
								return Ok(None);
							}

							self.stats.pages += 1;
							self.stats.records += records.len();

							tracing::debug!(
								scope = %self.scope,
								page = self.stats.pages,
								returned,
								retries = page_retries,
								"Search page fetched."
							);

							return Ok(Some(Page {
								records,
								cursor: response.cursor,
								returned,
								retries: page_retries,
							}));
						},
						Err(err) => {
							let kind = FailureKind::classify(&err);

							match self.options.policy.decide(attempt, kind) {
								RetryDecision::Retry(delay) => {
									let delay = match (&err, kind) {
										(
											sweep_upstream::Error::Status { retry_after, .. },
											FailureKind::RateLimited,
										) => self.options.policy.with_hint(delay, *retry_after),
										_ => delay,
									};

									tracing::warn!(
										scope = %self.scope,
										error = %err,
										kind = kind.as_str(),
										attempt = attempt + 1,
										max_attempts = self.options.policy.max_attempts,
										delay_ms = delay.as_millis() as u64,
										"Search request failed; retrying."
									);

									self.state = FetchState::RetryWait {
										cursor,
										retry: RetryState {
											attempt: attempt + 1,
											max_attempts: self.options.policy.max_attempts,
											next_delay: delay,
										},
									};
								},
								RetryDecision::GiveUp => {
									let cause = match kind {
										FailureKind::Fatal => {
											FetchCause::Fatal { message: err.to_string() }
										},
										_ => FetchCause::RetriesExhausted {
											kind,
											attempts: attempt,
											message: err.to_string(),
										},
									};

									return Err(self.fail(cause));
								},
							}
						},
					}
				},
				FetchState::RetryWait { cursor, retry } => {
					time::sleep(retry.next_delay).await;

					page_retries += 1;
					self.stats.retries += 1;
					self.state = FetchState::Requesting { cursor, attempt: retry.attempt };
				},
				FetchState::Done => return Ok(None),
				FetchState::Failed(err) => return Err(err),
			}
		}
	}

	/// Drains the stream, keeping every record in arrival order.
	pub async fn collect(mut self) -> Result<ScopeHarvest, FetchError> {
		let mut records = Vec::new();

		while let Some(page) = self.next_page().await? {
			records.extend(page.records);
		}

		Ok(ScopeHarvest { records, stats: self.stats })
	}

	fn initial_cursor(&self) -> RequestCursor {
		match self.options.mode {
			PaginationMode::Offset => RequestCursor::Offset { start_at: 0 },
			PaginationMode::Token => RequestCursor::Token { next_page_token: None },
		}
	}

	fn advance(
		&self,
		requested: &RequestCursor,
		page: &PageCursor,
		returned: usize,
	) -> Result<Advance, FetchCause> {
		match (requested, page) {
			(
				RequestCursor::Offset { start_at: requested_start },
				PageCursor::Offset { start_at, total, .. },
			) => {
				let next = start_at.saturating_add(returned as u64);

				if next >= *total {
					return Ok(Advance::Done);
				}
				if next <= *requested_start {
					return Err(FetchCause::Fatal {
						message: format!(
							"Upstream returned no records at offset {start_at} but reports {total} in total."
						),
					});
				}

				Ok(Advance::Next(RequestCursor::Offset { start_at: next }))
			},
			(
				RequestCursor::Token { next_page_token: previous },
				PageCursor::Token { next_page_token, is_last },
			) => match next_page_token {
				None => Ok(Advance::Done),
				Some(_) if *is_last => Ok(Advance::Done),
				Some(token) if previous.as_deref() == Some(token.as_str()) => {
					Err(FetchCause::Fatal {
						message: "Upstream repeated the page token it was given.".to_string(),
					})
				},
				Some(token) => Ok(Advance::Next(RequestCursor::Token {
					next_page_token: Some(token.clone()),
				})),
			},
			_ => Err(FetchCause::Fatal {
				message: "Upstream switched pagination mode within a scope.".to_string(),
			}),
		}
	}

	fn fail(&mut self, cause: FetchCause) -> FetchError {
		let err = FetchError { scope: self.scope.clone(), cause, retries: self.stats.retries };

		tracing::warn!(scope = %self.scope, error = %err, "Scope fetch failed.");

		self.state = FetchState::Failed(err.clone());

		err
	}
}
