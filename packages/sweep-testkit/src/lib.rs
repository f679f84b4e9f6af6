pub mod fixtures;

use std::{
	collections::{HashMap, VecDeque},
	sync::Mutex,
};

use serde_json::Value;
use tokio::time::Instant;

use sweep_engine::{BoxFuture, SearchUpstream};
use sweep_query::ScopeId;
use sweep_upstream::{RequestCursor, SearchRequest, SearchResponse, search};

pub enum Step {
	Respond(Value),
	Fail(sweep_upstream::Error),
	/// Never completes; stands in for a request still in flight.
	Pending,
}

#[derive(Clone, Debug)]
pub struct Call {
	pub scope: String,
	pub request: SearchRequest,
	pub at: Instant,
}

#[derive(Default)]
struct CallLog {
	calls: Mutex<Vec<Call>>,
}
impl CallLog {
	fn record(&self, scope: &ScopeId, request: &SearchRequest) {
		let call =
			Call { scope: scope.to_string(), request: request.clone(), at: Instant::now() };

		self.calls.lock().unwrap_or_else(|err| err.into_inner()).push(call);
	}

	fn all(&self) -> Vec<Call> {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn for_scope(&self, scope: &str) -> Vec<Call> {
		self.all().into_iter().filter(|call| call.scope == scope).collect()
	}
}

/// Plays back a fixed sequence of responses per scope.
#[derive(Default)]
pub struct ScriptedUpstream {
	steps: Mutex<HashMap<String, VecDeque<Step>>>,
	log: CallLog,
}
impl ScriptedUpstream {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, scope: &str, step: Step) -> &Self {
		self.steps
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.entry(scope.to_string())
			.or_default()
			.push_back(step);

		self
	}

	pub fn respond(&self, scope: &str, page: Value) -> &Self {
		self.push(scope, Step::Respond(page))
	}

	pub fn fail(&self, scope: &str, err: sweep_upstream::Error) -> &Self {
		self.push(scope, Step::Fail(err))
	}

	pub fn hang(&self, scope: &str) -> &Self {
		self.push(scope, Step::Pending)
	}

	pub fn calls(&self) -> Vec<Call> {
		self.log.all()
	}

	pub fn calls_for(&self, scope: &str) -> Vec<Call> {
		self.log.for_scope(scope)
	}

	fn next_step(&self, scope: &ScopeId) -> Option<Step> {
		self.steps
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.get_mut(scope.as_str())
			.and_then(VecDeque::pop_front)
	}
}
impl SearchUpstream for ScriptedUpstream {
	fn search<'a>(
		&'a self,
		scope: &'a ScopeId,
		request: &'a SearchRequest,
	) -> BoxFuture<'a, sweep_upstream::Result<SearchResponse>> {
		self.log.record(scope, request);

		let step = self.next_step(scope);

		Box::pin(async move {
			match step {
				Some(Step::Respond(page)) => search::parse_search_response(page, &request.cursor),
				Some(Step::Fail(err)) => Err(err),
				Some(Step::Pending) => std::future::pending().await,
				None => Err(sweep_upstream::Error::InvalidResponse {
					message: format!("No scripted response left for scope {scope}."),
				}),
			}
		})
	}
}

/// Serves whole datasets page by page, honoring whichever cursor the request carries.
#[derive(Default)]
pub struct PagedUpstream {
	datasets: HashMap<String, Vec<Value>>,
	failures: Mutex<HashMap<String, VecDeque<sweep_upstream::Error>>>,
	page_cap: Option<usize>,
	log: CallLog,
}
impl PagedUpstream {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_scope(mut self, scope: &str, records: Vec<Value>) -> Self {
		self.datasets.insert(scope.to_string(), records);

		self
	}

	/// Failures are returned, in order, before the scope serves any page.
	pub fn with_failure(self, scope: &str, err: sweep_upstream::Error) -> Self {
		self.failures
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.entry(scope.to_string())
			.or_default()
			.push_back(err);

		self
	}

	/// Serves at most `cap` records per page regardless of the requested page size.
	pub fn with_page_cap(mut self, cap: usize) -> Self {
		self.page_cap = Some(cap);

		self
	}

	pub fn calls(&self) -> Vec<Call> {
		self.log.all()
	}

	pub fn calls_for(&self, scope: &str) -> Vec<Call> {
		self.log.for_scope(scope)
	}

	fn serve(&self, scope: &ScopeId, request: &SearchRequest) -> Value {
		let data = self.datasets.get(scope.as_str()).map(Vec::as_slice).unwrap_or_default();
		let size = match self.page_cap {
			Some(cap) => cap.min(request.page_size as usize),
			None => request.page_size as usize,
		};

		match &request.cursor {
			RequestCursor::Offset { start_at } => {
				let start = (*start_at as usize).min(data.len());
				let end = start.saturating_add(size).min(data.len());

				fixtures::offset_page(
					*start_at,
					size as u64,
					data.len() as u64,
					data[start..end].to_vec(),
				)
			},
			RequestCursor::Token { next_page_token } => {
				let start = next_page_token
					.as_deref()
					.and_then(|token| token.parse::<usize>().ok())
					.unwrap_or(0)
					.min(data.len());
				let end = start.saturating_add(size).min(data.len());
				let next = (end < data.len()).then(|| end.to_string());

				fixtures::token_page(next.as_deref(), next.is_none(), data[start..end].to_vec())
			},
		}
	}
}
impl SearchUpstream for PagedUpstream {
	fn search<'a>(
		&'a self,
		scope: &'a ScopeId,
		request: &'a SearchRequest,
	) -> BoxFuture<'a, sweep_upstream::Result<SearchResponse>> {
		self.log.record(scope, request);

		let failure = self
			.failures
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.get_mut(scope.as_str())
			.and_then(VecDeque::pop_front);
		let result = match failure {
			Some(err) => Err(err),
			None => search::parse_search_response(self.serve(scope, request), &request.cursor),
		};

		Box::pin(async move { result })
	}
}
