use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
	sync::Arc,
};

use serde::Serialize;
use time::Date;
use tokio::task::{Id, JoinSet};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use sweep_query::{FilterSpec, QueryBuilder, RecordKind, ScopeId};

use crate::{
	Error, FetchCause, FetchError, FetchOptions, PaginatedFetcher, Result, ScopeHarvest,
	ScopeStats, SearchUpstream,
	record::{AssigneeRecord, IssueRecord, Record},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderedBy {
	/// Display name, ignoring case and accents first, then account id.
	Name,
	/// Creation time, newest first, then issue id.
	Created,
}
impl OrderedBy {
	fn for_kind(kind: RecordKind) -> Self {
		match kind {
			RecordKind::Issues => Self::Created,
			RecordKind::Assignees => Self::Name,
		}
	}
}

#[derive(Clone, Debug)]
pub struct AggregationResult {
	/// Unique by identity key, in `ordered_by` order.
	pub records: Vec<Record>,
	pub ordered_by: OrderedBy,
	/// One entry per scope, in the order the scopes were requested.
	pub scopes: Vec<ScopeStats>,
}
impl AggregationResult {
	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn retries(&self) -> u32 {
		self.scopes.iter().map(|stats| stats.retries).sum()
	}

	pub fn into_issues(self) -> Vec<IssueRecord> {
		self.records
			.into_iter()
			.filter_map(|record| match record {
				Record::Issue(issue) => Some(issue),
				Record::Assignee(_) => None,
			})
			.collect()
	}

	pub fn into_assignees(self) -> Vec<AssigneeRecord> {
		self.records
			.into_iter()
			.filter_map(|record| match record {
				Record::Assignee(assignee) => Some(assignee),
				Record::Issue(_) => None,
			})
			.collect()
	}
}

#[derive(Clone)]
pub struct Aggregator {
	fetcher: PaginatedFetcher,
	builder: QueryBuilder,
}
impl Aggregator {
	pub fn new(fetcher: PaginatedFetcher, builder: QueryBuilder) -> Self {
		Self { fetcher, builder }
	}

	pub fn from_config(cfg: &sweep_config::Config, upstream: Arc<dyn SearchUpstream>) -> Self {
		Self::new(
			PaginatedFetcher::new(upstream, FetchOptions::from_config(cfg)),
			QueryBuilder::new(cfg.query.date_field.clone()),
		)
	}

	/// Fetches every scope concurrently and merges the records. Any scope failure fails the
	/// whole run and abandons the scopes still in flight.
	pub async fn aggregate(
		&self,
		scopes: &[ScopeId],
		spec: &FilterSpec,
		today: Date,
	) -> Result<AggregationResult> {
		if scopes.is_empty() {
			return Err(Error::Validation(sweep_query::Error::Validation {
				field: "scopes",
				message: "at least one scope is required.".to_string(),
			}));
		}

		let mut seen = HashSet::new();
		let scopes =
			scopes.iter().filter(|scope| seen.insert(scope.as_str())).cloned().collect::<Vec<_>>();

		// Every query is built before the first request goes out.
		let mut jobs = Vec::with_capacity(scopes.len());

		for scope in &scopes {
			let query = self.builder.build(&spec.with_scope(scope.clone()), today)?;

			tracing::debug!(scope = %scope, jql = %query, "Search query built.");

			jobs.push((scope.clone(), query));
		}

		let mut tasks = JoinSet::new();
		let mut task_scopes: HashMap<Id, usize> = HashMap::new();

		for (index, (scope, query)) in jobs.into_iter().enumerate() {
			let stream = self.fetcher.fetch(query, scope, spec.kind);
			let handle = tasks.spawn(stream.collect());

			task_scopes.insert(handle.id(), index);
		}

		let mut harvests: Vec<Option<ScopeHarvest>> = vec![None; scopes.len()];

		while let Some(joined) = tasks.join_next_with_id().await {
			let failure = match joined {
				Ok((id, Ok(harvest))) => {
					if let Some(index) = task_scopes.get(&id) {
						harvests[*index] = Some(harvest);
					}

					continue;
				},
				Ok((_, Err(err))) => err,
				Err(join_err) => {
					let scope = task_scopes
						.get(&join_err.id())
						.map(|index| scopes[*index].clone())
						.unwrap_or_else(|| spec.scope.clone());

					FetchError {
						scope,
						cause: FetchCause::Task { message: join_err.to_string() },
						retries: 0,
					}
				},
			};

			tasks.abort_all();

			tracing::error!(
				scope = %failure.scope,
				error = %failure,
				kind = spec.kind.as_str(),
				"Aggregation failed; abandoning remaining scopes."
			);

			return Err(Error::Aggregation { source: failure });
		}

		let mut merged: HashMap<String, Record> = HashMap::new();
		let mut stats = Vec::with_capacity(scopes.len());

		// Scope order, not completion order, decides which duplicate wins.
		for harvest in harvests.into_iter().flatten() {
			for record in harvest.records {
				merged.insert(record.identity_key().to_string(), record);
			}

			stats.push(harvest.stats);
		}

		let ordered_by = OrderedBy::for_kind(spec.kind);
		let mut records = merged.into_values().collect::<Vec<_>>();

		records.sort_by(|left, right| compare(ordered_by, left, right));

		tracing::info!(
			kind = spec.kind.as_str(),
			scopes = stats.len(),
			records = records.len(),
			retries = stats.iter().map(|scope| scope.retries).sum::<u32>(),
			"Aggregation complete."
		);

		Ok(AggregationResult { records, ordered_by, scopes: stats })
	}
}

fn compare(ordered_by: OrderedBy, left: &Record, right: &Record) -> Ordering {
	let primary = match (ordered_by, left, right) {
		(OrderedBy::Name, Record::Assignee(left), Record::Assignee(right)) => fold(&left.name)
			.cmp(&fold(&right.name))
			.then_with(|| left.name.cmp(&right.name)),
		(OrderedBy::Created, Record::Issue(left), Record::Issue(right)) => {
			right.created.cmp(&left.created)
		},
		_ => Ordering::Equal,
	};

	primary.then_with(|| left.identity_key().cmp(right.identity_key()))
}

// Decomposes, drops combining marks and lowercases, so "Émile" sorts with "emile".
fn fold(name: &str) -> String {
	name.nfd().filter(|ch| !is_combining_mark(*ch)).collect::<String>().to_lowercase()
}
