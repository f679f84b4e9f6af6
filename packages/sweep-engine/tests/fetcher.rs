use std::{sync::Arc, time::Duration};

use time::macros::date;

use sweep_config::{PaginationMode, RetryBudget};
use sweep_engine::{
	FailureKind, FetchCause, FetchOptions, PaginatedFetcher, RetryPolicy, SearchUpstream,
};
use sweep_query::{AssigneeFilter, FilterSpec, Query, QueryBuilder, RecordKind, ScopeId, TimeWindow};
use sweep_testkit::{PagedUpstream, ScriptedUpstream, fixtures};
use sweep_upstream::RequestCursor;

fn scope(id: &str) -> ScopeId {
	ScopeId::new(id).expect("Valid scope.")
}

fn query(id: &str) -> Query {
	let spec =
		FilterSpec::new(scope(id), TimeWindow::Full, AssigneeFilter::All, RecordKind::Issues)
			.expect("Valid filter spec.");

	QueryBuilder::default().build(&spec, date!(2026 - 10 - 18)).expect("Query must build.")
}

fn fetcher(
	upstream: Arc<dyn SearchUpstream>,
	mode: PaginationMode,
	page_size: u32,
) -> PaginatedFetcher {
	PaginatedFetcher::new(
		upstream,
		FetchOptions { mode, page_size, policy: RetryPolicy::default() },
	)
}

fn delays(calls: &[sweep_testkit::Call]) -> Vec<Duration> {
	calls.windows(2).map(|pair| pair[1].at - pair[0].at).collect()
}

#[tokio::test(start_paused = true)]
async fn offset_pages_sum_to_total_in_ceil_steps() {
	let upstream = Arc::new(PagedUpstream::new().with_scope("A", fixtures::issues("a", 250)));
	let mut stream = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues);
	let mut sizes = Vec::new();

	while let Some(page) = stream.next_page().await.expect("Fetch must succeed.") {
		sizes.push(page.records.len());
	}

	assert_eq!(sizes, vec![100, 100, 50]);
	assert_eq!(sizes.iter().sum::<usize>(), 250);
	assert_eq!(upstream.calls().len(), 3);
	assert_eq!(stream.stats().pages, 3);
	assert_eq!(stream.stats().records, 250);
}

#[tokio::test(start_paused = true)]
async fn short_pages_advance_by_records_returned() {
	let upstream = Arc::new(
		PagedUpstream::new().with_scope("A", fixtures::issues("a", 95)).with_page_cap(30),
	);
	let harvest = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect("Fetch must succeed.");
	let starts = upstream
		.calls()
		.into_iter()
		.map(|call| match call.request.cursor {
			RequestCursor::Offset { start_at } => start_at,
			other => panic!("Unexpected cursor: {other:?}"),
		})
		.collect::<Vec<_>>();

	assert_eq!(harvest.records.len(), 95);
	assert_eq!(starts, vec![0, 30, 60, 90]);
}

#[tokio::test(start_paused = true)]
async fn token_mode_follows_next_page_token() {
	let upstream = Arc::new(PagedUpstream::new().with_scope("A", fixtures::issues("a", 5)));
	let harvest = fetcher(upstream.clone(), PaginationMode::Token, 2)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect("Fetch must succeed.");
	let tokens = upstream
		.calls()
		.into_iter()
		.map(|call| match call.request.cursor {
			RequestCursor::Token { next_page_token } => next_page_token,
			other => panic!("Unexpected cursor: {other:?}"),
		})
		.collect::<Vec<_>>();

	assert_eq!(harvest.records.len(), 5);
	assert_eq!(tokens, vec![None, Some("2".to_string()), Some("4".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn fetch_is_lazy() {
	let upstream = Arc::new(PagedUpstream::new().with_scope("A", fixtures::issues("a", 5)));
	let stream = fetcher(upstream.clone(), PaginationMode::Offset, 2)
		.fetch(query("A"), scope("A"), RecordKind::Issues);

	assert_eq!(stream.scope().as_str(), "A");
	assert!(upstream.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_every_attempt_gives_up_after_three_retries() {
	let upstream = Arc::new(ScriptedUpstream::new());

	for _ in 0..4 {
		upstream.fail("A", fixtures::rate_limited(None));
	}

	let err = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect_err("Expected retries to run out.");
	let calls = upstream.calls();

	assert_eq!(calls.len(), 4);
	assert_eq!(
		delays(&calls),
		vec![
			Duration::from_millis(1_000),
			Duration::from_millis(2_000),
			Duration::from_millis(4_000),
		]
	);
	assert_eq!(err.retries, 3);
	assert!(
		matches!(
			err.cause,
			FetchCause::RetriesExhausted { kind: FailureKind::RateLimited, attempts: 3, .. }
		),
		"Unexpected cause: {:?}",
		err.cause
	);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_then_success_records_one_retry() {
	let upstream = Arc::new(ScriptedUpstream::new());

	let issue = fixtures::issue_json("1", &fixtures::minute_timestamp(0));

	upstream
		.fail("A", fixtures::rate_limited(None))
		.respond("A", fixtures::offset_page(0, 100, 1, vec![issue]));

	let mut stream = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues);
	let page = stream.next_page().await.expect("Fetch must succeed.").expect("One page expected.");

	assert_eq!(page.records.len(), 1);
	assert_eq!(page.retries, 1);
	assert!(stream.next_page().await.expect("Fetch must succeed.").is_none());
	assert_eq!(stream.stats().retries, 1);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_lengthens_backoff() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream
		.fail("A", fixtures::rate_limited(Some(5)))
		.respond("A", fixtures::offset_page(0, 100, 0, Vec::new()));

	fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect("Fetch must succeed.");

	assert_eq!(delays(&upstream.calls()), vec![Duration::from_secs(5)]);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream
		.fail("A", fixtures::status_error(503))
		.fail("A", fixtures::network_error())
		.respond("A", fixtures::offset_page(0, 100, 2, fixtures::issues("a", 2)));

	let harvest = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect("Fetch must succeed.");

	assert_eq!(harvest.records.len(), 2);
	assert_eq!(harvest.stats.retries, 2);
}

#[tokio::test(start_paused = true)]
async fn missing_record_field_is_fatal_without_retry() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream.respond("A", serde_json::json!({ "startAt": 0, "maxResults": 100, "total": 3 }));

	let err = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect_err("Expected a fatal failure.");

	assert_eq!(upstream.calls().len(), 1);
	assert_eq!(err.retries, 0);
	assert!(matches!(err.cause, FetchCause::Fatal { .. }), "Unexpected cause: {:?}", err.cause);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_fatal() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream.fail("A", fixtures::status_error(401));

	let err = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect_err("Expected a fatal failure.");

	assert_eq!(upstream.calls().len(), 1);
	assert!(err.to_string().contains("HTTP 401"), "Unexpected error: {err}");
}

#[tokio::test(start_paused = true)]
async fn failed_stream_stays_failed() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream.fail("A", fixtures::status_error(400));

	let mut stream = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("A"), scope("A"), RecordKind::Issues);

	assert!(stream.next_page().await.is_err());
	assert!(stream.next_page().await.is_err());
	assert_eq!(upstream.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn per_request_budget_resets_after_each_page() {
	let upstream = Arc::new(ScriptedUpstream::new());

	script_two_pages_with_retries(&upstream);

	let harvest = fetcher(upstream.clone(), PaginationMode::Offset, 1)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect("Per-request budget must absorb the retries.");

	assert_eq!(harvest.records.len(), 2);
	assert_eq!(harvest.stats.retries, 5);
}

#[tokio::test(start_paused = true)]
async fn per_scope_budget_spans_pages() {
	let upstream = Arc::new(ScriptedUpstream::new());

	script_two_pages_with_retries(&upstream);

	let policy = RetryPolicy { budget: RetryBudget::PerScope, ..RetryPolicy::default() };
	let err = PaginatedFetcher::new(
		upstream.clone(),
		FetchOptions { mode: PaginationMode::Offset, page_size: 1, policy },
	)
	.fetch(query("A"), scope("A"), RecordKind::Issues)
	.collect()
	.await
	.expect_err("Per-scope budget must run out on the second page.");

	assert_eq!(err.retries, 3);
	assert!(
		matches!(err.cause, FetchCause::RetriesExhausted { .. }),
		"Unexpected cause: {:?}",
		err.cause
	);
}

#[tokio::test(start_paused = true)]
async fn repeated_page_token_is_fatal() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream
		.respond("A", fixtures::token_page(Some("t1"), false, fixtures::issues("a", 1)))
		.respond("A", fixtures::token_page(Some("t1"), false, fixtures::issues("b", 1)));

	let err = fetcher(upstream.clone(), PaginationMode::Token, 1)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect_err("Expected a fatal failure.");

	assert_eq!(upstream.calls().len(), 2);
	assert!(matches!(err.cause, FetchCause::Fatal { .. }), "Unexpected cause: {:?}", err.cause);
}

#[tokio::test(start_paused = true)]
async fn empty_page_before_total_is_fatal() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream
		.respond("A", fixtures::offset_page(0, 1, 5, fixtures::issues("a", 1)))
		.respond("A", fixtures::offset_page(1, 1, 5, Vec::new()));

	let err = fetcher(upstream.clone(), PaginationMode::Offset, 1)
		.fetch(query("A"), scope("A"), RecordKind::Issues)
		.collect()
		.await
		.expect_err("Expected a fatal failure.");

	assert!(matches!(err.cause, FetchCause::Fatal { .. }), "Unexpected cause: {:?}", err.cause);
}

#[tokio::test(start_paused = true)]
async fn empty_scope_yields_no_pages() {
	let upstream = Arc::new(PagedUpstream::new().with_scope("B", Vec::new()));
	let mut stream = fetcher(upstream.clone(), PaginationMode::Offset, 100)
		.fetch(query("B"), scope("B"), RecordKind::Issues);

	assert!(stream.next_page().await.expect("Fetch must succeed.").is_none());
	assert_eq!(stream.stats().pages, 0);
	assert_eq!(upstream.calls().len(), 1);
}

// Page one: two rate limits then success. Page two: three rate limits then success.
fn script_two_pages_with_retries(upstream: &ScriptedUpstream) {
	upstream
		.fail("A", fixtures::rate_limited(None))
		.fail("A", fixtures::rate_limited(None))
		.respond("A", fixtures::offset_page(0, 1, 2, fixtures::issues("a", 1)))
		.fail("A", fixtures::rate_limited(None))
		.fail("A", fixtures::rate_limited(None))
		.fail("A", fixtures::rate_limited(None))
		.respond("A", fixtures::offset_page(1, 1, 2, fixtures::issues("b", 1)));
}
