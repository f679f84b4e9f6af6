use std::time::Duration;

use reqwest::{
	Client,
	header::{HeaderMap, RETRY_AFTER},
};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc2822};

use crate::{Error, Result};

pub const OFFSET_SEARCH_PATH: &str = "/rest/api/3/search";
pub const TOKEN_SEARCH_PATH: &str = "/rest/api/3/search/jql";
pub const SEARCH_FIELDS: &str = "summary,assignee,status,created,updated";

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
	pub jql: String,
	pub page_size: u32,
	pub cursor: RequestCursor,
}

/// Position to resume from. One scope only ever uses one of the two forms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestCursor {
	Offset { start_at: u64 },
	Token { next_page_token: Option<String> },
}
impl RequestCursor {
	pub fn path(&self) -> &'static str {
		match self {
			Self::Offset { .. } => OFFSET_SEARCH_PATH,
			Self::Token { .. } => TOKEN_SEARCH_PATH,
		}
	}
}

/// Cursor state reported by one page of results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageCursor {
	Offset { start_at: u64, max_results: u64, total: u64 },
	Token { next_page_token: Option<String>, is_last: bool },
}

#[derive(Clone, Debug)]
pub struct SearchResponse {
	pub records: Vec<Value>,
	pub cursor: PageCursor,
}

pub async fn search(
	client: &Client,
	cfg: &sweep_config::Upstream,
	request: &SearchRequest,
) -> Result<SearchResponse> {
	let url = format!("{}{}", cfg.api_base, request.cursor.path());
	let mut params = vec![
		("jql", request.jql.clone()),
		("maxResults", request.page_size.to_string()),
		("fields", SEARCH_FIELDS.to_string()),
	];

	match &request.cursor {
		RequestCursor::Offset { start_at } => params.push(("startAt", start_at.to_string())),
		RequestCursor::Token { next_page_token: Some(token) } => {
			params.push(("nextPageToken", token.clone()))
		},
		RequestCursor::Token { next_page_token: None } => {},
	}

	let res = client
		.get(url)
		.query(&params)
		.send()
		.await
		.map_err(|err| {
			if err.is_builder() {
				Error::Reqwest(err)
			} else {
				Error::Network { message: err.to_string() }
			}
		})?;
	let status = res.status();

	if !status.is_success() {
		let retry_after = retry_after(res.headers(), OffsetDateTime::now_utc());
		let body = res.text().await.unwrap_or_default();

		return Err(Error::Status {
			status: status.as_u16(),
			retry_after,
			message: truncate(&body, MAX_ERROR_BODY_CHARS),
		});
	}

	// A body cut short by the transport is a network failure, not a contract violation.
	let body = res.bytes().await.map_err(|err| Error::Network { message: err.to_string() })?;
	let json: Value = serde_json::from_slice(&body).map_err(|err| Error::InvalidResponse {
		message: format!("Search response is not valid JSON: {err}."),
	})?;

	parse_search_response(json, &request.cursor)
}

/// Extracts records and cursor state. A body without an `issues` array is a contract violation.
pub fn parse_search_response(json: Value, requested: &RequestCursor) -> Result<SearchResponse> {
	let records = json
		.get("issues")
		.and_then(Value::as_array)
		.cloned()
		.ok_or_else(|| Error::InvalidResponse {
			message: "Search response is missing issues array.".to_string(),
		})?;
	let cursor = match requested {
		RequestCursor::Offset { start_at } => {
			let total = json.get("total").and_then(Value::as_u64).ok_or_else(|| {
				Error::InvalidResponse { message: "Search response is missing total.".to_string() }
			})?;

			PageCursor::Offset {
				start_at: json.get("startAt").and_then(Value::as_u64).unwrap_or(*start_at),
				max_results: json
					.get("maxResults")
					.and_then(Value::as_u64)
					.unwrap_or(records.len() as u64),
				total,
			}
		},
		RequestCursor::Token { .. } => {
			let next_page_token = json
				.get("nextPageToken")
				.and_then(Value::as_str)
				.filter(|token| !token.is_empty())
				.map(str::to_string);
			let is_last = json
				.get("isLast")
				.and_then(Value::as_bool)
				.unwrap_or(next_page_token.is_none());

			PageCursor::Token { next_page_token, is_last }
		},
	};

	Ok(SearchResponse { records, cursor })
}

/// `Retry-After` as delta-seconds or an HTTP-date. A date in the past means no wait.
fn retry_after(headers: &HeaderMap, now: OffsetDateTime) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}

	let at = OffsetDateTime::parse(raw, &Rfc2822).ok()?;

	Some(Duration::try_from(at - now).unwrap_or(Duration::ZERO))
}

fn truncate(text: &str, max_chars: usize) -> String {
	let trimmed = text.trim();

	if trimmed.chars().count() <= max_chars {
		return trimmed.to_string();
	}

	let mut out = trimmed.chars().take(max_chars).collect::<String>();

	out.push_str("...");

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_offset_page() {
		let json = serde_json::json!({
			"startAt": 100,
			"maxResults": 100,
			"total": 150,
			"issues": [{ "id": "1" }, { "id": "2" }]
		});
		let parsed = parse_search_response(json, &RequestCursor::Offset { start_at: 100 })
			.expect("Failed to parse response.");

		assert_eq!(parsed.records.len(), 2);
		assert_eq!(
			parsed.cursor,
			PageCursor::Offset { start_at: 100, max_results: 100, total: 150 }
		);
	}

	#[test]
	fn token_page_without_token_is_last() {
		let json = serde_json::json!({ "issues": [] });
		let parsed =
			parse_search_response(json, &RequestCursor::Token { next_page_token: None })
				.expect("Failed to parse response.");

		assert_eq!(parsed.cursor, PageCursor::Token { next_page_token: None, is_last: true });
	}

	#[test]
	fn missing_issues_is_invalid() {
		let json = serde_json::json!({ "total": 3, "startAt": 0 });
		let err = parse_search_response(json, &RequestCursor::Offset { start_at: 0 })
			.expect_err("Expected invalid response.");

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}

	#[test]
	fn retry_after_accepts_seconds_and_http_dates() {
		let now = time::macros::datetime!(2015-10-21 07:28:00 UTC);
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "7".parse().expect("Valid header."));

		assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(7)));

		headers.insert(
			RETRY_AFTER,
			"Wed, 21 Oct 2015 07:28:30 GMT".parse().expect("Valid header."),
		);

		assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(30)));

		headers.insert(
			RETRY_AFTER,
			"Wed, 21 Oct 2015 07:27:00 GMT".parse().expect("Valid header."),
		);

		assert_eq!(retry_after(&headers, now), Some(Duration::ZERO));

		headers.insert(RETRY_AFTER, "soon".parse().expect("Valid header."));

		assert_eq!(retry_after(&headers, now), None);
	}

	#[test]
	fn truncates_long_bodies() {
		let body = "x".repeat(600);

		assert_eq!(truncate(&body, 512).chars().count(), 515);
		assert_eq!(truncate(" short ", 512), "short");
	}
}
