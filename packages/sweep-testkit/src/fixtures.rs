use std::time::Duration;

use serde_json::Value;

pub fn issue_json(id: &str, created: &str) -> Value {
	serde_json::json!({
		"id": id,
		"key": format!("KEY-{id}"),
		"fields": {
			"summary": format!("Issue {id}"),
			"assignee": null,
			"status": { "name": "Open" },
			"created": created,
			"updated": created,
		}
	})
}

pub fn assigned_issue_json(id: &str, created: &str, account_id: &str, name: &str) -> Value {
	let mut issue = issue_json(id, created);

	issue["fields"]["assignee"] = serde_json::json!({
		"accountId": account_id,
		"displayName": name,
		"emailAddress": format!("{account_id}@example.com"),
	});

	issue
}

/// `count` issues with ids `{prefix}{n}` and distinct creation minutes.
pub fn issues(prefix: &str, count: usize) -> Vec<Value> {
	(0..count).map(|n| issue_json(&format!("{prefix}{n}"), &minute_timestamp(n))).collect()
}

pub fn minute_timestamp(n: usize) -> String {
	let day = 1 + n / 1_440;
	let hour = (n / 60) % 24;
	let minute = n % 60;

	format!("2024-01-{day:02}T{hour:02}:{minute:02}:00.000+0000")
}

pub fn offset_page(start_at: u64, max_results: u64, total: u64, issues: Vec<Value>) -> Value {
	serde_json::json!({
		"startAt": start_at,
		"maxResults": max_results,
		"total": total,
		"issues": issues,
	})
}

pub fn token_page(next_page_token: Option<&str>, is_last: bool, issues: Vec<Value>) -> Value {
	let mut page = serde_json::json!({ "isLast": is_last, "issues": issues });

	if let Some(token) = next_page_token {
		page["nextPageToken"] = Value::String(token.to_string());
	}

	page
}

pub fn rate_limited(retry_after_secs: Option<u64>) -> sweep_upstream::Error {
	sweep_upstream::Error::Status {
		status: 429,
		retry_after: retry_after_secs.map(Duration::from_secs),
		message: "Rate limit exceeded.".to_string(),
	}
}

pub fn status_error(status: u16) -> sweep_upstream::Error {
	sweep_upstream::Error::Status { status, retry_after: None, message: format!("HTTP {status}") }
}

pub fn network_error() -> sweep_upstream::Error {
	sweep_upstream::Error::Network { message: "connection reset by peer".to_string() }
}
