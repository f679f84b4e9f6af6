use serde::Serialize;
use serde_json::Value;
use time::{
	OffsetDateTime,
	format_description::{BorrowedFormatItem, well_known::Rfc3339},
	macros::format_description,
};

use sweep_query::RecordKind;

// Jira renders offsets without a colon, e.g. 2024-01-15T10:30:00.000+0000.
const TRACKER_TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!(
	"[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NormalizeError {
	pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssueRecord {
	pub id: String,
	pub key: String,
	pub summary: String,
	pub assignee: Option<String>,
	pub status: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub created: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeRecord {
	pub account_id: String,
	pub name: String,
	pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
	Issue(IssueRecord),
	Assignee(AssigneeRecord),
}
impl Record {
	pub fn identity_key(&self) -> &str {
		match self {
			Self::Issue(issue) => &issue.id,
			Self::Assignee(assignee) => &assignee.account_id,
		}
	}
}

/// Maps one raw search hit to a record of `kind`. Unassigned issues yield no assignee record.
pub fn normalize(kind: RecordKind, raw: &Value) -> Result<Option<Record>, NormalizeError> {
	match kind {
		RecordKind::Issues => normalize_issue(raw).map(|issue| Some(Record::Issue(issue))),
		RecordKind::Assignees => {
			let assignee = raw.get("fields").and_then(|fields| fields.get("assignee"));

			match assignee {
				None | Some(Value::Null) => Ok(None),
				Some(value) => {
					normalize_assignee(value).map(|record| Some(Record::Assignee(record)))
				},
			}
		},
	}
}

fn normalize_issue(raw: &Value) -> Result<IssueRecord, NormalizeError> {
	let id = raw
		.get("id")
		.and_then(|value| match value {
			Value::String(id) => Some(id.clone()),
			Value::Number(id) => Some(id.to_string()),
			_ => None,
		})
		.filter(|id| !id.is_empty())
		.ok_or_else(|| invalid("Search hit is missing id."))?;
	let key =
		raw.get("key").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| id.clone());
	let fields = raw
		.get("fields")
		.and_then(Value::as_object)
		.ok_or_else(|| invalid(format!("Issue {key} is missing fields.")))?;
	let summary = fields.get("summary").and_then(Value::as_str).unwrap_or_default().to_string();
	let assignee = fields
		.get("assignee")
		.and_then(|assignee| assignee.get("displayName"))
		.and_then(Value::as_str)
		.map(str::to_string);
	let status = fields
		.get("status")
		.and_then(|status| status.get("name"))
		.and_then(Value::as_str)
		.map(str::to_string);
	let created = timestamp(&key, "created", fields.get("created"))?;
	let updated = timestamp(&key, "updated", fields.get("updated"))?;

	Ok(IssueRecord { id, key, summary, assignee, status, created, updated })
}

fn normalize_assignee(raw: &Value) -> Result<AssigneeRecord, NormalizeError> {
	let account_id = raw
		.get("accountId")
		.and_then(Value::as_str)
		.filter(|id| !id.is_empty())
		.ok_or_else(|| invalid("Assignee is missing accountId."))?
		.to_string();
	let name = raw
		.get("displayName")
		.and_then(Value::as_str)
		.map(str::to_string)
		.unwrap_or_else(|| account_id.clone());
	let email = raw.get("emailAddress").and_then(Value::as_str).map(str::to_string);

	Ok(AssigneeRecord { account_id, name, email })
}

fn timestamp(
	key: &str,
	field: &str,
	value: Option<&Value>,
) -> Result<OffsetDateTime, NormalizeError> {
	let raw = value
		.and_then(Value::as_str)
		.ok_or_else(|| invalid(format!("Issue {key} is missing {field}.")))?;

	OffsetDateTime::parse(raw, &Rfc3339)
		.or_else(|_| OffsetDateTime::parse(raw, TRACKER_TIMESTAMP))
		.map_err(|err| invalid(format!("Issue {key} has an unreadable {field} '{raw}': {err}.")))
}

fn invalid(message: impl Into<String>) -> NormalizeError {
	NormalizeError { message: message.into() }
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn normalizes_tracker_issue() {
		let raw = serde_json::json!({
			"id": "10001",
			"key": "GBP-1",
			"fields": {
				"summary": "Fix login",
				"assignee": { "accountId": "a1", "displayName": "Ada", "emailAddress": "ada@example.com" },
				"status": { "name": "In Progress" },
				"created": "2024-01-15T10:30:00.000+0000",
				"updated": "2024-01-16T08:00:00.000+0545"
			}
		});
		let record = normalize(RecordKind::Issues, &raw).expect("Failed to normalize issue.");
		let Some(Record::Issue(issue)) = record else {
			panic!("Expected an issue record.");
		};

		assert_eq!(issue.key, "GBP-1");
		assert_eq!(issue.assignee.as_deref(), Some("Ada"));
		assert_eq!(issue.status.as_deref(), Some("In Progress"));
		assert_eq!(issue.created, datetime!(2024-01-15 10:30:00 UTC));
		assert_eq!(issue.updated, datetime!(2024-01-16 08:00:00 +05:45));
	}

	#[test]
	fn unassigned_issue_has_no_assignee_record() {
		let raw = serde_json::json!({ "id": "1", "fields": { "assignee": null } });

		assert_eq!(normalize(RecordKind::Assignees, &raw), Ok(None));
	}

	#[test]
	fn unreadable_timestamp_is_rejected() {
		let raw = serde_json::json!({
			"id": "1",
			"fields": { "created": "yesterday", "updated": "2024-01-15T10:30:00Z" }
		});

		assert!(normalize(RecordKind::Issues, &raw).is_err());
	}
}
