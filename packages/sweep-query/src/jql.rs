use std::fmt::{Display, Formatter};

use time::Date;

use crate::{AssigneeFilter, Error, FilterSpec, RecordKind, Result, filter};

const DEFAULT_DATE_FIELD: &str = "created";

/// A rendered JQL expression, ready to send upstream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query(String);
impl Query {
	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}
impl Display for Query {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Clone, Debug)]
enum Clause {
	Eq { field: String, value: String },
	Gte { field: String, value: String },
	Lt { field: String, value: String },
	IsNotEmpty { field: String },
}
impl Clause {
	fn render(&self) -> String {
		match self {
			Self::Eq { field, value } => format!("{} = {}", render_field(field), quote(value)),
			Self::Gte { field, value } => format!("{} >= {}", render_field(field), quote(value)),
			Self::Lt { field, value } => format!("{} < {}", render_field(field), quote(value)),
			Self::IsNotEmpty { field } => format!("{} IS NOT EMPTY", render_field(field)),
		}
	}
}

#[derive(Clone, Debug)]
pub struct QueryBuilder {
	date_field: String,
}
impl QueryBuilder {
	pub fn new(date_field: impl Into<String>) -> Self {
		Self { date_field: date_field.into() }
	}

	pub fn date_field(&self) -> &str {
		&self.date_field
	}

	/// Renders `spec` as JQL. `today` anchors relative windows, so equal inputs always yield the
	/// same bytes.
	pub fn build(&self, spec: &FilterSpec, today: Date) -> Result<Query> {
		spec.validate()?;

		if self.date_field.trim().is_empty() {
			return Err(Error::validation("date_field", "date field must be non-empty."));
		}

		let project =
			Clause::Eq { field: "project".to_string(), value: spec.scope.as_str().to_string() };
		let mut clauses = vec![project];

		if let Some(range) = spec.time_window.resolve(today)? {
			let upper = range.to.next_day().ok_or_else(|| {
				Error::validation("to", format!("{} has no following day.", range.to))
			})?;

			clauses.push(Clause::Gte {
				field: self.date_field.clone(),
				value: filter::format_date(range.from)?,
			});
			clauses.push(Clause::Lt {
				field: self.date_field.clone(),
				value: filter::format_date(upper)?,
			});
		}
		if let AssigneeFilter::Account(id) = &spec.assignee {
			clauses.push(Clause::Eq { field: "assignee".to_string(), value: id.clone() });
		}
		if spec.kind == RecordKind::Assignees {
			clauses.push(Clause::IsNotEmpty { field: "assignee".to_string() });
		}

		let predicate = clauses.iter().map(Clause::render).collect::<Vec<_>>().join(" AND ");

		Ok(Query(format!("{predicate} {}", order_by(spec.kind))))
	}
}
impl Default for QueryBuilder {
	fn default() -> Self {
		Self::new(DEFAULT_DATE_FIELD)
	}
}

/// Quotes a JQL string literal.
pub fn quote(value: &str) -> String {
	let mut out = String::with_capacity(value.len() + 2);

	out.push('"');

	for ch in value.chars() {
		match ch {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			other => out.push(other),
		}
	}

	out.push('"');

	out
}

fn render_field(field: &str) -> String {
	let bare = |ch: char| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.';

	if !field.is_empty() && field.chars().all(bare) {
		field.to_string()
	} else {
		quote(field)
	}
}

// The key tie-break keeps page boundaries stable when many rows share a sort value.
fn order_by(kind: RecordKind) -> &'static str {
	match kind {
		RecordKind::Issues => "ORDER BY created DESC, key DESC",
		RecordKind::Assignees => "ORDER BY assignee ASC, key ASC",
	}
}
