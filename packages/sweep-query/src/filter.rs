use std::fmt::{Display, Formatter};

use regex::Regex;
use serde::Serialize;
use time::{Date, Duration, Month, macros::format_description};

use crate::{Error, Result};

/// A project partition of the tracker, e.g. `GBP`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ScopeId(String);
impl ScopeId {
	pub fn new(raw: impl AsRef<str>) -> Result<Self> {
		let trimmed = raw.as_ref().trim();

		validate_scope(trimmed)?;

		Ok(Self(trimmed.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for ScopeId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
	Issues,
	Assignees,
}
impl RecordKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Issues => "issues",
			Self::Assignees => "assignees",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeWindow {
	Full,
	Weekly,
	Monthly,
	Custom { from: Date, to: Date },
}
impl TimeWindow {
	/// Parses the caller-facing `filter` parameter together with its optional custom bounds.
	pub fn parse(kind: &str, from: Option<&str>, to: Option<&str>) -> Result<Self> {
		match kind.trim() {
			"" | "full" => Ok(Self::Full),
			"weekly" => Ok(Self::Weekly),
			"monthly" => Ok(Self::Monthly),
			"custom" => {
				let from = from
					.filter(|raw| !raw.trim().is_empty())
					.ok_or_else(|| Error::validation("from", "custom filter requires from."))?;
				let to = to
					.filter(|raw| !raw.trim().is_empty())
					.ok_or_else(|| Error::validation("to", "custom filter requires to."))?;

				Self::custom(parse_date("from", from)?, parse_date("to", to)?)
			},
			other => Err(Error::validation(
				"filter",
				format!("'{other}' must be one of full, weekly, monthly, or custom."),
			)),
		}
	}

	pub fn custom(from: Date, to: Date) -> Result<Self> {
		let window = Self::Custom { from, to };

		window.validate()?;

		Ok(window)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Full => "full",
			Self::Weekly => "weekly",
			Self::Monthly => "monthly",
			Self::Custom { .. } => "custom",
		}
	}

	pub fn validate(&self) -> Result<()> {
		if let Self::Custom { from, to } = self
			&& from > to
		{
			return Err(Error::validation("from", format!("{from} must not be after {to}.")));
		}

		Ok(())
	}

	/// Resolves the window to an inclusive calendar-day range relative to `today`.
	///
	/// `Full` has no range. `Weekly` covers the eight days ending today, `Monthly` starts on
	/// the first day of the previous calendar month.
	pub fn resolve(&self, today: Date) -> Result<Option<DateRange>> {
		self.validate()?;

		let range = match *self {
			Self::Full => return Ok(None),
			Self::Weekly => {
				let from = today
					.checked_sub(Duration::days(7))
					.ok_or_else(|| Error::validation("filter", "weekly window underflows."))?;

				DateRange { from, to: today }
			},
			Self::Monthly => {
				let (year, month) = match today.month() {
					Month::January => (today.year() - 1, Month::December),
					month => (today.year(), month.previous()),
				};
				let from = Date::from_calendar_date(year, month, 1)
					.map_err(|err| Error::validation("filter", err.to_string()))?;

				DateRange { from, to: today }
			},
			Self::Custom { from, to } => DateRange { from, to },
		};

		Ok(Some(range))
	}
}

/// Inclusive range of calendar days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
	pub from: Date,
	pub to: Date,
}
impl DateRange {
	pub fn days(&self) -> i64 {
		(self.to - self.from).whole_days() + 1
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssigneeFilter {
	All,
	Account(String),
}
impl AssigneeFilter {
	/// `All` (any case) or an empty value means no assignee restriction.
	pub fn parse(raw: &str) -> Result<Self> {
		let trimmed = raw.trim();

		if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
			return Ok(Self::All);
		}

		validate_assignee(trimmed)?;

		Ok(Self::Account(trimmed.to_string()))
	}

	pub fn validate(&self) -> Result<()> {
		match self {
			Self::All => Ok(()),
			Self::Account(id) => validate_assignee(id),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterSpec {
	pub scope: ScopeId,
	pub time_window: TimeWindow,
	pub assignee: AssigneeFilter,
	pub kind: RecordKind,
}
impl FilterSpec {
	pub fn new(
		scope: ScopeId,
		time_window: TimeWindow,
		assignee: AssigneeFilter,
		kind: RecordKind,
	) -> Result<Self> {
		let spec = Self { scope, time_window, assignee, kind };

		spec.validate()?;

		Ok(spec)
	}

	/// Re-checks every invariant; fields are public so a spec may have been assembled by hand.
	pub fn validate(&self) -> Result<()> {
		validate_scope(self.scope.as_str())?;
		self.time_window.validate()?;
		self.assignee.validate()
	}

	pub fn with_scope(&self, scope: ScopeId) -> Self {
		Self { scope, ..self.clone() }
	}
}

pub fn parse_date(field: &'static str, raw: &str) -> Result<Date> {
	let raw = raw.trim();
	let shaped =
		Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").map(|re| re.is_match(raw)).unwrap_or(false);

	if !shaped {
		return Err(Error::validation(field, format!("'{raw}' must match YYYY-MM-DD.")));
	}

	Date::parse(raw, format_description!("[year]-[month]-[day]"))
		.map_err(|err| Error::validation(field, format!("'{raw}' is not a calendar date: {err}.")))
}

pub fn format_date(date: Date) -> Result<String> {
	date.format(format_description!("[year]-[month]-[day]"))
		.map_err(|err| Error::validation("date", err.to_string()))
}

fn validate_scope(scope: &str) -> Result<()> {
	if scope.trim().is_empty() {
		return Err(Error::validation("scope", "scope must be non-empty."));
	}
	if scope.chars().any(char::is_control) {
		return Err(Error::validation("scope", "scope must not contain control characters."));
	}

	Ok(())
}

fn validate_assignee(id: &str) -> Result<()> {
	if id.is_empty() {
		return Err(Error::validation("assignee", "assignee must be non-empty."));
	}
	if !id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
		return Err(Error::validation(
			"assignee",
			format!("'{id}' may only contain letters, digits, '_' and '-'."),
		));
	}

	Ok(())
}
