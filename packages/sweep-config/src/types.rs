use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub upstream: Upstream,
	#[serde(default)]
	pub retry: Retry,
	#[serde(default)]
	pub query: Query,
	pub scopes: Scopes,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	#[serde(default = "default_cors_allow_origin")]
	pub cors_allow_origin: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Upstream {
	/// Base URL of the tracker, e.g. "https://example.atlassian.net".
	pub api_base: String,
	/// Optional. When present, requests authenticate with HTTP Basic `email:api_token`; otherwise
	/// the token is sent as a bearer token.
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub api_token: String,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub pagination: Pagination,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Pagination {
	pub mode: PaginationMode,
	pub page_size: u32,
}
impl Default for Pagination {
	fn default() -> Self {
		Self { mode: PaginationMode::Offset, page_size: 100 }
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
	/// `startAt`/`maxResults`/`total` against the classic search endpoint.
	#[default]
	Offset,
	/// `nextPageToken`/`isLast` against the enhanced JQL search endpoint.
	Token,
}
impl PaginationMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Offset => "offset",
			Self::Token => "token",
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	pub budget: RetryBudget,
}
impl Default for Retry {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay_ms: 1_000,
			max_delay_ms: 30_000,
			budget: RetryBudget::PerRequest,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryBudget {
	/// The attempt counter resets after every successful page.
	#[default]
	PerRequest,
	/// One attempt counter spans the whole scope.
	PerScope,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Query {
	pub date_field: String,
}
impl Default for Query {
	fn default() -> Self {
		Self { date_field: "created".to_string() }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Scopes {
	pub issues: Vec<String>,
	pub assignees: Vec<String>,
	#[serde(default)]
	pub operation_assignees: Vec<String>,
}

fn default_cors_allow_origin() -> String {
	"*".to_string()
}

fn default_timeout_ms() -> u64 {
	30_000
}
