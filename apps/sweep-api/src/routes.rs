use axum::{
	Json, Router,
	extract::{Query, Request, State},
	http::{
		HeaderValue, Method, StatusCode,
		header::{
			ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
			ACCESS_CONTROL_ALLOW_ORIGIN,
		},
	},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::get,
};
use serde::{Deserialize, Serialize};

use sweep_engine::{AssigneeRecord, IssueRecord};
use sweep_query::{AssigneeFilter, FilterSpec, RecordKind, ScopeId, TimeWindow};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IssuesParams {
	pub filter: Option<String>,
	pub from: Option<String>,
	pub to: Option<String>,
	pub assignee: Option<String>,
	pub scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AssigneesParams {
	pub operation: Option<String>,
	pub filter: Option<String>,
	pub from: Option<String>,
	pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssuesResponse {
	pub total: usize,
	pub issues: Vec<IssueRecord>,
}

#[derive(Debug, Serialize)]
pub struct AssigneesResponse {
	pub assignees: Vec<AssigneeRecord>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}

	fn invalid(message: impl Into<String>) -> Self {
		Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
	}
}
impl From<sweep_query::Error> for ApiError {
	fn from(err: sweep_query::Error) -> Self {
		Self::invalid(err.to_string())
	}
}
impl From<sweep_engine::Error> for ApiError {
	fn from(err: sweep_engine::Error) -> Self {
		match err {
			sweep_engine::Error::Validation(err) => err.into(),
			sweep_engine::Error::Aggregation { source } => {
				Self::new(StatusCode::BAD_GATEWAY, "upstream_failure", source.to_string())
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/issues", get(issues))
		.route("/api/assignees", get(assignees))
		.layer(middleware::from_fn_with_state(state.clone(), cors))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn issues(
	State(state): State<AppState>,
	Query(params): Query<IssuesParams>,
) -> Result<Json<IssuesResponse>, ApiError> {
	let time_window = TimeWindow::parse(
		params.filter.as_deref().unwrap_or_default(),
		params.from.as_deref(),
		params.to.as_deref(),
	)?;
	let assignee = AssigneeFilter::parse(params.assignee.as_deref().unwrap_or_default())?;
	let scopes = match params.scope.as_deref().map(str::trim).filter(|scope| !scope.is_empty()) {
		Some(requested) => vec![configured_scope(&state.scopes.issues, requested)?],
		None => state.scopes.issues.clone(),
	};
	let spec = FilterSpec::new(first_scope(&scopes)?, time_window, assignee, RecordKind::Issues)?;
	let issues = state.aggregator.aggregate(&scopes, &spec, state.today()).await?.into_issues();

	Ok(Json(IssuesResponse { total: issues.len(), issues }))
}

// Absent or blank reads as false.
fn parse_flag(name: &str, raw: Option<&str>) -> Result<bool, ApiError> {
	let value = raw.map(str::trim).unwrap_or_default();

	match value.to_ascii_lowercase().as_str() {
		"" | "false" | "0" | "no" | "off" => Ok(false),
		"true" | "1" | "yes" | "on" => Ok(true),
		_ => Err(ApiError::invalid(format!("{name} must be a boolean flag, got '{value}'."))),
	}
}

async fn assignees(
	State(state): State<AppState>,
	Query(params): Query<AssigneesParams>,
) -> Result<Json<AssigneesResponse>, ApiError> {
	let operation = parse_flag("operation", params.operation.as_deref())?;
	let scopes = if operation {
		state.scopes.operation_assignees.clone()
	} else {
		state.scopes.assignees.clone()
	};
	let time_window = TimeWindow::parse(
		params.filter.as_deref().unwrap_or_default(),
		params.from.as_deref(),
		params.to.as_deref(),
	)?;
	let spec = FilterSpec::new(
		first_scope(&scopes)?,
		time_window,
		AssigneeFilter::All,
		RecordKind::Assignees,
	)?;
	let assignees =
		state.aggregator.aggregate(&scopes, &spec, state.today()).await?.into_assignees();

	Ok(Json(AssigneesResponse { assignees }))
}

async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
	let mut response = if request.method() == Method::OPTIONS {
		StatusCode::OK.into_response()
	} else {
		next.run(request).await
	};
	let headers = response.headers_mut();

	headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_allow_origin.clone());
	headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, OPTIONS"));
	headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));

	response
}

fn configured_scope(configured: &[ScopeId], requested: &str) -> Result<ScopeId, ApiError> {
	configured
		.iter()
		.find(|scope| scope.as_str() == requested)
		.cloned()
		.ok_or_else(|| ApiError::invalid(format!("scope '{requested}' is not configured.")))
}

fn first_scope(scopes: &[ScopeId]) -> Result<ScopeId, ApiError> {
	scopes
		.first()
		.cloned()
		.ok_or_else(|| ApiError::invalid("no scopes are configured for this query."))
}
