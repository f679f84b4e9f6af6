mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Pagination, PaginationMode, Query, Retry, RetryBudget, Scopes, Service, Upstream,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.cors_allow_origin.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.cors_allow_origin must be non-empty.".to_string(),
		});
	}

	let api_base = cfg.upstream.api_base.as_str();

	if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
		return Err(Error::Validation {
			message: "upstream.api_base must start with http:// or https://.".to_string(),
		});
	}
	if cfg.upstream.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "upstream.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.upstream.pagination.page_size == 0 {
		return Err(Error::Validation {
			message: "upstream.pagination.page_size must be greater than zero.".to_string(),
		});
	}

	for (key, value) in &cfg.upstream.default_headers {
		if !value.is_string() {
			return Err(Error::Validation {
				message: format!("upstream.default_headers.{key} must be a string."),
			});
		}
	}

	if cfg.retry.base_delay_ms == 0 {
		return Err(Error::Validation {
			message: "retry.base_delay_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.max_delay_ms < cfg.retry.base_delay_ms {
		return Err(Error::Validation {
			message: "retry.max_delay_ms must be at least retry.base_delay_ms.".to_string(),
		});
	}
	if cfg.query.date_field.trim().is_empty() {
		return Err(Error::Validation {
			message: "query.date_field must be non-empty.".to_string(),
		});
	}
	if cfg.query.date_field.contains(['"', '\\']) {
		return Err(Error::Validation {
			message: "query.date_field must not contain quotes or backslashes.".to_string(),
		});
	}

	for (label, scopes, required) in [
		("scopes.issues", &cfg.scopes.issues, true),
		("scopes.assignees", &cfg.scopes.assignees, true),
		("scopes.operation_assignees", &cfg.scopes.operation_assignees, false),
	] {
		if required && scopes.is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
		if scopes.iter().any(|scope| scope.trim().is_empty()) {
			return Err(Error::Validation {
				message: format!("{label} must not contain empty scope ids."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.upstream.api_base = cfg.upstream.api_base.trim().trim_end_matches('/').to_string();

	if cfg.upstream.email.as_deref().map(|email| email.trim().is_empty()).unwrap_or(false) {
		cfg.upstream.email = None;
	}

	for scopes in [
		&mut cfg.scopes.issues,
		&mut cfg.scopes.assignees,
		&mut cfg.scopes.operation_assignees,
	] {
		for scope in scopes.iter_mut() {
			*scope = scope.trim().to_string();
		}
	}
}
