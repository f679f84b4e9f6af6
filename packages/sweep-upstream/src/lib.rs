mod error;

pub mod search;

pub use error::{Error, Result};
pub use search::{PageCursor, RequestCursor, SearchRequest, SearchResponse};

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{
	Client,
	header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};

/// A client with the credential and default headers installed once.
pub fn client(cfg: &sweep_config::Upstream) -> Result<Client> {
	Ok(Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.default_headers(auth_headers(cfg)?)
		.build()?)
}

/// Basic `email:token` when an email is configured, bearer otherwise, plus configured defaults.
pub fn auth_headers(cfg: &sweep_config::Upstream) -> Result<HeaderMap> {
	if cfg.api_token.trim().is_empty() {
		return Err(Error::InvalidConfig {
			message: "upstream.api_token must be non-empty.".to_string(),
		});
	}

	let authorization = match cfg.email.as_deref() {
		Some(email) => {
			format!("Basic {}", STANDARD.encode(format!("{email}:{}", cfg.api_token)))
		},
		None => format!("Bearer {}", cfg.api_token),
	};
	let mut headers = HeaderMap::new();
	let mut value: HeaderValue = authorization.parse()?;

	value.set_sensitive(true);
	headers.insert(AUTHORIZATION, value);
	headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

	for (key, value) in &cfg.default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}
