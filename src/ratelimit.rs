use std::{sync::Arc, time::Duration};

use axum::{
	body::Body,
	response::{IntoResponse, Response},
};
use governor::{
	clock::QuantaInstant,
	middleware::{RateLimitingMiddleware, StateInformationMiddleware},
};
use tower_governor::{
	governor::{GovernorConfig, GovernorConfigBuilder},
	key_extractor::{KeyExtractor, PeerIpKeyExtractor},
	GovernorError,
};

use crate::error::AppError;

pub const REQUESTS_PER_SECOND: u64 = 10;
pub const BURST_SIZE: u32 = 50;

/// How often stale per-peer limiter state is pruned.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub type Config = GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// The per-peer limit applied to every route.
pub fn default() -> Arc<Config> {
	Arc::new(
		GovernorConfigBuilder::default()
			.per_second(REQUESTS_PER_SECOND)
			.burst_size(BURST_SIZE)
			.use_headers()
			.error_handler(error_handler)
			.finish()
			.unwrap_or_else(|| unreachable!("rate limit quotas are non-zero")),
	)
}

fn error_handler(error: GovernorError) -> Response<Body> {
	AppError::from(error).into_response()
}

/// Spawns a thread pruning the state of peers that have not been seen
/// for a while from every limiter in `configs`.
pub fn cleanup_old_limits<T, M>(configs: &[&Arc<GovernorConfig<T, M>>])
where
	T: KeyExtractor,
	<T as KeyExtractor>::Key: Send + Sync + 'static,
	M: RateLimitingMiddleware<QuantaInstant> + Send + Sync + 'static,
{
	let limiters = configs
		.iter()
		.map(|config| config.limiter().clone())
		.collect::<Vec<_>>();

	std::thread::spawn(move || loop {
		std::thread::sleep(CLEANUP_INTERVAL);

		for limiter in &limiters {
			tracing::debug!("rate limiting storage size: {}", limiter.len());

			limiter.retain_recent();
		}
	});
}

#[cfg(test)]
mod test {
	use axum::http::StatusCode;

	use super::*;

	#[test]
	fn test_rejections_are_rendered_as_429() {
		let response = error_handler(GovernorError::TooManyRequests {
			wait_time: 1,
			headers: None,
		});

		assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
	}

	#[test]
	fn test_missing_peer_address_is_a_server_error() {
		let response = error_handler(GovernorError::UnableToExtractKey);

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}
}
