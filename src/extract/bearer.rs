use aide::OperationInput;
use axum::{
	extract::FromRequestParts,
	http::{header, request},
};

use crate::{
	openapi::SECURITY_SCHEME_BEARER,
	route::media::{Error, RouteError},
};

pub const AUTHORIZATION_PREFIX: &str = "Bearer ";

/// The token from an `Authorization: Bearer <token>` header.
///
/// If the header is missing or uses another scheme, a
/// [`Error::MissingToken`] is returned. The token itself is not checked.
///
/// ```rust
/// async fn route(Bearer(token): Bearer) {
///   println!("{token}");
/// }
/// ```
#[derive(Debug)]
pub struct Bearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Bearer
where
	S: Sync + Send,
{
	type Rejection = RouteError;

	async fn from_request_parts(
		parts: &mut request::Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection> {
		let token = parts
			.headers
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix(AUTHORIZATION_PREFIX))
			.map(str::trim)
			.filter(|token| !token.is_empty())
			.ok_or(Error::MissingToken)?;

		Ok(Self(token.to_owned()))
	}
}

impl OperationInput for Bearer {
	/// Adds a bearer token requirement to the `OpenAPI` operation.
	fn operation_input(_ctx: &mut aide::gen::GenContext, operation: &mut aide::openapi::Operation) {
		operation.security.push(
			[(SECURITY_SCHEME_BEARER.to_string(), Vec::new())]
				.into_iter()
				.collect(),
		);
	}
}

#[cfg(test)]
mod test {
	use axum::http::Request;

	use super::*;

	async fn extract(value: Option<&str>) -> Option<String> {
		let mut request = Request::builder();

		if let Some(value) = value {
			request = request.header(header::AUTHORIZATION, value);
		}

		let (mut parts, ()) = request.body(()).unwrap().into_parts();

		Bearer::from_request_parts(&mut parts, &())
			.await
			.ok()
			.map(|bearer| bearer.0)
	}

	#[tokio::test]
	async fn test_reads_bearer_tokens() {
		assert_eq!(extract(Some("Bearer abc.def")).await.as_deref(), Some("abc.def"));
	}

	#[tokio::test]
	async fn test_rejects_other_headers() {
		for value in [None, Some("Basic abc"), Some("Bearer "), Some("bearer abc")] {
			assert_eq!(extract(value).await, None, "{value:?}");
		}
	}
}
