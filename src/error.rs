use std::borrow::Cow;

use axum::{
	body::Body,
	extract::{
		multipart::MultipartError,
		rejection::{JsonRejection, QueryRejection},
	},
	http::{Response, StatusCode},
	response::IntoResponse,
	Json,
};
use schemars::JsonSchema;
use serde::Serialize;
use tower_governor::GovernorError;

use crate::store;

pub type Map = serde_json::Map<String, serde_json::Value>;

/// A single error message presented to the client.
#[derive(Debug, Serialize, JsonSchema)]
pub struct Message<'a> {
	/// A human-readable description of the problem.
	pub content: Cow<'a, str>,
	/// The input field that caused the error, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub field: Option<Cow<'a, str>>,
	/// Additional machine-readable context.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Cow<'a, Map>>,
}

impl<'a> Message<'a> {
	pub fn new(content: impl Into<Cow<'a, str>>) -> Self {
		Self {
			content: content.into(),
			field: None,
			details: None,
		}
	}

	#[must_use]
	pub fn field(mut self, field: impl Into<Cow<'a, str>>) -> Self {
		self.field = Some(field.into());
		self
	}

	#[must_use]
	pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.details
			.get_or_insert_with(|| Cow::Owned(Map::new()))
			.to_mut()
			.insert(key.into(), value.into());
		self
	}

	pub fn into_vec(self) -> Vec<Self> {
		vec![self]
	}
}

/// The body of every error response.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ErrorBody<'a> {
	pub success: bool,
	pub errors: Vec<Message<'a>>,
}

/// Describes how a route-level error is presented to the client.
///
/// Server errors (5xx) are logged and replaced with an opaque message,
/// so [`ErrorShape::errors`] may contain internal details for them.
pub trait ErrorShape: std::error::Error {
	fn status(&self) -> StatusCode;

	fn errors(&self) -> Vec<Message<'_>> {
		Message::new(self.to_string()).into_vec()
	}
}

/// Errors shared by every route: extractor rejections, rate limiting
/// and the post store.
///
/// The Display trait is not sent to the client, so it can show
/// sensitive information.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
	#[error("validation error: {0}")]
	Validation(#[from] validator::ValidationErrors),
	#[error("json error: {0}")]
	Json(#[from] JsonRejection),
	#[error("query error: {0}")]
	Query(#[from] QueryRejection),
	#[error("multipart error: {0}")]
	Multipart(#[from] MultipartError),
	#[error("rate limited: {0}")]
	RateLimit(#[from] GovernorError),
	#[error("store error: {0}")]
	Store(#[from] store::Error),
}

impl AppError {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::Validation(..) => StatusCode::BAD_REQUEST,
			Self::Json(rejection) => rejection.status(),
			Self::Query(rejection) => rejection.status(),
			Self::Multipart(error) => error.status(),
			Self::RateLimit(GovernorError::TooManyRequests { .. }) => StatusCode::TOO_MANY_REQUESTS,
			Self::RateLimit(..) | Self::Store(..) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn errors(&self) -> Vec<Message<'_>> {
		match self {
			Self::Validation(errors) => {
				let mut fields = errors.field_errors().into_iter().collect::<Vec<_>>();

				// field_errors is backed by a HashMap, so sort for a stable first message
				fields.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
				fields
					.into_iter()
					.flat_map(|(field, errors)| {
						errors.iter().map(move |error| {
							let content = error.message.clone().unwrap_or_else(|| {
								Cow::Owned(format!("\"{field}\" failed {}", error.code))
							});

							Message::new(content).field(field)
						})
					})
					.collect()
			}
			Self::Json(rejection) => Message::new(rejection.body_text()).into_vec(),
			Self::Query(rejection) => Message::new(rejection.body_text()).into_vec(),
			Self::Multipart(error) => Message::new(error.body_text()).into_vec(),
			Self::RateLimit(..) => Message::new("too many requests").into_vec(),
			Self::Store(error) => Message::new(error.to_string()).into_vec(),
		}
	}
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response<Body> {
		respond(self.status(), self.errors(), &self)
	}
}

/// The error type returned by route handlers, combining the shared
/// [`AppError`] with the route's own error enum.
#[derive(Debug)]
pub enum RouteError<T> {
	App(AppError),
	Route(T),
}

impl<T: ErrorShape> From<T> for RouteError<T> {
	fn from(error: T) -> Self {
		Self::Route(error)
	}
}

impl<T> From<AppError> for RouteError<T> {
	fn from(error: AppError) -> Self {
		Self::App(error)
	}
}

impl<T> From<store::Error> for RouteError<T> {
	fn from(error: store::Error) -> Self {
		Self::App(error.into())
	}
}

impl<T> From<MultipartError> for RouteError<T> {
	fn from(error: MultipartError) -> Self {
		Self::App(error.into())
	}
}

impl<T: ErrorShape> IntoResponse for RouteError<T> {
	fn into_response(self) -> Response<Body> {
		match self {
			Self::App(error) => error.into_response(),
			Self::Route(error) => respond(error.status(), error.errors(), &error),
		}
	}
}

impl<T> aide::OperationOutput for RouteError<T> {
	type Inner = ErrorBody<'static>;
}

fn respond(
	status: StatusCode,
	errors: Vec<Message<'_>>,
	source: &dyn std::error::Error,
) -> Response<Body> {
	let errors = if status.is_server_error() {
		tracing::error!(error = %source, status = status.as_u16(), "request failed");

		Message::new("internal server error").into_vec()
	} else {
		tracing::debug!(error = %source, status = status.as_u16(), "request rejected");

		errors
	};

	(
		status,
		Json(ErrorBody {
			success: false,
			errors,
		}),
	)
		.into_response()
}

#[cfg(test)]
mod test {
	use super::*;

	#[derive(Debug, thiserror::Error)]
	enum Sample {
		#[error("nothing here")]
		Missing,
		#[error("disk on fire")]
		Broken,
	}

	impl ErrorShape for Sample {
		fn status(&self) -> StatusCode {
			match self {
				Self::Missing => StatusCode::NOT_FOUND,
				Self::Broken => StatusCode::INTERNAL_SERVER_ERROR,
			}
		}
	}

	async fn body_of(response: Response<Body>) -> serde_json::Value {
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();

		serde_json::from_slice(&bytes).unwrap()
	}

	#[test]
	fn test_message_builder() {
		let message = Message::new("bad title")
			.field("title")
			.detail("min", 5)
			.detail("max", 50);

		let value = serde_json::to_value(&message).unwrap();

		assert_eq!(value["content"], "bad title");
		assert_eq!(value["field"], "title");
		assert_eq!(value["details"]["min"], 5);
		assert_eq!(value["details"]["max"], 50);
	}

	#[test]
	fn test_message_skips_empty_fields() {
		let value = serde_json::to_value(Message::new("oops")).unwrap();

		assert!(value.get("field").is_none());
		assert!(value.get("details").is_none());
	}

	#[tokio::test]
	async fn test_client_errors_keep_their_message() {
		let response = RouteError::from(Sample::Missing).into_response();

		assert_eq!(response.status(), StatusCode::NOT_FOUND);

		let body = body_of(response).await;

		assert_eq!(body["success"], false);
		assert_eq!(body["errors"][0]["content"], "nothing here");
	}

	#[tokio::test]
	async fn test_server_errors_are_opaque() {
		let response = RouteError::from(Sample::Broken).into_response();

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

		let body = body_of(response).await;

		assert_eq!(body["errors"][0]["content"], "internal server error");
	}
}
