use aide::axum::{
	routing::{get_with, post_with},
	ApiRouter,
};
use axum::http::StatusCode;

use crate::{error, gateway, AppState};

pub mod model;
pub mod route;

/// An error while issuing a token or serving a protected image.
///
/// The messages are presented to the client. Rejected tokens all share a
/// single message so a client cannot tell which check failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("missing bearer token")]
	MissingToken,
	#[error("invalid or expired token")]
	InvalidToken,
	#[error("Invalid image path.")]
	InvalidImagePath,
	#[error("Image not found")]
	NotFound,
	#[error("failed to read image {path:?}: {source}")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},
}

pub type RouteError = error::RouteError<Error>;

pub fn routes() -> ApiRouter<AppState> {
	use route::*;

	ApiRouter::new()
		.api_route("/", get_with(get_image, get_image_docs))
		.api_route("/token", post_with(create_token, create_token_docs))
}

impl From<gateway::Error> for Error {
	fn from(error: gateway::Error) -> Self {
		match error {
			gateway::Error::Forbidden(..) => Self::InvalidToken,
			gateway::Error::NotFound(..) => Self::NotFound,
			gateway::Error::Io { path, source } => Self::Io { path, source },
		}
	}
}

impl error::ErrorShape for Error {
	fn status(&self) -> StatusCode {
		match self {
			Self::MissingToken => StatusCode::UNAUTHORIZED,
			Self::InvalidToken => StatusCode::FORBIDDEN,
			Self::InvalidImagePath => StatusCode::BAD_REQUEST,
			Self::NotFound => StatusCode::NOT_FOUND,
			Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn errors(&self) -> Vec<error::Message<'_>> {
		let message = error::Message::new(self.to_string());

		match self {
			Self::InvalidImagePath => message.field("image_path").into_vec(),
			_ => message.into_vec(),
		}
	}
}

#[cfg(test)]
mod test {
	use axum::http::{header, HeaderValue};
	use serde_json::json;

	use crate::{
		error::ErrorShape,
		gateway,
		test::*,
		token::Unauthorized,
	};

	use super::Error;

	fn bearer(token: &str) -> HeaderValue {
		HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
	}

	async fn issue(app: &TestApp, path: &str) -> String {
		let response = app
			.server
			.post("/media/token")
			.json(&json!({ "image_path": path }))
			.await;

		assert_eq!(response.status_code(), 201);

		response.json::<serde_json::Value>()["token"]
			.as_str()
			.unwrap()
			.to_owned()
	}

	#[test]
	fn test_rejected_tokens_share_one_response() {
		for reason in [
			Unauthorized::Expired,
			Unauthorized::Tampered,
			Unauthorized::PathMismatch,
		] {
			let error = Error::from(gateway::Error::Forbidden(reason));

			assert!(matches!(error, Error::InvalidToken));
			assert_eq!(error.status(), 403);
			assert_eq!(error.errors()[0].content, "invalid or expired token");
		}
	}

	#[tokio::test]
	async fn test_token_flow() {
		let app = app().await;
		let jpeg = app.image("photo.jpg");

		let token = issue(&app, "images/photo.jpg").await;

		let response = app
			.server
			.get("/media")
			.add_query_param("image_path", "images/photo.jpg")
			.add_header(header::AUTHORIZATION, bearer(&token))
			.await;

		assert_eq!(response.status_code(), 200);
		assert_eq!(response.header(header::CONTENT_TYPE), "image/jpeg");
		assert_eq!(response.as_bytes().as_ref(), jpeg.as_slice());
	}

	#[tokio::test]
	async fn test_token_requires_existing_image() {
		let app = app().await;

		app.image("photo.jpg");
		std::fs::write(app.dir.path().join("blogs.json"), b"[]").unwrap();

		for path in ["images/missing.jpg", "blogs.json", "images/../blogs.json", ""] {
			let response = app
				.server
				.post("/media/token")
				.json(&json!({ "image_path": path }))
				.await;

			assert_eq!(response.status_code(), 400, "{path}");
		}

		let response = app
			.server
			.post("/media/token")
			.json(&json!({ "image_path": "images/missing.jpg" }))
			.await;

		assert_eq!(
			response.json::<serde_json::Value>()["errors"][0]["content"],
			"Invalid image path."
		);
	}

	#[tokio::test]
	async fn test_fetch_rejects_other_paths_and_tampering() {
		let app = app().await;

		app.image("photo.jpg");
		app.image("other.jpg");

		let token = issue(&app, "images/photo.jpg").await;

		let response = app
			.server
			.get("/media")
			.add_query_param("image_path", "images/other.jpg")
			.add_header(header::AUTHORIZATION, bearer(&token))
			.await;

		assert_eq!(response.status_code(), 403);
		assert_eq!(
			response.json::<serde_json::Value>()["errors"][0]["content"],
			"invalid or expired token"
		);

		let mut tampered = token.into_bytes();
		let last = tampered.len() - 1;
		tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };

		let response = app
			.server
			.get("/media")
			.add_query_param("image_path", "images/photo.jpg")
			.add_header(
				header::AUTHORIZATION,
				bearer(&String::from_utf8(tampered).unwrap()),
			)
			.await;

		assert_eq!(response.status_code(), 403);
	}

	#[tokio::test]
	async fn test_fetch_deleted_image() {
		let app = app().await;

		app.image("photo.jpg");

		let token = issue(&app, "images/photo.jpg").await;

		std::fs::remove_file(app.dir.path().join("images/photo.jpg")).unwrap();

		let response = app
			.server
			.get("/media")
			.add_query_param("image_path", "images/photo.jpg")
			.add_header(header::AUTHORIZATION, bearer(&token))
			.await;

		assert_eq!(response.status_code(), 404);
		assert_eq!(
			response.json::<serde_json::Value>()["errors"][0]["content"],
			"Image not found"
		);
	}

	#[tokio::test]
	async fn test_fetch_requires_bearer_token() {
		let app = app().await;

		app.image("photo.jpg");

		let response = app
			.server
			.get("/media")
			.add_query_param("image_path", "images/photo.jpg")
			.await;

		assert_eq!(response.status_code(), 401);

		let response = app
			.server
			.get("/media")
			.add_query_param("image_path", "images/photo.jpg")
			.add_header(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"))
			.await;

		assert_eq!(response.status_code(), 401);
	}
}
