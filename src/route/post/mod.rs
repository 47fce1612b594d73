use aide::axum::{routing::get_with, ApiRouter};
use axum::{extract::DefaultBodyLimit, http::StatusCode};

use crate::{
	error,
	pipeline::{self, MAX_IMAGE_BYTES},
	AppState,
};

pub mod form;
pub mod model;
pub mod route;

/// Largest accepted creation request: every image at its limit, plus the text fields.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Invalid(#[from] model::Violation),
	#[error("Only JPEG images are allowed!")]
	UnsupportedImage,
	#[error("{0:?} is larger than {MAX_IMAGE_BYTES} bytes")]
	ImageTooLarge(String),
	#[error("image processing failed: {0}")]
	Image(#[from] pipeline::Error),
}

pub type RouteError = error::RouteError<Error>;

pub fn routes() -> ApiRouter<AppState> {
	use route::*;

	ApiRouter::new()
		.api_route(
			"/",
			get_with(get_posts, get_posts_docs).post_with(create_post, create_post_docs),
		)
		.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

impl error::ErrorShape for Error {
	fn status(&self) -> StatusCode {
		match self {
			Self::Invalid(..) => StatusCode::BAD_REQUEST,
			Self::UnsupportedImage => StatusCode::UNSUPPORTED_MEDIA_TYPE,
			Self::ImageTooLarge(..) => StatusCode::PAYLOAD_TOO_LARGE,
			Self::Image(..) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn errors(&self) -> Vec<error::Message<'_>> {
		match self {
			Self::Invalid(violation) => error::Message::new(violation.to_string())
				.field(violation.field())
				.into_vec(),
			Self::ImageTooLarge(file) => error::Message::new("File too large")
				.detail("file", file.as_str())
				.detail("limit", MAX_IMAGE_BYTES)
				.into_vec(),
			_ => error::Message::new(self.to_string()).into_vec(),
		}
	}
}
