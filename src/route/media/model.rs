use aide::{
	gen::GenContext,
	openapi::{self, MediaType, Operation},
	OperationOutput,
};
use axum::{
	http::header,
	response::{IntoResponse, Response},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct TokenInput {
	/// The public path of the image, e.g. `images/photo.jpg`.
	#[validate(length(min = 1, message = "\"image_path\" is not allowed to be empty"))]
	pub image_path: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TokenOutput {
	/// A token granting read access to the requested image for five minutes.
	pub token: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ImageQuery {
	/// The public path of the image, exactly as it was when the token was issued.
	#[validate(length(min = 1, message = "\"image_path\" is not allowed to be empty"))]
	pub image_path: String,
}

/// Raw JPEG bytes, served as `image/jpeg`.
pub struct Jpeg(pub Vec<u8>);

impl IntoResponse for Jpeg {
	fn into_response(self) -> Response {
		([(header::CONTENT_TYPE, "image/jpeg")], self.0).into_response()
	}
}

impl OperationOutput for Jpeg {
	type Inner = Vec<u8>;

	fn operation_response(
		_ctx: &mut GenContext,
		_operation: &mut Operation,
	) -> Option<openapi::Response> {
		Some(openapi::Response {
			description: "The image bytes.".into(),
			content: [("image/jpeg".to_owned(), MediaType::default())]
				.into_iter()
				.collect(),
			..Default::default()
		})
	}

	fn inferred_responses(
		ctx: &mut GenContext,
		operation: &mut Operation,
	) -> Vec<(Option<u16>, openapi::Response)> {
		Self::operation_response(ctx, operation)
			.map(|response| vec![(Some(200), response)])
			.unwrap_or_default()
	}
}
