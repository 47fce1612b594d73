use axum::{extract::State, http::StatusCode};
use macros::route;

use crate::{
	extract::{Bearer, Json, Query},
	gateway::{self, Gateway},
	image_root::ImageRoot,
	openapi::tag,
	token::TokenService,
};

use super::{model, Error, RouteError};

/// Issue image token
/// Issues a token granting read access to one existing image for five minutes. The token is bound to the exact path given here.
#[route(
	tag = tag::MEDIA,
	response(status = 201, shape = "Json<model::TokenOutput>", description = "The issued token.")
)]
pub async fn create_token(
	State(root): State<ImageRoot>,
	State(tokens): State<TokenService>,
	Json(input): Json<model::TokenInput>,
) -> Result<(StatusCode, Json<model::TokenOutput>), RouteError> {
	if !root.exists(&input.image_path).await {
		return Err(Error::InvalidImagePath.into());
	}

	let token = tokens.issue(&input.image_path);

	tracing::debug!(
		path = %token.subject_path,
		expires_at = %token.expires_at,
		"issued image token"
	);

	Ok((
		StatusCode::CREATED,
		Json(model::TokenOutput {
			token: token.to_string(),
		}),
	))
}

/// Get image
/// Returns the bytes of a protected image. Requires a bearer token issued for exactly this `image_path`.
#[route(tag = tag::MEDIA)]
pub async fn get_image(
	State(gateway): State<Gateway>,
	Bearer(token): Bearer,
	Query(query): Query<model::ImageQuery>,
) -> Result<model::Jpeg, RouteError> {
	let bytes = gateway
		.fetch(&token, &query.image_path)
		.await
		.map_err(|error| {
			if let gateway::Error::Forbidden(reason) = &error {
				tracing::debug!(%reason, path = %query.image_path, "rejected image token");
			}

			Error::from(error)
		})?;

	Ok(model::Jpeg(bytes))
}
