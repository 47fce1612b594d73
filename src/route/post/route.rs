use axum::{
	extract::{Multipart, State},
	http::StatusCode,
};
use chrono::Utc;
use macros::route;

use crate::{extract::Json, openapi::tag, pipeline::Pipeline, store::Store};

use super::{form::Form, model, Error, RouteError};

/// List posts
/// Returns every stored post in insertion order, with its date as an ISO-8601 string and a slug derived from its title.
#[route(tag = tag::POST)]
pub async fn get_posts(
	State(store): State<Store>,
) -> Result<Json<Vec<model::PostView>>, RouteError> {
	let posts = store.list().await?;

	Ok(Json(posts.into_iter().map(model::PostView::from).collect()))
}

/// Create post
/// Creates a post from a multipart form with `title`, `description`, `date_time` (epoch milliseconds), one `main_image` and up to five `additional_images`, all JPEG.
#[route(
	tag = tag::POST,
	response(status = 201, shape = "Json<model::PostView>", description = "The created post."),
	response(status = 413, description = "An image is larger than 1 MiB."),
	response(status = 415, description = "An image is not a JPEG.")
)]
pub async fn create_post(
	State(store): State<Store>,
	State(pipeline): State<Pipeline>,
	multipart: Multipart,
) -> Result<(StatusCode, Json<model::PostView>), RouteError> {
	let form = Form::read(multipart).await?;
	let (images, draft) = form.validate(Utc::now()).map_err(Error::Invalid)?;

	let stored = pipeline.store_all(images).await.map_err(Error::Image)?;
	let post = store.append(draft.with_images(stored)).await?;

	tracing::info!(reference = %post.reference, "created post");

	Ok((StatusCode::CREATED, Json(post.into())))
}
