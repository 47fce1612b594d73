#![warn(clippy::pedantic)]

mod config;
mod error;
mod extract;
mod gateway;
mod image_root;
mod openapi;
mod pipeline;
mod ratelimit;
mod route;
mod slug;
mod store;
mod token;
mod trace;

use std::{net::SocketAddr, sync::Arc};

use aide::{axum::ApiRouter, openapi::OpenApi};
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_governor::GovernorLayer;
use tower_http::{
	request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
	trace::TraceLayer,
};

use crate::{
	config::Config, gateway::Gateway, image_root::ImageRoot, pipeline::Pipeline, store::Store,
	token::{Secret, TokenService},
};

pub type AppState = State;

/// The shared application state.
///
/// Every field is cheap to clone and shares its underlying resource, so
/// handlers can extract exactly the parts they need.
#[derive(Clone, axum::extract::FromRef)]
pub struct State {
	pub store: Store,
	pub pipeline: Pipeline,
	pub tokens: TokenService,
	pub gateway: Gateway,
	pub root: ImageRoot,
}

impl State {
	/// Opens the post store and prepares the image directory.
	///
	/// A fresh signing secret is generated on every call, so tokens issued
	/// before a restart are no longer valid.
	pub async fn new(config: &Config) -> Result<Self, store::Error> {
		let store = Store::open(&config.posts_file).await?;
		let root = ImageRoot::new(&config.content_root);
		let directory = root.directory();

		tokio::fs::create_dir_all(&directory)
			.await
			.map_err(|source| store::Error::Io {
				path: directory,
				source,
			})?;

		let tokens = TokenService::new(Secret::generate());

		Ok(Self {
			store,
			pipeline: Pipeline::new(root.clone()),
			gateway: Gateway::new(tokens.clone(), root.clone()),
			tokens,
			root,
		})
	}
}

/// Builds the application router, without rate limiting.
pub fn app(state: State) -> Router {
	aide::gen::extract_schemas(true);

	let mut api = OpenApi::default();

	ApiRouter::new()
		.nest("/docs", route::docs::routes())
		.nest("/posts", route::post::routes())
		.nest("/media", route::media::routes())
		.finish_api_with(&mut api, openapi::docs)
		.layer(Extension(Arc::new(api)))
		.layer(
			ServiceBuilder::new()
				.layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
				.layer(TraceLayer::new_for_http())
				.layer(PropagateRequestIdLayer::x_request_id()),
		)
		.with_state(state)
}

#[tokio::main]
async fn main() {
	dotenvy::dotenv().ok();

	let config = Config::from_env().expect("invalid configuration");
	let _guard = trace::init(&config).expect("failed to initialize tracing");

	let state = State::new(&config)
		.await
		.expect("failed to open the post store");

	let limits = ratelimit::default();

	ratelimit::cleanup_old_limits(&[&limits]);

	let app = app(state).layer(GovernorLayer { config: limits });

	let listener = tokio::net::TcpListener::bind((config.host, config.port))
		.await
		.expect("failed to bind to port");

	tracing::info!(
		host = %config.host,
		port = config.port,
		posts = %config.posts_file.display(),
		"listening"
	);

	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.await
	.expect("server error");
}
