use aide::{
	openapi::{SecurityScheme, Tag},
	transform::TransformOpenApi,
};

use crate::{error, extract::Json};

pub const SECURITY_SCHEME_BEARER: &str = "Image Token";

pub mod tag {
	pub const POST: &str = "Post";
	pub const MEDIA: &str = "Media";
}

pub fn docs(api: TransformOpenApi) -> TransformOpenApi {
	api.title("Blog Vault")
		.summary("Scheduled blog posts with token-protected images")
		.description(include_str!("../README.md"))
		.tag(Tag {
			name: tag::POST.into(),
			description: Some("Post listing and creation".into()),
			..Default::default()
		})
		.tag(Tag {
			name: tag::MEDIA.into(),
			description: Some("Image tokens and protected image access".into()),
			..Default::default()
		})
		.security_scheme(
			SECURITY_SCHEME_BEARER,
			SecurityScheme::Http {
				scheme: "bearer".into(),
				bearer_format: Some("signed image token".into()),
				description: Some(
					"A token from `POST /media/token`, valid for one image path for five minutes"
						.into(),
				),
				extensions: Default::default(),
			},
		)
		.default_response_with::<Json<error::ErrorBody<'static>>, _>(|res| {
			res.example(error::ErrorBody {
				success: false,
				errors: error::Message::new("\"title\" is not allowed to be empty")
					.field("title")
					.into_vec(),
			})
		})
}
